// Export route modules
pub mod conversation;
pub mod query;
pub mod reply;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(query::routes(state.clone()))
        .merge(reply::routes(state.clone()))
        .merge(conversation::routes(state))
}
