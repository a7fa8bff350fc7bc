mod configuration;
mod error;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use researcher::{agent::Agent, providers::factory, systems::SearchSystem};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let settings = configuration::Settings::new()?;
    let addr = settings.server.socket_addr()?;
    info!(provider = ?settings.provider.provider_type(), "configured model backend");

    // The agent and its conversation store live for the whole process
    let provider = factory::get_provider(settings.provider.into_config())?;
    let mut agent = Agent::new(provider).with_config(settings.agent.into_config());
    agent.add_system(Box::new(SearchSystem::new(settings.search.into_config())?));
    let state = state::AppState::new(agent);

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    // Run server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
