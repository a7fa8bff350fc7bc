//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - openai chat completion messages/tools, sent from the agent to the LLM
//! - tavily search requests, sent from the agent to the search system
//! - json histories and line-protocol fragments, sent from the server to the interface
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers, so the internal models are not an exact match to any of them.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
