//! Lambda-side proxy in front of the OpenAI chat and assistants APIs.
//!
//! The handler:
//! 1. Receives an API Gateway proxy event
//! 2. Resolves the inbound path against an explicit route table
//! 3. Builds the outbound message list, folding in stored conversation history
//! 4. Forwards the request upstream with bearer authentication
//! 5. For run-style endpoints, polls the run status and fetches the final
//!    thread messages
//! 6. Returns the answer text together with token-usage headers
//!
//! All domain failures map to fixed HTTP responses; the Lambda invocation
//! itself only fails on runtime-level problems.

pub mod config;
pub mod conversation;
pub mod error;
pub mod handler;
pub mod openai;
pub mod response;
pub mod routes;

// Re-export commonly used types
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use handler::{handle_request, AppState};
