//! Error taxonomy for the proxy handler.
//!
//! Every variant maps to a fixed HTTP response (see `response`); the handler
//! never surfaces these as Lambda invocation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Request body missing or not valid JSON.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(http::Method),

    #[error("no route for path {0}")]
    PathNotFound(String),

    /// Path is whitelisted but has no upstream endpoint behind it.
    #[error("no upstream endpoint for path {0}")]
    NoUpstreamRoute(String),

    /// Network or transport failure talking to the upstream API.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Upstream answered, but without token-usage data.
    #[error("upstream response carried no usage data")]
    MissingUsage,
}

impl ProxyError {
    pub fn status_code(&self) -> i64 {
        match self {
            ProxyError::PathNotFound(_) => 404,
            ProxyError::Upstream(_) => 500,
            ProxyError::InvalidInput(_)
            | ProxyError::MethodNotAllowed(_)
            | ProxyError::NoUpstreamRoute(_)
            | ProxyError::MissingUsage => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(ProxyError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(
            ProxyError::MethodNotAllowed(http::Method::GET).status_code(),
            400
        );
        assert_eq!(ProxyError::PathNotFound("/x".into()).status_code(), 404);
        assert_eq!(ProxyError::NoUpstreamRoute("/x".into()).status_code(), 400);
        assert_eq!(ProxyError::MissingUsage.status_code(), 400);
    }
}
