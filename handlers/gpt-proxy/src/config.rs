//! Environment-driven configuration, read once at startup.
//!
//! Missing required variables abort startup; optional ones fall back to the
//! defaults that reproduce the historical behavior.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::openai::PollPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Bearer token for the upstream API.
    pub api_key: String,
    /// Default assistant used when the path does not embed one.
    pub assistant_id: String,
    pub base_url: String,
    pub poll: PollPolicy,
    pub conversation_ttl: Duration,
    pub conversation_capacity: usize,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let assistant_id = env::var("ASSISTANT_ID").context("ASSISTANT_ID must be set")?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let poll = PollPolicy {
            max_attempts: parse_env("RUN_POLL_MAX_ATTEMPTS", 5)?,
            interval: Duration::from_millis(parse_env("RUN_POLL_INTERVAL_MS", 5_000)?),
            backoff: parse_env("RUN_POLL_BACKOFF", 1.0)?,
        };

        Ok(Self {
            api_key,
            assistant_id,
            base_url,
            poll,
            conversation_ttl: Duration::from_secs(parse_env("CONVERSATION_TTL_SECONDS", 3_600)?),
            conversation_capacity: parse_env("CONVERSATION_MAX_ENTRIES", 1_024)?,
        })
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} is not a valid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
