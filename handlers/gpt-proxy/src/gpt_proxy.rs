use std::sync::Arc;

use gpt_proxy::{handle_request, AppState, ProxyConfig};
use lambda_runtime::{service_fn, Error as LambdaError, Runtime};

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    lambda_runtime::tracing::init_default_subscriber();

    let config = ProxyConfig::from_env()?;
    let state = Arc::new(AppState::new(config));

    Runtime::new(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handle_request(event, state).await }
    }))
    .run()
    .await
}
