use std::sync::Arc;

use lambda_runtime::{service_fn, Error as LambdaError, Runtime};
use usage_logs_processor::{process_records, UsagePlanIndex};

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    lambda_runtime::tracing::init_default_subscriber();

    let config = aws_config::load_from_env().await;
    let client = aws_sdk_apigateway::Client::new(&config);

    // Cold-start load; a failure here aborts the sandbox rather than running
    // with empty tables.
    let index = Arc::new(UsagePlanIndex::load(&client).await?);

    Runtime::new(service_fn(move |event| {
        let index = Arc::clone(&index);
        async move { process_records(event, index).await }
    }))
    .run()
    .await
}
