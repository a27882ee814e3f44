//! Per-record enrichment and the Firehose batch handler.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use aws_lambda_events::encodings::Base64Data;
use aws_lambda_events::firehose::{
    KinesisFirehoseEvent, KinesisFirehoseEventRecord, KinesisFirehoseResponse,
    KinesisFirehoseResponseRecord, KinesisFirehoseResponseRecordMetadata,
};
use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde_json::Value;
use tracing::instrument;

use crate::index::UsagePlanIndex;
use crate::pyliteral;

/// Result marker Firehose expects on a successfully transformed record.
const RESULT_OK: &str = "Ok";

/// Decode one record, attach `subscription_id` and `plan_id`, and re-encode
/// it as newline-terminated JSON.
pub fn enrich_record(
    record: &KinesisFirehoseEventRecord,
    index: &UsagePlanIndex,
) -> Result<KinesisFirehoseResponseRecord> {
    let text =
        std::str::from_utf8(&record.data.0).context("record payload is not valid UTF-8")?;
    let mut payload = pyliteral::parse(text).context("record payload is not a usage log entry")?;
    let fields = payload
        .as_object_mut()
        .ok_or_else(|| anyhow!("record payload is not an object"))?;

    let key_id = string_field(fields, "key_id")?;
    let api_id = string_field(fields, "api_id")?;
    let stage = string_field(fields, "stage")?;

    fields.insert(
        "subscription_id".to_string(),
        Value::String(index.customer(&key_id).to_string()),
    );
    fields.insert(
        "plan_id".to_string(),
        Value::String(index.plan(&api_id, &stage, &key_id).to_string()),
    );

    let mut data = serde_json::to_string(&payload)?;
    data.push('\n');

    Ok(KinesisFirehoseResponseRecord {
        record_id: record.record_id.clone(),
        result: Some(RESULT_OK.to_string()),
        data: Base64Data(data.into_bytes()),
        metadata: KinesisFirehoseResponseRecordMetadata {
            partition_keys: Default::default(),
        },
    })
}

fn string_field(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("record payload has no {name:?} field"))
}

/// Lambda entry point. Any undecodable record fails the invocation so
/// Firehose retries the batch.
#[instrument(skip_all, fields(records = event.payload.records.len()))]
pub async fn process_records(
    event: LambdaEvent<KinesisFirehoseEvent>,
    index: Arc<UsagePlanIndex>,
) -> Result<KinesisFirehoseResponse, LambdaError> {
    let records = &event.payload.records;
    let mut output = Vec::with_capacity(records.len());
    for record in records {
        let enriched = enrich_record(record, &index).map_err(|error| {
            tracing::error!(record_id = ?record.record_id, %error, "failed to enrich record");
            error
        })?;
        output.push(enriched);
    }
    tracing::info!(records = output.len(), "successfully processed records");
    Ok(KinesisFirehoseResponse { records: output })
}
