//! Enrichment processor for API Gateway usage logs delivered through a
//! Kinesis Data Firehose transformation Lambda.
//!
//! The handler:
//! 1. Builds lookup tables from the account's API Gateway usage plans and
//!    API keys once, at cold start
//! 2. Decodes each Firehose record and parses its payload
//! 3. Adds `subscription_id` (customer name) and `plan_id` (usage plan name),
//!    defaulting both to `-` when the key is unknown
//! 4. Re-encodes the payload as newline-terminated JSON and marks the record
//!    `Ok`
//!
//! A record that cannot be decoded fails the whole batch, so Firehose retries
//! delivery instead of shipping half-enriched data.

pub mod index;
pub mod pyliteral;
pub mod records;

pub use index::UsagePlanIndex;
pub use records::process_records;
