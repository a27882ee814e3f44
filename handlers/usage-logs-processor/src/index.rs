//! Lookup tables over the account's API Gateway usage plans.
//!
//! Loaded once at startup. Both tables answer with [`UNKNOWN`] for anything
//! they do not contain, so stale tables degrade to unattributed records
//! rather than failures.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::instrument;

/// Placeholder written when a lookup has no match.
pub const UNKNOWN: &str = "-";

/// One API key attached to a usage plan.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub id: String,
    pub name: String,
}

/// One usage plan with the API stages it covers and the keys assigned to it.
#[derive(Debug, Clone)]
pub struct PlanRecord {
    pub name: String,
    /// `(api_id, stage)` pairs the plan is applied to.
    pub api_stages: Vec<(String, String)>,
    pub keys: Vec<KeyRecord>,
}

/// Immutable lookup tables shared across invocations.
#[derive(Debug, Default)]
pub struct UsagePlanIndex {
    /// `"{api_id}:{stage}:{key_id}"` -> usage plan name
    plans: HashMap<String, String>,
    /// key id -> customer name
    customers: HashMap<String, String>,
}

impl UsagePlanIndex {
    /// Fetch every usage plan and its keys, paginating through both listings.
    /// Any API failure aborts startup.
    #[instrument(skip_all)]
    pub async fn load(client: &aws_sdk_apigateway::Client) -> Result<Self> {
        let mut plans = Vec::new();
        let mut plan_pages = client.get_usage_plans().into_paginator().items().send();
        while let Some(plan) = plan_pages.next().await {
            let plan = plan.context("failed to list usage plans")?;
            let Some(plan_id) = plan.id else { continue };
            let plan_name = plan.name.unwrap_or_default();

            let api_stages = plan
                .api_stages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|stage| Some((stage.api_id?, stage.stage?)))
                .collect();

            let mut keys = Vec::new();
            let mut key_pages = client
                .get_usage_plan_keys()
                .usage_plan_id(&plan_id)
                .into_paginator()
                .items()
                .send();
            while let Some(key) = key_pages.next().await {
                let key = key
                    .with_context(|| format!("failed to list keys for usage plan {plan_id}"))?;
                if let Some(id) = key.id {
                    keys.push(KeyRecord {
                        id,
                        name: key.name.unwrap_or_default(),
                    });
                }
            }

            plans.push(PlanRecord {
                name: plan_name,
                api_stages,
                keys,
            });
        }

        let index = Self::from_plans(plans);
        tracing::info!(
            plan_entries = index.plans.len(),
            customers = index.customers.len(),
            "usage plan index loaded"
        );
        Ok(index)
    }

    /// Build the tables from already-fetched plan records.
    pub fn from_plans(plans: Vec<PlanRecord>) -> Self {
        let mut index = Self::default();
        for plan in plans {
            for key in &plan.keys {
                index.customers.insert(key.id.clone(), key.name.clone());
                for (api_id, stage) in &plan.api_stages {
                    index
                        .plans
                        .insert(plan_key(api_id, stage, &key.id), plan.name.clone());
                }
            }
        }
        index
    }

    /// Customer name for an API key id, or `-`.
    pub fn customer(&self, key_id: &str) -> &str {
        self.customers.get(key_id).map_or(UNKNOWN, String::as_str)
    }

    /// Usage plan name for an api/stage/key triple, or `-`.
    pub fn plan(&self, api_id: &str, stage: &str, key_id: &str) -> &str {
        self.plans
            .get(&plan_key(api_id, stage, key_id))
            .map_or(UNKNOWN, String::as_str)
    }
}

fn plan_key(api_id: &str, stage: &str, key_id: &str) -> String {
    format!("{api_id}:{stage}:{key_id}")
}
