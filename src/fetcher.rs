//! # Endpoint Fetcher
//!
//! Performs the "fetch all configs" call against an ordered list of candidate
//! base URLs. Within one pass, each URL is tried in order until one returns a
//! well-formed success payload; a payload carrying an embedded `code` field is
//! an application-level error and counts as a failed attempt. If a whole pass
//! fails, the pass is retried until the budget is exhausted.
//!
//! The retry budget counts whole passes and the initial attempt consumes one
//! unit, so the default budget of 2 yields at most two passes. Exhaustion is
//! reported as a single terminal error; per-URL diagnostics exist only in the
//! logs.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::ConfigError;

pub const FETCH_PATH: &str = "/api/fetch_all_configs";

/// Whole-pass retry budget, initial attempt included.
pub const DEFAULT_RETRY_BUDGET: u32 = 2;

/// Fetch the flat key/value configuration for `app`/`env`/`version`.
///
/// Idempotent with respect to retries; the only side effect is network I/O.
pub async fn fetch_all_configs(
    client: &reqwest::Client,
    base_urls: &[String],
    app: &str,
    env: &str,
    version: &str,
    retry_budget: u32,
) -> Result<HashMap<String, String>, ConfigError> {
    for attempt in 1..=retry_budget.max(1) {
        for base_url in base_urls {
            let url = format!("{base_url}{FETCH_PATH}");
            info!("fetch configs url: {url}?appName={app}&env={env}&version={version}");

            let response = match client
                .get(&url)
                .query(&[("appName", app), ("env", env), ("version", version)])
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("fetch configs from [{url}] failed: {e}");
                    continue;
                }
            };
            if !response.status().is_success() {
                warn!("fetch configs from [{url}] failed: HTTP {}", response.status());
                continue;
            }

            let payload: serde_json::Map<String, Value> = match response.json().await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("fetch configs from [{url}] returned malformed body: {e}");
                    continue;
                }
            };
            if payload.contains_key("code") {
                let msg = payload
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                warn!("fetch configs from [{url}] returned error: {msg}");
                continue;
            }

            return Ok(flatten(payload));
        }

        if attempt < retry_budget {
            warn!("fetch pass {attempt} exhausted all base urls, retrying");
        }
    }

    Err(ConfigError::FetchFailed)
}

/// The wire payload is a flat JSON object; non-string scalars are carried
/// through in their JSON rendering.
fn flatten(payload: serde_json::Map<String, Value>) -> HashMap<String, String> {
    payload
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}
