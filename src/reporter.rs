//! # Sync Reporter
//!
//! Posts the final, masked configuration snapshot to every known config
//! server for auditing. Delivery is best-effort per endpoint: each URL gets
//! its own success/failure log line and a partial failure never aborts the
//! sibling posts.
//!
//! Masking applies wherever configuration is displayed or reported: values
//! whose key looks sensitive are truncated to their first half plus a fixed
//! marker and are never emitted in full.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{info, warn};

pub const NOTIFY_PATH: &str = "/api/notify_final_config";

/// Case-insensitive key fragments that mark a value as sensitive.
const SENSITIVE_KEY_HINTS: [&str; 5] = ["pass", "key", "secret", "token", "credentials"];

const MASK: &str = "****";

/// Report payload posted to `/api/notify_final_config`.
///
/// The wire format is a flat JSON object: the identity fields below plus
/// every resolved configuration key, all values as strings, sensitive values
/// masked. Field names are fixed by the server protocol.
#[derive(Debug, Serialize)]
pub struct FinalConfigReport {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "appName")]
    pub app_name: String,
    pub env: String,
    pub version: String,
    pub springboot: String,
    #[serde(rename = "syncIntervalSeconds")]
    pub sync_interval_seconds: String,
    #[serde(rename = "syncType")]
    pub sync_type: String,
    pub serverip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serverport: Option<String>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
}

/// Mask a value for display when its key looks sensitive.
///
/// Blank input yields an empty string; non-sensitive values pass through
/// unchanged; sensitive values longer than one character keep their first
/// half followed by the fixed marker.
#[must_use]
pub fn hide_sensitive(key: &str, value: &str) -> String {
    if key.trim().is_empty() || value.trim().is_empty() {
        return String::new();
    }
    let lower = key.to_lowercase();
    let sensitive = SENSITIVE_KEY_HINTS.iter().any(|hint| lower.contains(hint));
    let length = value.chars().count();
    if sensitive && length > 1 {
        let half: String = value.chars().take(length / 2).collect();
        return format!("{half}{MASK}");
    }
    value.to_string()
}

/// Produce the masked, sorted view of the final property set used for both
/// the report payload and the operator listing.
#[must_use]
pub fn mask_properties(properties: &HashMap<String, String>) -> BTreeMap<String, String> {
    properties
        .iter()
        .map(|(key, value)| (key.clone(), hide_sensitive(key, value)))
        .collect()
}

/// Print the sorted final configuration for operator review (first sync only).
pub fn log_final_config(properties: &BTreeMap<String, String>) {
    info!("==================final config list start==================");
    for (key, value) in properties {
        info!("{key} = {value}");
    }
    info!("==================final config list end====================");
}

/// Post the report to every known base URL, best-effort.
pub async fn sync_to_server(
    client: &reqwest::Client,
    base_urls: &[String],
    report: &FinalConfigReport,
) {
    for base_url in base_urls {
        let url = format!("{base_url}{NOTIFY_PATH}");
        info!("syncConfigToServer, url: {url}");
        match client.post(&url).json(report).send().await {
            Ok(response) if response.status().is_success() => {
                info!("syncConfigToServer[{url}] ok");
            }
            Ok(response) => {
                warn!("syncConfigToServer[{url}] error: HTTP {}", response.status());
            }
            Err(e) => {
                warn!("syncConfigToServer[{url}] error: {e}");
            }
        }
    }
}
