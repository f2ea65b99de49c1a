//! # Recognized Settings
//!
//! Central definitions for the setting keys, value-tag prefixes, and wire
//! markers the client recognizes, plus the small lookup helpers layered on
//! top of the property registry.
//!
//! Every setting here can be overridden by a process-level property; the
//! registry consults its override layer before any other source.

use crate::error::ConfigError;
use crate::registry::PropertyRegistry;

// ---------------------------------------------------------------------------
// Setting keys
// ---------------------------------------------------------------------------

pub const APP_NAME: &str = "jeesuite.configcenter.appName";
pub const REMOTE_ENABLED: &str = "jeesuite.configcenter.enabled";
pub const PROFILE: &str = "jeesuite.configcenter.profile";
pub const BASE_URL: &str = "jeesuite.configcenter.base.url";
pub const VERSION: &str = "jeesuite.configcenter.version";
pub const SYNC_INTERVAL_SECONDS: &str = "jeesuite.configcenter.sync-interval-seconds";
pub const SYNC_TYPE: &str = "jeesuite.configcenter.sync-type";
pub const SYNC_ZK_SERVERS: &str = "jeesuite.configcenter.sync-zk-servers";
pub const ENCRYPT_SECRET: &str = "jeesuite.configcenter.encrypt-secret";
pub const REMOTE_CONFIG_FIRST: &str = "jeesuite.configcenter.remote-config-first";

pub const KEYSTORE_LOCATION: &str = "jeesuite.configcenter.encrypt-keyStore-location";
pub const KEYSTORE_TYPE: &str = "jeesuite.configcenter.encrypt-keyStore-type";
pub const KEYSTORE_PASSWORD: &str = "jeesuite.configcenter.encrypt-keyStore-password";
pub const KEYSTORE_ALIAS: &str = "jeesuite.configcenter.encrypt-keyStore-alias";
pub const KEYSTORE_KEY_PASSWORD: &str = "jeesuite.configcenter.encrypt-keyStore-keyPassword";

/// Identity properties merged into the local source at `init`.
pub const NODE_ID_PROPERTY: &str = "client.nodeId";
pub const RUNTIME_FLAVOR_PROPERTY: &str = "springboot";

/// Host identity read back out of the layered registry for the sync report.
pub const SERVER_IP_PROPERTY: &str = "server.ip";
pub const SERVER_PORT_PROPERTY: &str = "server.port";

// ---------------------------------------------------------------------------
// Wire markers
// ---------------------------------------------------------------------------

/// Remote sentinel meaning "do not propagate this key, keep local/absent".
pub const OVERRIDE_SENTINEL: &str = "[Override]";

/// Prefix tagging a symmetrically encrypted value.
pub const SYMMETRIC_PREFIX: &str = "{Cipher}";

/// Prefix tagging an asymmetrically (RSA) encrypted value.
pub const RSA_PREFIX: &str = "{Cipher:RSA}";

pub const PLACEHOLDER_PREFIX: &str = "${";
pub const PLACEHOLDER_SUFFIX: &str = "}";

pub const DEFAULT_VERSION: &str = "0.0.0";
pub const DEFAULT_SYNC_INTERVAL_SECONDS: u64 = 90;
pub const DEFAULT_PING_URI: &str = "/api/ping";

// ---------------------------------------------------------------------------
// Sync type
// ---------------------------------------------------------------------------

/// Change-notification transport strategy, selected by the
/// `jeesuite.configcenter.sync-type` setting.
///
/// A pure data-driven branch: anything other than `zookeeper` selects the
/// HTTP push strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    Http,
    Zookeeper,
}

impl SyncType {
    pub fn from_setting(value: Option<&str>) -> Self {
        match value {
            Some("zookeeper") => SyncType::Zookeeper,
            _ => SyncType::Http,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::Http => "http",
            SyncType::Zookeeper => "zookeeper",
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

/// Look up a setting through the layered registry.
///
/// Blank values count as absent. A value that is itself a `${ref}` placeholder
/// is dereferenced once through the registry (single level, like the rest of
/// the placeholder machinery).
pub fn lookup(registry: &PropertyRegistry, key: &str) -> Option<String> {
    let value = registry.get(key)?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.starts_with(PLACEHOLDER_PREFIX) && value.ends_with(PLACEHOLDER_SUFFIX) {
        let ref_key = value[PLACEHOLDER_PREFIX.len()..value.len() - PLACEHOLDER_SUFFIX.len()].trim();
        return registry.get(ref_key).filter(|v| !v.trim().is_empty());
    }
    Some(value.to_string())
}

/// Look up a setting, falling back to a default when absent or blank.
pub fn lookup_or(registry: &PropertyRegistry, key: &str, default: &str) -> String {
    lookup(registry, key).unwrap_or_else(|| default.to_string())
}

/// Look up a required setting, failing with the fatal taxonomy when blank.
pub fn lookup_required(registry: &PropertyRegistry, key: &str) -> Result<String, ConfigError> {
    lookup(registry, key).ok_or_else(|| ConfigError::MissingSetting(key.to_string()))
}

pub fn lookup_bool(registry: &PropertyRegistry, key: &str, default: bool) -> bool {
    lookup(registry, key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

pub fn lookup_u64(registry: &PropertyRegistry, key: &str, default: u64) -> u64 {
    lookup(registry, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Split the configured base-URL list on `,` / `;` and strip trailing slashes.
pub fn parse_base_urls(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_urls_splits_and_normalizes() {
        let urls = parse_base_urls("http://cc1:8080/,http://cc2:8080;http://cc3:8080");
        assert_eq!(
            urls,
            vec!["http://cc1:8080", "http://cc2:8080", "http://cc3:8080"]
        );
    }

    #[test]
    fn test_parse_base_urls_skips_blank_entries() {
        let urls = parse_base_urls("http://cc1:8080,, ;");
        assert_eq!(urls, vec!["http://cc1:8080"]);
    }

    #[test]
    fn test_sync_type_branch_is_data_driven() {
        assert_eq!(SyncType::from_setting(Some("zookeeper")), SyncType::Zookeeper);
        assert_eq!(SyncType::from_setting(Some("http")), SyncType::Http);
        assert_eq!(SyncType::from_setting(Some("anything")), SyncType::Http);
        assert_eq!(SyncType::from_setting(None), SyncType::Http);
    }

    #[test]
    fn test_lookup_dereferences_single_level_ref() {
        let registry = PropertyRegistry::new();
        registry.put_local("real.value", "resolved");
        registry.put_local("alias", "${real.value}");
        assert_eq!(
            lookup(&registry, "alias").as_deref(),
            Some("resolved")
        );
    }

    #[test]
    fn test_lookup_treats_blank_as_absent() {
        let registry = PropertyRegistry::new();
        registry.put_local("blank", "   ");
        assert_eq!(lookup(&registry, "blank"), None);
        assert_eq!(lookup_or(&registry, "blank", "fallback"), "fallback");
    }
}
