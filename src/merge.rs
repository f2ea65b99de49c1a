//! # Merge Engine
//!
//! Combines the fetched remote property map with the local working set under
//! the precedence rule, decrypting protected remote values on adoption, then
//! runs the placeholder pass over the combined set and publishes every final
//! value into the property registry.
//!
//! Two control properties are peeled off the remote map before anything else:
//! the symmetric secret and the precedence flag. Neither is ever merged into
//! the data set. If the asymmetric private key has not been loaded yet and
//! the remote data supplies keystore coordinates, the key is loaded first,
//! since the bulk of the remote values may need it.

use std::collections::HashMap;

use tracing::debug;

use crate::crypto::{KeyStoreCoordinates, ResourceResolver, ValueCipher};
use crate::error::ConfigError;
use crate::placeholder;
use crate::registry::PropertyRegistry;
use crate::settings::{self, OVERRIDE_SENTINEL, PLACEHOLDER_PREFIX};

/// Merge `remote` into `properties` and publish the result.
///
/// Returns the remote-first precedence flag extracted from the remote map.
/// Decryption failures are fatal: the caller's startup must not proceed on a
/// half-decrypted set.
pub fn merge_remote(
    properties: &mut HashMap<String, String>,
    mut remote: HashMap<String, String>,
    cipher: &ValueCipher,
    registry: &PropertyRegistry,
    resolver: &dyn ResourceResolver,
) -> Result<bool, ConfigError> {
    // Control properties never reach the merged data set.
    if let Some(secret) = remote.remove(settings::ENCRYPT_SECRET) {
        cipher.set_secret(secret);
    }
    let remote_first = remote
        .remove(settings::REMOTE_CONFIG_FIRST)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // Keystore coordinates may live in the config center itself; load the key
    // before decrypting the bulk of the map.
    if !cipher.has_private_key() {
        let mut coords = KeyStoreCoordinates::from_registry(registry);
        coords.apply_remote(&remote);
        coords.decode_passwords(cipher)?;
        cipher.load_private_key(&coords, resolver);
    }

    for (key, value) in remote {
        if !remote_first && properties.contains_key(&key) {
            debug!("config[{key}] exists in local, skip");
            continue;
        }
        if value == OVERRIDE_SENTINEL {
            debug!("config[{key}] is remote-overridden, skip");
            continue;
        }
        let value = cipher.decrypt_if_tagged(&value)?;
        properties.insert(key, value);
    }

    // Placeholder pass over the combined set; every final value is published
    // to the registry, resolved or not.
    let keys: Vec<String> = properties.keys().cloned().collect();
    let overrides = |key: &str| registry.override_value(key);
    for key in keys {
        let value = properties
            .get(&key)
            .cloned()
            .unwrap_or_default();
        let value = if value.contains(PLACEHOLDER_PREFIX) {
            placeholder::resolve(properties, &key, &value, &overrides)
        } else {
            value
        };
        registry.put_managed(&key, &value);
    }

    Ok(remote_first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{symmetric, FsResourceResolver};

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn run_merge(
        local: &[(&str, &str)],
        remote: &[(&str, &str)],
    ) -> (HashMap<String, String>, PropertyRegistry, bool) {
        let mut properties = map(local);
        let registry = PropertyRegistry::new();
        let cipher = ValueCipher::new();
        let remote_first = merge_remote(
            &mut properties,
            map(remote),
            &cipher,
            &registry,
            &FsResourceResolver,
        )
        .unwrap();
        (properties, registry, remote_first)
    }

    #[test]
    fn test_local_precedence_never_overwrites_local_key() {
        let (properties, _, remote_first) = run_merge(
            &[("db.host", "local")],
            &[("db.host", "remote"), ("db.port", "3306")],
        );
        assert!(!remote_first);
        assert_eq!(properties.get("db.host").map(String::as_str), Some("local"));
        assert_eq!(properties.get("db.port").map(String::as_str), Some("3306"));
    }

    #[test]
    fn test_remote_first_prefers_remote_for_overlapping_keys() {
        let (properties, _, remote_first) = run_merge(
            &[("db.host", "local")],
            &[
                ("db.host", "remote"),
                ("jeesuite.configcenter.remote-config-first", "true"),
            ],
        );
        assert!(remote_first);
        assert_eq!(properties.get("db.host").map(String::as_str), Some("remote"));
    }

    #[test]
    fn test_sentinel_is_skipped_regardless_of_precedence() {
        let (properties, _, _) = run_merge(
            &[("keep.local", "local")],
            &[
                ("keep.local", "[Override]"),
                ("never.applied", "[Override]"),
                ("jeesuite.configcenter.remote-config-first", "true"),
            ],
        );
        assert_eq!(
            properties.get("keep.local").map(String::as_str),
            Some("local")
        );
        assert!(!properties.contains_key("never.applied"));
    }

    #[test]
    fn test_control_properties_are_extracted_not_merged() {
        let mut properties = map(&[]);
        let registry = PropertyRegistry::new();
        let cipher = ValueCipher::new();
        merge_remote(
            &mut properties,
            map(&[
                ("jeesuite.configcenter.encrypt-secret", "s3cr3t"),
                ("plain", "v"),
            ]),
            &cipher,
            &registry,
            &FsResourceResolver,
        )
        .unwrap();
        assert!(cipher.has_secret());
        assert!(!properties.contains_key("jeesuite.configcenter.encrypt-secret"));
        assert!(registry.get("jeesuite.configcenter.encrypt-secret").is_none());
    }

    #[test]
    fn test_remote_tagged_value_is_decrypted_with_remote_secret() {
        let encoded = symmetric::encrypt("s3cr3t", "db-password").unwrap();
        let tagged = format!("{{Cipher}}{encoded}");
        let (properties, registry, _) = run_merge(
            &[],
            &[
                ("jeesuite.configcenter.encrypt-secret", "s3cr3t"),
                ("db.password", tagged.as_str()),
            ],
        );
        assert_eq!(
            properties.get("db.password").map(String::as_str),
            Some("db-password")
        );
        assert_eq!(registry.get("db.password").as_deref(), Some("db-password"));
    }

    #[test]
    fn test_missing_secret_for_tagged_value_is_fatal() {
        let mut properties = map(&[]);
        let registry = PropertyRegistry::new();
        let cipher = ValueCipher::new();
        let err = merge_remote(
            &mut properties,
            map(&[("db.password", "{Cipher}AAAA")]),
            &cipher,
            &registry,
            &FsResourceResolver,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));
    }

    #[test]
    fn test_placeholders_resolved_and_published() {
        let (properties, registry, _) = run_merge(
            &[("db.host", "10.0.0.5")],
            &[("db.url", "jdbc://${db.host}:3306")],
        );
        assert_eq!(
            properties.get("db.url").map(String::as_str),
            Some("jdbc://10.0.0.5:3306")
        );
        // Non-placeholder keys are published too.
        assert_eq!(registry.get("db.host").as_deref(), Some("10.0.0.5"));
        assert_eq!(registry.get("db.url").as_deref(), Some("jdbc://10.0.0.5:3306"));
    }
}
