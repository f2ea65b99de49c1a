//! # Placeholder Resolver
//!
//! Resolves `${key}` / `${key:default}` references embedded in configuration
//! values against the working property set.
//!
//! The algorithm is segment-wise and order-sensitive: the value is split on
//! the `${` marker, each segment containing a `}` contributes a substituted
//! reference plus its literal tail, and the resolved value is written back
//! into the working set so later keys can reference it.
//!
//! Known restriction: placeholder chains are followed through a single level
//! of indirection only. A referenced value that is itself a `${...}`
//! placeholder is re-looked-up once by its literal name; deeper chains stay
//! unresolved. This guards against cyclic references and is deliberate, not
//! an oversight.

use std::collections::HashMap;

use crate::settings::{PLACEHOLDER_PREFIX, PLACEHOLDER_SUFFIX};

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Resolve every placeholder in `value`, writing the result back into
/// `properties` under `key` and returning it.
///
/// `overrides` is the process-level override store consulted when the working
/// set has no binding for a reference. A reference that resolves nowhere is
/// preserved verbatim, including any `:default` suffix; the declared default
/// is used for display only, never substituted.
pub fn resolve(
    properties: &mut HashMap<String, String>,
    key: &str,
    value: &str,
    overrides: &dyn Fn(&str) -> Option<String>,
) -> String {
    let mut resolved = String::new();

    for segment in value.split(PLACEHOLDER_PREFIX) {
        if segment.is_empty() {
            continue;
        }

        let Some(close) = segment.find(PLACEHOLDER_SUFFIX) else {
            // Leading text before the first marker, or a dangling `${`.
            resolved.push_str(segment);
            continue;
        };

        let origin_key = segment[..close].trim();
        // `${host:127.0.0.1}`: only the part before the separator is looked up.
        let ref_key = origin_key.split(':').next().unwrap_or(origin_key);

        let mut ref_value = properties.get(ref_key).cloned();

        // Single-level indirection: a referenced value that is itself a
        // placeholder is stripped of its markers and re-looked-up literally.
        if let Some(ref current) = ref_value {
            if !current.trim().is_empty() && current.contains(PLACEHOLDER_PREFIX) {
                let sub_ref_key = current
                    .replace(PLACEHOLDER_PREFIX, "")
                    .replace(PLACEHOLDER_SUFFIX, "");
                ref_value = properties.get(&sub_ref_key).cloned();
            }
        }

        if is_blank(ref_value.as_ref()) {
            ref_value = overrides(ref_key);
        }
        if is_blank(ref_value.as_ref()) {
            ref_value = Some(format!(
                "{PLACEHOLDER_PREFIX}{origin_key}{PLACEHOLDER_SUFFIX}"
            ));
        }
        resolved.push_str(&ref_value.unwrap_or_default());

        // Literal text after the close marker is preserved as-is.
        resolved.push_str(&segment[close + PLACEHOLDER_SUFFIX.len()..]);
    }

    properties.insert(key.to_string(), resolved.clone());
    resolved
}
