//! # Telemetry
//!
//! Tracing subscriber setup for hosts that do not install their own. The
//! filter comes from `RUST_LOG` when set and defaults to info-level output
//! for this crate only.

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops when a subscriber is
/// already installed (typical in test binaries).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "configcenter_client=info".into()),
        )
        .try_init();
}
