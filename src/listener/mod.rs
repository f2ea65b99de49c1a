//! # Change Listener Subsystem
//!
//! Two interchangeable strategies deliver live update batches into the
//! context after startup:
//!
//! - the HTTP strategy registers this node so the server can push change
//!   batches to the client's inbound endpoint;
//! - the ZooKeeper strategy establishes a persistent watch against the
//!   coordination service and translates node changes into batches.
//!
//! Selection is a data-driven branch on the `sync-type` setting. Either way,
//! `ConfigContext::update_config` is the sole path by which live updates
//! enter the system.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::ConfigContext;
use crate::error::ConfigError;
use crate::registry::PropertyRegistry;
use crate::settings::{self, SyncType};

pub mod http;
pub mod zookeeper;

pub use http::HttpChangeListener;
pub use zookeeper::ZookeeperChangeListener;

/// Strategy contract shared by both transports.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    /// Strategy name used in registration logging.
    fn name(&self) -> &'static str;

    /// Begin watching/listening. May hand work off to a dedicated background
    /// execution context; batches it produces are delivered through
    /// `ConfigContext::update_config`.
    async fn register(&self, context: Arc<ConfigContext>) -> Result<()>;

    /// Release watch/connection resources. Idempotent; never interrupts an
    /// in-flight delivery.
    async fn unregister(&self);
}

/// Build the listener strategy named by the sync-type setting.
///
/// The ZooKeeper strategy requires the `sync-zk-servers` setting; a blank
/// value is a fatal configuration error.
pub fn create_listener(
    sync_type: SyncType,
    registry: &PropertyRegistry,
) -> Result<Arc<dyn ChangeListener>, ConfigError> {
    match sync_type {
        SyncType::Zookeeper => {
            let servers = settings::lookup_required(registry, settings::SYNC_ZK_SERVERS)?;
            Ok(Arc::new(ZookeeperChangeListener::new(servers)))
        }
        SyncType::Http => Ok(Arc::new(HttpChangeListener::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zookeeper_strategy_requires_servers_setting() {
        let registry = PropertyRegistry::new();
        let err = create_listener(SyncType::Zookeeper, &registry).err().unwrap();
        assert!(matches!(err, ConfigError::MissingSetting(_)));
    }

    #[test]
    fn test_default_strategy_is_http() {
        let registry = PropertyRegistry::new();
        let listener = create_listener(SyncType::Http, &registry).unwrap();
        assert_eq!(listener.name(), "http");
    }
}
