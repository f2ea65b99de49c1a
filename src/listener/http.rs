//! # HTTP Push Strategy
//!
//! Registration-only strategy: the config server keeps the node list and
//! pushes change batches to registered clients. The embedding application
//! exposes the inbound endpoint and forwards each decoded batch to
//! [`HttpChangeListener::handle_push`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::context::ConfigContext;
use crate::error::ConfigError;
use crate::listener::ChangeListener;

#[derive(Default)]
pub struct HttpChangeListener {
    context: Mutex<Option<Arc<ConfigContext>>>,
}

impl HttpChangeListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point for the application's inbound push endpoint. Applies the
    /// pushed batch through the shared update path.
    pub async fn handle_push(&self, batch: HashMap<String, String>) -> Result<()> {
        let context = {
            let guard = self
                .context
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.clone()
        };
        let context = context.ok_or(ConfigError::NotInitialized)?;
        context.update_config(batch).await
    }
}

#[async_trait]
impl ChangeListener for HttpChangeListener {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn register(&self, context: Arc<ConfigContext>) -> Result<()> {
        let node_id = context.node_id().to_string();
        let mut guard = self
            .context
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(context);
        info!("http listener registered, awaiting server pushes for node[{node_id}]");
        Ok(())
    }

    async fn unregister(&self) {
        let mut guard = self
            .context
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.take().is_some() {
            info!("http listener unregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_before_registration_is_rejected() {
        let listener = HttpChangeListener::new();
        let err = listener.handle_push(HashMap::new()).await.unwrap_err();
        let err = err.downcast::<ConfigError>().unwrap();
        assert!(matches!(err, ConfigError::NotInitialized));
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let listener = HttpChangeListener::new();
        listener.unregister().await;
        listener.unregister().await;
    }
}
