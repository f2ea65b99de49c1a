//! # Configuration Context
//!
//! Central orchestrator tying the whole client together: it owns the node
//! identity, the layered property registry, the cipher layer, the HTTP
//! client, and the lifecycle state machine.
//!
//! Lifecycle advances monotonically through `Inited` -> `Fetched` ->
//! `Uploaded` and never moves backwards. `init` merges the local property
//! set, resolves the client identity from settings, fetches and merges the
//! remote configuration, and reports the final masked set back to the
//! server; the change listener is registered exactly once, on the first
//! successful report.
//!
//! A single async mutex serializes the mutating entry points (`init`,
//! `merge_remote_properties`, `update_config`, `sync_config_to_server`,
//! `close`). Readers go through the registry, which carries its own
//! finer-grained locks.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::{FsResourceResolver, ResourceResolver, ValueCipher};
use crate::error::ConfigError;
use crate::fetcher;
use crate::listener::{self, ChangeListener};
use crate::merge;
use crate::registry::{
    ConfigChangeHandler, HandlerProvider, PropertyRegistry, StaticHandlerProvider,
};
use crate::reporter::{self, FinalConfigReport};
use crate::settings::{self, SyncType};

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const PING_RETRY_DELAY: Duration = Duration::from_millis(1500);

/// Lifecycle states, in advancing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigStatus {
    Inited,
    Fetched,
    Uploaded,
}

/// Host runtime flavor reported to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeFlavor {
    #[default]
    Standalone,
    Springboot,
}

impl RuntimeFlavor {
    /// Wire rendering: the report carries the flag as a boolean string.
    #[must_use]
    pub fn wire_flag(self) -> &'static str {
        match self {
            RuntimeFlavor::Standalone => "false",
            RuntimeFlavor::Springboot => "true",
        }
    }
}

/// Identity resolved once during `init` and immutable afterwards.
#[derive(Debug)]
struct Identity {
    app: String,
    env: String,
    version: String,
    base_urls: Vec<String>,
    sync_interval: Duration,
    sync_type: SyncType,
    remote_enabled: bool,
}

#[derive(Default)]
struct SyncState {
    status: Option<ConfigStatus>,
    remote_first: bool,
    listener: Option<Arc<dyn ChangeListener>>,
    handlers: Option<Vec<Arc<dyn ConfigChangeHandler>>>,
}

fn advance(status: &mut Option<ConfigStatus>, next: ConfigStatus) {
    if status.map_or(true, |current| current < next) {
        *status = Some(next);
    }
}

pub struct ConfigContext {
    node_id: String,
    runtime_flavor: RuntimeFlavor,
    registry: Arc<PropertyRegistry>,
    cipher: Arc<ValueCipher>,
    resolver: Box<dyn ResourceResolver>,
    handler_provider: Box<dyn HandlerProvider>,
    client: reqwest::Client,
    identity: OnceLock<Identity>,
    state: Mutex<SyncState>,
}

impl Default for ConfigContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            runtime_flavor: RuntimeFlavor::default(),
            registry: Arc::new(PropertyRegistry::new()),
            cipher: Arc::new(ValueCipher::new()),
            resolver: Box::new(FsResourceResolver),
            handler_provider: Box::new(StaticHandlerProvider::default()),
            client: reqwest::Client::new(),
            identity: OnceLock::new(),
            state: Mutex::new(SyncState::default()),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn ResourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_handler_provider(mut self, provider: Box<dyn HandlerProvider>) -> Self {
        self.handler_provider = provider;
        self
    }

    #[must_use]
    pub fn with_runtime_flavor(mut self, flavor: RuntimeFlavor) -> Self {
        self.runtime_flavor = flavor;
        self
    }

    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    #[must_use]
    pub fn registry(&self) -> Arc<PropertyRegistry> {
        self.registry.clone()
    }

    /// Convenience lookup through the layered registry.
    #[must_use]
    pub fn get_property(&self, key: &str) -> Option<String> {
        self.registry.get(key)
    }

    pub fn app(&self) -> Result<&str, ConfigError> {
        self.identity
            .get()
            .map(|i| i.app.as_str())
            .ok_or(ConfigError::NotInitialized)
    }

    pub fn env(&self) -> Result<&str, ConfigError> {
        self.identity
            .get()
            .map(|i| i.env.as_str())
            .ok_or(ConfigError::NotInitialized)
    }

    pub fn version(&self) -> Result<&str, ConfigError> {
        self.identity
            .get()
            .map(|i| i.version.as_str())
            .ok_or(ConfigError::NotInitialized)
    }

    pub fn sync_interval(&self) -> Result<Duration, ConfigError> {
        self.identity
            .get()
            .map(|i| i.sync_interval)
            .ok_or(ConfigError::NotInitialized)
    }

    pub async fn status(&self) -> Option<ConfigStatus> {
        self.state.lock().await.status
    }

    pub async fn remote_first(&self) -> bool {
        self.state.lock().await.remote_first
    }

    /// Initialize the context from the host's local property set.
    ///
    /// Re-entrant calls after a completed init are no-ops. A fetch or merge
    /// failure is fatal and rolls the lifecycle back so init can be retried;
    /// the host must not start on a partial configuration.
    pub async fn init(self: &Arc<Self>, local: HashMap<String, String>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.status.is_some() {
            return Ok(());
        }

        self.registry.merge_local(&local);
        self.registry
            .put_local(settings::NODE_ID_PROPERTY, &self.node_id);
        self.registry.put_local(
            settings::RUNTIME_FLAVOR_PROPERTY,
            self.runtime_flavor.wire_flag(),
        );

        let remote_enabled = settings::lookup_bool(&self.registry, settings::REMOTE_ENABLED, true);
        let app = settings::lookup_required(&self.registry, settings::APP_NAME)?;
        let env = settings::lookup_or(&self.registry, settings::PROFILE, "dev");
        let version =
            settings::lookup_or(&self.registry, settings::VERSION, settings::DEFAULT_VERSION);
        let base_urls = if remote_enabled {
            let raw = settings::lookup_required(&self.registry, settings::BASE_URL)?;
            settings::parse_base_urls(&raw)
        } else {
            Vec::new()
        };
        let sync_interval = Duration::from_secs(settings::lookup_u64(
            &self.registry,
            settings::SYNC_INTERVAL_SECONDS,
            settings::DEFAULT_SYNC_INTERVAL_SECONDS,
        ));
        let sync_type =
            SyncType::from_setting(settings::lookup(&self.registry, settings::SYNC_TYPE).as_deref());

        info!(
            "init config context, appName: {app}, env: {env}, version: {version}, syncType: {}, remoteEnabled: {remote_enabled}, apiBaseUrls: {base_urls:?}",
            sync_type.as_str()
        );
        let _ = self.identity.set(Identity {
            app,
            env,
            version,
            base_urls,
            sync_interval,
            sync_type,
            remote_enabled,
        });

        if !remote_enabled {
            info!("remote config disabled, running on local properties only");
            advance(&mut state.status, ConfigStatus::Inited);
            return Ok(());
        }
        advance(&mut state.status, ConfigStatus::Inited);

        let identity = self.identity.get().ok_or(ConfigError::NotInitialized)?;
        let remote = match fetcher::fetch_all_configs(
            &self.client,
            &identity.base_urls,
            &identity.app,
            &identity.env,
            &identity.version,
            fetcher::DEFAULT_RETRY_BUDGET,
        )
        .await
        {
            Ok(remote) => remote,
            Err(e) => {
                state.status = None;
                return Err(e.into());
            }
        };

        let mut working = self.registry.local_snapshot();
        let remote_first = match merge::merge_remote(
            &mut working,
            remote,
            &self.cipher,
            &self.registry,
            self.resolver.as_ref(),
        ) {
            Ok(remote_first) => remote_first,
            Err(e) => {
                state.status = None;
                return Err(e.into());
            }
        };
        state.remote_first = remote_first;
        advance(&mut state.status, ConfigStatus::Fetched);

        self.report_and_listen(&mut state, &working, true).await;
        Ok(())
    }

    /// Fetch the remote configuration and merge it into the caller-owned
    /// property map, publishing the result through the registry.
    ///
    /// Used by host integrations that maintain their own property source and
    /// only need the merge semantics; `init` must have run first so the
    /// identity is known. Returns the remote-first precedence flag.
    pub async fn merge_remote_properties(
        &self,
        properties: &mut HashMap<String, String>,
    ) -> Result<bool> {
        let identity = self.identity.get().ok_or(ConfigError::NotInitialized)?;
        if !identity.remote_enabled {
            return Ok(false);
        }
        let remote = fetcher::fetch_all_configs(
            &self.client,
            &identity.base_urls,
            &identity.app,
            &identity.env,
            &identity.version,
            fetcher::DEFAULT_RETRY_BUDGET,
        )
        .await?;

        let mut state = self.state.lock().await;
        let remote_first = merge::merge_remote(
            properties,
            remote,
            &self.cipher,
            &self.registry,
            self.resolver.as_ref(),
        )?;
        state.remote_first = remote_first;
        advance(&mut state.status, ConfigStatus::Fetched);
        Ok(remote_first)
    }

    /// Report the final property set to every known server endpoint.
    ///
    /// A no-op until the remote configuration has been fetched. `print`
    /// additionally emits the sorted final listing for operator review.
    pub async fn sync_config_to_server(
        self: &Arc<Self>,
        properties: &HashMap<String, String>,
        print: bool,
    ) {
        let mut state = self.state.lock().await;
        self.report_and_listen(&mut state, properties, print).await;
    }

    async fn report_and_listen(
        self: &Arc<Self>,
        state: &mut SyncState,
        properties: &HashMap<String, String>,
        print: bool,
    ) {
        let Some(identity) = self.identity.get() else {
            return;
        };
        if !matches!(
            state.status,
            Some(ConfigStatus::Fetched | ConfigStatus::Uploaded)
        ) {
            return;
        }

        let masked = reporter::mask_properties(properties);
        if print {
            reporter::log_final_config(&masked);
        }
        let report = FinalConfigReport {
            node_id: self.node_id.clone(),
            app_name: identity.app.clone(),
            env: identity.env.clone(),
            version: identity.version.clone(),
            springboot: self.runtime_flavor.wire_flag().to_string(),
            sync_interval_seconds: identity.sync_interval.as_secs().to_string(),
            sync_type: identity.sync_type.as_str().to_string(),
            serverip: self
                .registry
                .get(settings::SERVER_IP_PROPERTY)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            serverport: self.registry.get(settings::SERVER_PORT_PROPERTY),
            properties: masked,
        };
        reporter::sync_to_server(&self.client, &identity.base_urls, &report).await;

        // The change listener is registered exactly once, after the first
        // successful report.
        if state.status == Some(ConfigStatus::Fetched) {
            match listener::create_listener(identity.sync_type, &self.registry) {
                Ok(listener) => {
                    if let Err(e) = listener.register(self.clone()).await {
                        warn!("register {} listener failed: {e:#}", listener.name());
                    } else {
                        state.listener = Some(listener);
                    }
                }
                Err(e) => warn!("create change listener failed: {e}"),
            }
            advance(&mut state.status, ConfigStatus::Uploaded);
        }
    }

    /// Apply a live update batch pushed by a change listener.
    ///
    /// The whole batch is decrypted before the first store write, so a bad
    /// value never leaves a partially applied batch behind. Every key is
    /// written through, stale or not (duplicate notifications simply re-apply
    /// the same values), and each handler receives the full batch; a failing
    /// handler never blocks its siblings.
    pub async fn update_config(self: &Arc<Self>, batch: HashMap<String, String>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.status.is_none() {
            return Err(ConfigError::NotInitialized.into());
        }

        let mut decrypted = HashMap::with_capacity(batch.len());
        for (key, value) in batch {
            if value == settings::OVERRIDE_SENTINEL {
                continue;
            }
            let value = self.cipher.decrypt_if_tagged(&value)?;
            decrypted.insert(key, value);
        }

        for (key, value) in &decrypted {
            let previous = self.registry.put_managed(key, value);
            info!(
                "update config, key: {key}, oldValue: {}, newValue: {}",
                reporter::hide_sensitive(key, previous.as_deref().unwrap_or_default()),
                reporter::hide_sensitive(key, value)
            );
        }

        // Handler discovery runs once, on the first delivered batch.
        let handlers = state
            .handlers
            .get_or_insert_with(|| self.handler_provider.discover());
        for handler in handlers.iter() {
            if let Err(e) = handler.on_config_changed(&decrypted) {
                warn!("config change handler [{}] failed: {e:#}", handler.name());
            }
        }
        Ok(())
    }

    /// Probe server reachability.
    ///
    /// Each attempt walks every base URL; any success ends the probe. Failed
    /// attempts are retried up to `retries` extra times with a short delay,
    /// and the final result reflects the last real outcome.
    pub async fn ping_cc_server(&self, retries: u32) -> bool {
        let Some(identity) = self.identity.get() else {
            return false;
        };
        for attempt in 0..=retries {
            for base_url in &identity.base_urls {
                let url = format!("{base_url}{}", settings::DEFAULT_PING_URI);
                match self
                    .client
                    .get(&url)
                    .timeout(PING_TIMEOUT)
                    .send()
                    .await
                {
                    Ok(response) if response.status().is_success() => return true,
                    Ok(response) => {
                        warn!("ping [{url}] failed: HTTP {}", response.status());
                    }
                    Err(e) => warn!("ping [{url}] failed: {e}"),
                }
            }
            if attempt < retries {
                tokio::time::sleep(PING_RETRY_DELAY).await;
            }
        }
        false
    }

    /// Release the change listener. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(listener) = state.listener.take() {
            listener.unregister().await;
        }
        info!("config context closed");
    }
}
