//! # ZooKeeper Watch Strategy
//!
//! Watches the per-application config node and turns data changes into
//! update batches. The ZooKeeper client is blocking, so the whole watch loop
//! runs on a dedicated thread; batches are delivered back into the async
//! update path through a captured runtime handle.
//!
//! The node payload is a flat JSON object. The first read primes the change
//! baseline without delivering anything (startup already merged the full
//! set); each subsequent read diffs against the baseline and delivers only
//! keys whose value changed or appeared. Duplicate or stale wakeups diff to
//! an empty batch and are dropped.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};
use zookeeper::{WatchedEvent, ZkError, ZooKeeper};

use crate::context::ConfigContext;
use crate::listener::ChangeListener;

const WATCH_ROOT: &str = "/jeesuite-configs";
const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

enum Signal {
    Changed,
    Shutdown,
}

pub struct ZookeeperChangeListener {
    servers: String,
    shutdown: Mutex<Option<Sender<Signal>>>,
}

impl ZookeeperChangeListener {
    #[must_use]
    pub fn new(servers: String) -> Self {
        Self {
            servers,
            shutdown: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChangeListener for ZookeeperChangeListener {
    fn name(&self) -> &'static str {
        "zookeeper"
    }

    async fn register(&self, context: Arc<ConfigContext>) -> Result<()> {
        let path = format!("{WATCH_ROOT}/{}/{}", context.env()?, context.app()?);
        let servers = self.servers.clone();
        let handle = tokio::runtime::Handle::current();
        let (tx, rx) = mpsc::channel();
        {
            let mut guard = self
                .shutdown
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = Some(tx.clone());
        }
        std::thread::Builder::new()
            .name("configcenter-zk-watch".to_string())
            .spawn(move || {
                if let Err(e) = watch_loop(&servers, &path, &tx, &rx, &handle, context) {
                    error!("zookeeper listener terminated: {e:#}");
                }
            })
            .context("failed to spawn zookeeper watch thread")?;
        Ok(())
    }

    async fn unregister(&self) {
        let sender = {
            let mut guard = self
                .shutdown
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.take()
        };
        if let Some(sender) = sender {
            let _ = sender.send(Signal::Shutdown);
            info!("zookeeper listener unregistered");
        }
    }
}

fn watch_loop(
    servers: &str,
    path: &str,
    tx: &Sender<Signal>,
    rx: &Receiver<Signal>,
    handle: &tokio::runtime::Handle,
    context: Arc<ConfigContext>,
) -> Result<()> {
    let zk = ZooKeeper::connect(servers, SESSION_TIMEOUT, |_event: WatchedEvent| {})
        .map_err(|e| anyhow!("zookeeper connect to [{servers}] failed: {e:?}"))?;
    info!("zookeeper listener watching [{path}]");

    let mut baseline: Option<HashMap<String, String>> = None;
    loop {
        let wakeup = tx.clone();
        let current = match zk.get_data_w(path, move |_event: WatchedEvent| {
            let _ = wakeup.send(Signal::Changed);
        }) {
            Ok((data, _stat)) => Some(parse_node(path, &data)),
            Err(ZkError::NoNode) => {
                // Node not published yet; re-arm on its creation instead.
                let wakeup = tx.clone();
                let _ = zk.exists_w(path, move |_event: WatchedEvent| {
                    let _ = wakeup.send(Signal::Changed);
                });
                None
            }
            Err(e) => return Err(anyhow!("zookeeper read of [{path}] failed: {e:?}")),
        };

        if let Some(current) = current {
            match baseline.take() {
                None => baseline = Some(current),
                Some(previous) => {
                    let batch = changed_entries(&previous, &current);
                    baseline = Some(current);
                    if !batch.is_empty() {
                        let context = context.clone();
                        let outcome =
                            handle.block_on(async move { context.update_config(batch).await });
                        if let Err(e) = outcome {
                            warn!("zookeeper update delivery failed: {e:#}");
                        }
                    }
                }
            }
        }

        match rx.recv() {
            Ok(Signal::Changed) => {}
            Ok(Signal::Shutdown) | Err(_) => break,
        }
    }

    let _ = zk.close();
    info!("zookeeper listener stopped");
    Ok(())
}

/// Decode the node payload, a flat JSON object. Unreadable payloads are
/// treated as empty so a bad publish cannot kill the watch.
fn parse_node(path: &str, data: &[u8]) -> HashMap<String, String> {
    if data.is_empty() {
        return HashMap::new();
    }
    match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(data) {
        Ok(payload) => payload
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect(),
        Err(e) => {
            warn!("zookeeper node [{path}] payload is not a JSON object: {e}");
            HashMap::new()
        }
    }
}

/// Keys whose value appeared or changed. Removed keys are not propagated;
/// the batch path has no removal semantics.
fn changed_entries(
    previous: &HashMap<String, String>,
    current: &HashMap<String, String>,
) -> HashMap<String, String> {
    current
        .iter()
        .filter(|(key, value)| previous.get(*key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
