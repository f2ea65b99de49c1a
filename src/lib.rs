//! # Configcenter Client
//!
//! Client-side synchronization engine for a centralized configuration
//! service. At startup it fetches the application's remote configuration
//! (with endpoint failover and retry), merges it with the local property set
//! under a precedence rule, resolves `${...}` placeholders, decrypts
//! `{Cipher}` / `{Cipher:RSA}` protected values, and reports the final
//! masked set back to the server. Afterwards a change listener (HTTP push or
//! ZooKeeper watch) keeps the property registry current and notifies
//! registered change handlers.
//!
//! [`context::ConfigContext`] is the entry point; everything else supports
//! it and is re-exported for hosts that need the individual pieces.

pub mod context;
pub mod crypto;
pub mod error;
pub mod fetcher;
pub mod listener;
pub mod merge;
pub mod placeholder;
pub mod registry;
pub mod reporter;
pub mod settings;
pub mod telemetry;

pub use context::{ConfigContext, ConfigStatus, RuntimeFlavor};
pub use error::ConfigError;
pub use listener::{ChangeListener, HttpChangeListener, ZookeeperChangeListener};
pub use registry::{
    ConfigChangeHandler, HandlerProvider, PropertyRegistry, StaticHandlerProvider,
};
pub use settings::SyncType;
