//! # Error Types
//!
//! Fatal configuration errors raised by the synchronization engine.
//!
//! Transient conditions (a single endpoint failing, a handler raising during
//! dispatch) are logged and absorbed where they occur; only the failures that
//! must abort the surrounding operation surface through `ConfigError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is blank or absent.
    #[error("config[{0}] is required")]
    MissingSetting(String),

    /// A `{Cipher:RSA}` value was encountered but no private key has been loaded.
    #[error("rsa private key not initialized")]
    MissingPrivateKey,

    /// A `{Cipher}` value was encountered but the remote fetch supplied no secret.
    #[error("config[jeesuite.configcenter.encrypt-secret] is required")]
    MissingSecret,

    /// Every base URL failed across the whole retry budget.
    #[error("fetch remote config error")]
    FetchFailed,

    /// A tagged value could not be decrypted with the available key material.
    #[error("decrypt error: {0}")]
    Decrypt(String),

    /// An entry point that requires `init` was called before it.
    #[error("configcenter context not initialized")]
    NotInitialized,
}
