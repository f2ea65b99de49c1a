//! # Cipher Layer
//!
//! Decryption of tagged configuration values.
//!
//! A value carrying the `{Cipher:RSA}` prefix is decrypted with the
//! asymmetric private key; a value carrying the `{Cipher}` prefix is
//! decrypted with the symmetric secret obtained from the remote fetch.
//! Untagged values pass through unchanged.
//!
//! The private key and the secret are written once during the
//! single-threaded init/fetch phase and read many times afterwards, so both
//! live in write-once cells. Key loading failures are logged and leave the
//! key unset; an RSA-tagged value then fails only if actually requested.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use tracing::{error, info};

use crate::error::ConfigError;
use crate::registry::PropertyRegistry;
use crate::settings::{self, RSA_PREFIX, SYMMETRIC_PREFIX};

/// Translates a logical keystore location into a filesystem path.
///
/// The `classpath:` scheme is a logical indirection inherited from the wire
/// protocol; the host process supplies the translation when its resources do
/// not live on the plain filesystem.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, location: &str) -> Result<PathBuf>;
}

/// Default resolver: `classpath:` locations are taken relative to the
/// current working directory, everything else is used as-is.
#[derive(Debug, Default)]
pub struct FsResourceResolver;

impl ResourceResolver for FsResourceResolver {
    fn resolve(&self, location: &str) -> Result<PathBuf> {
        if location.to_lowercase().starts_with("classpath") {
            let rest = location
                .split_once(':')
                .map(|(_, rest)| rest)
                .unwrap_or(location);
            let base = std::env::current_dir().context("resolve working directory")?;
            return Ok(base.join(rest.trim_start_matches('/')));
        }
        Ok(PathBuf::from(location))
    }
}

/// Keystore coordinates gathered from settings (and possibly supplied by the
/// remote configuration itself).
#[derive(Debug, Clone, Default)]
pub struct KeyStoreCoordinates {
    pub location: Option<String>,
    pub store_type: String,
    pub store_password: Option<String>,
    pub alias: Option<String>,
    pub key_password: Option<String>,
}

impl KeyStoreCoordinates {
    /// Gather coordinates from the layered registry.
    pub fn from_registry(registry: &PropertyRegistry) -> Self {
        let store_password = settings::lookup(registry, settings::KEYSTORE_PASSWORD);
        let key_password = settings::lookup(registry, settings::KEYSTORE_KEY_PASSWORD)
            .or_else(|| store_password.clone());
        Self {
            location: settings::lookup(registry, settings::KEYSTORE_LOCATION),
            store_type: settings::lookup_or(registry, settings::KEYSTORE_TYPE, "PEM"),
            store_password,
            alias: settings::lookup(registry, settings::KEYSTORE_ALIAS),
            key_password,
        }
    }

    /// Overlay coordinates supplied by the remote configuration. Remote values
    /// win over the locally gathered ones when present.
    pub fn apply_remote(&mut self, remote: &HashMap<String, String>) {
        if let Some(v) = remote.get(settings::KEYSTORE_LOCATION) {
            self.location = Some(v.clone());
        }
        if let Some(v) = remote.get(settings::KEYSTORE_TYPE) {
            self.store_type = v.clone();
        }
        if let Some(v) = remote.get(settings::KEYSTORE_PASSWORD) {
            self.store_password = Some(v.clone());
        }
        if let Some(v) = remote.get(settings::KEYSTORE_ALIAS) {
            self.alias = Some(v.clone());
        }
        if let Some(v) = remote.get(settings::KEYSTORE_KEY_PASSWORD) {
            self.key_password = Some(v.clone());
        } else if let Some(v) = remote.get(settings::KEYSTORE_PASSWORD) {
            self.key_password = Some(v.clone());
        }
    }

    /// Passwords themselves may arrive as tagged values; decode them before
    /// the keystore is opened. Failure here is fatal for the caller.
    pub fn decode_passwords(&mut self, cipher: &ValueCipher) -> Result<(), ConfigError> {
        if let Some(pass) = self.store_password.take() {
            self.store_password = Some(cipher.decrypt_if_tagged(&pass)?);
        }
        if let Some(pass) = self.key_password.take() {
            self.key_password = Some(cipher.decrypt_if_tagged(&pass)?);
        }
        Ok(())
    }

    /// All four material coordinates must be present before a load is
    /// attempted; anything less is treated as "no keystore configured".
    #[must_use]
    pub fn is_complete(&self) -> bool {
        fn present(v: &Option<String>) -> bool {
            v.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        present(&self.location)
            && present(&self.store_password)
            && present(&self.alias)
            && present(&self.key_password)
    }
}

/// Cipher layer: write-once key material plus prefix-dispatched decrypt.
#[derive(Debug, Default)]
pub struct ValueCipher {
    private_key: OnceLock<RsaPrivateKey>,
    secret: OnceLock<String>,
}

impl ValueCipher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the symmetric secret obtained from the remote fetch.
    /// The first write wins; the secret is never replaced.
    pub fn set_secret(&self, secret: String) {
        let _ = self.secret.set(secret);
    }

    #[must_use]
    pub fn has_private_key(&self) -> bool {
        self.private_key.get().is_some()
    }

    #[must_use]
    pub fn has_secret(&self) -> bool {
        self.secret.get().is_some()
    }

    /// Load the RSA private key named by the keystore coordinates.
    ///
    /// PEM keys are accepted as PKCS#8, PKCS#1, or password-encrypted PKCS#8
    /// (decrypted with the `keyPassword` coordinate). A load failure is
    /// logged and leaves the key unset. Once loaded, the key is never
    /// reloaded or replaced.
    pub fn load_private_key(&self, coords: &KeyStoreCoordinates, resolver: &dyn ResourceResolver) {
        if self.has_private_key() {
            return;
        }
        let location = coords.location.as_deref().unwrap_or_default();
        // Banner prints even for an incomplete coordinate set.
        info!(
            "begin to init RSA private key, location: {}, type: {}, alias: {}, storePassword: ****, keyPassword: ****",
            location,
            coords.store_type,
            coords.alias.as_deref().unwrap_or_default()
        );
        if !coords.is_complete() {
            return;
        }

        match self.try_load(coords, resolver) {
            Ok(key) => {
                let _ = self.private_key.set(key);
                info!("init RSA private key OK");
            }
            Err(e) => {
                error!("load RSA private key error, location: {}, error: {:#}", location, e);
            }
        }
    }

    fn try_load(
        &self,
        coords: &KeyStoreCoordinates,
        resolver: &dyn ResourceResolver,
    ) -> Result<RsaPrivateKey> {
        let location = coords.location.as_deref().unwrap_or_default();
        let path = resolver.resolve(location)?;
        let pem = std::fs::read_to_string(&path)
            .with_context(|| format!("read keystore {}", path.display()))?;

        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(&pem) {
            return Ok(key);
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(&pem) {
            return Ok(key);
        }
        let password = coords.key_password.as_deref().unwrap_or_default();
        RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, password)
            .with_context(|| format!("parse keystore {} ({})", path.display(), coords.store_type))
    }

    /// Dispatch on the value's tag prefix and decrypt accordingly.
    /// Untagged values are returned unchanged (identity law).
    pub fn decrypt_if_tagged(&self, value: &str) -> Result<String, ConfigError> {
        if let Some(payload) = value.strip_prefix(RSA_PREFIX) {
            let key = self.private_key.get().ok_or(ConfigError::MissingPrivateKey)?;
            let ciphertext = general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| ConfigError::Decrypt(e.to_string()))?;
            let plaintext = key
                .decrypt(Pkcs1v15Encrypt, &ciphertext)
                .map_err(|e| ConfigError::Decrypt(e.to_string()))?;
            String::from_utf8(plaintext).map_err(|e| ConfigError::Decrypt(e.to_string()))
        } else if let Some(payload) = value.strip_prefix(SYMMETRIC_PREFIX) {
            let secret = self.secret.get().ok_or(ConfigError::MissingSecret)?;
            symmetric::decrypt(secret, payload.trim())
        } else {
            Ok(value.to_string())
        }
    }
}

/// Symmetric scheme shared with the config server: AES-256-GCM keyed by
/// SHA-256 of the secret, payload transported as `base64(nonce || ciphertext)`.
pub mod symmetric {
    use aes_gcm::aead::{Aead, KeyInit, OsRng};
    use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
    use base64::{engine::general_purpose, Engine as _};
    use sha2::{Digest, Sha256};

    use crate::error::ConfigError;

    const NONCE_LEN: usize = 12;

    fn cipher_for(secret: &str) -> Aes256Gcm {
        let digest = Sha256::digest(secret.as_bytes());
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest))
    }

    /// Encrypt a plaintext under the shared secret. Operators use this to
    /// produce `{Cipher}` values for the config server.
    pub fn encrypt(secret: &str, plaintext: &str) -> Result<String, ConfigError> {
        let cipher = cipher_for(secret);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| ConfigError::Decrypt("symmetric encrypt failure".to_string()))?;
        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(payload))
    }

    pub fn decrypt(secret: &str, encoded: &str) -> Result<String, ConfigError> {
        let payload = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ConfigError::Decrypt(e.to_string()))?;
        if payload.len() <= NONCE_LEN {
            return Err(ConfigError::Decrypt("payload too short".to_string()));
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = cipher_for(secret)
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ConfigError::Decrypt("symmetric decrypt failure".to_string()))?;
        String::from_utf8(plaintext).map_err(|e| ConfigError::Decrypt(e.to_string()))
    }
}

/// Convenience used by tests and by hosts that need to detect tagged values
/// without decrypting them.
#[must_use]
pub fn is_tagged(value: &str) -> bool {
    value.starts_with(RSA_PREFIX) || value.starts_with(SYMMETRIC_PREFIX)
}
