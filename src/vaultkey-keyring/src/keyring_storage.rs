//! Persistence of software keys in the OS keyring.
//!
//! Bridges the `keyring` crate (macOS Keychain, Windows Credential Manager,
//! Linux Secret Service) with [`crate::SoftwareStore`], so software keys and
//! their chains survive restarts.
//!
//! Each alias uses two entries under the configured service:
//! - `{alias}`: the key as JSON (algorithm, policy, hex secret scalar)
//! - `{alias}#chain`: the certificate chain as a JSON array of hex strings
//!
//! Signing still happens in process memory; this is storage-at-rest only.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use vaultkey_crypto::SignatureAlgorithm;

use crate::error::KeyringError;
use crate::types::AccessPolicy;

/// Serialized form of a software key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedKey {
    pub algorithm: SignatureAlgorithm,
    pub policy: AccessPolicy,
    pub secret: String,
}

/// OS keyring access for one service name.
#[derive(Debug, Clone)]
pub struct KeyringPersistence {
    service: String,
}

impl KeyringPersistence {
    /// Persist under `service` (e.g. `"vaultkey"`).
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Service name entries are stored under.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, name: &str) -> Result<Entry, KeyringError> {
        Entry::new(&self.service, name)
            .map_err(|e| KeyringError::store_access(format!("Keyring init failed: {e}")))
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, KeyringError> {
        match self.entry(name)?.get_secret() {
            Ok(bytes) => Ok(Some(bytes)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeyringError::store_access(format!("Failed to read {name}: {e}"))),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), KeyringError> {
        self.entry(name)?
            .set_secret(bytes)
            .map_err(|e| KeyringError::store_access(format!("Failed to store {name}: {e}")))
    }

    fn remove(&self, name: &str) -> Result<(), KeyringError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeyringError::store_access(format!("Failed to delete {name}: {e}"))),
        }
    }

    pub(crate) fn save_key(&self, alias: &str, key: &PersistedKey) -> Result<(), KeyringError> {
        let bytes = serde_json::to_vec(key)
            .map_err(|e| KeyringError::store_access(format!("Failed to encode key: {e}")))?;
        self.write(alias, &bytes)?;
        tracing::debug!(service = %self.service, alias = %alias, "Software key persisted to OS keyring");
        Ok(())
    }

    pub(crate) fn load_key(&self, alias: &str) -> Result<Option<PersistedKey>, KeyringError> {
        let Some(bytes) = self.read(alias)? else {
            return Ok(None);
        };
        let key = serde_json::from_slice(&bytes)
            .map_err(|e| KeyringError::store_access(format!("Corrupt keyring entry {alias}: {e}")))?;
        Ok(Some(key))
    }

    pub(crate) fn save_chain(&self, alias: &str, chain: &[Vec<u8>]) -> Result<(), KeyringError> {
        let encoded: Vec<String> = chain.iter().map(hex::encode).collect();
        let bytes = serde_json::to_vec(&encoded)
            .map_err(|e| KeyringError::store_access(format!("Failed to encode chain: {e}")))?;
        self.write(&chain_name(alias), &bytes)
    }

    pub(crate) fn load_chain(&self, alias: &str) -> Result<Option<Vec<Vec<u8>>>, KeyringError> {
        let Some(bytes) = self.read(&chain_name(alias))? else {
            return Ok(None);
        };
        let encoded: Vec<String> = serde_json::from_slice(&bytes)
            .map_err(|e| KeyringError::store_access(format!("Corrupt chain entry {alias}: {e}")))?;
        let chain = encoded
            .iter()
            .map(hex::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KeyringError::store_access(format!("Corrupt chain entry {alias}: {e}")))?;
        Ok(Some(chain))
    }

    /// Remove the key entry for `alias`; its chain entry stays.
    pub(crate) fn delete(&self, alias: &str) -> Result<(), KeyringError> {
        self.remove(alias)
    }
}

fn chain_name(alias: &str) -> String {
    format!("{alias}#chain")
}
