//! Software-only secure store.
//!
//! WARNING: This store provides NO hardware binding. Private keys live in
//! process memory (and, with `keyring-storage`, in the OS keyring at rest).
//!
//! Use only for:
//! - Development and testing
//! - Hosts without secure hardware
//! - Keys whose policy needs no user authentication
//!
//! The store refuses policies that gate keys on user authentication and
//! cannot attest keys.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use vaultkey_crypto::{EcSignature, EcSigningKey, SignatureAlgorithm};

use crate::error::KeyringError;
use crate::ops::NativeAccessDescriptor;
use crate::platform::PlatformCapabilities;
use crate::store::{ensure_algorithm, GenerateRequest, GeneratedKey, SecureStore, StoredKey};
use crate::types::{AccessPolicy, AuthContext};

#[cfg(feature = "keyring-storage")]
use crate::keyring_storage::{KeyringPersistence, PersistedKey};

#[derive(Clone)]
struct SoftwareEntry {
    key: EcSigningKey,
    policy: AccessPolicy,
}

/// In-memory software key store.
#[derive(Default)]
pub struct SoftwareStore {
    keys: RwLock<HashMap<String, SoftwareEntry>>,
    chains: RwLock<HashMap<String, Vec<Vec<u8>>>>,
    #[cfg(feature = "keyring-storage")]
    persistence: Option<KeyringPersistence>,
}

impl std::fmt::Debug for SoftwareStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareStore").finish_non_exhaustive()
    }
}

fn poisoned() -> KeyringError {
    KeyringError::store_access("Lock poisoned")
}

impl SoftwareStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        tracing::warn!("SoftwareStore: NO HARDWARE BINDING, keys live in process memory");
        Self::default()
    }

    /// Create a store that persists keys and chains in the OS keyring under
    /// `service`.
    #[cfg(feature = "keyring-storage")]
    #[must_use]
    pub fn with_keyring(service: impl Into<String>) -> Self {
        let persistence = KeyringPersistence::new(service);
        tracing::info!(service = %persistence.service(), "SoftwareStore: persisting to OS keyring");
        Self {
            persistence: Some(persistence),
            ..Self::default()
        }
    }

    fn entry(&self, alias: &str) -> Result<Option<SoftwareEntry>, KeyringError> {
        if let Some(entry) = self.keys.read().map_err(|_| poisoned())?.get(alias) {
            return Ok(Some(entry.clone()));
        }

        #[cfg(feature = "keyring-storage")]
        if let Some(persistence) = &self.persistence {
            if let Some(persisted) = persistence.load_key(alias)? {
                let secret = hex::decode(&persisted.secret)
                    .map_err(|e| KeyringError::store_access(format!("Corrupt key {alias}: {e}")))?;
                let entry = SoftwareEntry {
                    key: EcSigningKey::from_bytes(persisted.algorithm, &secret)?,
                    policy: persisted.policy,
                };
                self.keys
                    .write()
                    .map_err(|_| poisoned())?
                    .insert(alias.to_string(), entry.clone());
                tracing::debug!(alias = %alias, "Software key loaded from OS keyring");
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    #[cfg(feature = "keyring-storage")]
    fn persist(&self, alias: &str, entry: &SoftwareEntry) -> Result<(), KeyringError> {
        if let Some(persistence) = &self.persistence {
            persistence.save_key(
                alias,
                &PersistedKey {
                    algorithm: entry.key.algorithm(),
                    policy: entry.policy,
                    secret: hex::encode(entry.key.to_bytes()),
                },
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl SecureStore for SoftwareStore {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::software()
    }

    async fn contains(&self, alias: &str) -> Result<bool, KeyringError> {
        Ok(self.entry(alias)?.is_some())
    }

    async fn delete(&self, alias: &str) -> Result<(), KeyringError> {
        let removed = self.keys.write().map_err(|_| poisoned())?.remove(alias).is_some();

        #[cfg(feature = "keyring-storage")]
        if let Some(persistence) = &self.persistence {
            persistence.delete(alias)?;
        }

        if removed {
            tracing::info!(alias = %alias, "Software key deleted");
        }
        Ok(())
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedKey, KeyringError> {
        if request.descriptor != NativeAccessDescriptor::SoftwareProtection
            || request.policy.requires_user_authentication
        {
            return Err(KeyringError::policy_unsupported(
                "software store cannot gate keys on user authentication",
            ));
        }
        if request.attestation_challenge.is_some() {
            return Err(KeyringError::attestation_unavailable(
                "software keys have no hardware attestation",
            ));
        }

        let entry = SoftwareEntry {
            key: EcSigningKey::generate(request.algorithm),
            policy: request.policy,
        };
        let public_key = entry.key.public_key();

        #[cfg(feature = "keyring-storage")]
        self.persist(&request.alias, &entry)?;

        self.keys
            .write()
            .map_err(|_| poisoned())?
            .insert(request.alias.clone(), entry);

        tracing::info!(
            alias = %request.alias,
            algorithm = %request.algorithm,
            "Software key generated (no hardware binding)"
        );

        Ok(GeneratedKey {
            public_key,
            attestation_chain: Vec::new(),
        })
    }

    async fn load(&self, alias: &str) -> Result<Option<StoredKey>, KeyringError> {
        Ok(self.entry(alias)?.map(|entry| StoredKey {
            algorithm: entry.key.algorithm(),
            public_key: entry.key.public_key(),
            policy: entry.policy,
        }))
    }

    async fn sign(
        &self,
        alias: &str,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        _auth: Option<&AuthContext>,
    ) -> Result<EcSignature, KeyringError> {
        let entry = self
            .entry(alias)?
            .ok_or_else(|| KeyringError::key_not_found(alias))?;
        ensure_algorithm(alias, entry.key.algorithm(), algorithm)?;

        entry
            .key
            .sign(data)
            .map_err(|e| KeyringError::signing(e.to_string()))
    }

    async fn store_chain(&self, alias: &str, chain: &[Vec<u8>]) -> Result<(), KeyringError> {
        #[cfg(feature = "keyring-storage")]
        if let Some(persistence) = &self.persistence {
            persistence.save_chain(alias, chain)?;
        }

        self.chains
            .write()
            .map_err(|_| poisoned())?
            .insert(alias.to_string(), chain.to_vec());
        Ok(())
    }

    async fn load_chain(&self, alias: &str) -> Result<Option<Vec<Vec<u8>>>, KeyringError> {
        if let Some(chain) = self.chains.read().map_err(|_| poisoned())?.get(alias) {
            return Ok(Some(chain.clone()));
        }

        #[cfg(feature = "keyring-storage")]
        if let Some(persistence) = &self.persistence {
            return persistence.load_chain(alias);
        }

        Ok(None)
    }
}
