//! Software keys with hardware-store semantics.
//!
//! [`EmulatedHardwareStore`] behaves like a secure element from the caller's
//! side: it accepts the native descriptor for its backend, refuses to sign
//! authentication-gated keys without a live [`AuthContext`], consumes per-use
//! contexts, and attests keys with a statement chain bound to the caller's
//! challenge. Key material stays in process memory, so this is for hosts
//! without secure hardware and for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use vaultkey_crypto::{EcSignature, EcSigningKey, SignatureAlgorithm};

use crate::attestation::{statement_chain, AttestationStatement};
use crate::clock::{Clock, SystemClock};
use crate::error::KeyringError;
use crate::ops::NativeAccessDescriptor;
use crate::platform::PlatformCapabilities;
use crate::store::{ensure_algorithm, GenerateRequest, GeneratedKey, SecureStore, StoredKey};
use crate::types::{AccessPolicy, AuthContext, BackendKind};

struct EmulatedEntry {
    key: EcSigningKey,
    policy: AccessPolicy,
}

#[derive(Default)]
struct EmulatedState {
    keys: HashMap<String, EmulatedEntry>,
    chains: HashMap<String, Vec<Vec<u8>>>,
    consumed_contexts: HashSet<String>,
}

/// Emulated Android Keystore or Secure Enclave.
pub struct EmulatedHardwareStore {
    capabilities: PlatformCapabilities,
    clock: Arc<dyn Clock>,
    attestation_key: EcSigningKey,
    state: RwLock<EmulatedState>,
}

impl std::fmt::Debug for EmulatedHardwareStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedHardwareStore")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn poisoned() -> KeyringError {
    KeyringError::store_access("Lock poisoned")
}

impl EmulatedHardwareStore {
    /// Create a store with `capabilities`, using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfiguration`] if the capabilities
    /// describe a software backend.
    pub fn new(capabilities: PlatformCapabilities) -> Result<Self, KeyringError> {
        Self::with_clock(capabilities, Arc::new(SystemClock))
    }

    /// Create a store with `capabilities` that judges context validity
    /// against `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfiguration`] if the capabilities
    /// describe a software backend.
    pub fn with_clock(
        capabilities: PlatformCapabilities,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyringError> {
        if capabilities.backend == BackendKind::Software {
            return Err(KeyringError::invalid_configuration(
                "emulated hardware store needs a hardware backend kind",
            ));
        }

        tracing::info!(
            backend = %capabilities.backend,
            attestation = capabilities.attestation,
            "EmulatedHardwareStore: created (keys in process memory)"
        );

        Ok(Self {
            capabilities,
            clock,
            attestation_key: EcSigningKey::generate(SignatureAlgorithm::Es256),
            state: RwLock::new(EmulatedState::default()),
        })
    }

    fn check_descriptor(&self, descriptor: &NativeAccessDescriptor) -> Result<(), KeyringError> {
        match (self.capabilities.backend, descriptor) {
            (BackendKind::HardwareKeystore, NativeAccessDescriptor::Keystore(spec)) => {
                if spec.strongbox && !self.capabilities.strongbox {
                    return Err(KeyringError::key_generation("StrongBox unavailable"));
                }
                Ok(())
            },
            (BackendKind::SecureEnclave, NativeAccessDescriptor::AccessControl(_)) => Ok(()),
            (backend, descriptor) => Err(KeyringError::policy_unsupported(format!(
                "{backend} store cannot apply {descriptor:?}"
            ))),
        }
    }

    fn authorize(
        &self,
        alias: &str,
        policy: &AccessPolicy,
        auth: Option<&AuthContext>,
        consumed: &mut HashSet<String>,
    ) -> Result<(), KeyringError> {
        if !policy.requires_user_authentication {
            return Ok(());
        }

        let Some(context) = auth else {
            tracing::debug!(alias = %alias, "Sign rejected: no authentication context");
            return Err(KeyringError::AuthenticationRequired);
        };
        if context.backend != self.capabilities.backend {
            return Err(KeyringError::AuthenticationRequired);
        }

        let now = self.clock.now();
        if policy.is_per_use() {
            // Each context unlocks exactly one operation.
            if now < context.authenticated_at || !consumed.insert(context.id.clone()) {
                tracing::debug!(alias = %alias, "Sign rejected: per-use context already spent");
                return Err(KeyringError::AuthenticationRequired);
            }
            return Ok(());
        }

        let validity = chrono::Duration::seconds(i64::from(policy.auth_timeout_seconds));
        if now < context.authenticated_at || now >= context.authenticated_at + validity {
            tracing::debug!(alias = %alias, "Sign rejected: authentication expired");
            return Err(KeyringError::AuthenticationRequired);
        }
        Ok(())
    }
}

#[async_trait]
impl SecureStore for EmulatedHardwareStore {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities.clone()
    }

    async fn contains(&self, alias: &str) -> Result<bool, KeyringError> {
        Ok(self.state.read().map_err(|_| poisoned())?.keys.contains_key(alias))
    }

    async fn delete(&self, alias: &str) -> Result<(), KeyringError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let removed = state.keys.remove(alias).is_some();

        if removed {
            tracing::info!(alias = %alias, "Emulated hardware key deleted");
        }
        Ok(())
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedKey, KeyringError> {
        self.check_descriptor(&request.descriptor)?;

        if request.attestation_challenge.is_some() && !self.capabilities.attestation {
            return Err(KeyringError::attestation_unavailable(format!(
                "{} store has no attestation",
                self.capabilities.backend
            )));
        }
        if self.capabilities.backend == BackendKind::SecureEnclave
            && request.algorithm != SignatureAlgorithm::Es256
        {
            return Err(KeyringError::key_generation(format!(
                "secure enclave only supports ES256, not {}",
                request.algorithm
            )));
        }

        let key = EcSigningKey::generate(request.algorithm);
        let public_key = key.public_key();

        let attestation_chain = match &request.attestation_challenge {
            Some(challenge) => {
                let statement = AttestationStatement::issue(
                    challenge,
                    public_key.clone(),
                    self.attestation_key.public_key(),
                    self.clock.now(),
                    |payload| Ok(self.attestation_key.sign(payload)?),
                )?;
                statement_chain(&statement)?
            },
            None => Vec::new(),
        };

        self.state.write().map_err(|_| poisoned())?.keys.insert(
            request.alias.clone(),
            EmulatedEntry {
                key,
                policy: request.policy,
            },
        );

        tracing::info!(
            alias = %request.alias,
            algorithm = %request.algorithm,
            backend = %self.capabilities.backend,
            attested = !attestation_chain.is_empty(),
            "Emulated hardware key generated"
        );

        Ok(GeneratedKey {
            public_key,
            attestation_chain,
        })
    }

    async fn load(&self, alias: &str) -> Result<Option<StoredKey>, KeyringError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.keys.get(alias).map(|entry| StoredKey {
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
        auth: Option<&AuthContext>,
    ) -> Result<EcSignature, KeyringError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let EmulatedState {
            keys,
            consumed_contexts,
            ..
        } = &mut *state;

        let entry = keys
            .get(alias)
            .ok_or_else(|| KeyringError::key_not_found(alias))?;
        ensure_algorithm(alias, entry.key.algorithm(), algorithm)?;
        self.authorize(alias, &entry.policy, auth, consumed_contexts)?;

        entry
            .key
            .sign(data)
            .map_err(|e| KeyringError::signing(e.to_string()))
    }

    async fn store_chain(&self, alias: &str, chain: &[Vec<u8>]) -> Result<(), KeyringError> {
        self.state
            .write()
            .map_err(|_| poisoned())?
            .chains
            .insert(alias.to_string(), chain.to_vec());
        Ok(())
    }

    async fn load_chain(&self, alias: &str) -> Result<Option<Vec<Vec<u8>>>, KeyringError> {
        Ok(self
            .state
            .read()
            .map_err(|_| poisoned())?
            .chains
            .get(alias)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::verify_statement_chain;
    use crate::clock::ManualClock;
    use crate::ops::PlatformCryptoOps;
    use crate::types::BiometricStrength;
    use chrono::Utc;

    fn store() -> (EmulatedHardwareStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store =
            EmulatedHardwareStore::with_clock(PlatformCapabilities::hardware_keystore(), clock.clone())
                .unwrap();
        (store, clock)
    }

    fn request(store: &EmulatedHardwareStore, policy: AccessPolicy) -> GenerateRequest {
        let ops = PlatformCryptoOps::for_capabilities(&store.capabilities());
        GenerateRequest {
            alias: "k".into(),
            algorithm: SignatureAlgorithm::Es256,
            policy,
            descriptor: ops.apply_access_policy(&policy).unwrap(),
            attestation_challenge: None,
        }
    }

    #[tokio::test]
    async fn test_gated_key_needs_live_context() {
        let (store, clock) = store();
        let policy = AccessPolicy::biometric(10, BiometricStrength::Strong);
        store.generate(request(&store, policy)).await.unwrap();

        let unauthenticated = store.sign("k", SignatureAlgorithm::Es256, b"Foo", None).await;
        assert!(matches!(unauthenticated, Err(KeyringError::AuthenticationRequired)));

        let ctx = AuthContext::new(BackendKind::HardwareKeystore, clock.now(), 10);
        store.sign("k", SignatureAlgorithm::Es256, b"Foo", Some(&ctx)).await.unwrap();
        clock.advance_secs(9);
        store.sign("k", SignatureAlgorithm::Es256, b"Foo", Some(&ctx)).await.unwrap();

        clock.advance_secs(1);
        let stale = store.sign("k", SignatureAlgorithm::Es256, b"Foo", Some(&ctx)).await;
        assert!(matches!(stale, Err(KeyringError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn test_per_use_context_is_spent() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store =
            EmulatedHardwareStore::with_clock(PlatformCapabilities::secure_enclave(), clock.clone())
                .unwrap();
        let policy = AccessPolicy::biometric(0, BiometricStrength::Strong);
        store.generate(request(&store, policy)).await.unwrap();

        let ctx = AuthContext::new(BackendKind::SecureEnclave, clock.now(), 0);
        store.sign("k", SignatureAlgorithm::Es256, b"Foo", Some(&ctx)).await.unwrap();

        let reused = store.sign("k", SignatureAlgorithm::Es256, b"Foo", Some(&ctx)).await;
        assert!(matches!(reused, Err(KeyringError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn test_attestation_chain_bound_to_challenge() {
        let (store, _) = store();
        let challenge = vaultkey_crypto::random_bytes(16);
        let mut req = request(&store, AccessPolicy::none());
        req.attestation_challenge = Some(challenge.clone());

        let generated = store.generate(req).await.unwrap();
        assert_eq!(generated.attestation_chain.len(), 2);

        let statement = verify_statement_chain(&generated.attestation_chain, &challenge).unwrap();
        assert_eq!(statement.public_key, generated.public_key);
    }

    #[tokio::test]
    async fn test_attestation_unavailable() {
        let caps = PlatformCapabilities {
            attestation: false,
            ..PlatformCapabilities::hardware_keystore()
        };
        let store = EmulatedHardwareStore::new(caps).unwrap();
        let mut req = request(&store, AccessPolicy::none());
        req.attestation_challenge = Some(vec![1; 16]);

        assert!(matches!(
            store.generate(req).await,
            Err(KeyringError::AttestationUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_foreign_descriptor() {
        let (store, _) = store();
        let mut req = request(&store, AccessPolicy::none());
        req.descriptor = NativeAccessDescriptor::SoftwareProtection;

        assert!(matches!(
            store.generate(req).await,
            Err(KeyringError::PolicyUnsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_enclave_is_p256_only() {
        let store = EmulatedHardwareStore::new(PlatformCapabilities::secure_enclave()).unwrap();
        let ops = PlatformCryptoOps::for_capabilities(&store.capabilities());
        let req = GenerateRequest {
            alias: "k".into(),
            algorithm: SignatureAlgorithm::Es384,
            policy: AccessPolicy::none(),
            descriptor: ops.apply_access_policy(&AccessPolicy::none()).unwrap(),
            attestation_challenge: None,
        };

        assert!(matches!(
            store.generate(req).await,
            Err(KeyringError::KeyGeneration { .. })
        ));
    }

    #[test]
    fn test_software_capabilities_rejected() {
        assert!(EmulatedHardwareStore::new(PlatformCapabilities::software()).is_err());
    }
}
