//! The key provider.
//!
//! [`KeyProvider`] is the one operation set applications use. It sits on a
//! [`SecureStore`] and adds alias bookkeeping, per-key authentication
//! windows and biometric challenges:
//!
//! ```text
//! create_signing_key ──> ops.native_descriptor ──> store.delete ──> store.generate
//! sign ──> window.check ──(Challenge)──> prompt ──> window.record_success
//!                   └──(Proceed)──────────────────────────┴──> store.sign
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use vaultkey_crypto::{EcPublicKey, EcSignature, SignatureAlgorithm};

use crate::clock::{Clock, SystemClock};
use crate::config::{ChallengeConcurrency, ProviderConfig};
use crate::error::KeyringError;
use crate::key::{SigningKeyPair, TbaKey};
use crate::ops::PlatformCryptoOps;
use crate::platform::PlatformCapabilities;
use crate::prompt::{BiometricPromptController, PromptPresenter};
use crate::store::{GenerateRequest, SecureStore};
use crate::types::{AccessPolicy, AuthContext, BackendKind, KeyGenRequest};
use crate::window::{AuthenticationWindow, KeyGuard, WindowDecision, WindowState};

fn poisoned() -> KeyringError {
    KeyringError::store_access("Lock poisoned")
}

/// Unified key operations over one secure store.
pub struct KeyProvider {
    store: Arc<dyn SecureStore>,
    controller: BiometricPromptController,
    clock: Arc<dyn Clock>,
    config: ProviderConfig,
    guards: Mutex<HashMap<String, Arc<KeyGuard>>>,
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("backend", &self.store.backend())
            .field("controller", &self.controller)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KeyProvider {
    /// Create a provider on `store`.
    ///
    /// `presenter` shows biometric prompts. Without one, signing with an
    /// authentication-gated key fails with
    /// [`KeyringError::AuthenticationRequired`].
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfiguration`] if `config` is invalid.
    pub fn new(
        store: Arc<dyn SecureStore>,
        presenter: Option<Arc<dyn PromptPresenter>>,
        config: ProviderConfig,
    ) -> Result<Self, KeyringError> {
        Self::with_clock(store, presenter, config, Arc::new(SystemClock))
    }

    /// Create a provider that reads time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfiguration`] if `config` is invalid.
    pub fn with_clock(
        store: Arc<dyn SecureStore>,
        presenter: Option<Arc<dyn PromptPresenter>>,
        config: ProviderConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyringError> {
        config.validate()?;

        let controller = BiometricPromptController::new(
            presenter,
            config.prompt.clone(),
            config.challenge_timeout,
            clock.clone(),
        );

        tracing::info!(
            backend = %store.backend(),
            presenter = controller.has_presenter(),
            concurrency = ?config.concurrency,
            "KeyProvider created"
        );

        Ok(Self {
            store,
            controller,
            clock,
            config,
            guards: Mutex::new(HashMap::new()),
        })
    }

    /// Backend of the underlying store.
    pub fn backend(&self) -> BackendKind {
        self.store.backend()
    }

    /// Capabilities of the underlying store.
    pub fn capabilities(&self) -> PlatformCapabilities {
        self.store.capabilities()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Fresh platform operations for the active backend, without a policy.
    pub fn platform_ops(&self) -> PlatformCryptoOps {
        let mut ops = PlatformCryptoOps::for_capabilities(&self.store.capabilities());
        if let PlatformCryptoOps::HardwareBacked(hardware) = &mut ops {
            hardware.prefer_strongbox = self.config.prefer_strongbox;
            hardware.invalidate_on_enrollment = self.config.invalidate_on_biometric_enrollment;
        }
        ops
    }

    fn check_ops(&self, ops: &PlatformCryptoOps) -> Result<(), KeyringError> {
        let backend = self.store.backend();
        if ops.backend() != backend {
            return Err(KeyringError::policy_unsupported(format!(
                "{} operations cannot drive the {backend} store",
                ops.backend()
            )));
        }
        Ok(())
    }

    /// Whether a key exists under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::StoreAccess`] if the store cannot be queried.
    pub async fn has_key(&self, alias: &str, ops: &PlatformCryptoOps) -> Result<bool, KeyringError> {
        self.check_ops(ops)?;
        self.store.contains(alias).await
    }

    /// Delete the key under `alias`. Deleting a missing key succeeds.
    ///
    /// Handles to the deleted key stop working and its window is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::StoreAccess`] if the store fails.
    pub async fn delete_key(&self, alias: &str, ops: &PlatformCryptoOps) -> Result<(), KeyringError> {
        self.check_ops(ops)?;
        self.store.delete(alias).await?;
        self.retire_guard(alias)?;
        tracing::info!(alias = %alias, "Key deleted");
        Ok(())
    }

    /// Create a fresh key for `algorithm` under `alias`, protected by the
    /// access policy `ops` carries. Any key already under `alias` is deleted
    /// first.
    ///
    /// # Errors
    ///
    /// - [`KeyringError::PolicyUnsupported`] if the backend cannot enforce
    ///   the policy
    /// - [`KeyringError::KeyGeneration`] if the platform rejects the
    ///   algorithm
    pub async fn create_signing_key(
        &self,
        alias: &str,
        algorithm: SignatureAlgorithm,
        ops: &PlatformCryptoOps,
    ) -> Result<SigningKeyPair, KeyringError> {
        let tba = self.create(alias, algorithm, ops, None).await?;
        Ok(tba.key_pair)
    }

    /// Create an ES256 key under `alias` with attestation bound to
    /// `attestation_challenge`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::AttestationUnavailable`] if the backend cannot
    /// attest, plus everything [`Self::create_signing_key`] returns.
    pub async fn create_tba_key(
        &self,
        alias: &str,
        attestation_challenge: &[u8],
        ops: &PlatformCryptoOps,
    ) -> Result<TbaKey, KeyringError> {
        self.create(alias, SignatureAlgorithm::Es256, ops, Some(attestation_challenge.to_vec()))
            .await
    }

    /// Application-level key generation.
    ///
    /// Derives the policy from the request's biometric timeout, builds ops for
    /// the active backend and creates the key. The chain is empty unless the
    /// request carries an attestation challenge.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_tba_key`].
    pub async fn generate_key(&self, alias: &str, request: &KeyGenRequest) -> Result<TbaKey, KeyringError> {
        let ops = self.platform_ops().with_access_policy(request.policy())?;
        self.create(alias, request.algorithm, &ops, request.attestation_challenge.clone())
            .await
    }

    async fn create(
        &self,
        alias: &str,
        algorithm: SignatureAlgorithm,
        ops: &PlatformCryptoOps,
        attestation_challenge: Option<Vec<u8>>,
    ) -> Result<TbaKey, KeyringError> {
        self.check_ops(ops)?;

        // Reject before the existing key is deleted.
        let policy = ops.access_policy();
        let descriptor = ops.native_descriptor()?;
        if attestation_challenge.is_some() && !self.store.capabilities().attestation {
            return Err(KeyringError::attestation_unavailable(format!(
                "{} store cannot attest keys",
                self.store.backend()
            )));
        }

        tracing::info!(
            alias = %alias,
            algorithm = %algorithm,
            requires_auth = policy.requires_user_authentication,
            timeout = policy.auth_timeout_seconds,
            attested = attestation_challenge.is_some(),
            "Creating key"
        );

        self.store.delete(alias).await?;
        self.retire_guard(alias)?;

        let generated = self
            .store
            .generate(GenerateRequest {
                alias: alias.to_string(),
                algorithm,
                policy,
                descriptor,
                attestation_challenge,
            })
            .await?;

        let guard = Arc::new(KeyGuard::new(alias, policy));
        self.guards
            .lock()
            .map_err(|_| poisoned())?
            .insert(alias.to_string(), guard.clone());

        Ok(TbaKey {
            key_pair: SigningKeyPair::new(alias, algorithm, generated.public_key, ops.clone(), guard),
            attestation_chain: generated.attestation_chain,
        })
    }

    fn retire_guard(&self, alias: &str) -> Result<(), KeyringError> {
        if let Some(old) = self.guards.lock().map_err(|_| poisoned())?.remove(alias) {
            old.retire();
        }
        Ok(())
    }

    /// Guard for a key loaded with `policy`, reusing the live one if it
    /// still matches.
    fn guard_for(&self, alias: &str, policy: AccessPolicy) -> Result<Arc<KeyGuard>, KeyringError> {
        let mut guards = self.guards.lock().map_err(|_| poisoned())?;
        if let Some(existing) = guards.get(alias) {
            if existing.policy() == policy {
                return Ok(existing.clone());
            }
            existing.retire();
        }

        let guard = Arc::new(KeyGuard::new(alias, policy));
        guards.insert(alias.to_string(), guard.clone());
        Ok(guard)
    }

    /// Public key of the key under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::KeyNotFound`] if there is no such key.
    pub async fn get_public_key(&self, alias: &str) -> Result<EcPublicKey, KeyringError> {
        let stored = self
            .store
            .load(alias)
            .await?
            .ok_or_else(|| KeyringError::key_not_found(alias))?;
        tracing::debug!(alias = %alias, curve = %stored.public_key.curve(), "Public key loaded");
        Ok(stored.public_key)
    }

    /// Handle to the existing key under `alias`.
    ///
    /// The handle shares the authentication window of every other live
    /// handle to the same key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::KeyNotFound`] if there is no such key.
    pub async fn get_key_pair(&self, alias: &str, ops: &PlatformCryptoOps) -> Result<SigningKeyPair, KeyringError> {
        self.check_ops(ops)?;
        let stored = self
            .store
            .load(alias)
            .await?
            .ok_or_else(|| KeyringError::key_not_found(alias))?;

        let ops = ops.clone().with_access_policy(stored.policy)?;
        let guard = self.guard_for(alias, stored.policy)?;
        tracing::debug!(alias = %alias, algorithm = %stored.algorithm, "Key pair loaded");

        Ok(SigningKeyPair::new(alias, stored.algorithm, stored.public_key, ops, guard))
    }

    /// Sign `data` with `key`.
    ///
    /// If the key's window has no valid authentication, exactly one biometric
    /// challenge runs first. Concurrent signs on the same key either wait for
    /// that challenge or fail fast, depending on
    /// [`ProviderConfig::concurrency`].
    ///
    /// # Errors
    ///
    /// - [`KeyringError::Signing`] if `algorithm` does not match the key
    /// - [`KeyringError::AuthenticationRequired`] if a challenge is needed
    ///   but no presenter is installed
    /// - [`KeyringError::AuthenticationFailed`] or
    ///   [`KeyringError::Cancelled`] if the challenge did not succeed
    /// - [`KeyringError::ChallengeInProgress`] in fail-fast mode
    /// - [`KeyringError::KeyNotFound`] if the key was deleted or replaced
    pub async fn sign(
        &self,
        data: &[u8],
        key: &SigningKeyPair,
        algorithm: SignatureAlgorithm,
    ) -> Result<EcSignature, KeyringError> {
        if algorithm != key.algorithm() {
            return Err(KeyringError::signing(format!(
                "key {} is {} but {algorithm} was requested",
                key.alias(),
                key.algorithm()
            )));
        }

        let guard = key.guard();
        let mut window = self.lock_window(guard).await?;
        if guard.is_retired() {
            return Err(KeyringError::key_not_found(key.alias()));
        }

        let auth = match window.check(self.clock.now()) {
            WindowDecision::Proceed => window.cached_context().cloned(),
            WindowDecision::Challenge => {
                tracing::debug!(alias = %key.alias(), "Authentication needed before signing");
                Some(self.run_challenge(key, &mut window).await?)
            },
        };

        let signature = self.store.sign(key.alias(), algorithm, data, auth.as_ref()).await?;
        tracing::debug!(alias = %key.alias(), algorithm = %algorithm, "Data signed");
        Ok(signature)
    }

    /// Authenticate for `key` ahead of time.
    ///
    /// Runs a challenge unless the window is already valid or the key needs
    /// no authentication. With a zero timeout the unlock is spent on the next
    /// sign's decision, so that sign challenges again.
    ///
    /// # Errors
    ///
    /// Same challenge errors as [`Self::sign`].
    pub async fn authenticate(&self, key: &SigningKeyPair) -> Result<(), KeyringError> {
        let guard = key.guard();
        let mut window = self.lock_window(guard).await?;
        if guard.is_retired() {
            return Err(KeyringError::key_not_found(key.alias()));
        }

        if window.check(self.clock.now()) == WindowDecision::Challenge {
            self.run_challenge(key, &mut window).await?;
        }
        Ok(())
    }

    /// Current window state of `key`.
    pub async fn window_state(&self, key: &SigningKeyPair) -> WindowState {
        key.guard().window().lock().await.state_at(self.clock.now())
    }

    async fn lock_window<'a>(
        &self,
        guard: &'a KeyGuard,
    ) -> Result<tokio::sync::MutexGuard<'a, AuthenticationWindow>, KeyringError> {
        match self.config.concurrency {
            ChallengeConcurrency::Queue => Ok(guard.window().lock().await),
            ChallengeConcurrency::FailFast => match guard.window().try_lock() {
                Ok(window) => Ok(window),
                Err(_) if guard.challenge_in_flight() => {
                    tracing::debug!(alias = %guard.alias(), "Challenge already running");
                    Err(KeyringError::ChallengeInProgress {
                        alias: guard.alias().to_string(),
                    })
                },
                // Held by a sign that needs no challenge; it finishes promptly.
                Err(_) => Ok(guard.window().lock().await),
            },
        }
    }

    /// Run one challenge with the window lock held and record its success.
    async fn run_challenge(
        &self,
        key: &SigningKeyPair,
        window: &mut AuthenticationWindow,
    ) -> Result<AuthContext, KeyringError> {
        let _marker = key.guard().begin_challenge();
        let policy = *window.policy();

        let mut ops = key.platform_ops().clone();
        let pending = ops
            .refresh_auth_context(policy.auth_timeout_seconds, self.clock.now())
            .ok_or(KeyringError::AuthenticationRequired)?;

        let context = self
            .controller
            .challenge(key.alias(), &policy, pending)
            .await?
            .into_context()?;

        window.record_success(context.clone(), context.authenticated_at);
        tracing::info!(
            alias = %key.alias(),
            timeout = policy.auth_timeout_seconds,
            "User authenticated for key"
        );
        Ok(context)
    }

    /// Store `chain` (leaf first) for `alias`, replacing any previous chain.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::StoreAccess`] if the store fails.
    pub async fn store_certificate_chain(&self, alias: &str, chain: &[Vec<u8>]) -> Result<(), KeyringError> {
        self.store.store_chain(alias, chain).await?;
        tracing::info!(alias = %alias, chain_len = chain.len(), "Certificate chain stored");
        Ok(())
    }

    /// The chain stored for `alias`, byte and order identical.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::ChainNotFound`] if none was stored.
    pub async fn get_certificate_chain(&self, alias: &str) -> Result<Vec<Vec<u8>>, KeyringError> {
        self.store
            .load_chain(alias)
            .await?
            .ok_or_else(|| KeyringError::ChainNotFound {
                alias: alias.to_string(),
            })
    }
}
