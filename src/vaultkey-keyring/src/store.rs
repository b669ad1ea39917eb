//! Secure store trait.
//!
//! A [`SecureStore`] is the native side of the provider: it owns key material,
//! enforces access descriptors and persists certificate chains. The provider
//! layers alias bookkeeping, authentication windows and prompting on top.
//!
//! ## Implementations
//!
//! - [`crate::SoftwareStore`]: in-memory keys, optional OS keyring persistence
//! - [`crate::EmulatedHardwareStore`]: software keys with hardware semantics
//! - `AndroidKeystore`: Android Keystore through JNI
//! - `AppleKeychain`: Secure Enclave keys through Security.framework

use async_trait::async_trait;
use vaultkey_crypto::{EcPublicKey, EcSignature, SignatureAlgorithm};

use crate::error::KeyringError;
use crate::ops::NativeAccessDescriptor;
use crate::platform::PlatformCapabilities;
use crate::types::{AccessPolicy, AuthContext, BackendKind};

/// Parameters for generating one key.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Alias to store the key under.
    pub alias: String,
    /// Signature algorithm; fixes the curve.
    pub algorithm: SignatureAlgorithm,
    /// Portable policy, recorded alongside the key.
    pub policy: AccessPolicy,
    /// Native form of `policy` for this backend.
    pub descriptor: NativeAccessDescriptor,
    /// Challenge to bind into attestation. `None` skips attestation.
    pub attestation_challenge: Option<Vec<u8>>,
}

/// A freshly generated key.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// Public half.
    pub public_key: EcPublicKey,
    /// Attestation chain, leaf first. Empty without a challenge.
    pub attestation_chain: Vec<Vec<u8>>,
}

/// Metadata of a stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Public half.
    pub public_key: EcPublicKey,
    /// Access policy the key was generated with.
    pub policy: AccessPolicy,
}

/// Native key storage.
///
/// All methods may block on platform I/O; implementations must be safe to
/// call from any task.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// What this store can enforce.
    fn capabilities(&self) -> PlatformCapabilities;

    /// Kind of storage this is.
    fn backend(&self) -> BackendKind {
        self.capabilities().backend
    }

    /// Whether a key exists under `alias`.
    async fn contains(&self, alias: &str) -> Result<bool, KeyringError>;

    /// Remove the key. A chain stored under the same alias stays. Succeeds
    /// if nothing was stored.
    async fn delete(&self, alias: &str) -> Result<(), KeyringError>;

    /// Generate a key. The caller has already removed any previous entry.
    ///
    /// # Errors
    ///
    /// - [`KeyringError::KeyGeneration`] if the platform rejects the request
    /// - [`KeyringError::PolicyUnsupported`] if the descriptor cannot be honored
    /// - [`KeyringError::AttestationUnavailable`] if a challenge was given and
    ///   the store cannot attest
    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedKey, KeyringError>;

    /// Metadata of the key under `alias`, if any.
    async fn load(&self, alias: &str) -> Result<Option<StoredKey>, KeyringError>;

    /// Sign `data` with the key under `alias`.
    ///
    /// `auth` is the context from the most recent successful challenge; stores
    /// that enforce user authentication reject missing or stale contexts with
    /// [`KeyringError::AuthenticationRequired`].
    async fn sign(
        &self,
        alias: &str,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        auth: Option<&AuthContext>,
    ) -> Result<EcSignature, KeyringError>;

    /// Store `chain` under `alias`, replacing any previous chain.
    async fn store_chain(&self, alias: &str, chain: &[Vec<u8>]) -> Result<(), KeyringError>;

    /// Chain stored under `alias`, if any.
    async fn load_chain(&self, alias: &str) -> Result<Option<Vec<Vec<u8>>>, KeyringError>;
}

/// Check that a signing request names the key's own algorithm.
pub(crate) fn ensure_algorithm(
    alias: &str,
    stored: SignatureAlgorithm,
    requested: SignatureAlgorithm,
) -> Result<(), KeyringError> {
    if stored == requested {
        Ok(())
    } else {
        Err(KeyringError::signing(format!(
            "key {alias} is {stored} ({}), cannot sign with {requested}",
            stored.curve()
        )))
    }
}
