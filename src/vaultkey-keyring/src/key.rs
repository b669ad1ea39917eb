//! Key handles returned by the provider.

use std::sync::Arc;

use vaultkey_crypto::{EcPublicKey, SignatureAlgorithm};

use crate::ops::PlatformCryptoOps;
use crate::window::KeyGuard;

/// Handle to a signing key held by a secure store.
///
/// The private half never leaves the store. Handles for the same alias share
/// one [`KeyGuard`], so an authentication made through one handle unlocks
/// them all.
#[derive(Debug, Clone)]
pub struct SigningKeyPair {
    alias: String,
    algorithm: SignatureAlgorithm,
    public_key: EcPublicKey,
    ops: PlatformCryptoOps,
    guard: Arc<KeyGuard>,
}

impl SigningKeyPair {
    pub(crate) fn new(
        alias: impl Into<String>,
        algorithm: SignatureAlgorithm,
        public_key: EcPublicKey,
        ops: PlatformCryptoOps,
        guard: Arc<KeyGuard>,
    ) -> Self {
        Self {
            alias: alias.into(),
            algorithm,
            public_key,
            ops,
            guard,
        }
    }

    /// Store alias.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Algorithm the key was created for.
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Public half.
    #[must_use]
    pub fn public_key(&self) -> &EcPublicKey {
        &self.public_key
    }

    /// Platform operations snapshot taken when the handle was made.
    #[must_use]
    pub fn platform_ops(&self) -> &PlatformCryptoOps {
        &self.ops
    }

    /// Shared authentication guard.
    #[must_use]
    pub fn guard(&self) -> &Arc<KeyGuard> {
        &self.guard
    }

    /// Whether `other` is a handle on the same live key.
    #[must_use]
    pub fn shares_window_with(&self, other: &SigningKeyPair) -> bool {
        Arc::ptr_eq(&self.guard, &other.guard)
    }
}

/// A key made for the to-be-attested flow.
#[derive(Debug, Clone)]
pub struct TbaKey {
    /// The key itself.
    pub key_pair: SigningKeyPair,
    /// Attestation chain, leaf first. Empty when no challenge was given.
    pub attestation_chain: Vec<Vec<u8>>,
}

impl TbaKey {
    /// Whether the key came with attestation.
    #[must_use]
    pub fn is_attested(&self) -> bool {
        !self.attestation_chain.is_empty()
    }
}
