//! Error types for key provider operations.

use thiserror::Error;
use vaultkey_crypto::CryptoError;

/// Errors that can occur during key provider operations.
///
/// The provider never retries internally. [`KeyringError::is_retryable`]
/// tells the caller which failures are worth trying again.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// The secure store could not be reached or returned an I/O failure.
    #[error("Secure store access failed: {reason}")]
    StoreAccess {
        /// Reason the store could not be accessed.
        reason: String,
    },

    /// Key with the specified alias not found.
    #[error("Key not found: {alias}")]
    KeyNotFound {
        /// The key alias that was not found.
        alias: String,
    },

    /// Key generation failed.
    #[error("Key generation failed: {reason}")]
    KeyGeneration {
        /// Reason for the failure.
        reason: String,
    },

    /// The backend cannot honor the requested access policy.
    #[error("Access policy not supported: {reason}")]
    PolicyUnsupported {
        /// What the backend is missing.
        reason: String,
    },

    /// The backend cannot produce key attestation.
    #[error("Attestation unavailable: {reason}")]
    AttestationUnavailable {
        /// Reason attestation is unavailable.
        reason: String,
    },

    /// User authentication required but no way to obtain it.
    #[error("User authentication required")]
    AuthenticationRequired,

    /// User authentication was attempted and failed.
    #[error("User authentication failed ({code}): {message}")]
    AuthenticationFailed {
        /// Platform error code.
        code: i32,
        /// Platform error message.
        message: String,
    },

    /// The user dismissed the authentication prompt.
    #[error("User authentication cancelled")]
    Cancelled,

    /// Another authentication challenge is already running for this key.
    #[error("Authentication challenge already in progress for {alias}")]
    ChallengeInProgress {
        /// Key whose challenge is running.
        alias: String,
    },

    /// Signing operation failed.
    #[error("Signing failed: {reason}")]
    Signing {
        /// Reason for the failure.
        reason: String,
    },

    /// No certificate chain stored for the alias.
    #[error("Certificate chain not found: {alias}")]
    ChainNotFound {
        /// The key alias without a chain.
        alias: String,
    },

    /// No secure store backend available on this platform.
    #[error("No secure store available on this platform")]
    NoPlatformSupport,

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Error from the crypto layer.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl KeyringError {
    /// Create a store access error from a reason.
    #[must_use]
    pub fn store_access(reason: impl Into<String>) -> Self {
        Self::StoreAccess {
            reason: reason.into(),
        }
    }

    /// Create a key-not-found error.
    #[must_use]
    pub fn key_not_found(alias: impl Into<String>) -> Self {
        Self::KeyNotFound {
            alias: alias.into(),
        }
    }

    /// Create a key generation error from a reason.
    #[must_use]
    pub fn key_generation(reason: impl Into<String>) -> Self {
        Self::KeyGeneration {
            reason: reason.into(),
        }
    }

    /// Create a policy-unsupported error from a reason.
    #[must_use]
    pub fn policy_unsupported(reason: impl Into<String>) -> Self {
        Self::PolicyUnsupported {
            reason: reason.into(),
        }
    }

    /// Create an attestation-unavailable error from a reason.
    #[must_use]
    pub fn attestation_unavailable(reason: impl Into<String>) -> Self {
        Self::AttestationUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a signing error from a reason.
    #[must_use]
    pub fn signing(reason: impl Into<String>) -> Self {
        Self::Signing {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error from a reason.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Whether the caller may reasonably retry the same operation.
    ///
    /// Store I/O and user-driven outcomes are retryable. Missing keys,
    /// unsupported policies and malformed input are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreAccess { .. }
                | Self::AuthenticationFailed { .. }
                | Self::Cancelled
                | Self::ChallengeInProgress { .. }
        )
    }
}

#[cfg(target_os = "android")]
impl From<jni::errors::Error> for KeyringError {
    fn from(err: jni::errors::Error) -> Self {
        Self::StoreAccess {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(KeyringError::store_access("io").is_retryable());
        assert!(KeyringError::Cancelled.is_retryable());
        assert!(KeyringError::AuthenticationFailed {
            code: 7,
            message: "lockout".into()
        }
        .is_retryable());
        assert!(KeyringError::ChallengeInProgress { alias: "k".into() }.is_retryable());

        assert!(!KeyringError::key_not_found("k").is_retryable());
        assert!(!KeyringError::policy_unsupported("no biometrics").is_retryable());
        assert!(!KeyringError::AuthenticationRequired.is_retryable());
    }

    #[test]
    fn test_crypto_error_converts() {
        let err: KeyringError = CryptoError::invalid_signature("short").into();
        assert!(matches!(err, KeyringError::Crypto(_)));
        assert!(err.to_string().contains("short"));
    }
}
