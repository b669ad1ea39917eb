//! Core types for key provider operations.
//!
//! Access policies describe *what* protection a key needs. Backends translate
//! them into their native form through [`crate::PlatformCryptoOps`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaultkey_crypto::SignatureAlgorithm;

/// Kind of secure store backing a key.
///
/// This determines which native access descriptor a policy maps to and
/// whether user authentication can gate key use at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BackendKind {
    /// Android Keystore (TEE or StrongBox backed).
    HardwareKeystore = 1,

    /// Apple Secure Enclave.
    SecureEnclave = 2,

    /// Software-only key storage.
    /// WARNING: private keys live in process memory.
    Software = 3,
}

impl BackendKind {
    /// Get the security level (1-5, higher is better).
    #[must_use]
    pub const fn security_level(&self) -> u8 {
        match self {
            Self::SecureEnclave => 5,
            Self::HardwareKeystore => 4,
            Self::Software => 1,
        }
    }

    /// Whether keys in this backend can be gated on user authentication.
    #[must_use]
    pub const fn supports_user_auth(&self) -> bool {
        !matches!(self, Self::Software)
    }

    /// Whether private keys are bound to secure hardware.
    #[must_use]
    pub const fn is_hardware(&self) -> bool {
        !matches!(self, Self::Software)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HardwareKeystore => "hardware-keystore",
            Self::SecureEnclave => "secure-enclave",
            Self::Software => "software",
        };
        f.write_str(name)
    }
}

/// Biometric class a policy requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BiometricStrength {
    /// Class 3 biometrics; invalidated when enrollment changes.
    #[default]
    Strong,
    /// Class 2 biometrics or user presence.
    Weak,
    /// No biometric; device credential only.
    None,
}

/// Protection requirements for a key.
///
/// `auth_timeout_seconds` is ignored unless `requires_user_authentication` is
/// set. A timeout of zero demands authentication on every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Gate every private-key operation on user authentication.
    pub requires_user_authentication: bool,

    /// Seconds a successful authentication stays valid.
    pub auth_timeout_seconds: u32,

    /// Required biometric class.
    pub biometric_strength: BiometricStrength,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl AccessPolicy {
    /// Policy without user authentication.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            requires_user_authentication: false,
            auth_timeout_seconds: 0,
            biometric_strength: BiometricStrength::None,
        }
    }

    /// Policy requiring a biometric of `strength`, valid for `timeout_seconds`.
    #[must_use]
    pub const fn biometric(timeout_seconds: u32, strength: BiometricStrength) -> Self {
        Self {
            requires_user_authentication: true,
            auth_timeout_seconds: timeout_seconds,
            biometric_strength: strength,
        }
    }

    /// Build the policy from a presentation-layer timeout choice.
    ///
    /// `None` disables authentication; `Some(d)` requires a strong biometric
    /// valid for `d` (whole seconds, saturating).
    #[must_use]
    pub fn from_biometric_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Self::none(),
            Some(d) => Self::biometric(
                u32::try_from(d.as_secs()).unwrap_or(u32::MAX),
                BiometricStrength::Strong,
            ),
        }
    }

    /// Authentication timeout, if authentication is required.
    #[must_use]
    pub const fn effective_timeout(&self) -> Option<u32> {
        if self.requires_user_authentication {
            Some(self.auth_timeout_seconds)
        } else {
            None
        }
    }

    /// Whether each use needs its own authentication.
    #[must_use]
    pub const fn is_per_use(&self) -> bool {
        self.requires_user_authentication && self.auth_timeout_seconds == 0
    }
}

/// A successful user authentication, usable to unlock key operations.
///
/// Stands in for Android's biometric result or an evaluated iOS `LAContext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Random identifier of this context.
    pub id: String,

    /// Backend that minted the context.
    pub backend: BackendKind,

    /// When the user authenticated.
    pub authenticated_at: DateTime<Utc>,

    /// Seconds the authentication may be reused. Zero means one operation.
    pub reuse_seconds: u32,
}

impl AuthContext {
    /// Create a context for `backend`, authenticated at `now`.
    #[must_use]
    pub fn new(backend: BackendKind, now: DateTime<Utc>, reuse_seconds: u32) -> Self {
        Self {
            id: hex::encode(vaultkey_crypto::random_bytes(16)),
            backend,
            authenticated_at: now,
            reuse_seconds,
        }
    }

    /// Same context, re-stamped as authenticated at `now`.
    #[must_use]
    pub fn authenticated(mut self, now: DateTime<Utc>) -> Self {
        self.authenticated_at = now;
        self
    }

    /// End of the reuse window.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.authenticated_at + chrono::Duration::seconds(i64::from(self.reuse_seconds))
    }

    /// Whether the context may unlock an operation at `now`.
    ///
    /// Per-use contexts (reuse 0) are never valid by time alone.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.authenticated_at && now < self.expires_at()
    }
}

/// Application-level key generation request.
#[derive(Debug, Clone, Default)]
pub struct KeyGenRequest {
    /// Signature algorithm; fixes the curve.
    pub algorithm: SignatureAlgorithm,

    /// Challenge to bind into key attestation. `None` skips attestation.
    pub attestation_challenge: Option<Vec<u8>>,

    /// Biometric timeout. `None` disables user authentication.
    pub biometric_timeout: Option<Duration>,
}

impl KeyGenRequest {
    /// Create a request for `algorithm` without attestation or authentication.
    #[must_use]
    pub fn new(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    /// Request attestation bound to `challenge`.
    #[must_use]
    pub fn attestation_challenge(mut self, challenge: impl Into<Vec<u8>>) -> Self {
        self.attestation_challenge = Some(challenge.into());
        self
    }

    /// Require biometric authentication valid for `timeout`.
    #[must_use]
    pub fn biometric_timeout(mut self, timeout: Duration) -> Self {
        self.biometric_timeout = Some(timeout);
        self
    }

    /// Access policy derived from the timeout choice.
    #[must_use]
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::from_biometric_timeout(self.biometric_timeout)
    }
}
