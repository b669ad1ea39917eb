//! Per-backend translation of access policies into native descriptors.
//!
//! [`PlatformCryptoOps`] is a closed set: one variant per kind of secure
//! store. Each variant maps an [`AccessPolicy`] onto the parameters its
//! native API expects and owns the authentication context that unlocks
//! key use.
//!
//! A variant never weakens a policy. If the backend lacks the requested
//! biometric class, or cannot gate keys on authentication at all, the
//! mapping fails with [`KeyringError::PolicyUnsupported`].

use std::ops::BitOr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KeyringError;
use crate::platform::PlatformCapabilities;
use crate::types::{AccessPolicy, AuthContext, BackendKind, BiometricStrength};

/// Android `BiometricManager.Authenticators` bits.
pub mod authenticators {
    /// Class 3 biometrics.
    pub const BIOMETRIC_STRONG: u32 = 0x000F;
    /// Class 2 biometrics (includes class 3).
    pub const BIOMETRIC_WEAK: u32 = 0x00FF;
    /// Device PIN, pattern or password.
    pub const DEVICE_CREDENTIAL: u32 = 0x8000;
}

/// Apple `SecAccessControlCreateFlags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccessControlFlags(u32);

impl AccessControlFlags {
    /// `kSecAccessControlUserPresence`
    pub const USER_PRESENCE: Self = Self(1 << 0);
    /// `kSecAccessControlBiometryCurrentSet`
    pub const BIOMETRY_CURRENT_SET: Self = Self(1 << 3);
    /// `kSecAccessControlDevicePasscode`
    pub const DEVICE_PASSCODE: Self = Self(1 << 4);
    /// `kSecAccessControlPrivateKeyUsage`
    pub const PRIVATE_KEY_USAGE: Self = Self(1 << 30);

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AccessControlFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// `KeyGenParameterSpec` user-authentication parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreSpec {
    /// `setUserAuthenticationRequired`
    pub user_authentication_required: bool,
    /// Validity of one authentication; 0 means per operation.
    pub auth_validity_seconds: u32,
    /// Allowed authenticator bitmask (see [`authenticators`]).
    pub authenticators: u32,
    /// `setIsStrongBoxBacked`
    pub strongbox: bool,
    /// `setInvalidatedByBiometricEnrollment`
    pub invalidated_by_biometric_enrollment: bool,
}

impl KeystoreSpec {
    /// Policy these parameters enforce. Inverse of the keystore mapping for
    /// every policy [`HardwareOps`] accepts.
    #[must_use]
    pub fn access_policy(&self) -> AccessPolicy {
        if !self.user_authentication_required {
            return AccessPolicy::none();
        }
        let strength = if self.authenticators & authenticators::BIOMETRIC_STRONG != 0 {
            BiometricStrength::Strong
        } else {
            BiometricStrength::None
        };
        AccessPolicy::biometric(self.auth_validity_seconds, strength)
    }
}

/// `SecAccessControl` parameters for a Secure Enclave key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlSpec {
    /// Access control flags.
    pub flags: AccessControlFlags,
    /// `touchIDAuthenticationAllowableReuseDuration` for the `LAContext`.
    pub reuse_duration_seconds: u32,
}

/// Native form of an access policy, as handed to a secure store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeAccessDescriptor {
    /// Android Keystore parameters.
    Keystore(KeystoreSpec),
    /// Apple access control.
    AccessControl(AccessControlSpec),
    /// No native protection beyond the software store itself.
    SoftwareProtection,
}

impl NativeAccessDescriptor {
    /// Whether key use is gated on user authentication.
    #[must_use]
    pub fn requires_user_authentication(&self) -> bool {
        match self {
            Self::Keystore(spec) => spec.user_authentication_required,
            Self::AccessControl(spec) => {
                spec.flags.contains(AccessControlFlags::BIOMETRY_CURRENT_SET)
                    || spec.flags.contains(AccessControlFlags::USER_PRESENCE)
                    || spec.flags.contains(AccessControlFlags::DEVICE_PASSCODE)
            },
            Self::SoftwareProtection => false,
        }
    }
}

/// Operations for Android Keystore style hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareOps {
    /// What the device offers.
    pub capabilities: PlatformCapabilities,
    /// Ask for StrongBox when the device has one.
    pub prefer_strongbox: bool,
    /// Invalidate strong-biometric keys on enrollment changes.
    pub invalidate_on_enrollment: bool,
    /// Policy applied to keys created through these ops.
    pub access_policy: AccessPolicy,
    /// Most recent authentication.
    pub auth_context: Option<AuthContext>,
}

impl HardwareOps {
    /// Create ops for `capabilities` with StrongBox preferred and enrollment
    /// invalidation enabled.
    #[must_use]
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        Self {
            capabilities,
            prefer_strongbox: true,
            invalidate_on_enrollment: true,
            access_policy: AccessPolicy::none(),
            auth_context: None,
        }
    }

    /// The keystore binds keys to class 3 biometrics or the device
    /// credential only, and per-operation keys need a `CryptoObject` bound
    /// prompt. Weak and per-use policies are refused rather than widened.
    fn apply(&self, policy: &AccessPolicy) -> Result<KeystoreSpec, KeyringError> {
        let strongbox = self.prefer_strongbox && self.capabilities.strongbox;

        if !policy.requires_user_authentication {
            return Ok(KeystoreSpec {
                user_authentication_required: false,
                auth_validity_seconds: 0,
                authenticators: 0,
                strongbox,
                invalidated_by_biometric_enrollment: false,
            });
        }

        if policy.is_per_use() {
            return Err(KeyringError::policy_unsupported(
                "keystore keys cannot require authentication for every operation",
            ));
        }

        let caps = &self.capabilities;
        let authenticators = match policy.biometric_strength {
            BiometricStrength::Strong if caps.strong_biometrics => {
                authenticators::BIOMETRIC_STRONG
            },
            BiometricStrength::None if caps.device_credential => {
                authenticators::DEVICE_CREDENTIAL
            },
            strength => {
                return Err(KeyringError::policy_unsupported(format!(
                    "keystore cannot authenticate with {strength:?} biometrics"
                )))
            },
        };

        Ok(KeystoreSpec {
            user_authentication_required: true,
            auth_validity_seconds: policy.auth_timeout_seconds,
            authenticators,
            strongbox,
            invalidated_by_biometric_enrollment: self.invalidate_on_enrollment
                && policy.biometric_strength == BiometricStrength::Strong,
        })
    }
}

/// Operations for the Apple Secure Enclave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveOps {
    /// What the device offers.
    pub capabilities: PlatformCapabilities,
    /// Policy applied to keys created through these ops.
    pub access_policy: AccessPolicy,
    /// Most recent evaluated context.
    pub auth_context: Option<AuthContext>,
}

impl EnclaveOps {
    /// Create ops for `capabilities`.
    #[must_use]
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        Self {
            capabilities,
            access_policy: AccessPolicy::none(),
            auth_context: None,
        }
    }

    fn apply(&self, policy: &AccessPolicy) -> Result<AccessControlSpec, KeyringError> {
        if !policy.requires_user_authentication {
            return Ok(AccessControlSpec {
                flags: AccessControlFlags::PRIVATE_KEY_USAGE,
                reuse_duration_seconds: 0,
            });
        }

        let caps = &self.capabilities;
        let gate = match policy.biometric_strength {
            BiometricStrength::Strong if caps.strong_biometrics => {
                AccessControlFlags::BIOMETRY_CURRENT_SET
            },
            BiometricStrength::Weak if caps.weak_biometrics || caps.strong_biometrics => {
                AccessControlFlags::USER_PRESENCE
            },
            BiometricStrength::None if caps.device_credential => {
                AccessControlFlags::DEVICE_PASSCODE
            },
            strength => {
                return Err(KeyringError::policy_unsupported(format!(
                    "secure enclave cannot authenticate with {strength:?} biometrics"
                )))
            },
        };

        Ok(AccessControlSpec {
            flags: AccessControlFlags::PRIVATE_KEY_USAGE | gate,
            reuse_duration_seconds: policy.auth_timeout_seconds,
        })
    }
}

/// Operations for the software store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareOps;

/// Platform-specific crypto operations, one variant per backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCryptoOps {
    /// Android Keystore.
    HardwareBacked(HardwareOps),
    /// Apple Secure Enclave.
    EnclaveBacked(EnclaveOps),
    /// Software store.
    SoftwareBacked(SoftwareOps),
}

impl PlatformCryptoOps {
    /// Pick the variant matching the detected backend.
    #[must_use]
    pub fn for_capabilities(capabilities: &PlatformCapabilities) -> Self {
        match capabilities.backend {
            BackendKind::HardwareKeystore => {
                Self::HardwareBacked(HardwareOps::new(capabilities.clone()))
            },
            BackendKind::SecureEnclave => {
                Self::EnclaveBacked(EnclaveOps::new(capabilities.clone()))
            },
            BackendKind::Software => Self::SoftwareBacked(SoftwareOps),
        }
    }

    /// Backend this variant targets.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::HardwareBacked(_) => BackendKind::HardwareKeystore,
            Self::EnclaveBacked(_) => BackendKind::SecureEnclave,
            Self::SoftwareBacked(_) => BackendKind::Software,
        }
    }

    /// Carry `policy` for the keys these ops create.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::PolicyUnsupported`] when the software variant
    /// is asked to gate keys on user authentication.
    pub fn with_access_policy(mut self, policy: AccessPolicy) -> Result<Self, KeyringError> {
        match &mut self {
            Self::HardwareBacked(ops) => ops.access_policy = policy,
            Self::EnclaveBacked(ops) => ops.access_policy = policy,
            Self::SoftwareBacked(_) if policy.requires_user_authentication => {
                return Err(KeyringError::policy_unsupported(
                    "software store cannot gate keys on user authentication",
                ))
            },
            Self::SoftwareBacked(_) => {},
        }
        Ok(self)
    }

    /// Policy applied to keys created through these ops.
    #[must_use]
    pub fn access_policy(&self) -> AccessPolicy {
        match self {
            Self::HardwareBacked(ops) => ops.access_policy,
            Self::EnclaveBacked(ops) => ops.access_policy,
            Self::SoftwareBacked(_) => AccessPolicy::none(),
        }
    }

    /// Native descriptor for the carried policy.
    ///
    /// # Errors
    ///
    /// Same as [`Self::apply_access_policy`].
    pub fn native_descriptor(&self) -> Result<NativeAccessDescriptor, KeyringError> {
        self.apply_access_policy(&self.access_policy())
    }

    /// Translate `policy` into the backend's native descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::PolicyUnsupported`] if the backend cannot
    /// enforce the policy as requested.
    pub fn apply_access_policy(
        &self,
        policy: &AccessPolicy,
    ) -> Result<NativeAccessDescriptor, KeyringError> {
        match self {
            Self::HardwareBacked(ops) => ops.apply(policy).map(NativeAccessDescriptor::Keystore),
            Self::EnclaveBacked(ops) => {
                ops.apply(policy).map(NativeAccessDescriptor::AccessControl)
            },
            Self::SoftwareBacked(_) if policy.requires_user_authentication => {
                Err(KeyringError::policy_unsupported(
                    "software store cannot gate keys on user authentication",
                ))
            },
            Self::SoftwareBacked(_) => Ok(NativeAccessDescriptor::SoftwareProtection),
        }
    }

    /// The authentication context currently held, if any.
    #[must_use]
    pub fn current_auth_context(&self) -> Option<&AuthContext> {
        match self {
            Self::HardwareBacked(ops) => ops.auth_context.as_ref(),
            Self::EnclaveBacked(ops) => ops.auth_context.as_ref(),
            Self::SoftwareBacked(_) => None,
        }
    }

    /// Replace the held context with a fresh one reusable for
    /// `timeout_seconds`, returning it. Software never has one.
    pub fn refresh_auth_context(
        &mut self,
        timeout_seconds: u32,
        now: DateTime<Utc>,
    ) -> Option<AuthContext> {
        let backend = self.backend();
        let slot = match self {
            Self::HardwareBacked(ops) => &mut ops.auth_context,
            Self::EnclaveBacked(ops) => &mut ops.auth_context,
            Self::SoftwareBacked(_) => return None,
        };

        let context = AuthContext::new(backend, now, timeout_seconds);
        *slot = Some(context.clone());
        Some(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystore(caps: PlatformCapabilities) -> PlatformCryptoOps {
        PlatformCryptoOps::HardwareBacked(HardwareOps::new(caps))
    }

    #[test]
    fn test_hardware_no_auth() {
        let ops = keystore(PlatformCapabilities::hardware_keystore());
        let descriptor = ops.apply_access_policy(&AccessPolicy::none()).unwrap();

        let NativeAccessDescriptor::Keystore(spec) = descriptor else {
            panic!("expected keystore spec");
        };
        assert!(!spec.user_authentication_required);
        assert_eq!(spec.authenticators, 0);
        assert!(!descriptor.requires_user_authentication());
    }

    #[test]
    fn test_hardware_strong_biometric() {
        let ops = keystore(PlatformCapabilities::hardware_keystore());
        let policy = AccessPolicy::biometric(20, BiometricStrength::Strong);

        let NativeAccessDescriptor::Keystore(spec) = ops.apply_access_policy(&policy).unwrap()
        else {
            panic!("expected keystore spec");
        };
        assert!(spec.user_authentication_required);
        assert_eq!(spec.auth_validity_seconds, 20);
        assert_eq!(spec.authenticators, authenticators::BIOMETRIC_STRONG);
        assert!(spec.invalidated_by_biometric_enrollment);
    }

    #[test]
    fn test_hardware_never_downgrades() {
        let caps = PlatformCapabilities {
            strong_biometrics: false,
            ..PlatformCapabilities::hardware_keystore()
        };
        let ops = keystore(caps);
        let policy = AccessPolicy::biometric(10, BiometricStrength::Strong);

        assert!(matches!(
            ops.apply_access_policy(&policy),
            Err(KeyringError::PolicyUnsupported { .. })
        ));
    }

    #[test]
    fn test_hardware_rejects_weak_and_per_use() {
        let ops = keystore(PlatformCapabilities::hardware_keystore());

        for policy in [
            AccessPolicy::biometric(10, BiometricStrength::Weak),
            AccessPolicy::biometric(0, BiometricStrength::Strong),
            AccessPolicy::biometric(0, BiometricStrength::None),
        ] {
            assert!(
                matches!(
                    ops.apply_access_policy(&policy),
                    Err(KeyringError::PolicyUnsupported { .. })
                ),
                "{policy:?}"
            );
        }
    }

    #[test]
    fn test_keystore_spec_reads_back_policy() {
        let ops = keystore(PlatformCapabilities::hardware_keystore());

        for policy in [
            AccessPolicy::none(),
            AccessPolicy::biometric(1, BiometricStrength::Strong),
            AccessPolicy::biometric(20, BiometricStrength::Strong),
            AccessPolicy::biometric(60, BiometricStrength::None),
        ] {
            let NativeAccessDescriptor::Keystore(spec) = ops.apply_access_policy(&policy).unwrap()
            else {
                panic!("expected keystore spec");
            };
            assert_eq!(spec.access_policy(), policy);
        }
    }

    #[test]
    fn test_hardware_device_credential_requires_capability() {
        let caps = PlatformCapabilities {
            device_credential: false,
            ..PlatformCapabilities::hardware_keystore()
        };
        let policy = AccessPolicy::biometric(10, BiometricStrength::None);

        assert!(keystore(caps).apply_access_policy(&policy).is_err());

        let NativeAccessDescriptor::Keystore(spec) = keystore(
            PlatformCapabilities::hardware_keystore(),
        )
        .apply_access_policy(&policy)
        .unwrap() else {
            panic!("expected keystore spec");
        };
        assert_eq!(spec.authenticators, authenticators::DEVICE_CREDENTIAL);
    }

    #[test]
    fn test_strongbox_only_when_present() {
        let mut caps = PlatformCapabilities::hardware_keystore();
        caps.strongbox = false;
        let NativeAccessDescriptor::Keystore(spec) = keystore(caps)
            .apply_access_policy(&AccessPolicy::none())
            .unwrap()
        else {
            panic!("expected keystore spec");
        };
        assert!(!spec.strongbox);

        let mut caps = PlatformCapabilities::hardware_keystore();
        caps.strongbox = true;
        let NativeAccessDescriptor::Keystore(spec) = keystore(caps)
            .apply_access_policy(&AccessPolicy::none())
            .unwrap()
        else {
            panic!("expected keystore spec");
        };
        assert!(spec.strongbox);
    }

    #[test]
    fn test_enclave_flags() {
        let ops = PlatformCryptoOps::for_capabilities(&PlatformCapabilities::secure_enclave());
        assert_eq!(ops.backend(), BackendKind::SecureEnclave);

        let policy = AccessPolicy::biometric(60, BiometricStrength::Strong);
        let NativeAccessDescriptor::AccessControl(spec) =
            ops.apply_access_policy(&policy).unwrap()
        else {
            panic!("expected access control");
        };
        assert!(spec.flags.contains(AccessControlFlags::PRIVATE_KEY_USAGE));
        assert!(spec.flags.contains(AccessControlFlags::BIOMETRY_CURRENT_SET));
        assert_eq!(spec.reuse_duration_seconds, 60);

        let weak = AccessPolicy::biometric(0, BiometricStrength::Weak);
        let NativeAccessDescriptor::AccessControl(spec) = ops.apply_access_policy(&weak).unwrap()
        else {
            panic!("expected access control");
        };
        assert!(spec.flags.contains(AccessControlFlags::USER_PRESENCE));
        assert!(!spec.flags.contains(AccessControlFlags::BIOMETRY_CURRENT_SET));
    }

    #[test]
    fn test_software_rejects_auth() {
        let ops = PlatformCryptoOps::for_capabilities(&PlatformCapabilities::software());

        assert_eq!(
            ops.apply_access_policy(&AccessPolicy::none()).unwrap(),
            NativeAccessDescriptor::SoftwareProtection
        );
        assert!(matches!(
            ops.apply_access_policy(&AccessPolicy::biometric(10, BiometricStrength::Weak)),
            Err(KeyringError::PolicyUnsupported { .. })
        ));
    }

    #[test]
    fn test_carried_policy() {
        let policy = AccessPolicy::biometric(20, BiometricStrength::Strong);
        let ops = PlatformCryptoOps::for_capabilities(&PlatformCapabilities::hardware_keystore())
            .with_access_policy(policy)
            .unwrap();
        assert_eq!(ops.access_policy(), policy);
        assert!(ops.native_descriptor().unwrap().requires_user_authentication());

        let software = PlatformCryptoOps::for_capabilities(&PlatformCapabilities::software());
        assert_eq!(software.access_policy(), AccessPolicy::none());
        assert!(software.clone().with_access_policy(AccessPolicy::none()).is_ok());
        assert!(matches!(
            software.with_access_policy(policy),
            Err(KeyringError::PolicyUnsupported { .. })
        ));
    }

    #[test]
    fn test_refresh_auth_context() {
        let now = Utc::now();
        let mut ops = PlatformCryptoOps::for_capabilities(&PlatformCapabilities::secure_enclave());
        assert!(ops.current_auth_context().is_none());

        let ctx = ops.refresh_auth_context(10, now).unwrap();
        assert_eq!(ctx.reuse_seconds, 10);
        assert_eq!(ctx.backend, BackendKind::SecureEnclave);
        assert_eq!(ops.current_auth_context(), Some(&ctx));

        let mut software = PlatformCryptoOps::SoftwareBacked(SoftwareOps);
        assert!(software.refresh_auth_context(10, now).is_none());
    }
}
