//! Platform detection and store factory.
//!
//! Detects the best available secure store and creates it. Falls back to
//! the software store when hardware is unavailable, unless the caller
//! insists on hardware.

use std::sync::Arc;

use crate::error::KeyringError;
use crate::software::SoftwareStore;
use crate::store::SecureStore;
use crate::types::BackendKind;

/// What the secure hardware of this device can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Best available backend.
    pub backend: BackendKind,
    /// Whether private keys are bound to secure hardware.
    pub has_hardware: bool,
    /// Class 3 biometrics are enrolled.
    pub strong_biometrics: bool,
    /// Class 2 biometrics or user presence are available.
    pub weak_biometrics: bool,
    /// A device PIN, pattern or passcode is set.
    pub device_credential: bool,
    /// A StrongBox secure element is present.
    pub strongbox: bool,
    /// Keys can be attested.
    pub attestation: bool,
}

impl PlatformCapabilities {
    /// Software-only host.
    #[must_use]
    pub const fn software() -> Self {
        Self {
            backend: BackendKind::Software,
            has_hardware: false,
            strong_biometrics: false,
            weak_biometrics: false,
            device_credential: false,
            strongbox: false,
            attestation: false,
        }
    }

    /// Android Keystore with biometrics, credential and attestation, but no
    /// StrongBox.
    #[must_use]
    pub const fn hardware_keystore() -> Self {
        Self {
            backend: BackendKind::HardwareKeystore,
            has_hardware: true,
            strong_biometrics: true,
            weak_biometrics: true,
            device_credential: true,
            strongbox: false,
            attestation: true,
        }
    }

    /// Secure Enclave with Touch ID / Face ID and passcode.
    #[must_use]
    pub const fn secure_enclave() -> Self {
        Self {
            backend: BackendKind::SecureEnclave,
            has_hardware: true,
            strong_biometrics: true,
            weak_biometrics: true,
            device_credential: true,
            strongbox: false,
            attestation: true,
        }
    }

    /// Whether any form of user authentication can gate keys.
    #[must_use]
    pub fn supports_user_auth(&self) -> bool {
        self.backend.supports_user_auth()
            && (self.strong_biometrics || self.weak_biometrics || self.device_credential)
    }
}

/// Detect capabilities of the current platform.
pub fn detect_platform() -> PlatformCapabilities {
    #[cfg(target_os = "android")]
    {
        detect_android_capabilities()
    }

    #[cfg(any(target_os = "ios", target_os = "macos"))]
    {
        detect_apple_capabilities()
    }

    #[cfg(not(any(target_os = "android", target_os = "ios", target_os = "macos")))]
    {
        PlatformCapabilities::software()
    }
}

#[cfg(target_os = "android")]
fn detect_android_capabilities() -> PlatformCapabilities {
    // PackageManager.hasSystemFeature needs an application context we do
    // not hold; StrongBox is probed at generation time instead.
    PlatformCapabilities::hardware_keystore()
}

#[cfg(any(target_os = "ios", target_os = "macos"))]
fn detect_apple_capabilities() -> PlatformCapabilities {
    PlatformCapabilities::secure_enclave()
}

/// Create the best available store for this platform.
///
/// # Arguments
///
/// * `require_hardware` - If true, fails instead of falling back to software
///
/// # Errors
///
/// Returns [`KeyringError::NoPlatformSupport`] if hardware is required but
/// unavailable.
pub fn create_platform_store(require_hardware: bool) -> Result<Arc<dyn SecureStore>, KeyringError> {
    let capabilities = detect_platform();

    tracing::info!(
        backend = %capabilities.backend,
        has_hardware = capabilities.has_hardware,
        require_hardware = require_hardware,
        "create_platform_store: starting"
    );

    if require_hardware && !capabilities.has_hardware {
        return Err(KeyringError::NoPlatformSupport);
    }

    #[cfg(target_os = "android")]
    {
        use super::AndroidKeystore;
        match AndroidKeystore::new(capabilities.clone()) {
            Ok(store) => return Ok(Arc::new(store)),
            Err(e) if require_hardware => return Err(e),
            Err(e) => {
                tracing::warn!("Android Keystore unavailable ({}), falling back to software store", e);
            },
        }
    }

    #[cfg(any(target_os = "ios", target_os = "macos"))]
    {
        use super::AppleKeychain;
        match AppleKeychain::new(capabilities.clone()) {
            Ok(store) => {
                tracing::info!("Using Secure Enclave store");
                return Ok(Arc::new(store));
            },
            Err(e) if require_hardware => return Err(e),
            Err(e) => {
                tracing::warn!("Secure Enclave not available ({}), falling back to software store", e);
            },
        }
    }

    if require_hardware {
        return Err(KeyringError::NoPlatformSupport);
    }

    tracing::warn!("Using software store (no secure hardware). Keys cannot require user authentication.");
    Ok(create_software_store())
}

/// Create a software-only store (for testing or hosts without hardware).
///
/// With the `keyring-storage` feature, keys persist in the OS keyring under
/// the `vaultkey` service.
pub fn create_software_store() -> Arc<dyn SecureStore> {
    #[cfg(feature = "keyring-storage")]
    {
        Arc::new(SoftwareStore::with_keyring("vaultkey"))
    }

    #[cfg(not(feature = "keyring-storage"))]
    {
        Arc::new(SoftwareStore::new())
    }
}
