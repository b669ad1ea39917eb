//! # vaultkey-keyring
//!
//! Cross-platform key provider over native secure-key facilities.
//!
//! One operation set generates EC signing keys inside secure hardware, gates
//! their use on time-bounded biometric authentication, produces attestation
//! material for to-be-attested keys, signs data and keeps certificate chains.
//!
//! ## Platform Support
//!
//! | Platform | Store | Algorithms | Attestation | User auth |
//! |----------|-------|------------|-------------|-----------|
//! | Android | Keystore/StrongBox | ES256/ES384/ES512 | Key attestation chain | BiometricPrompt |
//! | iOS/macOS | Secure Enclave | ES256 | Enclave-signed statement | SecAccessControl |
//! | Fallback | Software | ES256/ES384/ES512 | None | None |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vaultkey_keyring::{get_platform_provider, KeyGenRequest, ProviderConfig};
//! use vaultkey_crypto::SignatureAlgorithm;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = get_platform_provider(None, ProviderConfig::default())?;
//!
//!     let request = KeyGenRequest::new(SignatureAlgorithm::Es256)
//!         .attestation_challenge(vaultkey_crypto::random_bytes(16));
//!     let key = provider.generate_key("Bartschlüssel", &request).await?;
//!
//!     let signature = provider
//!         .sign(b"Foo", &key.key_pair, SignatureAlgorithm::Es256)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

mod attestation;
mod clock;
mod config;
mod emulated;
mod error;
mod key;
mod ops;
mod prompt;
mod provider;
mod software;
mod store;
mod types;
mod window;

/// Platform-specific secure stores.
pub mod platform;

/// OS keyring persistence for the software store.
#[cfg(feature = "keyring-storage")]
pub mod keyring_storage;

use std::sync::Arc;

pub use attestation::{statement_chain, verify_statement_chain, AttestationStatement, ATTESTATION_VERSION};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChallengeConcurrency, ProviderConfig};
pub use emulated::EmulatedHardwareStore;
pub use error::KeyringError;
pub use key::{SigningKeyPair, TbaKey};
pub use ops::{
    authenticators, AccessControlFlags, AccessControlSpec, EnclaveOps, HardwareOps, KeystoreSpec,
    NativeAccessDescriptor, PlatformCryptoOps, SoftwareOps,
};
pub use prompt::{
    AuthResult, BiometricPromptController, PromptPresenter, PromptRequest, PromptResponder,
    PromptText, ScriptedPresenter, ScriptedResponse,
};
pub use provider::KeyProvider;
pub use software::SoftwareStore;
pub use store::{GenerateRequest, GeneratedKey, SecureStore, StoredKey};
pub use types::{AccessPolicy, AuthContext, BackendKind, BiometricStrength, KeyGenRequest};
pub use window::{AuthenticationWindow, KeyGuard, WindowDecision, WindowState};

pub use platform::{create_platform_store, create_software_store, detect_platform, PlatformCapabilities};

/// Get a provider on the best available store for the current platform.
///
/// Store selection priority:
/// 1. Android Keystore (StrongBox when configured and present)
/// 2. iOS/macOS Secure Enclave
/// 3. Software fallback (WARNING: no hardware binding, no user auth)
///
/// # Arguments
///
/// * `presenter` - Shows biometric prompts; `None` on headless hosts
/// * `config` - Provider configuration
///
/// # Errors
///
/// Returns error if no store can be initialized or `config` is invalid.
pub fn get_platform_provider(
    presenter: Option<Arc<dyn PromptPresenter>>,
    config: ProviderConfig,
) -> Result<KeyProvider, KeyringError> {
    let caps = detect_platform();

    tracing::info!(
        backend = %caps.backend,
        has_hardware = caps.has_hardware,
        "Platform provider: detected capabilities"
    );

    if !caps.has_hardware {
        tracing::warn!(
            "Platform provider: no hardware available, using software store. \
             Keys cannot require user authentication."
        );
    }

    let store = create_platform_store(false)?;
    KeyProvider::new(store, presenter, config)
}

/// Check if hardware-backed keys are available on this platform.
pub fn is_hardware_available() -> bool {
    detect_platform().has_hardware
}
