//! Platform-specific secure stores.
//!
//! Each platform has its own secure hardware:
//! - Android: Keystore (TEE or StrongBox)
//! - iOS/macOS: Secure Enclave (Apple Silicon / T2)
//! - Fallback: Software-only

#[cfg(target_os = "android")]
pub mod android;

#[cfg(any(target_os = "ios", target_os = "macos"))]
pub mod ios;

mod factory;

pub use factory::{create_platform_store, create_software_store, detect_platform, PlatformCapabilities};

#[cfg(target_os = "android")]
pub use android::AndroidKeystore;

#[cfg(any(target_os = "ios", target_os = "macos"))]
pub use ios::AppleKeychain;
