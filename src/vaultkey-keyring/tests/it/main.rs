//! Consolidated integration tests for vaultkey-keyring.
//!
//! One test binary keeps proptest suites from running as parallel processes.
//! See: https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use vaultkey_keyring::{
    AccessPolicy, BiometricStrength, ChallengeConcurrency, EmulatedHardwareStore, KeyProvider,
    ManualClock, PlatformCapabilities, PlatformCryptoOps, ProviderConfig, ScriptedPresenter,
    ScriptedResponse, SoftwareStore,
};

mod chain;
mod concurrency;
mod provider;
mod window;

/// Provider on an emulated hardware store, sharing one manual clock.
pub struct Harness {
    pub provider: Arc<KeyProvider>,
    pub presenter: Arc<ScriptedPresenter>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(caps: PlatformCapabilities) -> Self {
        Self::with_config(caps, ProviderConfig::default(), Vec::new())
    }

    pub fn scripted(
        caps: PlatformCapabilities,
        script: impl IntoIterator<Item = ScriptedResponse>,
    ) -> Self {
        Self::with_config(caps, ProviderConfig::default(), script)
    }

    pub fn with_concurrency(caps: PlatformCapabilities, concurrency: ChallengeConcurrency) -> Self {
        Self::with_config(caps, ProviderConfig::default().concurrency(concurrency), Vec::new())
    }

    pub fn with_config(
        caps: PlatformCapabilities,
        config: ProviderConfig,
        script: impl IntoIterator<Item = ScriptedResponse>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let store = EmulatedHardwareStore::with_clock(caps, clock.clone()).unwrap();
        let presenter = Arc::new(ScriptedPresenter::with_script(script));
        let provider = KeyProvider::with_clock(
            Arc::new(store),
            Some(presenter.clone()),
            config,
            clock.clone(),
        )
        .unwrap();

        Self {
            provider: Arc::new(provider),
            presenter,
            clock,
        }
    }

    /// Ops for the active backend carrying a strong biometric policy.
    pub fn biometric_ops(&self, timeout_seconds: u32) -> PlatformCryptoOps {
        self.provider
            .platform_ops()
            .with_access_policy(AccessPolicy::biometric(timeout_seconds, BiometricStrength::Strong))
            .unwrap()
    }
}

pub fn software_provider() -> KeyProvider {
    KeyProvider::new(Arc::new(SoftwareStore::new()), None, ProviderConfig::default()).unwrap()
}
