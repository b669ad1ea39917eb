//! Authentication window behaviour under a manual clock.

use proptest::prelude::*;
use vaultkey_crypto::SignatureAlgorithm;
use vaultkey_keyring::{
    ChallengeConcurrency, Clock, KeyringError, PlatformCapabilities, ProviderConfig, ScriptedResponse,
    WindowState,
};

use crate::Harness;

const ALIAS: &str = "windowed";

async fn sign(harness: &Harness, key: &vaultkey_keyring::SigningKeyPair) -> Result<(), KeyringError> {
    harness
        .provider
        .sign(b"Foo", key, SignatureAlgorithm::Es256)
        .await
        .map(|_| ())
}

#[tokio::test]
async fn window_is_fixed_not_sliding() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let ops = harness.biometric_ops(10);
    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();

    let t0 = harness.clock.now();
    sign(&harness, &key).await.unwrap();
    assert_eq!(harness.presenter.prompt_count(), 1);
    assert_eq!(
        harness.provider.window_state(&key).await,
        WindowState::Valid {
            until: t0 + chrono::Duration::seconds(10)
        }
    );

    for _ in 0..9 {
        harness.clock.advance_secs(1);
        sign(&harness, &key).await.unwrap();
    }
    assert_eq!(harness.presenter.prompt_count(), 1);

    // t0 + 11: past the fixed expiry.
    harness.clock.advance_secs(2);
    assert_eq!(harness.provider.window_state(&key).await, WindowState::Expired);
    sign(&harness, &key).await.unwrap();
    assert_eq!(harness.presenter.prompt_count(), 2);
    assert!(matches!(
        harness.provider.window_state(&key).await,
        WindowState::Valid { .. }
    ));
}

#[tokio::test]
async fn zero_timeout_challenges_every_sign() {
    let harness = Harness::new(PlatformCapabilities::secure_enclave());
    let ops = harness.biometric_ops(0);
    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();

    for expected in 1..=4 {
        sign(&harness, &key).await.unwrap();
        assert_eq!(harness.presenter.prompt_count(), expected);
    }
}

#[tokio::test]
async fn failed_challenge_keeps_state() {
    let harness = Harness::scripted(
        PlatformCapabilities::hardware_keystore(),
        [
            ScriptedResponse::Fail {
                code: 7,
                message: "Too many attempts".into(),
            },
            ScriptedResponse::Cancel,
            ScriptedResponse::Abandon,
        ],
    );
    let ops = harness.biometric_ops(10);
    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();

    let err = sign(&harness, &key).await.unwrap_err();
    assert!(matches!(err, KeyringError::AuthenticationFailed { code: 7, .. }));
    assert!(err.is_retryable());
    assert_eq!(
        harness.provider.window_state(&key).await,
        WindowState::AwaitingAuthentication
    );

    assert!(matches!(sign(&harness, &key).await, Err(KeyringError::Cancelled)));
    assert!(matches!(sign(&harness, &key).await, Err(KeyringError::Cancelled)));
    assert_eq!(
        harness.provider.window_state(&key).await,
        WindowState::AwaitingAuthentication
    );

    // Script exhausted: the next prompt succeeds.
    sign(&harness, &key).await.unwrap();
    assert_eq!(harness.presenter.prompt_count(), 4);
}

#[tokio::test]
async fn expired_failure_stays_expired() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let ops = harness.biometric_ops(5);
    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    sign(&harness, &key).await.unwrap();

    harness.clock.advance_secs(6);
    harness.presenter.push(ScriptedResponse::Cancel);
    assert!(matches!(sign(&harness, &key).await, Err(KeyringError::Cancelled)));
    assert_eq!(harness.provider.window_state(&key).await, WindowState::Expired);
}

#[tokio::test(start_paused = true)]
async fn unanswered_prompt_times_out_as_cancelled() {
    let config = ProviderConfig::default()
        .challenge_timeout(Some(std::time::Duration::from_secs(30)))
        .concurrency(ChallengeConcurrency::Queue);
    let harness = Harness::with_config(
        PlatformCapabilities::hardware_keystore(),
        config,
        [ScriptedResponse::Hold],
    );
    let ops = harness.biometric_ops(10);
    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();

    assert!(matches!(sign(&harness, &key).await, Err(KeyringError::Cancelled)));
    assert_eq!(harness.presenter.held_count(), 1);
}

#[tokio::test]
async fn no_auth_key_never_prompts() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let ops = harness.provider.platform_ops();
    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();

    harness.clock.advance_secs(1_000_000);
    sign(&harness, &key).await.unwrap();
    harness.provider.authenticate(&key).await.unwrap();
    assert_eq!(harness.presenter.prompt_count(), 0);
    assert_eq!(harness.provider.window_state(&key).await, WindowState::NoAuthRequired);
}

#[tokio::test]
async fn recreation_resets_window() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let ops = harness.biometric_ops(60);
    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    sign(&harness, &key).await.unwrap();

    let fresh = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    assert_eq!(
        harness.provider.window_state(&fresh).await,
        WindowState::AwaitingAuthentication
    );
    sign(&harness, &fresh).await.unwrap();
    assert_eq!(harness.presenter.prompt_count(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Over a sign schedule, a challenge happens exactly when the window
    /// opened by the previous challenge has lapsed.
    #[test]
    fn challenges_track_expiry(
        timeout in 1u32..30,
        gaps in prop::collection::vec(0i64..40, 1..12)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let harness = Harness::new(PlatformCapabilities::hardware_keystore());
            let ops = harness.biometric_ops(timeout);
            let key = harness
                .provider
                .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
                .await
                .unwrap();

            let mut valid_until: Option<chrono::DateTime<chrono::Utc>> = None;
            let mut expected = 0;
            for gap in gaps {
                harness.clock.advance_secs(gap);
                let now = harness.clock.now();
                if valid_until.map_or(true, |until| now >= until) {
                    expected += 1;
                    valid_until = Some(now + chrono::Duration::seconds(i64::from(timeout)));
                }
                sign(&harness, &key).await.unwrap();
                assert_eq!(harness.presenter.prompt_count(), expected);
            }
        });
    }
}
