//! Signs racing a challenge on the same key.

use std::sync::Arc;

use vaultkey_crypto::SignatureAlgorithm;
use vaultkey_keyring::{
    ChallengeConcurrency, KeyringError, PlatformCapabilities, ScriptedResponse, SigningKeyPair,
};

use crate::Harness;

const ALIAS: &str = "shared";

async fn gated_key(harness: &Harness) -> SigningKeyPair {
    let ops = harness.biometric_ops(30);
    harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap()
}

fn spawn_sign(
    harness: &Harness,
    key: &SigningKeyPair,
) -> tokio::task::JoinHandle<Result<vaultkey_crypto::EcSignature, KeyringError>> {
    let provider = Arc::clone(&harness.provider);
    let key = key.clone();
    tokio::spawn(async move { provider.sign(b"Foo", &key, SignatureAlgorithm::Es256).await })
}

async fn wait_for_prompt(harness: &Harness) {
    for _ in 0..1000 {
        if harness.presenter.held_count() > 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("prompt never shown");
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn queued_signs_share_one_challenge() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    harness.presenter.push(ScriptedResponse::Hold);
    let key = gated_key(&harness).await;

    let first = spawn_sign(&harness, &key);
    wait_for_prompt(&harness).await;
    assert!(key.guard().challenge_in_flight());

    let second = spawn_sign(&harness, &key);
    let third = spawn_sign(&harness, &key);
    settle().await;
    assert_eq!(harness.presenter.prompt_count(), 1);

    assert_eq!(harness.presenter.release(ScriptedResponse::Succeed), 1);
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    third.await.unwrap().unwrap();

    assert_eq!(harness.presenter.prompt_count(), 1);
    assert!(!key.guard().challenge_in_flight());
}

#[tokio::test]
async fn queued_signs_after_cancel_challenge_again() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    harness.presenter.push(ScriptedResponse::Hold);
    let key = gated_key(&harness).await;

    let first = spawn_sign(&harness, &key);
    wait_for_prompt(&harness).await;
    let second = spawn_sign(&harness, &key);
    settle().await;

    harness.presenter.release(ScriptedResponse::Cancel);
    assert!(matches!(first.await.unwrap(), Err(KeyringError::Cancelled)));

    // The waiter finds the window still unauthenticated and runs its own
    // challenge, which the exhausted script answers with success.
    second.await.unwrap().unwrap();
    assert_eq!(harness.presenter.prompt_count(), 2);
}

#[tokio::test]
async fn fail_fast_rejects_second_sign() {
    let harness = Harness::with_concurrency(
        PlatformCapabilities::hardware_keystore(),
        ChallengeConcurrency::FailFast,
    );
    harness.presenter.push(ScriptedResponse::Hold);
    let key = gated_key(&harness).await;

    let first = spawn_sign(&harness, &key);
    wait_for_prompt(&harness).await;

    let err = harness
        .provider
        .sign(b"Foo", &key, SignatureAlgorithm::Es256)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::ChallengeInProgress { ref alias } if alias == ALIAS));
    assert!(err.is_retryable());

    harness.presenter.release(ScriptedResponse::Succeed);
    first.await.unwrap().unwrap();

    // Window is now valid; a retry proceeds without a prompt.
    harness
        .provider
        .sign(b"Foo", &key, SignatureAlgorithm::Es256)
        .await
        .unwrap();
    assert_eq!(harness.presenter.prompt_count(), 1);
}

#[tokio::test]
async fn aborted_sign_clears_in_flight_flag() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    harness.presenter.push(ScriptedResponse::Hold);
    let key = gated_key(&harness).await;

    let first = spawn_sign(&harness, &key);
    wait_for_prompt(&harness).await;
    assert!(key.guard().challenge_in_flight());

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert!(!key.guard().challenge_in_flight());

    harness
        .provider
        .sign(b"Foo", &key, SignatureAlgorithm::Es256)
        .await
        .unwrap();
    assert_eq!(harness.presenter.prompt_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_signs_never_overlap_challenges() {
    let harness = Harness::new(PlatformCapabilities::secure_enclave());
    let key = gated_key(&harness).await;

    let handles: Vec<_> = (0..16).map(|_| spawn_sign(&harness, &key)).collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(harness.presenter.prompt_count(), 1);
}
