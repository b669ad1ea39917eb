//! Key lifecycle through the provider.

use std::time::Duration;

use vaultkey_crypto::{random_bytes, verify, SignatureAlgorithm};
use vaultkey_keyring::{
    verify_statement_chain, AccessPolicy, BiometricStrength, KeyGenRequest, KeyringError,
    PlatformCapabilities, WindowState,
};

use crate::{software_provider, Harness};

const ALIAS: &str = "Bartschlüssel";

#[tokio::test]
async fn curve_follows_algorithm_on_every_backend() {
    let software = software_provider();
    let keystore = Harness::new(PlatformCapabilities::hardware_keystore());

    for provider in [&software, keystore.provider.as_ref()] {
        let ops = provider.platform_ops();
        for alg in SignatureAlgorithm::ALL {
            provider.create_signing_key(ALIAS, alg, &ops).await.unwrap();
            let public = provider.get_public_key(ALIAS).await.unwrap();
            assert_eq!(public.curve(), alg.curve(), "{alg} on {}", provider.backend());
        }
    }
}

#[tokio::test]
async fn enclave_is_p256_only() {
    let harness = Harness::new(PlatformCapabilities::secure_enclave());
    let ops = harness.provider.platform_ops();

    let key = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    assert_eq!(key.public_key().curve(), SignatureAlgorithm::Es256.curve());

    let err = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es384, &ops)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::KeyGeneration { .. }));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let provider = software_provider();
    let ops = provider.platform_ops();

    provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    provider.delete_key(ALIAS, &ops).await.unwrap();
    provider.delete_key(ALIAS, &ops).await.unwrap();

    assert!(!provider.has_key(ALIAS, &ops).await.unwrap());
    assert!(matches!(
        provider.get_public_key(ALIAS).await,
        Err(KeyringError::KeyNotFound { .. })
    ));
}

#[tokio::test]
async fn recreation_replaces_key() {
    let provider = software_provider();
    let ops = provider.platform_ops();

    let first = provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    let second = provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();

    assert!(provider.has_key(ALIAS, &ops).await.unwrap());
    assert_ne!(first.public_key(), second.public_key());
    assert_eq!(&provider.get_public_key(ALIAS).await.unwrap(), second.public_key());

    // The stale handle no longer reaches the alias.
    let err = provider
        .sign(b"Foo", &first, SignatureAlgorithm::Es256)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::KeyNotFound { .. }));
    provider.sign(b"Foo", &second, SignatureAlgorithm::Es256).await.unwrap();
}

#[tokio::test]
async fn missing_key() {
    let provider = software_provider();
    let ops = provider.platform_ops();

    assert!(!provider.has_key("nope", &ops).await.unwrap());
    assert!(matches!(
        provider.get_key_pair("nope", &ops).await,
        Err(KeyringError::KeyNotFound { .. })
    ));
}

#[tokio::test]
async fn plain_key_signs_foo() {
    let provider = software_provider();

    let key = provider
        .generate_key(ALIAS, &KeyGenRequest::new(SignatureAlgorithm::Es256))
        .await
        .unwrap();
    assert!(key.attestation_chain.is_empty());

    let signature = provider
        .sign(b"Foo", &key.key_pair, SignatureAlgorithm::Es256)
        .await
        .unwrap();
    assert!(verify(key.key_pair.public_key(), b"Foo", &signature).unwrap());
    assert!(!verify(key.key_pair.public_key(), b"Bar", &signature).unwrap());
}

#[tokio::test]
async fn tba_key_is_bound_to_challenge() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let ops = harness.provider.platform_ops();
    let challenge = random_bytes(16);

    let tba = harness
        .provider
        .create_tba_key(ALIAS, &challenge, &ops)
        .await
        .unwrap();
    assert!(tba.is_attested());
    assert_eq!(tba.key_pair.algorithm(), SignatureAlgorithm::Es256);

    let statement = verify_statement_chain(&tba.attestation_chain, &challenge).unwrap();
    assert_eq!(&statement.public_key, tba.key_pair.public_key());

    let other = random_bytes(16);
    assert!(verify_statement_chain(&tba.attestation_chain, &other).is_err());
}

#[tokio::test]
async fn software_cannot_attest() {
    let provider = software_provider();
    let ops = provider.platform_ops();

    let err = provider
        .create_tba_key(ALIAS, &random_bytes(16), &ops)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::AttestationUnavailable { .. }));
}

#[tokio::test]
async fn generate_key_with_biometric_timeout() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let request = KeyGenRequest::new(SignatureAlgorithm::Es256)
        .attestation_challenge(random_bytes(16))
        .biometric_timeout(Duration::from_secs(20));

    let key = harness.provider.generate_key(ALIAS, &request).await.unwrap();
    assert!(key.is_attested());
    assert_eq!(
        harness.provider.window_state(&key.key_pair).await,
        WindowState::AwaitingAuthentication
    );

    harness
        .provider
        .sign(b"Foo", &key.key_pair, SignatureAlgorithm::Es256)
        .await
        .unwrap();
    assert_eq!(harness.presenter.prompt_count(), 1);

    let request = &harness.presenter.requests()[0];
    assert_eq!(request.alias, ALIAS);
    assert_eq!(request.reuse_seconds, 20);
    assert_eq!(request.title, "Biometric Auth");
}

#[tokio::test]
async fn software_rejects_biometric_request() {
    let provider = software_provider();
    let request =
        KeyGenRequest::new(SignatureAlgorithm::Es256).biometric_timeout(Duration::from_secs(10));

    assert!(matches!(
        provider.generate_key(ALIAS, &request).await,
        Err(KeyringError::PolicyUnsupported { .. })
    ));
}

#[tokio::test]
async fn loaded_handles_share_window() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let ops = harness.biometric_ops(30);

    let created = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    let loaded = harness.provider.get_key_pair(ALIAS, &ops).await.unwrap();
    assert!(created.shares_window_with(&loaded));
    assert_eq!(loaded.platform_ops().access_policy(), ops.access_policy());

    harness
        .provider
        .sign(b"Foo", &created, SignatureAlgorithm::Es256)
        .await
        .unwrap();
    harness
        .provider
        .sign(b"Foo", &loaded, SignatureAlgorithm::Es256)
        .await
        .unwrap();
    assert_eq!(harness.presenter.prompt_count(), 1);
}

#[tokio::test]
async fn keystore_refuses_policies_it_cannot_hold() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let plain = harness.provider.platform_ops();
    let existing = harness
        .provider
        .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &plain)
        .await
        .unwrap();

    for policy in [
        AccessPolicy::biometric(0, BiometricStrength::Strong),
        AccessPolicy::biometric(10, BiometricStrength::Weak),
    ] {
        let ops = plain.clone().with_access_policy(policy).unwrap();
        let err = harness
            .provider
            .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::PolicyUnsupported { .. }), "{policy:?}");
    }

    let per_use = KeyGenRequest::new(SignatureAlgorithm::Es256).biometric_timeout(Duration::ZERO);
    assert!(matches!(
        harness.provider.generate_key(ALIAS, &per_use).await,
        Err(KeyringError::PolicyUnsupported { .. })
    ));

    // The earlier key is still in place and usable.
    assert_eq!(&harness.provider.get_public_key(ALIAS).await.unwrap(), existing.public_key());
    harness
        .provider
        .sign(b"Foo", &existing, SignatureAlgorithm::Es256)
        .await
        .unwrap();
}

#[tokio::test]
async fn created_handle_survives_reload() {
    for timeout in [1, 20] {
        let harness = Harness::new(PlatformCapabilities::hardware_keystore());
        let ops = harness.biometric_ops(timeout);
        let created = harness
            .provider
            .create_signing_key(ALIAS, SignatureAlgorithm::Es256, &ops)
            .await
            .unwrap();

        let loaded = harness.provider.get_key_pair(ALIAS, &ops).await.unwrap();
        assert_eq!(loaded.platform_ops().access_policy(), ops.access_policy());

        harness
            .provider
            .sign(b"Foo", &created, SignatureAlgorithm::Es256)
            .await
            .unwrap();
        harness
            .provider
            .sign(b"Foo", &loaded, SignatureAlgorithm::Es256)
            .await
            .unwrap();
        assert_eq!(harness.presenter.prompt_count(), 1);
    }
}
