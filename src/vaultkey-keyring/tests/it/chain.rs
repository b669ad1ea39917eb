//! Certificate chain storage.

use proptest::prelude::*;
use vaultkey_crypto::SignatureAlgorithm;
use vaultkey_keyring::{KeyProvider, KeyringError, PlatformCapabilities};

use crate::{software_provider, Harness};

const CHAIN_ALIAS: &str = "BartschlüsselCRT_CHAIN";

fn chain() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Chains come back byte and order identical, including empty ones.
    #[test]
    fn chain_roundtrip(chain in chain()) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (software, emulated) = runtime.block_on(async {
            let provider = software_provider();
            provider.store_certificate_chain(CHAIN_ALIAS, &chain).await.unwrap();
            let software = provider.get_certificate_chain(CHAIN_ALIAS).await.unwrap();

            let harness = Harness::new(PlatformCapabilities::hardware_keystore());
            harness.provider.store_certificate_chain(CHAIN_ALIAS, &chain).await.unwrap();
            let emulated = harness.provider.get_certificate_chain(CHAIN_ALIAS).await.unwrap();
            (software, emulated)
        });
        prop_assert_eq!(&software, &chain);
        prop_assert_eq!(&emulated, &chain);
    }
}

#[tokio::test]
async fn missing_chain() {
    let provider = software_provider();
    assert!(matches!(
        provider.get_certificate_chain(CHAIN_ALIAS).await,
        Err(KeyringError::ChainNotFound { ref alias }) if alias == CHAIN_ALIAS
    ));
}

#[tokio::test]
async fn chain_replaced_on_store() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let provider = &harness.provider;

    provider
        .store_certificate_chain(CHAIN_ALIAS, &[vec![1u8], vec![2, 2]])
        .await
        .unwrap();
    provider.store_certificate_chain(CHAIN_ALIAS, &[vec![3u8]]).await.unwrap();

    assert_eq!(provider.get_certificate_chain(CHAIN_ALIAS).await.unwrap(), vec![vec![3u8]]);
}

#[tokio::test]
async fn attestation_chain_can_be_stored() {
    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    let ops = harness.provider.platform_ops();
    let challenge = vaultkey_crypto::random_bytes(16);

    let tba = harness
        .provider
        .create_tba_key("Bartschlüssel", &challenge, &ops)
        .await
        .unwrap();
    harness
        .provider
        .store_certificate_chain(CHAIN_ALIAS, &tba.attestation_chain)
        .await
        .unwrap();

    let loaded = harness.provider.get_certificate_chain(CHAIN_ALIAS).await.unwrap();
    assert_eq!(loaded, tba.attestation_chain);
    vaultkey_keyring::verify_statement_chain(&loaded, &challenge).unwrap();
}

async fn chain_survives_key_lifecycle(provider: &KeyProvider) {
    let chain = vec![vec![0x30u8, 0x82], vec![0x30, 0x03, 0x01]];
    let ops = provider.platform_ops();
    provider.store_certificate_chain("k", &chain).await.unwrap();

    provider
        .create_signing_key("k", SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    assert_eq!(provider.get_certificate_chain("k").await.unwrap(), chain);

    provider
        .create_signing_key("k", SignatureAlgorithm::Es256, &ops)
        .await
        .unwrap();
    assert_eq!(provider.get_certificate_chain("k").await.unwrap(), chain);

    provider.delete_key("k", &ops).await.unwrap();
    assert!(!provider.has_key("k", &ops).await.unwrap());
    assert_eq!(provider.get_certificate_chain("k").await.unwrap(), chain);
}

#[tokio::test]
async fn key_lifecycle_leaves_chain_alone() {
    chain_survives_key_lifecycle(&software_provider()).await;

    let harness = Harness::new(PlatformCapabilities::hardware_keystore());
    chain_survives_key_lifecycle(&harness.provider).await;

    let harness = Harness::new(PlatformCapabilities::secure_enclave());
    chain_survives_key_lifecycle(&harness.provider).await;
}
