//! Property-based tests for signing, verification and encodings.
//!
//! These tests verify invariants across all supported algorithms
//! using proptest to generate arbitrary inputs.

use vaultkey_crypto::{
    constant_time_eq, verify, CryptoError, EcPublicKey, EcSignature, EcSigningKey,
    SignatureAlgorithm,
};
use proptest::prelude::*;

/// Strategy for generating binary data of specified size range.
fn binary_data(min: usize, max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), min..=max)
}

fn algorithm() -> impl Strategy<Value = SignatureAlgorithm> {
    prop::sample::select(SignatureAlgorithm::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    // ========================================================================
    // Signing Properties
    // ========================================================================

    /// Sign-verify roundtrip always succeeds.
    #[test]
    fn sign_verify_roundtrip(alg in algorithm(), data in binary_data(0, 2048)) {
        let key = EcSigningKey::generate(alg);
        let signature = key.sign(&data).unwrap();

        prop_assert!(verify(&key.public_key(), &data, &signature).unwrap());
    }

    /// P-256 and P-384 signatures are deterministic for the same key and
    /// message (RFC 6979). The P-521 signer randomizes its nonce.
    #[test]
    fn sign_deterministic(
        alg in prop::sample::select(vec![SignatureAlgorithm::Es256, SignatureAlgorithm::Es384]),
        data in binary_data(1, 512)
    ) {
        let key = EcSigningKey::generate(alg);

        prop_assert_eq!(key.sign(&data).unwrap(), key.sign(&data).unwrap());
    }

    /// Verification fails for tampered data.
    #[test]
    fn tampered_data_fails(
        alg in algorithm(),
        data in binary_data(1, 1024),
        tamper_idx in any::<prop::sample::Index>()
    ) {
        let key = EcSigningKey::generate(alg);
        let signature = key.sign(&data).unwrap();

        let mut tampered = data.clone();
        let idx = tamper_idx.index(tampered.len());
        tampered[idx] ^= 0xFF;

        prop_assert!(!verify(&key.public_key(), &tampered, &signature).unwrap());
    }

    /// Verification fails (or rejects the encoding) for a tampered signature.
    #[test]
    fn tampered_signature_fails(
        alg in algorithm(),
        data in binary_data(1, 256),
        tamper_idx in any::<prop::sample::Index>()
    ) {
        let key = EcSigningKey::generate(alg);
        let signature = key.sign(&data).unwrap();

        let mut raw = signature.as_bytes().to_vec();
        let idx = tamper_idx.index(raw.len());
        raw[idx] ^= 0x01;
        let tampered = EcSignature::from_raw(alg, &raw).unwrap();

        if let Ok(valid) = verify(&key.public_key(), &data, &tampered) {
            prop_assert!(!valid);
        }
    }

    /// Verification fails for a different key of the same algorithm.
    #[test]
    fn wrong_key_fails(alg in algorithm(), data in binary_data(1, 512)) {
        let signer = EcSigningKey::generate(alg);
        let other = EcSigningKey::generate(alg);
        let signature = signer.sign(&data).unwrap();

        prop_assert!(!verify(&other.public_key(), &data, &signature).unwrap());
    }

    // ========================================================================
    // Encoding Properties
    // ========================================================================

    /// Raw signatures survive DER conversion.
    #[test]
    fn der_signature_conversion(alg in algorithm(), data in binary_data(0, 256)) {
        let key = EcSigningKey::generate(alg);
        let signature = key.sign(&data).unwrap();

        let der = signature.to_der().unwrap();
        prop_assert_eq!(der[0], 0x30);

        let back = EcSignature::from_der(alg, &der).unwrap();
        prop_assert_eq!(back, signature);
    }

    /// Public keys survive SPKI conversion with the curve detected from the OID.
    #[test]
    fn spki_public_key_conversion(alg in algorithm()) {
        let public_key = EcSigningKey::generate(alg).public_key();

        let der = public_key.to_spki_der().unwrap();
        let back = EcPublicKey::from_spki_der(&der).unwrap();

        prop_assert_eq!(back.curve(), alg.curve());
        prop_assert_eq!(back, public_key);
    }

    /// Uncompressed points have the curve's size and coordinates.
    #[test]
    fn public_key_layout(alg in algorithm()) {
        let public_key = EcSigningKey::generate(alg).public_key();
        let n = alg.curve().field_size();

        prop_assert_eq!(public_key.sec1_bytes().len(), alg.curve().public_key_size());
        prop_assert_eq!(public_key.sec1_bytes()[0], 0x04);
        prop_assert_eq!(public_key.x().len(), n);
        prop_assert_eq!(public_key.y().len(), n);
    }

    // ========================================================================
    // Constant-Time Comparison Properties
    // ========================================================================

    /// Constant-time comparison is reflexive (a == a).
    #[test]
    fn constant_time_reflexive(data in binary_data(0, 256)) {
        prop_assert!(constant_time_eq(&data, &data));
    }

    /// Constant-time comparison is symmetric (a == b implies b == a).
    #[test]
    fn constant_time_symmetric(
        a in binary_data(0, 256),
        b in binary_data(0, 256)
    ) {
        prop_assert_eq!(constant_time_eq(&a, &b), constant_time_eq(&b, &a));
    }

    /// Constant-time comparison detects single-byte differences.
    #[test]
    fn constant_time_detects_difference(
        data in binary_data(1, 256),
        idx in any::<prop::sample::Index>()
    ) {
        let mut modified = data.clone();
        let idx = idx.index(modified.len());
        modified[idx] ^= 0x01;

        prop_assert!(!constant_time_eq(&data, &modified));
    }
}

// ============================================================================
// Non-proptest Deterministic Tests
// ============================================================================

#[test]
fn test_empty_message() {
    let key = EcSigningKey::generate(SignatureAlgorithm::Es256);
    let signature = key.sign(b"").unwrap();

    assert!(verify(&key.public_key(), b"", &signature).unwrap());
}

#[test]
fn test_large_message() {
    let key = EcSigningKey::generate(SignatureAlgorithm::Es512);
    let data = vec![0x42u8; 10_000];

    let signature = key.sign(&data).unwrap();
    assert!(verify(&key.public_key(), &data, &signature).unwrap());
}

#[test]
fn test_signature_from_other_curve_rejected() {
    let es256 = EcSigningKey::generate(SignatureAlgorithm::Es256);
    let es512 = EcSigningKey::generate(SignatureAlgorithm::Es512);
    let signature = es512.sign(b"Foo").unwrap();

    assert!(matches!(
        verify(&es256.public_key(), b"Foo", &signature),
        Err(CryptoError::CurveMismatch { .. })
    ));
}

#[test]
fn test_der_from_wrong_curve_rejected() {
    let key = EcSigningKey::generate(SignatureAlgorithm::Es512);
    let der = key.sign(b"Foo").unwrap().to_der().unwrap();

    assert!(EcSignature::from_der(SignatureAlgorithm::Es256, &der).is_err());
}

#[test]
fn test_different_keys_different_signatures() {
    let k1 = EcSigningKey::generate(SignatureAlgorithm::Es256);
    let k2 = EcSigningKey::generate(SignatureAlgorithm::Es256);

    assert_ne!(k1.sign(b"test data").unwrap(), k2.sign(b"test data").unwrap());
}
