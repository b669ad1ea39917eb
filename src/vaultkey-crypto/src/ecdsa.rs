//! ECDSA signing and verification on the NIST prime curves.
//!
//! [`EcSigningKey`] is the software key used by the software and emulated
//! stores; hardware stores never expose one. [`EcVerifier`] checks signatures
//! from any backend against an [`EcPublicKey`].

use p256::ecdsa::signature::{Signer, Verifier};
use p256::elliptic_curve::rand_core::OsRng;

use crate::error::CryptoError;
use crate::types::{EcCurve, EcPublicKey, EcSignature, SignatureAlgorithm};

/// Software ECDSA signing key for one of the supported algorithms.
#[derive(Clone)]
pub enum EcSigningKey {
    /// ES256 key.
    P256(p256::ecdsa::SigningKey),
    /// ES384 key.
    P384(p384::ecdsa::SigningKey),
    /// ES512 key.
    P521(p521::ecdsa::SigningKey),
}

impl std::fmt::Debug for EcSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcSigningKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl EcSigningKey {
    /// Generate a fresh random key for `algorithm`.
    #[must_use]
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        match algorithm {
            SignatureAlgorithm::Es256 => Self::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            SignatureAlgorithm::Es384 => Self::P384(p384::ecdsa::SigningKey::random(&mut OsRng)),
            SignatureAlgorithm::Es512 => Self::P521(p521::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    /// Restore a key from its big-endian secret scalar.
    ///
    /// # Errors
    ///
    /// Returns error if the length is wrong for the curve or the scalar is
    /// out of range.
    pub fn from_bytes(algorithm: SignatureAlgorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        let expected = algorithm.curve().field_size();
        if bytes.len() != expected {
            return Err(CryptoError::invalid_private_key(format!(
                "{algorithm} secret must be {expected} bytes, got {}",
                bytes.len()
            )));
        }

        let key = match algorithm {
            SignatureAlgorithm::Es256 => {
                p256::ecdsa::SigningKey::from_bytes(p256::FieldBytes::from_slice(bytes))
                    .map(Self::P256)
            },
            SignatureAlgorithm::Es384 => {
                p384::ecdsa::SigningKey::from_bytes(p384::FieldBytes::from_slice(bytes))
                    .map(Self::P384)
            },
            SignatureAlgorithm::Es512 => {
                p521::ecdsa::SigningKey::from_bytes(p521::FieldBytes::from_slice(bytes))
                    .map(Self::P521)
            },
        }
        .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(key)
    }

    /// Export the secret scalar. Only software stores call this, to persist
    /// keys in the OS keyring.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::P256(k) => k.to_bytes().to_vec(),
            Self::P384(k) => k.to_bytes().to_vec(),
            Self::P521(k) => k.to_bytes().to_vec(),
        }
    }

    /// The algorithm this key signs with.
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::P256(_) => SignatureAlgorithm::Es256,
            Self::P384(_) => SignatureAlgorithm::Es384,
            Self::P521(_) => SignatureAlgorithm::Es512,
        }
    }

    /// The matching public key.
    #[must_use]
    pub fn public_key(&self) -> EcPublicKey {
        let (curve, point) = match self {
            Self::P256(k) => (
                EcCurve::P256,
                k.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            ),
            Self::P384(k) => (
                EcCurve::P384,
                k.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            ),
            Self::P521(k) => (
                EcCurve::P521,
                p521::ecdsa::VerifyingKey::from(k)
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec(),
            ),
        };

        // Points produced by the curve library are always valid.
        EcPublicKey::from_sec1(curve, &point).unwrap_or_else(|_| unreachable!())
    }

    /// Sign `data`. The message is hashed with the algorithm's digest.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying signer fails.
    pub fn sign(&self, data: &[u8]) -> Result<EcSignature, CryptoError> {
        let raw = match self {
            Self::P256(k) => Signer::<p256::ecdsa::Signature>::try_sign(k, data)
                .map(|s| s.to_bytes().to_vec()),
            Self::P384(k) => Signer::<p384::ecdsa::Signature>::try_sign(k, data)
                .map(|s| s.to_bytes().to_vec()),
            Self::P521(k) => Signer::<p521::ecdsa::Signature>::try_sign(k, data)
                .map(|s| s.to_bytes().to_vec()),
        }
        .map_err(|e| CryptoError::signing_failed(e.to_string()))?;

        EcSignature::from_raw(self.algorithm(), &raw)
    }
}

/// ECDSA verifier for all supported algorithms.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcVerifier;

impl EcVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Verify `signature` over `data` with `public_key`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify.
    ///
    /// # Errors
    ///
    /// Returns error if the signature algorithm does not match the key's curve
    /// or either value is malformed.
    pub fn verify(
        &self,
        public_key: &EcPublicKey,
        data: &[u8],
        signature: &EcSignature,
    ) -> Result<bool, CryptoError> {
        let expected = signature.algorithm().curve();
        if expected != public_key.curve() {
            return Err(CryptoError::CurveMismatch {
                expected,
                actual: public_key.curve(),
            });
        }

        let point = public_key.sec1_bytes();
        let sig = signature.as_bytes();

        let valid = match public_key.curve() {
            EcCurve::P256 => {
                let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
                let sig = p256::ecdsa::Signature::from_slice(sig)
                    .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;
                vk.verify(data, &sig).is_ok()
            },
            EcCurve::P384 => {
                let vk = p384::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
                let sig = p384::ecdsa::Signature::from_slice(sig)
                    .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;
                vk.verify(data, &sig).is_ok()
            },
            EcCurve::P521 => {
                let vk = p521::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
                let sig = p521::ecdsa::Signature::from_slice(sig)
                    .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;
                vk.verify(data, &sig).is_ok()
            },
        };

        Ok(valid)
    }
}

/// Verify `signature` over `data` with `public_key`.
///
/// Shorthand for [`EcVerifier::verify`].
///
/// # Errors
///
/// See [`EcVerifier::verify`].
pub fn verify(
    public_key: &EcPublicKey,
    data: &[u8],
    signature: &EcSignature,
) -> Result<bool, CryptoError> {
    EcVerifier::new().verify(public_key, data, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_all_algorithms() {
        for algorithm in SignatureAlgorithm::ALL {
            let key = EcSigningKey::generate(algorithm);
            let signature = key.sign(b"test message").unwrap();

            assert_eq!(signature.algorithm(), algorithm);
            assert_eq!(signature.as_bytes().len(), algorithm.signature_size());
            assert_eq!(key.public_key().curve(), algorithm.curve());
            assert!(verify(&key.public_key(), b"test message", &signature).unwrap());
        }
    }

    #[test]
    fn test_invalid_signature() {
        let key = EcSigningKey::generate(SignatureAlgorithm::Es256);
        let signature = key.sign(b"test message").unwrap();

        let mut raw = signature.as_bytes().to_vec();
        raw[0] ^= 0xFF;
        let corrupted = EcSignature::from_raw(SignatureAlgorithm::Es256, &raw).unwrap();

        // Corrupted r may fall outside the scalar range; either way it must not verify.
        let valid = verify(&key.public_key(), b"test message", &corrupted).unwrap_or(false);
        assert!(!valid);
    }

    #[test]
    fn test_wrong_data() {
        let key = EcSigningKey::generate(SignatureAlgorithm::Es384);
        let signature = key.sign(b"message 1").unwrap();

        assert!(!verify(&key.public_key(), b"message 2", &signature).unwrap());
    }

    #[test]
    fn test_curve_mismatch_is_an_error() {
        let p256_key = EcSigningKey::generate(SignatureAlgorithm::Es256);
        let p384_key = EcSigningKey::generate(SignatureAlgorithm::Es384);
        let signature = p384_key.sign(b"data").unwrap();

        let result = verify(&p256_key.public_key(), b"data", &signature);
        assert!(matches!(result, Err(CryptoError::CurveMismatch { .. })));
    }

    #[test]
    fn test_secret_roundtrip() {
        for algorithm in SignatureAlgorithm::ALL {
            let key = EcSigningKey::generate(algorithm);
            let restored = EcSigningKey::from_bytes(algorithm, &key.to_bytes()).unwrap();
            assert_eq!(key.public_key(), restored.public_key());
        }
    }

    #[test]
    fn test_secret_wrong_length() {
        let result = EcSigningKey::from_bytes(SignatureAlgorithm::Es512, &[1u8; 32]);
        assert!(matches!(result, Err(CryptoError::InvalidPrivateKey { .. })));
    }
}
