//! Algorithm, curve, key and signature types.
//!
//! The signature algorithm is the single source of truth: it fixes the curve
//! and the message digest. A curve is never inferred from a key size.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// ECDSA signature algorithm, named after its JOSE identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SignatureAlgorithm {
    /// ECDSA on P-256 with SHA-256.
    /// The only algorithm mobile secure hardware attests.
    #[default]
    #[serde(rename = "ES256")]
    Es256,

    /// ECDSA on P-384 with SHA-384.
    #[serde(rename = "ES384")]
    Es384,

    /// ECDSA on P-521 with SHA-512.
    #[serde(rename = "ES512")]
    Es512,
}

impl SignatureAlgorithm {
    /// All supported algorithms, weakest first.
    pub const ALL: [Self; 3] = [Self::Es256, Self::Es384, Self::Es512];

    /// The curve mandated by this algorithm.
    #[must_use]
    pub const fn curve(&self) -> EcCurve {
        match self {
            Self::Es256 => EcCurve::P256,
            Self::Es384 => EcCurve::P384,
            Self::Es512 => EcCurve::P521,
        }
    }

    /// JOSE algorithm name (`ES256`, ...).
    #[must_use]
    pub const fn jose_name(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
        }
    }

    /// Message digest name as used by JCA (`SHA-256`, ...).
    #[must_use]
    pub const fn digest_name(&self) -> &'static str {
        match self {
            Self::Es256 => "SHA-256",
            Self::Es384 => "SHA-384",
            Self::Es512 => "SHA-512",
        }
    }

    /// JCA signature algorithm name (`SHA256withECDSA`, ...).
    #[must_use]
    pub const fn jca_name(&self) -> &'static str {
        match self {
            Self::Es256 => "SHA256withECDSA",
            Self::Es384 => "SHA384withECDSA",
            Self::Es512 => "SHA512withECDSA",
        }
    }

    /// OID for this algorithm (for X.509/PKCS).
    #[must_use]
    pub const fn oid(&self) -> &'static str {
        match self {
            Self::Es256 => "1.2.840.10045.4.3.2", // ecdsa-with-SHA256
            Self::Es384 => "1.2.840.10045.4.3.3", // ecdsa-with-SHA384
            Self::Es512 => "1.2.840.10045.4.3.4", // ecdsa-with-SHA512
        }
    }

    /// Size of a fixed-width `r || s` signature in bytes.
    #[must_use]
    pub const fn signature_size(&self) -> usize {
        self.curve().field_size() * 2
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.jose_name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ES256" => Ok(Self::Es256),
            "ES384" => Ok(Self::Es384),
            "ES512" => Ok(Self::Es512),
            _ => Err(CryptoError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            }),
        }
    }
}

/// NIST prime curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcCurve {
    /// NIST P-256 (secp256r1/prime256v1)
    P256,
    /// NIST P-384 (secp384r1)
    P384,
    /// NIST P-521 (secp521r1)
    P521,
}

impl EcCurve {
    /// Size of a field element (and scalar) in bytes.
    #[must_use]
    pub const fn field_size(&self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// Key size in bits, as native key generators expect it.
    #[must_use]
    pub const fn key_size_bits(&self) -> u32 {
        match self {
            Self::P256 => 256,
            Self::P384 => 384,
            Self::P521 => 521,
        }
    }

    /// Size of an uncompressed SEC1 point: `0x04 || X || Y`.
    #[must_use]
    pub const fn public_key_size(&self) -> usize {
        1 + self.field_size() * 2
    }

    /// SEC 2 curve name (`secp256r1`, ...).
    #[must_use]
    pub const fn sec_name(&self) -> &'static str {
        match self {
            Self::P256 => "secp256r1",
            Self::P384 => "secp384r1",
            Self::P521 => "secp521r1",
        }
    }

    /// Named-curve OID.
    #[must_use]
    pub const fn oid(&self) -> &'static str {
        match self {
            Self::P256 => "1.2.840.10045.3.1.7",
            Self::P384 => "1.3.132.0.34",
            Self::P521 => "1.3.132.0.35",
        }
    }

    /// The one algorithm that signs on this curve.
    #[must_use]
    pub const fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::P256 => SignatureAlgorithm::Es256,
            Self::P384 => SignatureAlgorithm::Es384,
            Self::P521 => SignatureAlgorithm::Es512,
        }
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        };
        f.write_str(name)
    }
}

/// EC public key: curve plus uncompressed SEC1 point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcPublicKey {
    curve: EcCurve,
    #[serde(with = "hex_bytes")]
    point: Vec<u8>,
}

impl EcPublicKey {
    /// Parse a SEC1-encoded point (compressed or uncompressed) on `curve`.
    ///
    /// The point is validated and normalized to uncompressed form.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid point on the curve.
    pub fn from_sec1(curve: EcCurve, bytes: &[u8]) -> Result<Self, CryptoError> {
        let point = match curve {
            EcCurve::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(|vk| vk.to_encoded_point(false).as_bytes().to_vec()),
            EcCurve::P384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(|vk| vk.to_encoded_point(false).as_bytes().to_vec()),
            EcCurve::P521 => p521::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(|vk| vk.to_encoded_point(false).as_bytes().to_vec()),
        }
        .map_err(|e| CryptoError::invalid_public_key(format!("{curve}: {e}")))?;

        Ok(Self { curve, point })
    }

    /// Parse a DER SubjectPublicKeyInfo, detecting the curve from its OID.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not an EC key on a supported curve.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        use p256::pkcs8::DecodePublicKey;

        if let Ok(pk) = p256::PublicKey::from_public_key_der(der) {
            return Ok(Self {
                curve: EcCurve::P256,
                point: pk.to_encoded_point(false).as_bytes().to_vec(),
            });
        }
        if let Ok(pk) = p384::PublicKey::from_public_key_der(der) {
            return Ok(Self {
                curve: EcCurve::P384,
                point: pk.to_encoded_point(false).as_bytes().to_vec(),
            });
        }
        if let Ok(pk) = p521::PublicKey::from_public_key_der(der) {
            return Ok(Self {
                curve: EcCurve::P521,
                point: pk.to_encoded_point(false).as_bytes().to_vec(),
            });
        }

        Err(CryptoError::invalid_public_key(
            "SubjectPublicKeyInfo is not a P-256, P-384 or P-521 key",
        ))
    }

    /// Encode as DER SubjectPublicKeyInfo.
    ///
    /// # Errors
    ///
    /// Returns error if the stored point cannot be re-parsed.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        use p256::pkcs8::EncodePublicKey;

        let der = match self.curve {
            EcCurve::P256 => p256::PublicKey::from_sec1_bytes(&self.point)
                .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?
                .to_public_key_der(),
            EcCurve::P384 => p384::PublicKey::from_sec1_bytes(&self.point)
                .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?
                .to_public_key_der(),
            EcCurve::P521 => p521::PublicKey::from_sec1_bytes(&self.point)
                .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?
                .to_public_key_der(),
        }
        .map_err(|e| CryptoError::SerializationError(e.to_string()))?;

        Ok(der.as_bytes().to_vec())
    }

    /// The curve this key lives on.
    #[must_use]
    pub fn curve(&self) -> EcCurve {
        self.curve
    }

    /// Uncompressed SEC1 point bytes.
    #[must_use]
    pub fn sec1_bytes(&self) -> &[u8] {
        &self.point
    }

    /// Affine X coordinate.
    #[must_use]
    pub fn x(&self) -> &[u8] {
        let n = self.curve.field_size();
        &self.point[1..=n]
    }

    /// Affine Y coordinate.
    #[must_use]
    pub fn y(&self) -> &[u8] {
        let n = self.curve.field_size();
        &self.point[1 + n..]
    }
}

/// ECDSA signature in fixed-width `r || s` form, tagged with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcSignature {
    algorithm: SignatureAlgorithm,
    #[serde(with = "hex_bytes")]
    raw: Vec<u8>,
}

impl EcSignature {
    /// Wrap a fixed-width `r || s` signature.
    ///
    /// # Errors
    ///
    /// Returns error if the length does not match the algorithm.
    pub fn from_raw(algorithm: SignatureAlgorithm, raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() != algorithm.signature_size() {
            return Err(CryptoError::invalid_signature(format!(
                "{algorithm} signature must be {} bytes, got {}",
                algorithm.signature_size(),
                raw.len()
            )));
        }
        Ok(Self {
            algorithm,
            raw: raw.to_vec(),
        })
    }

    /// Parse an ASN.1 DER `Ecdsa-Sig-Value`, as returned by native keystores.
    ///
    /// # Errors
    ///
    /// Returns error if the DER is malformed for the algorithm's curve.
    pub fn from_der(algorithm: SignatureAlgorithm, der: &[u8]) -> Result<Self, CryptoError> {
        let raw = match algorithm {
            SignatureAlgorithm::Es256 => p256::ecdsa::Signature::from_der(der)
                .map(|s| s.to_bytes().to_vec()),
            SignatureAlgorithm::Es384 => p384::ecdsa::Signature::from_der(der)
                .map(|s| s.to_bytes().to_vec()),
            SignatureAlgorithm::Es512 => p521::ecdsa::Signature::from_der(der)
                .map(|s| s.to_bytes().to_vec()),
        }
        .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        Ok(Self { algorithm, raw })
    }

    /// Encode as ASN.1 DER.
    ///
    /// # Errors
    ///
    /// Returns error if the raw bytes are not a valid signature.
    pub fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        let der = match self.algorithm {
            SignatureAlgorithm::Es256 => p256::ecdsa::Signature::from_slice(&self.raw)
                .map(|s| s.to_der().as_bytes().to_vec()),
            SignatureAlgorithm::Es384 => p384::ecdsa::Signature::from_slice(&self.raw)
                .map(|s| s.to_der().as_bytes().to_vec()),
            SignatureAlgorithm::Es512 => p521::ecdsa::Signature::from_slice(&self.raw)
                .map(|s| s.to_der().as_bytes().to_vec()),
        }
        .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        Ok(der)
    }

    /// The algorithm that produced this signature.
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Fixed-width `r || s` bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
