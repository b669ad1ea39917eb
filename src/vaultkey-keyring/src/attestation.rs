//! Key attestation statements.
//!
//! Backends without a vendor certificate chain (the emulated store, the Secure
//! Enclave without App Attest) vouch for a key with a signed statement:
//!
//! ```text
//! payload = "VAULTKEY-ATTEST-V1\n"
//!        || SHA-256(challenge)
//!        || SEC1(public_key)
//!        || SEC1(attestation_key)
//!        || issued_at (unix micros, big-endian i64)
//! signature = ES256(attestation_key, payload)
//! ```
//!
//! The chain a TBA key carries is `[statement JSON, attestation key SPKI DER]`,
//! leaf first, mirroring an X.509 chain's shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vaultkey_crypto::{constant_time_eq, verify, CryptoError, EcPublicKey, EcSignature};

use crate::error::KeyringError;

const MAGIC: &[u8] = b"VAULTKEY-ATTEST-V1\n";

/// Current statement format version.
pub const ATTESTATION_VERSION: u32 = 1;

/// Signed claim that `public_key` was generated in a secure store, bound to a
/// caller-supplied challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationStatement {
    /// Format version.
    pub version: u32,
    /// SHA-256 of the attestation challenge, hex.
    pub challenge_sha256: String,
    /// The attested key.
    pub public_key: EcPublicKey,
    /// Key that signed this statement.
    pub attestation_key: EcPublicKey,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// ES256 signature over the payload.
    pub signature: EcSignature,
}

impl AttestationStatement {
    /// Build and sign a statement. `sign` is called once with the payload and
    /// must sign it with the private half of `attestation_key`.
    ///
    /// # Errors
    ///
    /// Propagates the signer's error.
    pub fn issue<F>(
        challenge: &[u8],
        public_key: EcPublicKey,
        attestation_key: EcPublicKey,
        issued_at: DateTime<Utc>,
        sign: F,
    ) -> Result<Self, KeyringError>
    where
        F: FnOnce(&[u8]) -> Result<EcSignature, KeyringError>,
    {
        let challenge_sha256 = Sha256::digest(challenge).to_vec();
        let payload = payload(&challenge_sha256, &public_key, &attestation_key, issued_at);
        let signature = sign(&payload)?;

        Ok(Self {
            version: ATTESTATION_VERSION,
            challenge_sha256: hex::encode(challenge_sha256),
            public_key,
            attestation_key,
            issued_at,
            signature,
        })
    }

    /// Whether the statement is bound to `challenge` and correctly signed.
    ///
    /// # Errors
    ///
    /// Returns error if the statement is malformed.
    pub fn verify(&self, challenge: &[u8]) -> Result<bool, KeyringError> {
        if self.version != ATTESTATION_VERSION {
            return Ok(false);
        }

        let expected = Sha256::digest(challenge);
        let recorded = hex::decode(&self.challenge_sha256)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        if !constant_time_eq(&recorded, &expected) {
            return Ok(false);
        }

        let payload = payload(&recorded, &self.public_key, &self.attestation_key, self.issued_at);
        Ok(verify(&self.attestation_key, &payload, &self.signature)?)
    }

    /// Encode as a chain entry.
    ///
    /// # Errors
    ///
    /// Returns error if JSON encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, KeyringError> {
        serde_json::to_vec(self)
            .map_err(|e| CryptoError::SerializationError(e.to_string()).into())
    }

    /// Decode a chain entry.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a statement.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyringError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::SerializationError(e.to_string()).into())
    }
}

fn payload(
    challenge_sha256: &[u8],
    public_key: &EcPublicKey,
    attestation_key: &EcPublicKey,
    issued_at: DateTime<Utc>,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(256);
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(challenge_sha256);
    data.extend_from_slice(public_key.sec1_bytes());
    data.extend_from_slice(attestation_key.sec1_bytes());
    data.extend_from_slice(&issued_at.timestamp_micros().to_be_bytes());
    data
}

/// Build the two-entry chain for `statement`.
///
/// # Errors
///
/// Returns error if encoding fails.
pub fn statement_chain(statement: &AttestationStatement) -> Result<Vec<Vec<u8>>, KeyringError> {
    Ok(vec![
        statement.to_bytes()?,
        statement.attestation_key.to_spki_der()?,
    ])
}

/// Check a statement chain against `challenge` and return the leaf.
///
/// # Errors
///
/// Returns error if the chain is not a statement chain, the root does not
/// match the signer, or the statement does not verify.
pub fn verify_statement_chain(
    chain: &[Vec<u8>],
    challenge: &[u8],
) -> Result<AttestationStatement, KeyringError> {
    let [leaf, root] = chain else {
        return Err(CryptoError::SerializationError(format!(
            "statement chain must have 2 entries, got {}",
            chain.len()
        ))
        .into());
    };

    let statement = AttestationStatement::from_bytes(leaf)?;
    let root_key = EcPublicKey::from_spki_der(root)?;
    if root_key != statement.attestation_key {
        return Err(CryptoError::invalid_public_key("chain root does not match statement signer").into());
    }
    if !statement.verify(challenge)? {
        return Err(CryptoError::invalid_signature("attestation statement does not verify").into());
    }

    Ok(statement)
}
