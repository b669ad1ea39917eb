//! # vaultkey-crypto
//!
//! Elliptic-curve signature primitives for vaultkey.
//!
//! Every key and signature is tagged with a [`SignatureAlgorithm`], which fixes
//! the curve and digest:
//!
//! | Algorithm | Curve | Digest  | Raw signature |
//! |-----------|-------|---------|---------------|
//! | ES256     | P-256 | SHA-256 | 64 bytes      |
//! | ES384     | P-384 | SHA-384 | 96 bytes      |
//! | ES512     | P-521 | SHA-512 | 132 bytes     |
//!
//! Hardware keystores hand back DER signatures and SPKI public keys; the types
//! here normalize both to fixed-width `r || s` and uncompressed SEC1 points so
//! signatures from any backend verify the same way.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod ecdsa;
mod error;
mod types;

pub use ecdsa::{verify, EcSigningKey, EcVerifier};
pub use error::CryptoError;
pub use types::{EcCurve, EcPublicKey, EcSignature, SignatureAlgorithm};

/// Constant-time byte comparison.
///
/// Compares two byte slices in constant time to prevent timing attacks.
/// Returns `true` if the slices are equal, `false` otherwise.
///
/// # Security
///
/// Use this for all comparisons of digests and challenges.
/// The length check returns early; length is not secret here.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Fill a fresh buffer of `len` bytes from the OS CSPRNG.
///
/// Used for attestation challenges and authentication context ids.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand_core::{OsRng, RngCore};

    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}
