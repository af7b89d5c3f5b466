//! ES256 signature creation and verification
//!
//! Signatures are ECDSA over the SHA-256 digest of the payload, carried as
//! the raw 64-byte `r || s` concatenation that JWS expects.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

/// Sign a payload, returning the raw 64-byte `r || s` signature
pub fn sign_payload(key: &SigningKey, payload: &[u8]) -> Vec<u8> {
    let signature: Signature = key.sign(payload);
    signature.to_bytes().to_vec()
}

/// Verify a raw `r || s` signature over a payload
///
/// Returns `false` for signatures of the wrong length or outside the curve
/// order as well as for honest mismatches.
pub fn verify_payload(key: &VerifyingKey, payload: &[u8], signature: &[u8]) -> bool {
    match Signature::from_slice(signature) {
        Ok(signature) => key.verify(payload, &signature).is_ok(),
        Err(_) => false,
    }
}
