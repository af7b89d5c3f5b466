//! Cryptography module
//!
//! ECDSA P-256 (ES256) signing primitives and PEM key handling, built on
//! the RustCrypto `p256` crate.

pub mod keys;
pub mod signing;

// Re-export main types
pub use keys::{
    generate_signing_key, private_key_from_pem, private_key_to_pem, public_key_from_pem,
    public_key_to_pem,
};
pub use signing::{sign_payload, verify_payload};
