//! Publisher identity creation and loading
//!
//! Every publisher owns a signed identity: its domain, ID, public keys and
//! validity period. In a deployed domain the Domain Security Service signs
//! the identity body; without a DSS the publisher self-signs as a
//! development fallback. The signature covers the base64url encoding of the
//! identity body's JSON serialization.

use crate::crypto::keys::{
    generate_signing_key, private_key_from_pem, public_key_from_pem, public_key_to_pem,
    private_key_to_pem,
};
use crate::crypto::signing::{sign_payload, verify_payload};
use crate::error::{IdentityError, Result};
use crate::messaging::address::make_publisher_identity_address;
use crate::messaging::messages::timestamp_now;
use crate::storage::cache;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Local, SecondsFormat};
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Validity period of a newly created identity
const IDENTITY_VALIDITY_DAYS: i64 = 365;

/// The signed identity body of a publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherIdentity {
    /// Domain the publisher belongs to
    pub domain: String,

    /// Publisher ID within the domain
    #[serde(rename = "publisherID")]
    pub publisher_id: String,

    /// PEM encoded public signing key
    #[serde(rename = "publicSigning")]
    pub public_signing: String,

    /// PEM encoded public encryption key
    #[serde(rename = "publicEncryption")]
    pub public_encryption: String,

    /// Publisher ID of the issuer; the DSS, or the publisher itself when
    /// self-signed
    pub issuer: String,

    /// Start of the validity period
    #[serde(rename = "validFrom")]
    pub valid_from: String,

    /// End of the validity period
    #[serde(rename = "validUntil")]
    pub valid_until: String,
}

/// Publisher identity publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherIdentityMessage {
    /// Identity address `<domain>/<publisherID>/$identity`
    pub address: String,

    /// Publisher ID, repeated for convenience
    #[serde(rename = "publisherID")]
    pub publisher_id: String,

    /// The signed identity body
    pub identity: PublisherIdentity,

    /// Signature by the issuer over the identity body
    #[serde(rename = "identitySignature")]
    pub identity_signature: String,

    /// Identity address of the issuer that produced the signature
    #[serde(rename = "signerAddress")]
    pub signer_address: String,

    /// Time of the last identity change
    pub timestamp: String,
}

/// A publisher's identity including its private keys
///
/// This is what the identity file stores; the private halves never appear
/// on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherFullIdentity {
    /// The public identity as published on the bus
    #[serde(flatten)]
    pub public: PublisherIdentityMessage,

    /// PEM encoded private signing key
    #[serde(rename = "privateSigning")]
    pub private_signing: String,

    /// PEM encoded private encryption key
    #[serde(rename = "privateEncryption")]
    pub private_encryption: String,
}

impl PublisherFullIdentity {
    /// Parse the private signing key from its stored PEM
    pub fn signing_key(&self) -> Result<SigningKey> {
        private_key_from_pem(&self.private_signing)
    }
}

/// Sign an identity body with an issuer's key
///
/// The signed bytes are the base64url encoding of the body's JSON
/// serialization; the signature is returned base64url encoded.
pub fn sign_identity(identity: &PublisherIdentity, key: &SigningKey) -> Result<String> {
    let body = serde_json::to_vec(identity).map_err(|e| IdentityError::KeyFormat {
        reason: format!("identity serialization failed: {}", e),
    })?;
    let encoded = URL_SAFE_NO_PAD.encode(body);
    let signature = sign_payload(key, encoded.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(signature))
}

/// Verify an identity body signature against an issuer's public key
pub fn verify_identity_signature(
    identity: &PublisherIdentity,
    signature: &str,
    key: &VerifyingKey,
) -> bool {
    let body = match serde_json::to_vec(identity) {
        Ok(body) => body,
        Err(_) => return false,
    };
    let encoded = URL_SAFE_NO_PAD.encode(body);
    let signature = match URL_SAFE_NO_PAD.decode(signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    verify_payload(key, encoded.as_bytes(), &signature)
}

/// Create a new self-signed identity for a publisher
///
/// Generates fresh signing and encryption keypairs and a one year validity
/// period. The identity is issued and signed by the publisher itself; a DSS
/// renews it with its own signature once the publisher joins a secured
/// domain.
pub fn create_identity(domain: &str, publisher_id: &str) -> Result<(PublisherFullIdentity, SigningKey)> {
    let signing_key = generate_signing_key();
    let encryption_key = generate_signing_key();

    let valid_from = Local::now();
    let valid_until = valid_from + Duration::days(IDENTITY_VALIDITY_DAYS);

    let identity = PublisherIdentity {
        domain: domain.to_string(),
        publisher_id: publisher_id.to_string(),
        public_signing: public_key_to_pem(signing_key.verifying_key())?,
        public_encryption: public_key_to_pem(encryption_key.verifying_key())?,
        issuer: publisher_id.to_string(),
        valid_from: valid_from.to_rfc3339_opts(SecondsFormat::Millis, false),
        valid_until: valid_until.to_rfc3339_opts(SecondsFormat::Millis, false),
    };
    let identity_signature = sign_identity(&identity, &signing_key)?;
    let address = make_publisher_identity_address(domain, publisher_id);

    let full = PublisherFullIdentity {
        public: PublisherIdentityMessage {
            address: address.clone(),
            publisher_id: publisher_id.to_string(),
            identity,
            identity_signature,
            signer_address: address,
            timestamp: timestamp_now(),
        },
        private_signing: private_key_to_pem(&signing_key)?,
        private_encryption: private_key_to_pem(&encryption_key)?,
    };
    Ok((full, signing_key))
}

/// Check that a stored identity is usable for the given domain and publisher
fn validate_identity(
    full: &PublisherFullIdentity,
    domain: &str,
    publisher_id: &str,
) -> Result<SigningKey> {
    let identity = &full.public.identity;
    if identity.domain != domain || identity.publisher_id != publisher_id {
        return Err(IdentityError::Mismatch {
            stored: format!("{}/{}", identity.domain, identity.publisher_id),
            expected: format!("{}/{}", domain, publisher_id),
        }
        .into());
    }
    if let Ok(valid_until) = DateTime::parse_from_rfc3339(&identity.valid_until) {
        if Local::now() > valid_until {
            return Err(IdentityError::Expired {
                address: full.public.address.clone(),
                valid_until: identity.valid_until.clone(),
            }
            .into());
        }
    }
    let signing_key = full.signing_key()?;
    // The stored public key must belong to the stored private key.
    let public_key = public_key_from_pem(&identity.public_signing)?;
    if &public_key != signing_key.verifying_key() {
        return Err(IdentityError::KeyFormat {
            reason: "stored public signing key does not match private key".to_string(),
        }
        .into());
    }
    Ok(signing_key)
}

/// Load a publisher identity from the config folder, or create one
///
/// An identity that is missing, expired, damaged or issued for a different
/// domain/publisher is discarded and replaced by a fresh self-signed one.
/// Failure to persist the new identity is logged and does not prevent
/// startup.
pub fn setup_publisher_identity(
    config_folder: &Path,
    domain: &str,
    publisher_id: &str,
) -> Result<(PublisherFullIdentity, SigningKey)> {
    match cache::load_identity(config_folder, publisher_id) {
        Ok(full) => match validate_identity(&full, domain, publisher_id) {
            Ok(signing_key) => {
                tracing::debug!(
                    "loaded identity for {} from {}",
                    full.public.address,
                    config_folder.display()
                );
                return Ok((full, signing_key));
            }
            Err(err) => {
                tracing::warn!("discarding stored identity: {}", err);
            }
        },
        Err(err) => {
            tracing::debug!("no stored identity for {}: {}", publisher_id, err);
        }
    }

    let (full, signing_key) = create_identity(domain, publisher_id)?;
    if let Err(err) = cache::save_identity(config_folder, publisher_id, &full) {
        tracing::error!(
            "failed to save identity for {}: {}",
            full.public.address,
            err
        );
    }
    Ok((full, signing_key))
}
