//! Message envelope signing and verification
//!
//! Outbound messages are wrapped in a compact JWS-style envelope
//! `header.payload.signature` with base64url segments. The header declares
//! `alg=ES256` and carries the signer's identity address as `kid`; the
//! signature covers the exact transmitted `header.payload` bytes, so the
//! verifier never re-serializes the payload. With signing method `none` the
//! payload travels as raw bytes instead.

use crate::crypto::signing::{sign_payload, verify_payload};
use crate::error::{Result, SignerError};
use crate::messaging::messenger::Messenger;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The signature algorithm declared in every envelope header
pub const SIGNING_ALG: &str = "ES256";

/// Resolves a signer's identity address to its public signing key
///
/// Backed by the trust directory; returns `None` for unknown signers.
pub type PublicKeyResolver = Arc<dyn Fn(&str) -> Option<VerifyingKey> + Send + Sync>;

/// Signing method for outbound publications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SigningMethod {
    /// Wrap payloads in a signed JWS envelope (default)
    #[default]
    Jws,
    /// Publish raw payloads without a signature
    None,
}

/// Protected header of a signed envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    kid: String,
}

/// A parsed signed envelope, not yet verified
///
/// The discovery receiver needs the payload before verification in order to
/// apply the trust policy, so parsing and verification are separate steps.
pub struct JwsParts {
    header: JwsHeader,
    /// Decoded payload bytes
    pub payload: Vec<u8>,
    signing_input: String,
    signature: Vec<u8>,
}

impl JwsParts {
    /// Identity address of the claimed signer
    pub fn signer_address(&self) -> &str {
        &self.header.kid
    }

    /// Verify the envelope signature against a public key
    pub fn verify(&self, key: &VerifyingKey) -> bool {
        self.header.alg == SIGNING_ALG
            && verify_payload(key, self.signing_input.as_bytes(), &self.signature)
    }
}

/// Parse an envelope into its signed form, if it has one
///
/// Returns `Ok(None)` when the bytes are not shaped like a compact JWS at
/// all (the unsigned form). Returns `MalformedEnvelope` when the bytes have
/// the three-segment shape but a segment does not decode.
pub fn parse_envelope(envelope: &[u8]) -> Result<Option<JwsParts>> {
    let text = match std::str::from_utf8(envelope) {
        Ok(text) => text,
        Err(_) => return Ok(None),
    };
    let segments: Vec<&str> = text.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Ok(None);
    }
    // JSON payloads start with '{'; a base64url segment never contains one,
    // so anything with braces is an unsigned JSON body with stray dots.
    if text.contains('{') {
        return Ok(None);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(segments[0])
        .map_err(|e| SignerError::MalformedEnvelope {
            reason: format!("header is not base64url: {}", e),
        })?;
    let header: JwsHeader =
        serde_json::from_slice(&header_bytes).map_err(|e| SignerError::MalformedEnvelope {
            reason: format!("header is not valid JSON: {}", e),
        })?;
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|e| SignerError::MalformedEnvelope {
            reason: format!("payload is not base64url: {}", e),
        })?;
    let signature = URL_SAFE_NO_PAD
        .decode(segments[2])
        .map_err(|e| SignerError::MalformedEnvelope {
            reason: format!("signature is not base64url: {}", e),
        })?;

    Ok(Some(JwsParts {
        header,
        payload,
        signing_input: format!("{}.{}", segments[0], segments[1]),
        signature,
    }))
}

/// Signs outbound envelopes and verifies inbound ones
///
/// One instance is shared by the publisher and all its receivers. Key
/// resolution goes through the trust directory via the injected resolver.
pub struct MessageSigner {
    signing_method: SigningMethod,
    require_signed_inbound: bool,
    sender_address: String,
    private_key: SigningKey,
    key_resolver: PublicKeyResolver,
}

impl MessageSigner {
    /// Create a signer for a publisher
    ///
    /// # Arguments
    ///
    /// * `signing_method` - how to wrap outbound payloads
    /// * `require_signed_inbound` - discard unsigned inbound messages
    /// * `sender_address` - this publisher's identity address, used as `kid`
    /// * `private_key` - this publisher's signing key
    /// * `key_resolver` - lookup of signer addresses in the trust directory
    pub fn new(
        signing_method: SigningMethod,
        require_signed_inbound: bool,
        sender_address: String,
        private_key: SigningKey,
        key_resolver: PublicKeyResolver,
    ) -> Self {
        Self {
            signing_method,
            require_signed_inbound,
            sender_address,
            private_key,
            key_resolver,
        }
    }

    /// This publisher's identity address, used as the envelope `kid`
    pub fn sender_address(&self) -> &str {
        &self.sender_address
    }

    /// Whether inbound messages must carry a valid signature
    pub fn require_signed_inbound(&self) -> bool {
        self.require_signed_inbound
    }

    /// Wrap a payload in an envelope
    ///
    /// Returns the compact JWS bytes, or the payload itself when the
    /// signing method is `none`.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        match self.signing_method {
            SigningMethod::None => payload.to_vec(),
            SigningMethod::Jws => {
                let header =
                    serde_json::json!({ "alg": SIGNING_ALG, "kid": self.sender_address });
                let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
                let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
                let signing_input = format!("{}.{}", header_b64, payload_b64);
                let signature = sign_payload(&self.private_key, signing_input.as_bytes());
                let signature_b64 = URL_SAFE_NO_PAD.encode(signature);
                format!("{}.{}", signing_input, signature_b64).into_bytes()
            }
        }
    }

    /// Unwrap an inbound envelope and check its signature
    ///
    /// Returns the payload bytes and the signer's identity address, or
    /// `None` for the signer when an unsigned message is accepted.
    ///
    /// # Errors
    ///
    /// * `SignatureRequired` - unsigned message while signatures are required
    /// * `MalformedEnvelope` - envelope does not decode
    /// * `UnknownSigner` - signer not present in the trust directory
    /// * `InvalidSignature` - signature check failed
    pub fn verify(&self, address: &str, envelope: &[u8]) -> Result<(Vec<u8>, Option<String>)> {
        let parts = match parse_envelope(envelope)? {
            Some(parts) => parts,
            None => {
                if self.require_signed_inbound {
                    return Err(SignerError::SignatureRequired {
                        address: address.to_string(),
                    }
                    .into());
                }
                return Ok((envelope.to_vec(), None));
            }
        };

        if parts.header.alg != SIGNING_ALG {
            return Err(SignerError::MalformedEnvelope {
                reason: format!("unsupported algorithm {:?}", parts.header.alg),
            }
            .into());
        }
        let signer_address = parts.header.kid.clone();
        let key = (self.key_resolver)(&signer_address).ok_or_else(|| {
            SignerError::UnknownSigner {
                address: signer_address.clone(),
            }
        })?;
        if !parts.verify(&key) {
            return Err(SignerError::InvalidSignature {
                address: signer_address,
            }
            .into());
        }
        Ok((parts.payload, Some(signer_address)))
    }

    /// Unwrap an inbound envelope and decode its JSON payload
    pub fn verify_object<T: DeserializeOwned>(
        &self,
        address: &str,
        envelope: &[u8],
    ) -> Result<(T, Option<String>)> {
        let (payload, signer) = self.verify(address, envelope)?;
        let object = serde_json::from_slice(&payload).map_err(|e| {
            SignerError::MalformedEnvelope {
                reason: format!("payload is not valid JSON: {}", e),
            }
        })?;
        Ok((object, signer))
    }

    /// Serialize, sign and publish an object on an address
    pub fn publish_object<T: Serialize>(
        &self,
        messenger: &dyn Messenger,
        address: &str,
        object: &T,
    ) -> Result<()> {
        let payload = serde_json::to_vec(object).map_err(|e| SignerError::MalformedEnvelope {
            reason: format!("payload serialization failed: {}", e),
        })?;
        let envelope = self.sign(&payload);
        messenger.publish(address, &envelope)
    }
}
