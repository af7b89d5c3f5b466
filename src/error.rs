//! Error types for iotpub
//!
//! Each subsystem has its own error enum; `IotPubError` wraps them all so
//! the crate exposes a single `Result` alias.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the message signing and verification pipeline
#[derive(Error, Debug)]
pub enum SignerError {
    /// The envelope is not a valid compact serialization
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope {
        /// What part of the envelope failed to parse
        reason: String,
    },

    /// The signer's identity is not present in the trust directory
    #[error("Unknown signer: {address}")]
    UnknownSigner {
        /// Identity address the envelope claims as its signer
        address: String,
    },

    /// The signature does not verify against the signer's public key
    #[error("Invalid signature from {address}")]
    InvalidSignature {
        /// Identity address of the claimed signer
        address: String,
    },

    /// An unsigned message arrived while signatures are required
    #[error("Signature required on {address}")]
    SignatureRequired {
        /// Address the message was received on
        address: String,
    },
}

/// Errors from registry lookups and typed configuration accessors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The requested entity or attribute does not exist
    #[error("Not found: {key}")]
    NotFound {
        /// Entity or attribute key that was looked up
        key: String,
    },

    /// The stored configuration value does not parse as the requested type
    #[error("Type mismatch for {key}: value {value:?} is not a {expected}")]
    TypeMismatch {
        /// Attribute key whose value was read
        key: String,
        /// The stored string value
        value: String,
        /// The type the caller asked for
        expected: &'static str,
    },
}

/// Errors from identity creation, loading and validation
#[derive(Error, Debug)]
pub enum IdentityError {
    /// A key could not be parsed from its PEM form
    #[error("Invalid key material: {reason}")]
    KeyFormat {
        /// Parser error detail
        reason: String,
    },

    /// The stored identity belongs to a different domain or publisher
    #[error("Identity mismatch: stored {stored}, expected {expected}")]
    Mismatch {
        /// The domain/publisher the stored identity names
        stored: String,
        /// The domain/publisher the caller configured
        expected: String,
    },

    /// The identity's validity period has ended
    #[error("Identity for {address} expired at {valid_until}")]
    Expired {
        /// Identity address
        address: String,
        /// End of the validity period
        valid_until: String,
    },
}

/// Errors from publisher configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration field is missing or empty
    #[error("Missing required configuration field: {field}")]
    MissingRequiredField {
        /// Name of the missing field
        field: String,
    },

    /// A configured path is unusable
    #[error("Invalid path: {path}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
    },

    /// The publisher cannot start without a messenger
    #[error("No messenger configured for {publisher_id}")]
    NoMessenger {
        /// The publisher that was asked to start
        publisher_id: String,
    },
}

/// Errors from cache and identity file persistence
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// Reading or writing JSON failed
    #[error("Serialization failed: {reason}")]
    SerializationFailed {
        /// Serde error detail
        reason: String,
    },

    /// Underlying filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced from the message bus transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport could not establish a connection
    #[error("Connect failed: {reason}")]
    ConnectFailed {
        /// Transport error detail
        reason: String,
    },

    /// A publication could not be delivered to the transport
    #[error("Publish to {address} failed: {reason}")]
    PublishFailed {
        /// Address the publication was destined for
        address: String,
        /// Transport error detail
        reason: String,
    },

    /// A subscription could not be established
    #[error("Subscribe to {pattern} failed: {reason}")]
    SubscribeFailed {
        /// Address pattern of the subscription
        pattern: String,
        /// Transport error detail
        reason: String,
    },
}

/// Main error type for iotpub operations
#[derive(Error, Debug)]
pub enum IotPubError {
    /// Signing pipeline errors
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// Registry errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Identity errors
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persistence errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Transport errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IotPubError>;
