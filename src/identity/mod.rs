//! Publisher identity and domain trust
//!
//! Identity creation with a self-signed development fallback, identity file
//! loading, and the trust directory of publishers discovered in the domain.

pub mod identity;
pub mod trust;

// Re-export main types
pub use identity::{
    create_identity, setup_publisher_identity, sign_identity, verify_identity_signature,
    PublisherFullIdentity, PublisherIdentity, PublisherIdentityMessage,
};
pub use trust::DomainPublishers;
