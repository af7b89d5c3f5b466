//! Trust directory of domain publishers
//!
//! Caches the last accepted identity of every publisher seen in the domain.
//! The signer resolves envelope `kid` addresses through this directory; the
//! publisher-discovery receiver applies the trust policy before anything is
//! stored here. Entries are never evicted, updates replace prior entries.

use crate::crypto::keys::public_key_from_pem;
use crate::identity::identity::PublisherIdentityMessage;
use crate::messaging::address::make_dss_address;
use dashmap::DashMap;
use p256::ecdsa::VerifyingKey;

/// Directory of publisher identities known in the domain
pub struct DomainPublishers {
    /// Identity address of this domain's security service
    dss_address: String,
    /// Identity messages keyed by identity address
    publishers: DashMap<String, PublisherIdentityMessage>,
}

impl DomainPublishers {
    /// Create an empty directory for a domain
    pub fn new(domain: &str) -> Self {
        Self {
            dss_address: make_dss_address(domain),
            publishers: DashMap::new(),
        }
    }

    /// Identity address of the domain's security service
    pub fn dss_address(&self) -> &str {
        &self.dss_address
    }

    /// Store or replace a publisher identity
    pub fn update_publisher(&self, message: PublisherIdentityMessage) {
        self.publishers.insert(message.address.clone(), message);
    }

    /// Look up a publisher identity by its identity address
    pub fn get_publisher(&self, address: &str) -> Option<PublisherIdentityMessage> {
        self.publishers
            .get(address)
            .map(|entry| entry.value().clone())
    }

    /// Public signing key of a publisher, by identity address
    ///
    /// Returns `None` when the publisher is unknown or its stored key does
    /// not parse.
    pub fn get_publisher_key(&self, address: &str) -> Option<VerifyingKey> {
        let entry = self.publishers.get(address)?;
        public_key_from_pem(&entry.identity.public_signing).ok()
    }

    /// Public signing key of the domain security service, if discovered
    pub fn get_dss_key(&self) -> Option<VerifyingKey> {
        self.get_publisher_key(&self.dss_address)
    }

    /// All known publisher identities
    pub fn get_all_publishers(&self) -> Vec<PublisherIdentityMessage> {
        self.publishers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Replace the directory content, used when loading the cache
    pub fn update_publishers(&self, messages: Vec<PublisherIdentityMessage>) {
        for message in messages {
            self.update_publisher(message);
        }
    }

    /// Number of known publishers
    pub fn count(&self) -> usize {
        self.publishers.len()
    }
}
