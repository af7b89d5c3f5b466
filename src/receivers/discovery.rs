//! Receiver for publisher identity discovery
//!
//! Listens on `<domain>/+/$identity` and feeds the trust directory. Three
//! trust scenarios apply:
//!
//! 1. The DSS identity itself is accepted as seen; its address is assumed
//!    protected by the bus.
//! 2. Without a known DSS, a publisher identity is accepted when its
//!    envelope verifies against the signing key embedded in the identity
//!    (trust on first use plus address protection).
//! 3. With a known DSS, the identity body must carry a valid DSS signature.
//!
//! Our own identity is ignored; the directory already holds it.

use crate::identity::identity::{verify_identity_signature, PublisherIdentityMessage};
use crate::identity::trust::DomainPublishers;
use crate::messaging::address::{make_publisher_identity_address, Address, MessageType};
use crate::messaging::messenger::Messenger;
use crate::messaging::signer::parse_envelope;
use crate::crypto::keys::public_key_from_pem;
use crate::storage::cache;
use std::path::PathBuf;
use std::sync::Arc;

/// Receiver of domain publisher identities
pub struct PublisherDiscoveryReceiver {
    subscription: String,
    domain: String,
    own_address: String,
    publishers: Arc<DomainPublishers>,
    require_signed: bool,
    /// When set, accepted identities are persisted here
    cache_folder: Option<PathBuf>,
}

impl PublisherDiscoveryReceiver {
    /// Create a receiver feeding a domain's trust directory
    pub fn new(
        domain: &str,
        publisher_id: &str,
        publishers: Arc<DomainPublishers>,
        require_signed: bool,
        cache_folder: Option<PathBuf>,
    ) -> Self {
        Self {
            subscription: format!("{}/+/{}", domain, MessageType::Identity),
            domain: domain.to_string(),
            own_address: make_publisher_identity_address(domain, publisher_id),
            publishers,
            require_signed,
            cache_folder,
        }
    }

    /// Subscribe to the identity address pattern
    pub fn start(self: Arc<Self>, messenger: &Arc<dyn Messenger>) -> crate::Result<()> {
        let subscription = self.subscription.clone();
        messenger.subscribe(
            &subscription,
            Arc::new(move |address: &str, payload: &[u8]| self.on_message(address, payload)),
        )
    }

    /// Remove the subscription
    pub fn stop(&self, messenger: &dyn Messenger) {
        messenger.unsubscribe(&self.subscription);
    }

    fn accept(&self, message: PublisherIdentityMessage) {
        tracing::info!("discovered publisher {}", message.address);
        self.publishers.update_publisher(message);
        if let Some(folder) = &self.cache_folder {
            let all = self.publishers.get_all_publishers();
            if let Err(err) = cache::save_publishers(folder, &all) {
                tracing::error!("failed to save discovered publishers: {}", err);
            }
        }
    }

    fn on_message(&self, address: &str, envelope: &[u8]) {
        let Some(parsed) = Address::parse(address) else {
            tracing::info!("identity on unparseable address {}, dropped", address);
            return;
        };
        if parsed.message_type != MessageType::Identity
            || parsed.node_id.is_some()
            || parsed.domain != self.domain
        {
            tracing::info!("identity on unexpected address {}, dropped", address);
            return;
        }
        if address == self.own_address {
            return;
        }

        // The payload is needed before verification: the trust policy
        // decides which key, if any, gates this identity.
        let jws = match parse_envelope(envelope) {
            Ok(jws) => jws,
            Err(err) => {
                tracing::warn!("identity for {} discarded: {}", address, err);
                return;
            }
        };
        let payload = match &jws {
            Some(parts) => parts.payload.clone(),
            None => {
                if self.require_signed {
                    tracing::warn!(
                        "identity for {} is not signed but signatures are required, discarded",
                        address
                    );
                    return;
                }
                envelope.to_vec()
            }
        };
        let message: PublisherIdentityMessage = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::info!("identity for {} is not valid JSON: {}", address, err);
                return;
            }
        };
        if message.address != address {
            tracing::info!(
                "identity claiming {} arrived on {}, dropped",
                message.address,
                address
            );
            return;
        }

        // The DSS itself: address protection assumed, accepted as seen.
        if address == self.publishers.dss_address() {
            self.accept(message);
            return;
        }

        match self.publishers.get_dss_key() {
            None => {
                // Trust on first use: a signed envelope must verify against
                // the key the identity itself carries.
                if let Some(parts) = &jws {
                    let key = match public_key_from_pem(&message.identity.public_signing) {
                        Ok(key) => key,
                        Err(err) => {
                            tracing::info!("identity for {} has a bad key: {}", address, err);
                            return;
                        }
                    };
                    if !parts.verify(&key) {
                        tracing::warn!(
                            "identity for {} does not verify against its own key, discarded",
                            address
                        );
                        return;
                    }
                }
                self.accept(message);
            }
            Some(dss_key) => {
                // A DSS governs this domain: the identity body must carry
                // its signature.
                if !verify_identity_signature(
                    &message.identity,
                    &message.identity_signature,
                    &dss_key,
                ) {
                    tracing::warn!(
                        "identity for {} lacks a valid DSS signature, discarded",
                        address
                    );
                    return;
                }
                self.accept(message);
            }
        }
    }
}
