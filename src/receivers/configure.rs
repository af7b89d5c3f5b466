//! Receiver for `$configure` commands
//!
//! Listens on `<domain>/<publisherID>/+/$configure` and applies verified
//! configuration requests to the node registry. An application supplied
//! handler can filter or rewrite the requested attributes before they are
//! applied; returning `None` drops the request.

use crate::messaging::address::{Address, MessageType};
use crate::messaging::messages::{AttrMap, NodeConfigureMessage, NodeDiscoveryMessage};
use crate::messaging::messenger::Messenger;
use crate::messaging::signer::MessageSigner;
use crate::registry::nodes::RegisteredNodes;
use parking_lot::RwLock;
use std::sync::Arc;

/// Filter callback invoked before a configuration request is applied
///
/// Receives the target node and the requested attributes; the returned map
/// is what actually reaches the registry. `None` drops the request.
pub type NodeConfigHandler =
    Arc<dyn Fn(&NodeDiscoveryMessage, AttrMap) -> Option<AttrMap> + Send + Sync>;

/// Receiver of node configuration commands
pub struct ConfigureReceiver {
    subscription: String,
    domain: String,
    publisher_id: String,
    nodes: Arc<RegisteredNodes>,
    signer: Arc<MessageSigner>,
    handler: RwLock<Option<NodeConfigHandler>>,
}

impl ConfigureReceiver {
    /// Create a receiver for a publisher's nodes
    pub fn new(
        domain: &str,
        publisher_id: &str,
        nodes: Arc<RegisteredNodes>,
        signer: Arc<MessageSigner>,
    ) -> Self {
        Self {
            subscription: format!("{}/{}/+/{}", domain, publisher_id, MessageType::Configure),
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            nodes,
            signer,
            handler: RwLock::new(None),
        }
    }

    /// Install the configuration filter callback
    pub fn set_handler(&self, handler: NodeConfigHandler) {
        *self.handler.write() = Some(handler);
    }

    /// Subscribe to the configure address pattern
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

    fn on_message(&self, address: &str, envelope: &[u8]) {
        let Some(parsed) = Address::parse(address) else {
            tracing::info!("configure on unparseable address {}, dropped", address);
            return;
        };
        if parsed.message_type != MessageType::Configure
            || parsed.domain != self.domain
            || parsed.publisher_id != self.publisher_id
        {
            tracing::info!("configure on unexpected address {}, dropped", address);
            return;
        }

        let (payload, _sender) = match self.signer.verify(address, envelope) {
            Ok(verified) => verified,
            Err(err) => {
                tracing::warn!("configure for {} discarded: {}", address, err);
                return;
            }
        };
        let message: NodeConfigureMessage = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::info!("configure for {} is not valid JSON: {}", address, err);
                return;
            }
        };

        let Some(node) = self.nodes.get_node_by_address(address) else {
            tracing::info!("configure for unknown node {}, dropped", address);
            return;
        };

        let handler = self.handler.read().clone();
        let params = match handler {
            Some(handler) => handler(&node, message.attr),
            None => Some(message.attr),
        };
        if let Some(params) = params {
            self.nodes.update_node_config_values(&node.hw_id, &params);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_signing_key;
    use crate::messaging::messages::{timestamp_now, DataType, NodeType};
    use crate::messaging::messenger::DummyMessenger;
    use crate::messaging::signer::{PublicKeyResolver, SigningMethod};

    const DOMAIN: &str = "test";
    const PUBLISHER1: &str = "publisher1";
    const NODE1: &str = "node1";

    fn make_signer() -> Arc<MessageSigner> {
        let key = generate_signing_key();
        let verifying = key.verifying_key().to_owned();
        let resolver: PublicKeyResolver = Arc::new(move |_: &str| Some(verifying.to_owned()));
        Arc::new(MessageSigner::new(
            SigningMethod::Jws,
            true,
            "test/publisher1/$identity".to_string(),
            key,
            resolver,
        ))
    }

    fn setup() -> (Arc<DummyMessenger>, Arc<RegisteredNodes>, Arc<MessageSigner>, Arc<ConfigureReceiver>) {
        let messenger = Arc::new(DummyMessenger::new());
        let nodes = Arc::new(RegisteredNodes::new(DOMAIN, PUBLISHER1));
        let signer = make_signer();
        let receiver = Arc::new(ConfigureReceiver::new(
            DOMAIN,
            PUBLISHER1,
            Arc::clone(&nodes),
            Arc::clone(&signer),
        ));
        let messenger_dyn: Arc<dyn Messenger> = messenger.clone();
        Arc::clone(&receiver).start(&messenger_dyn).unwrap();
        (messenger, nodes, signer, receiver)
    }

    fn publish_configure(
        messenger: &DummyMessenger,
        signer: &MessageSigner,
        address: &str,
        attr: AttrMap,
    ) {
        let message = NodeConfigureMessage {
            address: address.to_string(),
            sender: signer.sender_address().to_string(),
            attr,
            timestamp: timestamp_now(),
        };
        signer.publish_object(messenger, address, &message).unwrap();
    }

    #[test]
    fn test_signed_configure_applies() {
        let (messenger, nodes, signer, _receiver) = setup();
        nodes.create_node(NODE1, NodeType::Unknown);
        nodes.new_node_config(NODE1, "name", DataType::String, "Name", "default");

        publish_configure(
            &messenger,
            &signer,
            "test/publisher1/node1/$configure",
            AttrMap::from([("name".to_string(), "bob".to_string())]),
        );

        assert_eq!(nodes.get_node_attr(NODE1, "name").as_deref(), Some("bob"));
    }

    #[test]
    fn test_handler_filters_attributes() {
        let (messenger, nodes, signer, receiver) = setup();
        nodes.create_node(NODE1, NodeType::Unknown);
        nodes.new_node_config(NODE1, "name", DataType::String, "Name", "default");
        nodes.new_node_config(NODE1, "secret", DataType::String, "Secret", "keep");

        receiver.set_handler(Arc::new(|_node: &NodeDiscoveryMessage, mut attr: AttrMap| {
            attr.remove("secret");
            Some(attr)
        }));

        publish_configure(
            &messenger,
            &signer,
            "test/publisher1/node1/$configure",
            AttrMap::from([
                ("name".to_string(), "bob".to_string()),
                ("secret".to_string(), "changed".to_string()),
            ]),
        );

        assert_eq!(nodes.get_node_attr(NODE1, "name").as_deref(), Some("bob"));
        assert_eq!(
            nodes.get_node_config_string(NODE1, "secret").unwrap(),
            "keep"
        );
    }

    #[test]
    fn test_handler_can_drop_request() {
        let (messenger, nodes, signer, receiver) = setup();
        nodes.create_node(NODE1, NodeType::Unknown);
        nodes.new_node_config(NODE1, "name", DataType::String, "Name", "default");

        receiver.set_handler(Arc::new(|_node: &NodeDiscoveryMessage, _attr: AttrMap| None));

        publish_configure(
            &messenger,
            &signer,
            "test/publisher1/node1/$configure",
            AttrMap::from([("name".to_string(), "bob".to_string())]),
        );

        assert_eq!(
            nodes.get_node_config_string(NODE1, "name").unwrap(),
            "default"
        );
    }

    #[test]
    fn test_unsigned_configure_dropped() {
        let (messenger, nodes, _signer, _receiver) = setup();
        nodes.create_node(NODE1, NodeType::Unknown);
        nodes.new_node_config(NODE1, "name", DataType::String, "Name", "default");

        let message = NodeConfigureMessage {
            address: "test/publisher1/node1/$configure".to_string(),
            sender: "test/stranger/$identity".to_string(),
            attr: AttrMap::from([("name".to_string(), "mallory".to_string())]),
            timestamp: timestamp_now(),
        };
        messenger
            .publish(
                "test/publisher1/node1/$configure",
                &serde_json::to_vec(&message).unwrap(),
            )
            .unwrap();

        assert_eq!(
            nodes.get_node_config_string(NODE1, "name").unwrap(),
            "default"
        );
    }

    #[test]
    fn test_unknown_node_ignored() {
        let (messenger, nodes, signer, _receiver) = setup();
        publish_configure(
            &messenger,
            &signer,
            "test/publisher1/ghost/$configure",
            AttrMap::from([("name".to_string(), "bob".to_string())]),
        );
        assert!(nodes.get_all_nodes().is_empty());
    }

    #[test]
    fn test_stop_unsubscribes() {
        let (messenger, nodes, signer, receiver) = setup();
        nodes.create_node(NODE1, NodeType::Unknown);
        nodes.new_node_config(NODE1, "name", DataType::String, "Name", "default");

        receiver.stop(messenger.as_ref());

        publish_configure(
            &messenger,
            &signer,
            "test/publisher1/node1/$configure",
            AttrMap::from([("name".to_string(), "bob".to_string())]),
        );
        assert_eq!(
            nodes.get_node_config_string(NODE1, "name").unwrap(),
            "default"
        );
    }
}
