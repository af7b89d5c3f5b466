//! Receiver for `$alias` commands
//!
//! Listens on `<domain>/<publisherID>/+/$alias` and applies verified alias
//! changes: the node registry stores the alias and the input and output
//! registries rewrite their addresses so future publications use it.

use crate::messaging::address::{Address, MessageType};
use crate::messaging::messages::NodeAliasMessage;
use crate::messaging::messenger::Messenger;
use crate::messaging::signer::MessageSigner;
use crate::registry::inputs::RegisteredInputs;
use crate::registry::nodes::RegisteredNodes;
use crate::registry::outputs::RegisteredOutputs;
use std::sync::Arc;

/// Receiver of node alias commands
pub struct AliasReceiver {
    subscription: String,
    domain: String,
    publisher_id: String,
    nodes: Arc<RegisteredNodes>,
    inputs: Arc<RegisteredInputs>,
    outputs: Arc<RegisteredOutputs>,
    signer: Arc<MessageSigner>,
}

impl AliasReceiver {
    /// Create a receiver for a publisher's nodes
    pub fn new(
        domain: &str,
        publisher_id: &str,
        nodes: Arc<RegisteredNodes>,
        inputs: Arc<RegisteredInputs>,
        outputs: Arc<RegisteredOutputs>,
        signer: Arc<MessageSigner>,
    ) -> Self {
        Self {
            subscription: format!("{}/{}/+/{}", domain, publisher_id, MessageType::Alias),
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            nodes,
            inputs,
            outputs,
            signer,
        }
    }

    /// Subscribe to the alias address pattern
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

    /// Apply an alias to the node and remap its input and output addresses
    ///
    /// A rejected alias (unknown node, or an alias that would shadow an
    /// existing hardware ID) leaves every registry untouched.
    pub fn apply_alias(&self, hw_id: &str, alias: &str) {
        let before = match self.nodes.get_node_by_hwid(hw_id) {
            Some(node) => node.node_id,
            None => return,
        };
        self.nodes.set_alias(hw_id, alias);
        let Some(node) = self.nodes.get_node_by_hwid(hw_id) else {
            return;
        };
        if node.node_id != before {
            self.inputs.set_node_id(hw_id, &node.node_id);
            self.outputs.set_node_id(hw_id, &node.node_id);
        }
    }

    fn on_message(&self, address: &str, envelope: &[u8]) {
        let Some(parsed) = Address::parse(address) else {
            tracing::info!("alias command on unparseable address {}, dropped", address);
            return;
        };
        if parsed.message_type != MessageType::Alias
            || parsed.io_type.is_some()
            || parsed.domain != self.domain
            || parsed.publisher_id != self.publisher_id
        {
            tracing::info!("alias command on unexpected address {}, dropped", address);
            return;
        }

        let (payload, _sender) = match self.signer.verify(address, envelope) {
            Ok(verified) => verified,
            Err(err) => {
                tracing::warn!("alias command for {} discarded: {}", address, err);
                return;
            }
        };
        let message: NodeAliasMessage = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::info!("alias command for {} is not valid JSON: {}", address, err);
                return;
            }
        };

        let Some(node) = self.nodes.get_node_by_address(address) else {
            tracing::info!("alias command for unknown node {}, dropped", address);
            return;
        };
        self.apply_alias(&node.hw_id, &message.alias);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_signing_key;
    use crate::messaging::messages::{timestamp_now, NodeType};
    use crate::messaging::messenger::DummyMessenger;
    use crate::messaging::signer::{PublicKeyResolver, SigningMethod};

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

    struct Fixture {
        messenger: Arc<DummyMessenger>,
        nodes: Arc<RegisteredNodes>,
        inputs: Arc<RegisteredInputs>,
        outputs: Arc<RegisteredOutputs>,
        signer: Arc<MessageSigner>,
    }

    fn setup() -> (Fixture, Arc<AliasReceiver>) {
        let fixture = Fixture {
            messenger: Arc::new(DummyMessenger::new()),
            nodes: Arc::new(RegisteredNodes::new("test", "publisher1")),
            inputs: Arc::new(RegisteredInputs::new("test", "publisher1")),
            outputs: Arc::new(RegisteredOutputs::new("test", "publisher1")),
            signer: make_signer(),
        };
        let receiver = Arc::new(AliasReceiver::new(
            "test",
            "publisher1",
            Arc::clone(&fixture.nodes),
            Arc::clone(&fixture.inputs),
            Arc::clone(&fixture.outputs),
            Arc::clone(&fixture.signer),
        ));
        let messenger_dyn: Arc<dyn Messenger> = fixture.messenger.clone();
        Arc::clone(&receiver).start(&messenger_dyn).unwrap();
        (fixture, receiver)
    }

    fn publish_alias(fixture: &Fixture, address: &str, alias: &str) {
        let message = NodeAliasMessage {
            address: address.to_string(),
            sender: fixture.signer.sender_address().to_string(),
            alias: alias.to_string(),
            timestamp: timestamp_now(),
        };
        fixture
            .signer
            .publish_object(fixture.messenger.as_ref(), address, &message)
            .unwrap();
    }

    #[test]
    fn test_alias_command_applies_everywhere() {
        let (fixture, _receiver) = setup();
        fixture.nodes.create_node("node1", NodeType::Unknown);
        fixture.inputs.create_input("node1", "switch", "0");
        fixture.outputs.create_output("node1", "switch", "0");

        publish_alias(&fixture, "test/publisher1/node1/$alias", "alias1");

        let node = fixture.nodes.get_node_by_id("alias1").unwrap();
        assert_eq!(node.hw_id, "node1");
        assert_eq!(node.address, "test/publisher1/alias1/$node");

        let input = fixture.inputs.get_input_by_id("node1.switch.0").unwrap();
        assert_eq!(input.address, "test/publisher1/alias1/$input/switch/0");
        let output = fixture.outputs.get_output_by_id("node1.switch.0").unwrap();
        assert_eq!(output.address, "test/publisher1/alias1/$output/switch/0");
    }

    #[test]
    fn test_alias_command_via_alias_address() {
        let (fixture, _receiver) = setup();
        fixture.nodes.create_node("node1", NodeType::Unknown);

        publish_alias(&fixture, "test/publisher1/node1/$alias", "alias1");
        // re-aliasing through the alias address finds the same node
        publish_alias(&fixture, "test/publisher1/alias1/$alias", "alias2");

        assert!(fixture.nodes.get_node_by_id("alias2").is_some());
        assert!(fixture.nodes.get_node_by_id("alias1").is_none());
    }

    #[test]
    fn test_shadowing_alias_leaves_registries_untouched() {
        let (fixture, _receiver) = setup();
        fixture.nodes.create_node("node1", NodeType::Unknown);
        fixture.nodes.create_node("node2", NodeType::Unknown);
        fixture.outputs.create_output("node2", "switch", "0");

        publish_alias(&fixture, "test/publisher1/node2/$alias", "node1");

        let node2 = fixture.nodes.get_node_by_id("node2").unwrap();
        assert_eq!(node2.node_id, "node2");
        let output = fixture.outputs.get_output_by_id("node2.switch.0").unwrap();
        assert_eq!(output.address, "test/publisher1/node2/$output/switch/0");
    }

    #[test]
    fn test_unsigned_alias_dropped() {
        let (fixture, _receiver) = setup();
        fixture.nodes.create_node("node1", NodeType::Unknown);

        let message = NodeAliasMessage {
            address: "test/publisher1/node1/$alias".to_string(),
            sender: "test/stranger/$identity".to_string(),
            alias: "alias1".to_string(),
            timestamp: timestamp_now(),
        };
        fixture
            .messenger
            .publish(
                "test/publisher1/node1/$alias",
                &serde_json::to_vec(&message).unwrap(),
            )
            .unwrap();

        assert!(fixture.nodes.get_node_by_id("alias1").is_none());
    }
}
