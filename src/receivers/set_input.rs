//! Receiver for `$set` commands
//!
//! Listens on `<domain>/<publisherID>/+/$set/+/+` and records verified
//! set-input commands in the input registry. The application's input
//! handler, when installed, is invoked with the target input so the device
//! can be driven immediately; the command also lands in the pending set.

use crate::messaging::address::{Address, MessageType};
use crate::messaging::messages::{InputDiscoveryMessage, SetInputMessage};
use crate::messaging::messenger::Messenger;
use crate::messaging::signer::MessageSigner;
use crate::registry::inputs::RegisteredInputs;
use parking_lot::RwLock;
use std::sync::Arc;

/// Callback invoked for each accepted set-input command
pub type NodeInputHandler = Arc<dyn Fn(&InputDiscoveryMessage, &SetInputMessage) + Send + Sync>;

/// Receiver of set-input commands
pub struct SetInputReceiver {
    subscription: String,
    domain: String,
    publisher_id: String,
    inputs: Arc<RegisteredInputs>,
    signer: Arc<MessageSigner>,
    handler: RwLock<Option<NodeInputHandler>>,
}

impl SetInputReceiver {
    /// Create a receiver for a publisher's inputs
    pub fn new(
        domain: &str,
        publisher_id: &str,
        inputs: Arc<RegisteredInputs>,
        signer: Arc<MessageSigner>,
    ) -> Self {
        Self {
            subscription: format!("{}/{}/+/{}/+/+", domain, publisher_id, MessageType::Set),
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            inputs,
            signer,
            handler: RwLock::new(None),
        }
    }

    /// Install the input handler callback
    pub fn set_handler(&self, handler: NodeInputHandler) {
        *self.handler.write() = Some(handler);
    }

    /// Subscribe to the set address pattern
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
            tracing::info!("set command on unparseable address {}, dropped", address);
            return;
        };
        if parsed.message_type != MessageType::Set
            || parsed.io_type.is_none()
            || parsed.domain != self.domain
            || parsed.publisher_id != self.publisher_id
        {
            tracing::info!("set command on unexpected address {}, dropped", address);
            return;
        }

        let (payload, _sender) = match self.signer.verify(address, envelope) {
            Ok(verified) => verified,
            Err(err) => {
                tracing::warn!("set command for {} discarded: {}", address, err);
                return;
            }
        };
        let message: SetInputMessage = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::info!("set command for {} is not valid JSON: {}", address, err);
                return;
            }
        };

        let Some(input) = self.inputs.get_input_by_set_address(address) else {
            tracing::info!("set command for unknown input {}, dropped", address);
            return;
        };

        if let Some(handler) = self.handler.read().clone() {
            handler(&input, &message);
        }
        self.inputs.set_pending_input(&input.input_id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_signing_key;
    use crate::messaging::messages::timestamp_now;
    use crate::messaging::messenger::DummyMessenger;
    use crate::messaging::signer::{PublicKeyResolver, SigningMethod};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    fn setup() -> (
        Arc<DummyMessenger>,
        Arc<RegisteredInputs>,
        Arc<MessageSigner>,
        Arc<SetInputReceiver>,
    ) {
        let messenger = Arc::new(DummyMessenger::new());
        let inputs = Arc::new(RegisteredInputs::new("test", "publisher1"));
        let signer = make_signer();
        let receiver = Arc::new(SetInputReceiver::new(
            "test",
            "publisher1",
            Arc::clone(&inputs),
            Arc::clone(&signer),
        ));
        let messenger_dyn: Arc<dyn Messenger> = messenger.clone();
        Arc::clone(&receiver).start(&messenger_dyn).unwrap();
        (messenger, inputs, signer, receiver)
    }

    fn publish_set(messenger: &DummyMessenger, signer: &MessageSigner, address: &str, value: &str) {
        let message = SetInputMessage {
            address: address.to_string(),
            sender: signer.sender_address().to_string(),
            value: value.to_string(),
            timestamp: timestamp_now(),
        };
        signer.publish_object(messenger, address, &message).unwrap();
    }

    #[test]
    fn test_signed_set_recorded_and_handled() {
        let (messenger, inputs, signer, receiver) = setup();
        inputs.create_input("node1", "switch", "0");

        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = Arc::clone(&invoked);
        receiver.set_handler(Arc::new(
            move |input: &InputDiscoveryMessage, message: &SetInputMessage| {
                assert_eq!(input.input_id, "node1.switch.0");
                assert_eq!(message.value, "true");
                invoked_clone.fetch_add(1, Ordering::SeqCst);
            },
        ));

        publish_set(
            &messenger,
            &signer,
            "test/publisher1/node1/$set/switch/0",
            "true",
        );

        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        let pending = inputs.get_pending_inputs(true);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value, "true");
    }

    #[test]
    fn test_unsigned_set_dropped() {
        let (messenger, inputs, _signer, _receiver) = setup();
        inputs.create_input("node1", "switch", "0");

        let message = SetInputMessage {
            address: "test/publisher1/node1/$set/switch/0".to_string(),
            sender: "test/stranger/$identity".to_string(),
            value: "true".to_string(),
            timestamp: timestamp_now(),
        };
        messenger
            .publish(
                "test/publisher1/node1/$set/switch/0",
                &serde_json::to_vec(&message).unwrap(),
            )
            .unwrap();

        assert!(inputs.get_pending_inputs(true).is_empty());
    }

    #[test]
    fn test_unknown_input_dropped() {
        let (messenger, inputs, signer, _receiver) = setup();
        publish_set(
            &messenger,
            &signer,
            "test/publisher1/node1/$set/switch/9",
            "true",
        );
        assert!(inputs.get_pending_inputs(true).is_empty());
    }

    #[test]
    fn test_set_via_alias_address() {
        let (messenger, inputs, signer, _receiver) = setup();
        inputs.create_input("node1", "switch", "0");
        inputs.set_node_id("node1", "alias1");

        publish_set(
            &messenger,
            &signer,
            "test/publisher1/alias1/$set/switch/0",
            "on",
        );

        let pending = inputs.get_pending_inputs(true);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value, "on");
    }
}
