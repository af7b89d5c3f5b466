//! Messaging layer
//!
//! Address grammar, wire message types, the transport contract and the
//! signing pipeline that wraps every publication.

pub mod address;
pub mod messages;
pub mod messenger;
pub mod signer;

// Re-export main types
pub use address::{
    make_dss_address, make_io_address, make_node_address, make_publisher_identity_address,
    replace_message_type, Address, MessageType, DSS_PUBLISHER_ID,
};
pub use messages::{
    timestamp_now, AttrMap, ConfigDescriptor, ConfigMap, DataType, InputDiscoveryMessage,
    NodeAliasMessage, NodeConfigureMessage, NodeDiscoveryMessage, NodeType,
    OutputDiscoveryMessage, OutputEventMessage, OutputHistoryMessage, OutputLatestMessage,
    OutputValue, RunState, SetInputMessage,
};
pub use messenger::{DummyMessenger, Messenger, Publication, SubscriptionCallback};
pub use signer::{MessageSigner, PublicKeyResolver, SigningMethod};
