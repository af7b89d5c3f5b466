//! # iotpub
//!
//! A library for building IoT publishers on a domain-wide, signed,
//! address-routed message bus. A publisher advertises nodes, their inputs
//! and outputs, accepts signed configuration and set-input commands
//! addressed to its nodes and emits discovery and output value updates,
//! all over a pluggable pub/sub transport.
//!
//! ## Quick Start
//!
//! ```no_run
//! use iotpub::{DummyMessenger, NodeType, Publisher, PublisherConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PublisherConfig::new("mypublisher");
//!     let messenger = Arc::new(DummyMessenger::new());
//!     let publisher = Publisher::new(config, Some(messenger))?;
//!
//!     let node = publisher.nodes().create_node("device1", NodeType::Sensor);
//!     publisher.outputs().create_output(&node.hw_id, "temperature", "0");
//!
//!     publisher.start().await?;
//!     publisher
//!         .output_values()
//!         .update_output_value("device1.temperature.0", "21.5", None);
//!     // the heartbeat publishes the new value on the next tick
//!     publisher.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod publisher;
pub mod receivers;
pub mod registry;
pub mod storage;

// Re-export main types
pub use config::{load_config, save_config, LogLevel, PublisherConfig};
pub use error::{
    ConfigError, IdentityError, IotPubError, RegistryError, Result, SignerError, StorageError,
    TransportError,
};
pub use identity::{DomainPublishers, PublisherFullIdentity, PublisherIdentity, PublisherIdentityMessage};
pub use messaging::{
    make_io_address, make_node_address, make_publisher_identity_address, replace_message_type,
    Address, AttrMap, ConfigDescriptor, DataType, DummyMessenger, InputDiscoveryMessage,
    MessageSigner, MessageType, Messenger, NodeAliasMessage, NodeConfigureMessage,
    NodeDiscoveryMessage, NodeType, OutputDiscoveryMessage, OutputEventMessage,
    OutputHistoryMessage, OutputLatestMessage, OutputValue, RunState, SetInputMessage,
    SigningMethod, SubscriptionCallback,
};
pub use publisher::{Publisher, PublisherHandler};
pub use receivers::{NodeConfigHandler, NodeInputHandler};
pub use registry::{
    HistoryRetention, RegisteredInputs, RegisteredNodes, RegisteredOutputValues, RegisteredOutputs,
};
