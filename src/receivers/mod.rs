//! Inbound command receivers
//!
//! One receiver per inbound message type. Each subscribes to its wildcard
//! address pattern on `start`, verifies and decodes each delivery, applies
//! any application policy callback and mutates its registry; the dirty set
//! picks the change up on the next heartbeat.

pub mod alias;
pub mod configure;
pub mod discovery;
pub mod set_input;

// Re-export main types
pub use alias::AliasReceiver;
pub use configure::{ConfigureReceiver, NodeConfigHandler};
pub use discovery::PublisherDiscoveryReceiver;
pub use set_input::{NodeInputHandler, SetInputReceiver};
