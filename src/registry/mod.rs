//! In-memory registries of this publisher's entities
//!
//! Nodes, inputs, outputs and output value histories, each guarded by a
//! single mutex and each tracking an updated set that the heartbeat drains
//! into publications. Lookups return snapshots, never references into the
//! registry.

pub mod inputs;
pub mod nodes;
pub mod outputs;
pub mod values;

// Re-export main types
pub use inputs::{make_input_id, RegisteredInputs};
pub use nodes::{new_node, RegisteredNodes};
pub use outputs::{make_output_id, RegisteredOutputs};
pub use values::{HistoryRetention, RegisteredOutputValues};
