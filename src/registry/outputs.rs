//! Registry of outputs owned by this publisher
//!
//! Mirrors the input registry: outputs are keyed
//! `<hwID>.<outputType>.<instance>` and navigated from their node by query
//! rather than by owned references, so there are no node/output reference
//! cycles to manage.

use crate::messaging::address::{make_io_address, MessageType};
use crate::messaging::messages::{timestamp_now, OutputDiscoveryMessage};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// Registry key of an output: `<hwID>.<outputType>.<instance>`
pub fn make_output_id(hw_id: &str, output_type: &str, instance: &str) -> String {
    format!("{}.{}.{}", hw_id, output_type, instance)
}

#[derive(Default)]
struct OutputsInner {
    outputs_by_id: HashMap<String, OutputDiscoveryMessage>,
    address_to_id: HashMap<String, String>,
    updated: BTreeSet<String>,
}

/// Registry of the outputs registered by this publisher
pub struct RegisteredOutputs {
    domain: String,
    publisher_id: String,
    inner: Mutex<OutputsInner>,
}

impl RegisteredOutputs {
    /// Create an empty output registry for a publisher
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            inner: Mutex::new(OutputsInner::default()),
        }
    }

    /// Create and register an output on a node
    ///
    /// An existing output with the same type and instance is replaced.
    pub fn create_output(
        &self,
        hw_id: &str,
        output_type: &str,
        instance: &str,
    ) -> OutputDiscoveryMessage {
        let output = OutputDiscoveryMessage {
            address: make_io_address(
                &self.domain,
                &self.publisher_id,
                hw_id,
                MessageType::Output,
                output_type,
                instance,
            ),
            publisher_id: self.publisher_id.clone(),
            node_hw_id: hw_id.to_string(),
            output_type: output_type.to_string(),
            instance: instance.to_string(),
            data_type: None,
            unit: None,
            timestamp: timestamp_now(),
            output_id: make_output_id(hw_id, output_type, instance),
        };
        self.update_output(output.clone());
        output
    }

    /// Register or replace an output and mark it updated
    pub fn update_output(&self, mut output: OutputDiscoveryMessage) {
        let mut inner = self.inner.lock();
        output.timestamp = timestamp_now();
        inner
            .address_to_id
            .insert(output.address.clone(), output.output_id.clone());
        inner.updated.insert(output.output_id.clone());
        inner.outputs_by_id.insert(output.output_id.clone(), output);
    }

    /// Snapshot of all registered outputs
    pub fn get_all_outputs(&self) -> Vec<OutputDiscoveryMessage> {
        self.inner.lock().outputs_by_id.values().cloned().collect()
    }

    /// Look up an output by its registry key
    pub fn get_output_by_id(&self, output_id: &str) -> Option<OutputDiscoveryMessage> {
        self.inner.lock().outputs_by_id.get(output_id).cloned()
    }

    /// Look up an output of a node by type and instance
    pub fn get_output_by_node_hwid(
        &self,
        hw_id: &str,
        output_type: &str,
        instance: &str,
    ) -> Option<OutputDiscoveryMessage> {
        self.get_output_by_id(&make_output_id(hw_id, output_type, instance))
    }

    /// Look up an output by its full discovery address
    pub fn get_output_by_address(&self, address: &str) -> Option<OutputDiscoveryMessage> {
        let inner = self.inner.lock();
        let output_id = inner.address_to_id.get(address)?;
        inner.outputs_by_id.get(output_id).cloned()
    }

    /// All outputs belonging to one node
    pub fn get_outputs_by_node_hwid(&self, hw_id: &str) -> Vec<OutputDiscoveryMessage> {
        self.inner
            .lock()
            .outputs_by_id
            .values()
            .filter(|output| output.node_hw_id == hw_id)
            .cloned()
            .collect()
    }

    /// Rewrite the addresses of a node's outputs after an alias change
    pub fn set_node_id(&self, hw_id: &str, node_id: &str) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let ids: Vec<String> = inner
            .outputs_by_id
            .values()
            .filter(|output| output.node_hw_id == hw_id)
            .map(|output| output.output_id.clone())
            .collect();
        for output_id in ids {
            let Some(output) = inner.outputs_by_id.get_mut(&output_id) else {
                continue;
            };
            inner.address_to_id.remove(&output.address);
            output.address = make_io_address(
                &self.domain,
                &self.publisher_id,
                node_id,
                MessageType::Output,
                &output.output_type,
                &output.instance,
            );
            output.timestamp = timestamp_now();
            inner
                .address_to_id
                .insert(output.address.clone(), output_id.clone());
            inner.updated.insert(output_id);
        }
    }

    /// Outputs changed since the last drain
    ///
    /// With `clear` the updated set is drained.
    pub fn get_updated_outputs(&self, clear: bool) -> Vec<OutputDiscoveryMessage> {
        let mut inner = self.inner.lock();
        let updated: Vec<OutputDiscoveryMessage> = inner
            .updated
            .iter()
            .filter_map(|id| inner.outputs_by_id.get(id).cloned())
            .collect();
        if clear {
            inner.updated.clear();
        }
        updated
    }
}
