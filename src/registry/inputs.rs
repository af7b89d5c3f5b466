//! Registry of inputs owned by this publisher
//!
//! Inputs are keyed `<hwID>.<inputType>.<instance>`. Besides the input
//! definitions the registry keeps the last accepted set-input command per
//! input, drained by the application through `get_pending_inputs`.

use crate::messaging::address::{make_io_address, MessageType};
use crate::messaging::messages::{timestamp_now, InputDiscoveryMessage, SetInputMessage};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Registry key of an input: `<hwID>.<inputType>.<instance>`
pub fn make_input_id(hw_id: &str, input_type: &str, instance: &str) -> String {
    format!("{}.{}.{}", hw_id, input_type, instance)
}

#[derive(Default)]
struct InputsInner {
    inputs_by_id: HashMap<String, InputDiscoveryMessage>,
    set_address_to_id: HashMap<String, String>,
    pending: BTreeMap<String, SetInputMessage>,
    updated: BTreeSet<String>,
}

/// Registry of the inputs registered by this publisher
pub struct RegisteredInputs {
    domain: String,
    publisher_id: String,
    inner: Mutex<InputsInner>,
}

impl RegisteredInputs {
    /// Create an empty input registry for a publisher
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            inner: Mutex::new(InputsInner::default()),
        }
    }

    /// Create and register an input on a node
    ///
    /// An existing input with the same type and instance is replaced.
    pub fn create_input(
        &self,
        hw_id: &str,
        input_type: &str,
        instance: &str,
    ) -> InputDiscoveryMessage {
        let input = InputDiscoveryMessage {
            address: make_io_address(
                &self.domain,
                &self.publisher_id,
                hw_id,
                MessageType::Input,
                input_type,
                instance,
            ),
            publisher_id: self.publisher_id.clone(),
            node_hw_id: hw_id.to_string(),
            input_type: input_type.to_string(),
            instance: instance.to_string(),
            data_type: None,
            unit: None,
            timestamp: timestamp_now(),
            input_id: make_input_id(hw_id, input_type, instance),
        };
        self.update_input(input.clone());
        input
    }

    /// Register or replace an input and mark it updated
    pub fn update_input(&self, mut input: InputDiscoveryMessage) {
        let mut inner = self.inner.lock();
        input.timestamp = timestamp_now();
        let set_address = Self::set_address_of(&input);
        inner
            .set_address_to_id
            .insert(set_address, input.input_id.clone());
        inner.updated.insert(input.input_id.clone());
        inner.inputs_by_id.insert(input.input_id.clone(), input);
    }

    fn set_address_of(input: &InputDiscoveryMessage) -> String {
        // node segment of the discovery address carries the alias when set
        let node_id = input
            .address
            .split('/')
            .nth(2)
            .unwrap_or(&input.node_hw_id);
        make_io_address(
            input.address.split('/').next().unwrap_or(""),
            &input.publisher_id,
            node_id,
            MessageType::Set,
            &input.input_type,
            &input.instance,
        )
    }

    /// Snapshot of all registered inputs
    pub fn get_all_inputs(&self) -> Vec<InputDiscoveryMessage> {
        self.inner.lock().inputs_by_id.values().cloned().collect()
    }

    /// Look up an input by its registry key
    pub fn get_input_by_id(&self, input_id: &str) -> Option<InputDiscoveryMessage> {
        self.inner.lock().inputs_by_id.get(input_id).cloned()
    }

    /// Look up an input of a node by type and instance
    pub fn get_input_by_node_hwid(
        &self,
        hw_id: &str,
        input_type: &str,
        instance: &str,
    ) -> Option<InputDiscoveryMessage> {
        self.get_input_by_id(&make_input_id(hw_id, input_type, instance))
    }

    /// Look up an input by its `$set` command address
    pub fn get_input_by_set_address(&self, set_address: &str) -> Option<InputDiscoveryMessage> {
        let inner = self.inner.lock();
        let input_id = inner.set_address_to_id.get(set_address)?;
        inner.inputs_by_id.get(input_id).cloned()
    }

    /// All inputs belonging to one node
    pub fn get_inputs_by_node_hwid(&self, hw_id: &str) -> Vec<InputDiscoveryMessage> {
        self.inner
            .lock()
            .inputs_by_id
            .values()
            .filter(|input| input.node_hw_id == hw_id)
            .cloned()
            .collect()
    }

    /// Record the last accepted set-input command for an input
    ///
    /// No-op for an unknown input ID.
    pub fn set_pending_input(&self, input_id: &str, message: SetInputMessage) {
        let mut inner = self.inner.lock();
        if !inner.inputs_by_id.contains_key(input_id) {
            return;
        }
        inner.pending.insert(input_id.to_string(), message);
    }

    /// Accepted set-input commands since the last drain
    ///
    /// With `clear` the pending set is drained.
    pub fn get_pending_inputs(&self, clear: bool) -> Vec<SetInputMessage> {
        let mut inner = self.inner.lock();
        let pending: Vec<SetInputMessage> = inner.pending.values().cloned().collect();
        if clear {
            inner.pending.clear();
        }
        pending
    }

    /// Rewrite the addresses of a node's inputs after an alias change
    pub fn set_node_id(&self, hw_id: &str, node_id: &str) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let ids: Vec<String> = inner
            .inputs_by_id
            .values()
            .filter(|input| input.node_hw_id == hw_id)
            .map(|input| input.input_id.clone())
            .collect();
        for input_id in ids {
            let Some(input) = inner.inputs_by_id.get_mut(&input_id) else {
                continue;
            };
            input.address = make_io_address(
                &self.domain,
                &self.publisher_id,
                node_id,
                MessageType::Input,
                &input.input_type,
                &input.instance,
            );
            input.timestamp = timestamp_now();
            let set_address = Self::set_address_of(input);
            inner.set_address_to_id.retain(|_, id| id != &input_id);
            inner.set_address_to_id.insert(set_address, input_id.clone());
            inner.updated.insert(input_id);
        }
    }

    /// Inputs changed since the last drain
    ///
    /// With `clear` the updated set is drained.
    pub fn get_updated_inputs(&self, clear: bool) -> Vec<InputDiscoveryMessage> {
        let mut inner = self.inner.lock();
        let updated: Vec<InputDiscoveryMessage> = inner
            .updated
            .iter()
            .filter_map(|id| inner.inputs_by_id.get(id).cloned())
            .collect();
        if clear {
            inner.updated.clear();
        }
        updated
    }
}
