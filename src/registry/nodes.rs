//! Registry of nodes owned by this publisher
//!
//! Nodes are keyed by their immutable hardware ID; an alias is a secondary
//! lookup key that also replaces the node ID in published addresses. Every
//! observable change stamps the node and adds it to the updated set that
//! the heartbeat drains.

use crate::error::{RegistryError, Result};
use crate::messaging::address::{make_node_address, Address, MessageType};
use crate::messaging::messages::{
    node_status, timestamp_now, AttrMap, ConfigDescriptor, ConfigMap, DataType,
    NodeDiscoveryMessage, NodeType, RunState,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// Construct a node discovery message for a publisher
///
/// The node is not registered; use [`RegisteredNodes::update_nodes`] to add
/// it, or [`RegisteredNodes::create_node`] to create and register in one
/// step.
pub fn new_node(
    domain: &str,
    publisher_id: &str,
    hw_id: &str,
    node_type: NodeType,
) -> NodeDiscoveryMessage {
    NodeDiscoveryMessage {
        address: make_node_address(domain, publisher_id, hw_id, MessageType::Node),
        publisher_id: publisher_id.to_string(),
        node_id: hw_id.to_string(),
        hw_id: hw_id.to_string(),
        node_type,
        attr: AttrMap::new(),
        status: AttrMap::new(),
        config: ConfigMap::new(),
        run_state: RunState::default(),
        timestamp: timestamp_now(),
    }
}

#[derive(Default)]
struct NodesInner {
    nodes_by_hwid: HashMap<String, NodeDiscoveryMessage>,
    alias_to_hwid: HashMap<String, String>,
    updated: BTreeSet<String>,
}

/// Registry of the nodes registered by this publisher
pub struct RegisteredNodes {
    domain: String,
    publisher_id: String,
    inner: Mutex<NodesInner>,
}

impl RegisteredNodes {
    /// Create an empty node registry for a publisher
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            inner: Mutex::new(NodesInner::default()),
        }
    }

    /// Create and register a node
    ///
    /// Idempotent: a second call with the same hardware ID returns the
    /// existing node unchanged, whatever node type is passed.
    pub fn create_node(&self, hw_id: &str, node_type: NodeType) -> NodeDiscoveryMessage {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.nodes_by_hwid.get(hw_id) {
            return existing.clone();
        }
        let node = new_node(&self.domain, &self.publisher_id, hw_id, node_type);
        inner.nodes_by_hwid.insert(hw_id.to_string(), node.clone());
        inner.updated.insert(hw_id.to_string());
        node
    }

    /// Snapshot of all registered nodes
    pub fn get_all_nodes(&self) -> Vec<NodeDiscoveryMessage> {
        self.inner.lock().nodes_by_hwid.values().cloned().collect()
    }

    /// Look up a node by its hardware ID
    pub fn get_node_by_hwid(&self, hw_id: &str) -> Option<NodeDiscoveryMessage> {
        self.inner.lock().nodes_by_hwid.get(hw_id).cloned()
    }

    /// Look up a node by hardware ID or alias
    pub fn get_node_by_id(&self, id: &str) -> Option<NodeDiscoveryMessage> {
        let inner = self.inner.lock();
        if let Some(node) = inner.nodes_by_hwid.get(id) {
            return Some(node.clone());
        }
        let hw_id = inner.alias_to_hwid.get(id)?;
        inner.nodes_by_hwid.get(hw_id).cloned()
    }

    /// Look up a node by any of its addresses
    ///
    /// The address must parse, belong to this registry's domain and
    /// publisher and name a node by hardware ID or alias; anything else
    /// returns `None`.
    pub fn get_node_by_address(&self, address: &str) -> Option<NodeDiscoveryMessage> {
        let parsed = Address::parse(address)?;
        if parsed.domain != self.domain || parsed.publisher_id != self.publisher_id {
            return None;
        }
        self.get_node_by_id(&parsed.node_id?)
    }

    /// Current value of a node attribute
    pub fn get_node_attr(&self, hw_id: &str, attr: &str) -> Option<String> {
        self.inner
            .lock()
            .nodes_by_hwid
            .get(hw_id)
            .and_then(|node| node.attr.get(attr).cloned())
    }

    /// Current alias of a node, if one is set
    pub fn get_node_alias(&self, hw_id: &str) -> Option<String> {
        let inner = self.inner.lock();
        let node = inner.nodes_by_hwid.get(hw_id)?;
        if node.node_id != node.hw_id {
            Some(node.node_id.clone())
        } else {
            None
        }
    }

    /// Merge attribute values into a node
    ///
    /// The node is marked updated only when a value actually changed.
    pub fn update_node_attr(&self, hw_id: &str, attrs: AttrMap) {
        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes_by_hwid.get_mut(hw_id) else {
            return;
        };
        let mut changed = false;
        for (key, value) in attrs {
            if node.attr.get(&key) != Some(&value) {
                node.attr.insert(key, value);
                changed = true;
            }
        }
        if changed {
            node.timestamp = timestamp_now();
            inner.updated.insert(hw_id.to_string());
        }
    }

    /// Merge status values into a node
    ///
    /// Same change semantics as [`Self::update_node_attr`].
    pub fn update_node_status(&self, hw_id: &str, status: AttrMap) {
        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes_by_hwid.get_mut(hw_id) else {
            return;
        };
        let mut changed = false;
        for (key, value) in status {
            if node.status.get(&key) != Some(&value) {
                node.status.insert(key, value);
                changed = true;
            }
        }
        if changed {
            node.timestamp = timestamp_now();
            inner.updated.insert(hw_id.to_string());
        }
    }

    /// Record an error (or recovery) and update the node's run state
    ///
    /// No-op on an unknown hardware ID.
    pub fn update_error_status(&self, hw_id: &str, run_state: RunState, message: &str) {
        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes_by_hwid.get_mut(hw_id) else {
            return;
        };
        let mut changed = node.run_state != run_state;
        node.run_state = run_state;
        if node.status.get(node_status::ERROR).map(String::as_str) != Some(message) {
            node.status
                .insert(node_status::ERROR.to_string(), message.to_string());
            changed = true;
        }
        if node.status.get(node_status::RUN_STATE).map(String::as_str) != Some(run_state.as_str())
        {
            node.status
                .insert(node_status::RUN_STATE.to_string(), run_state.as_str().to_string());
            changed = true;
        }
        if changed {
            node.timestamp = timestamp_now();
            inner.updated.insert(hw_id.to_string());
        }
    }

    /// Create and register a configuration descriptor for a node attribute
    ///
    /// The current value starts out as the default.
    pub fn new_node_config(
        &self,
        hw_id: &str,
        attr: &str,
        data_type: DataType,
        description: &str,
        default: &str,
    ) -> ConfigDescriptor {
        let descriptor = ConfigDescriptor {
            data_type,
            description: description.to_string(),
            default: default.to_string(),
            value: default.to_string(),
            ..Default::default()
        };
        self.update_node_config(hw_id, attr, descriptor.clone());
        descriptor
    }

    /// Register or replace a configuration descriptor
    pub fn update_node_config(&self, hw_id: &str, attr: &str, descriptor: ConfigDescriptor) {
        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes_by_hwid.get_mut(hw_id) else {
            return;
        };
        node.config.insert(attr.to_string(), descriptor);
        node.timestamp = timestamp_now();
        inner.updated.insert(hw_id.to_string());
    }

    /// Apply a set of configuration values to their descriptors
    ///
    /// Unknown and empty attribute keys are silently ignored. When a value
    /// changes, the plain attribute of the same name is updated too so
    /// observers of `attr` see the effective value. Returns whether
    /// anything changed.
    pub fn update_node_config_values(&self, hw_id: &str, values: &AttrMap) -> bool {
        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes_by_hwid.get_mut(hw_id) else {
            return false;
        };
        let mut changed = false;
        for (key, value) in values {
            if key.is_empty() {
                continue;
            }
            let Some(descriptor) = node.config.get_mut(key) else {
                tracing::info!("unknown config attribute {} for node {}", key, hw_id);
                continue;
            };
            if &descriptor.value != value {
                descriptor.value = value.clone();
                node.attr.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        if changed {
            node.timestamp = timestamp_now();
            inner.updated.insert(hw_id.to_string());
        }
        changed
    }

    /// Effective string value of a configuration attribute
    fn config_value(&self, hw_id: &str, attr: &str) -> Result<String> {
        let inner = self.inner.lock();
        let node = inner
            .nodes_by_hwid
            .get(hw_id)
            .ok_or_else(|| RegistryError::NotFound {
                key: hw_id.to_string(),
            })?;
        let descriptor = node.config.get(attr).ok_or_else(|| RegistryError::NotFound {
            key: format!("{}/{}", hw_id, attr),
        })?;
        if descriptor.value.is_empty() {
            Ok(descriptor.default.clone())
        } else {
            Ok(descriptor.value.clone())
        }
    }

    /// Configuration value as a string
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown node or attribute. Callers that want a
    /// fallback use `unwrap_or`.
    pub fn get_node_config_string(&self, hw_id: &str, attr: &str) -> Result<String> {
        self.config_value(hw_id, attr)
    }

    /// Configuration value parsed as a boolean
    ///
    /// Accepts `true`/`false`, `1`/`0` and `yes`/`no`, case insensitively.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown node or attribute, `TypeMismatch` when the
    /// value is not a recognized boolean.
    pub fn get_node_config_bool(&self, hw_id: &str, attr: &str) -> Result<bool> {
        let value = self.config_value(hw_id, attr)?;
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(RegistryError::TypeMismatch {
                key: attr.to_string(),
                value,
                expected: "boolean",
            }
            .into()),
        }
    }

    /// Configuration value parsed as an integer
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown node or attribute, `TypeMismatch` when the
    /// value is not an integer (a decimal number is not).
    pub fn get_node_config_int(&self, hw_id: &str, attr: &str) -> Result<i64> {
        let value = self.config_value(hw_id, attr)?;
        value.parse::<i64>().map_err(|_| {
            RegistryError::TypeMismatch {
                key: attr.to_string(),
                value,
                expected: "integer",
            }
            .into()
        })
    }

    /// Configuration value parsed as a number
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown node or attribute, `TypeMismatch` when the
    /// value is not numeric.
    pub fn get_node_config_float(&self, hw_id: &str, attr: &str) -> Result<f64> {
        let value = self.config_value(hw_id, attr)?;
        value.parse::<f64>().map_err(|_| {
            RegistryError::TypeMismatch {
                key: attr.to_string(),
                value,
                expected: "number",
            }
            .into()
        })
    }

    /// Set, change or clear a node's alias
    ///
    /// The alias becomes the node ID used in published addresses. An empty
    /// alias restores the hardware ID. An alias equal to any registered
    /// hardware ID would shadow that node and is rejected without state
    /// change, as is an unknown hardware ID.
    pub fn set_alias(&self, hw_id: &str, alias: &str) {
        let mut inner = self.inner.lock();
        if !alias.is_empty() && inner.nodes_by_hwid.contains_key(alias) {
            tracing::info!("alias {} is an existing node, ignored", alias);
            return;
        }
        let Some(node) = inner.nodes_by_hwid.get_mut(hw_id) else {
            tracing::info!("set alias on unknown node {}, ignored", hw_id);
            return;
        };
        let previous_alias = if node.node_id != node.hw_id {
            Some(node.node_id.clone())
        } else {
            None
        };
        let node_id = if alias.is_empty() { hw_id } else { alias };
        node.node_id = node_id.to_string();
        node.address =
            make_node_address(&self.domain, &self.publisher_id, node_id, MessageType::Node);
        node.timestamp = timestamp_now();

        if let Some(previous) = previous_alias {
            inner.alias_to_hwid.remove(&previous);
        }
        if !alias.is_empty() {
            inner
                .alias_to_hwid
                .insert(alias.to_string(), hw_id.to_string());
        }
        inner.updated.insert(hw_id.to_string());
    }

    /// Add or replace a single node
    pub fn update_node(&self, node: NodeDiscoveryMessage) {
        let mut inner = self.inner.lock();
        Self::insert_node(&mut inner, node);
    }

    /// Bulk add or replace nodes
    ///
    /// Used when loading a cache snapshot or applying discovery of foreign
    /// nodes; each entry is added if new or replaces the entry with the
    /// same hardware ID.
    pub fn update_nodes(&self, nodes: Vec<NodeDiscoveryMessage>) {
        let mut inner = self.inner.lock();
        for node in nodes {
            Self::insert_node(&mut inner, node);
        }
    }

    fn insert_node(inner: &mut NodesInner, node: NodeDiscoveryMessage) {
        let hw_id = node.hw_id.clone();
        if node.node_id != node.hw_id {
            inner
                .alias_to_hwid
                .insert(node.node_id.clone(), hw_id.clone());
        }
        inner.nodes_by_hwid.insert(hw_id.clone(), node);
        inner.updated.insert(hw_id);
    }

    /// Nodes changed since the last drain
    ///
    /// With `clear` the updated set is drained; without it the set is
    /// only peeked at.
    pub fn get_updated_nodes(&self, clear: bool) -> Vec<NodeDiscoveryMessage> {
        let mut inner = self.inner.lock();
        let updated: Vec<NodeDiscoveryMessage> = inner
            .updated
            .iter()
            .filter_map(|hw_id| inner.nodes_by_hwid.get(hw_id).cloned())
            .collect();
        if clear {
            inner.updated.clear();
        }
        updated
    }
}
