//! Publication fan-out
//!
//! Drains the registries' updated sets into signed publications. Within a
//! tick the order is nodes, inputs, outputs, output values; that order is
//! observable on the bus. Output value forms are gated per node by the
//! `publishRaw`, `publishLatest`, `publishHistory` and `publishEvent`
//! configuration booleans.

use crate::messaging::address::{replace_message_type, MessageType};
use crate::messaging::messages::{
    node_attr, timestamp_now, NodeDiscoveryMessage, OutputEventMessage, OutputHistoryMessage,
    OutputLatestMessage, OutputValue,
};
use crate::messaging::messenger::Messenger;
use crate::publisher::Publisher;
use chrono::DateTime;
use serde::Serialize;
use std::collections::BTreeMap;

impl Publisher {
    /// Publish this publisher's identity on its identity address
    pub fn publish_identity(&self) {
        let Some(messenger) = self.messenger() else {
            return;
        };
        let identity = &self.identity().public;
        if let Err(err) =
            self.signer()
                .publish_object(messenger.as_ref(), &identity.address, identity)
        {
            tracing::error!("failed to publish identity {}: {}", identity.address, err);
        }
    }

    /// Publish every registered node, input and output
    ///
    /// Used at startup so subscribers see the full discovery state; the
    /// updated sets are drained since everything was just published.
    pub fn publish_full_discovery(&self) {
        let Some(messenger) = self.messenger() else {
            return;
        };
        // drain before publishing; a change racing in during the fan-out
        // stays marked and goes out on the next tick
        self.nodes().get_updated_nodes(true);
        self.inputs().get_updated_inputs(true);
        self.outputs().get_updated_outputs(true);
        for node in self.nodes().get_all_nodes() {
            self.publish_entity(messenger.as_ref(), &node.address, &node);
        }
        for input in self.inputs().get_all_inputs() {
            self.publish_entity(messenger.as_ref(), &input.address, &input);
        }
        for output in self.outputs().get_all_outputs() {
            self.publish_entity(messenger.as_ref(), &output.address, &output);
        }

        for output_id in self.output_values().get_updated_output_values(true) {
            self.publish_output_values(messenger.as_ref(), &output_id);
        }

        if self.config().save_discovered_nodes {
            self.save_registered_nodes();
        }
    }

    /// Drain all updated sets and publish the changes
    ///
    /// Runs on every heartbeat tick. Multiple changes to one entity since
    /// the previous tick coalesce into a single publication of the final
    /// state.
    pub fn publish_updates(&self) {
        let Some(messenger) = self.messenger() else {
            return;
        };

        let updated_nodes = self.nodes().get_updated_nodes(true);
        for node in &updated_nodes {
            self.publish_entity(messenger.as_ref(), &node.address, node);
        }
        if !updated_nodes.is_empty() && self.config().save_discovered_nodes {
            self.save_registered_nodes();
        }

        for input in self.inputs().get_updated_inputs(true) {
            self.publish_entity(messenger.as_ref(), &input.address, &input);
        }
        for output in self.outputs().get_updated_outputs(true) {
            self.publish_entity(messenger.as_ref(), &output.address, &output);
        }
        for output_id in self.output_values().get_updated_output_values(true) {
            self.publish_output_values(messenger.as_ref(), &output_id);
        }
    }

    fn publish_entity<T: Serialize>(&self, messenger: &dyn Messenger, address: &str, entity: &T) {
        if let Err(err) = self.signer().publish_object(messenger, address, entity) {
            tracing::error!("failed to publish {}: {}", address, err);
        }
    }

    /// Publish the value forms of one output, as configured on its node
    fn publish_output_values(&self, messenger: &dyn Messenger, output_id: &str) {
        let Some(latest) = self.output_values().get_latest(output_id) else {
            tracing::warn!("no value recorded for output {}", output_id);
            return;
        };
        let Some(output) = self.outputs().get_output_by_id(output_id) else {
            tracing::warn!("value update for unregistered output {}", output_id);
            return;
        };
        let Some(node) = self.nodes().get_node_by_hwid(&output.node_hw_id) else {
            tracing::warn!("no node registered for output {}", output_id);
            return;
        };
        let nodes = self.nodes();

        if nodes
            .get_node_config_bool(&node.hw_id, node_attr::PUBLISH_RAW)
            .unwrap_or(true)
        {
            if let Some(address) = replace_message_type(&output.address, MessageType::Value) {
                if let Err(err) = messenger.publish_raw(&address, latest.value.as_bytes()) {
                    tracing::error!("failed to publish {}: {}", address, err);
                }
            }
        }

        if nodes
            .get_node_config_bool(&node.hw_id, node_attr::PUBLISH_LATEST)
            .unwrap_or(true)
        {
            if let Some(address) = replace_message_type(&output.address, MessageType::Latest) {
                let message = OutputLatestMessage {
                    address: address.clone(),
                    sender: self.address().to_string(),
                    timestamp: latest.timestamp.clone(),
                    unit: output.unit.clone(),
                    value: latest.value.clone(),
                };
                self.publish_entity(messenger, &address, &message);
            }
        }

        if nodes
            .get_node_config_bool(&node.hw_id, node_attr::PUBLISH_HISTORY)
            .unwrap_or(true)
        {
            if let Some(address) = replace_message_type(&output.address, MessageType::History) {
                let history = self.output_values().get_history(output_id);
                let message = OutputHistoryMessage {
                    address: address.clone(),
                    duration: history_duration_secs(&history),
                    sender: self.address().to_string(),
                    timestamp: timestamp_now(),
                    unit: output.unit.clone(),
                    history,
                };
                self.publish_entity(messenger, &address, &message);
            }
        }

        if nodes
            .get_node_config_bool(&node.hw_id, node_attr::PUBLISH_EVENT)
            .unwrap_or(false)
        {
            self.publish_output_event(messenger, &node);
        }
    }

    /// Publish an `$event` message with the latest value of every output
    /// of a node
    fn publish_output_event(&self, messenger: &dyn Messenger, node: &NodeDiscoveryMessage) {
        let Some(address) = replace_message_type(&node.address, MessageType::Event) else {
            return;
        };
        let outputs = self.outputs().get_outputs_by_node_hwid(&node.hw_id);
        if outputs.is_empty() {
            tracing::info!("node {} has no outputs to publish an event for", node.address);
            return;
        }

        let mut event = BTreeMap::new();
        for output in outputs {
            let value = self
                .output_values()
                .get_latest(&output.output_id)
                .map(|latest| latest.value)
                .unwrap_or_default();
            event.insert(format!("{}/{}", output.output_type, output.instance), value);
        }
        let message = OutputEventMessage {
            address: address.clone(),
            event,
            timestamp: timestamp_now(),
        };
        self.publish_entity(messenger, &address, &message);
    }
}

/// Seconds between the newest and oldest entry of a history snapshot
fn history_duration_secs(history: &[OutputValue]) -> i64 {
    let (Some(newest), Some(oldest)) = (history.first(), history.last()) else {
        return 0;
    };
    match (
        DateTime::parse_from_rfc3339(&newest.timestamp),
        DateTime::parse_from_rfc3339(&oldest.timestamp),
    ) {
        (Ok(newest), Ok(oldest)) => newest.signed_duration_since(oldest).num_seconds(),
        _ => 0,
    }
}
