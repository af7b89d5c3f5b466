//! Wire message types
//!
//! All bus payloads are JSON with fixed field names. Maps use `BTreeMap` so
//! serialized output is stable, which keeps signatures and cache files
//! reproducible.

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute and status maps: attribute key to string value
pub type AttrMap = BTreeMap<String, String>;

/// Node configuration map: attribute key to its descriptor
pub type ConfigMap = BTreeMap<String, ConfigDescriptor>;

/// Current wall clock in RFC3339 with millisecond precision
///
/// Every entity mutation stamps its entity with this format; value history
/// retention parses it back for age checks.
pub fn timestamp_now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Well-known node attribute keys
pub mod node_attr {
    /// Human friendly node name
    pub const NAME: &str = "name";
    /// Node description
    pub const DESCRIPTION: &str = "description";
    /// Device manufacturer
    pub const MANUFACTURER: &str = "manufacturer";
    /// Device model
    pub const MODEL: &str = "model";
    /// Node is disabled
    pub const DISABLED: &str = "disabled";
    /// Lower bound of a node's output range
    pub const MIN: &str = "min";
    /// Upper bound of a node's output range
    pub const MAX: &str = "max";
    /// Enable publication of raw `$value` messages
    pub const PUBLISH_RAW: &str = "publishRaw";
    /// Enable publication of `$latest` messages
    pub const PUBLISH_LATEST: &str = "publishLatest";
    /// Enable publication of `$history` messages
    pub const PUBLISH_HISTORY: &str = "publishHistory";
    /// Enable publication of `$event` messages
    pub const PUBLISH_EVENT: &str = "publishEvent";
}

/// Well-known node status keys
pub mod node_status {
    /// Most recent error message
    pub const ERROR: &str = "error";
    /// Timestamp the node was last seen
    pub const LAST_SEEN: &str = "lastSeen";
    /// Current run state, mirrors the `runState` field
    pub const RUN_STATE: &str = "runState";
}

/// Data type tag of a configuration or IO value
///
/// Values are strings on the wire; this tag tells callers which typed
/// accessor applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Boolean, accepts true/false, 1/0, yes/no
    Bool,
    /// One of the descriptor's enum values
    Enum,
    /// Integer number
    Int,
    /// Decimal number
    Number,
    /// Raw bytes, base64 encoded
    Raw,
    /// Plain string (default)
    #[default]
    String,
}

/// Kind of device or service a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Alarm or siren
    Alarm,
    /// Camera device
    Camera,
    /// Gateway to other devices
    Gateway,
    /// Device with multiple sensors
    Multisensor,
    /// Single sensor
    Sensor,
    /// On/off switch or relay
    Switch,
    /// Thermostat
    Thermostat,
    /// Type not (yet) known
    #[default]
    Unknown,
}

/// Operational run state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Node is connected and operational
    #[default]
    Ready,
    /// Node is initializing
    Initializing,
    /// Node reported an error
    Error,
    /// Node is disconnected on request
    Disconnected,
    /// Node is unexpectedly gone
    Lost,
    /// Node is in power-saving sleep
    Sleeping,
}

impl RunState {
    /// The lowercase wire form, as carried in the status map
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Ready => "ready",
            RunState::Initializing => "initializing",
            RunState::Error => "error",
            RunState::Disconnected => "disconnected",
            RunState::Lost => "lost",
            RunState::Sleeping => "sleeping",
        }
    }
}

/// Configuration attribute descriptor
///
/// Describes one configurable attribute of a node. The current value is
/// always a string; typed accessors parse it on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigDescriptor {
    /// Type tag used to pick the parsing accessor
    #[serde(rename = "dataType")]
    pub data_type: DataType,

    /// Human description of the attribute
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Default value, applied as the initial current value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,

    /// Current value as a string
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    /// Permissible values for enum typed attributes
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    /// Lower bound for numeric attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Upper bound for numeric attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Value is sensitive and must not be republished in discovery
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secret: bool,
}

/// Node discovery publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDiscoveryMessage {
    /// Discovery address this node publishes on
    pub address: String,

    /// Publisher owning the node
    #[serde(rename = "publisherID")]
    pub publisher_id: String,

    /// Node ID used in addresses; the hardware ID or its alias
    #[serde(rename = "nodeID")]
    pub node_id: String,

    /// Immutable hardware ID of the node
    #[serde(rename = "hwID")]
    pub hw_id: String,

    /// Kind of device or service
    #[serde(rename = "nodeType")]
    pub node_type: NodeType,

    /// Descriptive attributes (manufacturer, model, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attr: AttrMap,

    /// Status values (last seen, error, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub status: AttrMap,

    /// Configuration descriptors by attribute key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: ConfigMap,

    /// Operational run state
    #[serde(rename = "runState", default)]
    pub run_state: RunState,

    /// Time of the last change to this node
    pub timestamp: String,
}

/// Input discovery publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDiscoveryMessage {
    /// Discovery address of the input
    pub address: String,

    /// Publisher owning the input
    #[serde(rename = "publisherID")]
    pub publisher_id: String,

    /// Hardware ID of the owning node
    #[serde(rename = "nodeHWID")]
    pub node_hw_id: String,

    /// Input type, for example "switch" or "temperature"
    #[serde(rename = "inputType")]
    pub input_type: String,

    /// Instance to distinguish multiple inputs of the same type
    pub instance: String,

    /// Type tag of accepted values
    #[serde(rename = "dataType", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,

    /// Unit of accepted values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Time of the last change to this input
    pub timestamp: String,

    /// Registry key `<hwID>.<type>.<instance>`, not published
    #[serde(skip)]
    pub input_id: String,
}

/// Output discovery publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDiscoveryMessage {
    /// Discovery address of the output
    pub address: String,

    /// Publisher owning the output
    #[serde(rename = "publisherID")]
    pub publisher_id: String,

    /// Hardware ID of the owning node
    #[serde(rename = "nodeHWID")]
    pub node_hw_id: String,

    /// Output type, for example "switch" or "temperature"
    #[serde(rename = "outputType")]
    pub output_type: String,

    /// Instance to distinguish multiple outputs of the same type
    pub instance: String,

    /// Type tag of emitted values
    #[serde(rename = "dataType", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,

    /// Unit of emitted values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Time of the last change to this output
    pub timestamp: String,

    /// Registry key `<hwID>.<type>.<instance>`, not published
    #[serde(skip)]
    pub output_id: String,
}

/// Command to set an input value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetInputMessage {
    /// `$set` address of the input
    pub address: String,

    /// Identity address of the sender
    pub sender: String,

    /// Requested value as a string
    pub value: String,

    /// Time the command was issued
    pub timestamp: String,
}

/// Command to update node configuration values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfigureMessage {
    /// `$configure` address of the node
    pub address: String,

    /// Identity address of the sender
    pub sender: String,

    /// Requested attribute values
    #[serde(default)]
    pub attr: AttrMap,

    /// Time the command was issued
    pub timestamp: String,
}

/// Command to set or clear a node's alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAliasMessage {
    /// `$alias` address of the node
    pub address: String,

    /// Identity address of the sender
    pub sender: String,

    /// New alias; empty clears the alias
    pub alias: String,

    /// Time the command was issued
    pub timestamp: String,
}

/// A single timestamped output value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    /// Value as a string
    pub value: String,

    /// Time the value was captured
    pub timestamp: String,
}

/// `$latest` publication with the most recent output value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLatestMessage {
    /// `$latest` address of the output
    pub address: String,

    /// Identity address of the publisher
    pub sender: String,

    /// Timestamp of the value
    pub timestamp: String,

    /// Unit of the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// The most recent value
    pub value: String,
}

/// `$history` publication with the retained output values, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputHistoryMessage {
    /// `$history` address of the output
    pub address: String,

    /// Time span covered by the history in seconds
    pub duration: i64,

    /// Identity address of the publisher
    pub sender: String,

    /// Time of publication
    pub timestamp: String,

    /// Unit of the values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Retained values, newest first
    pub history: Vec<OutputValue>,
}

/// `$event` publication with the latest value of every node output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEventMessage {
    /// `$event` address of the node
    pub address: String,

    /// Latest value per output, keyed `<type>/<instance>`
    pub event: BTreeMap<String, String>,

    /// Time of publication
    pub timestamp: String,
}
