//! Hierarchical topic address grammar
//!
//! Addresses are slash-separated paths of the form
//! `<domain>/<publisherID>/<nodeID>/<messageType>[/<ioType>/<instance>]`.
//! The publisher's own identity lives on the shorter
//! `<domain>/<publisherID>/$identity` form. The message type segment is a
//! `$`-prefixed sentinel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `+` wildcard, valid only in subscription patterns
pub const WILDCARD: &str = "+";

/// Publisher ID reserved for the Domain Security Service
pub const DSS_PUBLISHER_ID: &str = "$dss";

/// Message type sentinel carried in an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Node discovery publication
    #[serde(rename = "$node")]
    Node,
    /// Input discovery publication
    #[serde(rename = "$input")]
    Input,
    /// Output discovery publication
    #[serde(rename = "$output")]
    Output,
    /// Node configuration command
    #[serde(rename = "$configure")]
    Configure,
    /// Set-input command
    #[serde(rename = "$set")]
    Set,
    /// Raw output value publication
    #[serde(rename = "$value")]
    Value,
    /// Latest output value publication
    #[serde(rename = "$latest")]
    Latest,
    /// Output value history publication
    #[serde(rename = "$history")]
    History,
    /// Event publication with all node output values
    #[serde(rename = "$event")]
    Event,
    /// Publisher identity publication
    #[serde(rename = "$identity")]
    Identity,
    /// Node alias command
    #[serde(rename = "$alias")]
    Alias,
}

impl MessageType {
    /// The `$`-prefixed wire form of this message type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Node => "$node",
            MessageType::Input => "$input",
            MessageType::Output => "$output",
            MessageType::Configure => "$configure",
            MessageType::Set => "$set",
            MessageType::Value => "$value",
            MessageType::Latest => "$latest",
            MessageType::History => "$history",
            MessageType::Event => "$event",
            MessageType::Identity => "$identity",
            MessageType::Alias => "$alias",
        }
    }

    /// Parse a `$`-prefixed segment. Returns `None` for unknown sentinels.
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "$node" => Some(MessageType::Node),
            "$input" => Some(MessageType::Input),
            "$output" => Some(MessageType::Output),
            "$configure" => Some(MessageType::Configure),
            "$set" => Some(MessageType::Set),
            "$value" => Some(MessageType::Value),
            "$latest" => Some(MessageType::Latest),
            "$history" => Some(MessageType::History),
            "$event" => Some(MessageType::Event),
            "$identity" => Some(MessageType::Identity),
            "$alias" => Some(MessageType::Alias),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed topic address
///
/// `node_id` is `None` for the 3-segment publisher identity form.
/// `io_type`/`instance` are present only on 6-segment input/output
/// addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Domain segment
    pub domain: String,
    /// Publisher ID segment
    pub publisher_id: String,
    /// Node ID segment; carries the hardware ID or its alias
    pub node_id: Option<String>,
    /// Message type sentinel
    pub message_type: MessageType,
    /// Input or output type on 6-segment addresses
    pub io_type: Option<String>,
    /// Input or output instance on 6-segment addresses
    pub instance: Option<String>,
}

impl Address {
    /// Parse an address string into its parts
    ///
    /// Accepts the 3-segment identity form, the 4-segment node form and the
    /// 6-segment input/output form. Malformed addresses, unknown message
    /// types and wildcard segments all return `None`; receivers reject such
    /// input.
    pub fn parse(address: &str) -> Option<Address> {
        let segments: Vec<&str> = address.split('/').collect();
        if segments.iter().any(|s| s.is_empty() || *s == WILDCARD) {
            return None;
        }
        match segments.len() {
            3 => {
                let message_type = MessageType::parse(segments[2])?;
                Some(Address {
                    domain: segments[0].to_string(),
                    publisher_id: segments[1].to_string(),
                    node_id: None,
                    message_type,
                    io_type: None,
                    instance: None,
                })
            }
            4 => {
                let message_type = MessageType::parse(segments[3])?;
                Some(Address {
                    domain: segments[0].to_string(),
                    publisher_id: segments[1].to_string(),
                    node_id: Some(segments[2].to_string()),
                    message_type,
                    io_type: None,
                    instance: None,
                })
            }
            6 => {
                let message_type = MessageType::parse(segments[3])?;
                Some(Address {
                    domain: segments[0].to_string(),
                    publisher_id: segments[1].to_string(),
                    node_id: Some(segments[2].to_string()),
                    message_type,
                    io_type: Some(segments[4].to_string()),
                    instance: Some(segments[5].to_string()),
                })
            }
            _ => None,
        }
    }
}

/// Compose a 4-segment node address
pub fn make_node_address(
    domain: &str,
    publisher_id: &str,
    node_id: &str,
    message_type: MessageType,
) -> String {
    format!("{}/{}/{}/{}", domain, publisher_id, node_id, message_type)
}

/// Compose a 6-segment input or output address
pub fn make_io_address(
    domain: &str,
    publisher_id: &str,
    node_id: &str,
    message_type: MessageType,
    io_type: &str,
    instance: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}/{}",
        domain, publisher_id, node_id, message_type, io_type, instance
    )
}

/// Compose the 3-segment publisher identity address
pub fn make_publisher_identity_address(domain: &str, publisher_id: &str) -> String {
    format!("{}/{}/{}", domain, publisher_id, MessageType::Identity)
}

/// Compose the identity address of the domain's security service
pub fn make_dss_address(domain: &str) -> String {
    make_publisher_identity_address(domain, DSS_PUBLISHER_ID)
}

/// Replace the message type segment of an address
///
/// The segment count is preserved. Returns `None` unless the address has at
/// least the first four segments.
pub fn replace_message_type(address: &str, message_type: MessageType) -> Option<String> {
    let mut segments: Vec<&str> = address.split('/').collect();
    if segments.len() < 4 || segments[..4].iter().any(|s| s.is_empty()) {
        return None;
    }
    let sentinel = message_type.as_str();
    segments[3] = sentinel;
    Some(segments.join("/"))
}
