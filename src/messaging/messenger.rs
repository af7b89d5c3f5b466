//! Message bus transport contract
//!
//! The concrete transport (an MQTT-like pub/sub client) lives outside this
//! crate; `Messenger` is its contract. `DummyMessenger` is an in-process
//! loopback implementation used by the test suite and by applications that
//! want to run a publisher without a broker.

use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Callback invoked for each message delivered on a subscription
///
/// Callbacks may be invoked concurrently from transport-owned tasks.
pub type SubscriptionCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Contract for the message bus transport
pub trait Messenger: Send + Sync {
    /// Connect to the message bus
    ///
    /// An optional last-will address and payload may be registered so the
    /// bus can announce an unexpected disconnect.
    fn connect(&self, lwt_address: Option<&str>, lwt_payload: Option<&[u8]>) -> Result<()>;

    /// Disconnect from the message bus
    fn disconnect(&self);

    /// Publish an envelope on an address
    fn publish(&self, address: &str, payload: &[u8]) -> Result<()>;

    /// Publish a bare value without an envelope, used for `$value`
    fn publish_raw(&self, address: &str, payload: &[u8]) -> Result<()>;

    /// Subscribe to an address pattern; `+` matches a single segment
    fn subscribe(&self, pattern: &str, callback: SubscriptionCallback) -> Result<()>;

    /// Remove the subscription for an address pattern
    fn unsubscribe(&self, pattern: &str);
}

/// Match an address against a subscription pattern
///
/// Patterns and addresses are compared segment by segment; `+` matches any
/// single segment. Segment counts must be equal.
pub fn address_matches(pattern: &str, address: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let address_segments: Vec<&str> = address.split('/').collect();
    if pattern_segments.len() != address_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(&address_segments)
        .all(|(p, a)| *p == "+" || p == a)
}

/// A single recorded publication
#[derive(Debug, Clone)]
pub struct Publication {
    /// Address the payload was published on
    pub address: String,
    /// The payload bytes
    pub payload: Vec<u8>,
    /// Whether the payload went out via `publish_raw`
    pub raw: bool,
}

/// In-process loopback messenger
///
/// Records every publication and synchronously delivers each one to the
/// matching subscriptions, so command round trips can be exercised without
/// a broker.
#[derive(Default)]
pub struct DummyMessenger {
    connected: Mutex<bool>,
    subscriptions: Mutex<Vec<(String, SubscriptionCallback)>>,
    publications: Mutex<Vec<Publication>>,
}

impl DummyMessenger {
    /// Create a new disconnected loopback messenger
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded publications in publish order
    pub fn publications(&self) -> Vec<Publication> {
        self.publications.lock().clone()
    }

    /// Number of publications recorded on an exact address
    pub fn publication_count(&self, address: &str) -> usize {
        self.publications
            .lock()
            .iter()
            .filter(|p| p.address == address)
            .count()
    }

    /// Most recent publication on an exact address
    pub fn last_publication(&self, address: &str) -> Option<Publication> {
        self.publications
            .lock()
            .iter()
            .rev()
            .find(|p| p.address == address)
            .cloned()
    }

    /// Forget all recorded publications
    pub fn clear_publications(&self) {
        self.publications.lock().clear();
    }

    /// Whether `connect` has been called without a later `disconnect`
    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    fn dispatch(&self, address: &str, payload: &[u8]) {
        // Snapshot the matching callbacks so handlers can subscribe or
        // publish without deadlocking on the subscription lock.
        let matching: Vec<SubscriptionCallback> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(pattern, _)| address_matches(pattern, address))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in matching {
            callback(address, payload);
        }
    }
}

impl Messenger for DummyMessenger {
    fn connect(&self, _lwt_address: Option<&str>, _lwt_payload: Option<&[u8]>) -> Result<()> {
        *self.connected.lock() = true;
        Ok(())
    }

    fn disconnect(&self) {
        *self.connected.lock() = false;
    }

    fn publish(&self, address: &str, payload: &[u8]) -> Result<()> {
        self.publications.lock().push(Publication {
            address: address.to_string(),
            payload: payload.to_vec(),
            raw: false,
        });
        self.dispatch(address, payload);
        Ok(())
    }

    fn publish_raw(&self, address: &str, payload: &[u8]) -> Result<()> {
        self.publications.lock().push(Publication {
            address: address.to_string(),
            payload: payload.to_vec(),
            raw: true,
        });
        self.dispatch(address, payload);
        Ok(())
    }

    fn subscribe(&self, pattern: &str, callback: SubscriptionCallback) -> Result<()> {
        self.subscriptions
            .lock()
            .push((pattern.to_string(), callback));
        Ok(())
    }

    fn unsubscribe(&self, pattern: &str) {
        self.subscriptions.lock().retain(|(p, _)| p != pattern);
    }
}
