//! End-to-end tests for a running publisher
//!
//! These drive a publisher over the in-process loopback messenger: signed
//! commands arrive through real subscriptions, the heartbeat drains the
//! registries and every publication crosses the signing pipeline.

use iotpub::{
    AttrMap, DataType, DummyMessenger, MessageSigner, NodeAliasMessage, NodeConfigureMessage,
    NodeDiscoveryMessage, NodeType, Publisher, PublisherConfig, SetInputMessage, SigningMethod,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DOMAIN: &str = "test";
const PUBLISHER1: &str = "publisher1";
const NODE1: &str = "node1";

fn timestamp_now() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}

fn test_config(folder: &TempDir, publisher_id: &str) -> PublisherConfig {
    let mut config = PublisherConfig::new(publisher_id)
        .with_domain(DOMAIN)
        .with_config_folder(folder.path().join("config"))
        .with_cache_folder(folder.path().join("cache"));
    config.heartbeat_interval = Duration::from_millis(50);
    config
}

/// A remote peer on the same bus: its own identity and signer, announced
/// so the publisher under test learns its key.
fn join_remote_peer(messenger: &Arc<DummyMessenger>, publisher_id: &str) -> MessageSigner {
    let (identity, key) = iotpub::identity::create_identity(DOMAIN, publisher_id).unwrap();
    let signer = MessageSigner::new(
        SigningMethod::Jws,
        true,
        identity.public.address.clone(),
        key,
        Arc::new(|_: &str| None),
    );
    signer
        .publish_object(messenger.as_ref(), &identity.public.address, &identity.public)
        .unwrap();
    signer
}

#[tokio::test]
async fn test_signed_configure_command_roundtrip() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger.clone())).unwrap();

    publisher.nodes().create_node(NODE1, NodeType::Unknown);
    publisher
        .nodes()
        .new_node_config(NODE1, "name", DataType::String, "Friendly name", "anonymous");

    // a handler that echoes its parameters through unchanged
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let handler_calls_clone = Arc::clone(&handler_calls);
    publisher.set_node_config_handler(Arc::new(move |_node: &NodeDiscoveryMessage, attr: AttrMap| {
        handler_calls_clone.fetch_add(1, Ordering::SeqCst);
        Some(attr)
    }));

    publisher.start().await.unwrap();

    // another publisher announces itself, then sends a signed configure
    let remote = join_remote_peer(&messenger, "remote1");
    let address = format!("{}/{}/{}/$configure", DOMAIN, PUBLISHER1, NODE1);
    let command = NodeConfigureMessage {
        address: address.clone(),
        sender: remote.sender_address().to_string(),
        attr: AttrMap::from([("name".to_string(), "bob".to_string())]),
        timestamp: timestamp_now(),
    };
    remote
        .publish_object(messenger.as_ref(), &address, &command)
        .unwrap();

    assert_eq!(
        publisher.nodes().get_node_attr(NODE1, "name").as_deref(),
        Some("bob")
    );
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);

    publisher.stop().await;
}

#[tokio::test]
async fn test_alias_command_roundtrip() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger.clone())).unwrap();

    publisher.nodes().create_node(NODE1, NodeType::Unknown);
    publisher.outputs().create_output(NODE1, "switch", "0");
    publisher.start().await.unwrap();

    let remote = join_remote_peer(&messenger, "remote1");
    let address = format!("{}/{}/{}/$alias", DOMAIN, PUBLISHER1, NODE1);
    let command = NodeAliasMessage {
        address: address.clone(),
        sender: remote.sender_address().to_string(),
        alias: "alias1".to_string(),
        timestamp: timestamp_now(),
    };
    remote
        .publish_object(messenger.as_ref(), &address, &command)
        .unwrap();

    let node = publisher.nodes().get_node_by_id("alias1").expect("alias resolves");
    assert_eq!(node.hw_id, NODE1);
    let output = publisher
        .outputs()
        .get_output_by_id("node1.switch.0")
        .unwrap();
    assert_eq!(output.address, "test/publisher1/alias1/$output/switch/0");

    publisher.stop().await;
}

#[tokio::test]
async fn test_set_input_command_roundtrip() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger.clone())).unwrap();

    publisher.nodes().create_node(NODE1, NodeType::Switch);
    publisher.inputs().create_input(NODE1, "switch", "0");

    let received = Arc::new(AtomicUsize::new(0));
    let received_clone = Arc::clone(&received);
    publisher.set_node_input_handler(Arc::new(
        move |input: &iotpub::InputDiscoveryMessage, message: &SetInputMessage| {
            assert_eq!(input.input_id, "node1.switch.0");
            assert_eq!(message.value, "on");
            received_clone.fetch_add(1, Ordering::SeqCst);
        },
    ));

    publisher.start().await.unwrap();

    let remote = join_remote_peer(&messenger, "remote1");
    let address = format!("{}/{}/{}/$set/switch/0", DOMAIN, PUBLISHER1, NODE1);
    let command = SetInputMessage {
        address: address.clone(),
        sender: remote.sender_address().to_string(),
        value: "on".to_string(),
        timestamp: timestamp_now(),
    };
    remote
        .publish_object(messenger.as_ref(), &address, &command)
        .unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 1);
    let pending = publisher.inputs().get_pending_inputs(true);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].value, "on");

    publisher.stop().await;
}

#[tokio::test]
async fn test_unknown_signer_command_dropped() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger.clone())).unwrap();

    publisher.nodes().create_node(NODE1, NodeType::Unknown);
    publisher
        .nodes()
        .new_node_config(NODE1, "name", DataType::String, "", "anonymous");
    publisher.start().await.unwrap();

    // a signer whose identity was never announced on the bus
    let (identity, key) = iotpub::identity::create_identity(DOMAIN, "stranger").unwrap();
    let stranger = MessageSigner::new(
        SigningMethod::Jws,
        true,
        identity.public.address,
        key,
        Arc::new(|_: &str| None),
    );
    let address = format!("{}/{}/{}/$configure", DOMAIN, PUBLISHER1, NODE1);
    let command = NodeConfigureMessage {
        address: address.clone(),
        sender: stranger.sender_address().to_string(),
        attr: AttrMap::from([("name".to_string(), "mallory".to_string())]),
        timestamp: timestamp_now(),
    };
    stranger
        .publish_object(messenger.as_ref(), &address, &command)
        .unwrap();

    assert_eq!(
        publisher
            .nodes()
            .get_node_config_string(NODE1, "name")
            .unwrap(),
        "anonymous"
    );

    publisher.stop().await;
}

#[tokio::test]
async fn test_heartbeat_coalesces_attribute_updates() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let mut config = test_config(&folder, PUBLISHER1);
    config.heartbeat_interval = Duration::from_millis(100);
    let publisher = Publisher::new(config, Some(messenger.clone())).unwrap();

    publisher.nodes().create_node(NODE1, NodeType::Sensor);
    publisher.start().await.unwrap();
    messenger.clear_publications();

    // five consecutive updates within one tick
    for i in 0..5 {
        publisher.nodes().update_node_attr(
            NODE1,
            AttrMap::from([("model".to_string(), format!("model-{}", i))]),
        );
    }
    tokio::time::sleep(Duration::from_millis(250)).await;

    let node_address = format!("{}/{}/{}/$node", DOMAIN, PUBLISHER1, NODE1);
    assert_eq!(
        messenger.publication_count(&node_address),
        1,
        "five changes in one tick must coalesce into one publication"
    );

    // and the publication carries the final state
    let publication = messenger.last_publication(&node_address).unwrap();
    let (payload, _) = publisher
        .signer()
        .verify(&node_address, &publication.payload)
        .unwrap();
    let node: NodeDiscoveryMessage = serde_json::from_slice(&payload).unwrap();
    assert_eq!(node.attr.get("model").map(String::as_str), Some("model-4"));

    publisher.stop().await;
}

#[tokio::test]
async fn test_heartbeat_publishes_output_values() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger.clone())).unwrap();

    publisher.nodes().create_node(NODE1, NodeType::Sensor);
    publisher.outputs().create_output(NODE1, "temperature", "0");
    publisher.start().await.unwrap();
    messenger.clear_publications();

    publisher
        .output_values()
        .update_output_value("node1.temperature.0", "21.5", None);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let raw = messenger
        .last_publication("test/publisher1/node1/$value/temperature/0")
        .expect("raw value published");
    assert_eq!(raw.payload, b"21.5");
    assert!(messenger
        .last_publication("test/publisher1/node1/$latest/temperature/0")
        .is_some());
    assert!(messenger
        .last_publication("test/publisher1/node1/$history/temperature/0")
        .is_some());

    publisher.stop().await;
}

#[tokio::test]
async fn test_discovery_handler_runs_before_poll() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger)).unwrap();

    let discoveries = Arc::new(AtomicUsize::new(0));
    let polls = Arc::new(AtomicUsize::new(0));

    let discoveries_clone = Arc::clone(&discoveries);
    publisher.set_discovery_interval(
        3600,
        Arc::new(move |_publisher: &Publisher| {
            discoveries_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let polls_clone = Arc::clone(&polls);
    publisher.set_poll_interval(
        3600,
        Arc::new(move |_publisher: &Publisher| {
            polls_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );

    publisher.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    publisher.stop().await;

    assert_eq!(discoveries.load(Ordering::SeqCst), 1);
    assert_eq!(polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_publishes_full_discovery() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger.clone())).unwrap();

    publisher.nodes().create_node(NODE1, NodeType::Sensor);
    publisher.inputs().create_input(NODE1, "switch", "0");
    publisher.outputs().create_output(NODE1, "temperature", "0");

    publisher.start().await.unwrap();

    assert_eq!(messenger.publication_count("test/publisher1/$identity"), 1);
    assert_eq!(
        messenger.publication_count("test/publisher1/node1/$node"),
        1
    );
    assert_eq!(
        messenger.publication_count("test/publisher1/node1/$input/switch/0"),
        1
    );
    assert_eq!(
        messenger.publication_count("test/publisher1/node1/$output/temperature/0"),
        1
    );

    publisher.stop().await;
}

#[tokio::test]
async fn test_nodes_cache_roundtrip_across_restart() {
    let folder = TempDir::new().unwrap();

    // first run: register, configure and persist
    {
        let messenger = Arc::new(DummyMessenger::new());
        let config = test_config(&folder, PUBLISHER1).with_cache_discovery(true);
        let publisher = Publisher::new(config, Some(messenger)).unwrap();
        publisher.nodes().create_node(NODE1, NodeType::Sensor);
        publisher
            .nodes()
            .new_node_config(NODE1, "name", DataType::String, "", "anonymous");
        publisher
            .nodes()
            .update_node_config_values(NODE1, &AttrMap::from([("name".to_string(), "bob".to_string())]));
        publisher.start().await.unwrap();
        publisher.stop().await;
    }

    // second run: the cache restores the configured state
    let messenger = Arc::new(DummyMessenger::new());
    let config = test_config(&folder, PUBLISHER1).with_cache_discovery(true);
    let publisher = Publisher::new(config, Some(messenger)).unwrap();
    publisher.load_from_cache();

    let node = publisher.nodes().get_node_by_id(NODE1).expect("cached node loads");
    assert_eq!(node.node_type, NodeType::Sensor);
    assert_eq!(
        publisher
            .nodes()
            .get_node_config_string(NODE1, "name")
            .unwrap(),
        "bob"
    );

    // byte-level equality of the re-serialized entity
    let cached = iotpub::storage::cache::load_nodes(&folder.path().join("cache"), PUBLISHER1).unwrap();
    assert_eq!(
        serde_json::to_vec(&cached[0]).unwrap(),
        serde_json::to_vec(&node).unwrap()
    );
}

#[tokio::test]
async fn test_trust_policy_end_to_end() {
    let folder = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new());
    let publisher = Publisher::new(test_config(&folder, PUBLISHER1), Some(messenger.clone())).unwrap();
    publisher.start().await.unwrap();

    // without a DSS, a self-signed peer is accepted
    let _remote = join_remote_peer(&messenger, "remote1");
    assert!(publisher
        .domain_publishers()
        .get_publisher_key("test/remote1/$identity")
        .is_some());

    // once a DSS is known, self-signed identities are no longer accepted
    let _dss = join_remote_peer(&messenger, "$dss");
    assert!(publisher.domain_publishers().get_dss_key().is_some());

    let _late = join_remote_peer(&messenger, "remote2");
    assert!(
        publisher
            .domain_publishers()
            .get_publisher_key("test/remote2/$identity")
            .is_none(),
        "self-signed identity must be rejected once a DSS is present"
    );

    publisher.stop().await;
}
