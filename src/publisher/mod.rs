//! Publisher lifecycle and heartbeat
//!
//! The `Publisher` ties everything together: it owns the registries, the
//! signer, the trust directory and the receivers, and runs the single
//! heartbeat task that drains pending changes into signed publications
//! once a second.

mod publish;

use crate::config::PublisherConfig;
use crate::error::{ConfigError, Result};
use crate::identity::identity::{setup_publisher_identity, PublisherFullIdentity};
use crate::identity::trust::DomainPublishers;
use crate::messaging::messenger::Messenger;
use crate::messaging::signer::{MessageSigner, PublicKeyResolver};
use crate::receivers::alias::AliasReceiver;
use crate::receivers::configure::{ConfigureReceiver, NodeConfigHandler};
use crate::receivers::discovery::PublisherDiscoveryReceiver;
use crate::receivers::set_input::{NodeInputHandler, SetInputReceiver};
use crate::registry::inputs::RegisteredInputs;
use crate::registry::nodes::RegisteredNodes;
use crate::registry::outputs::RegisteredOutputs;
use crate::registry::values::{HistoryRetention, RegisteredOutputValues};
use crate::storage::cache;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Periodic callback receiving the publisher, for discovery and polling
///
/// Handlers run on their own short-lived task so a slow handler cannot
/// stall the heartbeat; they should still return promptly.
pub type PublisherHandler = Arc<dyn Fn(&Publisher) + Send + Sync>;

struct Countdowns {
    discovery_interval: u64,
    poll_interval: u64,
    discover_countdown: i64,
    poll_countdown: i64,
}

struct PublisherInner {
    config: PublisherConfig,
    full_identity: PublisherFullIdentity,

    nodes: Arc<RegisteredNodes>,
    inputs: Arc<RegisteredInputs>,
    outputs: Arc<RegisteredOutputs>,
    output_values: Arc<RegisteredOutputValues>,
    domain_publishers: Arc<DomainPublishers>,
    signer: Arc<MessageSigner>,

    messenger: RwLock<Option<Arc<dyn Messenger>>>,

    configure_receiver: Arc<ConfigureReceiver>,
    set_input_receiver: Arc<SetInputReceiver>,
    alias_receiver: Arc<AliasReceiver>,
    discovery_receiver: Arc<PublisherDiscoveryReceiver>,

    discovery_handler: RwLock<Option<PublisherHandler>>,
    poll_handler: RwLock<Option<PublisherHandler>>,
    countdowns: Mutex<Countdowns>,

    running: Mutex<bool>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

/// A publisher on the domain message bus
///
/// Cheap to clone; clones share the same state. Create with
/// [`Publisher::new`], register nodes, inputs and outputs, then
/// [`Publisher::start`] to go live.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

impl Publisher {
    /// Create a publisher from its configuration
    ///
    /// Loads or creates the publisher identity in the config folder,
    /// instantiates the registries and registers the own identity in the
    /// trust directory. The messenger may be attached later with
    /// [`Publisher::set_messenger`], but `start` requires one.
    pub fn new(
        config: PublisherConfig,
        messenger: Option<Arc<dyn Messenger>>,
    ) -> Result<Publisher> {
        config.validate()?;

        let (full_identity, signing_key) = setup_publisher_identity(
            &config.config_folder,
            &config.domain,
            &config.publisher_id,
        )?;

        let domain_publishers = Arc::new(DomainPublishers::new(&config.domain));
        domain_publishers.update_publisher(full_identity.public.clone());

        let resolver: PublicKeyResolver = {
            let directory = Arc::clone(&domain_publishers);
            Arc::new(move |address: &str| directory.get_publisher_key(address))
        };
        let signer = Arc::new(MessageSigner::new(
            config.signing_method,
            config.require_signed_inbound,
            full_identity.public.address.clone(),
            signing_key,
            resolver,
        ));

        let nodes = Arc::new(RegisteredNodes::new(&config.domain, &config.publisher_id));
        let inputs = Arc::new(RegisteredInputs::new(&config.domain, &config.publisher_id));
        let outputs = Arc::new(RegisteredOutputs::new(&config.domain, &config.publisher_id));
        let output_values = Arc::new(RegisteredOutputValues::new(HistoryRetention::default()));

        let configure_receiver = Arc::new(ConfigureReceiver::new(
            &config.domain,
            &config.publisher_id,
            Arc::clone(&nodes),
            Arc::clone(&signer),
        ));
        let set_input_receiver = Arc::new(SetInputReceiver::new(
            &config.domain,
            &config.publisher_id,
            Arc::clone(&inputs),
            Arc::clone(&signer),
        ));
        let alias_receiver = Arc::new(AliasReceiver::new(
            &config.domain,
            &config.publisher_id,
            Arc::clone(&nodes),
            Arc::clone(&inputs),
            Arc::clone(&outputs),
            Arc::clone(&signer),
        ));
        let discovery_receiver = Arc::new(PublisherDiscoveryReceiver::new(
            &config.domain,
            &config.publisher_id,
            Arc::clone(&domain_publishers),
            config.require_signed_inbound,
            config
                .save_discovered_publishers
                .then(|| config.cache_folder.clone()),
        ));

        let countdowns = Countdowns {
            discovery_interval: config.discovery_interval,
            poll_interval: config.poll_interval,
            discover_countdown: 0,
            // run discovery before the first poll
            poll_countdown: 1,
        };

        Ok(Publisher {
            inner: Arc::new(PublisherInner {
                config,
                full_identity,
                nodes,
                inputs,
                outputs,
                output_values,
                domain_publishers,
                signer,
                messenger: RwLock::new(messenger),
                configure_receiver,
                set_input_receiver,
                alias_receiver,
                discovery_receiver,
                discovery_handler: RwLock::new(None),
                poll_handler: RwLock::new(None),
                countdowns: Mutex::new(countdowns),
                running: Mutex::new(false),
                stop_tx: Mutex::new(None),
                heartbeat: Mutex::new(None),
            }),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// This publisher's identity address
    pub fn address(&self) -> &str {
        &self.inner.full_identity.public.address
    }

    /// The publication domain
    pub fn domain(&self) -> &str {
        &self.inner.config.domain
    }

    /// This publisher's ID
    pub fn publisher_id(&self) -> &str {
        &self.inner.config.publisher_id
    }

    /// This publisher's full identity
    pub fn identity(&self) -> &PublisherFullIdentity {
        &self.inner.full_identity
    }

    /// The active configuration
    pub fn config(&self) -> &PublisherConfig {
        &self.inner.config
    }

    /// Registry of this publisher's nodes
    pub fn nodes(&self) -> &Arc<RegisteredNodes> {
        &self.inner.nodes
    }

    /// Registry of this publisher's inputs
    pub fn inputs(&self) -> &Arc<RegisteredInputs> {
        &self.inner.inputs
    }

    /// Registry of this publisher's outputs
    pub fn outputs(&self) -> &Arc<RegisteredOutputs> {
        &self.inner.outputs
    }

    /// Value histories of this publisher's outputs
    pub fn output_values(&self) -> &Arc<RegisteredOutputValues> {
        &self.inner.output_values
    }

    /// The trust directory of discovered domain publishers
    pub fn domain_publishers(&self) -> &Arc<DomainPublishers> {
        &self.inner.domain_publishers
    }

    /// The message signer used for publications
    pub fn signer(&self) -> &Arc<MessageSigner> {
        &self.inner.signer
    }

    /// Whether the publisher is started
    pub fn is_running(&self) -> bool {
        *self.inner.running.lock()
    }

    pub(crate) fn messenger(&self) -> Option<Arc<dyn Messenger>> {
        self.inner.messenger.read().clone()
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    /// Attach the message bus transport. Use before `start`.
    pub fn set_messenger(&self, messenger: Arc<dyn Messenger>) {
        *self.inner.messenger.write() = Some(messenger);
    }

    /// Register a periodic discovery callback
    ///
    /// `interval` seconds between invocations; `0` keeps the configured
    /// interval. The handler also runs on the first heartbeat tick.
    pub fn set_discovery_interval(&self, interval: u64, handler: PublisherHandler) {
        if interval > 0 {
            self.inner.countdowns.lock().discovery_interval = interval;
        }
        *self.inner.discovery_handler.write() = Some(handler);
    }

    /// Register a periodic poll callback
    ///
    /// `interval` seconds between invocations; `0` keeps the configured
    /// interval.
    pub fn set_poll_interval(&self, interval: u64, handler: PublisherHandler) {
        if interval > 0 {
            self.inner.countdowns.lock().poll_interval = interval;
        }
        *self.inner.poll_handler.write() = Some(handler);
    }

    /// Register the filter invoked before configuration commands are applied
    pub fn set_node_config_handler(&self, handler: NodeConfigHandler) {
        self.inner.configure_receiver.set_handler(handler);
    }

    /// Register the handler invoked for accepted set-input commands
    pub fn set_node_input_handler(&self, handler: NodeInputHandler) {
        self.inner.set_input_receiver.set_handler(handler);
    }

    /// Set or clear a node alias across all registries
    pub fn set_node_alias(&self, hw_id: &str, alias: &str) {
        self.inner.alias_receiver.apply_alias(hw_id, alias);
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Load cached nodes and domain publishers
    ///
    /// Load failures are logged; the publisher starts with whatever could
    /// be read.
    pub fn load_from_cache(&self) {
        let folder = &self.inner.config.cache_folder;
        if self.inner.config.save_discovered_nodes {
            match cache::load_nodes(folder, self.publisher_id()) {
                Ok(nodes) => self.inner.nodes.update_nodes(nodes),
                Err(err) => tracing::debug!("no node cache loaded: {}", err),
            }
        }
        if self.inner.config.save_discovered_publishers {
            match cache::load_publishers(folder) {
                Ok(publishers) => self.inner.domain_publishers.update_publishers(publishers),
                Err(err) => tracing::debug!("no publisher cache loaded: {}", err),
            }
        }
    }

    /// Save this publisher's registered nodes to the cache
    pub fn save_registered_nodes(&self) {
        let folder = &self.inner.config.cache_folder;
        let nodes = self.inner.nodes.get_all_nodes();
        if let Err(err) = cache::save_nodes(folder, self.publisher_id(), &nodes) {
            tracing::error!("failed to save registered nodes: {}", err);
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start publishing and listening for commands
    ///
    /// Connects the transport, subscribes the receivers, publishes the
    /// identity and the current discovery state and launches the
    /// heartbeat.
    ///
    /// # Errors
    ///
    /// `ConfigError::NoMessenger` when no messenger is attached; transport
    /// errors from connect or subscribe.
    pub async fn start(&self) -> Result<()> {
        let Some(messenger) = self.messenger() else {
            tracing::error!(
                "cannot start publisher {} without a messenger",
                self.address()
            );
            return Err(ConfigError::NoMessenger {
                publisher_id: self.publisher_id().to_string(),
            }
            .into());
        };
        {
            let mut running = self.inner.running.lock();
            if *running {
                return Ok(());
            }
            *running = true;
        }
        tracing::info!("starting publisher {}", self.address());

        self.load_from_cache();
        let wired = (|| {
            messenger.connect(None, None)?;
            Arc::clone(&self.inner.configure_receiver).start(&messenger)?;
            Arc::clone(&self.inner.set_input_receiver).start(&messenger)?;
            Arc::clone(&self.inner.alias_receiver).start(&messenger)?;
            Arc::clone(&self.inner.discovery_receiver).start(&messenger)
        })();
        if let Err(err) = wired {
            *self.inner.running.lock() = false;
            return Err(err);
        }

        self.publish_identity();
        self.publish_full_discovery();

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.inner.stop_tx.lock() = Some(stop_tx);
        let publisher = self.clone();
        let handle = tokio::spawn(async move { publisher.heartbeat_loop(stop_rx).await });
        *self.inner.heartbeat.lock() = Some(handle);

        Ok(())
    }

    /// Stop publishing and wait for the heartbeat to finish
    pub async fn stop(&self) {
        {
            let mut running = self.inner.running.lock();
            if !*running {
                return;
            }
            *running = false;
        }
        tracing::info!("stopping publisher {}", self.address());

        if let Some(stop_tx) = self.inner.stop_tx.lock().take() {
            let _ = stop_tx.send(true);
        }
        let heartbeat = self.inner.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            let _ = heartbeat.await;
        }

        if let Some(messenger) = self.messenger() {
            self.inner.configure_receiver.stop(messenger.as_ref());
            self.inner.set_input_receiver.stop(messenger.as_ref());
            self.inner.alias_receiver.stop(messenger.as_ref());
            self.inner.discovery_receiver.stop(messenger.as_ref());
            messenger.disconnect();
        }
    }

    /// The heartbeat: publish pending updates and run the countdowns
    async fn heartbeat_loop(&self, mut stop_rx: watch::Receiver<bool>) {
        tracing::debug!("heartbeat started for {}", self.address());
        let mut ticker = tokio::time::interval(self.inner.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => break,
            }

            self.publish_updates();

            let (run_discovery, run_poll) = {
                let mut countdowns = self.inner.countdowns.lock();
                let run_discovery = countdowns.discover_countdown <= 0;
                if run_discovery {
                    countdowns.discover_countdown = countdowns.discovery_interval as i64;
                }
                countdowns.discover_countdown -= 1;

                let run_poll = countdowns.poll_countdown <= 0;
                if run_poll {
                    countdowns.poll_countdown = countdowns.poll_interval as i64;
                }
                countdowns.poll_countdown -= 1;

                (run_discovery, run_poll)
            };

            // handlers run on their own task so they cannot stall the tick
            if run_discovery {
                if let Some(handler) = self.inner.discovery_handler.read().clone() {
                    let publisher = self.clone();
                    tokio::spawn(async move { handler(&publisher) });
                }
            }
            if run_poll {
                if let Some(handler) = self.inner.poll_handler.read().clone() {
                    let publisher = self.clone();
                    tokio::spawn(async move { handler(&publisher) });
                }
            }

            if !*self.inner.running.lock() {
                break;
            }
        }
        tracing::debug!("heartbeat stopped for {}", self.address());
    }
}
