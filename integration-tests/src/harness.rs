//! A simulated network of quorum nodes.
//!
//! Every node runs one chain with its own router, handler and sender, plus a
//! push and a pull gossiper over a [`TestSet`]. Messages between nodes travel
//! through a shared [`LocalNetwork`], which can take nodes offline.
//!
//! The chain engine on every node ([`NodeEngine`]) answers `Get` with `Put`
//! and `PullQuery`/`PushQuery` with `Chits`, serves gossip app messages, and
//! reports every response and failure it sees as an [`Event`].

use {
    crossbeam_channel::{unbounded, Receiver},
    log::debug,
    parking_lot::{Mutex, RwLock},
    quorum_consensus_net::{
        AppSender, Bootstrapper, BenchlistConfig, BenchlistManager, ChainRouter, ConsensusNetError, Engine,
        EngineError, EngineResult, ExternalSender, Handler, InboundMessage, Op, OutboundMessage,
        RouterConfig, Sender,
    },
    quorum_gossip::{
        testing::{TestMarshaller, TestSet, TestTx},
        Client, GossipError, HandlerConfig, PullGossiper, PullGossiperConfig, PushGossiper,
        PushGossiperConfig,
    },
    quorum_monitoring::MetricsRegistry,
    quorum_types::{ChainId, Clock, Id, NodeId, SubnetId, PRIMARY_NETWORK_ID},
    quorum_validators::{ValidatorError, ValidatorManager},
    rand::seq::IndexedRandom,
    std::{
        collections::{HashMap, HashSet},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::{Duration, Instant},
    },
    thiserror::Error,
};

/// The chain every test node runs.
pub const CHAIN_ID: ChainId = Id::new_from_array([7u8; 32]);

pub const SUBNET_ID: SubnetId = PRIMARY_NETWORK_ID;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    ConsensusNet(#[from] ConsensusNetError),

    #[error(transparent)]
    Gossip(#[from] GossipError),

    #[error(transparent)]
    Validators(#[from] ValidatorError),
}

pub type Result<T> = std::result::Result<T, HarnessError>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Benching after two failures, with no minimum failing period.
pub fn fast_benchlist() -> BenchlistConfig {
    BenchlistConfig {
        threshold: 2,
        minimum_failing_duration: Duration::ZERO,
        duration: Duration::from_secs(60),
        max_portion: 0.5,
    }
}

// ── Transport ───────────────────────────────────────────────────────────────

/// Delivers messages straight into the destination node's router.
#[derive(Default)]
pub struct LocalNetwork {
    routers: RwLock<HashMap<NodeId, Arc<ChainRouter>>>,
    offline: RwLock<HashSet<NodeId>>,
    /// Send attempts per destination, whether or not they were delivered.
    attempts: Mutex<HashMap<NodeId, usize>>,
}

impl LocalNetwork {
    pub fn register(&self, node_id: NodeId, router: Arc<ChainRouter>) {
        self.routers.write().insert(node_id, router);
    }

    pub fn set_online(&self, node_id: NodeId, online: bool) {
        let mut offline = self.offline.write();
        if online {
            offline.remove(&node_id);
        } else {
            offline.insert(node_id);
        }
    }

    pub fn attempts(&self, node_id: &NodeId) -> usize {
        self.attempts.lock().get(node_id).copied().unwrap_or(0)
    }

    fn deliver(&self, from: NodeId, to: NodeId, msg: &OutboundMessage) -> bool {
        *self.attempts.lock().entry(to).or_default() += 1;
        if self.offline.read().contains(&to) {
            return false;
        }
        let Some(router) = self.routers.read().get(&to).cloned() else {
            return false;
        };
        router.handle_inbound(InboundMessage::new(
            from,
            msg.chain_id,
            msg.request_id,
            msg.message.clone(),
        ));
        true
    }

    fn online_peers(&self, node_id: &NodeId) -> Vec<NodeId> {
        let offline = self.offline.read();
        let mut peers: Vec<NodeId> = self
            .routers
            .read()
            .keys()
            .filter(|peer| *peer != node_id && !offline.contains(*peer))
            .copied()
            .collect();
        peers.sort_unstable();
        peers
    }
}

/// One node's view of the [`LocalNetwork`].
pub struct Endpoint {
    node_id: NodeId,
    network: Arc<LocalNetwork>,
}

impl ExternalSender for Endpoint {
    fn send(
        &self,
        msg: &OutboundMessage,
        node_ids: &HashSet<NodeId>,
        _subnet_id: SubnetId,
        _validators_only: bool,
    ) -> HashSet<NodeId> {
        node_ids
            .iter()
            .filter(|to| self.network.deliver(self.node_id, **to, msg))
            .copied()
            .collect()
    }

    fn gossip(
        &self,
        msg: &OutboundMessage,
        _subnet_id: SubnetId,
        _validators_only: bool,
        num_validators: usize,
        num_non_validators: usize,
        num_peers: usize,
    ) -> HashSet<NodeId> {
        let peers = self.network.online_peers(&self.node_id);
        let amount = num_validators + num_non_validators + num_peers;
        peers
            .choose_multiple(&mut rand::rng(), amount)
            .filter(|to| self.network.deliver(self.node_id, **to, msg))
            .copied()
            .collect()
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// A response or failure seen by a node's engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub op: Op,
    pub node_id: NodeId,
    pub request_id: u32,
}

pub struct NodeEngine {
    sender: Arc<Sender>,
    server: quorum_gossip::Handler<TestTx>,
    client: Arc<Client>,
    events: crossbeam_channel::Sender<Event>,
    /// When set, incoming `Get`s go unanswered.
    silent: AtomicBool,
}

impl NodeEngine {
    fn record(&self, op: Op, node_id: NodeId, request_id: u32) -> EngineResult {
        let _ = self.events.send(Event {
            op,
            node_id,
            request_id,
        });
        Ok(())
    }
}

impl Engine for NodeEngine {
    fn get(&self, node_id: NodeId, request_id: u32, container_id: Id) -> EngineResult {
        if self.silent.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.sender
            .send_put(node_id, request_id, container_id.as_ref().to_vec());
        Ok(())
    }

    fn put(&self, node_id: NodeId, request_id: u32, _container: Vec<u8>) -> EngineResult {
        self.record(Op::Put, node_id, request_id)
    }

    fn get_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        self.record(Op::GetFailed, node_id, request_id)
    }

    fn push_query(&self, node_id: NodeId, request_id: u32, _container: Vec<u8>) -> EngineResult {
        self.sender.send_chits(node_id, request_id, vec![]);
        Ok(())
    }

    fn pull_query(&self, node_id: NodeId, request_id: u32, container_id: Id) -> EngineResult {
        self.sender.send_chits(node_id, request_id, vec![container_id]);
        Ok(())
    }

    fn chits(&self, node_id: NodeId, request_id: u32, _container_ids: Vec<Id>) -> EngineResult {
        self.record(Op::Chits, node_id, request_id)
    }

    fn query_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        self.record(Op::QueryFailed, node_id, request_id)
    }

    fn app_request(
        &self,
        node_id: NodeId,
        request_id: u32,
        _deadline: Option<Instant>,
        bytes: Vec<u8>,
    ) -> EngineResult {
        let response = self
            .server
            .app_request(node_id, &bytes)
            .map_err(|err| EngineError::Rejected(err.to_string()))?;
        self.sender.send_app_response(node_id, request_id, response);
        Ok(())
    }

    fn app_response(&self, node_id: NodeId, request_id: u32, bytes: Vec<u8>) -> EngineResult {
        self.client.app_response(node_id, request_id, bytes);
        Ok(())
    }

    fn app_request_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
        self.client.app_request_failed(node_id, request_id);
        Ok(())
    }

    fn app_gossip(&self, node_id: NodeId, bytes: Vec<u8>) -> EngineResult {
        self.server
            .app_gossip(node_id, &bytes)
            .map_err(|err| EngineError::Rejected(err.to_string()))
    }
}

impl Bootstrapper for NodeEngine {
    fn is_bootstrapped(&self) -> bool {
        true
    }
}

// ── Nodes ───────────────────────────────────────────────────────────────────

pub struct TestNode {
    pub node_id: NodeId,
    pub router: Arc<ChainRouter>,
    pub sender: Arc<Sender>,
    pub client: Arc<Client>,
    pub set: Arc<TestSet>,
    pub push: Arc<PushGossiper<TestTx>>,
    pub pull: Arc<PullGossiper<TestTx>>,
    pub metrics: Arc<MetricsRegistry>,
    /// Set once the router reports a fatal chain removal.
    pub fatal: Arc<AtomicBool>,
    engine: Arc<NodeEngine>,
    events: Receiver<Event>,
}

impl TestNode {
    /// Next response or failure seen by this node's engine.
    pub fn next_event(&self, timeout: Duration) -> Option<Event> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Stop answering `Get` requests.
    pub fn set_silent(&self, silent: bool) {
        self.engine.silent.store(silent, Ordering::Relaxed);
    }

    pub fn handler(&self) -> Option<Arc<Handler>> {
        self.router.handler(&CHAIN_ID)
    }
}

pub struct TestNetwork {
    pub network: Arc<LocalNetwork>,
    pub nodes: Vec<TestNode>,
}

impl TestNetwork {
    /// `size` nodes, each a validator of weight 1 in every node's view.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_benchlist(size, BenchlistConfig::default())
    }

    pub fn with_benchlist(size: usize, benchlist: BenchlistConfig) -> Result<Self> {
        let network = Arc::new(LocalNetwork::default());
        let node_ids: Vec<NodeId> = (0..size).map(|_| NodeId::new_unique()).collect();
        let nodes = node_ids
            .iter()
            .map(|node_id| build_node(*node_id, &node_ids, &network, benchlist.clone()))
            .collect::<Result<Vec<_>>>()?;
        debug!("started a network of {} nodes", size);
        Ok(Self { network, nodes })
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub fn shutdown(&self) {
        for node in &self.nodes {
            node.router.shutdown();
        }
    }
}

impl Drop for TestNetwork {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_node(
    node_id: NodeId,
    all: &[NodeId],
    network: &Arc<LocalNetwork>,
    benchlist: BenchlistConfig,
) -> Result<TestNode> {
    let validators = Arc::new(ValidatorManager::new());
    for peer in all {
        validators.add_staker(SUBNET_ID, *peer, 1)?;
    }
    let clock = Clock::system();
    let metrics = Arc::new(MetricsRegistry::new());
    let fatal = Arc::new(AtomicBool::new(false));

    let benchlist = Arc::new(BenchlistManager::new(
        benchlist,
        validators.clone(),
        clock.clone(),
        metrics.clone(),
    )?);
    let on_fatal = {
        let fatal = fatal.clone();
        Box::new(move || fatal.store(true, Ordering::SeqCst))
    };
    let router = ChainRouter::new(
        node_id,
        RouterConfig::dev_default(),
        benchlist,
        clock.clone(),
        metrics.clone(),
        on_fatal,
    )?;
    network.register(node_id, router.clone());

    let endpoint = Arc::new(Endpoint {
        node_id,
        network: network.clone(),
    });
    let sender = Arc::new(Sender::new(CHAIN_ID, SUBNET_ID, router.clone(), endpoint));
    let client = Arc::new(Client::new(
        node_id,
        sender.clone(),
        validators.get_or_create_set(SUBNET_ID),
    ));

    let set = Arc::new(TestSet::new());
    let marshaller = Arc::new(TestMarshaller);
    let server = quorum_gossip::Handler::<TestTx>::new(
        HandlerConfig::default(),
        marshaller.clone(),
        set.clone(),
        metrics.clone(),
    )?;
    let push = Arc::new(PushGossiper::<TestTx>::new(
        PushGossiperConfig::dev_default(),
        marshaller.clone(),
        set.clone(),
        sender.clone(),
        clock.clone(),
        metrics.clone(),
    )?);
    let pull = Arc::new(PullGossiper::<TestTx>::new(
        PullGossiperConfig::default(),
        marshaller,
        set.clone(),
        client.clone(),
        metrics.clone(),
    )?);

    let (events_sender, events) = unbounded();
    let engine = Arc::new(NodeEngine {
        sender: sender.clone(),
        server,
        client: client.clone(),
        events: events_sender,
        silent: AtomicBool::new(false),
    });
    let handler = Arc::new(Handler::new(
        CHAIN_ID,
        engine.clone(),
        engine.clone(),
        clock,
        metrics.clone(),
    ));
    router.add_chain(CHAIN_ID, SUBNET_ID, handler, true)?;

    Ok(TestNode {
        node_id,
        router,
        sender,
        client,
        set,
        push,
        pull,
        metrics,
        fatal,
        engine,
        events,
    })
}
