//! Routes inbound messages to chains and correlates requests with their
//! resolutions.
//!
//! Every registered request is resolved exactly once: by the matching
//! response, by a failure, or by its timeout. All three race through the
//! pending-request table, and whichever takes the entry out first wins.

use {
    crate::{
        benchlist::{Benchable, BenchlistManager},
        config::RouterConfig,
        error::{ConsensusNetError, Result},
        handler::Handler,
        message::{InboundMessage, Message, Op},
        metrics,
        timeout::TimeoutManager,
    },
    log::{debug, error, info, trace, warn},
    parking_lot::{Mutex, RwLock},
    quorum_monitoring::MetricsSink,
    quorum_types::{ChainId, Clock, Id, NodeId, SubnetId},
    std::{
        collections::HashMap,
        fmt,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Weak,
        },
        time::Instant,
    },
};

/// Called when a critical chain goes away; expected to stop the node.
pub type OnFatal = Box<dyn Fn() + Send + Sync>;

struct Chain {
    handler: Arc<Handler>,
    subnet_id: SubnetId,
    critical: bool,
}

#[derive(Debug, Clone, Copy)]
struct Request {
    node_id: NodeId,
    chain_id: ChainId,
    request_id: u32,
    op: Op,
    sent_at: Instant,
}

impl Request {
    fn resolved_by(&self, op: Op) -> bool {
        self.op.is_answered_by(op) || self.op.is_failed_by(op)
    }

    fn failure(&self) -> Option<InboundMessage> {
        let message = Message::failure(self.op.failure_op()?)?;
        Some(InboundMessage::new(
            self.node_id,
            self.chain_id,
            self.request_id,
            message,
        ))
    }
}

fn request_key(node_id: &NodeId, chain_id: &ChainId, request_id: u32) -> Id {
    Id::hashv(&[
        node_id.as_ref(),
        chain_id.as_ref(),
        &request_id.to_be_bytes(),
    ])
}

pub struct ChainRouter {
    node_id: NodeId,
    config: RouterConfig,
    timeouts: TimeoutManager,
    benchlist: Arc<BenchlistManager>,
    clock: Clock,
    metrics: Arc<dyn MetricsSink>,
    on_fatal: OnFatal,
    shutting_down: AtomicBool,
    chains: RwLock<HashMap<ChainId, Chain>>,
    pending: Mutex<HashMap<Id, Request>>,
    me: Weak<Self>,
}

impl ChainRouter {
    pub fn new(
        node_id: NodeId,
        config: RouterConfig,
        benchlist: Arc<BenchlistManager>,
        clock: Clock,
        metrics: Arc<dyn MetricsSink>,
        on_fatal: OnFatal,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let timeouts = TimeoutManager::new(config.timeouts.clone())?;
        Ok(Arc::new_cyclic(|me| Self {
            node_id,
            config,
            timeouts,
            benchlist,
            clock,
            metrics,
            on_fatal,
            shutting_down: AtomicBool::new(false),
            chains: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            me: me.clone(),
        }))
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Start routing to `chain_id`. Adding a known chain is a no-op.
    pub fn add_chain(
        &self,
        chain_id: ChainId,
        subnet_id: SubnetId,
        handler: Arc<Handler>,
        critical: bool,
    ) -> Result<()> {
        // Held until the chain is inserted so only one handler ever starts.
        let mut chains = self.chains.write();
        if chains.contains_key(&chain_id) {
            debug!("chain {} already routed", chain_id);
            return Ok(());
        }
        let benchable: Arc<dyn Benchable> = Arc::new(self.me.clone());
        self.benchlist
            .register_chain(chain_id, subnet_id, benchable)?;
        if let Err(err) = handler.start() {
            self.benchlist.remove_chain(&chain_id);
            return Err(err);
        }
        info!("routing chain {} on subnet {}", chain_id, subnet_id);
        chains.insert(
            chain_id,
            Chain {
                handler,
                subnet_id,
                critical,
            },
        );
        Ok(())
    }

    /// Shut `chain_id` down and stop routing to it. Waits for the chain to
    /// close for at most the configured shutdown timeout.
    pub fn remove_chain(&self, chain_id: &ChainId) {
        let Some(chain) = self.chains.write().remove(chain_id) else {
            debug!("remove_chain: chain {} is not routed", chain_id);
            return;
        };
        chain.handler.start_shutdown();
        self.finish_removal(chain_id, chain);
    }

    /// Remove every chain, shutting them down in parallel. Critical chains
    /// closed here do not trigger the fatal callback.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let chains: Vec<(ChainId, Chain)> = self.chains.write().drain().collect();
        info!("router shutting down {} chains", chains.len());
        for (_, chain) in &chains {
            chain.handler.start_shutdown();
        }
        for (chain_id, chain) in chains {
            self.finish_removal(&chain_id, chain);
        }
        self.timeouts.stop();
    }

    fn finish_removal(&self, chain_id: &ChainId, chain: Chain) {
        if !chain.handler.wait_closed(self.config.shutdown_timeout) {
            warn!(
                "chain {} did not close within {:?}, moving on",
                chain_id, self.config.shutdown_timeout
            );
        }
        self.benchlist.remove_chain(chain_id);
        let dropped: Vec<Id> = {
            let mut pending = self.pending.lock();
            let keys: Vec<Id> = pending
                .iter()
                .filter(|(_, request)| request.chain_id == *chain_id)
                .map(|(key, _)| *key)
                .collect();
            for key in &keys {
                pending.remove(key);
            }
            keys
        };
        for key in &dropped {
            self.timeouts.remove(key);
        }
        self.report_pending();
        info!(
            "removed chain {} on subnet {} ({} requests dropped)",
            chain_id,
            chain.subnet_id,
            dropped.len()
        );
        if chain.critical && !self.shutting_down.load(Ordering::SeqCst) {
            error!("critical chain {} stopped, shutting the node down", chain_id);
            (self.on_fatal)();
        }
    }

    /// Record an outgoing request so its response can be matched.
    ///
    /// Returns `Ok(false)` when `node_id` is benched on the chain: the
    /// failure has already been delivered and the request must not be sent.
    pub fn register_request(
        &self,
        node_id: NodeId,
        chain_id: ChainId,
        request_id: u32,
        op: Op,
    ) -> Result<bool> {
        if op.failure_op().is_none() {
            return Err(ConsensusNetError::NotARequest(op));
        }
        let handler = self
            .handler(&chain_id)
            .ok_or(ConsensusNetError::UnknownChain(chain_id))?;
        let request = Request {
            node_id,
            chain_id,
            request_id,
            op,
            sent_at: self.clock.now(),
        };
        if self.benchlist.is_benched(&node_id, &chain_id) {
            debug!(
                "{} is benched on chain {}, failing {} {} immediately",
                node_id, chain_id, op, request_id
            );
            self.deliver_failure(&handler, &request);
            return Ok(false);
        }

        let key = request_key(&node_id, &chain_id, request_id);
        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&key) {
                return Err(ConsensusNetError::DuplicateRequest {
                    node_id,
                    request_id,
                });
            }
            pending.insert(key, request);
        }
        let me = self.me.clone();
        self.timeouts.register(
            key,
            Box::new(move || {
                if let Some(router) = me.upgrade() {
                    router.timed_out(&key);
                }
            }),
        );
        self.report_pending();
        Ok(true)
    }

    /// Resolve a request that could not be sent.
    pub fn fail_request(&self, node_id: NodeId, chain_id: ChainId, request_id: u32) {
        let key = request_key(&node_id, &chain_id, request_id);
        let Some(request) = self.take_pending(&key, |_| true) else {
            trace!("fail_request: {} {} not pending", node_id, request_id);
            return;
        };
        self.timeouts.remove(&key);
        self.report_pending();
        self.benchlist.register_failure(&chain_id, &node_id);
        if let Some(handler) = self.handler(&chain_id) {
            self.deliver_failure(&handler, &request);
        }
    }

    /// Deliver the failure of a request that was never registered, leaving
    /// any pending request under the same id untouched. Nothing is delivered
    /// if the chain is not routed.
    pub fn reject_request(&self, node_id: NodeId, chain_id: ChainId, request_id: u32, op: Op) {
        let Some(handler) = self.handler(&chain_id) else {
            debug!(
                "reject_request: chain {} is not routed, {} {} dropped",
                chain_id, op, request_id
            );
            return;
        };
        let request = Request {
            node_id,
            chain_id,
            request_id,
            op,
            sent_at: self.clock.now(),
        };
        self.deliver_failure(&handler, &request);
    }

    /// Route one message from the network.
    pub fn handle_inbound(&self, msg: InboundMessage) {
        let op = msg.op();
        let Some(handler) = self.handler(&msg.chain_id) else {
            debug!("dropping {} from {} for unknown chain {}", op, msg.node_id, msg.chain_id);
            return;
        };
        if !(op.is_response() || op.is_failure()) {
            if !handler.push(msg) {
                debug!("chain {} is closed, dropped {}", handler.chain_id(), op);
            }
            return;
        }

        let key = request_key(&msg.node_id, &msg.chain_id, msg.request_id);
        let Some(request) = self.take_pending(&key, |request| request.resolved_by(op)) else {
            debug!(
                "dropping unsolicited {} {} from {} on chain {}",
                op, msg.request_id, msg.node_id, msg.chain_id
            );
            self.metrics.inc_counter(&metrics::ROUTER_DROPPED_RESPONSES);
            return;
        };
        self.timeouts.remove(&key);
        self.report_pending();

        if op.is_failure() {
            self.benchlist.register_failure(&msg.chain_id, &msg.node_id);
            if !handler.push(msg) {
                debug!("chain {} is closed, dropped {}", request.chain_id, op);
            }
            return;
        }
        if msg.message.has_duplicate_container_ids() {
            debug!(
                "{} {} from {} repeats container ids, treating it as failed",
                op, msg.request_id, msg.node_id
            );
            self.benchlist.register_failure(&msg.chain_id, &msg.node_id);
            self.deliver_failure(&handler, &request);
            return;
        }
        let latency = self.clock.now().saturating_duration_since(request.sent_at);
        self.timeouts.observe_latency(latency);
        self.benchlist.register_response(&msg.chain_id, &msg.node_id);
        if !handler.push(msg) {
            self.deliver_failure(&handler, &request);
        }
    }

    /// Tell every chain that `node_id` connected.
    pub fn connected(&self, node_id: NodeId) {
        self.broadcast(node_id, Message::Connected);
    }

    pub fn disconnected(&self, node_id: NodeId) {
        self.broadcast(node_id, Message::Disconnected);
    }

    /// Requests awaiting resolution.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn chains(&self) -> Vec<ChainId> {
        self.chains.read().keys().copied().collect()
    }

    pub fn handler(&self, chain_id: &ChainId) -> Option<Arc<Handler>> {
        self.chains
            .read()
            .get(chain_id)
            .map(|chain| chain.handler.clone())
    }

    fn broadcast(&self, node_id: NodeId, message: Message) {
        let handlers: Vec<Arc<Handler>> = self
            .chains
            .read()
            .values()
            .map(|chain| chain.handler.clone())
            .collect();
        for handler in handlers {
            handler.push(InboundMessage::new(
                node_id,
                handler.chain_id(),
                0,
                message.clone(),
            ));
        }
    }

    fn timed_out(&self, key: &Id) {
        let Some(request) = self.take_pending(key, |_| true) else {
            return;
        };
        self.report_pending();
        debug!(
            "{} {} to {} on chain {} timed out",
            request.op, request.request_id, request.node_id, request.chain_id
        );
        self.benchlist
            .register_failure(&request.chain_id, &request.node_id);
        if let Some(handler) = self.handler(&request.chain_id) {
            self.deliver_failure(&handler, &request);
        }
    }

    /// Take the entry under `key` out of the table if `matches` accepts it.
    fn take_pending(&self, key: &Id, matches: impl Fn(&Request) -> bool) -> Option<Request> {
        let mut pending = self.pending.lock();
        if !pending.get(key).is_some_and(matches) {
            return None;
        }
        pending.remove(key)
    }

    fn deliver_failure(&self, handler: &Handler, request: &Request) {
        let Some(failure) = request.failure() else {
            return;
        };
        if !handler.push(failure) {
            debug!(
                "chain {} is closed, {} {} resolves without delivery",
                request.chain_id, request.op, request.request_id
            );
        }
    }

    fn report_pending(&self) {
        self.metrics.set_gauge(
            &metrics::ROUTER_PENDING_REQUESTS,
            self.pending_requests() as i64,
        );
    }
}

impl Benchable for ChainRouter {
    fn benched(&self, chain_id: ChainId, node_id: NodeId) {
        info!("{} benched on chain {}", node_id, chain_id);
    }

    fn unbenched(&self, chain_id: ChainId, node_id: NodeId) {
        info!("{} unbenched on chain {}", node_id, chain_id);
    }
}

impl fmt::Debug for ChainRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainRouter")
            .field("node_id", &self.node_id)
            .field("chains", &self.chains.read().len())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            config::{BenchlistConfig, TimeoutConfig},
            engine::{Bootstrapper, Engine, EngineResult},
            handler::HandlerState,
        },
        assert_matches::assert_matches,
        crossbeam_channel::{unbounded, Receiver, Sender},
        quorum_monitoring::{MetricsRegistry, NoopMetrics},
        quorum_types::PRIMARY_NETWORK_ID,
        quorum_validators::ValidatorManager,
        std::{
            sync::Barrier,
            thread,
            time::Duration,
        },
    };

    /// Bootstraps immediately and forwards every call as `(op, node, request_id)`.
    struct ChannelEngine {
        sender: Sender<(Op, NodeId, u32)>,
    }

    impl ChannelEngine {
        fn record(&self, op: Op, node_id: NodeId, request_id: u32) -> EngineResult {
            let _ = self.sender.send((op, node_id, request_id));
            Ok(())
        }
    }

    impl Engine for ChannelEngine {
        fn put(&self, node_id: NodeId, request_id: u32, _: Vec<u8>) -> EngineResult {
            self.record(Op::Put, node_id, request_id)
        }

        fn get_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
            self.record(Op::GetFailed, node_id, request_id)
        }

        fn chits(&self, node_id: NodeId, request_id: u32, _: Vec<Id>) -> EngineResult {
            self.record(Op::Chits, node_id, request_id)
        }

        fn query_failed(&self, node_id: NodeId, request_id: u32) -> EngineResult {
            self.record(Op::QueryFailed, node_id, request_id)
        }

        fn connected(&self, node_id: NodeId) -> EngineResult {
            self.record(Op::Connected, node_id, 0)
        }
    }

    impl Bootstrapper for ChannelEngine {
        fn is_bootstrapped(&self) -> bool {
            true
        }
    }

    struct Fixture {
        router: Arc<ChainRouter>,
        validators: Arc<ValidatorManager>,
        clock: Clock,
        chain: ChainId,
        peer: NodeId,
        calls: Receiver<(Op, NodeId, u32)>,
        fatal: Arc<AtomicBool>,
        registry: Arc<MetricsRegistry>,
    }

    fn fixture(timeouts: TimeoutConfig) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let clock = Clock::mock(Instant::now());
        let validators = Arc::new(ValidatorManager::new());
        let peer = NodeId::new_unique();
        validators.add_staker(PRIMARY_NETWORK_ID, peer, 10).unwrap();
        for _ in 0..3 {
            validators
                .add_staker(PRIMARY_NETWORK_ID, NodeId::new_unique(), 10)
                .unwrap();
        }
        let registry = Arc::new(MetricsRegistry::new());
        let benchlist = Arc::new(
            BenchlistManager::new(
                BenchlistConfig {
                    threshold: 2,
                    minimum_failing_duration: Duration::ZERO,
                    duration: Duration::from_secs(60),
                    max_portion: 0.5,
                },
                validators.clone(),
                clock.clone(),
                registry.clone(),
            )
            .unwrap(),
        );
        let fatal = Arc::new(AtomicBool::new(false));
        let router = {
            let fatal = fatal.clone();
            ChainRouter::new(
                NodeId::new_unique(),
                RouterConfig {
                    shutdown_timeout: Duration::from_secs(2),
                    timeouts,
                },
                benchlist,
                clock.clone(),
                registry.clone(),
                Box::new(move || fatal.store(true, Ordering::SeqCst)),
            )
            .unwrap()
        };
        let (sender, calls) = unbounded();
        let chain = Id::new_unique();
        let engine = Arc::new(ChannelEngine { sender });
        let handler = Arc::new(Handler::new(
            chain,
            engine.clone(),
            engine,
            clock.clone(),
            NoopMetrics::shared(),
        ));
        router
            .add_chain(chain, PRIMARY_NETWORK_ID, handler, true)
            .unwrap();
        Fixture {
            router,
            validators,
            clock,
            chain,
            peer,
            calls,
            fatal,
            registry,
        }
    }

    fn long_timeouts() -> TimeoutConfig {
        TimeoutConfig {
            initial_timeout: Duration::from_secs(30),
            minimum_timeout: Duration::from_secs(1),
            maximum_timeout: Duration::from_secs(60),
            timeout_coefficient: 2.0,
            latency_alpha: 0.3,
        }
    }

    fn short_timeouts() -> TimeoutConfig {
        TimeoutConfig {
            initial_timeout: Duration::from_millis(20),
            minimum_timeout: Duration::from_millis(10),
            maximum_timeout: Duration::from_millis(50),
            timeout_coefficient: 2.0,
            latency_alpha: 0.3,
        }
    }

    fn recv(fixture: &Fixture) -> (Op, NodeId, u32) {
        fixture
            .calls
            .recv_timeout(Duration::from_secs(5))
            .expect("engine call")
    }

    fn assert_quiet(fixture: &Fixture) {
        assert!(fixture
            .calls
            .recv_timeout(Duration::from_millis(50))
            .is_err());
    }

    fn put(fixture: &Fixture, request_id: u32) -> InboundMessage {
        InboundMessage::new(
            fixture.peer,
            fixture.chain,
            request_id,
            Message::Put { container: vec![1] },
        )
    }

    #[test]
    fn test_response_resolves_request_once() {
        let fixture = fixture(long_timeouts());
        assert!(fixture
            .router
            .register_request(fixture.peer, fixture.chain, 7, Op::Get)
            .unwrap());
        assert_eq!(fixture.router.pending_requests(), 1);
        assert_eq!(fixture.registry.gauge("router_pending_requests"), 1);

        fixture.clock.advance(Duration::from_secs(2));
        fixture.router.handle_inbound(put(&fixture, 7));
        assert_eq!(recv(&fixture), (Op::Put, fixture.peer, 7));
        assert_eq!(fixture.router.pending_requests(), 0);
        // The first latency sample, doubled.
        assert_eq!(
            fixture.router.timeouts.current_timeout(),
            Duration::from_secs(4)
        );

        // A second delivery of the same response is dropped.
        fixture.router.handle_inbound(put(&fixture, 7));
        assert_quiet(&fixture);
        assert_eq!(fixture.registry.counter("router_dropped_responses"), 1);
    }

    #[test]
    fn test_unsolicited_response_is_dropped() {
        let fixture = fixture(long_timeouts());
        fixture.router.handle_inbound(put(&fixture, 3));
        assert_quiet(&fixture);
        assert_eq!(fixture.registry.counter("router_dropped_responses"), 1);
    }

    #[test]
    fn test_mismatched_response_keeps_request_pending() {
        let fixture = fixture(long_timeouts());
        fixture
            .router
            .register_request(fixture.peer, fixture.chain, 1, Op::PullQuery)
            .unwrap();
        fixture.router.handle_inbound(put(&fixture, 1));
        assert_quiet(&fixture);
        assert_eq!(fixture.router.pending_requests(), 1);

        fixture.router.handle_inbound(InboundMessage::new(
            fixture.peer,
            fixture.chain,
            1,
            Message::Chits {
                container_ids: vec![Id::new_unique()],
            },
        ));
        assert_eq!(recv(&fixture), (Op::Chits, fixture.peer, 1));
    }

    #[test]
    fn test_timeout_synthesizes_failure() {
        let fixture = fixture(short_timeouts());
        fixture
            .router
            .register_request(fixture.peer, fixture.chain, 9, Op::Get)
            .unwrap();
        assert_eq!(recv(&fixture), (Op::GetFailed, fixture.peer, 9));
        assert_eq!(fixture.router.pending_requests(), 0);

        // The response lost the race.
        fixture.router.handle_inbound(put(&fixture, 9));
        assert_quiet(&fixture);
    }

    #[test]
    fn test_duplicate_container_ids_become_failure() {
        let fixture = fixture(long_timeouts());
        fixture
            .router
            .register_request(fixture.peer, fixture.chain, 2, Op::PushQuery)
            .unwrap();
        let id = Id::new_unique();
        fixture.router.handle_inbound(InboundMessage::new(
            fixture.peer,
            fixture.chain,
            2,
            Message::Chits {
                container_ids: vec![id, id],
            },
        ));
        assert_eq!(recv(&fixture), (Op::QueryFailed, fixture.peer, 2));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let fixture = fixture(long_timeouts());
        fixture
            .router
            .register_request(fixture.peer, fixture.chain, 4, Op::Get)
            .unwrap();
        assert_matches!(
            fixture
                .router
                .register_request(fixture.peer, fixture.chain, 4, Op::Get),
            Err(ConsensusNetError::DuplicateRequest { request_id: 4, .. })
        );
        assert_matches!(
            fixture
                .router
                .register_request(fixture.peer, fixture.chain, 5, Op::Put),
            Err(ConsensusNetError::NotARequest(Op::Put))
        );
        let unknown = Id::new_unique();
        assert_matches!(
            fixture.router.register_request(fixture.peer, unknown, 5, Op::Get),
            Err(ConsensusNetError::UnknownChain(chain)) if chain == unknown
        );
    }

    #[test]
    fn test_benched_node_fails_fast() {
        let fixture = fixture(long_timeouts());
        for request_id in 0..2 {
            fixture
                .router
                .register_request(fixture.peer, fixture.chain, request_id, Op::Get)
                .unwrap();
            fixture.router.fail_request(fixture.peer, fixture.chain, request_id);
            assert_eq!(recv(&fixture), (Op::GetFailed, fixture.peer, request_id));
        }

        assert!(!fixture
            .router
            .register_request(fixture.peer, fixture.chain, 10, Op::Get)
            .unwrap());
        assert_eq!(recv(&fixture), (Op::GetFailed, fixture.peer, 10));
        assert_eq!(fixture.router.pending_requests(), 0);
    }

    #[test]
    fn test_connected_fans_out() {
        let fixture = fixture(long_timeouts());
        let node = NodeId::new_unique();
        fixture.router.connected(node);
        assert_eq!(recv(&fixture), (Op::Connected, node, 0));
    }

    #[test]
    fn test_unknown_chain_is_ignored() {
        let fixture = fixture(long_timeouts());
        fixture.router.handle_inbound(InboundMessage::new(
            fixture.peer,
            Id::new_unique(),
            0,
            Message::Put { container: vec![] },
        ));
        fixture.router.remove_chain(&Id::new_unique());
        assert_quiet(&fixture);
        assert!(!fixture.fatal.load(Ordering::SeqCst));
    }

    #[test]
    fn test_removing_critical_chain_is_fatal() {
        let fixture = fixture(long_timeouts());
        fixture
            .router
            .register_request(fixture.peer, fixture.chain, 1, Op::Get)
            .unwrap();
        let handler = fixture.router.handler(&fixture.chain).unwrap();
        fixture.router.remove_chain(&fixture.chain);

        assert_eq!(handler.state(), HandlerState::Closed);
        assert_eq!(fixture.router.pending_requests(), 0);
        assert!(fixture.router.chains().is_empty());
        assert!(fixture.fatal.load(Ordering::SeqCst));

        // Removing it again changes nothing.
        fixture.router.remove_chain(&fixture.chain);
    }

    #[test]
    fn test_shutdown_closes_every_chain() {
        let fixture = fixture(long_timeouts());
        let handler = fixture.router.handler(&fixture.chain).unwrap();
        fixture.router.shutdown();
        assert_eq!(handler.state(), HandlerState::Closed);
        assert!(fixture.router.chains().is_empty());
        // An orderly shutdown is not a critical failure.
        assert!(!fixture.fatal.load(Ordering::SeqCst));
        // A validator event after shutdown reaches no benchlist.
        fixture
            .validators
            .add_staker(PRIMARY_NETWORK_ID, NodeId::new_unique(), 5)
            .unwrap();
    }

    #[test]
    fn test_concurrent_add_starts_one_handler() {
        let fixture = fixture(long_timeouts());
        let chain = Id::new_unique();
        let (sender, _calls) = unbounded();
        let engine = Arc::new(ChannelEngine { sender });
        let handlers: Vec<Arc<Handler>> = (0..8)
            .map(|_| {
                Arc::new(Handler::new(
                    chain,
                    engine.clone(),
                    engine.clone(),
                    fixture.clock.clone(),
                    NoopMetrics::shared(),
                ))
            })
            .collect();
        let barrier = Barrier::new(handlers.len());
        thread::scope(|scope| {
            for handler in &handlers {
                let (router, barrier) = (&fixture.router, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    router
                        .add_chain(chain, PRIMARY_NETWORK_ID, handler.clone(), false)
                        .unwrap();
                });
            }
        });

        let routed = fixture.router.handler(&chain).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while routed.state() != HandlerState::NormalOp && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));
        let running: Vec<&Arc<Handler>> = handlers
            .iter()
            .filter(|handler| handler.state() == HandlerState::NormalOp)
            .collect();
        assert_eq!(running.len(), 1);
        assert!(Arc::ptr_eq(running[0], &routed));
    }
}
