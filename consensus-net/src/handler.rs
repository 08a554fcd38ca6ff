//! Per-chain, single-flight message dispatch.
//!
//! Each chain owns one [`Handler`]: a FIFO queue drained by one worker
//! thread, so the chain's engines never see two calls at once. Where a
//! message goes depends on the handler's [`HandlerState`]: the bootstrapper
//! while bootstrapping, the consensus engine afterwards.
//!
//! ```text
//!   Bootstrapping ──Bootstrapped──▶ NormalOp
//!        │                            │
//!        └────────StartShutdown───────┴──▶ ShuttingDown ──Closed──▶ Closed
//! ```

use {
    crate::{
        engine::{dispatch, Bootstrapper, Engine},
        error::{ConsensusNetError, EngineError, Result},
        message::InboundMessage,
        metrics,
    },
    crossbeam_channel::{bounded, Receiver, Sender},
    log::{debug, error, info, trace, warn},
    parking_lot::{Condvar, Mutex},
    quorum_monitoring::MetricsSink,
    quorum_types::{ChainId, Clock},
    std::{
        collections::VecDeque,
        fmt,
        sync::Arc,
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    },
};

// ── State machine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerState {
    Bootstrapping,
    NormalOp,
    ShuttingDown,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerEvent {
    /// The bootstrapper reported completion.
    Bootstrapped,
    StartShutdown,
    /// The engine's shutdown hook returned and the queue is drained.
    Closed,
}

impl HandlerState {
    /// The state after `event`, or `None` if `event` is not valid here.
    pub fn transition(self, event: HandlerEvent) -> Option<HandlerState> {
        use {HandlerEvent as E, HandlerState as S};
        match (self, event) {
            (S::Bootstrapping, E::Bootstrapped) => Some(S::NormalOp),
            (S::Bootstrapping | S::NormalOp | S::ShuttingDown, E::StartShutdown) => {
                Some(S::ShuttingDown)
            }
            (S::ShuttingDown, E::Closed) => Some(S::Closed),
            _ => None,
        }
    }

    /// Whether new messages are queued in this state.
    pub fn accepts_messages(self) -> bool {
        matches!(self, HandlerState::Bootstrapping | HandlerState::NormalOp)
    }
}

// ── Handler ─────────────────────────────────────────────────────────────────

struct Queue {
    messages: VecDeque<InboundMessage>,
    state: HandlerState,
    /// Set once the consensus engine has been started.
    engine_started: bool,
}

struct Shared {
    chain_id: ChainId,
    queue: Mutex<Queue>,
    /// Signalled on push and on shutdown.
    signal: Condvar,
    bootstrapper: Arc<dyn Bootstrapper>,
    engine: Arc<dyn Engine>,
    clock: Clock,
    metrics: Arc<dyn MetricsSink>,
    closed_sender: Sender<()>,
}

pub struct Handler {
    shared: Arc<Shared>,
    closed_receiver: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Handler {
    pub fn new(
        chain_id: ChainId,
        bootstrapper: Arc<dyn Bootstrapper>,
        engine: Arc<dyn Engine>,
        clock: Clock,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (closed_sender, closed_receiver) = bounded(1);
        Self {
            shared: Arc::new(Shared {
                chain_id,
                queue: Mutex::new(Queue {
                    messages: VecDeque::new(),
                    state: HandlerState::Bootstrapping,
                    engine_started: false,
                }),
                signal: Condvar::new(),
                bootstrapper,
                engine,
                clock,
                metrics,
                closed_sender,
            }),
            closed_receiver,
            worker: Mutex::new(None),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.shared.chain_id
    }

    /// Spawn the worker. It starts the bootstrapper, then drains the queue.
    /// Starting twice is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let shared = self.shared.clone();
        let name = format!("quorumHandler{}", &shared.chain_id.to_string()[..8]);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || shared.run())
            .map_err(|err| ConsensusNetError::thread_spawn(&name, err))?;
        *worker = Some(handle);
        Ok(())
    }

    /// Queue `msg`. Returns false once the chain is shutting down.
    pub fn push(&self, msg: InboundMessage) -> bool {
        let mut queue = self.shared.queue.lock();
        if !queue.state.accepts_messages() {
            trace!(
                "chain {} is {:?}, rejecting {}",
                self.shared.chain_id,
                queue.state,
                msg.op()
            );
            return false;
        }
        queue.messages.push_back(msg);
        drop(queue);
        self.shared.signal.notify_one();
        true
    }

    pub fn state(&self) -> HandlerState {
        self.shared.queue.lock().state
    }

    /// Messages waiting to be processed.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting messages and ask the engines to halt. The worker
    /// finishes its current message, runs the shutdown hook and closes.
    pub fn start_shutdown(&self) {
        self.shared.start_shutdown();
    }

    /// Wait up to `timeout` for the chain to close.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        if self.state() == HandlerState::Closed {
            return true;
        }
        if self.worker.lock().is_none() {
            // Never started: nothing to drain.
            self.shared.close();
            return true;
        }
        self.closed_receiver.recv_timeout(timeout).is_ok() || self.state() == HandlerState::Closed
    }
}

impl Shared {
    fn run(&self) {
        info!("chain {} bootstrapping", self.chain_id);
        let result = self.bootstrapper.start(0);
        self.finish_call(result);
        self.check_bootstrapped();

        while let Some(msg) = self.next() {
            self.process(msg);
        }
        self.close();
    }

    /// Block for the next message; `None` once shutdown has started.
    fn next(&self) -> Option<InboundMessage> {
        let mut queue = self.queue.lock();
        loop {
            if !queue.state.accepts_messages() {
                return None;
            }
            if let Some(msg) = queue.messages.pop_front() {
                return Some(msg);
            }
            self.signal.wait(&mut queue);
        }
    }

    fn process(&self, msg: InboundMessage) {
        let op = msg.op();
        if msg.is_expired(self.clock.now()) {
            debug!(
                "dropping expired {} from {} on chain {}",
                op, msg.node_id, self.chain_id
            );
            self.metrics.inc_counter(&metrics::HANDLER_EXPIRED_MESSAGES);
            return;
        }
        let state = self.queue.lock().state;
        let started = Instant::now();
        let result = match state {
            HandlerState::Bootstrapping => dispatch(self.bootstrapper.as_ref(), msg),
            HandlerState::NormalOp => dispatch(self.engine.as_ref(), msg),
            HandlerState::ShuttingDown | HandlerState::Closed => return,
        };
        self.metrics.observe(
            &metrics::HANDLER_PROCESSING_MS,
            started.elapsed().as_secs_f64() * 1_000.0,
        );
        if let Err(err) = &result {
            debug!("chain {} failed to handle {}: {}", self.chain_id, op, err);
        }
        self.finish_call(result);
        if state == HandlerState::Bootstrapping {
            self.check_bootstrapped();
        }
    }

    fn finish_call(&self, result: std::result::Result<(), EngineError>) {
        match result {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                error!("chain {} engine failed: {}", self.chain_id, err);
                self.start_shutdown();
            }
            Err(_) => self.metrics.inc_counter(&metrics::HANDLER_DROPPED_MESSAGES),
        }
    }

    fn check_bootstrapped(&self) {
        if !self.bootstrapper.is_bootstrapped() {
            return;
        }
        {
            let mut queue = self.queue.lock();
            match queue.state.transition(HandlerEvent::Bootstrapped) {
                Some(next) => queue.state = next,
                None => return,
            }
            queue.engine_started = true;
        }
        info!("chain {} bootstrapped", self.chain_id);
        let result = self.engine.start(0);
        self.finish_call(result);
    }

    fn start_shutdown(&self) {
        let halt = {
            let mut queue = self.queue.lock();
            let first = queue.state.accepts_messages();
            match queue.state.transition(HandlerEvent::StartShutdown) {
                Some(next) => queue.state = next,
                None => return,
            }
            first
        };
        if halt {
            info!("chain {} shutting down", self.chain_id);
            self.bootstrapper.halt();
            self.engine.halt();
        }
        self.signal.notify_all();
    }

    fn close(&self) {
        let (dropped, engine_started) = {
            let mut queue = self.queue.lock();
            if queue.state == HandlerState::Closed {
                return;
            }
            if let Some(next) = queue.state.transition(HandlerEvent::StartShutdown) {
                queue.state = next;
            }
            let dropped = queue.messages.len();
            queue.messages.clear();
            (dropped, queue.engine_started)
        };
        if dropped > 0 {
            debug!(
                "chain {} dropped {} queued messages on shutdown",
                self.chain_id, dropped
            );
            self.metrics
                .add_counter(&metrics::HANDLER_DROPPED_MESSAGES, dropped as u64);
        }
        let result = if engine_started {
            self.engine.shutdown()
        } else {
            self.bootstrapper.shutdown()
        };
        if let Err(err) = result {
            warn!("chain {} shutdown hook failed: {}", self.chain_id, err);
        }
        {
            let mut queue = self.queue.lock();
            if let Some(next) = queue.state.transition(HandlerEvent::Closed) {
                queue.state = next;
            }
        }
        info!("chain {} closed", self.chain_id);
        let _ = self.closed_sender.try_send(());
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        self.start_shutdown();
        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                warn!("handler thread for chain {} panicked", self.shared.chain_id);
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("chain_id", &self.shared.chain_id)
            .field("state", &self.state())
            .field("queued", &self.len())
            .finish()
    }
}
