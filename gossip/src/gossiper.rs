//! Periodic gossip rounds.

use {
    crate::error::{GossipError, Result},
    crossbeam_channel::{bounded, select, tick, Receiver, Sender},
    log::{info, trace, warn},
    quorum_types::NodeId,
    quorum_validators::ValidatorSet,
    std::{
        sync::Arc,
        thread::{self, JoinHandle},
        time::Duration,
    },
};

/// One round of gossip, push or pull.
pub trait Gossiper: Send + Sync {
    fn gossip(&self) -> Result<()>;
}

/// Gossips nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpGossiper;

impl Gossiper for NoOpGossiper {
    fn gossip(&self) -> Result<()> {
        Ok(())
    }
}

/// Runs the wrapped gossiper only while this node is a validator.
pub struct ValidatorGossiper {
    gossiper: Arc<dyn Gossiper>,
    node_id: NodeId,
    validators: Arc<ValidatorSet>,
}

impl ValidatorGossiper {
    pub fn new(gossiper: Arc<dyn Gossiper>, node_id: NodeId, validators: Arc<ValidatorSet>) -> Self {
        Self {
            gossiper,
            node_id,
            validators,
        }
    }
}

impl Gossiper for ValidatorGossiper {
    fn gossip(&self) -> Result<()> {
        if !self.validators.contains(&self.node_id) {
            trace!("{} is not a validator, skipping gossip", self.node_id);
            return Ok(());
        }
        self.gossiper.gossip()
    }
}

/// Call `gossiper` every `frequency` until `exit` fires or disconnects.
/// A failed round is logged and the next one runs as scheduled.
pub fn every(gossiper: &dyn Gossiper, frequency: Duration, exit: &Receiver<()>) {
    let ticker = tick(frequency);
    loop {
        select! {
            recv(ticker) -> _ => {
                if let Err(err) = gossiper.gossip() {
                    warn!("gossip round failed: {}", err);
                }
            }
            recv(exit) -> _ => return,
        }
    }
}

/// A thread running [`every`] for one gossiper.
pub struct GossipService {
    exit: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl GossipService {
    pub fn new(name: &str, gossiper: Arc<dyn Gossiper>, frequency: Duration) -> Result<Self> {
        let (exit_sender, exit) = bounded(1);
        let thread_name = format!("gossip{name}");
        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                every(gossiper.as_ref(), frequency, &exit);
                info!("gossip service exiting");
            })
            .map_err(|source| GossipError::ThreadSpawn {
                name: thread_name,
                source,
            })?;
        Ok(Self {
            exit: Some(exit_sender),
            thread: Some(thread),
        })
    }

    /// Stop gossiping and wait for the thread to exit.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the exit channel.
        self.exit.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("gossip service thread panicked");
            }
        }
    }
}

impl Drop for GossipService {
    fn drop(&mut self) {
        self.stop();
    }
}
