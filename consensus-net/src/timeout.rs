//! Adaptive request timeouts.
//!
//! The timeout armed for a new request is the moving average of observed
//! response latencies times a coefficient, clamped to configured bounds. One
//! timer thread per manager sleeps until the earliest deadline.
//!
//! Firing and [`TimeoutManager::remove`] take the entry out of the table under
//! the same lock, so for each registration exactly one of them wins.

use {
    crate::{
        config::TimeoutConfig,
        error::{ConsensusNetError, Result},
    },
    log::{debug, trace},
    parking_lot::{Condvar, Mutex, MutexGuard},
    quorum_types::Id,
    std::{
        collections::{BTreeMap, HashMap},
        fmt,
        sync::Arc,
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    },
};

/// Called on the timer thread when a registration expires.
pub type OnTimeout = Box<dyn FnOnce() + Send>;

struct Entry {
    deadline: Instant,
    seq: u64,
    on_timeout: OnTimeout,
}

struct TimerState {
    /// Deadline order; `seq` breaks ties in registration order.
    deadlines: BTreeMap<(Instant, u64), Id>,
    entries: HashMap<Id, Entry>,
    next_seq: u64,
    average_latency: Option<Duration>,
    stopped: bool,
}

impl TimerState {
    fn remove(&mut self, key: &Id) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.deadlines.remove(&(entry.deadline, entry.seq));
        Some(entry)
    }

    fn pop_expired(&mut self, now: Instant) -> Option<OnTimeout> {
        let (&(deadline, _), &key) = self.deadlines.first_key_value()?;
        if deadline > now {
            return None;
        }
        self.remove(&key).map(|entry| entry.on_timeout)
    }
}

struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

pub struct TimeoutManager {
    config: TimeoutConfig,
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutManager {
    pub fn new(config: TimeoutConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                deadlines: BTreeMap::new(),
                entries: HashMap::new(),
                next_seq: 0,
                average_latency: None,
                stopped: false,
            }),
            wake: Condvar::new(),
        });
        let timer = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("quorumTimeout".to_string())
                .spawn(move || run_timer(&shared))
                .map_err(|err| ConsensusNetError::thread_spawn("quorumTimeout", err))?
        };
        Ok(Self {
            config,
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Arm a timeout for `key` using the current timeout duration. An
    /// existing registration under the same key is replaced without firing.
    /// Returns the deadline.
    pub fn register(&self, key: Id, on_timeout: OnTimeout) -> Instant {
        let mut state = self.shared.state.lock();
        let deadline = Instant::now() + self.timeout_for(&state);
        if state.stopped {
            debug!("timeout manager stopped, not arming {}", key);
            return deadline;
        }
        state.remove(&key);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.deadlines.insert((deadline, seq), key);
        state.entries.insert(
            key,
            Entry {
                deadline,
                seq,
                on_timeout,
            },
        );
        drop(state);
        self.shared.wake.notify_one();
        deadline
    }

    /// Disarm `key`. Returns false if it already fired or was never armed.
    pub fn remove(&self, key: &Id) -> bool {
        self.shared.state.lock().remove(key).is_some()
    }

    /// Feed a response latency into the moving average.
    pub fn observe_latency(&self, latency: Duration) {
        let mut state = self.shared.state.lock();
        let alpha = self.config.latency_alpha;
        let average = match state.average_latency {
            None => latency,
            Some(average) => latency.mul_f64(alpha) + average.mul_f64(1.0 - alpha),
        };
        trace!("latency sample {:?}, average {:?}", latency, average);
        state.average_latency = Some(average);
    }

    /// Duration the next registration will be armed with.
    pub fn current_timeout(&self) -> Duration {
        self.timeout_for(&self.shared.state.lock())
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Stop the timer thread. Registrations still armed never fire.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            state.deadlines.clear();
            state.entries.clear();
        }
        self.shared.wake.notify_all();
        let Some(timer) = self.timer.lock().take() else {
            return;
        };
        // Stopped from inside a timeout callback: the thread exits on its own.
        if timer.thread().id() == thread::current().id() {
            return;
        }
        if timer.join().is_err() {
            debug!("timeout thread panicked");
        }
    }

    fn timeout_for(&self, state: &TimerState) -> Duration {
        match state.average_latency {
            None => self.config.initial_timeout,
            Some(average) => average
                .mul_f64(self.config.timeout_coefficient)
                .clamp(self.config.minimum_timeout, self.config.maximum_timeout),
        }
    }
}

fn run_timer(shared: &Shared) {
    let mut state = shared.state.lock();
    while !state.stopped {
        if let Some(on_timeout) = state.pop_expired(Instant::now()) {
            // The callback may call back into the manager.
            MutexGuard::unlocked(&mut state, on_timeout);
            continue;
        }
        match state.deadlines.first_key_value().map(|(&(deadline, _), _)| deadline) {
            Some(deadline) => {
                shared.wake.wait_until(&mut state, deadline);
            }
            None => shared.wake.wait(&mut state),
        }
    }
}

impl Drop for TimeoutManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for TimeoutManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutManager")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("current_timeout", &self.current_timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crossbeam_channel::unbounded,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn manager() -> TimeoutManager {
        TimeoutManager::new(TimeoutConfig {
            initial_timeout: Duration::from_millis(20),
            minimum_timeout: Duration::from_millis(10),
            maximum_timeout: Duration::from_millis(100),
            timeout_coefficient: 2.0,
            latency_alpha: 0.3,
        })
        .unwrap()
    }

    #[test]
    fn test_registration_fires_once() {
        let manager = manager();
        let (sender, receiver) = unbounded();
        let key = Id::new_unique();
        manager.register(key, Box::new(move || sender.send(key).unwrap()));
        assert_eq!(receiver.recv_timeout(Duration::from_secs(2)), Ok(key));
        assert!(!manager.remove(&key));
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn test_removed_registration_never_fires() {
        let manager = manager();
        let fired = Arc::new(AtomicUsize::new(0));
        let key = Id::new_unique();
        {
            let fired = fired.clone();
            manager.register(
                key,
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert!(manager.remove(&key));
        assert!(!manager.remove(&key));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deadlines_fire_in_order() {
        let manager = manager();
        let (sender, receiver) = unbounded();
        let keys: Vec<Id> = (0..3).map(|_| Id::new_unique()).collect();
        for key in &keys {
            let sender = sender.clone();
            let key = *key;
            manager.register(key, Box::new(move || sender.send(key).unwrap()));
        }
        let fired: Vec<Id> = (0..3)
            .map(|_| receiver.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(fired, keys);
    }

    #[test]
    fn test_timeout_tracks_latency() {
        let manager = manager();
        assert_eq!(manager.current_timeout(), Duration::from_millis(20));

        manager.observe_latency(Duration::from_millis(30));
        assert_eq!(manager.current_timeout(), Duration::from_millis(60));

        // 0.3 * 100 + 0.7 * 30 = 51, doubled and clamped to the maximum.
        manager.observe_latency(Duration::from_millis(100));
        assert_eq!(manager.current_timeout(), Duration::from_millis(100));

        for _ in 0..50 {
            manager.observe_latency(Duration::from_millis(1));
        }
        assert_eq!(manager.current_timeout(), Duration::from_millis(10));
    }

    #[test]
    fn test_stop_drops_pending() {
        let manager = manager();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            manager.register(
                Id::new_unique(),
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        manager.stop();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pending(), 0);
    }
}
