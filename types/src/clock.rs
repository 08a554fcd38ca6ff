//! A clock that can be frozen and advanced by tests.

use {
    parking_lot::Mutex,
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

/// Source of the current time.
///
/// Cloning shares the underlying source, so advancing a mock clock is seen by
/// every component holding a clone.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    frozen: Option<Arc<Mutex<Instant>>>,
}

impl Clock {
    /// The real monotonic clock.
    pub fn system() -> Self {
        Self { frozen: None }
    }

    /// A clock that stays at `start` until moved with [`Clock::set`] or
    /// [`Clock::advance`].
    pub fn mock(start: Instant) -> Self {
        Self {
            frozen: Some(Arc::new(Mutex::new(start))),
        }
    }

    pub fn now(&self) -> Instant {
        match &self.frozen {
            Some(now) => *now.lock(),
            None => Instant::now(),
        }
    }

    /// Move a mock clock to `time`. No-op on the system clock.
    pub fn set(&self, time: Instant) {
        if let Some(now) = &self.frozen {
            *now.lock() = time;
        }
    }

    /// Move a mock clock forward. No-op on the system clock.
    pub fn advance(&self, by: Duration) {
        if let Some(now) = &self.frozen {
            let mut now = now.lock();
            *now += by;
        }
    }

    pub fn is_mock(&self) -> bool {
        self.frozen.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_is_shared_between_clones() {
        let start = Instant::now();
        let clock = Clock::mock(start);
        let other = clock.clone();
        clock.advance(Duration::from_secs(5));
        assert_eq!(other.now(), start + Duration::from_secs(5));
        other.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_clock_ignores_set() {
        let clock = Clock::system();
        let before = clock.now();
        clock.advance(Duration::from_secs(3600));
        assert!(clock.now() < before + Duration::from_secs(3600));
        assert!(!clock.is_mock());
    }
}
