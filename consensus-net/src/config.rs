//! Configuration for the consensus networking layer.
//!
//! Every config is a plain struct with production defaults. Constructors call
//! `validate()` before building anything, so an invalid config never yields a
//! partially initialised component.

use {crate::error::ConfigError, std::time::Duration};

/// Byte budgets of the inbound [`crate::throttler::WeightedThrottler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlerConfig {
    /// Bytes any peer may take, first come first served.
    pub at_large_alloc_size: u64,

    /// Bytes split between validators in proportion to their weight.
    pub validator_alloc_size: u64,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            at_large_alloc_size: 6 * 1024 * 1024, // 6 MiB
            validator_alloc_size: 32 * 1024 * 1024, // 32 MiB
        }
    }
}

impl ThrottlerConfig {
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            at_large_alloc_size: 1_024,
            validator_alloc_size: 1_024,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.at_large_alloc_size == 0 && self.validator_alloc_size == 0 {
            return Err(ConfigError::EmptyThrottler);
        }
        Ok(())
    }
}

/// When a validator gets benched, and for how long.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchlistConfig {
    /// Consecutive failures needed before a validator can be benched.
    pub threshold: usize,

    /// How long a validator must have been failing before it is benched.
    pub minimum_failing_duration: Duration,

    /// How long a bench lasts.
    pub duration: Duration,

    /// Largest fraction of total weight that may be benched at once.
    /// A value `<= 0` disables benching.
    pub max_portion: f64,
}

impl Default for BenchlistConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            minimum_failing_duration: Duration::from_secs(150),
            duration: Duration::from_secs(15 * 60),
            max_portion: 0.25,
        }
    }
}

impl BenchlistConfig {
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            threshold: 3,
            minimum_failing_duration: Duration::from_secs(5),
            duration: Duration::from_secs(60),
            max_portion: 0.5,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_portion.is_finite() || self.max_portion >= 1.0 {
            return Err(ConfigError::InvalidMaxPortion(self.max_portion));
        }
        if self.max_portion > 0.0 && self.threshold == 0 {
            return Err(ConfigError::ZeroBenchThreshold);
        }
        Ok(())
    }

    /// Whether this config selects the benchlist that never benches.
    pub fn is_disabled(&self) -> bool {
        self.max_portion <= 0.0
    }
}

/// Adaptive request timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// Timeout used before any latency has been observed.
    pub initial_timeout: Duration,
    pub minimum_timeout: Duration,
    pub maximum_timeout: Duration,

    /// The timeout is the observed latency average times this coefficient.
    pub timeout_coefficient: f64,

    /// Weight of a new sample in the latency moving average.
    pub latency_alpha: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_secs(5),
            minimum_timeout: Duration::from_secs(2),
            maximum_timeout: Duration::from_secs(10),
            timeout_coefficient: 2.0,
            latency_alpha: 0.3,
        }
    }
}

impl TimeoutConfig {
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            initial_timeout: Duration::from_millis(200),
            minimum_timeout: Duration::from_millis(50),
            maximum_timeout: Duration::from_millis(500),
            timeout_coefficient: 2.0,
            latency_alpha: 0.3,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minimum_timeout > self.maximum_timeout {
            return Err(ConfigError::TimeoutBounds {
                minimum: self.minimum_timeout,
                maximum: self.maximum_timeout,
            });
        }
        if !(self.minimum_timeout..=self.maximum_timeout).contains(&self.initial_timeout) {
            return Err(ConfigError::InitialTimeoutOutOfBounds(self.initial_timeout));
        }
        if !self.timeout_coefficient.is_finite() || self.timeout_coefficient < 1.0 {
            return Err(ConfigError::InvalidTimeoutCoefficient(self.timeout_coefficient));
        }
        if !(self.latency_alpha > 0.0 && self.latency_alpha <= 1.0) {
            return Err(ConfigError::InvalidLatencyAlpha(self.latency_alpha));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// How long `remove_chain` waits for a chain to close before moving on.
    pub shutdown_timeout: Duration,
    pub timeouts: TimeoutConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(60),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl RouterConfig {
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(2),
            timeouts: TimeoutConfig::dev_default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::ZeroShutdownTimeout);
        }
        self.timeouts.validate()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn test_defaults_are_valid() {
        ThrottlerConfig::default().validate().unwrap();
        BenchlistConfig::default().validate().unwrap();
        TimeoutConfig::default().validate().unwrap();
        RouterConfig::default().validate().unwrap();
        RouterConfig::dev_default().validate().unwrap();
        BenchlistConfig::dev_default().validate().unwrap();
    }

    #[test]
    fn test_benchlist_portion_bounds() {
        let mut config = BenchlistConfig::default();
        config.max_portion = 1.0;
        assert_matches!(config.validate(), Err(ConfigError::InvalidMaxPortion(_)));
        config.max_portion = f64::NAN;
        assert_matches!(config.validate(), Err(ConfigError::InvalidMaxPortion(_)));
        config.max_portion = -1.0;
        assert!(config.validate().is_ok());
        assert!(config.is_disabled());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = TimeoutConfig::default();
        config.minimum_timeout = Duration::from_secs(20);
        assert_matches!(config.validate(), Err(ConfigError::TimeoutBounds { .. }));

        let mut config = TimeoutConfig::default();
        config.initial_timeout = Duration::from_secs(60);
        assert_matches!(
            config.validate(),
            Err(ConfigError::InitialTimeoutOutOfBounds(_))
        );

        let mut config = TimeoutConfig::default();
        config.latency_alpha = 0.0;
        assert_matches!(config.validate(), Err(ConfigError::InvalidLatencyAlpha(_)));
    }

    #[test]
    fn test_throttler_needs_some_bytes() {
        let config = ThrottlerConfig {
            at_large_alloc_size: 0,
            validator_alloc_size: 0,
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyThrottler));
    }
}
