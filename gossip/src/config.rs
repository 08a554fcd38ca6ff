//! Gossip configuration.

use {
    crate::error::ConfigError,
    quorum_consensus_net::SendConfig,
    std::time::Duration,
};

/// How many peers of each kind one gossip message targets.
///
/// Fields are signed so that a negative value coming from configuration is
/// caught by [`BranchingFactor::verify`] rather than wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchingFactor {
    pub validators: i64,
    pub non_validators: i64,
    pub peers: i64,
}

impl BranchingFactor {
    /// Reject negative fields and a selector that targets nobody.
    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.validators < 0 || self.non_validators < 0 || self.peers < 0 {
            return Err(ConfigError::NegativeBranchingFactor);
        }
        if self.validators == 0 && self.non_validators == 0 && self.peers == 0 {
            return Err(ConfigError::EmptyBranchingFactor);
        }
        Ok(())
    }

    /// Fan-out for the sender. Negative fields count as zero.
    pub fn send_config(&self) -> SendConfig {
        let count = |n: i64| usize::try_from(n).unwrap_or(0);
        SendConfig {
            validators: count(self.validators),
            non_validators: count(self.non_validators),
            peers: count(self.peers),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilterConfig {
    /// The filter is never sized for fewer elements than this.
    pub min_target_elements: usize,
    pub target_false_positive_probability: f64,
    /// The filter is reset once its estimated probability reaches this.
    pub reset_false_positive_probability: f64,
}

impl Default for BloomFilterConfig {
    fn default() -> Self {
        Self {
            min_target_elements: 8 * 1024,
            target_false_positive_probability: 0.01,
            reset_false_positive_probability: 0.05,
        }
    }
}

impl BloomFilterConfig {
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            min_target_elements: 16,
            target_false_positive_probability: 0.01,
            reset_false_positive_probability: 0.05,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_target_elements == 0 {
            return Err(ConfigError::ZeroSize("min_target_elements"));
        }
        for p in [
            self.target_false_positive_probability,
            self.reset_false_positive_probability,
        ] {
            if !(p > 0.0 && p < 1.0) {
                return Err(ConfigError::InvalidFalsePositiveProbability(p));
            }
        }
        if self.reset_false_positive_probability < self.target_false_positive_probability {
            return Err(ConfigError::ResetBelowTarget {
                target: self.target_false_positive_probability,
                reset: self.reset_false_positive_probability,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushGossiperConfig {
    /// Fan-out for items sent for the first time.
    pub gossip_params: BranchingFactor,
    /// Fan-out for items being sent again.
    pub regossip_params: BranchingFactor,
    /// Byte budget of one fresh batch.
    pub target_gossip_size: usize,
    /// Byte budget of one regossip batch.
    pub target_regossip_size: usize,
    /// Minimum time between two sends of the same item.
    pub max_regossip_frequency: Duration,
    /// Capacity of the cache of ids that left the set while tracked.
    pub discarded_cache_size: usize,
}

impl Default for PushGossiperConfig {
    fn default() -> Self {
        Self {
            gossip_params: BranchingFactor {
                validators: 100,
                non_validators: 0,
                peers: 0,
            },
            regossip_params: BranchingFactor {
                validators: 10,
                non_validators: 0,
                peers: 0,
            },
            target_gossip_size: 20 * 1024,
            target_regossip_size: 20 * 1024,
            max_regossip_frequency: Duration::from_secs(30),
            discarded_cache_size: 16 * 1024,
        }
    }
}

impl PushGossiperConfig {
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            gossip_params: BranchingFactor {
                validators: 2,
                non_validators: 0,
                peers: 1,
            },
            regossip_params: BranchingFactor {
                validators: 1,
                non_validators: 0,
                peers: 0,
            },
            target_gossip_size: 100,
            target_regossip_size: 100,
            max_regossip_frequency: Duration::from_secs(10),
            discarded_cache_size: 16,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gossip_params.verify()?;
        self.regossip_params.verify()?;
        if self.target_gossip_size == 0 {
            return Err(ConfigError::ZeroSize("target_gossip_size"));
        }
        if self.target_regossip_size == 0 {
            return Err(ConfigError::ZeroSize("target_regossip_size"));
        }
        if self.max_regossip_frequency.is_zero() {
            return Err(ConfigError::ZeroRegossipFrequency(
                self.max_regossip_frequency,
            ));
        }
        if self.discarded_cache_size == 0 {
            return Err(ConfigError::ZeroSize("discarded_cache_size"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullGossiperConfig {
    /// Peers polled per round.
    pub poll_size: usize,
}

impl Default for PullGossiperConfig {
    fn default() -> Self {
        Self { poll_size: 1 }
    }
}

impl PullGossiperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_size == 0 {
            return Err(ConfigError::ZeroSize("poll_size"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Byte budget of one pull response.
    pub target_response_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            target_response_size: 20 * 1024,
        }
    }
}

impl HandlerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_response_size == 0 {
            return Err(ConfigError::ZeroSize("target_response_size"));
        }
        Ok(())
    }
}
