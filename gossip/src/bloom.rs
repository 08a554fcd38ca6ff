//! Salted bloom filter over gossip ids.
//!
//! A filter sized for `n` elements at the target false-positive probability
//! keeps absorbing additions until its estimated probability reaches the
//! (looser) reset probability. [`reset_bloom_filter_if_needed`] then swaps in
//! a freshly sized filter under a new salt.

use {
    crate::{config::BloomFilterConfig, error::Result, gossipable::Gossipable, metrics},
    log::debug,
    quorum_bloom::{estimate_count, hash, optimal_parameters, Filter, ReadFilter},
    quorum_monitoring::MetricsSink,
    quorum_types::Id,
    std::{fmt, sync::Arc},
};

pub struct BloomFilter {
    config: BloomFilterConfig,
    filter: Filter,
    salt: Id,
    max_count: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl BloomFilter {
    pub fn new(config: BloomFilterConfig, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        config.validate()?;
        let (filter, max_count) = new_filter(&config, config.min_target_elements)?;
        let bloom = Self {
            config,
            filter,
            salt: Id::random(),
            max_count,
            metrics,
        };
        bloom.report();
        Ok(bloom)
    }

    pub fn add<T: Gossipable>(&mut self, item: &T) {
        let id = item.gossip_id();
        self.filter.add(hash(id.as_ref(), self.salt.as_ref()));
        self.metrics
            .set_gauge(&metrics::BLOOM_COUNT, self.filter.count() as i64);
    }

    pub fn has<T: Gossipable>(&self, item: &T) -> bool {
        self.has_id(&item.gossip_id())
    }

    pub fn has_id(&self, id: &Id) -> bool {
        self.filter.contains(hash(id.as_ref(), self.salt.as_ref()))
    }

    /// The filter and salt as sent in a pull request.
    pub fn marshal(&self) -> (Vec<u8>, Vec<u8>) {
        (self.filter.marshal(), self.salt.as_ref().to_vec())
    }

    /// Additions since the last reset.
    pub fn count(&self) -> usize {
        self.filter.count()
    }

    /// Additions tolerated before a reset is due.
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn num_entries(&self) -> usize {
        self.filter.num_entries()
    }

    pub fn salt(&self) -> Id {
        self.salt
    }

    fn report(&self) {
        self.metrics
            .set_gauge(&metrics::BLOOM_COUNT, self.filter.count() as i64);
        self.metrics
            .set_gauge(&metrics::BLOOM_ENTRIES, self.filter.num_entries() as i64);
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("salt", &self.salt)
            .field("count", &self.count())
            .field("max_count", &self.max_count)
            .field("num_entries", &self.num_entries())
            .finish()
    }
}

fn new_filter(config: &BloomFilterConfig, target_elements: usize) -> Result<(Filter, usize)> {
    let (num_hashes, num_entries) =
        optimal_parameters(target_elements, config.target_false_positive_probability);
    let filter = Filter::new(num_hashes, num_entries)?;
    let max_count = estimate_count(
        num_hashes,
        num_entries,
        config.reset_false_positive_probability,
    );
    Ok((filter, max_count))
}

/// Replace `bloom` with an empty filter sized for `target_elements` (but no
/// fewer than the configured minimum) once it has reached its maximum count.
/// Returns whether it was replaced.
pub fn reset_bloom_filter_if_needed(bloom: &mut BloomFilter, target_elements: usize) -> Result<bool> {
    if bloom.count() < bloom.max_count {
        return Ok(false);
    }
    let target_elements = target_elements.max(bloom.config.min_target_elements);
    let (filter, max_count) = new_filter(&bloom.config, target_elements)?;
    debug!(
        "resetting bloom filter after {} additions, sized for {} elements",
        bloom.count(),
        target_elements
    );
    bloom.filter = filter;
    bloom.max_count = max_count;
    bloom.salt = Id::random();
    bloom.metrics.inc_counter(&metrics::BLOOM_RESETS);
    bloom.report();
    Ok(true)
}

/// Whether a peer's filter, marshalled under `salt`, claims `id`.
pub fn filter_contains(filter: &ReadFilter, salt: &[u8], id: &Id) -> bool {
    filter.contains(hash(id.as_ref(), salt))
}
