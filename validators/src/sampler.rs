//! Weighted index sampling.
//!
//! The sampler stores prefix sums of the weight vector and binary-searches a
//! uniformly drawn point, the same cumulative walk stake-weighted proposer
//! selection uses, in `O(log n)` per draw. Zero-weight slots share their
//! predecessor's prefix sum and are therefore never chosen.

use rand::Rng;

#[derive(Debug, Default, Clone)]
pub struct WeightedSampler {
    cumulative: Vec<u64>,
}

impl WeightedSampler {
    /// Rebuild from `weights`. Callers guarantee the sum fits in a `u64`.
    pub fn initialize(&mut self, weights: &[u64]) {
        self.cumulative.clear();
        self.cumulative.reserve(weights.len());
        let mut acc = 0u64;
        for weight in weights {
            acc = acc.saturating_add(*weight);
            self.cumulative.push(acc);
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// Index of the slot owning `point`, for `point < total_weight()`.
    pub fn lookup(&self, point: u64) -> Option<usize> {
        if point >= self.total_weight() {
            return None;
        }
        Some(self.cumulative.partition_point(|&c| c <= point))
    }

    /// Draw one index with probability proportional to its weight.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let total = self.total_weight();
        if total == 0 {
            return None;
        }
        self.lookup(rng.random_range(0..total))
    }
}
