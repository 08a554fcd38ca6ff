//! The raw bloom filter and its read-only parsed form.
//!
//! ## Wire format
//!
//! ```text
//! [1 byte: num_hashes] [8 bytes × num_hashes: seeds (u64-be)] [entries]
//! ```
//!
//! Each seed perturbs the element hash to derive one bit index:
//! `h = rotl(h, 17) ^ seed; index = h % (entries × 8)`.

use {
    crate::{
        error::{BloomError, Result},
        optimal::{MAX_HASHES, MIN_ENTRIES, MIN_HASHES},
    },
    bv::{BitVec, Bits, BitsMut},
    rand::Rng,
};

const HASH_ROTATION: u32 = 17;
const SEED_LEN: usize = 8;

/// A mutable bloom filter over pre-hashed `u64` elements.
#[derive(Debug, Clone)]
pub struct Filter {
    seeds: Vec<u64>,
    entries: BitVec<u8>,
    count: usize,
}

impl Filter {
    /// Create an empty filter with random seeds.
    pub fn new(num_hashes: usize, num_entries: usize) -> Result<Self> {
        validate_shape(num_hashes, num_entries)?;
        let mut rng = rand::rng();
        let seeds = (0..num_hashes).map(|_| rng.random::<u64>()).collect();
        Ok(Self {
            seeds,
            entries: BitVec::new_fill(false, bit_len(num_entries)),
            count: 0,
        })
    }

    pub fn add(&mut self, hash: u64) {
        let num_bits = self.entries.len();
        for index in bit_indices(&self.seeds, hash, num_bits) {
            self.entries.set_bit(index, true);
        }
        self.count = self.count.saturating_add(1);
    }

    pub fn contains(&self, hash: u64) -> bool {
        contains(&self.seeds, &self.entries, hash)
    }

    /// Number of additions since creation, duplicates included.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn num_hashes(&self) -> usize {
        self.seeds.len()
    }

    pub fn num_entries(&self) -> usize {
        self.entries.block_len()
    }

    pub fn marshal(&self) -> Vec<u8> {
        marshal(&self.seeds, &self.entries)
    }
}

/// A filter received from a peer. It can only be queried.
#[derive(Debug, Clone)]
pub struct ReadFilter {
    seeds: Vec<u64>,
    entries: BitVec<u8>,
}

impl ReadFilter {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (&num_hashes, rest) = bytes
            .split_first()
            .ok_or(BloomError::Truncated(bytes.len()))?;
        let num_hashes = num_hashes as usize;
        let seeds_len = num_hashes * SEED_LEN;
        if rest.len() < seeds_len {
            return Err(BloomError::Truncated(bytes.len()));
        }
        let (seed_bytes, entry_bytes) = rest.split_at(seeds_len);
        validate_shape(num_hashes, entry_bytes.len())?;

        let seeds = seed_bytes
            .chunks_exact(SEED_LEN)
            .map(|chunk| {
                let mut seed = [0u8; SEED_LEN];
                seed.copy_from_slice(chunk);
                u64::from_be_bytes(seed)
            })
            .collect();
        let mut entries = BitVec::new_fill(false, bit_len(entry_bytes.len()));
        for (i, byte) in entry_bytes.iter().enumerate() {
            entries.set_block(i, *byte);
        }
        Ok(Self { seeds, entries })
    }

    pub fn contains(&self, hash: u64) -> bool {
        contains(&self.seeds, &self.entries, hash)
    }

    pub fn marshal(&self) -> Vec<u8> {
        marshal(&self.seeds, &self.entries)
    }
}

impl From<&Filter> for ReadFilter {
    fn from(filter: &Filter) -> Self {
        Self {
            seeds: filter.seeds.clone(),
            entries: filter.entries.clone(),
        }
    }
}

fn validate_shape(num_hashes: usize, num_entries: usize) -> Result<()> {
    if !(MIN_HASHES..=MAX_HASHES).contains(&num_hashes) {
        return Err(BloomError::InvalidNumHashes(num_hashes));
    }
    if num_entries < MIN_ENTRIES {
        return Err(BloomError::TooFewEntries(num_entries));
    }
    Ok(())
}

fn bit_len(num_entries: usize) -> u64 {
    (num_entries as u64).saturating_mul(8)
}

fn bit_indices(seeds: &[u64], hash: u64, num_bits: u64) -> impl Iterator<Item = u64> + '_ {
    seeds.iter().scan(hash, move |hash, seed| {
        *hash = hash.rotate_left(HASH_ROTATION) ^ seed;
        Some(*hash % num_bits)
    })
}

fn contains(seeds: &[u64], entries: &BitVec<u8>, hash: u64) -> bool {
    bit_indices(seeds, hash, entries.len()).all(|index| entries.get_bit(index))
}

fn marshal(seeds: &[u64], entries: &BitVec<u8>) -> Vec<u8> {
    let num_entries = entries.block_len();
    let mut out = Vec::with_capacity(1 + seeds.len() * SEED_LEN + num_entries);
    // validate_shape caps the hash count at 16.
    out.push(seeds.len() as u8);
    for seed in seeds {
        out.extend_from_slice(&seed.to_be_bytes());
    }
    out.extend((0..num_entries).map(|i| entries.get_block(i)));
    out
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{hasher::hash, optimal::optimal_parameters},
        quorum_types::Id,
    };

    #[test]
    fn test_new_rejects_bad_shapes() {
        assert_eq!(Filter::new(0, 10).unwrap_err(), BloomError::InvalidNumHashes(0));
        assert_eq!(Filter::new(17, 10).unwrap_err(), BloomError::InvalidNumHashes(17));
        assert_eq!(Filter::new(3, 0).unwrap_err(), BloomError::TooFewEntries(0));
    }

    #[test]
    fn test_added_elements_are_contained() {
        let mut filter = Filter::new(4, 256).unwrap();
        let salt = Id::random();
        let items: Vec<Id> = (0..100).map(|_| Id::new_unique()).collect();
        for item in &items {
            filter.add(hash(item.as_ref(), salt.as_ref()));
        }
        assert_eq!(filter.count(), 100);
        for item in &items {
            assert!(filter.contains(hash(item.as_ref(), salt.as_ref())));
        }
    }

    #[test]
    fn test_false_positive_rate_is_bounded() {
        let (hashes, entries) = optimal_parameters(1_000, 0.01);
        let mut filter = Filter::new(hashes, entries).unwrap();
        let salt = Id::random();
        for _ in 0..1_000 {
            filter.add(hash(Id::new_unique().as_ref(), salt.as_ref()));
        }
        let false_positives = (0..10_000)
            .filter(|_| filter.contains(hash(Id::new_unique().as_ref(), salt.as_ref())))
            .count();
        // Expected ~100; leave generous head room for randomness.
        assert!(false_positives < 300, "false positives = {false_positives}");
    }

    #[test]
    fn test_marshal_parse_preserves_membership() {
        let mut filter = Filter::new(3, 64).unwrap();
        filter.add(42);
        filter.add(7);
        let bytes = filter.marshal();
        assert_eq!(bytes.len(), 1 + 3 * 8 + 64);

        let read = ReadFilter::parse(&bytes).unwrap();
        assert!(read.contains(42));
        assert!(read.contains(7));
        assert_eq!(read.marshal(), bytes);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(ReadFilter::parse(&[]).unwrap_err(), BloomError::Truncated(0));
        // Claims two seeds but carries one.
        let mut bytes = vec![2u8];
        bytes.extend_from_slice(&1u64.to_be_bytes());
        assert_eq!(ReadFilter::parse(&bytes).unwrap_err(), BloomError::Truncated(9));
        // No entries after the seeds.
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1u64.to_be_bytes());
        assert_eq!(ReadFilter::parse(&bytes).unwrap_err(), BloomError::TooFewEntries(0));
        assert_eq!(
            ReadFilter::parse(&[0u8, 0xff]).unwrap_err(),
            BloomError::InvalidNumHashes(0)
        );
    }
}
