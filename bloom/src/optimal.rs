//! Filter sizing.
//!
//! For `n` expected elements and a false-positive probability `p` the optimal
//! filter has `m = -n ln p / (ln 2)^2` bits and `k = (m / n) ln 2` hash
//! functions. [`estimate_count`] inverts the relationship: given a filter
//! shape, how many elements fit before `p` is exceeded.

use std::f64::consts::LN_2;

pub const MIN_HASHES: usize = 1;
pub const MAX_HASHES: usize = 16;
pub const MIN_ENTRIES: usize = 1;

const BITS_PER_BYTE: f64 = 8.0;

/// Returns `(num_hashes, num_entries)` for `count` elements at probability `fp`.
pub fn optimal_parameters(count: usize, fp: f64) -> (usize, usize) {
    let num_entries = optimal_entries(count, fp);
    let num_hashes = optimal_hashes(num_entries, count);
    (num_hashes, num_entries)
}

pub fn optimal_hashes(num_entries: usize, count: usize) -> usize {
    if num_entries < MIN_ENTRIES {
        return MIN_HASHES;
    }
    if count == 0 {
        return MAX_HASHES;
    }
    let num_hashes = (num_entries as f64 * BITS_PER_BYTE * LN_2 / count as f64).ceil();
    (num_hashes as usize).clamp(MIN_HASHES, MAX_HASHES)
}

/// Number of bytes of filter entries needed.
pub fn optimal_entries(count: usize, fp: f64) -> usize {
    if count == 0 || fp >= 1.0 {
        return MIN_ENTRIES;
    }
    if fp <= 0.0 {
        return usize::MAX;
    }
    let entries_in_bits = -(count as f64) * fp.ln() / (LN_2 * LN_2);
    let entries = (entries_in_bits + BITS_PER_BYTE - 1.0) / BITS_PER_BYTE;
    // `as` saturates, which is the behaviour wanted for absurd inputs.
    (entries as usize).max(MIN_ENTRIES)
}

/// Approximate number of additions the filter absorbs before its false
/// positive probability exceeds `fp`.
pub fn estimate_count(num_hashes: usize, num_entries: usize, fp: f64) -> usize {
    if num_hashes < MIN_HASHES || num_entries < MIN_ENTRIES || fp <= 0.0 {
        return 0;
    }
    if fp >= 1.0 {
        return usize::MAX;
    }
    let inv_num_hashes = 1.0 / num_hashes as f64;
    let num_bits = num_entries as f64 * BITS_PER_BYTE;
    let exp = 1.0 - fp.powf(inv_num_hashes);
    let count = (-exp.ln() * num_bits * inv_num_hashes).ceil();
    count as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_parameters_for_typical_sizes() {
        // 8 192 elements at 1% → ~9.59 bits per element, 7 hashes.
        let (hashes, entries) = optimal_parameters(8_192, 0.01);
        assert_eq!(hashes, 7);
        assert!((9_800..=9_850).contains(&entries), "entries = {entries}");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(optimal_entries(0, 0.01), MIN_ENTRIES);
        assert_eq!(optimal_entries(100, 1.0), MIN_ENTRIES);
        assert_eq!(optimal_entries(100, 0.0), usize::MAX);
        assert_eq!(optimal_hashes(0, 10), MIN_HASHES);
        assert_eq!(optimal_hashes(10, 0), MAX_HASHES);
        assert_eq!(estimate_count(0, 10, 0.01), 0);
        assert_eq!(estimate_count(3, 10, 0.0), 0);
        assert_eq!(estimate_count(3, 10, 1.0), usize::MAX);
    }

    #[test]
    fn test_estimate_count_inverts_sizing() {
        let target = 10_000;
        let (hashes, entries) = optimal_parameters(target, 0.01);
        let estimate = estimate_count(hashes, entries, 0.01);
        // The hash count is rounded to an integer, so the inverse is close
        // but not exact.
        assert!(estimate.abs_diff(target) < target / 50, "estimate = {estimate}");
    }

    #[test]
    fn test_estimate_count_grows_with_fp() {
        let strict = estimate_count(5, 1_000, 0.001);
        let loose = estimate_count(5, 1_000, 0.05);
        assert!(loose > strict);
    }
}
