//! Property-based invariant tests.
//!
//! Uses proptest to check, over arbitrary operation sequences:
//! - Throttler byte conservation and release back to the initial pools
//! - The benchlist's cap on benched stake
//! - Validator set weight bookkeeping under add, remove, mask and reveal

pub mod benchlist_invariants;
pub mod throttler_invariants;
pub mod validator_invariants;
