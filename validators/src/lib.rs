//! Weighted validator sets.
//!
//! A [`ValidatorSet`] supports `O(1)` amortized add, remove and mask, and
//! weighted sampling backed by a lazily rebuilt [`sampler::WeightedSampler`].
//! The [`ValidatorManager`] owns one set per subnet. Membership changes are
//! published to [`ValidatorObserver`]s as [`ValidatorEvent`]s.

pub mod error;
pub mod manager;
pub mod sampler;
pub mod set;
pub mod validator;

pub use {
    error::{Result, ValidatorError},
    manager::ValidatorManager,
    set::ValidatorSet,
    validator::{ObserverId, Validator, ValidatorEvent, ValidatorObserver},
};
