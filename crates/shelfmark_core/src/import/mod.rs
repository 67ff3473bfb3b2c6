//! Import reconciler
//!
//! Decides whether an externally sourced candidate record corresponds to a
//! book already in the store, and whether the resulting write is a create or
//! a merge.
pub mod errors;
pub mod reconciler;
