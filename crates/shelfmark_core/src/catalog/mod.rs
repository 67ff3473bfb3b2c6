//! External catalog client
//!
//! Queries the Google Books volumes API and normalizes provider records into
//! transient [`candidate::ExternalCandidate`] values. Nothing in here is
//! cached or persisted.
pub mod candidate;
pub mod client;
pub mod errors;
