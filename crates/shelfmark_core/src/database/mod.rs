//! Book store
//!
//! Exposes the `Db` struct and its pre-defined queries over the `books` and
//! `qr_codes` tables. All row timestamps are assigned here, not by callers.
pub mod queries;
pub mod types;
