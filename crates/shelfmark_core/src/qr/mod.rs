//! QR association
//!
//! Owns the `book:<id>` payload scheme and the one-per-book association row.
//! Rendering the actual image is left to the embedding application; this
//! module decides what gets encoded and where the artifact lives.
pub mod registry;
