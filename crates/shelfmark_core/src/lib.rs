//! `shelfmark_core`
//!
//! Core library for the Shelfmark book catalog. This library holds the
//! storage, catalog-import and QR-reference logic so that any API surface
//! (HTTP server, desktop shell) can reuse it without implementing the same
//! logic twice.

pub mod catalog;

pub mod database;

pub mod import;

pub mod qr;
