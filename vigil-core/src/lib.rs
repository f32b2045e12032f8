//! Vigil Core
//!
//! Core types for the Vigil job health-reporting protocol.
//!
//! This crate contains:
//! - Domain types: severity model, run log records, ledger entries
//! - Timestamp helpers: UTC ISO-8601 formatting shared by every durable artifact
//!
//! Note: File I/O lives in the harness (run logs) and ledger (shared ledger)
//! crates; everything here is a pure value type.

pub mod domain;
pub mod timestamp;
