//! Persistence layer for CSR correction records.

pub mod corrections;
pub mod migrations;

pub use corrections::{CorrectionRecord, CorrectionStore};
