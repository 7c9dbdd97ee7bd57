//! Append-only experiment report (`log.txt`).
//!
//! # Responsibility
//! - Render trial, location, experiment-header and final-summary records
//!   with CRLF line endings.
//! - Append each record with a single write followed by a flush.
//!
//! # Invariants
//! - Records are never read back, rewritten or compacted.
//! - A failed write is surfaced once; nothing is retried.

pub mod format;
pub mod writer;

pub use format::{
    render_experiment_header, render_final_summary, render_location_record,
    render_trial_record, FinalSummary, SummaryColumn,
};
pub use writer::{ReportError, ReportWriter};
