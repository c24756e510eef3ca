//! Change reports between a watched file and its cached snapshot
//!
//! This crate provides:
//! - Binary/text classification of the live file
//! - A bounded look-ahead line diff (not a minimal edit script)
//! - A capped byte-level diff for binary files
//! - The append-only change log
//! - `DiffEngine`, which ties the above to the cache store

pub mod binary;
pub mod classify;
pub mod engine;
pub mod lines;
pub mod log;
pub mod report;
pub mod text;

// Re-exports
pub use binary::{diff_binary, BinaryReport, ByteDiff, SizeMismatch};
pub use classify::{classify, is_binary, FileKind};
pub use engine::DiffEngine;
pub use lines::{read_lines, RetryPolicy};
pub use log::ChangeLog;
pub use report::ChangeReport;
pub use text::{change_count, diff_lines, DiffLine};
