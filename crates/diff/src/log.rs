//! Append-only change log
//!
//! Each diff that finds changes appends one human-readable block. The file
//! is opened per append so it can be rotated or truncated while running.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::binary::BinaryReport;
use crate::text::DiffLine;

/// `ctime`-style timestamp used in block headers
const TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
}

impl ChangeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a text diff block
    pub fn append_text(&self, file: &Path, event: &str, lines: &[DiffLine]) -> Result<()> {
        self.append(&render_text(&timestamp(), file, event, lines))
    }

    /// Append a binary diff block; reports without changes are skipped
    pub fn append_binary(&self, file: &Path, report: &BinaryReport) -> Result<()> {
        match render_binary(&timestamp(), file, report) {
            Some(block) => self.append(&block),
            None => Ok(()),
        }
    }

    fn append(&self, block: &str) -> Result<()> {
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open log file {}", self.path.display()))?;
        out.write_all(block.as_bytes())
            .with_context(|| format!("Failed to write log file {}", self.path.display()))
    }
}

fn timestamp() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// Render a text diff block
///
/// Context lines are dropped; each run of consecutive changes is preceded by
/// a blank line.
pub fn render_text(time: &str, file: &Path, event: &str, lines: &[DiffLine]) -> String {
    let mut block = String::new();
    let _ = writeln!(block, "\n=== Text File Diff ===");
    let _ = writeln!(block, "Time: {}", time);
    let _ = writeln!(block, "File: {}", file.display());
    let _ = writeln!(block, "Event: {}", event);

    let mut in_block = false;
    for line in lines {
        if !line.is_change() {
            in_block = false;
            continue;
        }
        if !in_block {
            block.push('\n');
            in_block = true;
        }
        let _ = writeln!(block, "{}", line.render());
    }

    block.push_str("=== End Text Diff ===\n\n");
    block
}

/// Render a binary diff block, or nothing if the files match
pub fn render_binary(time: &str, file: &Path, report: &BinaryReport) -> Option<String> {
    let base = report.base_offset()?;

    let mut block = String::new();
    let _ = writeln!(block, "\n=== Binary File Diff ===");
    let _ = writeln!(block, "Time: {}", time);
    let _ = writeln!(block, "File: {}", file.display());
    let _ = writeln!(block, "Offset: 0x{:08x}", base);
    for diff in &report.diffs {
        let _ = writeln!(
            block,
            "0x{:08x}: {:02x} -> {:02x}",
            diff.offset, diff.cached, diff.live
        );
    }
    if report.truncated {
        block.push_str("More differences follow ...\n");
    }
    if let Some(mismatch) = report.size_mismatch {
        let _ = writeln!(
            block,
            "Size mismatch at 0x{:08x} (live: {} != cache: {})",
            mismatch.offset, mismatch.live_len, mismatch.cached_len
        );
    }
    block.push_str("=== End Binary Diff ===\n\n");
    Some(block)
}
