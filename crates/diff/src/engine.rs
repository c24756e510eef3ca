//! Diff dispatch: classify, compare, report, log, refresh
//!
//! `DiffEngine::diff` never fails. Every problem along the way is reported
//! on the console and the snapshot is refreshed so the next change is
//! compared against current content.

use std::path::Path;

use sqwatch_core::{CacheStore, Console, Tone};
use tracing::{debug, warn};

use crate::binary::{diff_binary, BinaryReport};
use crate::classify::{classify, FileKind};
use crate::lines::{read_lines, RetryPolicy};
use crate::log::ChangeLog;
use crate::report::ChangeReport;
use crate::text::{change_count, diff_lines, DiffLine};

/// Compares watched files against their cached snapshots
#[derive(Debug, Clone)]
pub struct DiffEngine {
    cache: CacheStore,
    log: Option<ChangeLog>,
    verbose: bool,
    retry: RetryPolicy,
}

impl DiffEngine {
    pub fn new(cache: CacheStore, log: Option<ChangeLog>, verbose: bool) -> Self {
        Self {
            cache,
            log,
            verbose,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the read retry budget
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Diff `path` against `cached` and bring the snapshot up to date
    ///
    /// `label` is the decoded event name recorded in the change log.
    pub fn diff<C: Console>(
        &self,
        path: &Path,
        cached: &Path,
        label: &str,
        console: &mut C,
    ) -> ChangeReport {
        match classify(path, &self.retry) {
            Ok(FileKind::Binary) => self.diff_bytes(path, cached, console),
            Ok(FileKind::Text) => self.diff_text(path, cached, label, console),
            Err(e) => {
                console.say(Tone::Error, e.to_string());
                self.refresh(path, cached, console);
                ChangeReport::Unclassified
            }
        }
    }

    fn diff_text<C: Console>(
        &self,
        path: &Path,
        cached: &Path,
        label: &str,
        console: &mut C,
    ) -> ChangeReport {
        let current_lines = read_lines(path, &self.retry);
        let cached_lines = read_lines(cached, &self.retry);

        let report = match (current_lines.is_empty(), cached_lines.is_empty()) {
            (true, true) => {
                debug!("{} and its snapshot are both empty", path.display());
                ChangeReport::Text {
                    lines: Vec::new(),
                    changes: 0,
                }
            }
            (true, false) => {
                console.say(Tone::Removed, "- File emptied");
                let lines = diff_lines(&current_lines, &cached_lines);
                self.log_text(path, "Emptied", &lines, console);
                ChangeReport::Emptied {
                    removed: cached_lines.len(),
                }
            }
            (false, true) => {
                console.say(Tone::Added, "+ New content added");
                let lines = diff_lines(&current_lines, &cached_lines);
                self.log_text(path, "New content", &lines, console);
                ChangeReport::NewContent {
                    added: current_lines.len(),
                }
            }
            (false, false) => {
                let lines = diff_lines(&current_lines, &cached_lines);
                let changes = change_count(&current_lines, &cached_lines);
                if changes == 0 {
                    return ChangeReport::Text { lines, changes };
                }

                if self.verbose {
                    print_text(&lines, console);
                }
                self.log_text(path, label, &lines, console);
                ChangeReport::Text { lines, changes }
            }
        };

        self.refresh(path, cached, console);
        report
    }

    fn diff_bytes<C: Console>(
        &self,
        path: &Path,
        cached: &Path,
        console: &mut C,
    ) -> ChangeReport {
        let report = match diff_binary(path, cached) {
            Ok(report) => report,
            Err(e) => {
                console.say(Tone::Error, format!("{:#}", e));
                self.refresh(path, cached, console);
                return ChangeReport::Unclassified;
            }
        };

        if self.verbose {
            console.say(
                Tone::Muted,
                format!("Binary file detected: {}", path.display()),
            );
            print_binary(&report, console);
        }

        if let Some(log) = &self.log {
            if let Err(e) = log.append_binary(path, &report) {
                report_log_failure(e, console);
            }
        }

        self.refresh(path, cached, console);
        ChangeReport::Binary(report)
    }

    fn log_text<C: Console>(
        &self,
        path: &Path,
        event: &str,
        lines: &[DiffLine],
        console: &mut C,
    ) {
        if let Some(log) = &self.log {
            if let Err(e) = log.append_text(path, event, lines) {
                report_log_failure(e, console);
            }
        }
    }

    fn refresh<C: Console>(&self, path: &Path, cached: &Path, console: &mut C) {
        if let Err(e) = self.cache.refresh(path, cached) {
            warn!("{:#}", e);
            console.say(Tone::Error, e.to_string());
        }
    }
}

fn report_log_failure<C: Console>(e: anyhow::Error, console: &mut C) {
    warn!("{:#}", e);
    console.say(Tone::Error, format!("{:#}", e));
}

/// Changed lines, with a blank line ahead of each block
fn print_text<C: Console>(lines: &[DiffLine], console: &mut C) {
    let mut in_block = false;
    for line in lines {
        let tone = match line {
            DiffLine::Context { .. } => {
                in_block = false;
                continue;
            }
            DiffLine::Removed { .. } => Tone::Removed,
            DiffLine::Added { .. } => Tone::Added,
        };
        if !in_block {
            console.say(Tone::Context, "");
            in_block = true;
        }
        console.say(tone, line.render());
    }
}

fn print_binary<C: Console>(report: &BinaryReport, console: &mut C) {
    for diff in &report.diffs {
        console.say(
            Tone::Context,
            format!("{:08x}: {:02x} -> {:02x}", diff.offset, diff.cached, diff.live),
        );
    }
    if report.truncated {
        console.say(Tone::Muted, "... more differences follow ...");
    }
    if let Some(mismatch) = report.size_mismatch {
        console.say(
            Tone::Removed,
            format!(
                "Files have different sizes at offset {:08x} (local: {} != cache: {})",
                mismatch.offset, mismatch.live_len, mismatch.cached_len
            ),
        );
    }
}
