//! Reading files that may still be mid-write
//!
//! A modify event often arrives while the writer is still truncating or
//! filling the file, so reads retry with short sleeps before giving up.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry budget for racy reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts to open the file
    pub open_attempts: u32,
    pub open_delay: Duration,
    /// Attempts to see a non-empty file
    pub empty_attempts: u32,
    pub empty_delay: Duration,
    /// Attempts to read the classification prefix
    pub sniff_attempts: u32,
    /// Base delay between prefix reads, multiplied by the attempt number
    pub sniff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            open_attempts: 3,
            open_delay: Duration::from_millis(10),
            empty_attempts: 5,
            empty_delay: Duration::from_millis(50),
            sniff_attempts: 3,
            sniff_delay: Duration::from_millis(1),
        }
    }
}

impl RetryPolicy {
    /// Same attempt counts, no sleeping
    pub fn immediate() -> Self {
        Self {
            open_delay: Duration::ZERO,
            empty_delay: Duration::ZERO,
            sniff_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Read `path` as an ordered list of lines
///
/// Trailing newlines are stripped. A file that cannot be opened, or stays
/// empty for the whole retry budget, yields no lines.
pub fn read_lines(path: &Path, policy: &RetryPolicy) -> Vec<String> {
    let Some(mut file) = open_with_retry(path, policy) else {
        return Vec::new();
    };

    // Wait for the writer to put something in the file
    let mut attempts = 0;
    loop {
        match file.metadata() {
            Ok(meta) if meta.len() > 0 => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                return Vec::new();
            }
        }
        attempts += 1;
        if attempts >= policy.empty_attempts {
            debug!("{} is empty after {} attempts", path.display(), attempts);
            return Vec::new();
        }
        sleep(policy.empty_delay);
    }

    let mut content = Vec::new();
    if let Err(e) = file.read_to_end(&mut content) {
        warn!("Failed to read {}: {}", path.display(), e);
        return Vec::new();
    }

    split_lines(&content)
}

/// Split raw bytes into lines, dropping the final newline
pub fn split_lines(content: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(content)
        .split_terminator('\n')
        .map(str::to_owned)
        .collect()
}

fn open_with_retry(path: &Path, policy: &RetryPolicy) -> Option<File> {
    let mut attempt = 0;
    loop {
        match File::open(path) {
            Ok(file) => return Some(file),
            Err(e) if attempt + 1 >= policy.open_attempts.max(1) => {
                warn!(
                    "Failed to open {} after {} retries: {}",
                    path.display(),
                    attempt,
                    e
                );
                return None;
            }
            Err(_) => {
                attempt += 1;
                sleep(policy.open_delay);
            }
        }
    }
}
