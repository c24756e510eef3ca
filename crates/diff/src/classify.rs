//! Binary/text classification

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::thread::sleep;

use anyhow::{Context, Result};

use crate::lines::RetryPolicy;

/// Bytes inspected when classifying a file
pub const SNIFF_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Binary,
}

/// Check if content is binary (contains a null byte in the first 4KB)
pub fn is_binary(content: &[u8]) -> bool {
    content.iter().take(SNIFF_LEN).any(|&b| b == 0)
}

/// Classify the live file by its prefix
///
/// An unreadable file fails immediately; an empty read is retried since the
/// writer may not have flushed yet.
pub fn classify(path: &Path, policy: &RetryPolicy) -> Result<FileKind> {
    let mut buffer = [0u8; SNIFF_LEN];

    for attempt in 0..policy.sniff_attempts {
        let mut file =
            File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let read = read_prefix(&mut file, &mut buffer)
            .with_context(|| format!("Cannot read {}", path.display()))?;

        if read > 0 {
            return Ok(if is_binary(&buffer[..read]) {
                FileKind::Binary
            } else {
                FileKind::Text
            });
        }

        sleep(policy.sniff_delay * (attempt + 1));
    }

    anyhow::bail!(
        "Failed to read {} after {} attempts",
        path.display(),
        policy.sniff_attempts
    )
}

/// Fill as much of `buffer` as the file allows
fn read_prefix(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
