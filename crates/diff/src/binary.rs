//! Byte-level diff for binary files
//!
//! Both files are read in lockstep 16-byte chunks. A chunk length mismatch
//! ends the walk with a size report; otherwise mismatching bytes are
//! recorded up to `MAX_DIFFS`, after which scanning stops.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Bytes compared per step
pub const CHUNK: usize = 16;

/// Differences recorded before scanning stops
pub const MAX_DIFFS: usize = 16;

/// One mismatching byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteDiff {
    pub offset: u64,
    pub live: u8,
    pub cached: u8,
}

/// Chunk length mismatch between the two files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMismatch {
    pub offset: u64,
    pub live_len: usize,
    pub cached_len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryReport {
    pub diffs: Vec<ByteDiff>,
    /// More differences exist beyond `diffs`
    pub truncated: bool,
    pub size_mismatch: Option<SizeMismatch>,
}

impl BinaryReport {
    pub fn has_changes(&self) -> bool {
        !self.diffs.is_empty() || self.size_mismatch.is_some()
    }

    /// Offset of the first difference, aligned down to a chunk boundary
    ///
    /// Falls back to the size mismatch when no byte differs before one file
    /// runs out.
    pub fn base_offset(&self) -> Option<u64> {
        self.diffs
            .first()
            .map(|d| d.offset)
            .or(self.size_mismatch.map(|m| m.offset))
            .map(|offset| offset & !(CHUNK as u64 - 1))
    }
}

/// Compare the live file against its snapshot
pub fn diff_binary(live: &Path, cached: &Path) -> Result<BinaryReport> {
    let live_file = File::open(live).with_context(|| format!("Cannot open {}", live.display()))?;
    let cached_file =
        File::open(cached).with_context(|| format!("Cannot open {}", cached.display()))?;

    diff_readers(live_file, cached_file).context("Failed to compare binary files")
}

/// Compare two byte streams
pub fn diff_readers(mut live: impl Read, mut cached: impl Read) -> io::Result<BinaryReport> {
    let mut report = BinaryReport::default();
    let mut live_buf = [0u8; CHUNK];
    let mut cached_buf = [0u8; CHUNK];
    let mut offset = 0u64;

    loop {
        let live_len = read_chunk(&mut live, &mut live_buf)?;
        let cached_len = read_chunk(&mut cached, &mut cached_buf)?;

        if live_len == 0 && cached_len == 0 {
            break;
        }

        if live_len != cached_len {
            report.size_mismatch = Some(SizeMismatch {
                offset,
                live_len,
                cached_len,
            });
            break;
        }

        let pairs = live_buf[..live_len].iter().zip(&cached_buf[..cached_len]);
        for (index, (&l, &c)) in pairs.enumerate() {
            if l == c {
                continue;
            }
            if report.diffs.len() == MAX_DIFFS {
                report.truncated = true;
                return Ok(report);
            }
            report.diffs.push(ByteDiff {
                offset: offset + index as u64,
                live: l,
                cached: c,
            });
        }

        offset += live_len as u64;
    }

    Ok(report)
}

/// Read a full chunk unless the stream ends first
fn read_chunk(reader: &mut impl Read, buf: &mut [u8; CHUNK]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < CHUNK {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
