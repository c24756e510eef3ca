//! Structured result of one diff run

use crate::binary::BinaryReport;
use crate::text::DiffLine;

/// What changed between the snapshot and the live file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReport {
    /// Both sides have lines; `changes` is the positional change count
    Text { lines: Vec<DiffLine>, changes: usize },
    /// The live file lost all of its lines
    Emptied { removed: usize },
    /// The snapshot was empty and the live file is not
    NewContent { added: usize },
    Binary(BinaryReport),
    /// The live file could not be classified
    Unclassified,
}

impl ChangeReport {
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    pub fn change_count(&self) -> usize {
        match self {
            Self::Text { changes, .. } => *changes,
            Self::Emptied { removed } => *removed,
            Self::NewContent { added } => *added,
            Self::Binary(report) => {
                report.diffs.len() + usize::from(report.size_mismatch.is_some())
            }
            Self::Unclassified => 0,
        }
    }

    /// Changed lines only, in walk order
    pub fn changed_lines(&self) -> impl Iterator<Item = &DiffLine> {
        let lines: &[DiffLine] = match self {
            Self::Text { lines, .. } => lines,
            _ => &[],
        };
        lines.iter().filter(|line| line.is_change())
    }
}
