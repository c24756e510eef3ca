//! Line-oriented diff with bounded look-ahead
//!
//! The walk keeps one cursor per side. On a mismatch it first tries the
//! single-line substitution case, then searches a small window on each side
//! for a resync point, and finally forces a one-line step so the two sides
//! can never drift apart indefinitely.

/// Lines searched on each side for a resync point
pub const LOOK_AHEAD: usize = 10;

/// One line of a text change report
///
/// Line numbers are 1-based and refer to the side the line comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context { line: usize, text: String },
    Removed { line: usize, text: String },
    Added { line: usize, text: String },
}

impl DiffLine {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Context { .. })
    }

    /// `-N: text`, `+N: text` or `  N: text`
    pub fn render(&self) -> String {
        match self {
            Self::Context { line, text } => format!("  {}: {}", line, text),
            Self::Removed { line, text } => format!("-{}: {}", line, text),
            Self::Added { line, text } => format!("+{}: {}", line, text),
        }
    }
}

/// Walk `current` (live) against `cached` (snapshot)
pub fn diff_lines<S: AsRef<str>>(current: &[S], cached: &[S]) -> Vec<DiffLine> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < current.len() && j < cached.len() {
        let live = current[i].as_ref();
        let old = cached[j].as_ref();

        if live == old {
            out.push(DiffLine::Context {
                line: i + 1,
                text: live.to_owned(),
            });
            i += 1;
            j += 1;
            continue;
        }

        // Single line substitution: the lines right after both cursors agree
        if i + 1 < current.len()
            && j + 1 < cached.len()
            && current[i + 1].as_ref() == cached[j + 1].as_ref()
        {
            out.push(removed(j, old));
            out.push(added(i, live));
            i += 1;
            j += 1;
            continue;
        }

        match find_resync(current, cached, i, j) {
            Some((next_i, next_j)) => {
                out.extend((j..next_j).map(|k| removed(k, cached[k].as_ref())));
                out.extend((i..next_i).map(|k| added(k, current[k].as_ref())));
                i = next_i;
                j = next_j;
            }
            None => {
                out.push(removed(j, old));
                out.push(added(i, live));
                i += 1;
                j += 1;
            }
        }
    }

    out.extend((i..current.len()).map(|k| added(k, current[k].as_ref())));
    out.extend((j..cached.len()).map(|k| removed(k, cached[k].as_ref())));
    out
}

/// Find the next pair of cursors where both sides agree
///
/// At equal distance the live side wins.
fn find_resync<S: AsRef<str>>(
    current: &[S],
    cached: &[S],
    i: usize,
    j: usize,
) -> Option<(usize, usize)> {
    for distance in 1..=LOOK_AHEAD {
        if i + distance < current.len()
            && current[i + distance].as_ref() == cached[j].as_ref()
        {
            return Some((i + distance, j));
        }
        if j + distance < cached.len()
            && current[i].as_ref() == cached[j + distance].as_ref()
        {
            return Some((i, j + distance));
        }
    }
    None
}

/// Size difference plus positional mismatches in the overlapping prefix
pub fn change_count<S: AsRef<str>>(current: &[S], cached: &[S]) -> usize {
    let positional = (0..current.len().min(cached.len()))
        .filter(|&k| current[k].as_ref() != cached[k].as_ref())
        .count();
    current.len().abs_diff(cached.len()) + positional
}

fn removed(index: usize, text: &str) -> DiffLine {
    DiffLine::Removed {
        line: index + 1,
        text: text.to_owned(),
    }
}

fn added(index: usize, text: &str) -> DiffLine {
    DiffLine::Added {
        line: index + 1,
        text: text.to_owned(),
    }
}
