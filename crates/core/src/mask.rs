//! Filesystem event masks
//!
//! Bit values match the Linux inotify ABI so a mask can be handed to the
//! kernel unchanged and raw event masks can be decoded without translation.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Set of filesystem event classes
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u32);

impl EventMask {
    pub const ACCESS: Self = Self(0x0000_0001);
    pub const MODIFY: Self = Self(0x0000_0002);
    pub const ATTRIB: Self = Self(0x0000_0004);
    pub const CLOSE_WRITE: Self = Self(0x0000_0008);
    pub const CLOSE_NOWRITE: Self = Self(0x0000_0010);
    pub const OPEN: Self = Self(0x0000_0020);
    pub const MOVED_FROM: Self = Self(0x0000_0040);
    pub const MOVED_TO: Self = Self(0x0000_0080);
    pub const CREATE: Self = Self(0x0000_0100);
    pub const DELETE: Self = Self(0x0000_0200);
    pub const DELETE_SELF: Self = Self(0x0000_0400);
    pub const MOVE_SELF: Self = Self(0x0000_0800);
    pub const UNMOUNT: Self = Self(0x0000_2000);
    pub const Q_OVERFLOW: Self = Self(0x0000_4000);
    pub const IGNORED: Self = Self(0x0000_8000);
    pub const ISDIR: Self = Self(0x4000_0000);

    /// Both halves of a rename
    pub const MOVE: Self = Self(Self::MOVED_FROM.0 | Self::MOVED_TO.0);

    /// The empty mask
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap raw bits, keeping unknown ones
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Human-readable label for a raw event mask
    ///
    /// Only the first matching class in `LABEL_PRECEDENCE` is reported, even
    /// when the kernel sets several bits on one record.
    pub fn label(self) -> &'static str {
        LABEL_PRECEDENCE
            .iter()
            .find(|(bit, _)| self.contains(*bit))
            .map(|(_, label)| *label)
            .unwrap_or("Unknown")
    }

    /// Whether the event may have changed file content
    pub fn is_content_change(self) -> bool {
        self.intersects(
            Self::MODIFY | Self::CLOSE_WRITE | Self::CREATE | Self::MOVED_TO | Self::IGNORED,
        )
    }
}

/// Decoding order for `EventMask::label`
const LABEL_PRECEDENCE: [(EventMask, &str); 14] = [
    (EventMask::MODIFY, "Modified"),
    (EventMask::CREATE, "Created"),
    (EventMask::DELETE, "Deleted"),
    (EventMask::MOVED_FROM, "Moved from"),
    (EventMask::MOVED_TO, "Moved to"),
    (EventMask::CLOSE_WRITE, "Close write"),
    (EventMask::CLOSE_NOWRITE, "Close no write"),
    (EventMask::OPEN, "Opened"),
    (EventMask::ATTRIB, "Attributes"),
    (EventMask::DELETE_SELF, "Self deleted"),
    (EventMask::MOVE_SELF, "Self moved"),
    (EventMask::UNMOUNT, "Unmounted"),
    (EventMask::Q_OVERFLOW, "Queue overflow"),
    (EventMask::IGNORED, "Watch removed"),
];

const NAMES: [(EventMask, &str); 16] = [
    (EventMask::ACCESS, "ACCESS"),
    (EventMask::MODIFY, "MODIFY"),
    (EventMask::ATTRIB, "ATTRIB"),
    (EventMask::CLOSE_WRITE, "CLOSE_WRITE"),
    (EventMask::CLOSE_NOWRITE, "CLOSE_NOWRITE"),
    (EventMask::OPEN, "OPEN"),
    (EventMask::MOVED_FROM, "MOVED_FROM"),
    (EventMask::MOVED_TO, "MOVED_TO"),
    (EventMask::CREATE, "CREATE"),
    (EventMask::DELETE, "DELETE"),
    (EventMask::DELETE_SELF, "DELETE_SELF"),
    (EventMask::MOVE_SELF, "MOVE_SELF"),
    (EventMask::UNMOUNT, "UNMOUNT"),
    (EventMask::Q_OVERFLOW, "Q_OVERFLOW"),
    (EventMask::IGNORED, "IGNORED"),
    (EventMask::ISDIR, "ISDIR"),
];

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "EventMask({:#x})", self.0)
        } else {
            write!(f, "EventMask({})", names.join(" | "))
        }
    }
}
