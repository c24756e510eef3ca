//! Wakeup pipe for the blocking event loop
//!
//! Signal handlers write one byte to the sending end. The dispatcher polls
//! the receiving end together with the notifier, so a request raised just
//! before it blocks still wakes it up.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;

#[derive(Debug)]
pub struct WakePipe {
    reader: UnixStream,
    writer: UnixStream,
}

impl WakePipe {
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self { reader, writer })
    }

    /// Another handle on the sending end, for signal handlers or threads
    pub fn sender(&self) -> io::Result<UnixStream> {
        self.writer.try_clone()
    }

    pub fn wake(&self) {
        wake(&self.writer);
    }

    /// Consume pending wakeups; true if there were any
    pub fn drain(&self) -> bool {
        let mut buf = [0u8; 64];
        let mut woken = false;
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => woken = true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        woken
    }
}

impl AsFd for WakePipe {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

/// Write one wakeup byte to `sender`
///
/// Safe to call from a signal handler. A full pipe already guarantees a
/// wakeup, so errors are dropped.
pub fn wake(sender: &UnixStream) {
    let mut sender = sender;
    let _ = sender.write(&[1]);
}
