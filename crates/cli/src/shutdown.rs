//! Signal registration
//!
//! SIGINT and SIGTERM raise a flag and write to the loop's wakeup pipe; the
//! event loop notices both between reads and tears down from there.
//! SIGCHLD only wakes the loop so a finished command is reported straight
//! away.

use anyhow::{Context, Result};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use sqwatch_watcher::wake;
use std::ffi::c_int;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static WAKE: OnceLock<UnixStream> = OnceLock::new();

fn wake_loop() {
    if let Some(sender) = WAKE.get() {
        wake(sender);
    }
}

extern "C" fn request_shutdown(_: c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
    wake_loop();
}

extern "C" fn child_changed(_: c_int) {
    wake_loop();
}

/// Install the handlers and return the flag they raise
///
/// `sender` is the sending end of the loop's wakeup pipe. Only the first
/// call's sender is kept.
pub fn install(sender: UnixStream) -> Result<&'static AtomicBool> {
    let _ = WAKE.set(sender);

    let stop = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let child = SigAction::new(
        SigHandler::Handler(child_changed),
        SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );

    for (signal, action) in [
        (Signal::SIGINT, &stop),
        (Signal::SIGTERM, &stop),
        (Signal::SIGCHLD, &child),
    ] {
        // SAFETY: the handlers only touch an atomic and write(2) one byte
        unsafe { sigaction(signal, action) }
            .with_context(|| format!("Failed to install {} handler", signal))?;
    }

    Ok(&SHUTDOWN)
}
