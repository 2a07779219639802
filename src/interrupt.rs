//! SIGINT/SIGTERM handling.
//!
//! The handler only raises a flag. The runner polls it between iterations so
//! completed results can still be written on the way out. A second signal
//! exits immediately with the conventional `128 + signo` status.

use std::sync::atomic::{AtomicBool, Ordering};

static REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_signal(signo: libc::c_int) {
    if REQUESTED.swap(true, Ordering::SeqCst) {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(128 + signo) }
    }
}

/// Install the handler for SIGINT and SIGTERM. No-op off Unix.
pub fn install() {
    #[cfg(unix)]
    {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only touches an atomic and calls _exit.
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    }
}

/// The process-wide flag set by the handler.
pub fn flag() -> &'static AtomicBool {
    &REQUESTED
}
