//! Shutdown/crash signal handling.
//!
//! `SIGTERM`/`SIGINT` request an orderly stop, same as the jack
//! shutdown callback does. Grounded on the original's `sigsegv.c`
//! intent -- a crash handler that requests shutdown -- but without
//! symbol-dumping: `signal-hook` is installed for `SIGTERM`/`SIGINT`
//! only, and only to flip the stop flag the main loop already polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Registers `SIGTERM`/`SIGINT` handlers that store `true` into
/// `stop_requested` (mirroring `signal_hook::flag::register`'s own
/// contract). Call once at startup, before the bridge starts.
pub fn install(stop_requested: Arc<AtomicBool>) -> anyhow::Result<()> {
    flag::register(SIGTERM, stop_requested.clone())?;
    flag::register(SIGINT, stop_requested)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_does_not_error_on_a_fresh_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        assert!(install(flag).is_ok());
    }
}
