//! Structured errors callers of the bridge need to match on. Per-event
//! and per-port failures inside the bridge are logged and swallowed
//! (see the module docs on `reconciler` and `seq_input`); this enum is
//! only for conditions the lifecycle state machine surfaces outward.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge is already running")]
    AlreadyRunning,

    #[error("bridge is not running")]
    NotRunning,

    #[error("failed to open ALSA sequencer client: {0}")]
    SeqOpen(#[source] alsa::Error),

    #[error("failed to open JACK client: {0}")]
    JackOpen(#[source] jack::Error),

    #[error("failed to activate JACK client: {0}")]
    JackActivate(#[source] jack::Error),

    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("hardware export cannot be changed while the bridge is running")]
    HwExportChangeWhileRunning,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
