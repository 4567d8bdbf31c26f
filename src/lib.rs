//! Bidirectional bridge between ALSA sequencer MIDI and JACK MIDI.
//!
//! `bridge::Bridge` is the entry point: construct with a `BridgeConfig`,
//! then `start`/`stop` it. `remote_control::RemoteControl` wraps a
//! `Bridge` for callers that want a stable control surface (port name
//! mapping, hardware-export toggle, lifecycle signals) rather than the
//! raw lifecycle methods.

pub mod bridge;
pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod jack_callback;
pub mod port;
pub mod reconciler;
pub mod registry;
pub mod remote_control;
pub mod ring;
pub mod seq_client;
pub mod seq_input;
pub mod seq_output;
pub mod signal;
pub mod time;
