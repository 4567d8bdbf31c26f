//! A single mirrored endpoint, on either side of the bridge.
//!
//! `Port<H>` is generic over the JACK handle type (`jack::Port<jack::
//! MidiOut>` for Capture, `jack::Port<jack::MidiIn>` for Playback)
//! rather than an enum over the two, so direction-specific code (the
//! capture and playback halves of the realtime callback) can each work
//! with a concretely-typed registry instead of matching out a variant
//! on every access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::constants::INBOUND_FIFO_CAPACITY;
use crate::event::{AlsaAddr, Direction};
use crate::ring::RingFifo;

/// A mirrored endpoint. See module docs for why this is generic.
pub struct Port<H> {
    pub remote: AlsaAddr,
    pub direction: Direction,
    pub display_name: String,
    /// Present once the jack callback has created the underlying jack
    /// port; absent only during the brief window before the first
    /// cycle after announcement picks it up from `new_ports`.
    pub jack_handle: Option<H>,
    /// Capture-only: postponed events awaiting a cycle whose
    /// `cycle_start` has caught up to their stamped frame time. `None`
    /// for Playback ports. Shared with `InboundTable` so the seq input
    /// worker can append to it without touching the registry the jack
    /// realtime thread owns; the ring itself is lock-free, so sharing
    /// the `Arc` costs the realtime side nothing.
    pub inbound: Option<Arc<RingFifo>>,
    /// Shared with `DeadFlagTable` so the seq input worker and the
    /// reconciler can flag a Port dead without touching the registry
    /// the jack realtime thread owns.
    pub dead: Arc<AtomicBool>,
}

impl<H> Port<H> {
    pub fn new(remote: AlsaAddr, direction: Direction, display_name: String, handle: H, dead: Arc<AtomicBool>) -> Self {
        let inbound = match direction {
            Direction::Capture => Some(Arc::new(RingFifo::new(INBOUND_FIFO_CAPACITY))),
            Direction::Playback => None,
        };
        Port {
            remote,
            direction,
            display_name,
            jack_handle: Some(handle),
            inbound,
            dead,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }
}

/// Lookup from (remote address, direction) to the dead-flag shared with
/// the matching live Port, if any. Populated and cleared only by the
/// reconciler (on creation and on destruction); read and written by the
/// seq input worker when it learns of a `PORT_EXIT`/capability change.
/// Never touched by the jack realtime thread, which only ever loads its
/// own Port's flag directly -- keeps the realtime callback lock-free.
pub type DeadFlagTable = Mutex<HashMap<(AlsaAddr, Direction), Arc<AtomicBool>>>;

pub fn new_dead_flag_table() -> DeadFlagTable {
    Mutex::new(HashMap::new())
}

/// Lookup from a capture Port's remote address to its inbound ring.
/// Same sharing rationale as `DeadFlagTable`: populated/cleared by the
/// reconciler, read by the seq input worker, never locked by the jack
/// realtime thread (which holds its own `Arc` clone inside the Port
/// living in its own registry).
pub type InboundTable = Mutex<HashMap<AlsaAddr, Arc<RingFifo>>>;

pub fn new_inbound_table() -> InboundTable {
    Mutex::new(HashMap::new())
}

/// One entry of `PortNameTable`: the jack display name assigned at
/// creation plus the remote names it was built from, so the reverse
/// lookup (`map_jack_port_to_alsa`) doesn't need to re-query the seq
/// side after the Port may already be gone.
#[derive(Debug, Clone)]
pub struct PortNameEntry {
    pub jack_name: String,
    pub remote_client_name: String,
    pub remote_port_name: String,
}

/// Lookup from (remote address, direction) to its name entry, used
/// only by `RemoteControl`'s `map_alsa_to_jack_port`/
/// `map_jack_port_to_alsa`; not touched by either realtime-adjacent
/// worker.
pub type PortNameTable = Mutex<HashMap<(AlsaAddr, Direction), PortNameEntry>>;

pub fn new_port_name_table() -> PortNameTable {
    Mutex::new(HashMap::new())
}

/// Build the jack port display name: `"<client> (<capture|playback>):
/// <port>"`, with every character that is not alphanumeric and not one
/// of `( ) :` replaced by a space, then truncated to jack's port name
/// length limit.
///
/// Grounded on `port.c`'s name-building loop; standardized on replacing
/// with space rather than `-` per the spec's Open Questions resolution.
pub fn display_name(remote_client_name: &str, direction: Direction, remote_port_name: &str) -> String {
    let raw = format!("{} ({}): {}", remote_client_name, direction.label(), remote_port_name);
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '(' | ')' | ':') {
                c
            } else {
                ' '
            }
        })
        .collect();
    truncate_to_jack_limit(&sanitized)
}

/// JACK port names are limited to 319 bytes (`jack_port_name_size() -
/// 1` on contemporary JACK). Truncate on a char boundary.
const JACK_PORT_NAME_LIMIT: usize = 319;

fn truncate_to_jack_limit(name: &str) -> String {
    if name.len() <= JACK_PORT_NAME_LIMIT {
        return name.to_string();
    }
    let mut end = JACK_PORT_NAME_LIMIT;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_offending_characters_to_space() {
        let name = display_name("USB MIDI [hw:1,0,0]", Direction::Capture, "port/1");
        assert_eq!(name, "USB MIDI  hw:1 0 0  (capture): port 1");
    }

    #[test]
    fn keeps_parens_colons_and_alnum() {
        let name = display_name("Foo", Direction::Playback, "Bar (2):Baz");
        assert_eq!(name, "Foo (playback): Bar (2):Baz");
    }

    #[test]
    fn truncates_overlong_names() {
        let long = "x".repeat(1000);
        let name = display_name(&long, Direction::Capture, "p");
        assert!(name.len() <= JACK_PORT_NAME_LIMIT);
    }
}
