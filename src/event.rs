//! Wire-level types shared by both directions: the ALSA sequencer
//! client/port pair that identifies a remote endpoint, and the two
//! event records that carry MIDI payloads across the realtime boundary.

use crate::constants::MAX_EVENT_SIZE;

/// The ALSA sequencer identity of a remote endpoint: (client, port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlsaAddr {
    pub client: u8,
    pub port: u8,
}

impl AlsaAddr {
    pub fn new(client: u8, port: u8) -> Self {
        AlsaAddr { client, port }
    }
}

impl std::fmt::Display for AlsaAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.client, self.port)
    }
}

/// Which way MIDI flows for a mirrored port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// seq -> jack.
    Capture,
    /// jack -> seq.
    Playback,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Capture => "capture",
            Direction::Playback => "playback",
        }
    }
}

/// A postponed capture-side event sitting in a Port's inbound ring,
/// waiting for a jack cycle whose `cycle_start` has caught up to it.
///
/// Serialized as a fixed 6-byte header (`frame_time` then `size`,
/// little-endian) immediately followed by `size` payload bytes, which
/// is what actually lives in the ring buffer.
#[derive(Debug, Clone, Copy)]
pub struct InboundHeader {
    pub frame_time: u32,
    pub size: u16,
}

impl InboundHeader {
    pub const WIRE_SIZE: usize = 6;

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..4].copy_from_slice(&self.frame_time.to_le_bytes());
        out[4..6].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; Self::WIRE_SIZE]) -> Self {
        InboundHeader {
            frame_time: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            size: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
        }
    }
}

/// One pending playback-side message, produced by the jack realtime
/// callback and consumed by the seq output worker. `port` identifies
/// the originating Port by its remote address rather than borrowing it
/// directly, since the event must outlive a single callback invocation
/// and the registry is mutated by the callback thread only.
#[derive(Debug, Clone)]
pub struct DeliveryEvent {
    /// jack frame counter at the start of the cycle that produced this
    /// event, plus the event's intra-cycle offset -- i.e. the absolute
    /// frame this message was generated at.
    pub frame: u64,
    /// Remote address of the Port this event came from.
    pub remote: AlsaAddr,
    pub payload: ArrayPayload,
}

/// An inline, fixed-capacity copy of a MIDI message. Avoids allocating
/// on the realtime thread.
#[derive(Debug, Clone)]
pub struct ArrayPayload {
    bytes: [u8; MAX_EVENT_SIZE],
    len: usize,
}

impl ArrayPayload {
    pub fn from_slice(data: &[u8]) -> Self {
        let len = data.len().min(MAX_EVENT_SIZE);
        let mut bytes = [0u8; MAX_EVENT_SIZE];
        bytes[..len].copy_from_slice(&data[..len]);
        ArrayPayload { bytes, len }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let h = InboundHeader { frame_time: 123_456, size: 3 };
        let back = InboundHeader::from_bytes(h.to_bytes());
        assert_eq!(back.frame_time, 123_456);
        assert_eq!(back.size, 3);
    }

    #[test]
    fn payload_truncates_at_max_event_size() {
        let data = vec![7u8; MAX_EVENT_SIZE + 10];
        let p = ArrayPayload::from_slice(&data);
        assert_eq!(p.as_slice().len(), MAX_EVENT_SIZE);
    }
}
