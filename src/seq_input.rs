//! Seq input worker: blocking read of seq events, dispatching topology
//! announcements to the reconciler and MIDI events into the matching
//! capture Port's inbound ring.
//!
//! Runs at normal (non-realtime) priority on its own thread. Never
//! touches the jack-owned registries directly: port lookups go through
//! `InboundTable`/`DeadFlagTable`, the same lock-free-for-the-realtime-
//! side sharing used by the reconciler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, trace, warn};

use crate::codec::fixup_note_on_zero_velocity;
use crate::constants::INPUT_POLL_TIMEOUT;
use crate::event::{AlsaAddr, Direction, InboundHeader};
use crate::jack_callback::CycleStartCell;
use crate::port::{DeadFlagTable, InboundTable};
use crate::seq_client::{SeqClient, SeqEvent, TopologyEvent};

pub struct SeqInputWorker {
    seq: Arc<SeqClient>,
    additions_tx: Sender<AlsaAddr>,
    dead_flags: Arc<DeadFlagTable>,
    inbound_table: Arc<InboundTable>,
    cycle_start: CycleStartCell,
    stop: Arc<AtomicBool>,
}

impl SeqInputWorker {
    pub fn new(
        seq: Arc<SeqClient>,
        additions_tx: Sender<AlsaAddr>,
        dead_flags: Arc<DeadFlagTable>,
        inbound_table: Arc<InboundTable>,
        cycle_start: CycleStartCell,
        stop: Arc<AtomicBool>,
    ) -> Self {
        SeqInputWorker { seq, additions_tx, dead_flags, inbound_table, cycle_start, stop }
    }

    /// Run until `stop` is observed.
    pub fn run(&mut self) {
        while !self.stop.load(Ordering::Acquire) {
            let should_stop = || self.stop.load(Ordering::Acquire);
            if !self.seq.wait_for_input(INPUT_POLL_TIMEOUT, &should_stop) {
                continue;
            }
            for event in self.seq.drain_input() {
                match event {
                    SeqEvent::Topology(TopologyEvent::PortStart(addr) | TopologyEvent::PortChange(addr)) => {
                        let _ = self.additions_tx.try_send(addr);
                    }
                    SeqEvent::Topology(TopologyEvent::PortExit(addr)) => {
                        self.mark_dead(addr);
                    }
                    SeqEvent::Midi { source, mut bytes } => {
                        self.handle_midi(source, &mut bytes);
                    }
                }
            }
        }
    }

    fn mark_dead(&self, addr: AlsaAddr) {
        mark_dead_in_table(&self.dead_flags, addr);
    }

    fn handle_midi(&self, source: AlsaAddr, bytes: &mut Vec<u8>) {
        let Some(ring) = self.inbound_table.lock().unwrap().get(&source).cloned() else {
            trace!("midi from unmirrored source {source}, dropping");
            return;
        };
        if fixup_note_on_zero_velocity(bytes) {
            debug!("applied zero-velocity note-on fixup for {source}");
        }
        let frame_time = self.cycle_start.load(Ordering::Acquire);
        let record = frame_inbound_record(bytes, frame_time);
        if !enqueue_inbound(&ring, &record) {
            warn!("inbound fifo full for {source}, dropping event");
        }
    }
}

/// Flips every direction's dead flag tracked for `addr`, if any is
/// currently tracked. Pulled out of `SeqInputWorker` so it can be
/// driven directly against a bare `DeadFlagTable` in tests.
fn mark_dead_in_table(dead_flags: &DeadFlagTable, addr: AlsaAddr) {
    let flags = dead_flags.lock().unwrap();
    for direction in [Direction::Capture, Direction::Playback] {
        if let Some(flag) = flags.get(&(addr, direction)) {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Builds the wire record (header followed by payload) staged into a
/// capture Port's inbound ring.
fn frame_inbound_record(bytes: &[u8], frame_time: u32) -> Vec<u8> {
    let header = InboundHeader { frame_time, size: bytes.len() as u16 };
    let mut record = header.to_bytes().to_vec();
    record.extend_from_slice(bytes);
    record
}

/// Writes `record` to `ring` if there's room. Returns `false` on
/// overflow, leaving the ring untouched; the caller logs the drop.
fn enqueue_inbound(ring: &RingFifo, record: &[u8]) -> bool {
    if ring.write_space() < record.len() {
        return false;
    }
    ring.write(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::INBOUND_FIFO_CAPACITY;
    use crate::port::new_dead_flag_table;

    #[test]
    fn mark_dead_flips_both_directions_when_tracked() {
        let table = new_dead_flag_table();
        let addr = AlsaAddr::new(1, 0);
        let capture_flag = Arc::new(AtomicBool::new(false));
        let playback_flag = Arc::new(AtomicBool::new(false));
        table.lock().unwrap().insert((addr, Direction::Capture), capture_flag.clone());
        table.lock().unwrap().insert((addr, Direction::Playback), playback_flag.clone());

        mark_dead_in_table(&table, addr);

        assert!(capture_flag.load(Ordering::Acquire));
        assert!(playback_flag.load(Ordering::Acquire));
    }

    #[test]
    fn mark_dead_is_a_no_op_for_untracked_address() {
        let table = new_dead_flag_table();
        // Should not panic even though nothing is registered.
        mark_dead_in_table(&table, AlsaAddr::new(9, 9));
    }

    #[test]
    fn frame_inbound_record_prefixes_header_before_payload() {
        let record = frame_inbound_record(&[0x90, 0x40, 0x7f], 42);
        assert_eq!(record.len(), InboundHeader::WIRE_SIZE + 3);
        let header = InboundHeader::from_bytes(record[..InboundHeader::WIRE_SIZE].try_into().unwrap());
        assert_eq!(header.frame_time, 42);
        assert_eq!(header.size, 3);
        assert_eq!(&record[InboundHeader::WIRE_SIZE..], &[0x90, 0x40, 0x7f]);
    }

    #[test]
    fn enqueue_inbound_drops_on_overflow_without_partial_write() {
        let ring = RingFifo::new(8);
        let big = vec![0u8; 100];
        assert!(!enqueue_inbound(&ring, &big));
        assert_eq!(ring.read_space(), 0);
    }

    #[test]
    fn enqueue_inbound_writes_when_there_is_room() {
        let ring = RingFifo::new(INBOUND_FIFO_CAPACITY);
        let record = frame_inbound_record(&[0x80, 0x40, 0x00], 7);
        assert!(enqueue_inbound(&ring, &record));
        assert_eq!(ring.read_space(), record.len());
    }
}
