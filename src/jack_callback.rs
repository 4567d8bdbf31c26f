//! The realtime side: `jack::ProcessHandler` and the notification
//! handler registered alongside it via `client.activate_async`.
//!
//! Everything in `process()` runs on jack's realtime thread. No
//! allocation, no locks, no blocking syscalls: new ports and
//! deletions move through `crossbeam_channel` (`try_recv`/`try_send`,
//! never `recv`), a Port's `dead` flag is a plain atomic load, and the
//! scratch buffers used to stage ring-buffer reads are pre-sized once
//! at construction and reused every cycle.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{trace, warn};

use crate::constants::MAX_EVENT_SIZE;
use crate::event::{AlsaAddr, ArrayPayload, DeliveryEvent, InboundHeader};
use crate::port::Port;
use crate::registry::PortRegistry;
use crate::ring::RingFifo;
use crate::time::intra_cycle_offset;

pub type CapturePort = Port<jack::Port<jack::MidiOut>>;
pub type PlaybackPort = Port<jack::Port<jack::MidiIn>>;

/// Shared with the seq input worker so it can stamp incoming events
/// with a recent frame time without calling into the jack client from
/// a non-realtime thread. Updated once per cycle, at the very top of
/// `process()`, before the freewheel check.
pub type CycleStartCell = Arc<AtomicU32>;

/// Largest possible framed record (header + payload) the inbound ring
/// ever carries. Sized once so `BridgeProcessHandler` can stage a peek
/// into a fixed buffer instead of allocating per event.
const RECORD_SCRATCH_SIZE: usize = InboundHeader::WIRE_SIZE + MAX_EVENT_SIZE;

pub struct BridgeProcessHandler {
    capture: PortRegistry<jack::Port<jack::MidiOut>>,
    playback: PortRegistry<jack::Port<jack::MidiIn>>,
    capture_new_rx: Receiver<CapturePort>,
    playback_new_rx: Receiver<PlaybackPort>,
    capture_dead_tx: Sender<CapturePort>,
    playback_dead_tx: Sender<PlaybackPort>,
    outbound_tx: Sender<DeliveryEvent>,
    wake_tx: Sender<()>,
    cycle_start: CycleStartCell,
    freewheeling: Arc<AtomicBool>,
    /// Reused every cycle by `drain_capture_ports` to stage a peeked
    /// record; never reallocated.
    record_scratch: [u8; RECORD_SCRATCH_SIZE],
    /// Reused every cycle by `detach_dead`; cleared and refilled, never
    /// reallocated as long as the number of dead ports in one cycle
    /// stays within `MAX_PORTS`.
    dead_scratch: Vec<AlsaAddr>,
}

impl BridgeProcessHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capture_new_rx: Receiver<CapturePort>,
        playback_new_rx: Receiver<PlaybackPort>,
        capture_dead_tx: Sender<CapturePort>,
        playback_dead_tx: Sender<PlaybackPort>,
        outbound_tx: Sender<DeliveryEvent>,
        wake_tx: Sender<()>,
        cycle_start: CycleStartCell,
        freewheeling: Arc<AtomicBool>,
    ) -> Self {
        BridgeProcessHandler {
            capture: PortRegistry::new(),
            playback: PortRegistry::new(),
            capture_new_rx,
            playback_new_rx,
            capture_dead_tx,
            playback_dead_tx,
            outbound_tx,
            wake_tx,
            cycle_start,
            freewheeling,
            record_scratch: [0u8; RECORD_SCRATCH_SIZE],
            dead_scratch: Vec::with_capacity(crate::constants::MAX_PORTS),
        }
    }
}

impl jack::ProcessHandler for BridgeProcessHandler {
    fn process(&mut self, _client: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        let cycle_start = ps.last_frame_time();
        self.cycle_start.store(cycle_start, Ordering::Release);

        if self.freewheeling.load(Ordering::Acquire) {
            return jack::Control::Continue;
        }

        let period_size = ps.n_frames();

        while let Ok(port) = self.capture_new_rx.try_recv() {
            self.capture.insert(port);
        }
        while let Ok(port) = self.playback_new_rx.try_recv() {
            self.playback.insert(port);
        }

        drain_capture_ports(&mut self.capture, ps, cycle_start, period_size, &mut self.record_scratch);

        let mut any_outbound = false;
        drain_playback_ports(&mut self.playback, ps, cycle_start, &self.outbound_tx, &mut any_outbound);

        detach_dead(&mut self.capture, &self.capture_dead_tx, &mut self.dead_scratch);
        detach_dead(&mut self.playback, &self.playback_dead_tx, &mut self.dead_scratch);

        if any_outbound {
            let _ = self.wake_tx.try_send(());
        }

        jack::Control::Continue
    }
}

/// Pops the next capture-side record that has become due from
/// `inbound` into `scratch`, advancing the ring past it. Returns the
/// write offset and total record length, or `None` without advancing
/// if the front of the ring is empty or not yet due. Pure over
/// `RingFifo`, no jack types involved, so it's directly testable.
fn pop_due_record(inbound: &RingFifo, cycle_start: u32, period_size: u32, scratch: &mut [u8]) -> Option<(u32, usize)> {
    let mut header_buf = [0u8; InboundHeader::WIRE_SIZE];
    if inbound.peek(&mut header_buf) < InboundHeader::WIRE_SIZE {
        return None;
    }
    let header = InboundHeader::from_bytes(header_buf);
    let offset = intra_cycle_offset(header.frame_time, cycle_start, period_size)?;
    let total = InboundHeader::WIRE_SIZE + header.size as usize;
    if total > scratch.len() {
        warn!("capture record of {total} bytes exceeds scratch buffer, dropping");
        inbound.read_advance(total.min(inbound.read_space()));
        return None;
    }
    if inbound.peek(&mut scratch[..total]) < total {
        return None;
    }
    inbound.read_advance(total);
    Some((offset, total))
}

fn drain_capture_ports(
    registry: &mut PortRegistry<jack::Port<jack::MidiOut>>,
    ps: &jack::ProcessScope,
    cycle_start: u32,
    period_size: u32,
    scratch: &mut [u8],
) {
    for port in registry.iter_mut() {
        let Some(handle) = port.jack_handle.as_mut() else { continue };
        let Some(inbound) = port.inbound.as_ref() else { continue };
        let mut writer = handle.writer(ps);
        while let Some((offset, total)) = pop_due_record(inbound, cycle_start, period_size, scratch) {
            let payload = &scratch[InboundHeader::WIRE_SIZE..total];
            if writer.write(&jack::RawMidi { time: offset, bytes: payload }).is_err() {
                warn!("jack midi buffer full, dropping event for {}", port.remote);
            }
        }
    }
}

fn drain_playback_ports(
    registry: &mut PortRegistry<jack::Port<jack::MidiIn>>,
    ps: &jack::ProcessScope,
    cycle_start: u32,
    outbound_tx: &Sender<DeliveryEvent>,
    any_outbound: &mut bool,
) {
    for port in registry.iter_mut() {
        let Some(handle) = port.jack_handle.as_ref() else { continue };
        for raw in handle.iter(ps) {
            let event = DeliveryEvent {
                frame: cycle_start as u64 + raw.time as u64,
                remote: port.remote,
                payload: ArrayPayload::from_slice(raw.bytes),
            };
            match outbound_tx.try_send(event) {
                Ok(()) => *any_outbound = true,
                Err(TrySendError::Full(_)) => {
                    warn!("outbound fifo full, dropping playback event from {}", port.remote);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

/// Moves every dead port out of `registry` and onto `dead_tx`, reusing
/// `scratch` to stage the addresses to remove instead of allocating a
/// fresh `Vec` every cycle.
fn detach_dead<H>(registry: &mut PortRegistry<H>, dead_tx: &Sender<Port<H>>, scratch: &mut Vec<AlsaAddr>) {
    scratch.clear();
    scratch.extend(registry.iter().filter(|p| p.is_dead()).map(|p| p.remote));
    for addr in scratch.drain(..) {
        let Some(port) = registry.remove(addr) else { continue };
        match dead_tx.try_send(port) {
            Ok(()) => {}
            Err(TrySendError::Full(port)) => {
                trace!("deletions fifo full, leaving {addr} for next cycle");
                registry.insert(port);
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("deletions fifo disconnected, dropping dead port for {addr} without teardown");
            }
        }
    }
}

/// Freewheel/shutdown notifications. Registered alongside
/// `BridgeProcessHandler` via `client.activate_async`.
pub struct Notifications {
    pub freewheeling: Arc<AtomicBool>,
    pub stop: Arc<AtomicBool>,
}

impl jack::NotificationHandler for Notifications {
    fn freewheel(&mut self, _client: &jack::Client, is_enabled: bool) {
        self.freewheeling.store(is_enabled, Ordering::Release);
    }

    fn shutdown(&mut self, _status: jack::ClientStatus, reason: &str) {
        log::warn!("jack server shut down ({reason}), requesting bridge stop");
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::event::Direction;

    fn push_record(ring: &RingFifo, frame_time: u32, payload: &[u8]) {
        let header = InboundHeader { frame_time, size: payload.len() as u16 };
        let mut record = header.to_bytes().to_vec();
        record.extend_from_slice(payload);
        assert!(ring.write(&record));
    }

    #[test]
    fn pop_due_record_copies_and_advances_when_due() {
        let ring = RingFifo::new(256);
        push_record(&ring, 1000, &[0x90, 0x40, 0x7f]);
        let mut scratch = [0u8; RECORD_SCRATCH_SIZE];
        let (offset, total) = pop_due_record(&ring, 1024, 128, &mut scratch).expect("record is due");
        assert_eq!(offset, 104);
        assert_eq!(&scratch[InboundHeader::WIRE_SIZE..total], &[0x90, 0x40, 0x7f]);
        assert_eq!(ring.read_space(), 0);
    }

    #[test]
    fn pop_due_record_leaves_not_yet_due_event_in_place() {
        let ring = RingFifo::new(256);
        push_record(&ring, 2000, &[0x90, 0x40, 0x7f]);
        let mut scratch = [0u8; RECORD_SCRATCH_SIZE];
        assert!(pop_due_record(&ring, 1024, 128, &mut scratch).is_none());
        assert_eq!(ring.read_space(), InboundHeader::WIRE_SIZE + 3);
    }

    #[test]
    fn pop_due_record_drains_a_burst_in_frame_order() {
        // S5-style burst: fill the ring with many small due events and
        // confirm every one is popped in FIFO order with no corruption.
        let ring = RingFifo::new(16 * 1024);
        let count = 64;
        for i in 0..count {
            push_record(&ring, i, &[i as u8, 0, 0]);
        }
        let mut scratch = [0u8; RECORD_SCRATCH_SIZE];
        for i in 0..count {
            let (_, total) = pop_due_record(&ring, u32::MAX / 2, 128, &mut scratch).expect("all events are due");
            assert_eq!(scratch[InboundHeader::WIRE_SIZE], i as u8);
            let _ = total;
        }
        assert!(pop_due_record(&ring, u32::MAX / 2, 128, &mut scratch).is_none());
    }

    fn port_with_dead_flag(addr: AlsaAddr, dead: bool) -> Port<u32> {
        let flag = Arc::new(AtomicBool::new(dead));
        Port::new(addr, Direction::Capture, "x".into(), 0, flag)
    }

    #[test]
    fn detach_dead_moves_only_dead_ports_without_allocating_per_call() {
        let mut registry: PortRegistry<u32> = PortRegistry::new();
        let live = AlsaAddr::new(1, 0);
        let dead = AlsaAddr::new(2, 0);
        registry.insert(port_with_dead_flag(live, false));
        registry.insert(port_with_dead_flag(dead, true));

        let (tx, rx) = crossbeam_channel::bounded(8);
        let mut scratch = Vec::with_capacity(4);
        detach_dead(&mut registry, &tx, &mut scratch);

        assert!(registry.find(live).is_some());
        assert!(registry.find(dead).is_none());
        let removed = rx.try_recv().expect("dead port forwarded");
        assert_eq!(removed.remote, dead);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn detach_dead_requeues_port_when_channel_is_full() {
        let mut registry: PortRegistry<u32> = PortRegistry::new();
        let addr = AlsaAddr::new(3, 0);
        registry.insert(port_with_dead_flag(addr, true));

        let (tx, _rx) = crossbeam_channel::bounded(0); // never drained, stays full
        let mut scratch = Vec::new();
        detach_dead(&mut registry, &tx, &mut scratch);

        assert!(registry.find(addr).is_some(), "port stays in registry for retry next cycle");
    }

    #[test]
    fn detach_dead_drops_silently_logged_when_disconnected() {
        let mut registry: PortRegistry<u32> = PortRegistry::new();
        let addr = AlsaAddr::new(4, 0);
        registry.insert(port_with_dead_flag(addr, true));

        let (tx, rx) = crossbeam_channel::bounded(8);
        drop(rx);
        let mut scratch = Vec::new();
        detach_dead(&mut registry, &tx, &mut scratch);

        assert!(registry.find(addr).is_none());
    }
}
