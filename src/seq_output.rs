//! Seq output worker: sorts queued playback events by origin time,
//! sleeps until each is due, and emits it on the seq side.
//!
//! Runs at normal priority on its own thread, woken by the coalesced
//! token the jack callback posts after enqueuing at least one event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::constants::{OUTPUT_SLEEP_THRESHOLD, OUTPUT_WAKE_POLL};
use crate::event::{AlsaAddr, DeliveryEvent};
use crate::seq_client::SeqClient;
use crate::time::frames_to_nanos;

pub struct SeqOutputWorker {
    seq: Arc<SeqClient>,
    outbound_rx: Receiver<DeliveryEvent>,
    wake_rx: Receiver<()>,
    sample_rate: u32,
    /// Wall-clock instant corresponding to jack frame 0, i.e. the
    /// moment the jack client activated. Lets the worker turn an
    /// absolute frame-derived nanosecond stamp into a sleep deadline
    /// without the realtime callback ever touching a clock.
    activation: Instant,
    stop: Arc<AtomicBool>,
}

impl SeqOutputWorker {
    pub fn new(
        seq: Arc<SeqClient>,
        outbound_rx: Receiver<DeliveryEvent>,
        wake_rx: Receiver<()>,
        sample_rate: u32,
        activation: Instant,
        stop: Arc<AtomicBool>,
    ) -> Self {
        SeqOutputWorker { seq, outbound_rx, wake_rx, sample_rate, activation, stop }
    }

    /// Run until `stop` is observed.
    pub fn run(&mut self) {
        let mut last_delivered: HashMap<AlsaAddr, u64> = HashMap::new();
        while !self.stop.load(Ordering::Acquire) {
            match self.wake_rx.recv_timeout(OUTPUT_WAKE_POLL) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let mut batch: Vec<DeliveryEvent> = Vec::new();
            while let Ok(event) = self.outbound_rx.try_recv() {
                batch.push(event);
            }
            if batch.is_empty() {
                continue;
            }
            // Defends against the jack callback emitting events from
            // distinct Ports in an order unrelated to their intra-period
            // offsets.
            batch.sort_by_key(|e| e.frame);

            for event in batch {
                self.emit(event, &mut last_delivered);
            }
            self.seq.drain_output();
        }
    }

    fn emit(&self, event: DeliveryEvent, last_delivered: &mut HashMap<AlsaAddr, u64>) {
        let absolute_nanos = frames_to_nanos(event.frame, self.sample_rate);
        let effective = effective_delivery_nanos(last_delivered, event.remote, absolute_nanos);

        let deadline = self.activation + std::time::Duration::from_nanos(effective);
        let now = Instant::now();
        if deadline > now {
            let remaining = deadline - now;
            if remaining > OUTPUT_SLEEP_THRESHOLD {
                thread::sleep(remaining);
            }
        }
        self.seq.send_midi(event.remote, event.payload.as_slice());
    }
}

/// Clamps `absolute_nanos` to be no earlier than the last nanosecond
/// delivered for `remote`, then records the result as the new
/// high-water mark. Guarantees strictly monotonic delivery order per
/// remote port even if two events from different Ports arrive with
/// out-of-order absolute timestamps within the same batch.
fn effective_delivery_nanos(last_delivered: &mut HashMap<AlsaAddr, u64>, remote: AlsaAddr, absolute_nanos: u64) -> u64 {
    let effective = match last_delivered.get(&remote) {
        Some(&prev) => absolute_nanos.max(prev),
        None => absolute_nanos,
    };
    last_delivered.insert(remote, effective);
    effective
}
