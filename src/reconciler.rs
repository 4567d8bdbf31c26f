//! Non-realtime topology reconciliation loop.
//!
//! Turns seq-side port announcements into jack port creation/teardown,
//! applying the capability and hardware-export filters. Runs on the
//! main/reconciler thread, ticking every `RECONCILER_TICK` or whenever
//! `additions_fifo` has work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::constants::RECONCILER_TICK;
use crate::event::{AlsaAddr, Direction};
use crate::jack_callback::{BridgeProcessHandler, CapturePort, Notifications, PlaybackPort};
use crate::port::{DeadFlagTable, InboundTable, PortNameEntry, PortNameTable};
use crate::seq_client::{RemoteDescriptor, SeqClient};

type AsyncJack = jack::AsyncClient<Notifications, BridgeProcessHandler>;

pub struct Reconciler {
    seq: Arc<SeqClient>,
    /// Weak: the reconciler must never be the thing keeping the jack
    /// client alive. `Bridge::stop` needs sole ownership of the `Arc`
    /// to deactivate the client before joining this thread, so this
    /// thread only ever borrows it for the duration of a single port
    /// create/destroy call, upgrading on demand.
    jack: Weak<AsyncJack>,
    additions_rx: Receiver<AlsaAddr>,
    capture_dead_rx: Receiver<CapturePort>,
    playback_dead_rx: Receiver<PlaybackPort>,
    capture_new_tx: Sender<CapturePort>,
    playback_new_tx: Sender<PlaybackPort>,
    dead_flags: Arc<DeadFlagTable>,
    inbound_table: Arc<InboundTable>,
    port_names: Arc<PortNameTable>,
    export_hw: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

/// What a capability/tracked-state pair means for a given direction.
/// Pulled out of `reconcile_capture`/`reconcile_playback` as a pure
/// function so it's testable without a seq or jack client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapabilityAction {
    Create,
    MarkDead,
    NoOp,
}

fn capability_action(capable: bool, tracked: bool) -> CapabilityAction {
    match (capable, tracked) {
        (true, false) => CapabilityAction::Create,
        (false, true) => CapabilityAction::MarkDead,
        _ => CapabilityAction::NoOp,
    }
}

/// Whether a remote port should be retired outright (both directions
/// torn down) rather than reconciled per-direction. Pure function over
/// `RemoteDescriptor`'s plain fields, testable without ALSA.
fn should_retire_on_sight(desc: &RemoteDescriptor, export_hw: bool) -> bool {
    desc.port_type_is_zero || desc.no_export || (desc.is_hardware && !export_hw)
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seq: Arc<SeqClient>,
        jack: Weak<AsyncJack>,
        additions_rx: Receiver<AlsaAddr>,
        capture_dead_rx: Receiver<CapturePort>,
        playback_dead_rx: Receiver<PlaybackPort>,
        capture_new_tx: Sender<CapturePort>,
        playback_new_tx: Sender<PlaybackPort>,
        dead_flags: Arc<DeadFlagTable>,
        inbound_table: Arc<InboundTable>,
        port_names: Arc<PortNameTable>,
        export_hw: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Reconciler {
            seq,
            jack,
            additions_rx,
            capture_dead_rx,
            playback_dead_rx,
            capture_new_tx,
            playback_new_tx,
            dead_flags,
            inbound_table,
            port_names,
            export_hw,
            stop,
        }
    }

    /// Run until `stop` is observed. Intended to be the body of the
    /// main/reconciler thread.
    pub fn run(&mut self) {
        for addr in self.seq.all_ports() {
            self.process_address(addr);
        }
        while !self.stop.load(Ordering::Acquire) {
            self.drain_dead();
            match self.additions_rx.recv_timeout(RECONCILER_TICK) {
                Ok(addr) => self.process_address(addr),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.drain_dead();
    }

    fn drain_dead(&mut self) {
        while let Ok(port) = self.capture_dead_rx.try_recv() {
            self.destroy_capture(port);
        }
        while let Ok(port) = self.playback_dead_rx.try_recv() {
            self.destroy_playback(port);
        }
    }

    fn destroy_capture(&mut self, port: CapturePort) {
        info!("destroying capture port for {}", port.remote);
        self.seq.unsubscribe_from(port.remote);
        self.dead_flags.lock().unwrap().remove(&(port.remote, Direction::Capture));
        self.port_names.lock().unwrap().remove(&(port.remote, Direction::Capture));
        self.inbound_table.lock().unwrap().remove(&port.remote);
        self.unregister(port.remote, port.jack_handle);
    }

    fn destroy_playback(&mut self, port: PlaybackPort) {
        info!("destroying playback port for {}", port.remote);
        self.seq.unsubscribe_to(port.remote);
        self.dead_flags.lock().unwrap().remove(&(port.remote, Direction::Playback));
        self.port_names.lock().unwrap().remove(&(port.remote, Direction::Playback));
        self.unregister(port.remote, port.jack_handle);
    }

    /// Explicitly unregisters a jack port handle: `jack::Port<T>` has no
    /// `Drop` impl that does this, `Client::unregister_port` is the
    /// only way to remove a single port from a running client.
    fn unregister<PS: jack::PortSpec>(&self, remote: AlsaAddr, handle: Option<jack::Port<PS>>) {
        let Some(handle) = handle else { return };
        match self.jack.upgrade() {
            Some(client) => {
                if let Err(err) = client.as_client().unregister_port(handle) {
                    warn!("failed to unregister jack port for {remote}: {err}");
                }
            }
            None => debug!("jack client already gone, skipping unregister for {remote}"),
        }
    }

    fn process_address(&mut self, addr: AlsaAddr) {
        let Some(desc) = self.seq.describe(addr) else {
            self.retire_both(addr);
            return;
        };
        if should_retire_on_sight(&desc, self.export_hw.load(Ordering::Acquire)) {
            self.retire_both(addr);
            return;
        }
        self.reconcile_capture(addr, &desc);
        self.reconcile_playback(addr, &desc);
    }

    fn retire_both(&mut self, addr: AlsaAddr) {
        self.mark_dead_if_tracked(addr, Direction::Capture);
        self.mark_dead_if_tracked(addr, Direction::Playback);
    }

    fn mark_dead_if_tracked(&self, addr: AlsaAddr, direction: Direction) {
        if let Some(flag) = self.dead_flags.lock().unwrap().get(&(addr, direction)) {
            flag.store(true, Ordering::Release);
        }
    }

    fn is_tracked(&self, addr: AlsaAddr, direction: Direction) -> bool {
        self.dead_flags.lock().unwrap().contains_key(&(addr, direction))
    }

    fn reconcile_capture(&mut self, addr: AlsaAddr, desc: &RemoteDescriptor) {
        let tracked = self.is_tracked(addr, Direction::Capture);
        match capability_action(desc.readable, tracked) {
            CapabilityAction::Create => {
                if let Some(port) = self.create_capture(addr, desc) {
                    let _ = self.capture_new_tx.try_send(port);
                }
            }
            CapabilityAction::MarkDead => self.mark_dead_if_tracked(addr, Direction::Capture),
            CapabilityAction::NoOp => {}
        }
    }

    fn reconcile_playback(&mut self, addr: AlsaAddr, desc: &RemoteDescriptor) {
        let tracked = self.is_tracked(addr, Direction::Playback);
        match capability_action(desc.writable, tracked) {
            CapabilityAction::Create => {
                if let Some(port) = self.create_playback(addr, desc) {
                    let _ = self.playback_new_tx.try_send(port);
                }
            }
            CapabilityAction::MarkDead => self.mark_dead_if_tracked(addr, Direction::Playback),
            CapabilityAction::NoOp => {}
        }
    }

    fn create_capture(&mut self, addr: AlsaAddr, desc: &RemoteDescriptor) -> Option<CapturePort> {
        let client = self.jack.upgrade()?;
        let display = crate::port::display_name(&desc.client_name, Direction::Capture, &desc.port_name);
        let handle = match client.as_client().register_port(&display, jack::MidiOut::default()) {
            Ok(p) => p,
            Err(err) => {
                warn!("failed to register jack capture port for {addr}: {err}");
                return None;
            }
        };
        if let Err(err) = self.seq.subscribe_from(addr) {
            warn!("failed to subscribe from {addr}: {err}");
            return None;
        }
        let flag = Arc::new(AtomicBool::new(false));
        self.dead_flags.lock().unwrap().insert((addr, Direction::Capture), flag.clone());
        self.port_names.lock().unwrap().insert(
            (addr, Direction::Capture),
            PortNameEntry {
                jack_name: display.clone(),
                remote_client_name: desc.client_name.clone(),
                remote_port_name: desc.port_name.clone(),
            },
        );
        let port = crate::port::Port::new(addr, Direction::Capture, display.clone(), handle, flag);
        let ring = port.inbound.clone().expect("capture port always has an inbound ring");
        self.inbound_table.lock().unwrap().insert(addr, ring);
        debug!("created capture port {display} for {addr}");
        Some(port)
    }

    fn create_playback(&mut self, addr: AlsaAddr, desc: &RemoteDescriptor) -> Option<PlaybackPort> {
        let client = self.jack.upgrade()?;
        let display = crate::port::display_name(&desc.client_name, Direction::Playback, &desc.port_name);
        let handle = match client.as_client().register_port(&display, jack::MidiIn::default()) {
            Ok(p) => p,
            Err(err) => {
                warn!("failed to register jack playback port for {addr}: {err}");
                return None;
            }
        };
        if let Err(err) = self.seq.subscribe_to(addr) {
            warn!("failed to subscribe to {addr}: {err}");
            return None;
        }
        let flag = Arc::new(AtomicBool::new(false));
        self.dead_flags.lock().unwrap().insert((addr, Direction::Playback), flag.clone());
        self.port_names.lock().unwrap().insert(
            (addr, Direction::Playback),
            PortNameEntry {
                jack_name: display.clone(),
                remote_client_name: desc.client_name.clone(),
                remote_port_name: desc.port_name.clone(),
            },
        );
        debug!("created playback port {display} for {addr}");
        Some(crate::port::Port::new(addr, Direction::Playback, display, handle, flag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(addr: AlsaAddr) -> RemoteDescriptor {
        RemoteDescriptor {
            addr,
            client_name: "client".into(),
            port_name: "port".into(),
            readable: false,
            writable: false,
            is_hardware: false,
            no_export: false,
            port_type_is_zero: false,
        }
    }

    #[test]
    fn capability_action_creates_when_capable_and_untracked() {
        assert_eq!(capability_action(true, false), CapabilityAction::Create);
    }

    #[test]
    fn capability_action_marks_dead_when_revoked_while_tracked() {
        assert_eq!(capability_action(false, true), CapabilityAction::MarkDead);
    }

    #[test]
    fn capability_action_is_noop_when_already_in_the_right_state() {
        assert_eq!(capability_action(true, true), CapabilityAction::NoOp);
        assert_eq!(capability_action(false, false), CapabilityAction::NoOp);
    }

    #[test]
    fn zero_type_ports_are_retired_on_sight() {
        let mut desc = descriptor(AlsaAddr::new(1, 0));
        desc.port_type_is_zero = true;
        assert!(should_retire_on_sight(&desc, true));
    }

    #[test]
    fn no_export_ports_are_retired_on_sight() {
        let mut desc = descriptor(AlsaAddr::new(1, 0));
        desc.no_export = true;
        assert!(should_retire_on_sight(&desc, true));
    }

    #[test]
    fn hardware_ports_are_retired_unless_export_hw_is_enabled() {
        let mut desc = descriptor(AlsaAddr::new(1, 0));
        desc.is_hardware = true;
        assert!(should_retire_on_sight(&desc, false));
        assert!(!should_retire_on_sight(&desc, true));
    }

    #[test]
    fn ordinary_software_ports_are_not_retired() {
        let desc = descriptor(AlsaAddr::new(1, 0));
        assert!(!should_retire_on_sight(&desc, false));
    }
}
