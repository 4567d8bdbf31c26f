//! Lifecycle orchestration: owns every thread, channel, and client
//! handle, and enforces the start/stop ordering from the design notes.
//!
//! A `Bridge` is an explicit value created by `Bridge::new` and brought
//! up/down by `start`/`stop`, not a process-wide singleton -- a caller
//! (`RemoteControl`, `main`) holds it directly. `new` hands back an
//! `Arc<Bridge>` (built via `Arc::new_cyclic`) rather than a bare value
//! so `start` can arm a shutdown-watch thread that calls back into
//! `stop` when jack itself announces a shutdown, without `Bridge`
//! needing a second, caller-supplied `Arc` threaded through every call.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use log::{debug, info};

use crate::constants::{CLIENT_NAME, MAX_PORTS, SHUTDOWN_WATCH_POLL};
use crate::error::{BridgeError, Result};
use crate::jack_callback::{BridgeProcessHandler, CapturePort, Notifications, PlaybackPort};
use crate::port::{new_dead_flag_table, new_inbound_table, new_port_name_table, DeadFlagTable, InboundTable, PortNameTable};
use crate::reconciler::Reconciler;
use crate::seq_client::SeqClient;
use crate::seq_input::SeqInputWorker;
use crate::seq_output::SeqOutputWorker;

type AsyncJack = jack::AsyncClient<Notifications, BridgeProcessHandler>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Caller-supplied startup options; mirrors the CLI flags and the
/// config file's two options (`main.rs`/`config.rs` populate this).
pub struct BridgeConfig {
    pub jack_server_name: Option<String>,
    pub export_hw_ports: Arc<AtomicBool>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig { jack_server_name: None, export_hw_ports: Arc::new(AtomicBool::new(false)) }
    }
}

struct RunningHandles {
    /// Sole strong owner; the reconciler thread only ever holds a
    /// `Weak` clone. See `stop` for why that matters.
    jack: Arc<AsyncJack>,
    seq: Arc<SeqClient>,
    stop: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    input_thread: JoinHandle<()>,
    output_thread: JoinHandle<()>,
    reconciler_thread: JoinHandle<()>,
    dead_flags: Arc<DeadFlagTable>,
    inbound_table: Arc<InboundTable>,
    port_names: Arc<PortNameTable>,
}

enum Phase {
    Stopped,
    Running(RunningHandles),
}

pub struct Bridge {
    config: BridgeConfig,
    phase: Mutex<Phase>,
    self_weak: Weak<Bridge>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Bridge { config, phase: Mutex::new(Phase::Stopped), self_weak: weak.clone() })
    }

    pub fn state(&self) -> BridgeState {
        match *self.phase.lock().unwrap() {
            Phase::Stopped => BridgeState::Stopped,
            Phase::Running(_) => BridgeState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    pub fn jack_client_name(&self) -> Option<String> {
        match &*self.phase.lock().unwrap() {
            Phase::Running(h) => Some(h.jack.as_client().name().to_string()),
            Phase::Stopped => None,
        }
    }

    pub fn dead_flags(&self) -> Option<Arc<DeadFlagTable>> {
        match &*self.phase.lock().unwrap() {
            Phase::Running(h) => Some(h.dead_flags.clone()),
            Phase::Stopped => None,
        }
    }

    pub fn port_names(&self) -> Option<Arc<PortNameTable>> {
        match &*self.phase.lock().unwrap() {
            Phase::Running(h) => Some(h.port_names.clone()),
            Phase::Stopped => None,
        }
    }

    pub fn export_hw_ports(&self) -> bool {
        self.config.export_hw_ports.load(Ordering::Acquire)
    }

    /// Rejected while running: changing the set of mirrored endpoints
    /// mid-flight would require tearing down hardware Ports out of
    /// band from the reconciler's normal capability-revocation path.
    pub fn set_export_hw_ports(&self, enabled: bool) -> Result<()> {
        if self.is_running() {
            return Err(BridgeError::HwExportChangeWhileRunning);
        }
        self.config.export_hw_ports.store(enabled, Ordering::Release);
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        let mut phase = self.phase.lock().unwrap();
        if matches!(*phase, Phase::Running(_)) {
            return Err(BridgeError::AlreadyRunning);
        }

        let seq = Arc::new(SeqClient::open(CLIENT_NAME).map_err(BridgeError::SeqOpen)?);

        if let Some(server) = &self.config.jack_server_name {
            // jack-rs has no first-class server-name parameter; the
            // upstream client negotiates it through this env var.
            std::env::set_var("JACK_DEFAULT_SERVER", server);
        }
        let (jack_client, _status) = jack::Client::new(CLIENT_NAME, jack::ClientOptions::NO_START_SERVER)
            .map_err(BridgeError::JackOpen)?;
        let sample_rate = jack_client.sample_rate() as u32;

        let stop = Arc::new(AtomicBool::new(false));
        let cycle_start = Arc::new(AtomicU32::new(0));
        let freewheeling = Arc::new(AtomicBool::new(false));
        let dead_flags = Arc::new(new_dead_flag_table());
        let inbound_table = Arc::new(new_inbound_table());
        let port_names = Arc::new(new_port_name_table());

        let (additions_tx, additions_rx) = bounded(MAX_PORTS);
        let (capture_new_tx, capture_new_rx) = bounded::<CapturePort>(MAX_PORTS);
        let (playback_new_tx, playback_new_rx) = bounded::<PlaybackPort>(MAX_PORTS);
        let (capture_dead_tx, capture_dead_rx) = bounded::<CapturePort>(MAX_PORTS);
        let (playback_dead_tx, playback_dead_rx) = bounded::<PlaybackPort>(MAX_PORTS);
        let (outbound_tx, outbound_rx) = bounded(MAX_PORTS * 64);
        let (wake_tx, wake_rx) = bounded(1);

        let process_handler = BridgeProcessHandler::new(
            capture_new_rx,
            playback_new_rx,
            capture_dead_tx,
            playback_dead_tx,
            outbound_tx,
            wake_tx.clone(),
            cycle_start.clone(),
            freewheeling.clone(),
        );
        let notifications = Notifications { freewheeling, stop: stop.clone() };

        let async_client = jack_client
            .activate_async(notifications, process_handler)
            .map_err(BridgeError::JackActivate)?;
        let jack = Arc::new(async_client);
        let activation = Instant::now();

        let mut reconciler = Reconciler::new(
            seq.clone(),
            Arc::downgrade(&jack),
            additions_rx,
            capture_dead_rx,
            playback_dead_rx,
            capture_new_tx,
            playback_new_tx,
            dead_flags.clone(),
            inbound_table.clone(),
            port_names.clone(),
            self.config.export_hw_ports.clone(),
            stop.clone(),
        );
        let reconciler_thread = thread::Builder::new()
            .name("a2j-reconciler".into())
            .spawn(move || reconciler.run())
            .map_err(BridgeError::ThreadSpawn)?;

        let mut input_worker =
            SeqInputWorker::new(seq.clone(), additions_tx, dead_flags.clone(), inbound_table.clone(), cycle_start, stop.clone());
        let input_thread = thread::Builder::new()
            .name("a2j-seq-input".into())
            .spawn(move || input_worker.run())
            .map_err(BridgeError::ThreadSpawn)?;

        let mut output_worker =
            SeqOutputWorker::new(seq.clone(), outbound_rx, wake_rx, sample_rate, activation, stop.clone());
        let output_thread = thread::Builder::new()
            .name("a2j-seq-output".into())
            .spawn(move || output_worker.run())
            .map_err(BridgeError::ThreadSpawn)?;

        info!("bridge started, jack sample rate {sample_rate}");
        *phase = Phase::Running(RunningHandles {
            jack,
            seq,
            stop: stop.clone(),
            wake_tx,
            input_thread,
            output_thread,
            reconciler_thread,
            dead_flags,
            inbound_table,
            port_names,
        });
        drop(phase);

        self.arm_shutdown_watch(stop);
        Ok(())
    }

    /// Spawns a thread that turns an externally-triggered shutdown
    /// (jack server gone, `Notifications::shutdown` flips `stop`) into
    /// an actual `stop()` call -- joining the workers, deactivating the
    /// jack client, clearing the shared tables -- instead of leaving
    /// the bridge parked in `Phase::Running` forever. A caller-driven
    /// `stop()` also flips the same flag, so this wakes up and calls
    /// `stop()` a second time in that path too; that's a harmless
    /// `Err(NotRunning)` since `stop()` has already run by then.
    fn arm_shutdown_watch(&self, stop: Arc<AtomicBool>) {
        let Some(bridge) = self.self_weak.upgrade() else {
            log::warn!("bridge has no strong self-reference; jack-initiated shutdown will not auto-stop it");
            return;
        };
        let spawned = thread::Builder::new().name("a2j-shutdown-watch".into()).spawn(move || {
            while !stop.load(Ordering::Acquire) {
                thread::sleep(SHUTDOWN_WATCH_POLL);
            }
            if let Err(err) = bridge.stop() {
                debug!("shutdown watch stop() was a no-op: {err}");
            }
        });
        if let Err(err) = spawned {
            log::warn!("failed to spawn shutdown-watch thread: {err}");
        }
    }

    pub fn stop(&self) -> Result<()> {
        let mut phase = self.phase.lock().unwrap();
        let handles = match std::mem::replace(&mut *phase, Phase::Stopped) {
            Phase::Running(h) => h,
            Phase::Stopped => {
                *phase = Phase::Stopped;
                return Err(BridgeError::NotRunning);
            }
        };

        handles.stop.store(true, Ordering::Release);
        let _ = handles.wake_tx.try_send(());

        // Deactivate jack first: this blocks until the realtime
        // callback has returned and guarantees it won't run again,
        // before any FIFO the callback touches gets torn down. The
        // reconciler only ever holds a `Weak` clone, so this `Arc` is
        // the sole owner and `try_unwrap` always succeeds here.
        match Arc::try_unwrap(handles.jack) {
            Ok(async_client) => {
                if let Err(err) = async_client.deactivate() {
                    log::warn!("error deactivating jack client: {err}");
                }
            }
            Err(_) => log::warn!("jack client still referenced at shutdown, skipping deactivate"),
        }

        let _ = handles.input_thread.join();
        let _ = handles.output_thread.join();
        let _ = handles.reconciler_thread.join();

        drop(handles.seq);
        handles.dead_flags.lock().unwrap().clear();
        handles.inbound_table.lock().unwrap().clear();
        handles.port_names.lock().unwrap().clear();

        info!("bridge stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bridge_starts_stopped() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert_eq!(bridge.state(), BridgeState::Stopped);
        assert!(!bridge.is_running());
        assert!(bridge.jack_client_name().is_none());
        assert!(bridge.dead_flags().is_none());
        assert!(bridge.port_names().is_none());
    }

    #[test]
    fn stop_on_a_never_started_bridge_is_not_running() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert!(matches!(bridge.stop(), Err(BridgeError::NotRunning)));
    }

    #[test]
    fn export_hw_ports_can_be_toggled_while_stopped() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert!(!bridge.export_hw_ports());
        bridge.set_export_hw_ports(true).unwrap();
        assert!(bridge.export_hw_ports());
    }
}
