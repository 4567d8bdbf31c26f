//! In-process control surface mirroring the bridge's remote-control
//! API: start/stop, port name translation, and the hardware-export
//! toggle, plus a pair of broadcast-style signals for start/stop
//! lifecycle events.
//!
//! There's a single implementation (`InProcessRemoteControl`) rather
//! than a D-Bus server, since this crate carries no D-Bus dependency;
//! the trait is the seam a future transport (D-Bus, a local socket)
//! would sit behind.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::bridge::Bridge;
use crate::error::Result;
use crate::event::{AlsaAddr, Direction};

pub trait RemoteControl: Send + Sync {
    /// Requests the whole process to terminate, stopping the bridge
    /// first if it's running.
    fn exit(&self);
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn is_started(&self) -> bool;
    fn get_jack_client_name(&self) -> String;
    /// Looks up the jack port name created for a mirrored ALSA
    /// endpoint. `map_playback` selects the jack->seq (Playback)
    /// direction over the seq->jack (Capture) one.
    fn map_alsa_to_jack_port(&self, client_id: u8, port_id: u8, map_playback: bool) -> Option<String>;
    /// Reverse of `map_alsa_to_jack_port`: given a jack port name this
    /// bridge created, returns `(client_id, port_id, client_name,
    /// port_name)`.
    fn map_jack_port_to_alsa(&self, jack_port_name: &str) -> Option<(u8, u8, String, String)>;
    fn set_hw_export(&self, enabled: bool) -> Result<()>;
    fn get_hw_export(&self) -> bool;
    /// Subscribes to the bridge-started signal. Each call registers a
    /// fresh channel; all registered channels receive every signal.
    fn subscribe_started(&self) -> Receiver<()>;
    /// Subscribes to the bridge-stopped signal, same semantics as
    /// `subscribe_started`.
    fn subscribe_stopped(&self) -> Receiver<()>;
}

/// Broadcasts a unit signal to every still-connected subscriber,
/// dropping subscribers whose receiver has gone away.
#[derive(Default)]
struct Signal {
    subscribers: Mutex<Vec<Sender<()>>>,
}

impl Signal {
    fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = bounded(1);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn fire(&self) {
        use crossbeam_channel::TrySendError;
        self.subscribers.lock().unwrap().retain(|tx| !matches!(tx.try_send(()), Err(TrySendError::Disconnected(_))));
    }
}

pub struct InProcessRemoteControl {
    bridge: Arc<Bridge>,
    exit_requested: Arc<std::sync::atomic::AtomicBool>,
    started: Signal,
    stopped: Signal,
}

impl InProcessRemoteControl {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        InProcessRemoteControl {
            bridge,
            exit_requested: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            started: Signal::default(),
            stopped: Signal::default(),
        }
    }

    pub fn exit_requested_flag(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.exit_requested.clone()
    }
}

impl RemoteControl for InProcessRemoteControl {
    fn exit(&self) {
        if self.bridge.is_running() {
            let _ = self.stop();
        }
        self.exit_requested.store(true, std::sync::atomic::Ordering::Release);
    }

    fn start(&self) -> Result<()> {
        self.bridge.start()?;
        self.started.fire();
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.bridge.stop()?;
        self.stopped.fire();
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.bridge.is_running()
    }

    fn get_jack_client_name(&self) -> String {
        self.bridge.jack_client_name().unwrap_or_default()
    }

    fn map_alsa_to_jack_port(&self, client_id: u8, port_id: u8, map_playback: bool) -> Option<String> {
        let table = self.bridge.port_names()?;
        let direction = if map_playback { Direction::Playback } else { Direction::Capture };
        let addr = AlsaAddr::new(client_id, port_id);
        table.lock().unwrap().get(&(addr, direction)).map(|entry| entry.jack_name.clone())
    }

    fn map_jack_port_to_alsa(&self, jack_port_name: &str) -> Option<(u8, u8, String, String)> {
        let table = self.bridge.port_names()?;
        let table = table.lock().unwrap();
        table.iter().find_map(|((addr, _direction), entry)| {
            if entry.jack_name == jack_port_name {
                Some((addr.client, addr.port, entry.remote_client_name.clone(), entry.remote_port_name.clone()))
            } else {
                None
            }
        })
    }

    fn set_hw_export(&self, enabled: bool) -> Result<()> {
        self.bridge.set_export_hw_ports(enabled)
    }

    fn get_hw_export(&self) -> bool {
        self.bridge.export_hw_ports()
    }

    fn subscribe_started(&self) -> Receiver<()> {
        self.started.subscribe()
    }

    fn subscribe_stopped(&self) -> Receiver<()> {
        self.stopped.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeConfig;

    #[test]
    fn hw_export_round_trips_through_control_surface() {
        let bridge = Bridge::new(BridgeConfig::default());
        let control = InProcessRemoteControl::new(bridge);
        assert!(!control.get_hw_export());
        control.set_hw_export(true).unwrap();
        assert!(control.get_hw_export());
    }

    #[test]
    fn mapping_lookups_are_none_while_stopped() {
        let bridge = Bridge::new(BridgeConfig::default());
        let control = InProcessRemoteControl::new(bridge);
        assert!(control.map_alsa_to_jack_port(0, 0, false).is_none());
        assert!(control.map_jack_port_to_alsa("anything").is_none());
        assert_eq!(control.get_jack_client_name(), "");
        assert!(!control.is_started());
    }
}
