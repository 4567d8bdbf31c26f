//! Thin wrapper around the `alsa` crate's sequencer API.
//!
//! Keeps every direct call into `alsa::seq` in one place so the rest of
//! the bridge (`reconciler`, `seq_input`, `seq_output`) works against a
//! small, bridge-shaped surface instead of the raw ALSA bindings --
//! mirroring how `jack_adapter.rs` in the teacher isolates the `jack`
//! crate from the rest of the processing code.
//!
//! The underlying `snd_seq_t` handle is not safe for unsynchronized use
//! from two threads at once, so it's kept behind a `Mutex`; the input
//! worker only holds that lock for the duration of a single
//! non-blocking pending-check or drain, never while sleeping, so it
//! never starves the output worker's sends.

use std::ffi::CString;
use std::sync::Mutex;
use std::time::Duration;

use alsa::seq::{Addr, EventType, MidiEvent, PortCap, PortInfo, PortSubscribe, PortType, QueueTempo};
use alsa::Seq;
use log::warn;

use crate::constants::MAX_EVENT_SIZE;
use crate::event::AlsaAddr;

/// Announcement client/port: ALSA reserves client 0 as the system
/// client and port 1 as the announcement port.
pub const ANNOUNCE_ADDR: Addr = Addr { client: 0, port: 1 };

pub struct SeqClient {
    seq: Mutex<Seq>,
    decoder: Mutex<MidiEvent>,
    encoder: Mutex<MidiEvent>,
    queue: i32,
    client_id: i32,
    own_port: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyEvent {
    PortStart(AlsaAddr),
    PortChange(AlsaAddr),
    PortExit(AlsaAddr),
}

#[derive(Debug)]
pub enum SeqEvent {
    Topology(TopologyEvent),
    Midi { source: AlsaAddr, bytes: Vec<u8> },
}

/// Descriptor of a remote port as queried by the reconciler: whether it
/// supports being subscribed to as a capture source (`SUBS_READ`) or a
/// playback destination (`SUBS_WRITE`), whether it's a hardware port,
/// and whether it opted out of export.
#[derive(Debug, Clone)]
pub struct RemoteDescriptor {
    pub addr: AlsaAddr,
    pub client_name: String,
    pub port_name: String,
    pub readable: bool,
    pub writable: bool,
    pub is_hardware: bool,
    pub no_export: bool,
    pub port_type_is_zero: bool,
}

impl SeqClient {
    pub fn open(client_name: &str) -> alsa::Result<Self> {
        let seq = Seq::open(None, None, true)?;
        seq.set_client_name(&CString::new(client_name).unwrap())?;

        let queue = seq.alloc_queue()?;
        let tempo = QueueTempo::empty()?;
        tempo.set_tempo(500_000);
        tempo.set_ppq(480);
        seq.set_queue_tempo(queue, &tempo)?;
        seq.control_queue(queue, EventType::Start, 0, None)?;
        seq.drain_output()?;

        let mut pinfo = PortInfo::empty()?;
        pinfo.set_name(&CString::new(client_name).unwrap());
        pinfo.set_capability(PortCap::READ | PortCap::WRITE | PortCap::NO_EXPORT);
        pinfo.set_type(PortType::MIDI_GENERIC | PortType::APPLICATION);
        pinfo.set_midi_channels(16);
        seq.create_port(&pinfo)?;
        let own_port = pinfo.get_port();
        let client_id = seq.client_id()?;

        let sub = PortSubscribe::empty()?;
        sub.set_sender(ANNOUNCE_ADDR);
        sub.set_dest(Addr { client: client_id, port: own_port });
        seq.subscribe_port(&sub)?;

        let decoder = MidiEvent::new(MAX_EVENT_SIZE as u32)?;
        let encoder = MidiEvent::new(MAX_EVENT_SIZE as u32)?;

        Ok(SeqClient {
            seq: Mutex::new(seq),
            decoder: Mutex::new(decoder),
            encoder: Mutex::new(encoder),
            queue,
            client_id,
            own_port,
        })
    }

    pub fn own_addr(&self) -> Addr {
        Addr { client: self.client_id, port: self.own_port }
    }

    pub fn queue(&self) -> i32 {
        self.queue
    }

    /// Block until an event is available or `timeout` elapses, checking
    /// `should_stop` between polls so shutdown is observed promptly.
    pub fn wait_for_input(&self, timeout: Duration, should_stop: &dyn Fn() -> bool) -> bool {
        const STEP: Duration = Duration::from_millis(20);
        let mut waited = Duration::ZERO;
        while waited < timeout {
            if should_stop() {
                return false;
            }
            if let Ok(seq) = self.seq.lock() {
                if matches!(seq.event_input_pending(true), Ok(n) if n > 0) {
                    return true;
                }
            }
            std::thread::sleep(STEP);
            waited += STEP;
        }
        false
    }

    /// Drain and classify every currently pending input event, decoding
    /// MIDI payloads with this client's capture-side decoder.
    pub fn drain_input(&self) -> Vec<SeqEvent> {
        let mut out = Vec::new();
        let seq = match self.seq.lock() {
            Ok(s) => s,
            Err(_) => return out,
        };
        let decoder = match self.decoder.lock() {
            Ok(d) => d,
            Err(_) => return out,
        };
        loop {
            match seq.event_input_pending(false) {
                Ok(n) if n > 0 => {}
                _ => break,
            }
            let event = match seq.event_input() {
                Ok(ev) => ev,
                Err(_) => break,
            };
            match classify_topology(&event) {
                Some(topo) => out.push(SeqEvent::Topology(topo)),
                None => {
                    let source = event.get_source();
                    let mut buf = [0u8; MAX_EVENT_SIZE];
                    decoder.reset_decode();
                    if let Ok(n) = decoder.decode(&mut buf, &event) {
                        if n > 0 {
                            out.push(SeqEvent::Midi {
                                source: AlsaAddr::new(source.client as u8, source.port as u8),
                                bytes: buf[..n].to_vec(),
                            });
                        }
                    }
                }
            }
        }
        out
    }

    /// Query the full descriptor of a remote endpoint, or `None` if it
    /// has already vanished.
    pub fn describe(&self, addr: AlsaAddr) -> Option<RemoteDescriptor> {
        let seq = self.seq.lock().ok()?;
        let pinfo = seq
            .get_any_port_info(Addr { client: addr.client as i32, port: addr.port as i32 })
            .ok()?;
        let cinfo = seq.get_any_client_info(addr.client as i32).ok()?;
        let caps = pinfo.get_capability();
        let ptype = pinfo.get_type();
        Some(RemoteDescriptor {
            addr,
            client_name: cinfo.get_name().unwrap_or_default().to_string(),
            port_name: pinfo.get_name().unwrap_or_default().to_string(),
            readable: caps.contains(PortCap::SUBS_READ),
            writable: caps.contains(PortCap::SUBS_WRITE),
            is_hardware: ptype.contains(PortType::HARDWARE),
            no_export: caps.contains(PortCap::NO_EXPORT),
            port_type_is_zero: ptype.bits() == 0,
        })
    }

    /// Walk every currently existing port on the bus, for the
    /// reconciler's startup sweep.
    pub fn all_ports(&self) -> Vec<AlsaAddr> {
        let mut out = Vec::new();
        let seq = match self.seq.lock() {
            Ok(s) => s,
            Err(_) => return out,
        };
        for client in alsa::seq::ClientIter::new(&seq) {
            let cid = client.get_client();
            for port in alsa::seq::PortIter::new(&seq, cid) {
                out.push(AlsaAddr::new(cid as u8, port.get_port() as u8));
            }
        }
        out
    }

    /// Subscribe this client's own port as the destination, from
    /// `remote` as the sender -- the Capture direction. Binds
    /// real-time timestamping to the bridge's input queue.
    pub fn subscribe_from(&self, remote: AlsaAddr) -> alsa::Result<()> {
        let seq = self.seq.lock().unwrap();
        let sub = PortSubscribe::empty()?;
        sub.set_sender(Addr { client: remote.client as i32, port: remote.port as i32 });
        sub.set_dest(self.own_addr());
        sub.set_time_update(true);
        sub.set_time_real(true);
        sub.set_queue(self.queue);
        seq.subscribe_port(&sub)
    }

    /// Subscribe this client's own port as the sender, to `remote` as
    /// the destination -- the Playback direction.
    pub fn subscribe_to(&self, remote: AlsaAddr) -> alsa::Result<()> {
        let seq = self.seq.lock().unwrap();
        let sub = PortSubscribe::empty()?;
        sub.set_sender(self.own_addr());
        sub.set_dest(Addr { client: remote.client as i32, port: remote.port as i32 });
        seq.subscribe_port(&sub)
    }

    pub fn unsubscribe_from(&self, remote: AlsaAddr) {
        let Ok(seq) = self.seq.lock() else { return };
        if let Ok(sub) = PortSubscribe::empty() {
            sub.set_sender(Addr { client: remote.client as i32, port: remote.port as i32 });
            sub.set_dest(self.own_addr());
            let _ = seq.unsubscribe_port(&sub);
        }
    }

    pub fn unsubscribe_to(&self, remote: AlsaAddr) {
        let Ok(seq) = self.seq.lock() else { return };
        if let Ok(sub) = PortSubscribe::empty() {
            sub.set_sender(self.own_addr());
            sub.set_dest(Addr { client: remote.client as i32, port: remote.port as i32 });
            let _ = seq.unsubscribe_port(&sub);
        }
    }

    /// Encode `payload` (a raw MIDI wire message) and send it
    /// immediately to `dest`. Logged and dropped on encode failure.
    pub fn send_midi(&self, dest: AlsaAddr, payload: &[u8]) {
        let Ok(seq) = self.seq.lock() else { return };
        let Ok(encoder) = self.encoder.lock() else { return };
        encoder.reset_encode();
        match encoder.encode(payload) {
            Ok((_, Some(mut event))) => {
                event.set_source(self.own_port as u8);
                event.set_subs();
                event.set_direct();
                event.set_dest(Addr { client: dest.client as i32, port: dest.port as i32 });
                if let Err(err) = seq.event_output(&mut event) {
                    warn!("failed to queue outgoing MIDI event to {dest}: {err}");
                }
            }
            Ok((_, None)) => {}
            Err(err) => warn!("failed to encode outgoing MIDI payload for {dest}: {err}"),
        }
    }

    pub fn drain_output(&self) {
        if let Ok(seq) = self.seq.lock() {
            let _ = seq.drain_output();
        }
    }
}

impl Drop for SeqClient {
    fn drop(&mut self) {
        if let Ok(seq) = self.seq.lock() {
            let _ = seq.control_queue(self.queue, EventType::Stop, 0, None);
            let _ = seq.drain_output();
            let _ = seq.free_queue(self.queue);
        }
    }
}

fn classify_topology(event: &alsa::seq::Event) -> Option<TopologyEvent> {
    let addr = event.get_data::<Addr>().map(|a| AlsaAddr::new(a.client as u8, a.port as u8))?;
    match event.get_type() {
        EventType::PortStart => Some(TopologyEvent::PortStart(addr)),
        EventType::PortChange => Some(TopologyEvent::PortChange(addr)),
        EventType::PortExit => Some(TopologyEvent::PortExit(addr)),
        _ => None,
    }
}
