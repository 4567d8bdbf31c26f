//! a2j-bridge: bidirectional ALSA sequencer <-> JACK MIDI bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::*;

use a2j_bridge::bridge::{Bridge, BridgeConfig};
use a2j_bridge::cli::Args;
use a2j_bridge::config::ConfigFile;
use a2j_bridge::remote_control::{InProcessRemoteControl, RemoteControl};
use a2j_bridge::signal;

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder().filter_level(level).try_init().ok();

    if args.dbus_requested() {
        warn!("dbus mode was requested but this build exposes RemoteControl in-process only; ignoring");
    }

    match run(args) {
        Ok(()) => {
            info!("a2j-bridge exiting cleanly");
            std::process::exit(0);
        }
        Err(err) => {
            error!("a2j-bridge failed to start: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<()> {
    let file_config = args.config.as_deref().map(ConfigFile::load_or_default).unwrap_or_default();

    let jack_server_name = args.jack_server.or(file_config.jack_server_name);
    let export_hw = args.export_hw || file_config.export_hw_ports;

    let config = BridgeConfig { jack_server_name, export_hw_ports: Arc::new(AtomicBool::new(export_hw)) };
    let bridge = Bridge::new(config);
    let control = InProcessRemoteControl::new(bridge.clone());

    let stop_requested = Arc::new(AtomicBool::new(false));
    signal::install(stop_requested.clone())?;

    control.start()?;
    info!("a2j-bridge started as jack client {}", control.get_jack_client_name());

    while !stop_requested.load(Ordering::Relaxed) && control.is_started() {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    if control.is_started() {
        info!("shutdown requested, stopping bridge");
        control.stop()?;
    } else {
        info!("bridge already stopped (jack shut down underneath us)");
    }
    Ok(())
}
