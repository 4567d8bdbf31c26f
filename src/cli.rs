//! Command-line argument parsing, matching the teacher's `clap::Parser`
//! idiom.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "a2j-bridge", about = "Bidirectional ALSA sequencer <-> JACK MIDI bridge")]
pub struct Args {
    /// JACK server name to connect to, if not the default.
    #[arg(short = 'j', long = "jack-server")]
    pub jack_server: Option<String>,

    /// Export hardware ALSA ports as jack ports too.
    #[arg(short = 'e', long = "export-hw")]
    pub export_hw: bool,

    /// Increase log verbosity; repeatable.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the config file read at startup.
    #[arg(short = 'c', long = "config")]
    pub config: Option<std::path::PathBuf>,

    /// Positional mode selector; the only recognized value is `dbus`,
    /// requesting the org.gna.home.a2jmidid D-Bus service. Logged and
    /// otherwise ignored: this crate exposes `RemoteControl` in-process
    /// only, no D-Bus transport is stood up.
    pub mode: Option<String>,
}

impl Args {
    pub fn dbus_requested(&self) -> bool {
        self.mode.as_deref() == Some("dbus")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let args = Args::parse_from(["a2j-bridge", "-e", "-j", "rt", "-vv"]);
        assert!(args.export_hw);
        assert_eq!(args.jack_server.as_deref(), Some("rt"));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn defaults_are_conservative() {
        let args = Args::parse_from(["a2j-bridge"]);
        assert!(!args.export_hw);
        assert!(!args.dbus_requested());
        assert!(args.jack_server.is_none());
    }

    #[test]
    fn dbus_mode_is_positional() {
        let args = Args::parse_from(["a2j-bridge", "dbus"]);
        assert!(args.dbus_requested());
    }

    #[test]
    fn unrecognized_mode_is_not_dbus() {
        let args = Args::parse_from(["a2j-bridge", "something-else"]);
        assert!(!args.dbus_requested());
    }
}
