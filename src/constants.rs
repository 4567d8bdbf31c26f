//! Fixed sizes and timing parameters shared across the bridge.

/// Maximum size in bytes of a single MIDI wire message the bridge will
/// carry. Sysex messages longer than this are truncated by the codec.
pub const MAX_EVENT_SIZE: usize = 1024;

/// Capacity, in bytes, of a `Port`'s inbound ring: 16 messages' worth
/// of headroom at the maximum event size.
pub const INBOUND_FIFO_CAPACITY: usize = 16 * MAX_EVENT_SIZE;

/// Depth of the lifecycle and outbound channels. Sized generously above
/// `MAX_PORTS` so a burst of topology changes never blocks a producer.
pub const MAX_PORTS: usize = 64;

/// Nanoseconds per second, used throughout the frame/nanosecond math.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// How often the reconciler thread wakes up to process topology intents.
pub const RECONCILER_TICK: std::time::Duration = std::time::Duration::from_millis(50);

/// Bound on how long the seq input worker blocks waiting for sequencer
/// input before re-checking the shutdown flag.
pub const INPUT_POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);

/// Below this margin to the scheduled delivery time, the seq output
/// worker emits immediately instead of sleeping.
pub const OUTPUT_SLEEP_THRESHOLD: std::time::Duration = std::time::Duration::from_millis(1);

/// Bound on how long the seq output worker blocks waiting for the
/// wakeup token before re-checking the shutdown flag.
pub const OUTPUT_WAKE_POLL: std::time::Duration = std::time::Duration::from_millis(50);

/// Poll interval for the shutdown-watch thread that turns a jack-
/// initiated `Notifications::shutdown` into an actual `Bridge::stop()`.
pub const SHUTDOWN_WATCH_POLL: std::time::Duration = std::time::Duration::from_millis(100);

/// JACK/ALSA client name used by the bridge.
pub const CLIENT_NAME: &str = "a2j";
