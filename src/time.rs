//! Translation between audio frame counters and wall-clock nanoseconds.
//!
//! Kept as free functions over plain integers rather than a newtype
//! wrapper: both directions of the math are used in exactly one place
//! each (the output worker computing absolute delivery time, and the
//! realtime callback's intra-cycle offset arithmetic), so a wrapper
//! type would just add call-site noise.

use crate::constants::NSEC_PER_SEC;

/// Convert a frame count at `sample_rate` Hz to nanoseconds.
pub fn frames_to_nanos(frames: u64, sample_rate: u32) -> u64 {
    frames * NSEC_PER_SEC / sample_rate as u64
}

/// Convert a nanosecond duration to a frame count at `sample_rate` Hz.
pub fn nanos_to_frames(nanos: u64, sample_rate: u32) -> u64 {
    sample_rate as u64 * nanos / NSEC_PER_SEC
}

/// The intra-cycle sample offset at which a capture-side event stamped
/// at `frame_time` should be written, given the current cycle's
/// `cycle_start` and `period_size`. Returns `None` if the event has not
/// yet become due and should be left in the inbound ring for a later
/// cycle.
///
/// Jack's frame counter is a `u32` that wraps roughly every 24.8 hours
/// at 48kHz, so "not yet due" can't be a plain `frame_time >= cycle_start`
/// comparison: right after a wrap, a `frame_time` stamped just before it
/// would compare greater than the small, freshly-wrapped `cycle_start`
/// forever. Instead the signed wrapping difference is checked, the same
/// idiom used for wrapping sequence-number comparisons.
pub fn intra_cycle_offset(frame_time: u32, cycle_start: u32, period_size: u32) -> Option<u32> {
    let delta = cycle_start.wrapping_sub(frame_time) as i32;
    if delta <= 0 {
        return None;
    }
    let age = (delta as u32).min(period_size);
    let offset = period_size - age;
    Some(offset.min(period_size.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_to_nanos_matches_spec_example() {
        // 48000 Hz, one second of frames is exactly one second of nanos.
        assert_eq!(frames_to_nanos(48_000, 48_000), NSEC_PER_SEC);
    }

    #[test]
    fn nanos_to_frames_matches_spec_example() {
        assert_eq!(nanos_to_frames(NSEC_PER_SEC, 48_000), 48_000);
    }

    #[test]
    fn round_trip_is_identity_modulo_one_sample() {
        let sample_rate = 44_100u32;
        for frames in [0u64, 1, 17, 1000, 99_999] {
            let nanos = frames_to_nanos(frames, sample_rate);
            let back = nanos_to_frames(nanos, sample_rate);
            let diff = back.abs_diff(frames);
            assert!(diff <= 1, "frames={frames} back={back}");
        }
    }

    #[test]
    fn s1_basic_forward_copy_offset() {
        // sample_rate 48000, period 128, frame_time 1000, cycle_start 1024.
        let offset = intra_cycle_offset(1000, 1024, 128).unwrap();
        assert_eq!(offset, 104);
    }

    #[test]
    fn event_at_or_after_cycle_start_is_held() {
        assert_eq!(intra_cycle_offset(1024, 1024, 128), None);
        assert_eq!(intra_cycle_offset(2000, 1024, 128), None);
    }

    #[test]
    fn due_check_is_wraparound_safe() {
        // frame_time sits just before the u32 wrap; cycle_start just
        // after it. In wrapped time frame_time is 61 frames in the past
        // and should be due, not "not yet due forever".
        let frame_time = u32::MAX - 50;
        let cycle_start = 10u32;
        let offset = intra_cycle_offset(frame_time, cycle_start, 128);
        assert_eq!(offset, Some(67));
    }

    #[test]
    fn event_in_the_future_across_wrap_is_still_held() {
        // cycle_start sits just before the wrap; frame_time just after
        // it, i.e. genuinely in the future relative to cycle_start.
        let cycle_start = u32::MAX - 50;
        let frame_time = 10u32;
        assert_eq!(intra_cycle_offset(frame_time, cycle_start, 128), None);
    }

    #[test]
    fn s3_playback_absolute_delivery_order() {
        let sample_rate = 48_000;
        let cycle_start = 50_000u64;
        let p2_frame = cycle_start + 40;
        let p1_frame = cycle_start + 100;
        let p2_nanos = frames_to_nanos(p2_frame, sample_rate);
        let p1_nanos = frames_to_nanos(p1_frame, sample_rate);
        assert!(p2_nanos < p1_nanos);
    }
}
