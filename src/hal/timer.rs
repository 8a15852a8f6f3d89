//! Millisecond clock arithmetic.
//!
//! The counter itself is a `u32` incremented from a timer compare
//! interrupt and read under a disabled-interrupt snapshot; both live in
//! the AVR glue (`hal::avr`). This module holds the pure pieces: the
//! compare-match value for a 1ms tick and the wrapping interval math
//! clients use for polling and debouncing.

use crate::config;

/// Compare-match value for a 1ms CTC tick at the given prescaler,
/// OCR = F_CPU / 1000 / prescaler - 1. `None` when the tick does not fit
/// an 8-bit compare register.
pub const fn compare_match_value(prescaler: u32) -> Option<u8> {
    if prescaler == 0 {
        return None;
    }
    let ticks = config::CPU_FREQ_HZ / 1000 / prescaler;
    if ticks == 0 || ticks > 256 {
        return None;
    }
    Some((ticks - 1) as u8)
}

/// Milliseconds between two counter snapshots, correct across the
/// counter wrapping.
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}
