//! 4x4 matrix keypad behind a PCF8574 expander.
//!
//! Rows sit on the high expander nibble, columns on the low one. A scan
//! drives one half of the matrix and reads back which line a pressed key
//! pulls low; the two half-scans combine into an index into the key map.
//! Key reports are debounced against the millisecond clock and edge
//! detected, so a held key is reported once.
//!
//! The clock is injected as a `now_ms` closure; on target that is
//! `hal::avr::millis`.

use embedded_hal::blocking::i2c::{Read, Write};

use super::pcf8574::Pcf8574;
use crate::config;
use crate::hal::timer::elapsed_ms;

const KEY_MAP: &[u8; 16] = b"123A456B789C*0#D";
const ROW_MASK: u8 = 0xF0;
const COL_MASK: u8 = 0x0F;

pub struct Keypad<I2C, C> {
    port: Pcf8574<I2C>,
    now_ms: C,
    key: u8,
    last_key: u8,
    last_time: u32,
}

impl<I2C, C, E> Keypad<I2C, C>
where
    I2C: Write<Error = E> + Read<Error = E>,
    C: FnMut() -> u32,
{
    pub fn new(i2c: I2C, address: u8, now_ms: C) -> Self {
        Self {
            port: Pcf8574::new(i2c, address),
            now_ms,
            key: 0,
            last_key: 0,
            last_time: 0,
        }
    }

    pub fn init(&mut self) -> Result<(), E> {
        self.port.init()
    }

    /// Any key currently held down. All-ones means no expander answered
    /// (floating bus), which also counts as "no key".
    pub fn key_is_pressed(&mut self) -> Result<bool, E> {
        let rows = self.scan(ROW_MASK)?;
        if rows == 0xFF {
            return Ok(false);
        }
        Ok(rows != ROW_MASK)
    }

    /// Debounced, edge-detected key read. Returns a key at most once per
    /// press, `None` while nothing new has settled.
    pub fn get_key(&mut self) -> Result<Option<char>, E> {
        let index = self.scan_index()?;
        if self.key_is_pressed()? {
            self.key = KEY_MAP[index];
        }
        let now = (self.now_ms)();
        if elapsed_ms(now, self.last_time) >= config::KEYPAD_DEBOUNCE_MS {
            self.last_time = now;
            if self.key != self.last_key {
                self.last_key = self.key;
                return Ok(Some(self.key as char));
            }
        }
        Ok(None)
    }

    pub fn free(self) -> I2C {
        self.port.free()
    }

    fn scan(&mut self, mask: u8) -> Result<u8, E> {
        self.port.write(mask)?;
        self.port.read()
    }

    /// Combine the two half-scans: the row scan gives the position
    /// within a row, the column scan the row times four.
    fn scan_index(&mut self) -> Result<usize, E> {
        let rows = self.scan(ROW_MASK)?;
        let cols = self.scan(COL_MASK)?;
        let mut index = 0;
        for i in 0..4 {
            if rows & (1 << (i + 4)) == 0 {
                index = i;
                break;
            }
        }
        for i in 0..4 {
            if cols & (1 << i) == 0 {
                index += i * 4;
                break;
            }
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::i2c::{Mock, Transaction};

    const ADDR: u8 = 0x21;

    /// One get_key scan cycle: row half-scan, column half-scan, then the
    /// pressed check (a second row scan).
    fn scan_cycle(rows: u8, cols: u8) -> Vec<Transaction> {
        vec![
            Transaction::write(ADDR, vec![ROW_MASK]),
            Transaction::read(ADDR, vec![rows]),
            Transaction::write(ADDR, vec![COL_MASK]),
            Transaction::read(ADDR, vec![cols]),
            Transaction::write(ADDR, vec![ROW_MASK]),
            Transaction::read(ADDR, vec![rows]),
        ]
    }

    #[test]
    fn decodes_key_from_half_scans() {
        // Bit 6 low in the row scan, bit 1 low in the column scan:
        // index 2 + 1*4 = 6 -> '6'.
        let mut keypad = Keypad::new(
            Mock::new(&scan_cycle(0xBF, 0xFD)),
            ADDR,
            || 200u32,
        );
        assert_eq!(keypad.get_key().unwrap(), Some('6'));
        keypad.free().done();
    }

    #[test]
    fn held_key_reported_once() {
        let mut script = scan_cycle(0xEF, 0xFE); // index 0 -> '1'
        script.extend(scan_cycle(0xEF, 0xFE));
        let mut now = 0u32;
        let mut keypad = Keypad::new(Mock::new(&script), ADDR, move || {
            now += 150;
            now
        });
        assert_eq!(keypad.get_key().unwrap(), Some('1'));
        // Same key still down on the next settled scan: no new report.
        assert_eq!(keypad.get_key().unwrap(), None);
        keypad.free().done();
    }

    #[test]
    fn debounce_window_suppresses_reports() {
        let mut script = scan_cycle(0xEF, 0xFE);
        script.extend(scan_cycle(0xEF, 0xFE));
        // Clock barely moves: still inside the debounce window.
        let mut calls = 0u32;
        let mut keypad = Keypad::new(Mock::new(&script), ADDR, move || {
            calls += 10;
            calls
        });
        assert_eq!(keypad.get_key().unwrap(), None);
        assert_eq!(keypad.get_key().unwrap(), None);
        keypad.free().done();
    }

    #[test]
    fn no_key_when_matrix_is_idle() {
        let mut keypad = Keypad::new(
            Mock::new(&scan_cycle(ROW_MASK, COL_MASK)),
            ADDR,
            || 500u32,
        );
        assert_eq!(keypad.get_key().unwrap(), None);
        keypad.free().done();
    }

    #[test]
    fn floating_bus_reads_as_no_key() {
        let mut keypad = Keypad::new(
            Mock::new(&[
                Transaction::write(ADDR, vec![ROW_MASK]),
                Transaction::read(ADDR, vec![0xFF]),
            ]),
            ADDR,
            || 0u32,
        );
        assert!(!keypad.key_is_pressed().unwrap());
        keypad.free().done();
    }
}
