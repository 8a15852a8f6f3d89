//! HD44780 character LCD behind a PCF8574 backpack.
//!
//! The expander carries the high data nibble on P4..P7 and RS/RW/EN on
//! P0..P2, so every command or character goes out as two nibbles, each
//! strobed with EN. RW stays low; the driver never reads the busy flag
//! and paces itself with fixed delays instead.

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::blocking::i2c::{Read, Write};

use super::pcf8574::Pcf8574;

// Commands
const CLEAR_DISPLAY: u8 = 0x01;
const RETURN_HOME: u8 = 0x02;
const ENTRY_MODE_SET: u8 = 0x04;
const DISPLAY_CONTROL: u8 = 0x08;
const FUNCTION_SET: u8 = 0x20;
const SET_DDRAM_ADDR: u8 = 0x80;

// Function set flags
const MODE_4BIT: u8 = 0x00;
const LINES_2: u8 = 0x08;
const LINES_1: u8 = 0x00;
const DOTS_5X8: u8 = 0x00;

// Display control flags
const DISPLAY_ON: u8 = 0x04;

// Backpack bit mapping
const RS: u8 = 1 << 0;
const EN: u8 = 1 << 2;

const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

pub struct Lcd<I2C, D> {
    port: Pcf8574<I2C>,
    delay: D,
    cols: u8,
    rows: u8,
    display_function: u8,
    display_control: u8,
    display_mode: u8,
}

impl<I2C, D, E> Lcd<I2C, D>
where
    I2C: Write<Error = E> + Read<Error = E>,
    D: DelayMs<u8> + DelayUs<u8>,
{
    pub fn new(i2c: I2C, address: u8, cols: u8, rows: u8, delay: D) -> Self {
        Self {
            port: Pcf8574::new(i2c, address),
            delay,
            cols,
            rows,
            display_function: 0,
            display_control: 0,
            display_mode: 0,
        }
    }

    /// Power-on init: the three-times-0x03 wake-up dance, then switch to
    /// 4-bit mode and program function, control and entry mode.
    pub fn init(&mut self) -> Result<(), E> {
        self.delay.delay_ms(15);
        self.port.init()?;
        for _ in 0..3 {
            self.delay.delay_ms(5);
            self.command(0x03)?;
        }
        self.delay.delay_ms(5);
        self.command(0x02)?;

        let lines = if self.rows == 1 { LINES_1 } else { LINES_2 };
        self.display_function = lines | DOTS_5X8 | MODE_4BIT;
        self.command(FUNCTION_SET | self.display_function)?;
        self.display_control = DISPLAY_ON;
        self.command(DISPLAY_CONTROL | self.display_control)?;
        self.display_mode = 0;
        self.command(ENTRY_MODE_SET | self.display_mode)?;
        self.clear()?;
        self.home()
    }

    pub fn clear(&mut self) -> Result<(), E> {
        self.command(CLEAR_DISPLAY)
    }

    pub fn home(&mut self) -> Result<(), E> {
        self.command(RETURN_HOME)
    }

    /// Move the cursor, clamped to the configured geometry.
    pub fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), E> {
        let col = col.min(self.cols.saturating_sub(1));
        let row = row.min(self.rows.saturating_sub(1)).min(3);
        self.command(SET_DDRAM_ADDR | (col + ROW_OFFSETS[row as usize]))
    }

    pub fn write_char(&mut self, c: u8) -> Result<(), E> {
        self.write_nibble(c & 0xF0, true)?;
        self.write_nibble(c << 4, true)
    }

    pub fn print(&mut self, s: &str) -> Result<(), E> {
        for byte in s.bytes() {
            self.write_char(byte)?;
        }
        Ok(())
    }

    pub fn free(self) -> I2C {
        self.port.free()
    }

    fn command(&mut self, command: u8) -> Result<(), E> {
        self.write_nibble(command & 0xF0, false)?;
        self.write_nibble(command << 4, false)
    }

    /// Put one nibble on the high lines and strobe EN. RS selects
    /// between command and data, RW stays low.
    fn write_nibble(&mut self, nibble: u8, data: bool) -> Result<(), E> {
        let mut bits = nibble & 0xF0;
        if data {
            bits |= RS;
        }
        self.port.write(bits | EN)?;
        self.delay.delay_us(1);
        self.port.write(bits)?;
        self.delay.delay_ms(3);
        Ok(())
    }
}
