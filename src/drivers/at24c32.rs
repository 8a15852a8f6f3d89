//! AT24C32 I2C EEPROM client.
//!
//! 4KiB part with a 12-bit register address sent as two bytes. Writes go
//! through a read-back check first: when the cell already holds the
//! value, the bus write (and the write-cycle wait) is skipped entirely,
//! which also spares the part's limited write endurance.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::config;

pub const DEFAULT_ADDRESS: u8 = 0x50;

pub struct At24c32<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C, D, E> At24c32<I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u8>,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Read one byte from the given location.
    pub fn read(&mut self, location: u16) -> Result<u8, E> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.address, &location.to_be_bytes(), &mut value)?;
        Ok(value[0])
    }

    /// Read consecutive locations into `out`.
    pub fn read_array(&mut self, location: u16, out: &mut [u8]) -> Result<(), E> {
        for (offset, slot) in out.iter_mut().enumerate() {
            *slot = self.read(location.wrapping_add(offset as u16))?;
        }
        Ok(())
    }

    /// Write one byte, unless the location already holds it.
    ///
    /// Returns `true` when a bus write actually happened. The write path
    /// waits out the part's internal write cycle before returning.
    pub fn write(&mut self, location: u16, value: u8) -> Result<bool, E> {
        if self.read(location)? == value {
            return Ok(false);
        }
        let reg = location.to_be_bytes();
        self.i2c.write(self.address, &[reg[0], reg[1], value])?;
        self.delay.delay_ms(config::EEPROM_WRITE_CYCLE_MS);
        Ok(true)
    }

    pub fn free(self) -> I2C {
        self.i2c
    }
}
