//! PCF8574 8-bit I2C port expander.
//!
//! Quasi-bidirectional part: writing a byte drives the lines, reading
//! returns the pin levels. Addresses are 0x20..=0x27 (0x38..=0x3F for
//! the PCF8574A), set by the three address pins.

use embedded_hal::blocking::i2c::{Read, Write};

pub struct Pcf8574<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> Pcf8574<I2C>
where
    I2C: Write<Error = E> + Read<Error = E>,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Drive all lines low.
    pub fn init(&mut self) -> Result<(), E> {
        self.write(0x00)
    }

    /// Drive the output lines.
    pub fn write(&mut self, value: u8) -> Result<(), E> {
        self.i2c.write(self.address, &[value])
    }

    /// Read the pin levels.
    pub fn read(&mut self) -> Result<u8, E> {
        let mut value = [0u8; 1];
        self.i2c.read(self.address, &mut value)?;
        Ok(value[0])
    }

    pub fn free(self) -> I2C {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::i2c::{Mock, Transaction};

    #[test]
    fn init_drives_all_lines_low() {
        let mut port = Pcf8574::new(
            Mock::new(&[Transaction::write(0x20, vec![0x00])]),
            0x20,
        );
        port.init().unwrap();
        port.free().done();
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut port = Pcf8574::new(
            Mock::new(&[
                Transaction::write(0x27, vec![0xF0]),
                Transaction::read(0x27, vec![0xE0]),
            ]),
            0x27,
        );
        port.write(0xF0).unwrap();
        assert_eq!(port.read().unwrap(), 0xE0);
        port.free().done();
    }
}
