//! Serial console over the UART transport.
//!
//! Thin convenience layer for logging and debug output: line endings,
//! hex dumps and `ufmt` formatted writes. Every byte goes through the
//! transport's enqueue path and busy-waits only when the TX ring is
//! full, relying on the transmit interrupt to drain it.

use crate::hal::uart::{Serial, UartHardware};

pub struct Console<H> {
    serial: Serial<H>,
}

impl<H: UartHardware> Console<H> {
    pub fn new(serial: Serial<H>) -> Self {
        Self { serial }
    }

    pub fn write_byte(&mut self, byte: u8) {
        let _ = nb::block!(self.serial.try_send(byte));
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        self.serial.read_byte()
    }

    pub fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }

    pub fn write_line(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\r\n");
    }

    // Debug helper - print hex value
    pub fn write_hex(&mut self, val: u8) {
        const HEX_CHARS: [u8; 16] = *b"0123456789ABCDEF";
        self.write_byte(HEX_CHARS[(val >> 4) as usize]);
        self.write_byte(HEX_CHARS[(val & 0xF) as usize]);
    }

    // Print formatted debug info
    pub fn debug(&mut self, msg: &str, val: u8) {
        self.write_str("[DBG] ");
        self.write_str(msg);
        self.write_str(": 0x");
        self.write_hex(val);
        self.write_str("\r\n");
    }

    /// Access the underlying transport (availability checks, flush,
    /// overrun counter).
    pub fn serial(&mut self) -> &mut Serial<H> {
        &mut self.serial
    }

    pub fn free(self) -> Serial<H> {
        self.serial
    }
}

impl<H: UartHardware> ufmt::uWrite for Console<H> {
    type Error = core::convert::Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        Console::write_str(self, s);
        Ok(())
    }
}
