//! Interrupt-driven UART transport with ring-buffered RX and TX paths.
//!
//! A [`Serial`] instance owns both rings and the transmit pump state.
//! The receive-complete interrupt pushes into the RX ring, the
//! data-register-empty interrupt drains the TX ring and disarms itself
//! when the ring runs dry; the next enqueue re-arms it. The foreground
//! producer never waits on the wire, only on a full TX ring.
//!
//! The type itself is single-context: on target every foreground access
//! to the shared instance happens inside an `interrupt::free` critical
//! section (see `hal::avr`), and the interrupt handlers call
//! [`Serial::rx_interrupt`]/[`Serial::tx_interrupt`] directly. Host tests
//! drive both sides by hand.

use core::convert::Infallible;

use crate::config;

// Buffer size must be a power of two so wrap-around is a mask, not a
// divide, inside the interrupt handlers.
const BUFFER_SIZE: usize = config::UART_BUFFER_SIZE;
const BUFFER_MASK: usize = BUFFER_SIZE - 1;

const _: () = assert!(BUFFER_SIZE.is_power_of_two());

/// Fixed-capacity byte FIFO. One slot is sacrificed to tell a full
/// buffer from an empty one, so it holds at most `BUFFER_SIZE - 1` bytes.
pub struct RingBuffer {
    data: [u8; BUFFER_SIZE],
    head: usize,
    tail: usize,
}

impl RingBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; BUFFER_SIZE],
            head: 0,
            tail: 0,
        }
    }

    /// Store a byte at the head. Fails when the buffer is full.
    pub fn push(&mut self, byte: u8) -> bool {
        let next_head = (self.head + 1) & BUFFER_MASK;
        if next_head == self.tail {
            return false;
        }
        self.data[self.head] = byte;
        self.head = next_head;
        true
    }

    /// Store a byte at the head, dropping the oldest unread byte when the
    /// buffer is full. Returns `true` when a byte was dropped.
    pub fn push_overwrite(&mut self, byte: u8) -> bool {
        let dropped = !self.push(byte);
        if dropped {
            self.tail = (self.tail + 1) & BUFFER_MASK;
            self.data[self.head] = byte;
            self.head = (self.head + 1) & BUFFER_MASK;
        }
        dropped
    }

    /// Take the oldest byte from the tail.
    pub fn pop(&mut self) -> Option<u8> {
        if self.head == self.tail {
            return None;
        }
        let byte = self.data[self.tail];
        self.tail = (self.tail + 1) & BUFFER_MASK;
        Some(byte)
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        (BUFFER_SIZE + self.head - self.tail) & BUFFER_MASK
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        (self.head + 1) & BUFFER_MASK == self.tail
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.tail = self.head;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// What the receive path does when a byte arrives and the RX ring is
/// full. Either way the overrun counter moves; nothing is reported
/// in-band.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OverflowPolicy {
    /// Drop the oldest unread byte (the original behavior).
    Overwrite,
    /// Drop the incoming byte, keep what is buffered.
    Reject,
}

/// Transmit pump state. `Idle` means the data-register-empty interrupt
/// is disarmed and the next enqueue re-arms it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TxPump {
    Idle,
    Active,
}

/// Configuration errors, fatal at initialization.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConfigError {
    /// No valid UBRR divisor for the requested baud rate.
    UnsupportedBaudRate,
}

/// Narrow register seam for the USART block.
pub trait UartHardware {
    /// Load the baud rate divisor.
    fn set_baud_divisor(&mut self, ubrr: u16);
    /// Enable receiver, transmitter and the receive-complete interrupt.
    fn enable(&mut self);
    /// Write the data register (transmit one byte).
    fn write_data(&mut self, byte: u8);
    /// Read the data register (the byte just received).
    fn read_data(&self) -> u8;
    /// Arm the data-register-empty interrupt.
    fn arm_tx_interrupt(&mut self);
    /// Disarm the data-register-empty interrupt.
    fn disarm_tx_interrupt(&mut self);
}

/// Full-duplex byte-stream transport.
pub struct Serial<H> {
    hw: H,
    rx: RingBuffer,
    tx: RingBuffer,
    pump: TxPump,
    policy: OverflowPolicy,
    rx_overruns: u16,
}

/// UBRR = F_CPU / (16 * baud) - 1, asynchronous normal mode.
fn baud_divisor(baud: u32) -> Result<u16, ConfigError> {
    if baud == 0 {
        return Err(ConfigError::UnsupportedBaudRate);
    }
    let divisor = config::CPU_FREQ_HZ / 16 / baud;
    if divisor == 0 || divisor > 4096 {
        return Err(ConfigError::UnsupportedBaudRate);
    }
    Ok((divisor - 1) as u16)
}

impl<H: UartHardware> Serial<H> {
    /// Initialize the port at the given baud rate.
    ///
    /// An unrepresentable rate is fatal: the hardware is left untouched.
    pub fn new(hw: H, baud: u32) -> Result<Self, ConfigError> {
        let divisor = baud_divisor(baud)?;
        let mut hw = hw;
        hw.set_baud_divisor(divisor);
        hw.enable();
        Ok(Self {
            hw,
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            pump: TxPump::Idle,
            policy: OverflowPolicy::Overwrite,
            rx_overruns: 0,
        })
    }

    /// Select the RX overflow policy (default: [`OverflowPolicy::Overwrite`]).
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enqueue a byte for transmission.
    ///
    /// Returns `WouldBlock` when the TX ring is full; the caller spins
    /// (outside any critical section) while the interrupt drains. The
    /// first byte into an idle pump arms the transmit interrupt.
    pub fn try_send(&mut self, byte: u8) -> nb::Result<(), Infallible> {
        if !self.tx.push(byte) {
            return Err(nb::Error::WouldBlock);
        }
        if self.pump == TxPump::Idle {
            self.pump = TxPump::Active;
            self.hw.arm_tx_interrupt();
        }
        Ok(())
    }

    /// Number of received bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Take the oldest received byte.
    pub fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop()
    }

    /// Discard all pending received bytes.
    pub fn flush(&mut self) {
        self.rx.clear();
    }

    /// RX overruns since initialization (bytes lost under either
    /// overflow policy). Wraps.
    pub fn rx_overruns(&self) -> u16 {
        self.rx_overruns
    }

    /// TX ring has nothing left to send.
    pub fn tx_idle(&self) -> bool {
        self.tx.is_empty()
    }

    /// Receive-complete handler: one incoming byte into the RX ring.
    pub fn rx_interrupt(&mut self) {
        let byte = self.hw.read_data();
        let lost = match self.policy {
            OverflowPolicy::Overwrite => self.rx.push_overwrite(byte),
            OverflowPolicy::Reject => !self.rx.push(byte),
        };
        if lost {
            self.rx_overruns = self.rx_overruns.wrapping_add(1);
        }
    }

    /// Data-register-empty handler: next TX byte onto the wire, or
    /// disarm when the ring is empty.
    pub fn tx_interrupt(&mut self) {
        match self.tx.pop() {
            Some(byte) => self.hw.write_data(byte),
            None => {
                self.hw.disarm_tx_interrupt();
                self.pump = TxPump::Idle;
            }
        }
    }

    /// Release the hardware handle.
    pub fn free(self) -> H {
        self.hw
    }
}

impl<H: UartHardware> embedded_hal::serial::Write<u8> for Serial<H> {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Infallible> {
        self.try_send(word)
    }

    fn flush(&mut self) -> nb::Result<(), Infallible> {
        if self.tx.is_empty() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<H: UartHardware> embedded_hal::serial::Read<u8> for Serial<H> {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.rx.pop().ok_or(nb::Error::WouldBlock)
    }
}

impl<H: UartHardware> ufmt::uWrite for Serial<H> {
    type Error = Infallible;

    /// Feeds the rendered text byte-by-byte through the enqueue path,
    /// busy-waiting on a full ring. Relies on the transmit interrupt
    /// draining concurrently.
    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        for byte in s.bytes() {
            nb::block!(self.try_send(byte))?;
        }
        Ok(())
    }
}
