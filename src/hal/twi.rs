//! TWI (I2C) bus master transaction engine.
//!
//! One [`Twi`] instance owns one physical bus. A transaction runs as a
//! session: `begin_transmission`/`request_from` opens it with a START and
//! the addressed direction, `write`/`read` move data, and
//! `end_transmission` closes it with a STOP. Every phase busy-waits on
//! the hardware completion flag; there is no timeout and no retry, a
//! stuck slave hangs the caller (single trusted bus, watchdog recovery
//! is outside this layer).
//!
//! All register access goes through [`TwiHardware`], so the state machine
//! runs against a scripted mock in tests and against the real TWI block
//! on target.

use crate::config;

/// TWI speed classes with their TWBR divisors (16MHz CPU clock, no
/// status-register prescaler).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusSpeed {
    Standard100k,
    Fast250k,
    Fast400k,
}

impl BusSpeed {
    /// Map a bus clock in Hz to a speed class.
    ///
    /// Only the three divisor table entries are valid; anything else is a
    /// fatal configuration error and the engine refuses to start.
    pub fn from_hz(hz: u32) -> Result<Self, Error> {
        match hz {
            100_000 => Ok(BusSpeed::Standard100k),
            250_000 => Ok(BusSpeed::Fast250k),
            400_000 => Ok(BusSpeed::Fast400k),
            _ => Err(Error::UnsupportedSpeed),
        }
    }

    fn divisor(self) -> u8 {
        match self {
            BusSpeed::Standard100k => 72,
            BusSpeed::Fast250k => 24,
            BusSpeed::Fast400k => 12,
        }
    }
}

/// TWI status codes, TWSR with the prescaler bits masked off.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Status {
    StartTransmitted = 0x08,
    RepStartTransmitted = 0x10,
    AddrWriteAck = 0x18,
    AddrWriteNack = 0x20,
    DataWriteAck = 0x28,
    DataWriteNack = 0x30,
    ArbitrationLost = 0x38,
    AddrReadAck = 0x40,
    AddrReadNack = 0x48,
    DataReadAck = 0x50,
    DataReadNack = 0x58,
}

/// Acknowledgment bit sent back to the slave after a received byte.
/// `Ack` requests more data, `Nack` signals the last byte.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ack {
    Ack,
    Nack,
}

/// Bus engine errors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// Requested bus speed has no divisor table entry.
    UnsupportedSpeed,
    /// Operation called outside the matching session phase, e.g. `read`
    /// with no open `request_from`. The hardware is never touched.
    Sequence,
    /// Slave did not acknowledge the address or a data byte.
    Nack,
    /// Unexpected status code after a phase completed.
    Bus(u8),
}

/// Narrow register seam for the TWI block.
///
/// The methods map one-to-one onto TWBR/TWCR/TWDR/TWSR accesses; the
/// engine above never touches a register directly.
pub trait TwiHardware {
    /// Load the bit-rate divisor and clear the status prescaler.
    fn set_bit_rate(&mut self, divisor: u8);
    /// Issue a START (or repeated START) condition.
    fn send_start(&mut self);
    /// Issue a STOP condition.
    fn send_stop(&mut self);
    /// STOP still being driven onto the bus.
    fn stop_pending(&self) -> bool;
    /// Load the data register.
    fn load_data(&mut self, byte: u8);
    /// Read the data register.
    fn fetch_data(&self) -> u8;
    /// Clear the interrupt flag and shift the loaded byte out.
    fn transmit(&mut self);
    /// Clear the interrupt flag and shift a byte in, answering with the
    /// given acknowledgment.
    fn receive(&mut self, ack: Ack);
    /// Current phase has completed (TWINT set).
    fn phase_complete(&self) -> bool;
    /// Status code with the prescaler bits masked off.
    fn status(&self) -> u8;
}

const DIRECTION_WRITE: u8 = 0;
const DIRECTION_READ: u8 = 1;

/// Session phase. At most one session is open at a time; `read`/`write`
/// are only legal in the matching direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Idle,
    MasterTransmit,
    MasterReceive { remaining: u8 },
}

/// TWI bus master.
pub struct Twi<H> {
    hw: H,
    phase: Phase,
}

impl<H: TwiHardware> Twi<H> {
    /// Initialize the bus at the given speed class.
    pub fn new(hw: H, speed: BusSpeed) -> Self {
        let mut hw = hw;
        hw.set_bit_rate(speed.divisor());
        Self {
            hw,
            phase: Phase::Idle,
        }
    }

    /// Initialize the bus from a raw clock rate in Hz.
    ///
    /// Fails with [`Error::UnsupportedSpeed`] when the rate has no
    /// divisor table entry; nothing is written to the hardware then.
    pub fn with_bus_clock(hw: H, hz: u32) -> Result<Self, Error> {
        Ok(Self::new(hw, BusSpeed::from_hz(hz)?))
    }

    /// Open a write session: START, then the 7-bit address with the
    /// write bit.
    ///
    /// Legal from idle or from an open write session (repeated START,
    /// used by register-pointer writes).
    pub fn begin_transmission(&mut self, address: u8) -> Result<(), Error> {
        match self.phase {
            Phase::Idle | Phase::MasterTransmit => {}
            Phase::MasterReceive { .. } => return Err(Error::Sequence),
        }
        self.start()?;
        // Session counts as open from here so a failed address phase can
        // still be closed with a STOP.
        self.phase = Phase::MasterTransmit;
        self.send_address(address, DIRECTION_WRITE)
    }

    /// Send one byte to the addressed slave.
    pub fn write(&mut self, byte: u8) -> Result<(), Error> {
        if self.phase != Phase::MasterTransmit {
            return Err(Error::Sequence);
        }
        self.hw.load_data(byte);
        self.hw.transmit();
        self.wait();
        match self.hw.status() {
            s if s == Status::DataWriteAck as u8 => Ok(()),
            s if s == Status::DataWriteNack as u8 => Err(Error::Nack),
            s => Err(Error::Bus(s)),
        }
    }

    /// Open a read session for `count` bytes: START, then the address
    /// with the read bit.
    ///
    /// Legal from idle or from an open write session (repeated START).
    /// The count drives the ACK/NACK decision in [`Twi::read`].
    pub fn request_from(&mut self, address: u8, count: u8) -> Result<(), Error> {
        match self.phase {
            Phase::Idle | Phase::MasterTransmit => {}
            Phase::MasterReceive { .. } => return Err(Error::Sequence),
        }
        self.start()?;
        self.phase = Phase::MasterReceive { remaining: count };
        self.send_address(address, DIRECTION_READ)
    }

    /// Receive the next byte of an open read session.
    ///
    /// Answers ACK while more bytes remain and NACK on the last expected
    /// byte. Reading past the requested count fails with
    /// [`Error::Sequence`] without touching the hardware; a finished
    /// session is not re-armed.
    pub fn read(&mut self) -> Result<u8, Error> {
        let remaining = match self.phase {
            Phase::MasterReceive { remaining } if remaining > 0 => remaining - 1,
            _ => return Err(Error::Sequence),
        };
        self.phase = Phase::MasterReceive { remaining };
        let ack = if remaining > 0 { Ack::Ack } else { Ack::Nack };
        self.hw.receive(ack);
        self.wait();
        match self.hw.status() {
            s if s == Status::DataReadAck as u8 || s == Status::DataReadNack as u8 => {
                Ok(self.hw.fetch_data())
            }
            s => Err(Error::Bus(s)),
        }
    }

    /// Close the session: STOP, then wait for it to be physically sent.
    ///
    /// A no-op when no session is open; clients call this
    /// unconditionally in cleanup paths.
    pub fn end_transmission(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }
        self.hw.send_stop();
        while self.hw.stop_pending() {}
        self.phase = Phase::Idle;
    }

    /// Release the hardware handle.
    pub fn free(self) -> H {
        self.hw
    }

    fn wait(&self) {
        while !self.hw.phase_complete() {}
    }

    fn start(&mut self) -> Result<(), Error> {
        self.hw.send_start();
        self.wait();
        match self.hw.status() {
            s if s == Status::StartTransmitted as u8
                || s == Status::RepStartTransmitted as u8 =>
            {
                Ok(())
            }
            s => Err(Error::Bus(s)),
        }
    }

    fn send_address(&mut self, address: u8, direction: u8) -> Result<(), Error> {
        self.hw.load_data((address << 1) | direction);
        self.hw.transmit();
        self.wait();
        let (ack, nack) = if direction == DIRECTION_READ {
            (Status::AddrReadAck, Status::AddrReadNack)
        } else {
            (Status::AddrWriteAck, Status::AddrWriteNack)
        };
        match self.hw.status() {
            s if s == ack as u8 => Ok(()),
            s if s == nack as u8 => Err(Error::Nack),
            s => Err(Error::Bus(s)),
        }
    }

    fn write_all(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error> {
        self.begin_transmission(address)?;
        for &byte in bytes {
            self.write(byte)?;
        }
        Ok(())
    }

    fn read_into(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        let count = u8::try_from(buffer.len()).map_err(|_| Error::Sequence)?;
        self.request_from(address, count)?;
        for slot in buffer.iter_mut() {
            *slot = self.read()?;
        }
        Ok(())
    }
}

impl<H: TwiHardware> embedded_hal::blocking::i2c::Write for Twi<H> {
    type Error = Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error> {
        let res = self.write_all(address, bytes);
        // Release the bus even when a phase failed mid-transaction.
        self.end_transmission();
        res
    }
}

impl<H: TwiHardware> embedded_hal::blocking::i2c::Read for Twi<H> {
    type Error = Error;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        let res = self.read_into(address, buffer);
        self.end_transmission();
        res
    }
}

impl<H: TwiHardware> embedded_hal::blocking::i2c::WriteRead for Twi<H> {
    type Error = Error;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
        let res = self
            .write_all(address, bytes)
            .and_then(|()| self.read_into(address, buffer));
        self.end_transmission();
        res
    }
}

// Keep the speed table honest against the original divisor math,
// TWBR = (F_CPU / SCL - 16) / 2.
const _: () = assert!((config::CPU_FREQ_HZ / 100_000 - 16) / 2 == 72);
const _: () = assert!((config::CPU_FREQ_HZ / 400_000 - 16) / 2 == 12);

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use embedded_hal::blocking::i2c::{Read, Write, WriteRead};
    use std::collections::VecDeque;

    #[derive(Clone, PartialEq, Eq, Debug)]
    enum Op {
        BitRate(u8),
        Start,
        Stop,
        Load(u8),
        Transmit,
        Receive(Ack),
        Fetch,
    }

    /// Scripted TWI block: phases complete instantly, status codes and
    /// received bytes are fed from queues.
    #[derive(Default)]
    struct Mock {
        ops: RefCell<Vec<Op>>,
        statuses: RefCell<VecDeque<u8>>,
        data: RefCell<VecDeque<u8>>,
    }

    impl Mock {
        fn scripted(statuses: &[Status]) -> Self {
            let mock = Mock::default();
            mock.statuses
                .borrow_mut()
                .extend(statuses.iter().map(|&s| s as u8));
            mock
        }

        fn push_op(&self, op: Op) {
            self.ops.borrow_mut().push(op);
        }
    }

    impl TwiHardware for &Mock {
        fn set_bit_rate(&mut self, divisor: u8) {
            self.push_op(Op::BitRate(divisor));
        }
        fn send_start(&mut self) {
            self.push_op(Op::Start);
        }
        fn send_stop(&mut self) {
            self.push_op(Op::Stop);
        }
        fn stop_pending(&self) -> bool {
            false
        }
        fn load_data(&mut self, byte: u8) {
            self.push_op(Op::Load(byte));
        }
        fn fetch_data(&self) -> u8 {
            self.push_op(Op::Fetch);
            self.data.borrow_mut().pop_front().unwrap_or(0)
        }
        fn transmit(&mut self) {
            self.push_op(Op::Transmit);
        }
        fn receive(&mut self, ack: Ack) {
            self.push_op(Op::Receive(ack));
        }
        fn phase_complete(&self) -> bool {
            true
        }
        fn status(&self) -> u8 {
            self.statuses.borrow_mut().pop_front().expect("status script exhausted")
        }
    }

    #[test]
    fn speed_table_lookup() {
        assert_eq!(BusSpeed::from_hz(100_000), Ok(BusSpeed::Standard100k));
        assert_eq!(BusSpeed::from_hz(250_000), Ok(BusSpeed::Fast250k));
        assert_eq!(BusSpeed::from_hz(400_000), Ok(BusSpeed::Fast400k));
        assert_eq!(BusSpeed::from_hz(123_456), Err(Error::UnsupportedSpeed));
        assert_eq!(BusSpeed::from_hz(0), Err(Error::UnsupportedSpeed));
    }

    #[test]
    fn unsupported_speed_touches_no_hardware() {
        let mock = Mock::default();
        assert!(Twi::with_bus_clock(&mock, 123_456).is_err());
        assert!(mock.ops.borrow().is_empty());
    }

    #[test]
    fn write_session_phase_sequence() {
        let mock = Mock::scripted(&[
            Status::StartTransmitted,
            Status::AddrWriteAck,
            Status::DataWriteAck,
            Status::DataWriteAck,
        ]);
        let mut twi = Twi::new(&mock, BusSpeed::Fast400k);
        twi.begin_transmission(0x50).unwrap();
        twi.write(0x12).unwrap();
        twi.write(0x34).unwrap();
        twi.end_transmission();

        assert_eq!(
            *mock.ops.borrow(),
            vec![
                Op::BitRate(12),
                Op::Start,
                Op::Load(0xA0), // 0x50 << 1 | write
                Op::Transmit,
                Op::Load(0x12),
                Op::Transmit,
                Op::Load(0x34),
                Op::Transmit,
                Op::Stop,
            ]
        );
    }

    #[test]
    fn read_without_request_fails_fast() {
        let mock = Mock::default();
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        let before = mock.ops.borrow().len();
        assert_eq!(twi.read(), Err(Error::Sequence));
        // No hardware access, no counter movement.
        assert_eq!(mock.ops.borrow().len(), before);
        assert_eq!(twi.read(), Err(Error::Sequence));
    }

    #[test]
    fn write_without_session_fails_fast() {
        let mock = Mock::default();
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        let before = mock.ops.borrow().len();
        assert_eq!(twi.write(0xAA), Err(Error::Sequence));
        assert_eq!(mock.ops.borrow().len(), before);
    }

    #[test]
    fn three_byte_read_acks_then_nacks() {
        let mock = Mock::scripted(&[
            Status::StartTransmitted,
            Status::AddrReadAck,
            Status::DataReadAck,
            Status::DataReadAck,
            Status::DataReadNack,
        ]);
        mock.data.borrow_mut().extend([0x11, 0x22, 0x33]);
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);

        twi.request_from(0x68, 3).unwrap();
        assert_eq!(twi.read(), Ok(0x11));
        assert_eq!(twi.read(), Ok(0x22));
        assert_eq!(twi.read(), Ok(0x33));
        // Counter exhausted, the session is not re-armed.
        assert_eq!(twi.read(), Err(Error::Sequence));

        let acks: Vec<Ack> = mock
            .ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                Op::Receive(ack) => Some(*ack),
                _ => None,
            })
            .collect();
        assert_eq!(acks, vec![Ack::Ack, Ack::Ack, Ack::Nack]);
    }

    #[test]
    fn single_byte_read_nacks_immediately() {
        let mock = Mock::scripted(&[
            Status::StartTransmitted,
            Status::AddrReadAck,
            Status::DataReadNack,
        ]);
        mock.data.borrow_mut().push_back(0x5A);
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        twi.request_from(0x20, 1).unwrap();
        assert_eq!(twi.read(), Ok(0x5A));
        assert!(mock.ops.borrow().contains(&Op::Receive(Ack::Nack)));
    }

    #[test]
    fn address_nack_is_reported_and_bus_released() {
        let mock = Mock::scripted(&[Status::StartTransmitted, Status::AddrWriteNack]);
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        assert_eq!(Write::write(&mut twi, 0x50, &[0x00]), Err(Error::Nack));
        // The composed operation still closed the session.
        assert_eq!(mock.ops.borrow().last(), Some(&Op::Stop));
    }

    #[test]
    fn write_read_uses_repeated_start() {
        let mock = Mock::scripted(&[
            Status::StartTransmitted,
            Status::AddrWriteAck,
            Status::DataWriteAck,
            Status::RepStartTransmitted,
            Status::AddrReadAck,
            Status::DataReadNack,
        ]);
        mock.data.borrow_mut().push_back(0x42);
        let mut twi = Twi::new(&mock, BusSpeed::Fast400k);

        let mut out = [0u8; 1];
        twi.write_read(0x68, &[0x00], &mut out).unwrap();
        assert_eq!(out, [0x42]);

        let starts = mock
            .ops
            .borrow()
            .iter()
            .filter(|op| **op == Op::Start)
            .count();
        let stops = mock
            .ops
            .borrow()
            .iter()
            .filter(|op| **op == Op::Stop)
            .count();
        // Two STARTs (the second repeated), exactly one STOP at the end.
        assert_eq!(starts, 2);
        assert_eq!(stops, 1);
        assert_eq!(mock.ops.borrow().last(), Some(&Op::Stop));
    }

    #[test]
    fn blocking_read_trait_round_trip() {
        let mock = Mock::scripted(&[
            Status::StartTransmitted,
            Status::AddrReadAck,
            Status::DataReadAck,
            Status::DataReadNack,
        ]);
        mock.data.borrow_mut().extend([0xDE, 0xAD]);
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        let mut buf = [0u8; 2];
        Read::read(&mut twi, 0x3C, &mut buf).unwrap();
        assert_eq!(buf, [0xDE, 0xAD]);
    }

    #[test]
    fn request_from_during_read_session_is_rejected() {
        let mock = Mock::scripted(&[Status::StartTransmitted, Status::AddrReadAck]);
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        twi.request_from(0x68, 2).unwrap();
        assert_eq!(twi.request_from(0x50, 1), Err(Error::Sequence));
        assert_eq!(twi.begin_transmission(0x50), Err(Error::Sequence));
    }

    #[test]
    fn end_transmission_when_idle_is_a_no_op() {
        let mock = Mock::default();
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        twi.end_transmission();
        assert_eq!(*mock.ops.borrow(), vec![Op::BitRate(72)]);
    }

    #[test]
    fn unexpected_status_surfaces_raw_code() {
        let mock = Mock::scripted(&[Status::ArbitrationLost]);
        let mut twi = Twi::new(&mock, BusSpeed::Standard100k);
        assert_eq!(
            twi.begin_transmission(0x10),
            Err(Error::Bus(Status::ArbitrationLost as u8))
        );
    }
}
