//! ATmega8 hardware-access profile.
//!
//! Implements the [`TwiHardware`] and [`UartHardware`] seams against the
//! real register blocks, defines the interrupt vectors, and hosts the
//! shared console instance and millisecond counter. This is the only
//! module that touches `avr-device`; everything above it is
//! target-independent.

use core::cell::{Cell, RefCell};
use core::marker::PhantomData;

use avr_device::atmega8::{TC2, TWI, USART};
use avr_device::interrupt::{self, Mutex};
use embedded_hal::blocking::delay::{DelayMs, DelayUs};

use super::timer::compare_match_value;
use super::twi::{Ack, BusSpeed, Twi, TwiHardware};
use super::uart::{ConfigError, Serial, UartHardware};
use crate::config;

// TWCR control words: TWINT | TWEN, plus TWSTA / TWSTO / TWEA per phase.
const TWCR_START: u8 = 0xA4;
const TWCR_TRANSFER: u8 = 0x84;
const TWCR_TRANSFER_ACK: u8 = 0xC4;
const TWCR_STOP: u8 = 0x94;
const TWCR_TWINT: u8 = 0x80;
const TWCR_TWSTO: u8 = 0x10;

/// TWI register block. Constructed by consuming the PAC peripheral so
/// only one handle can exist.
pub struct TwiRegs {
    _twi: PhantomData<TWI>,
}

impl TwiRegs {
    pub fn new(_twi: TWI) -> Self {
        Self { _twi: PhantomData }
    }
}

impl TwiHardware for TwiRegs {
    fn set_bit_rate(&mut self, divisor: u8) {
        unsafe {
            let p = TWI::ptr();
            (*p).twbr.write(|w| w.bits(divisor));
            (*p).twsr.write(|w| w.bits(0));
        }
    }

    fn send_start(&mut self) {
        unsafe { (*TWI::ptr()).twcr.write(|w| w.bits(TWCR_START)) }
    }

    fn send_stop(&mut self) {
        unsafe { (*TWI::ptr()).twcr.write(|w| w.bits(TWCR_STOP)) }
    }

    fn stop_pending(&self) -> bool {
        unsafe { (*TWI::ptr()).twcr.read().bits() & TWCR_TWSTO != 0 }
    }

    fn load_data(&mut self, byte: u8) {
        unsafe { (*TWI::ptr()).twdr.write(|w| w.bits(byte)) }
    }

    fn fetch_data(&self) -> u8 {
        unsafe { (*TWI::ptr()).twdr.read().bits() }
    }

    fn transmit(&mut self) {
        unsafe { (*TWI::ptr()).twcr.write(|w| w.bits(TWCR_TRANSFER)) }
    }

    fn receive(&mut self, ack: Ack) {
        let bits = match ack {
            Ack::Ack => TWCR_TRANSFER_ACK,
            Ack::Nack => TWCR_TRANSFER,
        };
        unsafe { (*TWI::ptr()).twcr.write(|w| w.bits(bits)) }
    }

    fn phase_complete(&self) -> bool {
        unsafe { (*TWI::ptr()).twcr.read().bits() & TWCR_TWINT != 0 }
    }

    fn status(&self) -> u8 {
        unsafe { (*TWI::ptr()).twsr.read().bits() & 0xF8 }
    }
}

/// Bus master over the on-chip TWI block.
pub fn twi(twi: TWI, speed: BusSpeed) -> Twi<TwiRegs> {
    Twi::new(TwiRegs::new(twi), speed)
}

// UCSRB: RXCIE | RXEN | TXEN, UDRIE armed separately by the transport.
const UCSRB_ENABLE: u8 = 0x98;
const UCSRB_UDRIE: u8 = 0x20;
// UCSRC: URSEL selects UCSRC, 8 data bits.
const UCSRC_8BIT: u8 = 0x86;

/// USART register block.
pub struct UsartRegs {
    _usart: PhantomData<USART>,
}

impl UsartRegs {
    pub fn new(_usart: USART) -> Self {
        Self {
            _usart: PhantomData,
        }
    }
}

impl UartHardware for UsartRegs {
    fn set_baud_divisor(&mut self, ubrr: u16) {
        unsafe {
            let p = USART::ptr();
            (*p).ubrrh.write(|w| w.bits((ubrr >> 8) as u8));
            (*p).ubrrl.write(|w| w.bits(ubrr as u8));
        }
    }

    fn enable(&mut self) {
        unsafe {
            let p = USART::ptr();
            (*p).ucsrc.write(|w| w.bits(UCSRC_8BIT));
            (*p).ucsrb.write(|w| w.bits(UCSRB_ENABLE));
        }
    }

    fn write_data(&mut self, byte: u8) {
        unsafe { (*USART::ptr()).udr.write(|w| w.bits(byte)) }
    }

    fn read_data(&self) -> u8 {
        unsafe { (*USART::ptr()).udr.read().bits() }
    }

    fn arm_tx_interrupt(&mut self) {
        unsafe {
            (*USART::ptr())
                .ucsrb
                .modify(|r, w| w.bits(r.bits() | UCSRB_UDRIE))
        }
    }

    fn disarm_tx_interrupt(&mut self) {
        unsafe {
            (*USART::ptr())
                .ucsrb
                .modify(|r, w| w.bits(r.bits() & !UCSRB_UDRIE))
        }
    }
}

// The console transport is shared with the two USART interrupt handlers,
// so it lives behind a critical-section mutex; every foreground access is
// a short interrupts-disabled window.
static CONSOLE: Mutex<RefCell<Option<Serial<UsartRegs>>>> = Mutex::new(RefCell::new(None));

/// Bring up the shared serial console and enable interrupts.
pub fn console_init(usart: USART, baud: u32) -> Result<(), ConfigError> {
    let serial = Serial::new(UsartRegs::new(usart), baud)?;
    interrupt::free(|cs| {
        CONSOLE.borrow(cs).replace(Some(serial));
    });
    unsafe { interrupt::enable() };
    Ok(())
}

/// Enqueue a byte, busy-waiting while the TX ring is full.
///
/// The wait spins outside the critical section so the data-register-empty
/// interrupt can keep draining.
pub fn console_send(byte: u8) {
    loop {
        let queued = interrupt::free(|cs| match CONSOLE.borrow(cs).borrow_mut().as_mut() {
            Some(serial) => serial.try_send(byte).is_ok(),
            None => true, // no console, nowhere to spin towards
        });
        if queued {
            break;
        }
    }
}

/// Bytes waiting in the console receive ring.
pub fn console_available() -> usize {
    interrupt::free(|cs| {
        CONSOLE
            .borrow(cs)
            .borrow()
            .as_ref()
            .map_or(0, |serial| serial.available())
    })
}

/// Oldest received byte, if any.
pub fn console_read() -> Option<u8> {
    interrupt::free(|cs| {
        CONSOLE
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .and_then(|serial| serial.read_byte())
    })
}

/// Discard everything in the console receive ring.
pub fn console_flush() {
    interrupt::free(|cs| {
        if let Some(serial) = CONSOLE.borrow(cs).borrow_mut().as_mut() {
            serial.flush();
        }
    })
}

/// Receive overruns since the console came up.
pub fn console_rx_overruns() -> u16 {
    interrupt::free(|cs| {
        CONSOLE
            .borrow(cs)
            .borrow()
            .as_ref()
            .map_or(0, |serial| serial.rx_overruns())
    })
}

#[avr_device::interrupt(atmega8)]
fn USART_RXC() {
    interrupt::free(|cs| {
        if let Some(serial) = CONSOLE.borrow(cs).borrow_mut().as_mut() {
            serial.rx_interrupt();
        }
    })
}

#[avr_device::interrupt(atmega8)]
fn USART_UDRE() {
    interrupt::free(|cs| {
        if let Some(serial) = CONSOLE.borrow(cs).borrow_mut().as_mut() {
            serial.tx_interrupt();
        }
    })
}

static MILLIS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

const TICK_COMPARE: u8 = match compare_match_value(config::TICK_PRESCALER) {
    Some(value) => value,
    None => panic!("millisecond tick does not fit the 8-bit compare register"),
};

// TCCR2: CTC mode (WGM21), prescaler 64 (CS22).
const TCCR2_CTC_DIV64: u8 = 0x0C;
const TIMSK_OCIE2: u8 = 0x80;

/// Start the millisecond tick on timer 2 and enable interrupts.
pub fn millis_init(_tc2: TC2) {
    unsafe {
        let p = TC2::ptr();
        (*p).tcnt2.write(|w| w.bits(0));
        (*p).ocr2.write(|w| w.bits(TICK_COMPARE));
        (*p).tccr2.write(|w| w.bits(TCCR2_CTC_DIV64));
        (*p).timsk.modify(|r, w| w.bits(r.bits() | TIMSK_OCIE2));
        interrupt::enable();
    }
}

/// Milliseconds since [`millis_init`], snapshotted with interrupts
/// disabled because the counter is wider than one interrupt write.
pub fn millis() -> u32 {
    interrupt::free(|cs| MILLIS.borrow(cs).get())
}

#[avr_device::interrupt(atmega8)]
fn TIMER2_COMP() {
    interrupt::free(|cs| {
        let counter = MILLIS.borrow(cs);
        counter.set(counter.get().wrapping_add(1));
    })
}

/// Delay provider backed by the millisecond tick (and a cycle loop for
/// the sub-millisecond strobes the LCD needs).
pub struct TickDelay;

impl DelayMs<u8> for TickDelay {
    fn delay_ms(&mut self, ms: u8) {
        let start = millis();
        while super::timer::elapsed_ms(millis(), start) < ms as u32 {}
    }
}

impl DelayUs<u8> for TickDelay {
    fn delay_us(&mut self, us: u8) {
        // Approximate: a nop loop iteration is about four cycles.
        for _ in 0..(us as u32 * (config::CPU_FREQ_HZ / 4_000_000)) {
            avr_device::asm::nop();
        }
    }
}
