//! Bare-metal peripheral drivers for ATmega8-family AVRs.
//!
//! The crate is built around two register-level subsystems: a two-wire
//! (I2C) bus master ([`hal::twi`]) and an interrupt-driven UART transport
//! with ring-buffered RX/TX paths ([`hal::uart`]). Both are generic over a
//! narrow hardware-access trait, so the transaction state machine and the
//! buffer logic compile and unit-test on the host; the real register
//! implementations and interrupt vectors live in [`hal::avr`], which is
//! only compiled for AVR targets.
//!
//! On top of the bus sit the usual smart-clock peripherals: an AT24C32
//! EEPROM, a DS3231 RTC, a PCF8574 port expander, and an HD44780 LCD and
//! 4x4 keypad driven through the expander. The clients talk
//! `embedded-hal` blocking i2c, so they run over [`hal::twi::Twi`] on
//! target and over `embedded-hal-mock` in tests.

#![cfg_attr(not(test), no_std)]

#[cfg(all(target_arch = "avr", feature = "atmega8"))]
use panic_halt as _;

pub mod config;
pub mod drivers;
pub mod hal;
