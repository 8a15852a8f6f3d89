pub mod timer;
pub mod twi;
pub mod uart;

#[cfg(all(target_arch = "avr", feature = "atmega8"))]
pub mod avr;

// Re-export commonly used types
pub use twi::{Ack, BusSpeed, Twi, TwiHardware};
pub use uart::{OverflowPolicy, RingBuffer, Serial, UartHardware};
