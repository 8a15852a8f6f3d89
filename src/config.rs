//! Configuration constants for the driver crate.

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// Default UART baud rate
pub const UART_BAUD: u32 = 9600;

/// UART ring buffer capacity, must be a power of two
pub const UART_BUFFER_SIZE: usize = 128;

/// Keypad debounce interval in milliseconds
pub const KEYPAD_DEBOUNCE_MS: u32 = 100;

/// AT24C32 internal write cycle time in milliseconds
pub const EEPROM_WRITE_CYCLE_MS: u8 = 5;

/// Prescaler for the millisecond tick compare interrupt
pub const TICK_PRESCALER: u32 = 64;
