pub mod at24c32;
pub mod console;
pub mod ds3231;
pub mod keypad;
pub mod lcd;
pub mod pcf8574;

// Re-export commonly used types
pub use at24c32::At24c32;
pub use console::Console;
pub use ds3231::Ds3231;
pub use keypad::Keypad;
pub use lcd::Lcd;
pub use pcf8574::Pcf8574;
