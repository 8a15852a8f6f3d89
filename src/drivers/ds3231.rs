//! DS3231 real-time clock client.
//!
//! Time and calendar registers are BCD on the wire. Setting the time
//! halts the clock while minute and hour land, then writes the second,
//! which lets the oscillator count resume from a clean edge.

use embedded_hal::blocking::i2c::{Write, WriteRead};

pub const ADDRESS: u8 = 0x68;

// Register map
const SECONDS_REGISTER: u8 = 0x00;
const DAY_REGISTER: u8 = 0x03;
const DATE_REGISTER: u8 = 0x04;
const STATUS_REGISTER: u8 = 0x0F;
const TEMP_HIGH_REGISTER: u8 = 0x11;

const STOP_CLOCK_BIT: u8 = 0x80;
const OSCILLATOR_STOP_BIT: u8 = 0x80;

pub struct Ds3231<I2C> {
    i2c: I2C,
}

impl<I2C, E> Ds3231<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Set hour, minute and second (24h).
    pub fn set_time(&mut self, hour: u8, minute: u8, second: u8) -> Result<(), E> {
        self.i2c.write(
            ADDRESS,
            &[
                SECONDS_REGISTER,
                STOP_CLOCK_BIT,
                dec_to_bcd(minute),
                dec_to_bcd(hour),
            ],
        )?;
        self.i2c
            .write(ADDRESS, &[SECONDS_REGISTER, dec_to_bcd(second)])
    }

    /// Current (hour, minute, second).
    pub fn time(&mut self) -> Result<(u8, u8, u8), E> {
        let mut raw = [0u8; 3];
        self.i2c
            .write_read(ADDRESS, &[SECONDS_REGISTER], &mut raw)?;
        Ok((
            bcd_to_dec(raw[2] & 0x3F),
            bcd_to_dec(raw[1] & 0x7F),
            bcd_to_dec(raw[0] & 0x7F),
        ))
    }

    /// Set date, month and two-digit year.
    pub fn set_date(&mut self, date: u8, month: u8, year: u8) -> Result<(), E> {
        self.i2c.write(
            ADDRESS,
            &[
                DATE_REGISTER,
                dec_to_bcd(date),
                dec_to_bcd(month),
                dec_to_bcd(year),
            ],
        )
    }

    /// Current (date, month, year), century bit masked off.
    pub fn date(&mut self) -> Result<(u8, u8, u8), E> {
        let mut raw = [0u8; 3];
        self.i2c.write_read(ADDRESS, &[DATE_REGISTER], &mut raw)?;
        Ok((
            bcd_to_dec(raw[0] & 0x3F),
            bcd_to_dec(raw[1] & 0x1F),
            bcd_to_dec(raw[2]),
        ))
    }

    /// Set the day-of-week counter (1..=7, meaning is the caller's).
    pub fn set_day_of_week(&mut self, day: u8) -> Result<(), E> {
        self.i2c.write(ADDRESS, &[DAY_REGISTER, day])
    }

    pub fn day_of_week(&mut self) -> Result<u8, E> {
        let mut raw = [0u8; 1];
        self.i2c.write_read(ADDRESS, &[DAY_REGISTER], &mut raw)?;
        Ok(raw[0] & 0x07)
    }

    /// Die temperature, whole degrees Celsius.
    pub fn temperature(&mut self) -> Result<i8, E> {
        let mut raw = [0u8; 1];
        self.i2c
            .write_read(ADDRESS, &[TEMP_HIGH_REGISTER], &mut raw)?;
        Ok(raw[0] as i8)
    }

    /// Die temperature in quarter-degree steps (degrees Celsius times
    /// four), 10-bit two's complement from the MSB/LSB register pair.
    pub fn temperature_quarters(&mut self) -> Result<i16, E> {
        let mut raw = [0u8; 2];
        self.i2c
            .write_read(ADDRESS, &[TEMP_HIGH_REGISTER], &mut raw)?;
        Ok((i16::from(raw[0] as i8) << 2) | i16::from(raw[1] >> 6))
    }

    /// Oscillator-stop flag: the clock lost power at some point and the
    /// time cannot be trusted until set again.
    pub fn oscillator_stopped(&mut self) -> Result<bool, E> {
        let mut raw = [0u8; 1];
        self.i2c
            .write_read(ADDRESS, &[STATUS_REGISTER], &mut raw)?;
        Ok(raw[0] & OSCILLATOR_STOP_BIT != 0)
    }

    pub fn free(self) -> I2C {
        self.i2c
    }
}

fn bcd_to_dec(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

fn dec_to_bcd(dec: u8) -> u8 {
    ((dec / 10) << 4) | (dec % 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::i2c::{Mock, Transaction};

    #[test]
    fn bcd_round_trip() {
        for value in 0..=99u8 {
            assert_eq!(bcd_to_dec(dec_to_bcd(value)), value);
        }
        assert_eq!(dec_to_bcd(59), 0x59);
        assert_eq!(bcd_to_dec(0x12), 12);
    }

    #[test]
    fn set_time_halts_clock_then_writes_second() {
        let mut rtc = Ds3231::new(Mock::new(&[
            Transaction::write(ADDRESS, vec![0x00, 0x80, 0x34, 0x12]),
            Transaction::write(ADDRESS, vec![0x00, 0x56]),
        ]));
        rtc.set_time(12, 34, 56).unwrap();
        rtc.free().done();
    }

    #[test]
    fn time_is_read_in_one_burst() {
        let mut rtc = Ds3231::new(Mock::new(&[Transaction::write_read(
            ADDRESS,
            vec![0x00],
            vec![0x30, 0x59, 0x23],
        )]));
        assert_eq!(rtc.time().unwrap(), (23, 59, 30));
        rtc.free().done();
    }

    #[test]
    fn date_masks_century_bit() {
        let mut rtc = Ds3231::new(Mock::new(&[Transaction::write_read(
            ADDRESS,
            vec![0x04],
            vec![0x31, 0x92, 0x24], // month has the century bit set
        )]));
        assert_eq!(rtc.date().unwrap(), (31, 12, 24));
        rtc.free().done();
    }

    #[test]
    fn negative_temperature() {
        let mut rtc = Ds3231::new(Mock::new(&[Transaction::write_read(
            ADDRESS,
            vec![0x11],
            vec![0xE7],
        )]));
        assert_eq!(rtc.temperature().unwrap(), -25);
        rtc.free().done();
    }

    #[test]
    fn fractional_temperature() {
        let mut rtc = Ds3231::new(Mock::new(&[
            // +25.75C and -0.25C.
            Transaction::write_read(ADDRESS, vec![0x11], vec![0x19, 0xC0]),
            Transaction::write_read(ADDRESS, vec![0x11], vec![0xFF, 0xC0]),
        ]));
        assert_eq!(rtc.temperature_quarters().unwrap(), 103);
        assert_eq!(rtc.temperature_quarters().unwrap(), -1);
        rtc.free().done();
    }

    #[test]
    fn oscillator_stop_flag() {
        let mut rtc = Ds3231::new(Mock::new(&[
            Transaction::write_read(ADDRESS, vec![0x0F], vec![0x88]),
            Transaction::write_read(ADDRESS, vec![0x0F], vec![0x08]),
        ]));
        assert!(rtc.oscillator_stopped().unwrap());
        assert!(!rtc.oscillator_stopped().unwrap());
        rtc.free().done();
    }
}
