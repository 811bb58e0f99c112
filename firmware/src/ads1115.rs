//! ADS1115 16-bit I2C converter, single-ended single-shot reads.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// Address with ADDR tied to ground.
pub const DEFAULT_ADDRESS: u8 = 0x48;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Start a conversion (write) / conversion idle (read).
const OS: u16 = 1 << 15;
/// AINx against GND; the channel is added to bits 12..14.
const MUX_SINGLE_AIN0: u16 = 0b100 << 12;
/// Full scale +-4.096 V.
const PGA_4V096: u16 = 0b001 << 9;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
/// 860 samples per second.
const DR_860: u16 = 0b111 << 5;
const COMPARATOR_DISABLED: u16 = 0b11;

/// Status polls before giving up, 100 us apart.
const CONVERSION_POLLS: u8 = 20;

/// Number of single-ended inputs.
pub const CHANNELS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Ads1115Error {
    /// Channel index above 3.
    NoSuchChannel,
    /// I2C transfer failed.
    Bus,
    /// Conversion did not finish.
    Timeout,
}

pub struct Ads1115<I, D> {
    i2c: I,
    delay: D,
    address: u8,
}

impl<I: I2c, D: DelayNs> Ads1115<I, D> {
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Convert `channel` against ground and return the signed result.
    pub fn read_single_ended(&mut self, channel: u8) -> Result<i16, Ads1115Error> {
        if channel >= CHANNELS {
            return Err(Ads1115Error::NoSuchChannel);
        }
        let config = OS
            | MUX_SINGLE_AIN0
            | (u16::from(channel) << 12)
            | PGA_4V096
            | MODE_SINGLE_SHOT
            | DR_860
            | COMPARATOR_DISABLED;
        self.write_register(REG_CONFIG, config)?;

        for _ in 0..CONVERSION_POLLS {
            self.delay.delay_us(100);
            if self.read_register(REG_CONFIG)? & OS != 0 {
                return Ok(self.read_register(REG_CONVERSION)? as i16);
            }
        }
        Err(Ads1115Error::Timeout)
    }

    fn write_register(&mut self, register: u8, value: u16) -> Result<(), Ads1115Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[register, hi, lo])
            .map_err(|_| Ads1115Error::Bus)
    }

    fn read_register(&mut self, register: u8) -> Result<u16, Ads1115Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|_| Ads1115Error::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }
}
