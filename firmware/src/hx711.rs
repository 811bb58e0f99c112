//! Bit-banged HX711 load-cell converter.
//!
//! The converter signals a finished conversion by pulling DOUT low. Each of
//! the 24 data bits is clocked out MSB first on PD_SCK, followed by one to
//! three extra pulses that select the gain and channel of the next
//! conversion.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Polls of DOUT before [`Hx711::read`] gives up, one microsecond apart.
///
/// The slowest output rate is 10 Hz.
pub const READY_TIMEOUT_US: u32 = 120_000;

/// Channel and gain of the next conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Gain {
    /// Channel A, gain 128.
    A128,
    /// Channel B, gain 32.
    B32,
    /// Channel A, gain 64.
    A64,
}

impl Gain {
    /// Clock pulses after the data bits.
    const fn pulses(self) -> u8 {
        match self {
            Gain::A128 => 1,
            Gain::B32 => 2,
            Gain::A64 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Hx711Error {
    /// GPIO access failed.
    Pin,
    /// DOUT never went low.
    Timeout,
}

/// One HX711 on a DOUT input and a PD_SCK output.
pub struct Hx711<DOUT, SCK, D> {
    dout: DOUT,
    sck: SCK,
    delay: D,
    gain: Gain,
    offset: i32,
    /// The conversion in flight was started with the previous gain.
    stale: bool,
}

impl<DOUT, SCK, D> Hx711<DOUT, SCK, D>
where
    DOUT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    pub fn new(dout: DOUT, mut sck: SCK, delay: D) -> Result<Self, Hx711Error> {
        sck.set_low().map_err(|_| Hx711Error::Pin)?;
        Ok(Self {
            dout,
            sck,
            delay,
            gain: Gain::A128,
            offset: 0,
            // Power-on conversions use A128 already.
            stale: false,
        })
    }

    /// True when a conversion is waiting to be clocked out.
    pub fn is_ready(&mut self) -> Result<bool, Hx711Error> {
        self.dout.is_low().map_err(|_| Hx711Error::Pin)
    }

    /// Select the gain for subsequent conversions.
    ///
    /// Takes effect after the next read, whose value is discarded.
    pub fn set_gain(&mut self, gain: Gain) {
        if gain != self.gain {
            self.gain = gain;
            self.stale = true;
        }
    }

    /// Wait for a conversion and return it, minus the tare offset.
    pub fn read(&mut self) -> Result<i32, Hx711Error> {
        loop {
            let mut waited = 0;
            while !self.is_ready()? {
                if waited >= READY_TIMEOUT_US {
                    return Err(Hx711Error::Timeout);
                }
                self.delay.delay_us(1);
                waited += 1;
            }
            let value = self.shift_in()?;
            if self.stale {
                self.stale = false;
                continue;
            }
            return Ok(value.wrapping_sub(self.offset));
        }
    }

    /// Return a conversion if one is ready, without waiting.
    pub fn try_read(&mut self) -> Result<Option<i32>, Hx711Error> {
        if !self.is_ready()? {
            return Ok(None);
        }
        let value = self.shift_in()?;
        if self.stale {
            self.stale = false;
            return Ok(None);
        }
        Ok(Some(value.wrapping_sub(self.offset)))
    }

    /// Average `samples` reads and use the result as the zero point.
    pub fn tare(&mut self, samples: u8) -> Result<i32, Hx711Error> {
        let samples = samples.max(1);
        self.offset = 0;
        let mut sum: i64 = 0;
        for _ in 0..samples {
            sum += i64::from(self.read()?);
        }
        // The mean of i32 values fits in i32.
        self.offset = (sum / i64::from(samples)) as i32;
        Ok(self.offset)
    }

    /// Clock out one 24-bit two's complement sample.
    ///
    /// PD_SCK held high for more than 60 us powers the chip down, so the
    /// transfer runs with interrupts masked.
    fn shift_in(&mut self) -> Result<i32, Hx711Error> {
        let pulses = self.gain.pulses();
        let raw = cortex_m::interrupt::free(|_| -> Result<u32, Hx711Error> {
            let mut raw: u32 = 0;
            for _ in 0..24 {
                self.pulse()?;
                raw = (raw << 1) | u32::from(self.dout.is_high().map_err(|_| Hx711Error::Pin)?);
            }
            for _ in 0..pulses {
                self.pulse()?;
            }
            Ok(raw)
        })?;
        Ok(sign_extend_24(raw))
    }

    fn pulse(&mut self) -> Result<(), Hx711Error> {
        self.sck.set_high().map_err(|_| Hx711Error::Pin)?;
        self.delay.delay_us(1);
        self.sck.set_low().map_err(|_| Hx711Error::Pin)?;
        self.delay.delay_us(1);
        Ok(())
    }
}

#[inline]
fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}
