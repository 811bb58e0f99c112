//! [`SensorDrivers`] for the converters on this board.

use embassy_rp::adc::{self, Adc, Blocking};
use embassy_rp::gpio::{Input, Output};
use embassy_time::Delay;
use pedal_core::{SensorDrivers, SensorError};

use crate::board::{BRAKE_DOUT_PIN, BRAKE_SCK_PIN, CLUTCH_ADC_PIN, THROTTLE_ADC_PIN};
use crate::hx711::{Hx711, Hx711Error};

#[cfg(feature = "ads1115")]
use crate::ads1115::{Ads1115, Ads1115Error};
#[cfg(feature = "ads1115")]
use embassy_rp::{i2c::I2c, peripherals::I2C0};

pub type BrakeCell = Hx711<Input<'static>, Output<'static>, Delay>;

#[cfg(feature = "ads1115")]
pub type ExternalAdc = Ads1115<I2c<'static, I2C0, embassy_rp::i2c::Blocking>, Delay>;

impl From<Hx711Error> for SensorError {
    fn from(e: Hx711Error) -> Self {
        match e {
            Hx711Error::Pin => SensorError::Bus,
            Hx711Error::Timeout => SensorError::Timeout,
        }
    }
}

#[cfg(feature = "ads1115")]
impl From<Ads1115Error> for SensorError {
    fn from(e: Ads1115Error) -> Self {
        match e {
            Ads1115Error::NoSuchChannel => SensorError::NotWired,
            Ads1115Error::Bus => SensorError::Bus,
            Ads1115Error::Timeout => SensorError::Timeout,
        }
    }
}

/// Every converter the board carries.
pub struct BoardSensors {
    adc: Adc<'static, Blocking>,
    throttle: adc::Channel<'static>,
    clutch: adc::Channel<'static>,
    brake: BrakeCell,
    /// The HX711 converts at 10 or 80 Hz; ticks in between reuse this.
    brake_last: i32,
    #[cfg(feature = "ads1115")]
    external: Option<ExternalAdc>,
}

impl BoardSensors {
    pub fn new(
        adc: Adc<'static, Blocking>,
        throttle: adc::Channel<'static>,
        clutch: adc::Channel<'static>,
        brake: BrakeCell,
    ) -> Self {
        Self {
            adc,
            throttle,
            clutch,
            brake,
            brake_last: 0,
            #[cfg(feature = "ads1115")]
            external: None,
        }
    }

    #[cfg(feature = "ads1115")]
    pub fn with_external_adc(mut self, external: ExternalAdc) -> Self {
        self.external = Some(external);
        self
    }
}

impl SensorDrivers for BoardSensors {
    fn read_analog(&mut self, pin: u8) -> Result<i32, SensorError> {
        let channel = match pin {
            THROTTLE_ADC_PIN => &mut self.throttle,
            CLUTCH_ADC_PIN => &mut self.clutch,
            _ => return Err(SensorError::NotWired),
        };
        self.adc
            .blocking_read(channel)
            .map(i32::from)
            .map_err(|_| SensorError::Bus)
    }

    fn read_load_cell(&mut self, dout: u8, clock: u8) -> Result<i32, SensorError> {
        if (dout, clock) != (BRAKE_DOUT_PIN, BRAKE_SCK_PIN) {
            return Err(SensorError::NotWired);
        }
        if let Some(value) = self.brake.try_read()? {
            self.brake_last = value;
        }
        Ok(self.brake_last)
    }

    #[cfg(feature = "ads1115")]
    fn read_i2c_channel(&mut self, index: u8) -> Result<i32, SensorError> {
        let external = self.external.as_mut().ok_or(SensorError::NotWired)?;
        Ok(i32::from(external.read_single_ended(index)?))
    }

    #[cfg(not(feature = "ads1115"))]
    fn read_i2c_channel(&mut self, _index: u8) -> Result<i32, SensorError> {
        Err(SensorError::NotWired)
    }
}
