//! Signal sources and the sensor driver boundary.

use serde::{Deserialize, Serialize};

/// Largest value a 24-bit load-cell converter can report.
pub const LOAD_CELL_MAX: i32 = 0x00FF_FFFF;

/// Error type for sensor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Channel is enabled but has no signal source.
    NotConfigured,
    /// The source names a pin or channel the board does not provide.
    NotWired,
    /// Bus transfer failed.
    Bus,
    /// Converter did not finish in time.
    Timeout,
}

/// Where a channel's raw reading comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalSource {
    /// On-chip ADC input.
    Analog { pin: u8 },
    /// Bit-banged load-cell converter.
    LoadCell { dout: u8, clock: u8 },
    /// Channel of an external I2C converter.
    I2cChannel { index: u8 },
}

/// Blocking reads for each kind of source.
///
/// Implemented by the board. Reads return the converter's native value;
/// [`SignalSource::read`] applies the non-negative clamp.
pub trait SensorDrivers {
    fn read_analog(&mut self, pin: u8) -> Result<i32, SensorError>;
    fn read_load_cell(&mut self, dout: u8, clock: u8) -> Result<i32, SensorError>;
    fn read_i2c_channel(&mut self, index: u8) -> Result<i32, SensorError>;
}

impl SignalSource {
    /// Read this source through `drivers`, clamped to be non-negative.
    ///
    /// Load-cell readings are additionally limited to 24 bits.
    pub fn read<D: SensorDrivers>(&self, drivers: &mut D) -> Result<i32, SensorError> {
        match *self {
            SignalSource::Analog { pin } => Ok(drivers.read_analog(pin)?.max(0)),
            SignalSource::LoadCell { dout, clock } => {
                Ok(drivers.read_load_cell(dout, clock)?.clamp(0, LOAD_CELL_MAX))
            }
            SignalSource::I2cChannel { index } => Ok(drivers.read_i2c_channel(index)?.max(0)),
        }
    }
}
