//! Pin assignments and the pedal wiring of this board.
//!
//! # Pins
//!
//! - GPIO 26: throttle potentiometer (ADC0)
//! - GPIO 27: clutch potentiometer (ADC1)
//! - GPIO 2: brake load cell DOUT
//! - GPIO 3: brake load cell PD_SCK
//! - GPIO 4/5: I2C0 SDA/SCL for the ADS1115 (with `ads1115` feature)
//! - GPIO 25: on-board LED, toggled on sensor errors

use pedal_core::pedal_proto::{BitDepths, Role};
use pedal_core::{PedalBank, SettingsStore, SignalSource};

use crate::hx711::Gain;

pub const THROTTLE_ADC_PIN: u8 = 26;
pub const CLUTCH_ADC_PIN: u8 = 27;
pub const BRAKE_DOUT_PIN: u8 = 2;
pub const BRAKE_SCK_PIN: u8 = 3;

/// Reads averaged into the load-cell zero point at boot.
pub const TARE_SAMPLES: u8 = 8;

/// How one role is wired on this board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct Wiring {
    pub role: Role,
    pub source: SignalSource,
    pub enabled: bool,
    /// Converter and HID resolution labels, `"<n>bit"`, applied when first wired.
    pub bits: (&'static str, &'static str),
}

#[cfg(not(feature = "ads1115"))]
const CLUTCH_SOURCE: SignalSource = SignalSource::Analog { pin: CLUTCH_ADC_PIN };
#[cfg(feature = "ads1115")]
const CLUTCH_SOURCE: SignalSource = SignalSource::I2cChannel { index: 0 };

/// On-chip ADC.
const ADC_BITS: (&str, &str) = ("12bit", "16bit");
/// Positive half of the ADS1115 range.
#[cfg(feature = "ads1115")]
const CLUTCH_BITS: (&str, &str) = ("15bit", "16bit");
#[cfg(not(feature = "ads1115"))]
const CLUTCH_BITS: (&str, &str) = ADC_BITS;

/// Load cell amplifier gain, channel A.
pub const BRAKE_GAIN: Gain = Gain::A128;

pub const WIRING: [Wiring; 3] = [
    Wiring {
        role: Role::Throttle,
        source: SignalSource::Analog {
            pin: THROTTLE_ADC_PIN,
        },
        enabled: true,
        bits: ADC_BITS,
    },
    Wiring {
        role: Role::Brake,
        source: SignalSource::LoadCell {
            dout: BRAKE_DOUT_PIN,
            clock: BRAKE_SCK_PIN,
        },
        enabled: true,
        bits: ("16bit", "16bit"),
    },
    Wiring {
        role: Role::Clutch,
        source: CLUTCH_SOURCE,
        enabled: true,
        bits: CLUTCH_BITS,
    },
];

/// Bring the saved wiring in line with [`WIRING`].
///
/// Only differences are written, so a normal boot does not touch flash. A
/// role whose source changed also gets the board's bit depths.
pub fn apply_wiring<S: SettingsStore>(bank: &mut PedalBank<S>) {
    for wiring in WIRING {
        if bank.channel(wiring.role).source() != Some(wiring.source) {
            defmt::info!("wiring {:?} to {:?}", wiring.role, wiring.source);
            bank.set_signal_source(wiring.role, wiring.source);
            let (raw, hid) = wiring.bits;
            bank.set_bit_depths(wiring.role, BitDepths::from_labels(raw, hid));
        }
        if bank.is_enabled(wiring.role) != wiring.enabled {
            bank.set_enabled(wiring.role, wiring.enabled);
        }
    }
}
