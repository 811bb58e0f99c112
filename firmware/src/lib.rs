//! USB pedal box firmware for RP2040.
//!
//! Reads up to three pedals (on-chip ADC, HX711 load cells or an ADS1115),
//! runs them through the [`pedal_core`] pipeline and reports them as a
//! three-axis USB HID device. A USB CDC-ACM console carries the settings
//! commands and the per-tick status line.

#![no_std]

// Re-export core types for convenience
pub use pedal_core::{
    AxisReport, AxisSink, BankState, ConsoleSink, ControllerError, LoadOutcome, OutputError,
    PedalBank, PedalController, SensorDrivers, SensorError, SettingsStore, SignalSource,
    StepOutcome,
};

#[cfg(feature = "ads1115")]
pub mod ads1115;
pub mod board;
pub mod console;
pub mod flash_store;
pub mod hx711;
pub mod sensors;
pub mod usb_output;

pub use console::{configure_console, ConsoleLine, ConsoleRx, ConsoleTx, ConsoleWriter, LINE_QUEUE};
pub use flash_store::FlashSettings;
pub use sensors::BoardSensors;
pub use usb_output::{configure_usb_hid, PedalRequestHandler, UsbHidAxes};
