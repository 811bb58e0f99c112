//! Platform-agnostic signal pipeline for a USB pedal box.
//!
//! This crate provides the pieces between the sensor drivers and the USB
//! transports:
//!
//! - [`filter`] - Biquad smoothing, one instance per role
//! - [`mapper`] - Linear scaling and six-point curve interpolation
//! - [`PedalChannel`] - Filter, invert, deadzone clamp and curve shaping for one pedal
//! - [`PedalBank`] - All channels, the HID axis report and the status line
//! - [`command`] - Applies console commands to the bank
//! - [`settings`] - Key-value persistence of every setting
//! - [`PedalController`] - One firmware loop iteration over async sinks
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Log through defmt instead of the `log` facade
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations,
//! making it suitable for embedded systems with limited resources.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod bank;
pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod filter;
pub mod mapper;
pub mod output;
pub mod sensor;
pub mod settings;

#[cfg(test)]
mod test_util;

// Re-export main types at crate root
pub use bank::{BankState, LoadOutcome, PedalBank};
pub use channel::{ChannelOutput, PedalChannel};
pub use command::{dispatch, Dispatch};
pub use controller::{ControllerError, PedalController, StepOutcome};
pub use filter::{Biquad, FilterKind, FilterSettings};
pub use mapper::{interpolate, scale_linear};
pub use output::{send_with_retry, AxisReport, AxisSink, ConsoleSink, OutputError};
pub use sensor::{SensorDrivers, SensorError, SignalSource};
pub use settings::{ChannelKey, MemorySettings, PersistenceError, SettingsStore};

pub use pedal_proto;
