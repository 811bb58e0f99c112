//! Value types, serial command parsing, and reply formatting for the pedal box.
//!
//! This crate holds everything that crosses the serial console:
//!
//! - **Types**: the configuration values a channel carries
//!   - [`Role`] - Throttle, brake or clutch; fixes the HID axis slot
//!   - [`CurveTable`] - Six-point response curve in the 0-100 domain
//!   - [`CalibrationQuad`] - Raw deadzone bounds from two calibration sweeps
//!   - [`BitDepths`] - Raw sensor and HID resolution of a channel
//!
//! - **Parsing**: recognise commands in a console line
//!   - [`commands()`] - Every trigger that fires for a line, in order
//!   - [`Command`] - Decoded command with its payload
//!
//! - **Formatting**: build reply and status lines
//!   - [`format`] - One function per query reply
//!
//! # Command Surface
//!
//! | Trigger | Effect |
//! |---|---|
//! | `clearEEPROM` | wipe persisted settings, reply `done` |
//! | `RESET` | restore defaults and restart |
//! | `GetUsage`, `GetMap`, `GetInverted`, `GetSmooth`, `GetCali`, `GetBits` | queries |
//! | `INVER:a-b-c`, `SMOOTH:a-b-c` | per-role flags |
//! | `TMAP:`, `BMAP:`, `CMAP:` | six-point output curve |
//! | `BITS:r-h-r-h-r-h` | bit depths |
//! | `CALIRESET` | full-range calibration for all roles |
//! | `TCALI:..,BCALI:..,CCALI:..` | calibration for all roles |
//!
//! # Examples
//!
//! ```
//! use pedal_proto::{commands, Command, CurveTable, Role};
//!
//! let mut fired = commands("TMAP:0-10-20-30-40-100");
//! let m = fired.next().unwrap();
//! let curve = CurveTable::new([0, 10, 20, 30, 40, 100]).unwrap();
//! assert_eq!(m.command, Ok(Command::SetOutputMap(Role::Throttle, curve)));
//! assert!(fired.next().is_none());
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod format;
pub mod parser;
pub mod types;

pub use format::{line_bytes, Reply, LINE_END, REPLY_CAPACITY};
pub use parser::{commands, Command, CommandError, Match, Trigger, MAX_LINE_LENGTH};
pub use types::{
    is_valid_bit_depth, BitDepths, CalibrationQuad, ConfigError,
    CurveTable, Role, CURVE_POINTS, DEFAULT_BIT_DEPTH, DEFAULT_CURVE, SERIAL_RANGE,
};
