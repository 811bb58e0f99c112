//! Compile-time defaults.

use crate::filter::{FilterKind, FilterSettings};

pub use pedal_proto::{DEFAULT_BIT_DEPTH, DEFAULT_CURVE, SERIAL_RANGE};

/// Smoothing filter every role starts with.
pub const DEFAULT_FILTER: FilterSettings = FilterSettings {
    kind: FilterKind::LowPass,
    cutoff: 0.2,
    q: 0.5,
    peak_gain_db: 0.0,
};

/// Inversion map written on first boot (`0-0-0`).
pub const DEFAULT_INVERTED: [bool; 3] = [false; 3];

/// Smoothing map written on first boot (`1-1-1`).
pub const DEFAULT_SMOOTHING: [bool; 3] = [true; 3];

/// Roles start disabled until wiring enables them.
pub const DEFAULT_ENABLED: bool = false;

/// Attempts after the first when the HID endpoint reports busy.
pub const HID_BUSY_RETRIES: u8 = 3;

/// Delay between HID retries.
pub const HID_BUSY_BACKOFF_MS: u32 = 2;

/// Capacity of the aggregated status line, excluding the newline.
pub const STATUS_LINE_CAPACITY: usize = 160;

/// Capacity of one channel's status segment.
pub const STATUS_SEGMENT_CAPACITY: usize = 64;

/// Most replies one console line can produce.
pub const MAX_REPLIES: usize = 8;
