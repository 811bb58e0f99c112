//! Core pedal value types: Role, CurveTable, CalibrationQuad, BitDepths.

use serde::{Deserialize, Serialize};

/// Number of breakpoints in a response curve.
pub const CURVE_POINTS: usize = 6;

/// Reference breakpoints of the 0-100 serial domain.
pub const DEFAULT_CURVE: [i32; CURVE_POINTS] = [0, 20, 40, 60, 80, 100];

/// Full scale of the serial (percentage) domain.
pub const SERIAL_RANGE: i32 = 100;

/// Bit depth used when none is configured or a label is unknown.
pub const DEFAULT_BIT_DEPTH: i32 = 65_535;

/// Smallest and largest supported resolution, in bits.
pub const MIN_BITS: u32 = 8;
pub const MAX_BITS: u32 = 24;

/// Validation failure for pedal configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Input range of a linear scale is empty (low == high).
    DegenerateRange,
    /// Breakpoint tables are empty or differ in length.
    LengthMismatch,
    /// Breakpoint inputs are not strictly increasing.
    NotIncreasing,
    /// Curve output outside the 0-100 serial domain.
    OutOfRange,
    /// Calibration yields an empty or inverted deadzone.
    InvertedDeadzone,
    /// Bit depth is not `2^n - 1` for a supported `n`.
    InvalidBitDepth,
    /// Filter quality factor is zero, negative or not finite.
    InvalidQ,
}

/// Fixed logical identity of a pedal channel.
///
/// Each role owns exactly one HID axis slot and one smoothing filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Throttle,
    Brake,
    Clutch,
}

impl Role {
    /// All roles in protocol order (throttle, brake, clutch).
    pub const ALL: [Role; 3] = [Role::Throttle, Role::Brake, Role::Clutch];

    /// Position of this role in protocol-ordered arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Role::Throttle => 0,
            Role::Brake => 1,
            Role::Clutch => 2,
        }
    }

    /// Single-letter tag used by `TMAP:`, `BCALI:` and friends.
    #[inline]
    #[must_use]
    pub const fn letter(self) -> &'static str {
        match self {
            Role::Throttle => "T",
            Role::Brake => "B",
            Role::Clutch => "C",
        }
    }

    /// Prefix of this role's segment in the status line.
    #[inline]
    #[must_use]
    pub const fn status_prefix(self) -> &'static str {
        match self {
            Role::Throttle => "T:",
            Role::Brake => "B:",
            Role::Clutch => "C:",
        }
    }

    /// Lowercase name, used for settings keys and the usage reply.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Role::Throttle => "throttle",
            Role::Brake => "brake",
            Role::Clutch => "clutch",
        }
    }
}

/// Six-point response curve in the 0-100 serial domain.
///
/// Used both as the fixed input map and as the user-configurable
/// output map of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurveTable([i32; CURVE_POINTS]);

impl CurveTable {
    /// Identity curve (equal to the reference input map).
    pub const LINEAR: Self = Self(DEFAULT_CURVE);

    /// Create a curve, rejecting points outside `0..=100`.
    pub fn new(points: [i32; CURVE_POINTS]) -> Result<Self, ConfigError> {
        if points.iter().any(|p| !(0..=SERIAL_RANGE).contains(p)) {
            return Err(ConfigError::OutOfRange);
        }
        Ok(Self(points))
    }

    /// Breakpoint values.
    #[inline]
    #[must_use]
    pub const fn points(&self) -> &[i32; CURVE_POINTS] {
        &self.0
    }

    /// Rescale the 0-100 breakpoints into `0..=full_scale`.
    #[must_use]
    pub fn scaled(&self, full_scale: i32) -> [i32; CURVE_POINTS] {
        let mut out = [0; CURVE_POINTS];
        for (dst, &src) in out.iter_mut().zip(self.0.iter()) {
            *dst = (i64::from(src) * i64::from(full_scale) / i64::from(SERIAL_RANGE)) as i32;
        }
        out
    }

    /// Re-check a value that bypassed [`CurveTable::new`] (e.g. decoded from storage).
    pub fn validated(self) -> Result<Self, ConfigError> {
        Self::new(self.0)
    }
}

impl Default for CurveTable {
    fn default() -> Self {
        Self::LINEAR
    }
}

/// Four raw-domain calibration bounds from two sweeps: `[lo1, hi1, lo2, hi2]`.
///
/// The tightest bounds win: the deadzone is `max(lo1, lo2)..=min(hi1, hi2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationQuad([i32; 4]);

impl CalibrationQuad {
    /// Create a calibration, rejecting an empty or inverted deadzone.
    pub fn new(values: [i32; 4]) -> Result<Self, ConfigError> {
        let quad = Self(values);
        if quad.low_deadzone() >= quad.high_deadzone() {
            return Err(ConfigError::InvertedDeadzone);
        }
        Ok(quad)
    }

    /// Calibration spanning the whole raw range `0..=raw_max`.
    #[inline]
    #[must_use]
    pub const fn full_scale(raw_max: i32) -> Self {
        Self([0, raw_max, 0, raw_max])
    }

    #[inline]
    #[must_use]
    pub const fn values(&self) -> &[i32; 4] {
        &self.0
    }

    /// Lower deadzone bound: `max(c0, c2)`.
    #[inline]
    #[must_use]
    pub fn low_deadzone(&self) -> i32 {
        self.0[0].max(self.0[2])
    }

    /// Upper deadzone bound: `min(c1, c3)`.
    #[inline]
    #[must_use]
    pub fn high_deadzone(&self) -> i32 {
        self.0[1].min(self.0[3])
    }

    /// Clamp a raw reading into the deadzone.
    ///
    /// Never panics, even for a quad that bypassed validation.
    #[inline]
    #[must_use]
    pub fn clamp(&self, raw: i32) -> i32 {
        raw.min(self.high_deadzone()).max(self.low_deadzone())
    }

    /// Re-check a value that bypassed [`CalibrationQuad::new`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        Self::new(self.0)
    }
}

/// Raw sensor and HID output resolution of one channel, as full-scale values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitDepths {
    raw: i32,
    hid: i32,
}

impl BitDepths {
    pub const DEFAULT: Self = Self {
        raw: DEFAULT_BIT_DEPTH,
        hid: DEFAULT_BIT_DEPTH,
    };

    /// Create a pair of bit depths; each must be `2^n - 1` for `8 <= n <= 24`.
    pub fn new(raw: i32, hid: i32) -> Result<Self, ConfigError> {
        if !is_valid_bit_depth(raw) || !is_valid_bit_depth(hid) {
            return Err(ConfigError::InvalidBitDepth);
        }
        Ok(Self { raw, hid })
    }

    /// Resolve `"<n>bit"` labels; unknown labels fall back to 16 bit.
    #[must_use]
    pub fn from_labels(raw: &str, hid: &str) -> Self {
        Self {
            raw: bit_depth_from_label(raw),
            hid: bit_depth_from_label(hid),
        }
    }

    /// Full-scale raw sensor value.
    #[inline]
    #[must_use]
    pub const fn raw(&self) -> i32 {
        self.raw
    }

    /// Full-scale HID-domain value.
    #[inline]
    #[must_use]
    pub const fn hid(&self) -> i32 {
        self.hid
    }

    /// Re-check a value that bypassed [`BitDepths::new`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        Self::new(self.raw, self.hid)
    }
}

impl Default for BitDepths {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Check that `value` is `2^n - 1` for a supported resolution.
#[must_use]
pub fn is_valid_bit_depth(value: i32) -> bool {
    (MIN_BITS..=MAX_BITS).any(|bits| value == (1i32 << bits) - 1)
}

/// Map a `"10bit"` style label to its full-scale value.
fn bit_depth_from_label(label: &str) -> i32 {
    label
        .strip_suffix("bit")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| (MIN_BITS..=MAX_BITS).contains(n))
        .map_or(DEFAULT_BIT_DEPTH, |n| (1i32 << n) - 1)
}
