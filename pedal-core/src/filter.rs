//! Biquad smoothing filter.
//!
//! Coefficients follow the RBJ audio cookbook forms and are evaluated in
//! transposed direct form II. One instance lives per role for the whole
//! process lifetime; reconfiguring it clears the delay registers.

use core::f32::consts::{PI, SQRT_2};

use pedal_proto::ConfigError;

use crate::config::DEFAULT_FILTER;

/// Filter response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
    Notch,
    Peak,
    LowShelf,
    HighShelf,
}

/// Parameters the coefficients are derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterSettings {
    pub kind: FilterKind,
    /// Cutoff as a fraction of the sample rate, clamped to `0.0..=0.5`.
    pub cutoff: f32,
    /// Quality factor, must be positive.
    pub q: f32,
    /// Gain for peak and shelf shapes, in dB.
    pub peak_gain_db: f32,
}

/// The five normalised coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coefficients {
    pub a0: f32,
    pub a1: f32,
    pub a2: f32,
    pub b1: f32,
    pub b2: f32,
}

impl Coefficients {
    fn compute(s: &FilterSettings) -> Self {
        let v = libm::powf(10.0, libm::fabsf(s.peak_gain_db) / 20.0);
        let k = libm::tanf(PI * s.cutoff);
        let kk = k * k;
        let q = s.q;

        match s.kind {
            FilterKind::LowPass => {
                let norm = 1.0 / (1.0 + k / q + kk);
                let a0 = kk * norm;
                Self {
                    a0,
                    a1: 2.0 * a0,
                    a2: a0,
                    b1: 2.0 * (kk - 1.0) * norm,
                    b2: (1.0 - k / q + kk) * norm,
                }
            }
            FilterKind::HighPass => {
                let norm = 1.0 / (1.0 + k / q + kk);
                Self {
                    a0: norm,
                    a1: -2.0 * norm,
                    a2: norm,
                    b1: 2.0 * (kk - 1.0) * norm,
                    b2: (1.0 - k / q + kk) * norm,
                }
            }
            FilterKind::BandPass => {
                let norm = 1.0 / (1.0 + k / q + kk);
                let a0 = k / q * norm;
                Self {
                    a0,
                    a1: 0.0,
                    a2: -a0,
                    b1: 2.0 * (kk - 1.0) * norm,
                    b2: (1.0 - k / q + kk) * norm,
                }
            }
            FilterKind::Notch => {
                let norm = 1.0 / (1.0 + k / q + kk);
                let a0 = (1.0 + kk) * norm;
                let a1 = 2.0 * (kk - 1.0) * norm;
                Self {
                    a0,
                    a1,
                    a2: a0,
                    b1: a1,
                    b2: (1.0 - k / q + kk) * norm,
                }
            }
            FilterKind::Peak => {
                // Boost and cut swap the roles of 1/Q and V/Q.
                let (num, den) = if s.peak_gain_db >= 0.0 {
                    (v / q, 1.0 / q)
                } else {
                    (1.0 / q, v / q)
                };
                let norm = 1.0 / (1.0 + den * k + kk);
                let a1 = 2.0 * (kk - 1.0) * norm;
                Self {
                    a0: (1.0 + num * k + kk) * norm,
                    a1,
                    a2: (1.0 - num * k + kk) * norm,
                    b1: a1,
                    b2: (1.0 - den * k + kk) * norm,
                }
            }
            FilterKind::LowShelf => {
                let norm = 1.0 / (1.0 + SQRT_2 * k + kk);
                let sv = libm::sqrtf(2.0 * v);
                Self {
                    a0: (1.0 + sv * k + v * kk) * norm,
                    a1: 2.0 * (v * kk - 1.0) * norm,
                    a2: (1.0 - sv * k + v * kk) * norm,
                    b1: 2.0 * (kk - 1.0) * norm,
                    b2: (1.0 - SQRT_2 * k + kk) * norm,
                }
            }
            FilterKind::HighShelf => {
                let norm = 1.0 / (1.0 + SQRT_2 * k + kk);
                let sv = libm::sqrtf(2.0 * v);
                Self {
                    a0: (v + sv * k + kk) * norm,
                    a1: 2.0 * (kk - v) * norm,
                    a2: (v - sv * k + kk) * norm,
                    b1: 2.0 * (kk - 1.0) * norm,
                    b2: (1.0 - SQRT_2 * k + kk) * norm,
                }
            }
        }
    }
}

/// Second-order IIR filter with persistent state.
#[derive(Debug, Clone)]
pub struct Biquad {
    settings: FilterSettings,
    coeffs: Coefficients,
    z1: f32,
    z2: f32,
}

impl Biquad {
    /// Create a filter; fails if `q` is not a positive finite number.
    pub fn new(settings: FilterSettings) -> Result<Self, ConfigError> {
        let mut filter = Self {
            settings,
            coeffs: Coefficients::default(),
            z1: 0.0,
            z2: 0.0,
        };
        filter.configure(settings)?;
        Ok(filter)
    }

    /// Replace the parameters, recompute coefficients and clear the delay line.
    ///
    /// The cutoff is clamped into `0.0..=0.5`. On error the filter is left unchanged.
    pub fn configure(&mut self, settings: FilterSettings) -> Result<(), ConfigError> {
        if !settings.q.is_finite() || settings.q <= 0.0 {
            return Err(ConfigError::InvalidQ);
        }
        let cutoff = if settings.cutoff.is_nan() {
            0.0
        } else {
            settings.cutoff.clamp(0.0, 0.5)
        };
        self.settings = FilterSettings { cutoff, ..settings };
        self.coeffs = Coefficients::compute(&self.settings);
        self.reset();
        Ok(())
    }

    /// Filter one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = x * c.a0 + self.z1;
        self.z1 = x * c.a1 + self.z2 - c.b1 * y;
        self.z2 = x * c.a2 - c.b2 * y;
        y
    }

    /// Clear the delay registers.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coeffs
    }
}

impl Default for Biquad {
    fn default() -> Self {
        let settings = DEFAULT_FILTER;
        Self {
            settings,
            coeffs: Coefficients::compute(&settings),
            z1: 0.0,
            z2: 0.0,
        }
    }
}
