//! One pedal channel: configuration plus the per-tick signal pipeline.

use heapless::String;
use serde::{de::DeserializeOwned, Serialize};

use pedal_proto::format::status_segment;
use pedal_proto::{BitDepths, CalibrationQuad, ConfigError, CurveTable, Role, SERIAL_RANGE};

use crate::config::STATUS_SEGMENT_CAPACITY;
use crate::filter::Biquad;
use crate::mapper::{interpolate, scale_linear};
use crate::sensor::SignalSource;
use crate::settings::{load_or, ChannelKey, SettingsStore};

/// Values one tick produces for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelOutput {
    /// Shaped value in `0..=hid` of the channel's bit depths.
    pub hid: i32,
    /// Shaped value in `0..=100`.
    pub serial: i32,
}

/// Configuration and last results of one role.
///
/// Setters validate, update memory, then persist under the role's key. A
/// failed write is logged and the in-memory value is kept, so the channel
/// keeps running with what the user asked for.
#[derive(Debug, Clone)]
pub struct PedalChannel {
    role: Role,
    bits: BitDepths,
    source: Option<SignalSource>,
    inverted: bool,
    smoothing: bool,
    calibration: CalibrationQuad,
    input_map: CurveTable,
    output_map: CurveTable,
    last_hid: i32,
    status: String<STATUS_SEGMENT_CAPACITY>,
}

impl PedalChannel {
    /// A channel with factory defaults and no signal source.
    pub fn new(role: Role) -> Self {
        let bits = BitDepths::DEFAULT;
        Self {
            role,
            bits,
            source: None,
            inverted: false,
            smoothing: true,
            calibration: CalibrationQuad::full_scale(bits.raw()),
            input_map: CurveTable::LINEAR,
            output_map: CurveTable::LINEAR,
            last_hid: 0,
            status: String::new(),
        }
    }

    /// Run the pipeline on one raw reading.
    ///
    /// `filter` is the role's smoothing filter; it is only advanced when
    /// smoothing is enabled.
    pub fn tick(&mut self, raw: i32, filter: &mut Biquad) -> Result<ChannelOutput, ConfigError> {
        let full = self.bits.raw();
        let mut value = raw;
        if self.smoothing {
            // A resonant filter can overshoot far outside the sensor range.
            value = (libm::roundf(filter.process(value as f32)) as i32).clamp(0, full);
        }
        if self.inverted {
            value = full.saturating_sub(value);
        }

        let low = self.calibration.low_deadzone();
        let high = self.calibration.high_deadzone();
        let pedal = self.calibration.clamp(value);

        let hid_max = self.bits.hid();
        let hid_inputs = self.input_map.scaled(hid_max);
        let hid_outputs = self.output_map.scaled(hid_max);

        let before_hid = scale_linear(pedal, low, high, 0, hid_max)?;
        let after_hid = interpolate(before_hid, &hid_inputs, &hid_outputs)?;
        let before_serial = scale_linear(pedal, low, high, 0, SERIAL_RANGE)?;
        let after_serial = interpolate(
            before_serial,
            self.input_map.points(),
            self.output_map.points(),
        )?;

        self.status.clear();
        if status_segment(
            &mut self.status,
            self.role,
            before_serial,
            after_serial,
            value,
            before_hid,
        )
        .is_err()
        {
            self.status.clear();
        }
        self.last_hid = after_hid;

        Ok(ChannelOutput {
            hid: after_hid,
            serial: after_serial,
        })
    }

    /// Restore this channel's saved configuration.
    ///
    /// `inverted` and `smoothing` are the process-wide map values, used when
    /// the role has no flag of its own. Missing or invalid values fall back
    /// to defaults.
    pub fn load<S: SettingsStore>(&mut self, store: &S, inverted: bool, smoothing: bool) {
        let role = self.role;
        self.bits = load_checked(store, ChannelKey::Bits.for_role(role), BitDepths::DEFAULT, |b| {
            b.validated()
        });
        self.source = load_or(store, ChannelKey::Input.for_role(role), None);
        self.inverted = load_or(store, ChannelKey::Inverted.for_role(role), inverted);
        self.smoothing = load_or(store, ChannelKey::Smooth.for_role(role), smoothing);
        self.output_map = load_checked(
            store,
            ChannelKey::OutputMap.for_role(role),
            CurveTable::LINEAR,
            |c| c.validated(),
        );
        self.calibration = load_checked(
            store,
            ChannelKey::Calibration.for_role(role),
            CalibrationQuad::full_scale(self.bits.raw()),
            |q| q.validated(),
        );
        debug!(
            "{} loaded: raw {} hid {} inverted {} smoothing {}",
            role.name(),
            self.bits.raw(),
            self.bits.hid(),
            self.inverted,
            self.smoothing
        );
    }

    /// Reset the user-facing configuration and persist it.
    ///
    /// Board wiring (bit depths, signal source) is left alone.
    pub fn restore_defaults<S: SettingsStore>(&mut self, store: &mut S) {
        self.reset_output_map(store);
        self.reset_calibration(store);
        self.set_inverted(store, false);
        self.set_smoothing(store, true);
        self.last_hid = 0;
        self.status.clear();
    }

    pub fn set_inverted<S: SettingsStore>(&mut self, store: &mut S, inverted: bool) {
        self.inverted = inverted;
        self.persist(store, ChannelKey::Inverted, &inverted);
    }

    pub fn set_smoothing<S: SettingsStore>(&mut self, store: &mut S, smoothing: bool) {
        self.smoothing = smoothing;
        self.persist(store, ChannelKey::Smooth, &smoothing);
    }

    pub fn set_output_map<S: SettingsStore>(&mut self, store: &mut S, map: CurveTable) {
        self.output_map = map;
        self.persist(store, ChannelKey::OutputMap, &map);
    }

    pub fn reset_output_map<S: SettingsStore>(&mut self, store: &mut S) {
        self.set_output_map(store, CurveTable::LINEAR);
    }

    /// Set the calibration; it must lie within the raw bit depth.
    pub fn set_calibration<S: SettingsStore>(
        &mut self,
        store: &mut S,
        calibration: CalibrationQuad,
    ) -> Result<(), ConfigError> {
        if calibration.values().iter().any(|v| !(0..=self.bits.raw()).contains(v)) {
            return Err(ConfigError::OutOfRange);
        }
        self.calibration = calibration;
        self.persist(store, ChannelKey::Calibration, &calibration);
        Ok(())
    }

    /// Calibrate to the full raw range `[0, raw, 0, raw]`.
    pub fn reset_calibration<S: SettingsStore>(&mut self, store: &mut S) {
        let calibration = CalibrationQuad::full_scale(self.bits.raw());
        self.calibration = calibration;
        self.persist(store, ChannelKey::Calibration, &calibration);
    }

    /// Change resolution; a calibration with any value outside the new raw
    /// range is reset.
    pub fn set_bit_depths<S: SettingsStore>(&mut self, store: &mut S, bits: BitDepths) {
        self.bits = bits;
        self.persist(store, ChannelKey::Bits, &bits);
        if self.calibration.values().iter().any(|&v| v > bits.raw()) {
            self.reset_calibration(store);
        }
    }

    pub fn set_signal_source<S: SettingsStore>(&mut self, store: &mut S, source: SignalSource) {
        self.source = Some(source);
        self.persist(store, ChannelKey::Input, &Some(source));
    }

    fn persist<S: SettingsStore, T: Serialize>(&self, store: &mut S, key: ChannelKey, value: &T) {
        let key = key.for_role(self.role);
        if let Err(e) = store.store(key, value) {
            warn!("failed to save {}: {:?}", key, e);
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn bits(&self) -> BitDepths {
        self.bits
    }

    pub fn source(&self) -> Option<SignalSource> {
        self.source
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn smoothing(&self) -> bool {
        self.smoothing
    }

    pub fn calibration(&self) -> CalibrationQuad {
        self.calibration
    }

    pub fn input_map(&self) -> &CurveTable {
        &self.input_map
    }

    pub fn output_map(&self) -> &CurveTable {
        &self.output_map
    }

    /// HID-domain value of the last successful tick.
    pub fn last_hid(&self) -> i32 {
        self.last_hid
    }

    /// Status segment of the last successful tick.
    pub fn status(&self) -> &str {
        self.status.as_str()
    }
}

fn load_checked<S, T>(
    store: &S,
    key: &str,
    default: T,
    check: impl FnOnce(T) -> Result<T, ConfigError>,
) -> T
where
    S: SettingsStore,
    T: DeserializeOwned + Copy,
{
    match check(load_or(store, key, default)) {
        Ok(value) => value,
        Err(e) => {
            warn!("setting {} invalid ({:?}), using default", key, e);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FILTER;
    use crate::filter::{FilterKind, FilterSettings};
    use crate::settings::MemorySettings;

    fn identity_channel() -> PedalChannel {
        let mut ch = PedalChannel::new(Role::Throttle);
        let mut store = MemorySettings::new();
        ch.set_smoothing(&mut store, false);
        ch
    }

    #[test]
    fn test_identity_pipeline_mid_scale() {
        let mut ch = identity_channel();
        let mut filter = Biquad::default();
        let out = ch.tick(32767, &mut filter).unwrap();
        assert_eq!(out.hid, 32767);
        assert_eq!(out.serial, 49);
        assert_eq!(ch.status(), "T:49;49;32767;32767,");
        assert_eq!(ch.last_hid(), 32767);
    }

    #[test]
    fn test_deadzone_clamps_both_ends() {
        let mut ch = identity_channel();
        let mut store = MemorySettings::new();
        ch.set_calibration(&mut store, CalibrationQuad::new([1000, 60000, 2000, 50000]).unwrap())
            .unwrap();
        let mut filter = Biquad::default();

        let low = ch.tick(0, &mut filter).unwrap();
        assert_eq!(low, ChannelOutput { hid: 0, serial: 0 });
        let high = ch.tick(65535, &mut filter).unwrap();
        assert_eq!(high, ChannelOutput { hid: 65535, serial: 100 });
        let edge = ch.tick(2000, &mut filter).unwrap();
        assert_eq!(edge.hid, 0);
    }

    #[test]
    fn test_inversion_uses_raw_bit_depth() {
        let mut ch = identity_channel();
        let mut store = MemorySettings::new();
        ch.set_inverted(&mut store, true);
        let mut filter = Biquad::default();
        let out = ch.tick(0, &mut filter).unwrap();
        assert_eq!(out, ChannelOutput { hid: 65535, serial: 100 });
        assert!(ch.status().contains(";65535;"));
    }

    #[test]
    fn test_output_map_shapes_both_domains() {
        let mut ch = identity_channel();
        let mut store = MemorySettings::new();
        ch.set_output_map(&mut store, CurveTable::new([0, 10, 20, 30, 40, 100]).unwrap());
        let mut filter = Biquad::default();
        // 20% in lands on the second breakpoint exactly.
        let out = ch.tick(13107, &mut filter).unwrap();
        assert_eq!(out.serial, 10);
        assert_eq!(out.hid, 6553);
    }

    #[test]
    fn test_smoothing_runs_through_filter() {
        let mut ch = PedalChannel::new(Role::Brake);
        let mut filter = Biquad::new(FilterSettings {
            kind: FilterKind::LowPass,
            ..DEFAULT_FILTER
        })
        .unwrap();
        let first = ch.tick(60000, &mut filter).unwrap();
        assert!(first.hid < 60000);
        let mut last = first;
        for _ in 0..200 {
            last = ch.tick(60000, &mut filter).unwrap();
        }
        assert_eq!(last.hid, 60000);
    }

    #[test]
    fn test_small_hid_depth() {
        let mut ch = identity_channel();
        let mut store = MemorySettings::new();
        ch.set_bit_depths(&mut store, BitDepths::new(1023, 255).unwrap());
        assert_eq!(ch.calibration(), CalibrationQuad::full_scale(1023));
        let mut filter = Biquad::default();
        assert_eq!(ch.tick(1023, &mut filter).unwrap().hid, 255);
        assert_eq!(ch.tick(0, &mut filter).unwrap().hid, 0);
    }

    #[test]
    fn test_resonant_filter_with_inversion_stays_in_range() {
        let mut ch = PedalChannel::new(Role::Throttle);
        let mut store = MemorySettings::new();
        ch.set_inverted(&mut store, true);
        let mut filter = Biquad::new(FilterSettings {
            kind: FilterKind::Peak,
            cutoff: 0.25,
            q: 0.5,
            peak_gain_db: 200.0,
        })
        .unwrap();
        for raw in [65535, 0, 65535, 0, 65535, 0, 0, 65535, 0] {
            let out = ch.tick(raw, &mut filter).unwrap();
            assert!((0..=65535).contains(&out.hid), "hid = {}", out.hid);
            assert!((0..=100).contains(&out.serial), "serial = {}", out.serial);
        }
    }

    #[test]
    fn test_unsmoothed_extreme_reading_inverts_without_overflow() {
        let mut ch = identity_channel();
        let mut store = MemorySettings::new();
        ch.set_inverted(&mut store, true);
        let mut filter = Biquad::default();
        let out = ch.tick(i32::MIN, &mut filter).unwrap();
        assert_eq!(out, ChannelOutput { hid: 65535, serial: 100 });
    }

    #[test]
    fn test_shrinking_bits_resets_any_out_of_range_value() {
        let mut ch = PedalChannel::new(Role::Brake);
        let mut store = MemorySettings::new();
        let quad = CalibrationQuad::new([0, 65535, 0, 1000]).unwrap();
        ch.set_calibration(&mut store, quad).unwrap();
        ch.set_bit_depths(&mut store, BitDepths::new(1023, 255).unwrap());
        assert_eq!(ch.calibration(), CalibrationQuad::full_scale(1023));
        let saved: CalibrationQuad = store.load("brake_calibration").unwrap().unwrap();
        assert_eq!(saved, CalibrationQuad::full_scale(1023));
    }

    #[test]
    fn test_calibration_outside_raw_range_rejected() {
        let mut ch = PedalChannel::new(Role::Clutch);
        let mut store = MemorySettings::new();
        ch.set_bit_depths(&mut store, BitDepths::new(1023, 255).unwrap());
        let quad = CalibrationQuad::new([0, 4000, 0, 4000]).unwrap();
        assert_eq!(ch.set_calibration(&mut store, quad), Err(ConfigError::OutOfRange));
        assert_eq!(ch.calibration(), CalibrationQuad::full_scale(1023));
    }

    #[test]
    fn test_setters_persist_and_load_restores() {
        let mut store = MemorySettings::new();
        let mut ch = PedalChannel::new(Role::Brake);
        let curve = CurveTable::new([0, 5, 30, 70, 95, 100]).unwrap();
        ch.set_bit_depths(&mut store, BitDepths::new(4095, 1023).unwrap());
        ch.set_output_map(&mut store, curve);
        ch.set_calibration(&mut store, CalibrationQuad::new([10, 4000, 20, 3900]).unwrap())
            .unwrap();
        ch.set_inverted(&mut store, true);
        ch.set_signal_source(&mut store, SignalSource::LoadCell { dout: 2, clock: 3 });

        let mut fresh = PedalChannel::new(Role::Brake);
        fresh.load(&store, false, true);
        assert_eq!(fresh.bits(), BitDepths::new(4095, 1023).unwrap());
        assert_eq!(fresh.output_map(), &curve);
        assert_eq!(fresh.calibration().values(), &[10, 4000, 20, 3900]);
        assert!(fresh.inverted());
        assert!(fresh.smoothing());
        assert_eq!(fresh.source(), Some(SignalSource::LoadCell { dout: 2, clock: 3 }));
    }

    #[test]
    fn test_invalid_saved_values_fall_back() {
        let mut store = MemorySettings::new();
        // Written as raw arrays so validation is bypassed.
        store
            .store("throttle_output_map", &[0i32, 20, 40, 60, 80, 250])
            .unwrap();
        store
            .store("throttle_calibration", &[900i32, 100, 900, 100])
            .unwrap();
        let mut ch = PedalChannel::new(Role::Throttle);
        ch.load(&store, true, false);
        assert_eq!(ch.output_map(), &CurveTable::LINEAR);
        assert_eq!(ch.calibration(), CalibrationQuad::full_scale(65535));
        assert!(ch.inverted());
        assert!(!ch.smoothing());
    }

    #[test]
    fn test_restore_defaults() {
        let mut store = MemorySettings::new();
        let mut ch = PedalChannel::new(Role::Clutch);
        ch.set_output_map(&mut store, CurveTable::new([0, 0, 0, 0, 0, 100]).unwrap());
        ch.set_inverted(&mut store, true);
        ch.set_smoothing(&mut store, false);
        ch.restore_defaults(&mut store);
        assert_eq!(ch.output_map(), &CurveTable::LINEAR);
        assert!(!ch.inverted());
        assert!(ch.smoothing());
        assert_eq!(store.load::<bool>("clutch_inverted"), Ok(Some(false)));
    }
}
