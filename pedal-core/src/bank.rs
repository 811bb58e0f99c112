//! PedalBank: owns every channel, its filter and the aggregated outputs.

use heapless::String;
use serde::Serialize;

use pedal_proto::{BitDepths, CalibrationQuad, ConfigError, CurveTable, Role};

use crate::channel::PedalChannel;
use crate::config::{DEFAULT_ENABLED, DEFAULT_INVERTED, DEFAULT_SMOOTHING, STATUS_LINE_CAPACITY};
use crate::filter::{Biquad, FilterSettings};
use crate::mapper::scale_linear;
use crate::output::AxisReport;
use crate::sensor::{SensorDrivers, SensorError, SignalSource};
use crate::settings::{keys, load_or, ChannelKey, SettingsStore};

/// Lifecycle of the bank.
///
/// `RestartPending` is terminal: the device must restart and load again
/// from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BankState {
    Uninitialized,
    Loading,
    Running,
    RestartPending,
}

/// Result of [`PedalBank::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadOutcome {
    /// Saved settings were applied; the bank is running.
    Restored,
    /// The store was empty; defaults were written and a restart is pending.
    DefaultsWritten,
}

/// All pedal channels plus their settings store.
///
/// Each role owns one channel, one smoothing filter and one HID axis slot.
pub struct PedalBank<S> {
    store: S,
    state: BankState,
    channels: [PedalChannel; 3],
    filters: [Biquad; 3],
    enabled: [bool; 3],
    axes: AxisReport,
    last_sent: Option<AxisReport>,
    status: String<STATUS_LINE_CAPACITY>,
}

impl<S: SettingsStore> PedalBank<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: BankState::Uninitialized,
            channels: Role::ALL.map(PedalChannel::new),
            filters: [Biquad::default(), Biquad::default(), Biquad::default()],
            enabled: [DEFAULT_ENABLED; 3],
            axes: AxisReport::default(),
            last_sent: None,
            status: String::new(),
        }
    }

    /// Apply saved settings, or write defaults on first boot.
    pub fn load(&mut self) -> LoadOutcome {
        self.state = BankState::Loading;

        if !load_or(&self.store, keys::INIT_FLAG, false) {
            info!("no saved settings, writing defaults");
            self.write_defaults();
            self.state = BankState::RestartPending;
            return LoadOutcome::DefaultsWritten;
        }

        let inverted: [bool; 3] = load_or(&self.store, keys::INVERTED_MAP, DEFAULT_INVERTED);
        let smoothing: [bool; 3] = load_or(&self.store, keys::SMOOTH_MAP, DEFAULT_SMOOTHING);
        for role in Role::ALL {
            let i = role.index();
            self.channels[i].load(&self.store, inverted[i], smoothing[i]);
            self.enabled[i] = load_or(&self.store, ChannelKey::On.for_role(role), DEFAULT_ENABLED);
            self.filters[i].reset();
        }
        self.state = BankState::Running;
        info!("settings restored, usage {:?}", self.enabled);
        LoadOutcome::Restored
    }

    /// Read every enabled channel once and update the axes and status line.
    ///
    /// Each channel's HID value is rescaled from its bit depth into
    /// `0..=axis_max`. A channel whose read or pipeline fails keeps its
    /// previous axis value and is left out of the status line.
    pub fn tick<D: SensorDrivers>(&mut self, drivers: &mut D, axis_max: u16) {
        self.status.clear();
        for role in Role::ALL {
            let i = role.index();
            if !self.enabled[i] {
                continue;
            }
            let channel = &mut self.channels[i];
            let raw = match channel.source() {
                Some(source) => source.read(drivers),
                None => Err(SensorError::NotConfigured),
            };
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("{} read failed: {:?}", role.name(), e);
                    continue;
                }
            };
            let output = match channel.tick(raw, &mut self.filters[i]) {
                Ok(output) => output,
                Err(e) => {
                    warn!("{} pipeline failed: {:?}", role.name(), e);
                    continue;
                }
            };

            let hid_max = channel.bits().hid();
            match scale_linear(output.hid.clamp(0, hid_max), 0, hid_max, 0, i32::from(axis_max)) {
                Ok(axis) => self.axes.set(role, axis.clamp(0, i32::from(axis_max)) as u16),
                Err(e) => warn!("{} axis rescale failed: {:?}", role.name(), e),
            }

            // Whole segments only.
            if self.status.push_str(channel.status()).is_err() {
                debug!("status line full, {} dropped", role.name());
            }
        }
    }

    /// The current axes if they differ from the last report sent.
    pub fn pending_report(&self) -> Option<AxisReport> {
        match self.last_sent {
            Some(sent) if sent == self.axes => None,
            _ => Some(self.axes),
        }
    }

    /// Record that `report` reached the host.
    pub fn mark_sent(&mut self, report: AxisReport) {
        self.last_sent = Some(report);
    }

    /// Concatenated status segments of the last tick.
    pub fn status_line(&self) -> &str {
        self.status.as_str()
    }

    pub fn axes(&self) -> AxisReport {
        self.axes
    }

    pub fn state(&self) -> BankState {
        self.state
    }

    pub fn channel(&self, role: Role) -> &PedalChannel {
        &self.channels[role.index()]
    }

    pub fn filter(&self, role: Role) -> &Biquad {
        &self.filters[role.index()]
    }

    pub fn is_enabled(&self, role: Role) -> bool {
        self.enabled[role.index()]
    }

    /// On/off flags in role order.
    pub fn enabled(&self) -> [bool; 3] {
        self.enabled
    }

    pub fn inverted(&self) -> [bool; 3] {
        Role::ALL.map(|r| self.channel(r).inverted())
    }

    pub fn smoothing(&self) -> [bool; 3] {
        Role::ALL.map(|r| self.channel(r).smoothing())
    }

    pub fn output_maps(&self) -> [CurveTable; 3] {
        Role::ALL.map(|r| *self.channel(r).output_map())
    }

    pub fn calibrations(&self) -> [CalibrationQuad; 3] {
        Role::ALL.map(|r| self.channel(r).calibration())
    }

    pub fn bit_depths(&self) -> [BitDepths; 3] {
        Role::ALL.map(|r| self.channel(r).bits())
    }

    pub fn set_enabled(&mut self, role: Role, on: bool) {
        self.enabled[role.index()] = on;
        persist(&mut self.store, ChannelKey::On.for_role(role), &on);
    }

    pub fn set_signal_source(&mut self, role: Role, source: SignalSource) {
        self.channels[role.index()].set_signal_source(&mut self.store, source);
    }

    pub fn set_bit_depths(&mut self, role: Role, bits: BitDepths) {
        self.channels[role.index()].set_bit_depths(&mut self.store, bits);
    }

    /// Set inversion for all roles and save the process-wide map.
    pub fn set_inverted(&mut self, flags: [bool; 3]) {
        for (channel, flag) in self.channels.iter_mut().zip(flags) {
            channel.set_inverted(&mut self.store, flag);
        }
        persist(&mut self.store, keys::INVERTED_MAP, &flags);
    }

    /// Set smoothing for all roles and save the process-wide map.
    pub fn set_smoothing(&mut self, flags: [bool; 3]) {
        for (channel, flag) in self.channels.iter_mut().zip(flags) {
            channel.set_smoothing(&mut self.store, flag);
        }
        persist(&mut self.store, keys::SMOOTH_MAP, &flags);
    }

    pub fn set_output_map(&mut self, role: Role, map: CurveTable) {
        self.channels[role.index()].set_output_map(&mut self.store, map);
    }

    /// Set all three calibrations, or none if any is outside its raw range.
    pub fn set_calibrations(&mut self, quads: [CalibrationQuad; 3]) -> Result<(), ConfigError> {
        for (channel, quad) in self.channels.iter().zip(quads.iter()) {
            let raw = channel.bits().raw();
            if quad.values().iter().any(|v| !(0..=raw).contains(v)) {
                return Err(ConfigError::OutOfRange);
            }
        }
        for (channel, quad) in self.channels.iter_mut().zip(quads) {
            channel.set_calibration(&mut self.store, quad)?;
        }
        Ok(())
    }

    pub fn reset_calibrations(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.reset_calibration(&mut self.store);
        }
    }

    /// Reconfigure one role's smoothing filter; clears its state.
    pub fn configure_filter(
        &mut self,
        role: Role,
        settings: FilterSettings,
    ) -> Result<(), ConfigError> {
        self.filters[role.index()].configure(settings)
    }

    /// Restore default maps, calibrations and flags, then request a restart.
    pub fn reset_to_defaults(&mut self) {
        info!("restoring defaults");
        self.write_defaults();
        self.state = BankState::RestartPending;
    }

    /// Wipe the store and request a restart.
    pub fn clear_store(&mut self) {
        info!("clearing saved settings");
        if let Err(e) = self.store.clear() {
            warn!("clear failed: {:?}", e);
        }
        self.state = BankState::RestartPending;
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give up the bank, keeping the store for the next load.
    pub fn into_store(self) -> S {
        self.store
    }

    fn write_defaults(&mut self) {
        persist(&mut self.store, keys::INIT_FLAG, &true);
        for channel in self.channels.iter_mut() {
            channel.restore_defaults(&mut self.store);
        }
        persist(&mut self.store, keys::INVERTED_MAP, &DEFAULT_INVERTED);
        persist(&mut self.store, keys::SMOOTH_MAP, &DEFAULT_SMOOTHING);
        for filter in self.filters.iter_mut() {
            filter.reset();
        }
    }
}

fn persist<S: SettingsStore, T: Serialize>(store: &mut S, key: &str, value: &T) {
    if let Err(e) = store.store(key, value) {
        warn!("failed to save {}: {:?}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FILTER;
    use crate::filter::FilterKind;
    use crate::settings::MemorySettings;

    struct Sensors {
        analog: i32,
    }

    impl SensorDrivers for Sensors {
        fn read_analog(&mut self, _pin: u8) -> Result<i32, SensorError> {
            Ok(self.analog)
        }
        fn read_load_cell(&mut self, _dout: u8, _clock: u8) -> Result<i32, SensorError> {
            Err(SensorError::Timeout)
        }
        fn read_i2c_channel(&mut self, _index: u8) -> Result<i32, SensorError> {
            Err(SensorError::Bus)
        }
    }

    fn running_bank() -> PedalBank<MemorySettings> {
        let mut bank = PedalBank::new(MemorySettings::new());
        assert_eq!(bank.load(), LoadOutcome::DefaultsWritten);
        let mut bank = PedalBank::new(bank.into_store());
        assert_eq!(bank.load(), LoadOutcome::Restored);
        bank
    }

    #[test]
    fn test_first_boot_writes_defaults_and_requests_restart() {
        let mut bank = PedalBank::new(MemorySettings::new());
        assert_eq!(bank.state(), BankState::Uninitialized);
        assert_eq!(bank.load(), LoadOutcome::DefaultsWritten);
        assert_eq!(bank.state(), BankState::RestartPending);
        let store = bank.into_store();
        assert_eq!(store.load::<bool>(keys::INIT_FLAG), Ok(Some(true)));
        assert_eq!(store.load::<[bool; 3]>(keys::SMOOTH_MAP), Ok(Some([true; 3])));
    }

    #[test]
    fn test_disabled_roles_are_skipped() {
        let mut bank = running_bank();
        let mut sensors = Sensors { analog: 40000 };
        bank.tick(&mut sensors, 255);
        assert_eq!(bank.axes(), AxisReport::default());
        assert_eq!(bank.status_line(), "");
    }

    #[test]
    fn test_tick_rescales_into_transport_range() {
        let mut bank = running_bank();
        bank.set_enabled(Role::Brake, true);
        bank.set_signal_source(Role::Brake, SignalSource::Analog { pin: 27 });
        bank.set_smoothing([false; 3]);
        let mut sensors = Sensors { analog: 65535 };
        bank.tick(&mut sensors, 255);
        assert_eq!(bank.axes(), AxisReport { x: 0, y: 255, z: 0 });
        assert_eq!(bank.status_line(), "B:100;100;65535;65535,");
    }

    #[test]
    fn test_failed_reads_keep_last_axis() {
        let mut bank = running_bank();
        bank.set_smoothing([false; 3]);
        bank.set_enabled(Role::Throttle, true);
        bank.set_enabled(Role::Clutch, true);
        bank.set_signal_source(Role::Throttle, SignalSource::Analog { pin: 26 });
        bank.set_signal_source(Role::Clutch, SignalSource::I2cChannel { index: 0 });
        let mut sensors = Sensors { analog: 65535 };
        bank.tick(&mut sensors, 255);
        assert_eq!(bank.axes(), AxisReport { x: 255, y: 0, z: 0 });
        assert!(bank.status_line().starts_with("T:"));
        assert!(!bank.status_line().contains("C:"));
    }

    #[test]
    fn test_configure_filter_changes_one_role() {
        let mut bank = running_bank();
        bank.set_enabled(Role::Throttle, true);
        bank.set_signal_source(Role::Throttle, SignalSource::Analog { pin: 26 });
        let high_pass = FilterSettings {
            kind: FilterKind::HighPass,
            ..DEFAULT_FILTER
        };
        assert_eq!(bank.configure_filter(Role::Throttle, high_pass), Ok(()));
        assert_eq!(bank.filter(Role::Throttle).settings().kind, FilterKind::HighPass);
        assert_eq!(bank.filter(Role::Brake).settings(), &DEFAULT_FILTER);

        let mut sensors = Sensors { analog: 65535 };
        for _ in 0..200 {
            bank.tick(&mut sensors, 255);
        }
        // A constant pedal is DC, which a high-pass removes.
        assert_eq!(bank.axes().x, 0);

        let bad_q = FilterSettings { q: 0.0, ..DEFAULT_FILTER };
        assert_eq!(
            bank.configure_filter(Role::Throttle, bad_q),
            Err(ConfigError::InvalidQ)
        );
        assert_eq!(bank.filter(Role::Throttle).settings().kind, FilterKind::HighPass);
    }

    #[test]
    fn test_enabled_without_source_is_skipped() {
        let mut bank = running_bank();
        bank.set_enabled(Role::Throttle, true);
        bank.tick(&mut Sensors { analog: 100 }, 255);
        assert_eq!(bank.axes(), AxisReport::default());
    }

    #[test]
    fn test_duplicate_reports_suppressed() {
        let mut bank = running_bank();
        bank.set_enabled(Role::Throttle, true);
        bank.set_signal_source(Role::Throttle, SignalSource::Analog { pin: 26 });
        bank.set_smoothing([false; 3]);
        let mut sensors = Sensors { analog: 30000 };

        bank.tick(&mut sensors, 255);
        let report = bank.pending_report().unwrap();
        bank.mark_sent(report);
        bank.tick(&mut sensors, 255);
        assert_eq!(bank.pending_report(), None);

        sensors.analog = 31000;
        bank.tick(&mut sensors, 255);
        assert!(bank.pending_report().is_some());
    }

    #[test]
    fn test_calibrations_all_or_nothing() {
        let mut bank = running_bank();
        bank.set_bit_depths(Role::Clutch, BitDepths::new(1023, 255).unwrap());
        let ok = CalibrationQuad::new([0, 2000, 0, 2000]).unwrap();
        assert_eq!(bank.set_calibrations([ok; 3]), Err(ConfigError::OutOfRange));
        assert_eq!(
            bank.calibrations()[0],
            CalibrationQuad::full_scale(65535)
        );
        let small = CalibrationQuad::new([0, 1000, 0, 1000]).unwrap();
        assert_eq!(bank.set_calibrations([small; 3]), Ok(()));
        assert_eq!(bank.calibrations(), [small; 3]);
    }

    #[test]
    fn test_settings_survive_restart() {
        let mut bank = running_bank();
        bank.set_enabled(Role::Brake, true);
        bank.set_inverted([false, true, false]);
        bank.set_output_map(Role::Clutch, CurveTable::new([0, 0, 10, 50, 90, 100]).unwrap());

        let mut bank = PedalBank::new(bank.into_store());
        assert_eq!(bank.load(), LoadOutcome::Restored);
        assert_eq!(bank.enabled(), [false, true, false]);
        assert_eq!(bank.inverted(), [false, true, false]);
        assert_eq!(bank.output_maps()[2].points(), &[0, 0, 10, 50, 90, 100]);
    }

    #[test]
    fn test_reset_restores_defaults_but_keeps_wiring() {
        let mut bank = running_bank();
        bank.set_enabled(Role::Throttle, true);
        bank.set_bit_depths(Role::Throttle, BitDepths::new(1023, 255).unwrap());
        bank.set_inverted([true; 3]);
        bank.set_output_map(Role::Throttle, CurveTable::new([0, 0, 0, 0, 0, 100]).unwrap());
        bank.reset_to_defaults();
        assert_eq!(bank.state(), BankState::RestartPending);

        let mut bank = PedalBank::new(bank.into_store());
        assert_eq!(bank.load(), LoadOutcome::Restored);
        assert_eq!(bank.inverted(), [false; 3]);
        assert_eq!(bank.output_maps(), [CurveTable::LINEAR; 3]);
        assert!(bank.is_enabled(Role::Throttle));
        assert_eq!(bank.bit_depths()[0], BitDepths::new(1023, 255).unwrap());
    }

    #[test]
    fn test_clear_store_forces_first_boot() {
        let mut bank = running_bank();
        bank.clear_store();
        assert_eq!(bank.state(), BankState::RestartPending);
        let mut bank = PedalBank::new(bank.into_store());
        assert_eq!(bank.load(), LoadOutcome::DefaultsWritten);
    }
}
