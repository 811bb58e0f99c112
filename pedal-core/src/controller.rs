//! PedalController: one iteration of the firmware loop.

use embedded_hal_async::delay::DelayNs;

use crate::bank::{BankState, PedalBank};
use crate::command::dispatch;
use crate::output::{send_with_retry, AxisSink, ConsoleSink, OutputError};
use crate::sensor::SensorDrivers;
use crate::settings::SettingsStore;

/// What the caller should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepOutcome {
    /// Keep ticking.
    Running,
    /// Settings were reset or cleared; restart the device.
    RestartRequested,
}

/// Error type for controller steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerError {
    /// The bank has not been loaded, or is waiting for a restart.
    NotRunning,
    /// The HID report for this tick was dropped.
    Output(OutputError),
}

/// Ties a [`PedalBank`] to its sensors, HID transport and console.
///
/// Each step handles at most one console line, then runs one tick, so a
/// command received in a step is visible to that same step's tick.
pub struct PedalController<S, D, H, C, T> {
    bank: PedalBank<S>,
    drivers: D,
    hid: H,
    console: C,
    delay: T,
}

impl<S, D, H, C, T> PedalController<S, D, H, C, T>
where
    S: SettingsStore,
    D: SensorDrivers,
    H: AxisSink,
    C: ConsoleSink,
    T: DelayNs,
{
    /// Create a controller around a loaded bank.
    pub fn new(bank: PedalBank<S>, drivers: D, hid: H, console: C, delay: T) -> Self {
        Self {
            bank,
            drivers,
            hid,
            console,
            delay,
        }
    }

    /// Process an optional console line, then tick once.
    ///
    /// Undecodable lines are logged and dropped. The status line is only
    /// written when the console has drained the previous one. A HID report
    /// that stays busy past the retry bound is dropped and reported; the
    /// next step sends fresh values. While the transport is not ready the
    /// report is held without being sent.
    pub async fn process_one(
        &mut self,
        line: Option<&[u8]>,
    ) -> Result<StepOutcome, ControllerError> {
        if self.bank.state() != BankState::Running {
            return Err(ControllerError::NotRunning);
        }

        if let Some(bytes) = line {
            if self.handle_line(bytes).await {
                info!("restart requested");
                return Ok(StepOutcome::RestartRequested);
            }
        }

        self.bank.tick(&mut self.drivers, H::AXIS_MAX);

        let mut result = Ok(StepOutcome::Running);
        if let Some(report) = self.bank.pending_report() {
            if self.hid.is_ready() {
                match send_with_retry(&mut self.hid, &mut self.delay, &report).await {
                    Ok(()) => self.bank.mark_sent(report),
                    Err(e) => {
                        warn!("hid report dropped: {:?}", e);
                        result = Err(ControllerError::Output(e));
                    }
                }
            } else {
                // Stays pending until the transport is ready.
                debug!("hid not ready, report held");
            }
        }

        let status = self.bank.status_line();
        if !status.is_empty() && self.console.is_drained() {
            if let Err(e) = self.console.write_line(status).await {
                debug!("status line dropped: {:?}", e);
            }
        }

        result
    }

    /// Returns true when the line asked for a restart.
    async fn handle_line(&mut self, bytes: &[u8]) -> bool {
        let text = match core::str::from_utf8(bytes) {
            Ok(text) => text.trim(),
            Err(_) => {
                warn!("dropping undecodable line ({} bytes)", bytes.len());
                return false;
            }
        };
        if text.is_empty() {
            return false;
        }

        let result = dispatch(&mut self.bank, text);
        for reply in result.replies.iter() {
            if let Err(e) = self.console.write_line(reply).await {
                warn!("reply dropped: {:?}", e);
            }
        }
        result.restart
    }

    /// Get a reference to the bank.
    pub fn bank(&self) -> &PedalBank<S> {
        &self.bank
    }

    /// Get a mutable reference to the bank.
    pub fn bank_mut(&mut self) -> &mut PedalBank<S> {
        &mut self.bank
    }

    pub fn hid(&self) -> &H {
        &self.hid
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    /// Decompose the controller into its components.
    pub fn into_parts(self) -> (PedalBank<S>, D, H, C, T) {
        (self.bank, self.drivers, self.hid, self.console, self.delay)
    }
}
