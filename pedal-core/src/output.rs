//! Output sink traits and error types.

use core::future::Future;

use embedded_hal_async::delay::DelayNs;
use pedal_proto::Role;

use crate::config::{HID_BUSY_BACKOFF_MS, HID_BUSY_RETRIES};

/// Error type for output operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputError {
    /// USB/communication I/O error.
    Io,
    /// Device not ready (e.g., USB not enumerated).
    NotReady,
    /// Endpoint busy; worth retrying shortly.
    Busy,
    /// Axis value outside the transport's accepted range.
    OutOfRange,
}

/// One HID report: the three axis slots.
///
/// Throttle drives X, brake drives Y, clutch drives Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisReport {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

impl AxisReport {
    #[inline]
    pub fn set(&mut self, role: Role, value: u16) {
        match role {
            Role::Throttle => self.x = value,
            Role::Brake => self.y = value,
            Role::Clutch => self.z = value,
        }
    }
}

/// Async trait for the HID axis transport.
///
/// Callers pre-scale every axis into `0..=AXIS_MAX`; implementations reject
/// anything larger with [`OutputError::OutOfRange`].
pub trait AxisSink {
    /// Largest value an axis field accepts.
    const AXIS_MAX: u16;

    /// Send one report.
    fn send_axes(&mut self, report: &AxisReport) -> impl Future<Output = Result<(), OutputError>>;

    /// Check if the transport is ready to accept data.
    fn is_ready(&self) -> bool;
}

/// Async trait for the line-oriented serial console.
pub trait ConsoleSink {
    /// Queue one line; the sink appends the newline.
    fn write_line(&mut self, line: &str) -> impl Future<Output = Result<(), OutputError>>;

    /// True once everything previously written has left the device.
    fn is_drained(&self) -> bool;
}

/// Send `report`, retrying a bounded number of times while the sink is busy.
///
/// Any other error, or a busy sink after the last retry, is returned.
pub async fn send_with_retry<H, T>(
    sink: &mut H,
    delay: &mut T,
    report: &AxisReport,
) -> Result<(), OutputError>
where
    H: AxisSink,
    T: DelayNs,
{
    let mut attempt = 0;
    loop {
        match sink.send_axes(report).await {
            Err(OutputError::Busy) if attempt < HID_BUSY_RETRIES => {
                attempt += 1;
                trace!("hid busy, retry {}", attempt);
                delay.delay_ms(HID_BUSY_BACKOFF_MS).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::test_util::block_on;
    use core::future::Future;
    use std::vec::Vec;

    struct FlakySink {
        busy_for: usize,
        attempts: usize,
        sent: Vec<AxisReport>,
    }

    impl AxisSink for FlakySink {
        const AXIS_MAX: u16 = 255;

        fn send_axes(
            &mut self,
            report: &AxisReport,
        ) -> impl Future<Output = Result<(), OutputError>> {
            self.attempts += 1;
            let result = if self.attempts <= self.busy_for {
                Err(OutputError::Busy)
            } else {
                self.sent.push(*report);
                Ok(())
            };
            core::future::ready(result)
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        total_ns: u64,
    }

    impl DelayNs for CountingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    fn sink(busy_for: usize) -> FlakySink {
        FlakySink {
            busy_for,
            attempts: 0,
            sent: Vec::new(),
        }
    }

    #[test]
    fn test_axis_slots_follow_roles() {
        let mut report = AxisReport::default();
        report.set(Role::Throttle, 1);
        report.set(Role::Brake, 2);
        report.set(Role::Clutch, 3);
        assert_eq!(report, AxisReport { x: 1, y: 2, z: 3 });
    }

    #[test]
    fn test_retry_recovers_from_transient_busy() {
        let mut hid = sink(2);
        let mut delay = CountingDelay::default();
        let report = AxisReport { x: 10, y: 0, z: 0 };
        assert_eq!(block_on(send_with_retry(&mut hid, &mut delay, &report)), Ok(()));
        assert_eq!(hid.attempts, 3);
        assert_eq!(hid.sent, [report]);
        assert_eq!(delay.total_ns, 2 * u64::from(HID_BUSY_BACKOFF_MS) * 1_000_000);
    }

    #[test]
    fn test_retry_gives_up_after_bound() {
        let mut hid = sink(usize::MAX);
        let mut delay = CountingDelay::default();
        let result = block_on(send_with_retry(&mut hid, &mut delay, &AxisReport::default()));
        assert_eq!(result, Err(OutputError::Busy));
        assert_eq!(hid.attempts, 1 + usize::from(HID_BUSY_RETRIES));
        assert!(hid.sent.is_empty());
    }
}
