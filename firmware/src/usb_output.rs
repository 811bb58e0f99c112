//! USB HID three-axis output implementation.

use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_usb::class::hid::{HidWriter, ReportId, RequestHandler, State};
use embassy_usb::control::OutResponse;
use embassy_usb::driver::EndpointError;
use embassy_usb::Builder;
use pedal_core::{AxisReport, AxisSink, OutputError};

/// Size of one report: X, Y and Z, one byte each.
pub const REPORT_SIZE: usize = 3;

/// HID joystick with three unsigned 8-bit axes.
///
/// Throttle is X, brake is Y, clutch is Z.
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x04, // Usage (Joystick)
    0xA1, 0x01, // Collection (Application)
    0xA1, 0x00, //   Collection (Physical)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x09, 0x32, //     Usage (Z)
    0x15, 0x00, //     Logical Minimum (0)
    0x26, 0xFF, 0x00, //     Logical Maximum (255)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x03, //     Report Count (3)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0xC0, //   End Collection
    0xC0, // End Collection
];

type UsbDriver<'d> = Driver<'d, USB>;

/// USB HID axis output.
///
/// Wraps an embassy-usb HID writer to send axis reports.
pub struct UsbHidAxes<'d> {
    writer: HidWriter<'d, UsbDriver<'d>, REPORT_SIZE>,
    ready: bool,
}

impl<'d> UsbHidAxes<'d> {
    pub fn new(writer: HidWriter<'d, UsbDriver<'d>, REPORT_SIZE>) -> Self {
        Self {
            writer,
            ready: false,
        }
    }

    /// Wait until the host has configured the device.
    pub async fn wait_ready(&mut self) {
        self.writer.ready().await;
        self.ready = true;
    }
}

fn encode(report: &AxisReport) -> Result<[u8; REPORT_SIZE], OutputError> {
    let axis = |v: u16| u8::try_from(v).map_err(|_| OutputError::OutOfRange);
    Ok([axis(report.x)?, axis(report.y)?, axis(report.z)?])
}

impl AxisSink for UsbHidAxes<'_> {
    const AXIS_MAX: u16 = u8::MAX as u16;

    async fn send_axes(&mut self, report: &AxisReport) -> Result<(), OutputError> {
        if !self.ready {
            return Err(OutputError::NotReady);
        }
        let bytes = encode(report)?;
        self.writer.write(&bytes).await.map_err(|e| match e {
            // Host suspended or reconfiguring the interface.
            EndpointError::Disabled => OutputError::Busy,
            EndpointError::BufferOverflow => OutputError::Io,
        })
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// HID request handler.
///
/// The device has no output or feature reports.
pub struct PedalRequestHandler;

impl RequestHandler for PedalRequestHandler {
    fn get_report(&mut self, _id: ReportId, _buf: &mut [u8]) -> Option<usize> {
        None
    }

    fn set_report(&mut self, _id: ReportId, _data: &[u8]) -> OutResponse {
        OutResponse::Accepted
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, _duration_ms: u32) {}

    fn get_idle_ms(&mut self, _id: Option<ReportId>) -> Option<u32> {
        None
    }
}

/// Add the HID interface to the USB builder.
pub fn configure_usb_hid<'d>(
    builder: &mut Builder<'d, UsbDriver<'d>>,
    state: &'d mut State<'d>,
    handler: &'d mut PedalRequestHandler,
) -> HidWriter<'d, UsbDriver<'d>, REPORT_SIZE> {
    let config = embassy_usb::class::hid::Config {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: Some(handler),
        poll_ms: 1,
        max_packet_size: 8,
        hid_subclass: embassy_usb::class::hid::HidSubclass::No,
        hid_boot_protocol: embassy_usb::class::hid::HidBootProtocol::None,
    };

    HidWriter::new(builder, state, config)
}
