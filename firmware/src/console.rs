//! USB CDC-ACM console carrying settings commands and status lines.
//!
//! Incoming bytes are split into lines by [`ConsoleRx`] and queued on
//! [`LINE_QUEUE`] for the main loop. Outgoing lines are queued by
//! [`ConsoleTx`] and written by [`ConsoleWriter::run`] in its own task.

use defmt::{debug, warn};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::Builder;
use heapless::{String, Vec};
use pedal_core::pedal_proto::{line_bytes, LINE_END, MAX_LINE_LENGTH, REPLY_CAPACITY};
use pedal_core::{ConsoleSink, OutputError};
use portable_atomic::{AtomicBool, Ordering};

/// Full-speed bulk packet size.
pub const PACKET_SIZE: u16 = 64;

/// One received command line, without its terminator.
pub type ConsoleLine = Vec<u8, MAX_LINE_LENGTH>;

type TxLine = String<REPLY_CAPACITY>;
type UsbDriver<'d> = Driver<'d, USB>;

/// Lines received from the host, oldest first.
pub static LINE_QUEUE: Channel<CriticalSectionRawMutex, ConsoleLine, 4> = Channel::new();

static TX_QUEUE: Channel<CriticalSectionRawMutex, TxLine, 8> = Channel::new();

/// Set while the TX task is part way through a line.
static TX_BUSY: AtomicBool = AtomicBool::new(false);

/// Why a line was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
enum LineError {
    /// Line longer than [`MAX_LINE_LENGTH`]; the rest of it was discarded.
    Overflow,
    /// Host closed the port.
    Disconnected,
}

impl From<EndpointError> for LineError {
    fn from(_: EndpointError) -> Self {
        LineError::Disconnected
    }
}

/// Add the CDC-ACM interface to the USB builder and split it.
///
/// The writer and receiver each need their own task.
pub fn configure_console<'d>(
    builder: &mut Builder<'d, UsbDriver<'d>>,
    state: &'d mut State<'d>,
) -> (ConsoleTx, ConsoleWriter<'d>, ConsoleRx<'d>) {
    let class = CdcAcmClass::new(builder, state, PACKET_SIZE);
    let (sender, receiver) = class.split();
    (
        ConsoleTx,
        ConsoleWriter { tx: sender },
        ConsoleRx::new(receiver),
    )
}

/// Receiving half: assembles packets into lines.
pub struct ConsoleRx<'d> {
    rx: Receiver<'d, UsbDriver<'d>>,
    packet: [u8; PACKET_SIZE as usize],
    pos: usize,
    len: usize,
    line: ConsoleLine,
}

impl<'d> ConsoleRx<'d> {
    pub fn new(rx: Receiver<'d, UsbDriver<'d>>) -> Self {
        Self {
            rx,
            packet: [0; PACKET_SIZE as usize],
            pos: 0,
            len: 0,
            line: Vec::new(),
        }
    }

    /// Receive lines forever, queueing each one on [`LINE_QUEUE`].
    pub async fn run(mut self) -> ! {
        loop {
            self.rx.wait_connection().await;
            debug!("console connected");
            self.pos = 0;
            self.len = 0;

            loop {
                match self.read_line().await {
                    Ok(()) => LINE_QUEUE.send(self.line.clone()).await,
                    Err(LineError::Overflow) => warn!("console line too long, discarded"),
                    Err(LineError::Disconnected) => break,
                }
            }
            debug!("console disconnected");
        }
    }

    async fn next_byte(&mut self) -> Result<u8, LineError> {
        while self.pos >= self.len {
            self.len = self.rx.read_packet(&mut self.packet).await?;
            self.pos = 0;
        }
        let byte = self.packet[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Read bytes until a newline is found or the buffer is full.
    ///
    /// If a line exceeds the buffer capacity, the rest of the line is
    /// discarded so the next line starts clean.
    async fn read_line(&mut self) -> Result<(), LineError> {
        self.line.clear();

        loop {
            let byte = self.next_byte().await?;
            if byte == LINE_END {
                return Ok(());
            }

            if self.line.push(byte).is_err() {
                while self.next_byte().await? != LINE_END {}
                return Err(LineError::Overflow);
            }
        }
    }
}

/// Transmitting half: a [`ConsoleSink`] feeding the writer task.
pub struct ConsoleTx;

impl ConsoleSink for ConsoleTx {
    async fn write_line(&mut self, line: &str) -> Result<(), OutputError> {
        let line = TxLine::try_from(line).map_err(|_| OutputError::OutOfRange)?;
        TX_QUEUE.try_send(line).map_err(|_| OutputError::Busy)
    }

    fn is_drained(&self) -> bool {
        TX_QUEUE.is_empty() && !TX_BUSY.load(Ordering::Acquire)
    }
}

/// Owns the USB sender and writes queued lines.
pub struct ConsoleWriter<'d> {
    tx: Sender<'d, UsbDriver<'d>>,
}

impl ConsoleWriter<'_> {
    /// Write queued lines forever, each followed by LF.
    pub async fn run(mut self) -> ! {
        loop {
            self.tx.wait_connection().await;
            // Anything queued while closed is stale.
            TX_QUEUE.clear();

            loop {
                let line = TX_QUEUE.receive().await;
                TX_BUSY.store(true, Ordering::Release);
                let result = self.write_line(&line).await;
                TX_BUSY.store(false, Ordering::Release);
                if result.is_err() {
                    break;
                }
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), EndpointError> {
        let max = usize::from(self.tx.max_packet_size()).min(PACKET_SIZE as usize);
        let mut chunk: Vec<u8, { PACKET_SIZE as usize }> = Vec::new();

        for byte in line_bytes(line) {
            if chunk.len() == max {
                self.tx.write_packet(&chunk).await?;
                chunk.clear();
            }
            // Capacity was just checked.
            let _ = chunk.push(byte);
        }
        // The terminator guarantees a non-empty final chunk.
        self.tx.write_packet(&chunk).await?;
        // A full final packet needs a zero-length packet to end the transfer.
        if chunk.len() == max {
            self.tx.write_packet(&[]).await?;
        }
        Ok(())
    }
}
