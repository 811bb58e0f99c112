#![no_std]
#![no_main]

use cortex_m::peripheral::SCB;
use defmt::{error, info, unwrap, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::flash::Flash;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_time::{Delay, Duration, Ticker, Timer};
use embassy_usb::class::{cdc_acm, hid};
use embassy_usb::{Builder, Config as UsbConfig};
use pedal_box_firmware::board::{apply_wiring, BRAKE_GAIN, TARE_SAMPLES};
use pedal_box_firmware::hx711::Hx711;
use pedal_box_firmware::{
    configure_console, configure_usb_hid, BoardSensors, ConsoleRx, ConsoleWriter,
    ControllerError, FlashSettings, LoadOutcome, PedalBank, PedalController,
    PedalRequestHandler, StepOutcome, UsbHidAxes, LINE_QUEUE,
};
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// One pedal sample and HID report per tick.
const TICK: Duration = Duration::from_millis(5);

/// Lets the host read the last reply before the device drops off the bus.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// HID and CDC-ACM class state.
static HID_STATE: StaticCell<hid::State> = StaticCell::new();
static HID_HANDLER: StaticCell<PedalRequestHandler> = StaticCell::new();
static CDC_STATE: StaticCell<cdc_acm::State> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("PedalBox starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Settings ---
    let flash = Flash::new_blocking(p.FLASH);
    let mut bank = PedalBank::new(FlashSettings::open(flash));
    if bank.load() == LoadOutcome::DefaultsWritten {
        commit(&mut bank);
        info!("defaults written, restarting");
        SCB::sys_reset();
    }
    apply_wiring(&mut bank);
    commit(&mut bank);

    // --- Sensors ---
    let adc = Adc::new_blocking(p.ADC, adc::Config::default());
    let throttle = adc::Channel::new_pin(p.PIN_26, Pull::None);
    let clutch = adc::Channel::new_pin(p.PIN_27, Pull::None);
    let mut brake = unwrap!(Hx711::new(
        Input::new(p.PIN_2, Pull::None),
        Output::new(p.PIN_3, Level::Low),
        Delay,
    ));
    brake.set_gain(BRAKE_GAIN);
    match brake.tare(TARE_SAMPLES) {
        Ok(offset) => info!("brake tared at {}", offset),
        Err(e) => warn!("brake tare failed: {:?}", e),
    }

    #[cfg_attr(not(feature = "ads1115"), allow(unused_mut))]
    let mut sensors = BoardSensors::new(adc, throttle, clutch, brake);
    #[cfg(feature = "ads1115")]
    {
        use pedal_box_firmware::ads1115::{Ads1115, DEFAULT_ADDRESS};
        let i2c = embassy_rp::i2c::I2c::new_blocking(
            p.I2C0,
            p.PIN_5, // SCL
            p.PIN_4, // SDA
            embassy_rp::i2c::Config::default(),
        );
        sensors = sensors.with_external_adc(Ads1115::new(i2c, Delay, DEFAULT_ADDRESS));
    }

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0xDDFD, 0x5060);
    usb_config.manufacturer = Some("Custom Sim Hardware");
    usb_config.product = Some("PedalBox");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;
    // Composite device: HID plus CDC-ACM.
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    let hid_writer = configure_usb_hid(
        &mut builder,
        HID_STATE.init(hid::State::new()),
        HID_HANDLER.init(PedalRequestHandler),
    );
    let (console, console_writer, console_rx) =
        configure_console(&mut builder, CDC_STATE.init(cdc_acm::State::new()));

    let usb_device = builder.build();
    let mut hid = UsbHidAxes::new(hid_writer);

    // On-board LED, toggled when a HID report is dropped
    let mut led = Output::new(p.PIN_25, Level::Low);

    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(console_rx_task(console_rx).unwrap());
    spawner.spawn(console_tx_task(console_writer).unwrap());

    hid.wait_ready().await;
    info!("USB ready, reporting pedals...");

    let mut controller = PedalController::new(bank, sensors, hid, console, Delay);
    let mut ticker = Ticker::every(TICK);

    loop {
        let line = LINE_QUEUE.try_receive().ok();
        match controller.process_one(line.as_deref()).await {
            Ok(StepOutcome::Running) => {}
            Ok(StepOutcome::RestartRequested) => {
                commit(controller.bank_mut());
                Timer::after(RESTART_DELAY).await;
                SCB::sys_reset();
            }
            Err(ControllerError::Output(_)) => led.toggle(),
            Err(ControllerError::NotRunning) => {
                error!("bank not running, restarting");
                SCB::sys_reset();
            }
        }
        commit(controller.bank_mut());
        ticker.next().await;
    }
}

/// Write pending settings to flash; failures are logged and retried next tick.
fn commit(bank: &mut PedalBank<FlashSettings>) {
    if let Err(e) = bank.store_mut().commit() {
        warn!("settings not saved: {:?}", e);
    }
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Console input task - queues command lines for the main loop.
#[embassy_executor::task]
async fn console_rx_task(rx: ConsoleRx<'static>) {
    rx.run().await
}

/// Console output task - writes replies and status lines.
#[embassy_executor::task]
async fn console_tx_task(writer: ConsoleWriter<'static>) {
    writer.run().await
}
