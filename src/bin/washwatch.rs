// washwatch — Firmware Entry Point
//
// Boot sequence (one pass per wake, always ending in deep sleep):
//   1. Read the wake cause and blink it on the status LED.
//   2. Bring up I2C and verify/initialise the LIS3DH (fatal if absent).
//   3. Run one pass of the wake cycle state machine.
//   4. Power down the LED, arm the wake sources, and deep-sleep.
//
// Wi-Fi only comes up if the cycle actually needs the bot API; a motion
// wake goes back to sleep without ever touching the radio.

#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin};
#[cfg(target_os = "espidf")]
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
#[cfg(target_os = "espidf")]
use esp_idf_hal::prelude::*;
#[cfg(target_os = "espidf")]
use esp_idf_svc::eventloop::EspSystemEventLoop;
#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::EspDefaultNvsPartition;

#[cfg(target_os = "espidf")]
use washwatch::config::*;
#[cfg(target_os = "espidf")]
use washwatch::cycle::{WakeCause, WakeCycleController};
#[cfg(target_os = "espidf")]
use washwatch::drivers::battery::AdcBattery;
#[cfg(target_os = "espidf")]
use washwatch::drivers::lis3dh::Lis3dh;
#[cfg(target_os = "espidf")]
use washwatch::drivers::rgb::RgbLed;
#[cfg(target_os = "espidf")]
use washwatch::power::{read_wake_cause, DeepSleep};
#[cfg(target_os = "espidf")]
use washwatch::settings::{MotionSettings, NvsStore, SettingsStore};
#[cfg(target_os = "espidf")]
use washwatch::telegram::TelegramChannel;

/// The firmware only runs on the ESP32; a host build (e.g. `cargo test`)
/// gets an empty entry point so the binary target still links.
#[cfg(not(target_os = "espidf"))]
fn main() {}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // Read the wake reason exactly once, before anything can branch on it.
    let cause = read_wake_cause();
    log::info!("washwatch starting, wake cause {cause:?}");

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // Pins come from config as plain numbers; the board wiring is fixed.
    // SAFETY: each pin is claimed exactly once, right here.
    let (sda, scl, rgb_data, rgb_power) = unsafe {
        (
            AnyIOPin::new(PIN_I2C_SDA),
            AnyIOPin::new(PIN_I2C_SCL),
            AnyOutputPin::new(PIN_RGB_DATA),
            AnyOutputPin::new(PIN_RGB_POWER),
        )
    };

    let mut led = RgbLed::new(peripherals.rmt.channel0, rgb_data, rgb_power)?;
    let blinks = match cause {
        WakeCause::MotionInterrupt => 2,
        _ => 1,
    };
    if let Err(e) = led.blink(blinks) {
        log::warn!("status led unavailable: {e:#}");
    }

    let i2c_config = I2cConfig::new().baudrate(I2C_BAUDRATE_HZ.Hz().into());
    let i2c = I2cDriver::new(peripherals.i2c0, sda, scl, &i2c_config)?;

    let mut store = NvsStore::new(nvs_partition.clone())?;
    let boot_settings = store
        .load_settings()
        .unwrap_or(None)
        .unwrap_or_else(MotionSettings::default);

    // An unverified sensor means motion wakes can never fire; halting here
    // (and logging over serial) beats pretending to monitor.
    let mut sensor = Lis3dh::new(i2c);
    sensor.init(&boot_settings)?;

    let channel = TelegramChannel::new(peripherals.modem, sys_loop, nvs_partition);
    let battery = AdcBattery::new()?;

    let mut controller = WakeCycleController::new(sensor, DeepSleep, channel, store, battery);
    let plan = controller.run(cause);

    if let Err(e) = led.shutdown() {
        log::warn!("status led shutdown failed: {e:#}");
    }

    DeepSleep.enter(plan)
}
