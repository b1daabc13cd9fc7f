// washwatch — Battery Telemetry Server
//
// Standalone build for soak-testing the battery calibration: joins Wi-Fi,
// listens on a bare TCP socket, upgrades each client to a WebSocket, and
// streams a battery reading roughly every second while cycling the on-board
// LED through the rainbow. No deep sleep here; this build runs tethered.

#[cfg(target_os = "espidf")]
use std::io::{Read, Write};
#[cfg(target_os = "espidf")]
use std::net::{TcpListener, TcpStream};
#[cfg(target_os = "espidf")]
use std::thread;
#[cfg(target_os = "espidf")]
use std::time::Duration;

#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::AnyOutputPin;
#[cfg(target_os = "espidf")]
use esp_idf_hal::prelude::*;
#[cfg(target_os = "espidf")]
use esp_idf_svc::eventloop::EspSystemEventLoop;
#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::EspDefaultNvsPartition;

#[cfg(target_os = "espidf")]
use washwatch::config::*;
#[cfg(target_os = "espidf")]
use washwatch::cycle::BatteryGauge;
#[cfg(target_os = "espidf")]
use washwatch::drivers::battery::AdcBattery;
#[cfg(target_os = "espidf")]
use washwatch::drivers::rgb::{color_wheel, RgbLed};
#[cfg(target_os = "espidf")]
use washwatch::ws;

/// The server only runs on the ESP32; a host build (e.g. `cargo test`)
/// gets an empty entry point so the binary target still links.
#[cfg(not(target_os = "espidf"))]
fn main() {}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("battery telemetry server starting");

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // SAFETY: each pin is claimed exactly once, right here.
    let (rgb_data, rgb_power) = unsafe {
        (
            AnyOutputPin::new(PIN_RGB_DATA),
            AnyOutputPin::new(PIN_RGB_POWER),
        )
    };
    let mut led = RgbLed::new(peripherals.rmt.channel0, rgb_data, rgb_power)?;
    led.set_color(255, 0, 0)?;

    let _wifi = washwatch::wifi::connect(peripherals.modem, sys_loop, nvs_partition)?;
    let mut battery = AdcBattery::new()?;

    let listener = TcpListener::bind(("0.0.0.0", WS_SERVER_PORT))?;
    log::info!("listening on port {WS_SERVER_PORT}");

    let mut color_pos: u8 = 0;
    loop {
        let (stream, addr) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        log::info!("client connected from {addr}");

        match serve_client(stream, &mut battery, &mut led, &mut color_pos) {
            Ok(()) => log::info!("client disconnected"),
            Err(e) => log::warn!("client dropped: {e:#}"),
        }
    }
}

#[cfg(target_os = "espidf")]
fn serve_client(
    mut stream: TcpStream,
    battery: &mut AdcBattery,
    led: &mut RgbLed,
    color_pos: &mut u8,
) -> anyhow::Result<()> {
    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf)?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let key = ws::client_key(&request)
        .ok_or_else(|| anyhow::anyhow!("upgrade request without Sec-WebSocket-Key"))?;
    stream.write_all(ws::handshake_response(key).as_bytes())?;

    loop {
        let reading = battery.read()?;
        let message = serde_json::json!({
            "percent": reading.percent,
            "voltage": reading.voltage,
            "adc": reading.raw,
        })
        .to_string();
        stream.write_all(&ws::encode_text_frame(&message))?;
        log::debug!("sent {message}");

        // ~1 s of rainbow between samples.
        for _ in 0..WS_COLOR_STEPS_PER_SAMPLE {
            let (r, g, b) = color_wheel(*color_pos);
            led.set_color(r, g, b)?;
            *color_pos = color_pos.wrapping_add(1);
            thread::sleep(Duration::from_millis(WS_COLOR_STEP_MS));
        }
    }
}
