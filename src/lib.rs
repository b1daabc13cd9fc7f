// washwatch — library root
//
// Battery-powered washing machine monitor. The device deep-sleeps until the
// LIS3DH accelerometer raises a motion interrupt or an armed timer expires,
// runs one pass of the wake cycle state machine, and goes back to sleep.
// Binaries live in src/bin: `washwatch` (the monitor) and `batteryserver`
// (live battery telemetry over a minimal WebSocket server).

pub mod config;
pub mod cycle;
pub mod drivers;
#[cfg(target_os = "espidf")]
pub mod power;
pub mod settings;
pub mod telegram;
#[cfg(target_os = "espidf")]
pub mod wifi;
pub mod ws;
