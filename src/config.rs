// washwatch — Hardware & System Configuration
// Target: Unexpected Maker BeeS3 (ESP32-S3)

// ---------------------------------------------------------------------------
// GPIO Pin Definitions (BeeS3 pinout)
// ---------------------------------------------------------------------------
pub const PIN_I2C_SDA: i32 = 21;      // LIS3DH data line
pub const PIN_I2C_SCL: i32 = 22;      // LIS3DH clock line
pub const PIN_MOTION_INT: i32 = 17;   // LIS3DH INT1 output, EXT0 wake source
pub const PIN_RGB_DATA: i32 = 48;     // On-board WS2812 data
pub const PIN_RGB_POWER: i32 = 34;    // LDO enable for the WS2812
pub const ADC_BATTERY_CHANNEL: u32 = 9; // GPIO10 → ADC1 channel 9 (divider tap)

// ---------------------------------------------------------------------------
// I2C Bus
// ---------------------------------------------------------------------------
pub const I2C_ADDR_LIS3DH: u8 = 0x19;
pub const I2C_BAUDRATE_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------
pub const SHORT_POLL_SLEEP_SECS: u64 = 90;        // settings sync retry
pub const POST_MOTION_DELAY_SECS: u64 = 40 * 60;  // let the wash cycle finish
pub const SENSOR_BOOT_SETTLE_MS: u64 = 100;       // LIS3DH reboot settle time

// Consecutive quiet timer wakes required before "washing done" is declared.
// One wake means one full POST_MOTION_DELAY window without motion.
pub const STABLE_QUIET_WAKES: u8 = 1;

// ---------------------------------------------------------------------------
// Motion interrupt defaults (LIS3DH register units)
// ---------------------------------------------------------------------------
pub const DEFAULT_SENSITIVITY: u8 = 2; // multiples of 16 mg at ±2 g
pub const DEFAULT_DURATION: u8 = 5;    // sample periods at 1 Hz → 5 s
pub const MOTION_REG_MAX: u8 = 0x7f;   // INT1_THS / INT1_DURATION are 7-bit

// ---------------------------------------------------------------------------
// Battery calibration (measured on the BeeS3 divider)
// ---------------------------------------------------------------------------
pub const BATTERY_ADC_SAMPLES: u32 = 16;
pub const BATTERY_DIVIDER_RATIO: f32 = 2.0;  // two 470k resistors halve the input
pub const BATTERY_OFFSET_VOLTS: f32 = 0.185; // the divider reads consistently low
pub const BATTERY_FULL_VOLTS: f32 = 4.2;
pub const BATTERY_EMPTY_VOLTS: f32 = 3.1;

// ---------------------------------------------------------------------------
// Network / bot credentials (baked in at build time, like the original
// secrets file — override with `WIFI_SSID=... cargo build`)
// ---------------------------------------------------------------------------
pub const WIFI_SSID: &str = match option_env!("WIFI_SSID") {
    Some(s) => s,
    None => "internet",
};
pub const WIFI_PASS: &str = match option_env!("WIFI_PASS") {
    Some(s) => s,
    None => "",
};
pub const TELEGRAM_TOKEN: &str = match option_env!("TELEGRAM_TOKEN") {
    Some(s) => s,
    None => "",
};
pub const TELEGRAM_CHAT_ID: &str = match option_env!("TELEGRAM_CHAT_ID") {
    Some(s) => s,
    None => "",
};

pub const WIFI_CONNECT_ATTEMPTS: u32 = 5;
pub const WIFI_RETRY_DELAY_MS: u64 = 3_000;

// ---------------------------------------------------------------------------
// NVS persistence
// ---------------------------------------------------------------------------
pub const NVS_NAMESPACE: &str = "washwatch";
pub const NVS_KEY_MOTION: &str = "motion";
pub const NVS_KEY_CYCLE: &str = "cycle";
pub const NVS_KEY_UPDATE_ID: &str = "update_id";
pub const NVS_BUF_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// Battery telemetry server variant
// ---------------------------------------------------------------------------
pub const WS_SERVER_PORT: u16 = 8765;
pub const WS_COLOR_STEPS_PER_SAMPLE: u32 = 66;
pub const WS_COLOR_STEP_MS: u64 = 15;
