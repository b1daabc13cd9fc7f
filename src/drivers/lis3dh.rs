// washwatch — LIS3DH Accelerometer Driver
//
// Register-level driver over any embedded-hal I2C bus. Configures the sensor
// so that sustained acceleration beyond a threshold on any axis raises a
// latched interrupt on the INT1 pad, which is wired to the EXT0 wake GPIO.

use std::fmt::Debug;
use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::config::{I2C_ADDR_LIS3DH, MOTION_REG_MAX, SENSOR_BOOT_SETTLE_MS};
use crate::settings::MotionSettings;

const WHO_AM_I: u8 = 0x0f;
const WHO_AM_I_ID: u8 = 0x33;

const CTRL_REG1: u8 = 0x20; // Data rate selection and X, Y, Z axis enable
const CTRL_REG2: u8 = 0x21; // High-pass filter selection
const CTRL_REG3: u8 = 0x22; // Interrupt routing
const CTRL_REG4: u8 = 0x23; // BDU, full scale, high resolution
const CTRL_REG5: u8 = 0x24; // Reboot / interrupt latching

const REFERENCE: u8 = 0x26; // Reading re-baselines the high-pass filter

const INT1_CFG: u8 = 0x30;
const INT1_SRC: u8 = 0x31; // Reading resets the interrupt latch
const INT1_THS: u8 = 0x32;
const INT1_DURATION: u8 = 0x33;

const OUT_X_L: u8 = 0x28;
const AUTO_INCREMENT: u8 = 0x80;

/// IA bit of INT1_SRC: an interrupt event has been generated.
const INT1_SRC_ACTIVE: u8 = 0x40;

/// LIR_INT1 — keep the interrupt asserted until INT1_SRC is read.
const CTRL_REG5_LATCH_INT1: u8 = 0x08;
/// BOOT — reload trimming parameters.
const CTRL_REG5_REBOOT: u8 = 0x80;

#[derive(Debug, thiserror::Error)]
pub enum SensorError<E: Debug> {
    #[error("i2c bus error: {0:?}")]
    Bus(E),
    #[error("unexpected WHO_AM_I response {0:#04x} from accelerometer")]
    NotFound(u8),
}

pub struct Lis3dh<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Lis3dh<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Identity-check the device and program the motion interrupt path.
    /// A WHO_AM_I mismatch is fatal: running with an unverified sensor would
    /// leave the device sleeping forever with no wake source that fires.
    pub fn init(&mut self, settings: &MotionSettings) -> Result<(), SensorError<I2C::Error>> {
        let id = self.read_reg(WHO_AM_I)?;
        if id != WHO_AM_I_ID {
            return Err(SensorError::NotFound(id));
        }

        self.write_reg(CTRL_REG5, CTRL_REG5_REBOOT)?;
        thread::sleep(Duration::from_millis(SENSOR_BOOT_SETTLE_MS));

        // 1 Hz data rate, normal mode, X/Y/Z enabled.
        self.write_reg(CTRL_REG1, 0b0001_0111)?;

        // BDU so high/low bytes belong to the same sample, ±2 g, high res.
        self.write_reg(CTRL_REG4, 0x88)?;

        // High-pass filter on output data and the INT1 path, so orientation
        // (DC bias) never counts as motion.
        self.write_reg(CTRL_REG2, 0x09)?;

        // Route the IA1 interrupt to the INT1 pad.
        self.write_reg(CTRL_REG3, 0x40)?;

        // Latch INT1 until INT1_SRC is read.
        self.write_reg(CTRL_REG5, CTRL_REG5_LATCH_INT1)?;

        self.set_sensitivity(settings.sensitivity)?;
        self.set_duration(settings.duration)?;

        // Reading REFERENCE re-baselines the high-pass filter against the
        // current orientation; must happen before the interrupt is armed.
        self.read_reg(REFERENCE)?;

        // Interrupt when any of X, Y or Z exceeds (rather than stays below)
        // the threshold.
        self.write_reg(INT1_CFG, 0x2a)?;

        log::info!("LIS3DH configured: ths={} dur={}", settings.sensitivity, settings.duration);
        Ok(())
    }

    /// Threshold as a multiple of 16 mg. Clamped to the 7-bit register range;
    /// the hardware would silently truncate anything wider.
    pub fn set_sensitivity(&mut self, threshold: u8) -> Result<(), SensorError<I2C::Error>> {
        self.write_reg(INT1_THS, threshold.min(MOTION_REG_MAX))
    }

    /// Sample periods the threshold must be exceeded for (5 at 1 Hz → 5 s).
    pub fn set_duration(&mut self, duration: u8) -> Result<(), SensorError<I2C::Error>> {
        self.write_reg(INT1_DURATION, duration.min(MOTION_REG_MAX))
    }

    /// Read INT1_SRC, which resets the interrupt latch as a side effect.
    /// Returns whether an interrupt had fired since the last read. Skipping
    /// this before re-arming leaves the latch stuck and the sensor mute.
    pub fn read_and_clear_latch(&mut self) -> Result<bool, SensorError<I2C::Error>> {
        let src = self.read_reg(INT1_SRC)?;
        Ok(src & INT1_SRC_ACTIVE != 0)
    }

    /// Signed 16-bit samples per axis. Diagnostics only.
    pub fn read_acceleration(&mut self) -> Result<(i16, i16, i16), SensorError<I2C::Error>> {
        let mut raw = [0u8; 6];
        self.i2c
            .write_read(I2C_ADDR_LIS3DH, &[OUT_X_L | AUTO_INCREMENT], &mut raw)
            .map_err(SensorError::Bus)?;
        Ok((
            i16::from_le_bytes([raw[0], raw[1]]),
            i16::from_le_bytes([raw[2], raw[3]]),
            i16::from_le_bytes([raw[4], raw[5]]),
        ))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(I2C_ADDR_LIS3DH, &[reg], &mut buf)
            .map_err(SensorError::Bus)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError<I2C::Error>> {
        self.i2c
            .write(I2C_ADDR_LIS3DH, &[reg, value])
            .map_err(SensorError::Bus)
    }
}

impl<I2C> crate::cycle::MotionControl for Lis3dh<I2C>
where
    I2C: I2c,
    I2C::Error: Send + Sync + 'static,
{
    fn apply_settings(&mut self, settings: &MotionSettings) -> anyhow::Result<()> {
        self.set_sensitivity(settings.sensitivity)?;
        self.set_duration(settings.duration)?;
        Ok(())
    }

    fn read_and_clear_latch(&mut self) -> anyhow::Result<bool> {
        Ok(Lis3dh::read_and_clear_latch(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
    use std::collections::HashMap;

    #[derive(Debug)]
    struct MockErr;

    impl embedded_hal::i2c::Error for MockErr {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Register-map bus: single-byte address writes select a register,
    /// two-byte writes store a value, reads return stored values (with
    /// LIS3DH-style auto-increment when bit 7 of the address is set).
    #[derive(Default)]
    struct MockBus {
        regs: HashMap<u8, u8>,
        writes: Vec<(u8, u8)>,
        reads: Vec<u8>,
        clear_on_read: Option<u8>,
    }

    impl ErrorType for MockBus {
        type Error = MockErr;
    }

    impl I2c for MockBus {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            let mut pointer: u8 = 0;
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        pointer = bytes[0];
                        for (i, value) in bytes[1..].iter().enumerate() {
                            let reg = pointer.wrapping_add(i as u8);
                            self.regs.insert(reg, *value);
                            self.writes.push((reg, *value));
                        }
                    }
                    Operation::Read(buf) => {
                        let auto = pointer & AUTO_INCREMENT != 0;
                        let base = pointer & 0x7f;
                        for (i, slot) in buf.iter_mut().enumerate() {
                            let reg = if auto { base.wrapping_add(i as u8) } else { base };
                            *slot = self.regs.get(&reg).copied().unwrap_or(0);
                            self.reads.push(reg);
                            if self.clear_on_read == Some(reg) {
                                self.regs.insert(reg, 0);
                            }
                        }
                    }
                }
            }
            Ok(())
        }
    }

    fn present_bus() -> MockBus {
        let mut bus = MockBus::default();
        bus.regs.insert(WHO_AM_I, WHO_AM_I_ID);
        bus
    }

    #[test]
    fn init_rejects_unknown_identity() {
        let mut bus = MockBus::default();
        bus.regs.insert(WHO_AM_I, 0x44);
        let mut sensor = Lis3dh::new(bus);
        match sensor.init(&MotionSettings::default()) {
            Err(SensorError::NotFound(0x44)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn init_programs_interrupt_path() {
        let mut sensor = Lis3dh::new(present_bus());
        sensor.init(&MotionSettings::default()).unwrap();

        let regs = &sensor.i2c.regs;
        assert_eq!(regs[&CTRL_REG1], 0b0001_0111);
        assert_eq!(regs[&CTRL_REG2], 0x09);
        assert_eq!(regs[&CTRL_REG3], 0x40);
        assert_eq!(regs[&CTRL_REG4], 0x88);
        // Latching must be the final CTRL_REG5 state, after the reboot pulse.
        assert_eq!(regs[&CTRL_REG5], CTRL_REG5_LATCH_INT1);
        assert_eq!(regs[&INT1_CFG], 0x2a);
        assert_eq!(regs[&INT1_THS], crate::config::DEFAULT_SENSITIVITY);
        assert_eq!(regs[&INT1_DURATION], crate::config::DEFAULT_DURATION);

        // The reference read must happen to re-baseline the HP filter, and
        // before INT1_CFG arms the interrupt.
        let reference_read = sensor.i2c.reads.iter().position(|r| *r == REFERENCE);
        assert!(reference_read.is_some());
        let cfg_write = sensor
            .i2c
            .writes
            .iter()
            .position(|(reg, _)| *reg == INT1_CFG)
            .unwrap();
        assert_eq!(sensor.i2c.writes.len() - 1, cfg_write, "INT1_CFG armed last");
    }

    #[test]
    fn tuning_writes_through_and_round_trips() {
        let mut sensor = Lis3dh::new(present_bus());
        sensor.set_sensitivity(4).unwrap();
        sensor.set_duration(5).unwrap();
        assert_eq!(sensor.i2c.regs[&INT1_THS], 4);
        assert_eq!(sensor.i2c.regs[&INT1_DURATION], 5);
    }

    #[test]
    fn tuning_clamps_to_register_width() {
        let mut sensor = Lis3dh::new(present_bus());
        sensor.set_sensitivity(200).unwrap();
        sensor.set_duration(255).unwrap();
        assert_eq!(sensor.i2c.regs[&INT1_THS], 0x7f);
        assert_eq!(sensor.i2c.regs[&INT1_DURATION], 0x7f);
    }

    #[test]
    fn applying_settings_twice_writes_identical_registers() {
        let settings = MotionSettings {
            sensitivity: 9,
            duration: 3,
        };
        let mut sensor = Lis3dh::new(present_bus());
        sensor.set_sensitivity(settings.sensitivity).unwrap();
        sensor.set_duration(settings.duration).unwrap();
        let first: Vec<_> = sensor.i2c.writes.clone();
        sensor.set_sensitivity(settings.sensitivity).unwrap();
        sensor.set_duration(settings.duration).unwrap();
        assert_eq!(&sensor.i2c.writes[first.len()..], &first[..]);
    }

    #[test]
    fn latch_read_reports_and_clears() {
        let mut bus = present_bus();
        bus.regs.insert(INT1_SRC, INT1_SRC_ACTIVE | 0x2a);
        bus.clear_on_read = Some(INT1_SRC);
        let mut sensor = Lis3dh::new(bus);

        assert!(sensor.read_and_clear_latch().unwrap());
        assert!(!sensor.read_and_clear_latch().unwrap());
    }

    #[test]
    fn acceleration_is_little_endian_signed() {
        let mut bus = present_bus();
        bus.regs.insert(OUT_X_L, 0x10);
        bus.regs.insert(OUT_X_L + 1, 0x00);
        bus.regs.insert(OUT_X_L + 2, 0xff);
        bus.regs.insert(OUT_X_L + 3, 0xff);
        bus.regs.insert(OUT_X_L + 4, 0x00);
        bus.regs.insert(OUT_X_L + 5, 0x80);
        let mut sensor = Lis3dh::new(bus);

        assert_eq!(sensor.read_acceleration().unwrap(), (0x10, -1, i16::MIN));
    }
}
