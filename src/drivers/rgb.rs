// washwatch — On-board WS2812 Status LED
//
// The BeeS3 carries a single WS2812 behind an LDO enable pin. Bit timing is
// generated on an RMT channel: a 24-bit GRB frame where a one is 700 ns high
// / 600 ns low and a zero is 350 ns high / 800 ns low.

#[cfg(target_os = "espidf")]
use std::thread;
#[cfg(target_os = "espidf")]
use std::time::Duration;

#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
#[cfg(target_os = "espidf")]
use esp_idf_hal::peripheral::Peripheral;
#[cfg(target_os = "espidf")]
use esp_idf_hal::rmt::config::TransmitConfig;
#[cfg(target_os = "espidf")]
use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, RmtChannel, TxRmtDriver};

/// Rainbow position to RGB. Three 85-step fades between the primaries; the
/// channel sum is constant so perceived brightness stays level.
pub fn color_wheel(pos: u8) -> (u8, u8, u8) {
    let pos = pos % 255;
    if pos < 85 {
        (255 - pos * 3, 0, pos * 3)
    } else if pos < 170 {
        let pos = pos - 85;
        (0, pos * 3, 255 - pos * 3)
    } else {
        let pos = pos - 170;
        (pos * 3, 255 - pos * 3, 0)
    }
}

#[cfg(target_os = "espidf")]
pub struct RgbLed<'d> {
    tx: TxRmtDriver<'d>,
    power: PinDriver<'d, AnyOutputPin, Output>,
}

#[cfg(target_os = "espidf")]
impl<'d> RgbLed<'d> {
    /// Takes the RMT channel, the WS2812 data pin, and the LDO enable pin.
    /// The LED is powered up immediately.
    pub fn new(
        channel: impl Peripheral<P = impl RmtChannel> + 'd,
        data: impl Peripheral<P = impl esp_idf_hal::gpio::OutputPin> + 'd,
        power: AnyOutputPin,
    ) -> anyhow::Result<Self> {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, data, &config)?;
        let mut power = PinDriver::output(power)?;
        power.set_high()?;
        Ok(Self { tx, power })
    }

    pub fn set_color(&mut self, r: u8, g: u8, b: u8) -> anyhow::Result<()> {
        let frame: u32 = ((g as u32) << 16) | ((r as u32) << 8) | b as u32;
        let ticks_hz = self.tx.counter_clock()?;
        let t0h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(350))?;
        let t0l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(800))?;
        let t1h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(700))?;
        let t1l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(600))?;

        let mut signal = FixedLengthSignal::<24>::new();
        for i in 0..24usize {
            let bit = (frame >> (23 - i)) & 1 != 0;
            let (high, low) = if bit { (t1h, t1l) } else { (t0h, t0l) };
            signal.set(i, &(high, low))?;
        }
        self.tx.start_blocking(&signal)?;
        Ok(())
    }

    /// Short blue flashes announcing a wake: one for a timer or cold boot,
    /// two for motion. Blocking, over in under a second.
    pub fn blink(&mut self, times: u32) -> anyhow::Result<()> {
        for _ in 0..times {
            self.set_color(0, 0, 255)?;
            thread::sleep(Duration::from_millis(50));
            self.set_color(0, 0, 0)?;
            thread::sleep(Duration::from_millis(300));
        }
        Ok(())
    }

    /// Blank the pixel and cut its LDO. Every µA counts once asleep.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        self.set_color(0, 0, 0)?;
        self.power.set_low()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_hits_a_primary_at_each_segment_start() {
        assert_eq!(color_wheel(0), (255, 0, 0));
        assert_eq!(color_wheel(85), (0, 0, 255));
        assert_eq!(color_wheel(170), (0, 255, 0));
    }

    #[test]
    fn wheel_wraps_at_the_end_of_the_cycle() {
        assert_eq!(color_wheel(255), color_wheel(0));
    }

    #[test]
    fn wheel_keeps_brightness_constant() {
        for pos in 0..255u8 {
            let (r, g, b) = color_wheel(pos);
            assert_eq!(r as u32 + g as u32 + b as u32, 255, "pos {pos}");
        }
    }
}
