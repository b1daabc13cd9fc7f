// washwatch — Battery Gauge
//
// LiPo voltage via ADC1 on the BeeS3's divider tap (GPIO10, channel 9).
// One-shot reads through raw ESP-IDF calls; 11 dB attenuation for the
// 0–3.3 V range, 12-bit width, 16 samples averaged per reading.

use crate::config::*;
#[cfg(target_os = "espidf")]
use crate::cycle::BatteryGauge;

#[derive(Debug, Clone, Copy)]
pub struct BatteryReading {
    /// Averaged raw ADC counts.
    pub raw: f32,
    pub voltage: f32,
    pub percent: f32,
}

/// Divider math plus the measured fixed offset of the BeeS3 tap.
pub fn voltage_from_adc(raw: f32) -> f32 {
    (raw / 4096.0) * 3.3 * BATTERY_DIVIDER_RATIO + BATTERY_OFFSET_VOLTS
}

/// Linear map of the usable LiPo range onto 0–100 %.
pub fn percent_from_voltage(voltage: f32) -> f32 {
    ((voltage - BATTERY_EMPTY_VOLTS) / (BATTERY_FULL_VOLTS - BATTERY_EMPTY_VOLTS) * 100.0)
        .clamp(0.0, 100.0)
}

#[cfg(target_os = "espidf")]
pub struct AdcBattery {
    handle: esp_idf_sys::adc_oneshot_unit_handle_t,
    channel: esp_idf_sys::adc_channel_t,
}

// The raw handle is only ever used from the thread that owns the gauge.
#[cfg(target_os = "espidf")]
unsafe impl Send for AdcBattery {}

#[cfg(target_os = "espidf")]
impl AdcBattery {
    pub fn new() -> anyhow::Result<Self> {
        let mut handle: esp_idf_sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
        unsafe {
            let unit_cfg = esp_idf_sys::adc_oneshot_unit_init_cfg_t {
                unit_id: esp_idf_sys::adc_unit_t_ADC_UNIT_1,
                ulp_mode: esp_idf_sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                ..core::mem::zeroed()
            };
            esp_idf_sys::esp!(esp_idf_sys::adc_oneshot_new_unit(&unit_cfg, &mut handle))?;

            let chan_cfg = esp_idf_sys::adc_oneshot_chan_cfg_t {
                atten: esp_idf_sys::adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: esp_idf_sys::adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            esp_idf_sys::esp!(esp_idf_sys::adc_oneshot_config_channel(
                handle,
                ADC_BATTERY_CHANNEL,
                &chan_cfg
            ))?;
        }
        Ok(Self {
            handle,
            channel: ADC_BATTERY_CHANNEL,
        })
    }

    fn sample(&mut self) -> anyhow::Result<i32> {
        let mut raw: i32 = 0;
        unsafe {
            esp_idf_sys::esp!(esp_idf_sys::adc_oneshot_read(
                self.handle,
                self.channel,
                &mut raw
            ))?;
        }
        Ok(raw)
    }
}

#[cfg(target_os = "espidf")]
impl BatteryGauge for AdcBattery {
    fn read(&mut self) -> anyhow::Result<BatteryReading> {
        let mut sum: i64 = 0;
        for _ in 0..BATTERY_ADC_SAMPLES {
            sum += self.sample()? as i64;
        }
        let raw = sum as f32 / BATTERY_ADC_SAMPLES as f32;
        let voltage = voltage_from_adc(raw);
        let percent = percent_from_voltage(voltage);
        log::debug!("battery: raw {raw:.0}, {voltage:.2} V, {percent:.1} %");
        Ok(BatteryReading {
            raw,
            voltage,
            percent,
        })
    }
}

#[cfg(target_os = "espidf")]
impl Drop for AdcBattery {
    fn drop(&mut self) {
        unsafe {
            esp_idf_sys::adc_oneshot_del_unit(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_includes_divider_and_offset() {
        // Mid-scale counts on a 2:1 divider.
        let v = voltage_from_adc(2048.0);
        assert!((v - (3.3 + BATTERY_OFFSET_VOLTS)).abs() < 0.01);
    }

    #[test]
    fn percent_is_clamped_to_the_lipo_range() {
        assert_eq!(percent_from_voltage(4.5), 100.0);
        assert_eq!(percent_from_voltage(2.9), 0.0);
    }

    #[test]
    fn percent_is_linear_between_empty_and_full() {
        let mid = (BATTERY_EMPTY_VOLTS + BATTERY_FULL_VOLTS) / 2.0;
        assert!((percent_from_voltage(mid) - 50.0).abs() < 0.1);
    }
}
