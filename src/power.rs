// washwatch — Deep Sleep & Wake Cause
//
// Thin layer over the ESP-IDF sleep API. Wake-source configuration does not
// survive the deep-sleep reset, so both sources are (re)armed from scratch
// before every sleep: EXT0 on the LIS3DH INT1 line always, a timer only when
// the cycle scheduled a re-check.

use std::time::Duration;

use esp_idf_sys::esp;

use crate::config::PIN_MOTION_INT;
use crate::cycle::{SleepControl, SleepDuration, WakeCause};

/// Map the ESP-IDF wakeup cause to the cycle's view of it. Anything that is
/// neither the EXT0 interrupt nor the timer (power-on, brown-out, panic
/// reset) counts as a cold boot.
pub fn read_wake_cause() -> WakeCause {
    let cause = unsafe { esp_idf_sys::esp_sleep_get_wakeup_cause() };
    match cause {
        esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0 => WakeCause::MotionInterrupt,
        esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeCause::TimerExpired,
        _ => WakeCause::ColdBoot,
    }
}

pub struct DeepSleep;

impl SleepControl for DeepSleep {
    fn arm_timer_wake(&mut self, delay: Duration) -> anyhow::Result<()> {
        esp!(unsafe { esp_idf_sys::esp_sleep_enable_timer_wakeup(delay.as_micros() as u64) })?;
        Ok(())
    }

    fn arm_motion_wake(&mut self) -> anyhow::Result<()> {
        // INT1 idles low and goes high while latched, so wake on level 1.
        esp!(unsafe { esp_idf_sys::esp_sleep_enable_ext0_wakeup(PIN_MOTION_INT, 1) })?;
        Ok(())
    }
}

impl DeepSleep {
    /// Enter deep sleep with whatever wake sources were armed.
    /// Does not return.
    pub fn enter(self, plan: SleepDuration) -> ! {
        match plan.timer() {
            Some(delay) => log::info!("deep sleep for {}s or until motion", delay.as_secs()),
            None => log::info!("deep sleep until motion"),
        }
        unsafe {
            esp_idf_sys::esp_deep_sleep_start();
        }
    }
}
