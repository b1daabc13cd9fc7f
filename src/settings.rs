// washwatch — Persisted Settings & Cycle State
//
// Deep sleep wipes RAM, so everything the next boot needs lives in NVS:
// the motion interrupt tuning, the wash-cycle bookkeeping, and the chat
// update cursor. Records are stored as small JSON documents; anything that
// fails to read or parse is treated as absent, never as an error.

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use serde::{Deserialize, Serialize};

use crate::config::*;

/// Accelerometer interrupt tuning. `sensitivity` is the threshold in 16 mg
/// steps, `duration` the number of 1 Hz sample periods the threshold must be
/// exceeded for. Both land in 7-bit LIS3DH registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionSettings {
    pub sensitivity: u8,
    pub duration: u8,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            duration: DEFAULT_DURATION,
        }
    }
}

/// Where the wash-cycle state machine left off before the last deep sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Nothing scheduled; waiting on the motion interrupt alone.
    #[default]
    Idle,
    /// Cold boot could not reach the bot API; a short-poll timer is armed.
    SyncRetry,
    /// Motion was seen; a post-motion delay timer is armed.
    PostMotion,
}

/// Persisted across sleeps so a timer wake is always traceable to whatever
/// armed it, and so "washing done" is sent at most once per wash cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CycleState {
    pub phase: Phase,
    /// Set once the done-notification for the current cycle went out.
    /// Cleared only by the next motion interrupt.
    pub notified: bool,
    /// Consecutive post-motion timer wakes with no intervening motion.
    pub quiet_wakes: u8,
}

/// Parse the one recognised remote command: `/set <sensitivity> <duration>`.
/// Case-sensitive, both values must be integers in 0..=255; anything else is
/// silently ignored.
pub fn parse_set_command(text: &str) -> Option<MotionSettings> {
    let mut parts = text.split_whitespace();
    if parts.next()? != "/set" {
        return None;
    }
    let sensitivity = parts.next()?.parse::<u8>().ok()?;
    let duration = parts.next()?.parse::<u8>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(MotionSettings {
        sensitivity,
        duration,
    })
}

/// Key-value persistence for everything that must survive deep sleep.
pub trait SettingsStore {
    /// `Ok(None)` means nothing stored yet (or a torn/unparseable record).
    fn load_settings(&mut self) -> anyhow::Result<Option<MotionSettings>>;
    fn save_settings(&mut self, settings: &MotionSettings) -> anyhow::Result<()>;

    fn load_cycle(&mut self) -> anyhow::Result<CycleState>;
    fn save_cycle(&mut self, cycle: &CycleState) -> anyhow::Result<()>;

    /// Chat update cursor — the id to resume polling from.
    fn load_update_cursor(&mut self) -> anyhow::Result<Option<i64>>;
    fn save_update_cursor(&mut self, id: i64) -> anyhow::Result<()>;
}

/// NVS-backed store under the `washwatch` namespace.
#[cfg(target_os = "espidf")]
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

#[cfg(target_os = "espidf")]
impl NvsStore {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&mut self, key: &str) -> Option<T> {
        let mut buf = [0u8; NVS_BUF_SIZE];
        match self.nvs.get_raw(key, &mut buf) {
            Ok(Some(bytes)) => match serde_json::from_slice(bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("nvs key {key} holds unparseable data, ignoring: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("nvs read of {key} failed: {e}");
                None
            }
        }
    }

    fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.nvs.set_raw(key, &bytes)?;
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
impl SettingsStore for NvsStore {
    fn load_settings(&mut self) -> anyhow::Result<Option<MotionSettings>> {
        Ok(self.get_json(NVS_KEY_MOTION))
    }

    fn save_settings(&mut self, settings: &MotionSettings) -> anyhow::Result<()> {
        self.set_json(NVS_KEY_MOTION, settings)
    }

    fn load_cycle(&mut self) -> anyhow::Result<CycleState> {
        Ok(self.get_json(NVS_KEY_CYCLE).unwrap_or_default())
    }

    fn save_cycle(&mut self, cycle: &CycleState) -> anyhow::Result<()> {
        self.set_json(NVS_KEY_CYCLE, cycle)
    }

    fn load_update_cursor(&mut self) -> anyhow::Result<Option<i64>> {
        Ok(self.get_json(NVS_KEY_UPDATE_ID))
    }

    fn save_update_cursor(&mut self, id: i64) -> anyhow::Result<()> {
        self.set_json(NVS_KEY_UPDATE_ID, &id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_command_parses() {
        assert_eq!(
            parse_set_command("/set 10 20"),
            Some(MotionSettings {
                sensitivity: 10,
                duration: 20
            })
        );
    }

    #[test]
    fn set_command_rejects_noise() {
        assert_eq!(parse_set_command("/set"), None);
        assert_eq!(parse_set_command("/set 10"), None);
        assert_eq!(parse_set_command("/set 10 20 30"), None);
        assert_eq!(parse_set_command("/set ten 20"), None);
        assert_eq!(parse_set_command("/set 300 20"), None);
        assert_eq!(parse_set_command("/SET 10 20"), None);
        assert_eq!(parse_set_command("hello"), None);
    }

    #[test]
    fn cycle_state_defaults_to_idle() {
        let cycle = CycleState::default();
        assert_eq!(cycle.phase, Phase::Idle);
        assert!(!cycle.notified);
        assert_eq!(cycle.quiet_wakes, 0);
    }

    #[test]
    fn cycle_state_roundtrips_as_json() {
        let cycle = CycleState {
            phase: Phase::PostMotion,
            notified: true,
            quiet_wakes: 3,
        };
        let bytes = serde_json::to_vec(&cycle).unwrap();
        let back: CycleState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(cycle, back);
    }
}
