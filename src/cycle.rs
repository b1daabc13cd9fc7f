// washwatch — Wake Cycle State Machine
//
// There is no scheduler and no persistent process: each boot runs exactly one
// pass of this state machine and ends in deep sleep. The machine is encoded
// in what gets armed before sleeping plus the CycleState persisted in NVS;
// "resuming" means re-running the boot path with a fresh wake cause.
//
// The one rule that outranks everything else: every branch must reach the
// final re-arm-and-sleep step. A lost notification costs a message; a lost
// wake source costs the device.

use std::time::Duration;

use crate::config::{POST_MOTION_DELAY_SECS, SHORT_POLL_SLEEP_SECS, STABLE_QUIET_WAKES};
use crate::drivers::battery::BatteryReading;
use crate::settings::{parse_set_command, CycleState, MotionSettings, Phase, SettingsStore};

/// Why the device left deep sleep. Read from the wake-reason register exactly
/// once per boot, before any logic branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    ColdBoot,
    TimerExpired,
    MotionInterrupt,
}

/// The re-wake delay chosen for the next sleep. `Indefinite` leaves only the
/// motion interrupt armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepDuration {
    /// Settings-sync retry while the bot API is unreachable.
    ShortPoll,
    /// Wait out the rest of the wash cycle after motion was seen.
    PostMotionDelay,
    Indefinite,
}

impl SleepDuration {
    pub fn timer(self) -> Option<Duration> {
        match self {
            SleepDuration::ShortPoll => Some(Duration::from_secs(SHORT_POLL_SLEEP_SECS)),
            SleepDuration::PostMotionDelay => Some(Duration::from_secs(POST_MOTION_DELAY_SECS)),
            SleepDuration::Indefinite => None,
        }
    }
}

/// Result of one command poll: the most recent inbound message (only that one
/// is ever matched against the command grammar) and the cursor to persist.
#[derive(Debug, Default)]
pub struct InboundCommands {
    pub latest: Option<String>,
    pub next_cursor: Option<i64>,
}

/// The accelerometer as the cycle sees it: retunable, and holding a latched
/// interrupt that must be explicitly read to clear.
pub trait MotionControl {
    fn apply_settings(&mut self, settings: &MotionSettings) -> anyhow::Result<()>;
    /// Clears the latch; returns whether an interrupt had fired since the
    /// last read.
    fn read_and_clear_latch(&mut self) -> anyhow::Result<bool>;
}

/// Wake-source arming. The motion (EXT0) source is re-armed on every sleep
/// since deep-sleep configuration does not survive the reset; a timer is
/// armed in addition whenever a delayed re-check is scheduled.
pub trait SleepControl {
    fn arm_timer_wake(&mut self, delay: Duration) -> anyhow::Result<()>;
    fn arm_motion_wake(&mut self) -> anyhow::Result<()>;
}

/// The chat bot, reduced to the two calls the cycle needs.
pub trait StatusChannel {
    fn send_message(&mut self, text: &str) -> anyhow::Result<()>;
    fn poll_commands(&mut self, since: Option<i64>) -> anyhow::Result<InboundCommands>;
}

pub trait BatteryGauge {
    fn read(&mut self) -> anyhow::Result<BatteryReading>;
}

pub struct WakeCycleController<M, P, C, S, B> {
    pub sensor: M,
    pub power: P,
    pub channel: C,
    pub store: S,
    pub battery: B,
}

impl<M, P, C, S, B> WakeCycleController<M, P, C, S, B>
where
    M: MotionControl,
    P: SleepControl,
    C: StatusChannel,
    S: SettingsStore,
    B: BatteryGauge,
{
    pub fn new(sensor: M, power: P, channel: C, store: S, battery: B) -> Self {
        Self {
            sensor,
            power,
            channel,
            store,
            battery,
        }
    }

    /// Run one boot-to-sleep pass. Arms the wake sources for the next cycle
    /// and returns the chosen sleep plan; the caller enters deep sleep.
    pub fn run(&mut self, cause: WakeCause) -> SleepDuration {
        log::info!("woke: {cause:?}");

        let mut cycle = self.store.load_cycle().unwrap_or_else(|e| {
            log::warn!("cycle state unreadable, starting fresh: {e:#}");
            CycleState::default()
        });

        let plan = match cause {
            WakeCause::ColdBoot => self.on_cold_boot(&mut cycle),
            WakeCause::MotionInterrupt => self.on_motion(&mut cycle),
            WakeCause::TimerExpired => self.on_timer(&mut cycle),
        };

        if let Err(e) = self.store.save_cycle(&cycle) {
            log::warn!("could not persist cycle state: {e:#}");
        }

        // A configuration change applied mid-cycle takes effect for the
        // sensor's next active period.
        self.reload_settings();

        if let Err(e) = self.power.arm_motion_wake() {
            log::error!("failed to arm motion wake: {e:#}");
        }
        if let Some(delay) = plan.timer() {
            if let Err(e) = self.power.arm_timer_wake(delay) {
                log::error!("failed to arm timer wake: {e:#}");
            }
        }

        log::info!("sleeping ({plan:?}), cycle now {cycle:?}");
        plan
    }

    fn on_cold_boot(&mut self, cycle: &mut CycleState) -> SleepDuration {
        *cycle = CycleState::default();
        match self.sync_settings() {
            Ok(()) => SleepDuration::Indefinite,
            Err(e) => {
                log::warn!("settings sync unavailable, will retry on a short poll: {e:#}");
                cycle.phase = Phase::SyncRetry;
                SleepDuration::ShortPoll
            }
        }
    }

    fn on_motion(&mut self, cycle: &mut CycleState) -> SleepDuration {
        // The latch must be cleared before re-arming or the sensor never
        // reports another event.
        match self.clear_latch_with_retry() {
            Ok(active) => log::debug!("latch cleared, was active: {active}"),
            Err(e) => log::error!("latch read failed twice, motion events may be lost: {e:#}"),
        }

        *cycle = CycleState {
            phase: Phase::PostMotion,
            notified: false,
            quiet_wakes: 0,
        };
        SleepDuration::PostMotionDelay
    }

    fn on_timer(&mut self, cycle: &mut CycleState) -> SleepDuration {
        match cycle.phase {
            Phase::Idle => {
                // Nothing should have armed a timer in this phase.
                log::warn!("stray timer wake with no scheduled work");
                SleepDuration::Indefinite
            }
            Phase::SyncRetry => match self.sync_settings() {
                Ok(()) => {
                    cycle.phase = Phase::Idle;
                    SleepDuration::Indefinite
                }
                Err(e) => {
                    log::warn!("settings sync still unavailable: {e:#}");
                    SleepDuration::ShortPoll
                }
            },
            Phase::PostMotion => self.on_post_motion_timer(cycle),
        }
    }

    fn on_post_motion_timer(&mut self, cycle: &mut CycleState) -> SleepDuration {
        let moved = match self.clear_latch_with_retry() {
            Ok(moved) => moved,
            Err(e) => {
                // Treat the window as quiet: looping on a broken sensor
                // would drain the battery without ever concluding.
                log::error!("latch read failed twice, assuming quiet window: {e:#}");
                false
            }
        };

        if moved {
            log::info!("machine still vibrating, waiting another delay");
            cycle.quiet_wakes = 0;
            return SleepDuration::PostMotionDelay;
        }

        cycle.quiet_wakes = cycle.quiet_wakes.saturating_add(1);
        if cycle.quiet_wakes < STABLE_QUIET_WAKES {
            log::info!(
                "quiet window {}/{STABLE_QUIET_WAKES}",
                cycle.quiet_wakes
            );
            return SleepDuration::PostMotionDelay;
        }

        if !cycle.notified {
            if let Err(e) = self.sync_settings() {
                log::warn!("command poll failed, notifying anyway: {e:#}");
            }
            self.send_done_notification();
            cycle.notified = true;
        } else {
            log::info!("done-notification already sent for this wash cycle");
        }
        cycle.phase = Phase::Idle;
        SleepDuration::Indefinite
    }

    /// Poll the channel for `/set` commands, persist the cursor, and persist
    /// any settings update. Network failure propagates; persistence failures
    /// are logged and swallowed.
    fn sync_settings(&mut self) -> anyhow::Result<()> {
        let cursor = self.store.load_update_cursor().unwrap_or(None);
        let commands = self.channel.poll_commands(cursor)?;

        if let Some(next) = commands.next_cursor {
            if let Err(e) = self.store.save_update_cursor(next) {
                log::warn!("could not persist update cursor: {e:#}");
            }
        }

        if let Some(text) = commands.latest.as_deref() {
            if let Some(settings) = parse_set_command(text) {
                log::info!("remote settings update: {settings:?}");
                if let Err(e) = self.store.save_settings(&settings) {
                    log::warn!("could not persist settings: {e:#}");
                }
            }
        }
        Ok(())
    }

    fn send_done_notification(&mut self) {
        let text = match self.battery.read() {
            Ok(b) => format!(
                "Washing done! Battery {:.2}% ({:.2}V)",
                b.percent, b.voltage
            ),
            Err(e) => {
                log::warn!("battery read failed, sending without level: {e:#}");
                "Washing done!".to_string()
            }
        };
        match self.channel.send_message(&text) {
            Ok(()) => log::info!("notification sent"),
            Err(e) => log::warn!("notification dropped: {e:#}"),
        }
    }

    fn reload_settings(&mut self) {
        let settings = match self.store.load_settings() {
            Ok(Some(s)) => s,
            // Nothing stored yet — the sensor keeps its boot defaults.
            Ok(None) => return,
            Err(e) => {
                log::warn!("settings load failed, keeping current tuning: {e:#}");
                return;
            }
        };
        if let Err(e) = self.sensor.apply_settings(&settings) {
            log::warn!("could not retune sensor: {e:#}");
        }
    }

    fn clear_latch_with_retry(&mut self) -> anyhow::Result<bool> {
        match self.sensor.read_and_clear_latch() {
            Ok(v) => Ok(v),
            Err(first) => {
                log::warn!("latch read failed, retrying once: {first:#}");
                self.sensor.read_and_clear_latch()
            }
        }
    }
}
