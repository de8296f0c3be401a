use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORK_DURATION_SECONDS: u32 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to count: stopped, paused, or already at zero.
    Idle,
    Counting { remaining_seconds: u32 },
    /// The countdown hit zero; the session must be reported exactly once.
    Expired { session_id: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PomodoroSnapshot {
    pub session_id: Option<String>,
    pub run_state: RunState,
    pub remaining_seconds: u32,
    pub work_duration_seconds: u32,
    pub started_at: Option<String>,
}

impl PomodoroSnapshot {
    pub fn format_remaining(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

/// Countdown bound to a single server-issued session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomodoroTimer {
    work_duration_seconds: u32,
    remaining_seconds: u32,
    run_state: RunState,
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl Default for PomodoroTimer {
    fn default() -> Self {
        Self {
            work_duration_seconds: DEFAULT_WORK_DURATION_SECONDS,
            remaining_seconds: DEFAULT_WORK_DURATION_SECONDS,
            run_state: RunState::Stopped,
            session_id: None,
            started_at: None,
        }
    }
}

impl PomodoroTimer {
    pub fn new(work_duration_seconds: u32) -> Result<Self, String> {
        validate_duration(work_duration_seconds)?;
        Ok(Self {
            work_duration_seconds,
            remaining_seconds: work_duration_seconds,
            ..Self::default()
        })
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn work_duration_seconds(&self) -> u32 {
        self.work_duration_seconds
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_stopped(&self) -> bool {
        self.run_state == RunState::Stopped
    }

    pub fn begin(&mut self, session_id: &str, now: DateTime<Utc>) -> Result<(), String> {
        if !self.is_stopped() {
            return Err("timer must be stopped before start".to_string());
        }
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err("session id must not be empty".to_string());
        }

        self.session_id = Some(session_id.to_string());
        self.run_state = RunState::Running;
        self.remaining_seconds = self.work_duration_seconds;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn pause(&mut self) -> bool {
        if self.run_state != RunState::Running {
            return false;
        }
        self.run_state = RunState::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.run_state != RunState::Paused {
            return false;
        }
        self.run_state = RunState::Running;
        true
    }

    /// Abandons the session without reporting it. Returns the discarded id.
    pub fn stop(&mut self) -> Option<String> {
        self.run_state = RunState::Stopped;
        self.remaining_seconds = self.work_duration_seconds;
        self.started_at = None;
        self.session_id.take()
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.run_state != RunState::Running || self.remaining_seconds == 0 {
            return TickOutcome::Idle;
        }

        self.remaining_seconds -= 1;
        if self.remaining_seconds > 0 {
            return TickOutcome::Counting {
                remaining_seconds: self.remaining_seconds,
            };
        }

        self.run_state = RunState::Stopped;
        self.started_at = None;
        match self.session_id.take() {
            Some(session_id) => TickOutcome::Expired { session_id },
            None => TickOutcome::Idle,
        }
    }

    pub fn set_work_duration(&mut self, seconds: u32) -> Result<(), String> {
        validate_duration(seconds)?;
        if !self.is_stopped() {
            return Err("work duration can only change while the timer is stopped".to_string());
        }
        self.work_duration_seconds = seconds;
        self.remaining_seconds = seconds;
        Ok(())
    }

    /// Restores the display after a completed countdown. A new session that
    /// began in the meantime is left alone.
    pub fn reset_after_completion(&mut self) -> bool {
        if !self.is_stopped() || self.session_id.is_some() {
            return false;
        }
        self.remaining_seconds = self.work_duration_seconds;
        true
    }

    pub fn format_remaining(&self) -> String {
        format_clock(self.remaining_seconds)
    }

    pub fn snapshot(&self) -> PomodoroSnapshot {
        PomodoroSnapshot {
            session_id: self.session_id.clone(),
            run_state: self.run_state,
            remaining_seconds: self.remaining_seconds,
            work_duration_seconds: self.work_duration_seconds,
            started_at: self.started_at.map(|value| value.to_rfc3339()),
        }
    }
}

/// `MM:SS`; minutes are not wrapped into hours.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn validate_duration(seconds: u32) -> Result<(), String> {
    if seconds == 0 {
        return Err("work duration must be > 0 seconds".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn running_timer(duration: u32) -> PomodoroTimer {
        let mut timer = PomodoroTimer::new(duration).expect("valid duration");
        timer.begin("17", Utc::now()).expect("begin");
        timer
    }

    #[test]
    fn new_rejects_zero_duration() {
        assert!(PomodoroTimer::new(0).is_err());
    }

    #[test]
    fn begin_requires_stopped_timer() {
        let mut timer = running_timer(30);
        assert!(timer.begin("18", Utc::now()).is_err());
        assert_eq!(timer.session_id(), Some("17"));
    }

    #[test]
    fn paused_timer_does_not_count_down() {
        let mut timer = running_timer(30);
        timer.tick();
        assert!(timer.pause());
        assert_eq!(timer.tick(), TickOutcome::Idle);
        assert_eq!(timer.remaining_seconds(), 29);
        assert!(timer.resume());
        assert_eq!(
            timer.tick(),
            TickOutcome::Counting {
                remaining_seconds: 28
            }
        );
    }

    #[test]
    fn pause_and_resume_are_noops_in_wrong_state() {
        let mut timer = PomodoroTimer::default();
        assert!(!timer.pause());
        assert!(!timer.resume());
        let mut timer = running_timer(10);
        assert!(!timer.resume());
    }

    #[test]
    fn stop_discards_session_and_resets() {
        let mut timer = running_timer(30);
        for _ in 0..5 {
            timer.tick();
        }
        assert_eq!(timer.stop(), Some("17".to_string()));
        assert_eq!(timer.run_state(), RunState::Stopped);
        assert_eq!(timer.remaining_seconds(), 30);
        assert_eq!(timer.session_id(), None);
    }

    #[test]
    fn set_work_duration_only_while_stopped() {
        let mut timer = PomodoroTimer::default();
        timer.set_work_duration(90).expect("set duration");
        assert_eq!(timer.remaining_seconds(), 90);
        assert!(timer.set_work_duration(0).is_err());

        let mut timer = running_timer(30);
        assert!(timer.set_work_duration(60).is_err());
        assert_eq!(timer.work_duration_seconds(), 30);
    }

    #[test]
    fn reset_after_completion_restores_duration() {
        let mut timer = running_timer(2);
        timer.tick();
        assert!(matches!(timer.tick(), TickOutcome::Expired { .. }));
        assert_eq!(timer.remaining_seconds(), 0);
        assert!(timer.reset_after_completion());
        assert_eq!(timer.remaining_seconds(), 2);
    }

    #[test]
    fn reset_after_completion_leaves_new_session_alone() {
        let mut timer = running_timer(2);
        timer.tick();
        timer.tick();
        timer.begin("18", Utc::now()).expect("restart");
        timer.tick();
        assert!(!timer.reset_after_completion());
        assert_eq!(timer.remaining_seconds(), 1);
    }

    #[test]
    fn format_remaining_pads_minutes_and_seconds() {
        let timer = PomodoroTimer::new(25 * 60 + 7).expect("valid duration");
        assert_eq!(timer.format_remaining(), "25:07");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(125 * 60), "125:00");
    }

    #[test]
    fn thirty_ticks_expire_exactly_once() {
        let mut timer = running_timer(30);
        let expired = (0..40)
            .map(|_| timer.tick())
            .filter(|outcome| matches!(outcome, TickOutcome::Expired { .. }))
            .count();
        assert_eq!(expired, 1);
        assert_eq!(timer.remaining_seconds(), 0);
    }

    proptest! {
        #[test]
        fn countdown_expires_once_after_duration_ticks(duration in 1u32..600u32) {
            let mut timer = running_timer(duration);
            let mut expirations = Vec::new();
            for tick in 1..=duration {
                if let TickOutcome::Expired { session_id } = timer.tick() {
                    expirations.push((tick, session_id));
                }
            }
            prop_assert_eq!(expirations, vec![(duration, "17".to_string())]);
            prop_assert_eq!(timer.remaining_seconds(), 0);
            prop_assert_eq!(timer.tick(), TickOutcome::Idle);
        }

        #[test]
        fn pause_resume_preserves_remaining(duration in 2u32..600u32, elapsed in 0u32..600u32) {
            let mut timer = running_timer(duration);
            for _ in 0..elapsed.min(duration - 1) {
                timer.tick();
            }
            let before = timer.remaining_seconds();
            timer.pause();
            timer.tick();
            timer.resume();
            prop_assert_eq!(timer.remaining_seconds(), before);
        }

        #[test]
        fn stop_never_expires(duration in 1u32..600u32, elapsed in 0u32..600u32) {
            let mut timer = running_timer(duration);
            for _ in 0..elapsed.min(duration.saturating_sub(1)) {
                timer.tick();
            }
            timer.stop();
            for _ in 0..duration {
                prop_assert_eq!(timer.tick(), TickOutcome::Idle);
            }
            prop_assert_eq!(timer.remaining_seconds(), duration);
        }
    }
}
