//! # timer
//!
//! why: election and heartbeat timeouts come from outside the member
//! relations: RaftMember arms and cancels timers through TimerService; the embedder reports expiries back
//! what: TimerService trait, TimerTable (deterministic logical-clock timers)

use raft_core::TimerKind;
use std::time::Duration;

/// Arms and cancels the member's two timers
///
/// When a timer expires the embedder calls `RaftMember::handle_timeout`.
pub trait TimerService {
    /// (re)arm `timer`, replacing a pending one of the same kind
    fn schedule(&mut self, timer: TimerKind, after: Duration);
    fn cancel(&mut self, timer: TimerKind);
}

/// Timers driven by an explicit clock, for simulations and single-threaded embedders
#[derive(Debug, Clone, Default)]
pub struct TimerTable {
    now: Duration,
    election: Option<Duration>,
    heartbeat: Option<Duration>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    fn deadline(&self, timer: TimerKind) -> Option<Duration> {
        match timer {
            TimerKind::Election => self.election,
            TimerKind::Heartbeat => self.heartbeat,
        }
    }

    fn deadline_mut(&mut self, timer: TimerKind) -> &mut Option<Duration> {
        match timer {
            TimerKind::Election => &mut self.election,
            TimerKind::Heartbeat => &mut self.heartbeat,
        }
    }

    /// Time left until `timer` fires, if it is armed
    pub fn remaining(&self, timer: TimerKind) -> Option<Duration> {
        self.deadline(timer)
            .map(|deadline| deadline.saturating_sub(self.now))
    }

    pub fn is_armed(&self, timer: TimerKind) -> bool {
        self.deadline(timer).is_some()
    }

    /// Move the clock forward; returns the timers that expired, earliest first, disarming them
    pub fn advance(&mut self, by: Duration) -> Vec<TimerKind> {
        self.now += by;
        let mut expired: Vec<(Duration, TimerKind)> = [TimerKind::Heartbeat, TimerKind::Election]
            .into_iter()
            .filter_map(|timer| self.deadline(timer).map(|deadline| (deadline, timer)))
            .filter(|(deadline, _)| *deadline <= self.now)
            .collect();
        expired.sort_by_key(|(deadline, _)| *deadline);
        for (_, timer) in &expired {
            *self.deadline_mut(*timer) = None;
        }
        expired.into_iter().map(|(_, timer)| timer).collect()
    }

    /// Jump straight to the expiry of `timer`; returns false if it is not armed
    pub fn fire(&mut self, timer: TimerKind) -> bool {
        match self.deadline_mut(timer).take() {
            Some(deadline) => {
                self.now = self.now.max(deadline);
                true
            }
            None => false,
        }
    }
}

impl TimerService for TimerTable {
    fn schedule(&mut self, timer: TimerKind, after: Duration) {
        let deadline = self.now + after;
        *self.deadline_mut(timer) = Some(deadline);
    }

    fn cancel(&mut self, timer: TimerKind) {
        *self.deadline_mut(timer) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_replaces_deadline() {
        let mut timers = TimerTable::new();
        timers.schedule(TimerKind::Election, Duration::from_millis(200));
        timers.schedule(TimerKind::Election, Duration::from_millis(300));
        assert!(timers.advance(Duration::from_millis(250)).is_empty());
        assert_eq!(timers.advance(Duration::from_millis(50)), vec![TimerKind::Election]);
        assert!(!timers.is_armed(TimerKind::Election));
    }

    #[test]
    fn expired_timers_come_out_in_deadline_order() {
        let mut timers = TimerTable::new();
        timers.schedule(TimerKind::Election, Duration::from_millis(90));
        timers.schedule(TimerKind::Heartbeat, Duration::from_millis(50));
        assert_eq!(
            timers.advance(Duration::from_millis(100)),
            vec![TimerKind::Heartbeat, TimerKind::Election]
        );
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timers = TimerTable::new();
        timers.schedule(TimerKind::Heartbeat, Duration::from_millis(50));
        timers.cancel(TimerKind::Heartbeat);
        assert!(timers.advance(Duration::from_secs(1)).is_empty());
        assert!(!timers.fire(TimerKind::Heartbeat));
    }
}
