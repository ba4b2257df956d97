//! Contact-switch debouncing.
//!
//! Raw level changes re-arm a fixed 100 ms window; only a level still changed
//! when the window expires becomes a confirmed transition. The first settled
//! level after startup establishes the door state silently, so a unit booted
//! with the door already open does not fabricate an open event.

use crate::config::OpenLevel;
use crate::state::DoorId;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorTransition {
    Opened(DoorId),
    Closed(DoorId),
}

impl DoorTransition {
    pub fn door_id(&self) -> DoorId {
        match self {
            DoorTransition::Opened(id) | DoorTransition::Closed(id) => *id,
        }
    }
}

#[derive(Debug)]
pub struct DoorDebouncer {
    door_id: DoorId,
    open_level: OpenLevel,
    raw_open: Option<bool>,
    debounced_open: Option<bool>,
    deadline: Option<Instant>,
}

impl DoorDebouncer {
    pub fn new(door_id: DoorId, open_level: OpenLevel) -> Self {
        Self {
            door_id,
            open_level,
            raw_open: None,
            debounced_open: None,
            deadline: None,
        }
    }

    pub fn door_id(&self) -> DoorId {
        self.door_id
    }

    /// Confirmed door state, once the first level has settled.
    pub fn is_open(&self) -> Option<bool> {
        self.debounced_open
    }

    /// Feeds a raw level change. Re-arms the debounce window whenever the raw
    /// level actually flips; repeated reports of the same level are ignored.
    pub fn level_change(&mut self, is_high: bool, now: Instant) {
        let open = match self.open_level {
            OpenLevel::High => is_high,
            OpenLevel::Low => !is_high,
        };
        if self.raw_open == Some(open) {
            return;
        }
        self.raw_open = Some(open);
        self.deadline = Some(now + DEBOUNCE_WINDOW);
        debug!(door_id = self.door_id, open = open, "Door level flip, debouncing");
    }

    /// Earliest pending debounce expiry, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires the debounce deadline if due. Emits a transition only when the
    /// settled level differs from the confirmed one and a confirmed level
    /// already existed.
    pub fn poll(&mut self, now: Instant) -> Option<DoorTransition> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;

        let raw = self.raw_open?;
        if self.debounced_open == Some(raw) {
            return None;
        }
        let previous = self.debounced_open.replace(raw);
        if previous.is_none() {
            debug!(door_id = self.door_id, open = raw, "Initial door state settled");
            return None;
        }
        Some(if raw {
            DoorTransition::Opened(self.door_id)
        } else {
            DoorTransition::Closed(self.door_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(debouncer: &mut DoorDebouncer, is_high: bool, now: Instant) -> Option<DoorTransition> {
        debouncer.level_change(is_high, now);
        debouncer.poll(now + DEBOUNCE_WINDOW)
    }

    #[test]
    fn first_settled_level_emits_no_transition() {
        let mut debouncer = DoorDebouncer::new(1, OpenLevel::High);
        let now = Instant::now();

        assert_eq!(settle(&mut debouncer, false, now), None);
        assert_eq!(debouncer.is_open(), Some(false));
    }

    #[test]
    fn settled_flip_emits_open_then_close() {
        let mut debouncer = DoorDebouncer::new(1, OpenLevel::High);
        let now = Instant::now();
        settle(&mut debouncer, false, now);

        let opened = settle(&mut debouncer, true, now + Duration::from_secs(1));
        assert_eq!(opened, Some(DoorTransition::Opened(1)));

        let closed = settle(&mut debouncer, false, now + Duration::from_secs(2));
        assert_eq!(closed, Some(DoorTransition::Closed(1)));
    }

    #[test]
    fn bounce_within_window_re_arms_and_suppresses() {
        let mut debouncer = DoorDebouncer::new(1, OpenLevel::High);
        let now = Instant::now();
        settle(&mut debouncer, false, now);

        // Flip open then immediately back closed inside the window.
        debouncer.level_change(true, now + Duration::from_secs(1));
        debouncer.level_change(false, now + Duration::from_secs(1) + Duration::from_millis(40));

        // Original deadline passes with the level back where it started.
        let at_first_deadline = now + Duration::from_secs(1) + DEBOUNCE_WINDOW;
        assert_eq!(debouncer.poll(at_first_deadline), None);

        // Re-armed deadline also yields nothing since the level matches.
        let at_second_deadline =
            now + Duration::from_secs(1) + Duration::from_millis(40) + DEBOUNCE_WINDOW;
        assert_eq!(debouncer.poll(at_second_deadline), None);
        assert_eq!(debouncer.is_open(), Some(false));
    }

    #[test]
    fn poll_before_deadline_is_a_no_op() {
        let mut debouncer = DoorDebouncer::new(1, OpenLevel::High);
        let now = Instant::now();
        settle(&mut debouncer, false, now);

        debouncer.level_change(true, now + Duration::from_secs(1));
        assert_eq!(
            debouncer.poll(now + Duration::from_secs(1) + Duration::from_millis(50)),
            None
        );
        assert_eq!(debouncer.is_open(), Some(false));
        assert!(debouncer.next_deadline().is_some());
    }

    #[test]
    fn repeated_same_level_does_not_re_arm() {
        let mut debouncer = DoorDebouncer::new(1, OpenLevel::High);
        let now = Instant::now();
        settle(&mut debouncer, false, now);

        debouncer.level_change(true, now + Duration::from_secs(1));
        let first_deadline = debouncer.next_deadline().expect("armed");
        debouncer.level_change(true, now + Duration::from_secs(1) + Duration::from_millis(60));

        assert_eq!(debouncer.next_deadline(), Some(first_deadline));
    }

    #[test]
    fn low_polarity_inverts_the_mapping() {
        let mut debouncer = DoorDebouncer::new(2, OpenLevel::Low);
        let now = Instant::now();
        settle(&mut debouncer, true, now);
        assert_eq!(debouncer.is_open(), Some(false));

        let opened = settle(&mut debouncer, false, now + Duration::from_secs(1));
        assert_eq!(opened, Some(DoorTransition::Opened(2)));
    }
}
