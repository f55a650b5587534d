//! Interaction state machine
//!
//! Drives the dwell cycle: a sustained open palm arms the selector, a held
//! finger count locks a selection, a final hold confirms it. The machine is
//! advanced by a fixed-rate tick and reads only debounced signals; it never
//! sees raw per-frame jitter.
//!
//! Timing rules:
//! - idle: any tick without a palm voids the wake timer (no partial credit),
//! - select: hand loss is tolerated up to the grace period, measured from
//!   the last detected frame; the machine freezes while absent and reverts
//!   to idle once the grace window is exceeded,
//! - confirm: reads nothing but its own timer; gesture drift and hand loss
//!   during confirmation are deliberately ignored,
//! - activated: terminal until an external [`InteractionFsm::reset`].

use crate::config::EngineConfig;
use crate::sink::EventSink;
use crate::types::{InteractionState, StableSignal};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Everything the machine reads on one tick
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub hand_detected: bool,
    pub signal: StableSignal,
    /// When the last frame with a detected hand arrived
    pub last_hand_at: Option<DateTime<Utc>>,
    /// Upstream validity flag; false sends an active selection to the
    /// error state
    pub gesture_valid: bool,
}

/// The dwell-cycle state machine
#[derive(Debug)]
pub struct InteractionFsm {
    wake_ms: i64,
    select_ms: i64,
    confirm_ms: i64,
    grace_ms: i64,
    state: InteractionState,
    selection: Option<u8>,
    wake_started: Option<DateTime<Utc>>,
    select_started: Option<DateTime<Utc>>,
    confirm_started: Option<DateTime<Utc>>,
}

impl InteractionFsm {
    pub fn new(config: &EngineConfig) -> Self {
        InteractionFsm {
            wake_ms: config.wake_ms as i64,
            select_ms: config.select_ms as i64,
            confirm_ms: config.confirm_ms as i64,
            grace_ms: config.grace_ms as i64,
            state: InteractionState::Idle,
            selection: None,
            wake_started: None,
            select_started: None,
            confirm_started: None,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// The option currently held or confirmed; `None` outside
    /// select/confirm/activated
    pub fn selection(&self) -> Option<u8> {
        self.selection
    }

    /// Advance one tick
    pub fn tick(&mut self, now: DateTime<Utc>, input: &TickInput, sink: &mut dyn EventSink) {
        match self.state {
            InteractionState::Idle => self.tick_idle(now, input, sink),
            InteractionState::SelectHold => self.tick_select(now, input, sink),
            InteractionState::Confirm => self.tick_confirm(now, sink),
            InteractionState::Activated => {}
            InteractionState::Error => self.tick_error(input, sink),
        }
    }

    /// Return to idle from any state, clearing selection and timers
    pub fn reset(&mut self, sink: &mut dyn EventSink) {
        self.selection = None;
        self.wake_started = None;
        self.select_started = None;
        self.confirm_started = None;
        if self.state != InteractionState::Idle {
            self.set_state(InteractionState::Idle, sink);
        }
        sink.on_progress(0.0);
    }

    fn tick_idle(&mut self, now: DateTime<Utc>, input: &TickInput, sink: &mut dyn EventSink) {
        if input.hand_detected && input.signal.is_palm {
            if self.wake_started.is_none() {
                debug!("wake dwell started");
            }
            let started = *self.wake_started.get_or_insert(now);
            let elapsed = (now - started).num_milliseconds();
            if elapsed >= self.wake_ms {
                self.wake_started = None;
                self.selection = None;
                self.select_started = None;
                self.set_state(InteractionState::SelectHold, sink);
                sink.on_progress(0.0);
            } else {
                sink.on_progress(ratio(elapsed, self.wake_ms));
            }
        } else if self.wake_started.take().is_some() {
            sink.on_progress(0.0);
        }
    }

    fn tick_select(&mut self, now: DateTime<Utc>, input: &TickInput, sink: &mut dyn EventSink) {
        if !input.gesture_valid {
            self.selection = None;
            self.select_started = None;
            self.set_state(InteractionState::Error, sink);
            sink.on_progress(0.0);
            return;
        }

        if !input.hand_detected {
            let grace_exceeded = match input.last_hand_at {
                Some(last) => (now - last).num_milliseconds() > self.grace_ms,
                None => true,
            };
            if grace_exceeded {
                debug!("hand lost beyond grace period, reverting to idle");
                self.selection = None;
                self.select_started = None;
                self.set_state(InteractionState::Idle, sink);
                sink.on_progress(0.0);
            }
            // Within grace: freeze, keeping selection and timer untouched.
            return;
        }

        let count = match input.signal.finger_count {
            Some(c) if (1..=5).contains(&c) => c,
            _ => {
                self.clear_selection(sink);
                return;
            }
        };

        if self.selection != Some(count) {
            debug!("select dwell started for {}", count);
            self.selection = Some(count);
            self.select_started = Some(now);
        }

        let started = *self.select_started.get_or_insert(now);
        let elapsed = (now - started).num_milliseconds();
        if elapsed >= self.select_ms {
            self.select_started = None;
            self.confirm_started = Some(now);
            self.set_state(InteractionState::Confirm, sink);
            sink.on_progress(0.0);
        } else {
            sink.on_progress(ratio(elapsed, self.select_ms));
        }
    }

    fn tick_confirm(&mut self, now: DateTime<Utc>, sink: &mut dyn EventSink) {
        let started = *self.confirm_started.get_or_insert(now);
        let elapsed = (now - started).num_milliseconds();
        if elapsed >= self.confirm_ms {
            self.confirm_started = None;
            if let Some(selection) = self.selection {
                info!("selection {} activated", selection);
                sink.on_activate(selection);
            }
            self.set_state(InteractionState::Activated, sink);
            sink.on_progress(0.0);
        } else {
            sink.on_progress(ratio(elapsed, self.confirm_ms));
        }
    }

    fn tick_error(&mut self, input: &TickInput, sink: &mut dyn EventSink) {
        if !input.hand_detected || input.gesture_valid {
            self.set_state(InteractionState::Idle, sink);
            sink.on_progress(0.0);
        }
    }

    fn clear_selection(&mut self, sink: &mut dyn EventSink) {
        let had_dwell = self.selection.is_some() || self.select_started.is_some();
        self.selection = None;
        self.select_started = None;
        if had_dwell {
            sink.on_progress(0.0);
        }
    }

    fn set_state(&mut self, next: InteractionState, sink: &mut dyn EventSink) {
        info!("state {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        sink.on_state_change(next, self.selection);
    }
}

fn ratio(elapsed: i64, total: i64) -> f32 {
    (elapsed as f32 / total as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::types::EngineEvent;
    use chrono::{Duration, TimeZone};

    const TICK: i64 = 50;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn fsm() -> InteractionFsm {
        InteractionFsm::new(&EngineConfig::default())
    }

    fn present(count: Option<u8>, palm: bool, now: DateTime<Utc>) -> TickInput {
        TickInput {
            hand_detected: true,
            signal: StableSignal {
                finger_count: count,
                is_palm: palm,
            },
            last_hand_at: Some(now),
            gesture_valid: true,
        }
    }

    fn absent(last_hand_at: DateTime<Utc>) -> TickInput {
        TickInput {
            hand_detected: false,
            signal: StableSignal::default(),
            last_hand_at: Some(last_hand_at),
            gesture_valid: true,
        }
    }

    /// Tick with a palm held from `from_ms` to `to_ms` inclusive
    fn hold_palm(fsm: &mut InteractionFsm, sink: &mut MemorySink, from_ms: i64, to_ms: i64) {
        let mut t = from_ms;
        while t <= to_ms {
            fsm.tick(at(t), &present(Some(5), true, at(t)), sink);
            t += TICK;
        }
    }

    /// Tick with a held finger count from `from_ms` to `to_ms` inclusive
    fn hold_count(
        fsm: &mut InteractionFsm,
        sink: &mut MemorySink,
        count: u8,
        from_ms: i64,
        to_ms: i64,
    ) {
        let mut t = from_ms;
        while t <= to_ms {
            fsm.tick(at(t), &present(Some(count), count >= 4, at(t)), sink);
            t += TICK;
        }
    }

    fn last_progress(sink: &MemorySink) -> Option<f32> {
        sink.events().iter().rev().find_map(|e| match e {
            EngineEvent::Progress { ratio } => Some(*ratio),
            _ => None,
        })
    }

    #[test]
    fn test_wake_requires_full_duration() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1750);
        assert_eq!(fsm.state(), InteractionState::Idle);

        fsm.tick(at(1800), &present(Some(5), true, at(1800)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::SelectHold);
        assert_eq!(fsm.selection(), None);
        assert!(sink.events().contains(&EngineEvent::StateChanged {
            state: InteractionState::SelectHold,
            selection: None
        }));
        assert_eq!(last_progress(&sink), Some(0.0));
    }

    #[test]
    fn test_single_bad_tick_voids_wake_credit() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 900);
        // One tick without the palm.
        fsm.tick(at(950), &present(Some(2), false, at(950)), &mut sink);
        assert_eq!(last_progress(&sink), Some(0.0));

        // The full wake duration is owed again from scratch.
        hold_palm(&mut fsm, &mut sink, 1000, 2750);
        assert_eq!(fsm.state(), InteractionState::Idle);
        fsm.tick(at(2800), &present(Some(5), true, at(2800)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::SelectHold);
    }

    #[test]
    fn test_wake_progress_is_monotonic() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1750);

        let ratios: Vec<f32> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Progress { ratio } => Some(*ratio),
                _ => None,
            })
            .collect();
        assert!(!ratios.is_empty());
        assert!(ratios.windows(2).all(|w| w[0] <= w[1]));
        assert!(ratios.iter().all(|r| (0.0..=1.0).contains(r)));
    }

    #[test]
    fn test_select_dwell_locks_selection() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        assert_eq!(fsm.state(), InteractionState::SelectHold);

        hold_count(&mut fsm, &mut sink, 3, 1850, 3300);
        assert_eq!(fsm.state(), InteractionState::SelectHold);
        // 1500ms after the count was first seen at 1850.
        fsm.tick(at(3350), &present(Some(3), false, at(3350)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::Confirm);
        assert_eq!(fsm.selection(), Some(3));
    }

    #[test]
    fn test_switching_count_restarts_select_dwell() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 3, 1850, 2550);

        // Switch to two fingers 700ms in: prior credit is forfeited.
        fsm.tick(at(2600), &present(Some(2), false, at(2600)), &mut sink);
        assert_eq!(last_progress(&sink), Some(0.0));
        assert_eq!(fsm.selection(), Some(2));

        hold_count(&mut fsm, &mut sink, 2, 2650, 4050);
        assert_eq!(fsm.state(), InteractionState::SelectHold);
        fsm.tick(at(4100), &present(Some(2), false, at(4100)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::Confirm);
        assert_eq!(fsm.selection(), Some(2));
    }

    #[test]
    fn test_invalid_count_clears_selection() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 3, 1850, 2550);
        assert_eq!(fsm.selection(), Some(3));

        // Signal destabilizes: no dwell credit without a valid reading.
        fsm.tick(at(2600), &present(None, false, at(2600)), &mut sink);
        assert_eq!(fsm.selection(), None);
        assert_eq!(last_progress(&sink), Some(0.0));

        // A stable zero is treated exactly like no signal.
        fsm.tick(at(2650), &present(Some(0), false, at(2650)), &mut sink);
        assert_eq!(fsm.selection(), None);
        assert_eq!(fsm.state(), InteractionState::SelectHold);
    }

    #[test]
    fn test_hand_loss_within_grace_freezes_state() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 4, 1850, 2550);
        assert_eq!(fsm.selection(), Some(4));

        let lost_at = at(2550);
        let before = sink.events().len();
        let mut t = 2600;
        while t <= 2550 + 2400 {
            fsm.tick(at(t), &absent(lost_at), &mut sink);
            t += TICK;
        }
        // Frozen: no events, no state movement, selection intact.
        assert_eq!(sink.events().len(), before);
        assert_eq!(fsm.state(), InteractionState::SelectHold);
        assert_eq!(fsm.selection(), Some(4));
    }

    #[test]
    fn test_hand_loss_beyond_grace_reverts_to_idle() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 4, 1850, 2550);

        let lost_at = at(2550);
        fsm.tick(at(2550 + 2501), &absent(lost_at), &mut sink);
        assert_eq!(fsm.state(), InteractionState::Idle);
        assert_eq!(fsm.selection(), None);
        assert_eq!(last_progress(&sink), Some(0.0));
    }

    #[test]
    fn test_select_timer_spans_brief_hand_loss() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 3, 1850, 2550);

        // Absent for one second, well within grace.
        let lost_at = at(2550);
        let mut t = 2600;
        while t < 3550 {
            fsm.tick(at(t), &absent(lost_at), &mut sink);
            t += TICK;
        }
        // The select timer kept its seat time: 1700ms of wall clock have
        // passed since 1850, so a still-stable count completes the dwell on
        // the first tick after the hand returns.
        fsm.tick(at(3550), &present(Some(3), false, at(3550)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::Confirm);
        assert_eq!(fsm.selection(), Some(3));
    }

    #[test]
    fn test_confirm_ignores_drift_and_loss() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 3, 1850, 3350);
        assert_eq!(fsm.state(), InteractionState::Confirm);

        // Wild drift and even hand loss during confirmation change nothing.
        fsm.tick(at(3400), &present(Some(1), false, at(3400)), &mut sink);
        fsm.tick(at(3450), &absent(at(3400)), &mut sink);
        fsm.tick(at(3500), &present(None, false, at(3500)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::Confirm);
        assert_eq!(fsm.selection(), Some(3));

        // Confirm started at 3350; completes 1200ms later.
        fsm.tick(at(3350 + 1200), &present(Some(1), false, at(3350 + 1200)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::Activated);
        assert_eq!(sink.activations(), vec![3]);
    }

    #[test]
    fn test_activation_fires_exactly_once() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 2, 1850, 4700);
        assert_eq!(fsm.state(), InteractionState::Activated);

        let mut t = 4750;
        while t <= 9750 {
            fsm.tick(at(t), &present(Some(2), false, at(t)), &mut sink);
            t += TICK;
        }
        assert_eq!(fsm.state(), InteractionState::Activated);
        assert_eq!(sink.activations(), vec![2]);
    }

    #[test]
    fn test_external_reset_returns_to_idle() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 2, 1850, 4700);
        assert_eq!(fsm.state(), InteractionState::Activated);

        fsm.reset(&mut sink);
        assert_eq!(fsm.state(), InteractionState::Idle);
        assert_eq!(fsm.selection(), None);
        assert_eq!(last_progress(&sink), Some(0.0));

        // A fresh cycle works after the reset.
        hold_palm(&mut fsm, &mut sink, 5000, 6800);
        assert_eq!(fsm.state(), InteractionState::SelectHold);
    }

    #[test]
    fn test_invalid_gesture_enters_error_and_drains() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 3, 1850, 2550);

        let mut input = present(Some(3), false, at(2600));
        input.gesture_valid = false;
        fsm.tick(at(2600), &input, &mut sink);
        assert_eq!(fsm.state(), InteractionState::Error);
        assert_eq!(fsm.selection(), None);
        assert_eq!(last_progress(&sink), Some(0.0));

        // Still invalid, hand still present: stays in error.
        fsm.tick(at(2650), &input, &mut sink);
        assert_eq!(fsm.state(), InteractionState::Error);

        // Validity restored: drains to idle, never back to selection.
        fsm.tick(at(2700), &present(Some(3), false, at(2700)), &mut sink);
        assert_eq!(fsm.state(), InteractionState::Idle);
    }

    #[test]
    fn test_error_drains_on_hand_loss_too() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 3, 1850, 2550);

        let mut input = present(Some(3), false, at(2600));
        input.gesture_valid = false;
        fsm.tick(at(2600), &input, &mut sink);
        assert_eq!(fsm.state(), InteractionState::Error);

        let mut gone = absent(at(2600));
        gone.gesture_valid = false;
        fsm.tick(at(2650), &gone, &mut sink);
        assert_eq!(fsm.state(), InteractionState::Idle);
    }

    #[test]
    fn test_invalid_flag_outside_select_hold_is_ignored() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();

        let mut input = present(Some(5), true, at(0));
        input.gesture_valid = false;
        fsm.tick(at(0), &input, &mut sink);
        assert_eq!(fsm.state(), InteractionState::Idle);
    }

    #[test]
    fn test_full_cycle_event_sequence() {
        let mut fsm = fsm();
        let mut sink = MemorySink::new();
        hold_palm(&mut fsm, &mut sink, 0, 1800);
        hold_count(&mut fsm, &mut sink, 3, 1850, 4700);

        assert_eq!(fsm.state(), InteractionState::Activated);
        let states: Vec<InteractionState> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                InteractionState::SelectHold,
                InteractionState::Confirm,
                InteractionState::Activated,
            ]
        );
        assert_eq!(sink.activations(), vec![3]);
    }
}
