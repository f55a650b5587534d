//! Temporal stability filtering
//!
//! Raw per-frame classifications jitter; the state machine must only ever
//! see values that have persisted. Two strategies implement the same trait:
//!
//! - [`HoldStability`]: a value counts once it has been unchanged for a
//!   configured number of milliseconds. Used where frame cadence is uneven.
//! - [`VoteStability`]: a value counts once it is the plurality winner of a
//!   fixed sliding history with a minimum vote count. Used where frames
//!   arrive steadily but individual classifications are noisy.
//!
//! The palm flag is filtered independently of the finger count in both
//! strategies, so a wobbling count does not destabilize wake detection.

use crate::config::StabilityMode;
use crate::types::{RawSignal, StableSignal};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Debounces raw signals into stable ones
///
/// `observe` is called once per frame while a hand is present; `clear`
/// is called on hand loss and must drop every candidate and all history
/// so nothing stale survives into the next detection.
pub trait StabilityStrategy {
    fn observe(&mut self, raw: RawSignal, now: DateTime<Utc>) -> StableSignal;
    fn clear(&mut self);
    fn name(&self) -> &'static str;
}

/// Build the strategy selected by a [`StabilityMode`]
pub fn strategy_for(mode: &StabilityMode) -> Box<dyn StabilityStrategy> {
    match *mode {
        StabilityMode::Hold { stable_ms } => Box::new(HoldStability::new(stable_ms)),
        StabilityMode::Vote { history, threshold } => {
            Box::new(VoteStability::new(history, threshold))
        }
    }
}

/// Continuous-duration debouncing
#[derive(Debug, Clone)]
pub struct HoldStability {
    stable_ms: i64,
    candidate_count: Option<u8>,
    count_since: Option<DateTime<Utc>>,
    candidate_palm: Option<bool>,
    palm_since: Option<DateTime<Utc>>,
}

impl HoldStability {
    pub fn new(stable_ms: u64) -> Self {
        HoldStability {
            stable_ms: stable_ms as i64,
            candidate_count: None,
            count_since: None,
            candidate_palm: None,
            palm_since: None,
        }
    }

    fn held_long_enough(&self, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match since {
            Some(since) => (now - since).num_milliseconds() >= self.stable_ms,
            None => false,
        }
    }
}

impl StabilityStrategy for HoldStability {
    fn observe(&mut self, raw: RawSignal, now: DateTime<Utc>) -> StableSignal {
        if self.candidate_count != Some(raw.finger_count) {
            self.candidate_count = Some(raw.finger_count);
            self.count_since = Some(now);
        }
        if self.candidate_palm != Some(raw.is_palm) {
            self.candidate_palm = Some(raw.is_palm);
            self.palm_since = Some(now);
        }

        let finger_count = if self.held_long_enough(self.count_since, now) {
            self.candidate_count
        } else {
            None
        };
        let is_palm = if self.held_long_enough(self.palm_since, now) {
            self.candidate_palm.unwrap_or(false)
        } else {
            false
        };
        StableSignal {
            finger_count,
            is_palm,
        }
    }

    fn clear(&mut self) {
        self.candidate_count = None;
        self.count_since = None;
        self.candidate_palm = None;
        self.palm_since = None;
    }

    fn name(&self) -> &'static str {
        "hold"
    }
}

/// Majority-vote debouncing over a sliding history
#[derive(Debug, Clone)]
pub struct VoteStability {
    history: usize,
    threshold: usize,
    counts: VecDeque<u8>,
    palms: VecDeque<bool>,
}

impl VoteStability {
    pub fn new(history: usize, threshold: usize) -> Self {
        VoteStability {
            history,
            threshold,
            counts: VecDeque::with_capacity(history),
            palms: VecDeque::with_capacity(history),
        }
    }

    fn plurality(&self) -> Option<u8> {
        let mut votes = [0usize; 6];
        for &count in &self.counts {
            if let Some(slot) = votes.get_mut(count as usize) {
                *slot += 1;
            }
        }
        let mut best = None;
        let mut best_votes = 0;
        for (value, &n) in votes.iter().enumerate() {
            if n > best_votes {
                best_votes = n;
                best = Some(value as u8);
            }
        }
        if best_votes >= self.threshold {
            best
        } else {
            None
        }
    }
}

impl StabilityStrategy for VoteStability {
    fn observe(&mut self, raw: RawSignal, _now: DateTime<Utc>) -> StableSignal {
        self.counts.push_back(raw.finger_count);
        self.palms.push_back(raw.is_palm);
        while self.counts.len() > self.history {
            self.counts.pop_front();
        }
        while self.palms.len() > self.history {
            self.palms.pop_front();
        }

        let palm_votes = self.palms.iter().filter(|&&p| p).count();
        StableSignal {
            finger_count: self.plurality(),
            is_palm: palm_votes >= self.threshold,
        }
    }

    fn clear(&mut self) {
        self.counts.clear();
        self.palms.clear();
    }

    fn name(&self) -> &'static str {
        "vote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn raw(count: u8) -> RawSignal {
        RawSignal {
            finger_count: count,
            is_palm: count >= 4,
        }
    }

    #[test]
    fn test_hold_null_while_value_keeps_changing() {
        let mut filter = HoldStability::new(400);
        for i in 0..20 {
            let value = if i % 2 == 0 { 2 } else { 3 };
            let stable = filter.observe(raw(value), at(i * 100));
            assert_eq!(stable.finger_count, None, "observation {}", i);
        }
    }

    #[test]
    fn test_hold_accepts_after_stable_window() {
        let mut filter = HoldStability::new(400);
        assert_eq!(filter.observe(raw(3), at(0)).finger_count, None);
        assert_eq!(filter.observe(raw(3), at(200)).finger_count, None);
        assert_eq!(filter.observe(raw(3), at(399)).finger_count, None);
        assert_eq!(filter.observe(raw(3), at(400)).finger_count, Some(3));
        assert_eq!(filter.observe(raw(3), at(600)).finger_count, Some(3));
    }

    #[test]
    fn test_hold_change_restarts_window() {
        let mut filter = HoldStability::new(400);
        filter.observe(raw(3), at(0));
        assert_eq!(filter.observe(raw(3), at(400)).finger_count, Some(3));
        // One divergent frame forfeits stability for the new value too.
        assert_eq!(filter.observe(raw(2), at(450)).finger_count, None);
        assert_eq!(filter.observe(raw(2), at(700)).finger_count, None);
        assert_eq!(filter.observe(raw(2), at(850)).finger_count, Some(2));
    }

    #[test]
    fn test_hold_palm_window_is_independent() {
        let mut filter = HoldStability::new(400);
        // Palm-qualifying counts that wobble between 4 and 5: the count
        // never stabilizes but the palm flag does.
        for i in 0..10 {
            let value = if i % 2 == 0 { 4 } else { 5 };
            let stable = filter.observe(raw(value), at(i * 100));
            if i * 100 >= 400 {
                assert!(stable.is_palm, "observation {}", i);
            }
            assert_eq!(stable.finger_count, None);
        }
    }

    #[test]
    fn test_hold_clear_discards_candidates() {
        let mut filter = HoldStability::new(400);
        filter.observe(raw(3), at(0));
        assert_eq!(filter.observe(raw(3), at(400)).finger_count, Some(3));
        filter.clear();
        // Same value seen again must re-earn the full window.
        assert_eq!(filter.observe(raw(3), at(500)).finger_count, None);
        assert_eq!(filter.observe(raw(3), at(899)).finger_count, None);
        assert_eq!(filter.observe(raw(3), at(900)).finger_count, Some(3));
    }

    #[test]
    fn test_vote_unanimous_history_wins() {
        let mut filter = VoteStability::new(8, 6);
        let mut last = StableSignal::default();
        for i in 0..8 {
            last = filter.observe(raw(2), at(i * 50));
        }
        assert_eq!(last.finger_count, Some(2));
    }

    #[test]
    fn test_vote_reaches_threshold_before_history_full() {
        let mut filter = VoteStability::new(8, 6);
        for i in 0..5 {
            assert_eq!(filter.observe(raw(4), at(i * 50)).finger_count, None);
        }
        assert_eq!(filter.observe(raw(4), at(250)).finger_count, Some(4));
    }

    #[test]
    fn test_vote_spread_below_threshold_is_null() {
        let mut filter = VoteStability::new(8, 6);
        let values = [1u8, 2, 3, 1, 2, 3, 1, 2];
        let mut last = StableSignal::default();
        for (i, &v) in values.iter().enumerate() {
            last = filter.observe(raw(v), at(i as i64 * 50));
        }
        assert_eq!(last.finger_count, None);
    }

    #[test]
    fn test_vote_six_of_eight_wins() {
        let mut filter = VoteStability::new(8, 6);
        let values = [5u8, 5, 1, 5, 5, 2, 5, 5];
        let mut last = StableSignal::default();
        for (i, &v) in values.iter().enumerate() {
            last = filter.observe(raw(v), at(i as i64 * 50));
        }
        assert_eq!(last.finger_count, Some(5));
    }

    #[test]
    fn test_vote_history_evicts_oldest() {
        let mut filter = VoteStability::new(8, 6);
        for i in 0..8 {
            filter.observe(raw(2), at(i * 50));
        }
        // Three newer frames of 5 push the count of 2 down to five votes.
        let mut last = StableSignal::default();
        for i in 8..11 {
            last = filter.observe(raw(5), at(i * 50));
        }
        assert_eq!(last.finger_count, None);
    }

    #[test]
    fn test_vote_palm_counts_true_entries() {
        let mut filter = VoteStability::new(8, 6);
        // Five palm frames of eight: below threshold.
        let values = [1u8, 4, 4, 1, 4, 4, 1, 4];
        let mut last = StableSignal::default();
        for (i, &v) in values.iter().enumerate() {
            last = filter.observe(raw(v), at(i as i64 * 50));
        }
        assert!(!last.is_palm);

        // One more palm frame evicts the oldest non-palm entry and crosses
        // the threshold.
        last = filter.observe(raw(4), at(400));
        assert!(last.is_palm);
    }

    #[test]
    fn test_vote_stable_zero_is_reported() {
        let mut filter = VoteStability::new(8, 6);
        let mut last = StableSignal::default();
        for i in 0..8 {
            last = filter.observe(raw(0), at(i * 50));
        }
        assert_eq!(last.finger_count, Some(0));
        assert!(!last.is_palm);
    }

    #[test]
    fn test_vote_clear_discards_history() {
        let mut filter = VoteStability::new(8, 6);
        for i in 0..8 {
            filter.observe(raw(3), at(i * 50));
        }
        filter.clear();
        assert_eq!(filter.observe(raw(3), at(500)).finger_count, None);
    }

    #[test]
    fn test_strategy_factory_names() {
        let hold = strategy_for(&StabilityMode::Hold { stable_ms: 400 });
        assert_eq!(hold.name(), "hold");
        let vote = strategy_for(&StabilityMode::Vote {
            history: 8,
            threshold: 6,
        });
        assert_eq!(vote.name(), "vote");
    }
}
