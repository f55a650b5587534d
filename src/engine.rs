//! Gesture engine
//!
//! [`GestureEngine`] owns the whole pipeline: classifier, stability filter,
//! and state machine, wired behind the two push surfaces of the system.
//! Frames arrive through [`GestureEngine::observe`] at whatever cadence the
//! detector runs; a fixed-rate [`GestureEngine::tick`] advances the dwell
//! machine and emits events into the caller's sink.
//!
//! Both cadences run on one thread. `observe` computes a complete
//! [`StableSignal`] and publishes it with a single assignment, so a tick
//! always reads a fully-formed snapshot and never a half-written one.
//!
//! [`replay_trace`] drives a fresh engine through a recorded observation
//! trace, interleaving ticks and frames by timestamp. It backs the CLI and
//! the end-to-end tests.

use crate::classifier::FingerClassifier;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fsm::{InteractionFsm, TickInput};
use crate::sink::{EventSink, MemorySink};
use crate::stability::{strategy_for, StabilityStrategy};
use crate::trace::ObservationRecord;
use crate::types::{
    EngineStatus, HandLandmarks, InteractionState, ProducerInfo, StableSignal, TimedEvent,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The dwell-selection interaction engine
pub struct GestureEngine {
    config: EngineConfig,
    classifier: FingerClassifier,
    filter: Box<dyn StabilityStrategy>,
    fsm: InteractionFsm,
    snapshot: StableSignal,
    hand_detected: bool,
    last_hand_at: Option<DateTime<Utc>>,
    gesture_valid: bool,
    instance_id: String,
}

impl GestureEngine {
    /// Create an engine with the strategy named by the configuration
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let filter = strategy_for(&config.stability);
        Self::with_strategy(config, filter)
    }

    /// Create an engine with an injected stability strategy
    pub fn with_strategy(
        config: EngineConfig,
        filter: Box<dyn StabilityStrategy>,
    ) -> Result<Self, EngineError> {
        if let Err(e) = config.validate() {
            warn!("configuration rejected: {}", e);
            return Err(e);
        }
        let fsm = InteractionFsm::new(&config);
        let classifier = FingerClassifier::new(&config);
        info!("engine ready, strategy={}", filter.name());
        Ok(GestureEngine {
            config,
            classifier,
            filter,
            fsm,
            snapshot: StableSignal::default(),
            hand_detected: false,
            last_hand_at: None,
            gesture_valid: true,
            instance_id: Uuid::new_v4().to_string(),
        })
    }

    /// Feed one frame; `None` means no hand was detected in it
    pub fn observe(&mut self, landmarks: Option<&HandLandmarks>, now: DateTime<Utc>) {
        match landmarks {
            Some(lm) => {
                if !self.hand_detected {
                    debug!("hand acquired");
                }
                let raw = self.classifier.classify(lm);
                let stable = self.filter.observe(raw, now);
                self.snapshot = stable;
                self.hand_detected = true;
                self.last_hand_at = Some(now);
            }
            None => {
                if self.hand_detected {
                    debug!("hand lost");
                }
                self.clear_detection();
            }
        }
    }

    /// Advance the state machine one tick, emitting into `sink`
    pub fn tick(&mut self, now: DateTime<Utc>, sink: &mut dyn EventSink) {
        let input = TickInput {
            hand_detected: self.hand_detected,
            signal: self.snapshot,
            last_hand_at: self.last_hand_at,
            gesture_valid: self.gesture_valid,
        };
        self.fsm.tick(now, &input, sink);
    }

    /// Return the machine to idle (required to leave the activated state)
    pub fn reset(&mut self, sink: &mut dyn EventSink) {
        self.fsm.reset(sink);
    }

    /// The frame source stopped: drop all detection state immediately
    ///
    /// Subsequent ticks see an absent hand; the select-phase grace period
    /// is the only surviving tolerance.
    pub fn halt(&mut self) {
        debug!("frame source halted");
        self.clear_detection();
    }

    /// Upstream validity flag; `false` sends an active selection to the
    /// error state until it recovers
    pub fn set_gesture_valid(&mut self, valid: bool) {
        if self.gesture_valid != valid {
            debug!("gesture validity -> {}", valid);
            self.gesture_valid = valid;
        }
    }

    pub fn state(&self) -> InteractionState {
        self.fsm.state()
    }

    pub fn selection(&self) -> Option<u8> {
        self.fsm.selection()
    }

    /// The most recent debounced signal
    pub fn stable_signal(&self) -> StableSignal {
        self.snapshot
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Point-in-time snapshot for embedders and diagnostics
    pub fn status(&self, now: DateTime<Utc>) -> EngineStatus {
        EngineStatus {
            producer: ProducerInfo {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            state: self.fsm.state(),
            selection: self.fsm.selection(),
            hand_detected: self.hand_detected,
            strategy: self.filter.name().to_string(),
            signal_age_ms: self.last_hand_at.map(|t| (now - t).num_milliseconds()),
            observed_at_utc: self.last_hand_at.map(|t| t.to_rfc3339()),
            computed_at_utc: now.to_rfc3339(),
        }
    }

    fn clear_detection(&mut self) {
        self.filter.clear();
        self.snapshot = StableSignal::default();
        self.hand_detected = false;
        // last_hand_at survives: the grace period measures from it.
    }
}

/// Replay a recorded observation trace through a fresh engine
///
/// Ticks run at `config.tick_ms` multiples from session start; a record
/// sharing a tick's timestamp is delivered before that tick runs. Replay
/// ends at the last record's timestamp, so traces that expect activation
/// must include trailing frames (hand-absent ones suffice) covering the
/// confirm dwell.
pub fn replay_trace(
    records: &[ObservationRecord],
    config: EngineConfig,
) -> Result<Vec<TimedEvent>, EngineError> {
    let tick_ms = config.tick_ms;
    let mut engine = GestureEngine::new(config)?;
    let mut sink = MemorySink::new();
    let mut events = Vec::new();
    let epoch = DateTime::<Utc>::UNIX_EPOCH;

    let mut tick_at: u64 = tick_ms;
    let mut prev_ms: Option<u64> = None;
    for record in records {
        record.validate()?;
        if let Some(prev) = prev_ms {
            if record.t_ms < prev {
                return Err(EngineError::TraceError(format!(
                    "timestamps out of order: {} after {}",
                    record.t_ms, prev
                )));
            }
        }
        prev_ms = Some(record.t_ms);

        while tick_at < record.t_ms {
            run_tick(&mut engine, &mut sink, &mut events, epoch, tick_at);
            tick_at += tick_ms;
        }
        let landmarks = record.landmarks()?;
        engine.observe(
            landmarks.as_ref(),
            epoch + Duration::milliseconds(record.t_ms as i64),
        );
    }

    let end_ms = prev_ms.unwrap_or(0);
    while tick_at <= end_ms {
        run_tick(&mut engine, &mut sink, &mut events, epoch, tick_at);
        tick_at += tick_ms;
    }
    Ok(events)
}

fn run_tick(
    engine: &mut GestureEngine,
    sink: &mut MemorySink,
    events: &mut Vec<TimedEvent>,
    epoch: DateTime<Utc>,
    t_ms: u64,
) {
    engine.tick(epoch + Duration::milliseconds(t_ms as i64), sink);
    for event in sink.drain() {
        events.push(TimedEvent { t_ms, event });
    }
}
