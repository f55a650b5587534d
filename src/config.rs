//! Engine configuration
//!
//! All timings that shape the dwell cycle live here, along with the choice
//! of stability strategy and the classifier knobs. Defaults reproduce the
//! production mobile tuning; [`EngineConfig::voting`] reproduces the
//! majority-vote tuning used on lower-framerate devices.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Default open-palm dwell before the selector arms (ms)
pub const DEFAULT_WAKE_MS: u64 = 1800;
/// Default finger-count dwell before a selection locks (ms)
pub const DEFAULT_SELECT_MS: u64 = 1500;
/// Default confirmation dwell before activation (ms)
pub const DEFAULT_CONFIRM_MS: u64 = 1200;
/// Default tolerated hand loss during selection (ms)
pub const DEFAULT_GRACE_MS: u64 = 2500;
/// Default nominal spacing of state-machine ticks (ms)
pub const DEFAULT_TICK_MS: u64 = 50;
/// Default unchanged-signal requirement for the hold strategy (ms)
pub const DEFAULT_STABLE_MS: u64 = 400;
/// Default sliding-history length for the vote strategy
pub const DEFAULT_HISTORY_SIZE: usize = 8;
/// Default minimum vote count for the vote strategy
pub const DEFAULT_VOTE_THRESHOLD: usize = 6;
/// Default horizontal thumb-to-palm-center distance for an extended thumb
pub const DEFAULT_THUMB_DISTANCE: f32 = 0.12;
/// Default extended-finger count that qualifies as an open palm
pub const DEFAULT_PALM_MIN_FINGERS: u8 = 4;

fn default_stable_ms() -> u64 {
    DEFAULT_STABLE_MS
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

fn default_vote_threshold() -> usize {
    DEFAULT_VOTE_THRESHOLD
}

/// Which stability strategy debounces the raw classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StabilityMode {
    /// Accept a value once it has been unchanged for `stable_ms`
    Hold {
        #[serde(default = "default_stable_ms")]
        stable_ms: u64,
    },
    /// Accept the plurality value of the last `history` observations once it
    /// holds at least `threshold` votes
    Vote {
        #[serde(default = "default_history_size")]
        history: usize,
        #[serde(default = "default_vote_threshold")]
        threshold: usize,
    },
}

impl StabilityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StabilityMode::Hold { .. } => "hold",
            StabilityMode::Vote { .. } => "vote",
        }
    }
}

impl Default for StabilityMode {
    fn default() -> Self {
        StabilityMode::Hold {
            stable_ms: DEFAULT_STABLE_MS,
        }
    }
}

/// Full engine configuration
///
/// Serialized form accepts partial documents; omitted fields take the
/// defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Open-palm dwell required to leave idle (ms)
    pub wake_ms: u64,
    /// Held-count dwell required to lock a selection (ms)
    pub select_ms: u64,
    /// Final dwell required to activate (ms)
    pub confirm_ms: u64,
    /// Hand loss tolerated during selection before reverting to idle (ms)
    pub grace_ms: u64,
    /// Nominal tick spacing; replay uses it to schedule machine ticks (ms)
    pub tick_ms: u64,
    /// Active debouncing strategy and its parameters
    pub stability: StabilityMode,
    /// Horizontal thumb-to-palm-center distance for an extended thumb
    pub thumb_distance_threshold: f32,
    /// Skip the thumb test entirely when no other finger is extended
    pub fist_short_circuit: bool,
    /// Extended-finger count that qualifies as an open palm
    pub palm_min_fingers: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            wake_ms: DEFAULT_WAKE_MS,
            select_ms: DEFAULT_SELECT_MS,
            confirm_ms: DEFAULT_CONFIRM_MS,
            grace_ms: DEFAULT_GRACE_MS,
            tick_ms: DEFAULT_TICK_MS,
            stability: StabilityMode::default(),
            thumb_distance_threshold: DEFAULT_THUMB_DISTANCE,
            fist_short_circuit: false,
            palm_min_fingers: DEFAULT_PALM_MIN_FINGERS,
        }
    }
}

impl EngineConfig {
    /// The majority-vote tuning: identical dwell timings, vote debouncing
    pub fn voting() -> Self {
        EngineConfig {
            stability: StabilityMode::Vote {
                history: DEFAULT_HISTORY_SIZE,
                threshold: DEFAULT_VOTE_THRESHOLD,
            },
            ..EngineConfig::default()
        }
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.wake_ms == 0 || self.select_ms == 0 || self.confirm_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "dwell durations must be nonzero".to_string(),
            ));
        }
        if self.tick_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick interval must be nonzero".to_string(),
            ));
        }
        match self.stability {
            StabilityMode::Hold { stable_ms } => {
                if stable_ms == 0 {
                    return Err(EngineError::InvalidConfig(
                        "stable_ms must be nonzero".to_string(),
                    ));
                }
            }
            StabilityMode::Vote { history, threshold } => {
                if history == 0 || threshold == 0 {
                    return Err(EngineError::InvalidConfig(
                        "vote history and threshold must be nonzero".to_string(),
                    ));
                }
                if threshold > history {
                    return Err(EngineError::InvalidConfig(format!(
                        "vote threshold {} exceeds history length {}",
                        threshold, history
                    )));
                }
            }
        }
        if !self.thumb_distance_threshold.is_finite() || self.thumb_distance_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "thumb distance threshold must be positive".to_string(),
            ));
        }
        if self.palm_min_fingers == 0 || self.palm_min_fingers > 5 {
            return Err(EngineError::InvalidConfig(format!(
                "palm_min_fingers {} outside 1..=5",
                self.palm_min_fingers
            )));
        }
        Ok(())
    }

    /// Parse a configuration from JSON (partial documents allowed)
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(EngineError::JsonError)
    }
}
