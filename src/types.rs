//! Core types for the dwell-selection pipeline
//!
//! Geometry comes in as normalized hand landmarks, is classified into a raw
//! per-frame signal, stabilized into a debounced signal, and leaves the
//! engine as events and status snapshots. Everything here is serde-friendly
//! so the same types serve the library API, recorded traces, the CLI, and
//! the FFI surface.

use serde::{Deserialize, Serialize};

/// Number of landmarks in one hand observation
pub const LANDMARK_COUNT: usize = 21;

/// Landmark indices, MediaPipe Hands topology
///
/// Index 0 is the wrist; each finger contributes four points from knuckle
/// to tip. Only the joints named here are read by the classifier.
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_TIP: usize = 20;
}

/// One normalized hand landmark in image-relative coordinates
///
/// `x` and `y` are in [0,1] with `y` growing downward; `z` is depth relative
/// to the wrist and is optional in serialized form (detectors that emit 2D
/// points omit it).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Landmark { x, y, z: 0.0 }
    }
}

/// A full single-hand observation: exactly 21 landmarks
pub type HandLandmarks = [Landmark; LANDMARK_COUNT];

/// Per-frame classification result, before stabilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignal {
    /// Extended-finger count, 0 through 5
    pub finger_count: u8,
    /// Open-palm flag: at least `palm_min_fingers` extended
    pub is_palm: bool,
}

/// Debounced classification signal, as read by the state machine
///
/// `finger_count` stays `None` until the active stability strategy accepts
/// a value. A stabilized count outside 1..=5 is reported as-is here; the
/// state machine treats it like `None` when seating a selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableSignal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finger_count: Option<u8>,
    pub is_palm: bool,
}

/// Interaction phases of the dwell cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    /// Waiting for a sustained open palm
    Idle,
    /// Palm seen; a held finger count is choosing an option
    SelectHold,
    /// Option chosen; final hold confirms it
    Confirm,
    /// Selection delivered; stays here until an external reset
    Activated,
    /// Gesture flagged invalid upstream; drains back to idle
    Error,
}

impl InteractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionState::Idle => "idle",
            InteractionState::SelectHold => "select_hold",
            InteractionState::Confirm => "confirm",
            InteractionState::Activated => "activated",
            InteractionState::Error => "error",
        }
    }
}

/// Events pushed out of the engine
///
/// The same payloads reach embedders twice over: through the [`EventSink`]
/// trait for live callbacks, and as serialized values from replay, the CLI,
/// and the FFI tick call.
///
/// [`EventSink`]: crate::sink::EventSink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Dwell completion for the active phase, clamped to [0,1]
    Progress { ratio: f32 },
    /// The machine moved to a new state
    StateChanged {
        state: InteractionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        selection: Option<u8>,
    },
    /// A selection was confirmed; emitted exactly once per cycle
    Activated { selection: u8 },
}

/// An engine event stamped with its tick time, milliseconds from session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub t_ms: u64,
    #[serde(flatten)]
    pub event: EngineEvent,
}

/// Identifies the engine build that produced a status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerInfo {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Point-in-time snapshot of the engine, for embedders and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub producer: ProducerInfo,
    pub state: InteractionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<u8>,
    pub hand_detected: bool,
    /// Active stability strategy ("hold" or "vote")
    pub strategy: String,
    /// Milliseconds since the last frame with a detected hand
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_age_ms: Option<i64>,
    /// When the last hand-bearing frame arrived (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at_utc: Option<String>,
    /// When this snapshot was taken (RFC 3339)
    pub computed_at_utc: String,
}
