//! Handsel - on-device interaction engine for touchless dwell-gesture selection
//!
//! Handsel turns a noisy per-frame stream of hand-landmark observations into
//! a deliberate, debounced selection of one of five options through a
//! deterministic pipeline: finger-count classification → temporal stability
//! filtering → a tick-driven dwell state machine.
//!
//! ## Modules
//!
//! - **Classifier**: landmark geometry to a discrete 0..=5 finger count
//! - **Stability**: hold and vote debouncing strategies behind one trait
//! - **Fsm**: the idle → select → confirm → activated dwell cycle
//! - **Engine**: the owning controller wiring frames, ticks, and sinks
//! - **Trace**: recorded observation traces and headless replay

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod fsm;
pub mod sink;
pub mod stability;
pub mod trace;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use classifier::FingerClassifier;
pub use config::{EngineConfig, StabilityMode};
pub use engine::{replay_trace, GestureEngine};
pub use error::EngineError;
pub use fsm::{InteractionFsm, TickInput};
pub use sink::{EventSink, MemorySink, NullSink};
pub use stability::{HoldStability, StabilityStrategy, VoteStability};
pub use trace::{parse_ndjson, validate_trace, ObservationRecord, TraceSummary};
pub use types::{
    EngineEvent, EngineStatus, HandLandmarks, InteractionState, Landmark, RawSignal,
    StableSignal, TimedEvent, LANDMARK_COUNT,
};

/// Engine version embedded in status snapshots
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for status snapshots
pub const PRODUCER_NAME: &str = "handsel";
