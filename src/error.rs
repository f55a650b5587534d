//! Error types for Handsel

use thiserror::Error;

/// Errors that can occur at the engine's boundaries
///
/// The per-frame and per-tick paths never fail; invalid input degrades to
/// "no signal" instead. These variants cover construction, configuration,
/// and trace/JSON decoding.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid trace record: {0}")]
    TraceError(String),

    #[error("Invalid landmark buffer: {0}")]
    LandmarkError(String),
}
