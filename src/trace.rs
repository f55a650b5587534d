//! Recorded observation traces
//!
//! A trace is the serialized form of the frame-source interface: one NDJSON
//! record per processed frame, `{"t_ms": ..., "hand": [...21 landmarks] | null}`,
//! with timestamps in milliseconds from session start. Traces feed
//! [`replay_trace`] and the CLI, and double as test fixtures.
//!
//! [`replay_trace`]: crate::engine::replay_trace

use crate::error::EngineError;
use crate::types::{HandLandmarks, Landmark, LANDMARK_COUNT};
use serde::{Deserialize, Serialize};

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Milliseconds from session start
    pub t_ms: u64,
    /// The detected hand's landmarks, or `null` for a frame without one
    pub hand: Option<Vec<Landmark>>,
}

impl ObservationRecord {
    /// A frame with a detected hand
    pub fn detected(t_ms: u64, landmarks: &HandLandmarks) -> Self {
        ObservationRecord {
            t_ms,
            hand: Some(landmarks.to_vec()),
        }
    }

    /// A frame without a hand
    pub fn lost(t_ms: u64) -> Self {
        ObservationRecord { t_ms, hand: None }
    }

    /// Check the landmark-set length
    pub fn validate(&self) -> Result<(), EngineError> {
        match &self.hand {
            Some(hand) if hand.len() != LANDMARK_COUNT => Err(EngineError::TraceError(format!(
                "record at {}ms has {} landmarks, expected {}",
                self.t_ms,
                hand.len(),
                LANDMARK_COUNT
            ))),
            _ => Ok(()),
        }
    }

    /// The landmark array, if a hand was present
    pub fn landmarks(&self) -> Result<Option<HandLandmarks>, EngineError> {
        match &self.hand {
            None => Ok(None),
            Some(hand) => {
                let landmarks: HandLandmarks =
                    hand.as_slice().try_into().map_err(|_| {
                        EngineError::TraceError(format!(
                            "record at {}ms has {} landmarks, expected {}",
                            self.t_ms,
                            hand.len(),
                            LANDMARK_COUNT
                        ))
                    })?;
                Ok(Some(landmarks))
            }
        }
    }
}

/// Counts reported by [`validate_trace`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub records: usize,
    pub detected_frames: usize,
    pub lost_frames: usize,
    pub duration_ms: u64,
}

/// Parse an NDJSON trace; blank lines are skipped
pub fn parse_ndjson(input: &str) -> Result<Vec<ObservationRecord>, EngineError> {
    let mut records = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ObservationRecord = serde_json::from_str(line)
            .map_err(|e| EngineError::TraceError(format!("line {}: {}", line_no + 1, e)))?;
        records.push(record);
    }
    Ok(records)
}

/// Validate every record and the timestamp ordering, summarizing the trace
pub fn validate_trace(records: &[ObservationRecord]) -> Result<TraceSummary, EngineError> {
    let mut detected = 0usize;
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
        if record.hand.is_some() {
            detected += 1;
        }
    }
    Ok(TraceSummary {
        records: records.len(),
        detected_frames: detected,
        lost_frames: records.len() - detected,
        duration_ms: prev_ms.unwrap_or(0),
    })
}
