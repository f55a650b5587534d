//! Finger-count classification
//!
//! Derives a discrete 0..=5 finger count from one frame of hand landmarks.
//! A non-thumb finger counts as extended when its tip, PIP, and MCP joints
//! are strictly monotonic top-to-bottom (the finger is straightened toward
//! the top of the image). The thumb instead combines a horizontal
//! distance-from-palm-center test with the same vertical monotonicity.
//!
//! The classifier is pure: no state is carried between frames, and there
//! are no error paths. Landmark sets are trusted as delivered.

use crate::config::EngineConfig;
use crate::types::{landmark, HandLandmarks, RawSignal};

/// Per-frame finger-count classifier
#[derive(Debug, Clone)]
pub struct FingerClassifier {
    thumb_distance_threshold: f32,
    fist_short_circuit: bool,
    palm_min_fingers: u8,
}

/// (tip, pip, mcp) landmark triples for the four non-thumb fingers
const FINGER_JOINTS: [(usize, usize, usize); 4] = [
    (landmark::INDEX_TIP, landmark::INDEX_PIP, landmark::INDEX_MCP),
    (landmark::MIDDLE_TIP, landmark::MIDDLE_PIP, landmark::MIDDLE_MCP),
    (landmark::RING_TIP, landmark::RING_PIP, landmark::RING_MCP),
    (landmark::PINKY_TIP, landmark::PINKY_PIP, landmark::PINKY_MCP),
];

impl FingerClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        FingerClassifier {
            thumb_distance_threshold: config.thumb_distance_threshold,
            fist_short_circuit: config.fist_short_circuit,
            palm_min_fingers: config.palm_min_fingers,
        }
    }

    /// Classify one frame into a raw signal (count plus palm flag)
    pub fn classify(&self, landmarks: &HandLandmarks) -> RawSignal {
        let finger_count = self.count_fingers(landmarks);
        RawSignal {
            finger_count,
            is_palm: finger_count >= self.palm_min_fingers,
        }
    }

    /// Count extended fingers, 0 through 5
    pub fn count_fingers(&self, landmarks: &HandLandmarks) -> u8 {
        let mut count = 0u8;
        for (tip, pip, mcp) in FINGER_JOINTS {
            if finger_extended(landmarks, tip, pip, mcp) {
                count += 1;
            }
        }
        if count == 0 && self.fist_short_circuit {
            return 0;
        }
        if self.thumb_extended(landmarks) {
            count += 1;
        }
        count
    }

    fn thumb_extended(&self, landmarks: &HandLandmarks) -> bool {
        let tip = landmarks[landmark::THUMB_TIP];
        let distance = (tip.x - palm_center_x(landmarks)).abs();
        distance > self.thumb_distance_threshold
            && tip.y < landmarks[landmark::THUMB_IP].y
            && landmarks[landmark::THUMB_IP].y < landmarks[landmark::THUMB_MCP].y
    }
}

fn finger_extended(landmarks: &HandLandmarks, tip: usize, pip: usize, mcp: usize) -> bool {
    landmarks[tip].y < landmarks[pip].y && landmarks[pip].y < landmarks[mcp].y
}

/// Horizontal palm center: mean x of wrist, index MCP, and pinky MCP
fn palm_center_x(landmarks: &HandLandmarks) -> f32 {
    (landmarks[landmark::WRIST].x
        + landmarks[landmark::INDEX_MCP].x
        + landmarks[landmark::PINKY_MCP].x)
        / 3.0
}
