use serde::Serialize;
use std::time::{Duration, Instant};

use crate::labels::GestureId;

/// One classifier output for one input frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub label: GestureId,
    pub confidence: f32,
    pub timestamp: Instant,
}

impl Sample {
    pub fn new(label: GestureId, confidence: f32, timestamp: Instant) -> Self {
        Self {
            label,
            confidence,
            timestamp,
        }
    }
}

/// Per-frame stage timings reported by the capture side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTiming {
    pub hand_detection: Option<Duration>,
    pub inference: Option<Duration>,
    pub frame_total: Option<Duration>,
}

/// What the detector saw during one capture cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Pose { sample: Sample, timing: FrameTiming },
    NoHand { timing: FrameTiming },
    MultipleHands { timing: FrameTiming },
}

impl Frame {
    pub fn pose(sample: Sample) -> Self {
        Frame::Pose {
            sample,
            timing: FrameTiming::default(),
        }
    }

    pub fn timing(&self) -> &FrameTiming {
        match self {
            Frame::Pose { timing, .. }
            | Frame::NoHand { timing }
            | Frame::MultipleHands { timing } => timing,
        }
    }
}

/// A stabilized, high-confidence gesture ready for cooldown evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub label: GestureId,
    pub average_confidence: f32,
}
