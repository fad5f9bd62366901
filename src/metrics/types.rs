use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::labels::GestureId;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub fps: f64,
    pub avg_hand_detection_ms: f64,
    pub avg_inference_ms: f64,
    pub avg_frame_ms: f64,
    /// Hand detection plus inference averages
    pub total_latency_ms: f64,
    pub accuracy_percent: f64,
    pub total_predictions: u64,
    pub executed: u64,
    pub invalid_gestures: u64,
    pub frames: u64,
    pub executions_by_gesture: BTreeMap<GestureId, u64>,
    pub runtime_secs: f64,
    pub system: SystemMetrics,
}

/// Throughput goals the final report is checked against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceTargets {
    pub min_fps: f64,
    pub max_latency_ms: f64,
    pub min_accuracy_percent: f64,
}

impl Default for PerformanceTargets {
    fn default() -> Self {
        Self {
            min_fps: 20.0,
            max_latency_ms: 150.0,
            min_accuracy_percent: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetAssessment {
    pub fps_ok: bool,
    pub latency_ok: bool,
    pub accuracy_ok: bool,
}

impl PerformanceTargets {
    pub fn assess(&self, snapshot: &MetricsSnapshot) -> TargetAssessment {
        TargetAssessment {
            fps_ok: snapshot.fps >= self.min_fps,
            latency_ok: snapshot.total_latency_ms <= self.max_latency_ms,
            accuracy_ok: snapshot.accuracy_percent >= self.min_accuracy_percent,
        }
    }
}
