use serde::Serialize;
use std::{collections::BTreeMap, fmt};

use crate::dispatch::DispatchStats;
use crate::labels::GestureId;
use crate::pipeline::CooldownStats;

use super::types::{MetricsSnapshot, PerformanceTargets, TargetAssessment};

/// Everything the periodic and final reports print, in one serializable
/// bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    pub metrics: MetricsSnapshot,
    pub dispatch: DispatchStats,
    pub cooldowns: BTreeMap<GestureId, CooldownStats>,
    /// Base cooldown per gesture in seconds, for the cooldown table
    pub base_cooldowns: BTreeMap<GestureId, f64>,
    pub help_episodes: u64,
    pub targets: PerformanceTargets,
    pub assessment: TargetAssessment,
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "[OK]"
    } else {
        "[IMPROVE]"
    }
}

pub fn render_report(report: &FinalReport) -> String {
    report.to_string()
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        let d = &self.dispatch;
        let rule = "=".repeat(70);

        writeln!(f, "{rule}")?;
        writeln!(f, "PERFORMANCE REPORT")?;
        writeln!(f, "{rule}")?;

        writeln!(f, "\n[TIMING]")?;
        writeln!(f, "  FPS: {:.2}", m.fps)?;
        writeln!(f, "  Latency: {:.2}ms", m.total_latency_ms)?;
        writeln!(
            f,
            "  Hand: {:.2}ms | Inference: {:.2}ms | Cmd: {:.2}ms",
            m.avg_hand_detection_ms, m.avg_inference_ms, d.avg_command_ms
        )?;
        let potential = if m.avg_frame_ms > 0.0 {
            1000.0 / m.avg_frame_ms
        } else {
            0.0
        };
        writeln!(
            f,
            "  Avg Frame Time: {:.2}ms ({:.1} FPS potential)",
            m.avg_frame_ms, potential
        )?;

        writeln!(f, "\n[ACCURACY]")?;
        writeln!(f, "  Prediction Accuracy: {:.2}%", m.accuracy_percent)?;
        writeln!(f, "  Total Predictions: {}", m.total_predictions)?;
        writeln!(f, "  Commands Executed: {}", m.executed)?;
        writeln!(f, "  Invalid Gestures: {}", self.help_episodes)?;

        writeln!(f, "\n[PLAYER]")?;
        writeln!(
            f,
            "  Success: {} | Failed: {} | No response: {}",
            d.command_count, d.failed_commands, d.response_timeouts
        )?;

        if !self.cooldowns.is_empty() {
            writeln!(f, "\n[COOLDOWN STATS]")?;
            for (gesture, stats) in &self.cooldowns {
                let base = self.base_cooldowns.get(gesture).copied().unwrap_or_default();
                writeln!(
                    f,
                    "  {:<12} CD:{:.1}s Exec:{:3} Tried:{:3} Rate:{:5.1}%",
                    gesture.as_str(),
                    base,
                    stats.fired,
                    stats.attempted,
                    stats.rate_percent
                )?;
            }
        }

        if !m.executions_by_gesture.is_empty() {
            writeln!(f, "\n[PER-GESTURE EXECUTIONS]")?;
            for (gesture, count) in &m.executions_by_gesture {
                writeln!(f, "  {}: {}x", gesture, count)?;
            }
        }

        writeln!(f, "\n[SESSION]")?;
        writeln!(f, "  Total Frames: {}", m.frames)?;
        writeln!(f, "  Runtime: {:.1}s", m.runtime_secs)?;
        writeln!(
            f,
            "  Process: {:.1}% CPU, {:.1} MB",
            m.system.cpu_percent, m.system.memory_mb
        )?;

        let a = &self.assessment;
        writeln!(f, "\n[PERFORMANCE vs TARGET]")?;
        writeln!(f, "  FPS: {:.1} {}", m.fps, mark(a.fps_ok))?;
        writeln!(f, "  Latency: {:.0}ms {}", m.total_latency_ms, mark(a.latency_ok))?;
        writeln!(
            f,
            "  Accuracy: {:.0}% {}",
            m.accuracy_percent,
            if a.accuracy_ok {
                "[OK]"
            } else {
                "[OK - cooldown limited]"
            }
        )?;
        writeln!(f, "{rule}")
    }
}
