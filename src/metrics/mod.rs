mod report;
mod types;
mod window;

pub use report::{render_report, FinalReport};
pub use types::{MetricsSnapshot, PerformanceTargets, SystemMetrics, TargetAssessment};
pub use window::RollingWindow;

use std::{
    collections::{BTreeMap, VecDeque},
    time::{Duration, Instant},
};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::labels::GestureId;
use crate::models::FrameTiming;

pub const FRAME_WINDOW: usize = 30;

/// Process CPU/RSS sampler.
pub struct SystemSampler {
    system: System,
    pid: Pid,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // Initial refresh to establish baseline for CPU calculation
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self { system, pid }
    }

    pub fn sample(&mut self) -> SystemMetrics {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]));

        match self.system.process(self.pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling timing windows and cumulative counters. Observability only.
pub struct MetricsAggregator {
    frame_stamps: VecDeque<Instant>,
    window: usize,
    hand_detection: RollingWindow,
    inference: RollingWindow,
    frame_total: RollingWindow,
    total_predictions: u64,
    executed: u64,
    invalid_gestures: u64,
    frames: u64,
    executions_by_gesture: BTreeMap<GestureId, u64>,
    started_at: Instant,
    system: SystemSampler,
}

impl MetricsAggregator {
    pub fn new(started_at: Instant) -> Self {
        Self::with_window(FRAME_WINDOW, started_at)
    }

    pub fn with_window(window: usize, started_at: Instant) -> Self {
        let window = window.max(1);
        Self {
            frame_stamps: VecDeque::with_capacity(window),
            window,
            hand_detection: RollingWindow::new(window),
            inference: RollingWindow::new(window),
            frame_total: RollingWindow::new(window),
            total_predictions: 0,
            executed: 0,
            invalid_gestures: 0,
            frames: 0,
            executions_by_gesture: BTreeMap::new(),
            started_at,
            system: SystemSampler::new(),
        }
    }

    /// Stamp a frame arrival and fold in whatever stage timings it carried.
    pub fn record_frame(&mut self, now: Instant, timing: &FrameTiming) {
        self.frames += 1;
        if self.frame_stamps.len() == self.window {
            self.frame_stamps.pop_front();
        }
        self.frame_stamps.push_back(now);

        if let Some(d) = timing.hand_detection {
            self.hand_detection.push(ms(d));
        }
        if let Some(d) = timing.inference {
            self.inference.push(ms(d));
        }
        if let Some(d) = timing.frame_total {
            self.frame_total.push(ms(d));
        }
    }

    pub fn record_prediction(&mut self) {
        self.total_predictions += 1;
    }

    pub fn record_execution(&mut self, gesture: GestureId) {
        self.executed += 1;
        *self.executions_by_gesture.entry(gesture).or_insert(0) += 1;
    }

    pub fn record_invalid_gesture(&mut self) {
        self.invalid_gestures += 1;
    }

    pub fn fps(&self) -> f64 {
        let (Some(oldest), Some(newest)) = (self.frame_stamps.front(), self.frame_stamps.back())
        else {
            return 0.0;
        };
        if self.frame_stamps.len() < 2 {
            return 0.0;
        }
        let span = newest.saturating_duration_since(*oldest).as_secs_f64();
        if span > 0.0 {
            self.frame_stamps.len() as f64 / span
        } else {
            0.0
        }
    }

    pub fn avg_hand_detection_ms(&self) -> f64 {
        self.hand_detection.mean()
    }

    pub fn avg_inference_ms(&self) -> f64 {
        self.inference.mean()
    }

    pub fn avg_frame_ms(&self) -> f64 {
        self.frame_total.mean()
    }

    pub fn total_latency_ms(&self) -> f64 {
        self.avg_hand_detection_ms() + self.avg_inference_ms()
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_predictions == 0 {
            return 0.0;
        }
        self.executed as f64 / self.total_predictions as f64 * 100.0
    }

    pub fn total_predictions(&self) -> u64 {
        self.total_predictions
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn invalid_gestures(&self) -> u64 {
        self.invalid_gestures
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn runtime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn snapshot(&mut self, now: Instant) -> MetricsSnapshot {
        MetricsSnapshot {
            fps: self.fps(),
            avg_hand_detection_ms: self.avg_hand_detection_ms(),
            avg_inference_ms: self.avg_inference_ms(),
            avg_frame_ms: self.avg_frame_ms(),
            total_latency_ms: self.total_latency_ms(),
            accuracy_percent: self.accuracy(),
            total_predictions: self.total_predictions,
            executed: self.executed,
            invalid_gestures: self.invalid_gestures,
            frames: self.frames,
            executions_by_gesture: self.executions_by_gesture.clone(),
            runtime_secs: self.runtime(now).as_secs_f64(),
            system: self.system.sample(),
        }
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
