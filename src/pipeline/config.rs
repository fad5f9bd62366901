use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

use crate::labels::GestureId;

/// Tunables for the sliding stabilization window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Samples below this confidence are invalid and clear the window
    pub invalid_threshold: f32,

    /// Majority average must be strictly above this to emit a decision
    pub confidence_threshold: f32,

    /// Minimum agreeing samples before a decision can be emitted
    pub stable_frames: usize,

    /// Ring capacity; oldest sample is evicted beyond this
    pub window_capacity: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            invalid_threshold: 0.65,
            confidence_threshold: 0.70,
            stable_frames: 3,
            window_capacity: 5,
        }
    }
}

/// Above this average confidence the cooldown is shortened.
pub const HIGH_CONFIDENCE: f32 = 0.95;
/// Below this average confidence the cooldown is lengthened.
pub const LOW_CONFIDENCE: f32 = 0.80;
pub const HIGH_CONFIDENCE_FACTOR: f64 = 0.9;
pub const LOW_CONFIDENCE_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// Per-gesture base cooldown scaled by decision confidence.
    Adaptive {
        #[serde(default = "default_base_cooldowns")]
        base_secs: BTreeMap<GestureId, f64>,
    },
    /// Same cooldown for every gesture, no confidence scaling.
    Flat {
        #[serde(default = "default_flat_cooldown")]
        cooldown_secs: f64,
    },
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        CooldownPolicy::Adaptive {
            base_secs: default_base_cooldowns(),
        }
    }
}

pub fn default_base_cooldowns() -> BTreeMap<GestureId, f64> {
    BTreeMap::from([
        (GestureId::Play, 1.5),
        (GestureId::Pause, 1.5),
        (GestureId::VolumeUp, 0.4),
        (GestureId::VolumeDown, 0.4),
        (GestureId::SkipRight, 0.3),
        (GestureId::SkipLeft, 0.3),
        (GestureId::Next, 2.0),
        (GestureId::Previous, 2.0),
        (GestureId::Stop, 3.0),
    ])
}

fn default_flat_cooldown() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HelpConfig {
    pub enabled: bool,

    /// How long the gesture table stays up
    pub show_duration_secs: f64,

    /// How long the "let's continue" screen stays up afterwards
    pub resume_duration_secs: f64,
}

impl HelpConfig {
    pub fn show_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.show_duration_secs).unwrap_or(Duration::MAX)
    }

    pub fn resume_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.resume_duration_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for HelpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_duration_secs: 5.0,
            resume_duration_secs: 2.0,
        }
    }
}

/// Everything the decision pipeline needs besides the sink and the clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub stabilizer: StabilizerConfig,
    pub cooldown: CooldownPolicy,
    pub help: HelpConfig,
}
