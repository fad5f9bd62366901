use serde::Serialize;
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::labels::GestureId;

use super::config::{
    CooldownPolicy, HIGH_CONFIDENCE, HIGH_CONFIDENCE_FACTOR, LOW_CONFIDENCE, LOW_CONFIDENCE_FACTOR,
};

/// Fallback when the adaptive table has no entry for a gesture.
const DEFAULT_BASE_COOLDOWN_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownRecord {
    pub last_fired_at: Option<Instant>,
    pub fired_count: u64,
    pub attempt_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStats {
    pub fired: u64,
    pub attempted: u64,
    pub rate_percent: f64,
}

/// Scale factor applied to the base cooldown for a decision's confidence.
pub fn confidence_adjustment(confidence: f32) -> f64 {
    if confidence > HIGH_CONFIDENCE {
        HIGH_CONFIDENCE_FACTOR
    } else if confidence < LOW_CONFIDENCE {
        LOW_CONFIDENCE_FACTOR
    } else {
        1.0
    }
}

/// Per-gesture rate limiter. Records are created on first attempt and
/// never removed.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    policy: CooldownPolicy,
    records: BTreeMap<GestureId, CooldownRecord>,
}

impl CooldownGate {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            records: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    pub fn base_cooldown(&self, label: GestureId) -> Duration {
        let secs = match &self.policy {
            CooldownPolicy::Adaptive { base_secs } => base_secs
                .get(&label)
                .copied()
                .unwrap_or(DEFAULT_BASE_COOLDOWN_SECS),
            CooldownPolicy::Flat { cooldown_secs } => *cooldown_secs,
        };
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn effective_cooldown(&self, label: GestureId, confidence: f32) -> Duration {
        let base = self.base_cooldown(label);
        match self.policy {
            CooldownPolicy::Adaptive { .. } => {
                Duration::try_from_secs_f64(base.as_secs_f64() * confidence_adjustment(confidence))
                    .unwrap_or(Duration::MAX)
            }
            CooldownPolicy::Flat { .. } => base,
        }
    }

    /// Count an attempt and, if the gesture is out of cooldown, claim the
    /// slot. The slot is claimed before any dispatch happens.
    pub fn try_acquire(&mut self, label: GestureId, confidence: f32, now: Instant) -> bool {
        let cooldown = self.effective_cooldown(label, confidence);
        let record = self.records.entry(label).or_default();
        record.attempt_count += 1;

        let ready = match record.last_fired_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= cooldown,
        };

        if ready {
            record.last_fired_at = Some(now);
            record.fired_count += 1;
        }
        ready
    }

    pub fn record(&self, label: GestureId) -> Option<&CooldownRecord> {
        self.records.get(&label)
    }

    /// Time left before `label` may fire again at the given confidence.
    pub fn remaining(&self, label: GestureId, confidence: f32, now: Instant) -> Duration {
        match self.records.get(&label).and_then(|r| r.last_fired_at) {
            Some(last) => self
                .effective_cooldown(label, confidence)
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn stats(&self) -> BTreeMap<GestureId, CooldownStats> {
        self.records
            .iter()
            .map(|(label, record)| {
                let rate_percent = if record.attempt_count > 0 {
                    record.fired_count as f64 / record.attempt_count as f64 * 100.0
                } else {
                    0.0
                };
                (
                    *label,
                    CooldownStats {
                        fired: record.fired_count,
                        attempted: record.attempt_count,
                        rate_percent,
                    },
                )
            })
            .collect()
    }
}
