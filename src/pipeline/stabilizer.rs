use std::collections::VecDeque;

use crate::labels::GestureId;
use crate::models::{Decision, Sample};

use super::config::StabilizerConfig;

/// Result of folding one sample into the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StabilizerOutput {
    /// Confidence below the invalid threshold; window was cleared.
    Invalid,
    /// Sample accepted but no decision yet.
    Pending,
    Stable(Decision),
}

/// Smooths noisy per-frame classifications into at most one decision per
/// offered sample.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    config: StabilizerConfig,
    window: VecDeque<Sample>,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        let capacity = config.window_capacity.max(1);
        Self {
            config,
            window: VecDeque::with_capacity(capacity),
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Drop everything in the window (no hand / multiple hands).
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn offer(&mut self, sample: Sample) -> StabilizerOutput {
        if sample.confidence < self.config.invalid_threshold {
            self.window.clear();
            return StabilizerOutput::Invalid;
        }

        if self.window.len() >= self.config.window_capacity.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(sample);

        if self.window.len() < self.config.stable_frames {
            return StabilizerOutput::Pending;
        }

        match self.majority() {
            Some((label, count, average))
                if count >= self.config.stable_frames
                    && average > self.config.confidence_threshold =>
            {
                StabilizerOutput::Stable(Decision {
                    label,
                    average_confidence: average,
                })
            }
            _ => StabilizerOutput::Pending,
        }
    }

    /// Majority label, its count, and the mean confidence of the samples
    /// carrying it. Ties go to the label seen most recently.
    fn majority(&self) -> Option<(GestureId, usize, f32)> {
        // (label, count, confidence sum, index of latest occurrence)
        let mut tally: Vec<(GestureId, usize, f32, usize)> = Vec::new();
        for (index, sample) in self.window.iter().enumerate() {
            match tally.iter_mut().find(|entry| entry.0 == sample.label) {
                Some(entry) => {
                    entry.1 += 1;
                    entry.2 += sample.confidence;
                    entry.3 = index;
                }
                None => tally.push((sample.label, 1, sample.confidence, index)),
            }
        }

        tally
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.3.cmp(&b.3)))
            .map(|(label, count, sum, _)| (label, count, sum / count as f32))
    }
}
