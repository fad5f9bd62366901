use anyhow::{Context, Result};
use std::{fs, path::Path};

use super::GestureId;
use crate::settings::ConfigError;

/// Classifier output index -> gesture, in the order of the labels file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<GestureId>,
}

impl LabelSet {
    pub fn new(labels: Vec<GestureId>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::EmptyLabelSet);
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(ConfigError::DuplicateLabel(*label));
            }
        }
        Ok(Self { labels })
    }

    /// Parse one label per line; blank lines are skipped.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let labels = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<GestureId>()
                    .map_err(|err| ConfigError::UnknownLabel(err.0))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(labels)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read gesture labels from {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Invalid gesture labels in {}", path.display()))
    }

    pub fn get(&self, index: usize) -> Option<GestureId> {
        self.labels.get(index).copied()
    }

    pub fn contains(&self, gesture: GestureId) -> bool {
        self.labels.contains(&gesture)
    }

    pub fn iter(&self) -> impl Iterator<Item = GestureId> + '_ {
        self.labels.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Arg-max over a classifier probability vector.
    pub fn arg_max(&self, probabilities: &[f32]) -> Option<(GestureId, f32)> {
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((i, p)),
            })?;
        self.get(index).map(|label| (label, confidence))
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: GestureId::ALL.to_vec(),
        }
    }
}
