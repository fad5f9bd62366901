use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path, path::PathBuf, time::Duration};

use crate::dispatch::{CommandSpec, CommandTable};
use crate::labels::{GestureId, LabelSet};
use crate::metrics::PerformanceTargets;
use crate::pipeline::config::LOW_CONFIDENCE_FACTOR;
use crate::pipeline::{CooldownPolicy, PipelineConfig};

/// Longest accepted status report period (one day).
pub const MAX_REPORT_INTERVAL_SECS: u64 = 86_400;

/// Startup configuration problems. Any of these stops the process before
/// the pipeline runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown gesture label {0:?} in label list")]
    UnknownLabel(String),
    #[error("gesture {0} listed more than once")]
    DuplicateLabel(GestureId),
    #[error("label list is empty")]
    EmptyLabelSet,
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
    #[error("stable_frames ({stable_frames}) must be >= 1 and <= window_capacity ({window_capacity})")]
    InvalidStableFrames {
        stable_frames: usize,
        window_capacity: usize,
    },
    #[error("{name} must be a finite, non-negative, representable number of seconds, got {value}")]
    InvalidDuration { name: String, value: f64 },
    #[error("report_interval_secs must be at most {max}, got {value}")]
    ReportIntervalTooLong { value: u64, max: u64 },
    #[error("no base cooldown configured for {0}")]
    MissingCooldown(GestureId),
    #[error("no player command configured for {0}")]
    MissingCommand(GestureId),
    #[error("player command for {0} must start with a verb")]
    MalformedCommand(GestureId),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchSettings {
    pub socket_path: PathBuf,
    pub response_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Per-gesture replacements for the built-in command table; `null`
    /// removes a gesture's command.
    pub commands: BTreeMap<GestureId, Option<CommandSpec>>,
}

impl DispatchSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_table(&self) -> CommandTable {
        CommandTable::default().with_overrides(&self.commands)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/mpvsocket"),
            response_timeout_ms: 50,
            connect_timeout_ms: 250,
            commands: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Classifier label list; the built-in order is used when unset
    pub labels_path: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub dispatch: DispatchSettings,
    pub targets: PerformanceTargets,
    /// Seconds between status reports while running; 0 disables them
    pub report_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            labels_path: None,
            pipeline: PipelineConfig::default(),
            dispatch: DispatchSettings::default(),
            targets: PerformanceTargets::default(),
            report_interval_secs: 10,
        }
    }
}

impl Settings {
    /// Read settings from a JSON file. Missing fields take their defaults;
    /// a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    pub fn load_labels(&self) -> Result<LabelSet> {
        match &self.labels_path {
            Some(path) => LabelSet::load(path),
            None => Ok(LabelSet::default()),
        }
    }

    pub fn validate(&self, labels: &LabelSet) -> Result<(), ConfigError> {
        let stabilizer = &self.pipeline.stabilizer;
        check_unit("invalid_threshold", stabilizer.invalid_threshold)?;
        check_unit("confidence_threshold", stabilizer.confidence_threshold)?;
        if stabilizer.stable_frames == 0 || stabilizer.window_capacity < stabilizer.stable_frames {
            return Err(ConfigError::InvalidStableFrames {
                stable_frames: stabilizer.stable_frames,
                window_capacity: stabilizer.window_capacity,
            });
        }

        match &self.pipeline.cooldown {
            CooldownPolicy::Adaptive { base_secs } => {
                for gesture in labels.iter() {
                    let secs = base_secs
                        .get(&gesture)
                        .copied()
                        .ok_or(ConfigError::MissingCooldown(gesture))?;
                    check_secs(&format!("cooldown for {gesture}"), secs)?;
                }
            }
            CooldownPolicy::Flat { cooldown_secs } => check_secs("flat cooldown", *cooldown_secs)?,
        }

        let help = &self.pipeline.help;
        check_secs("help show duration", help.show_duration_secs)?;
        check_secs("help resume duration", help.resume_duration_secs)?;

        if self.dispatch.response_timeout_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                name: "response timeout".into(),
                value: 0.0,
            });
        }
        if self.dispatch.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                name: "connect timeout".into(),
                value: 0.0,
            });
        }

        if self.report_interval_secs > MAX_REPORT_INTERVAL_SECS {
            return Err(ConfigError::ReportIntervalTooLong {
                value: self.report_interval_secs,
                max: MAX_REPORT_INTERVAL_SECS,
            });
        }

        self.dispatch.command_table().validate(labels)
    }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange { name, value })
    }
}

/// The low-confidence stretch is the largest multiple a cooldown is ever
/// scaled by, so the stretched value must still fit in a `Duration`.
fn check_secs(name: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && Duration::try_from_secs_f64(value * LOW_CONFIDENCE_FACTOR).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration {
            name: name.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate(&LabelSet::default()).is_ok());
        assert_eq!(settings.dispatch.response_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "pipeline": {{
                    "stabilizer": {{ "stable_frames": 4 }},
                    "cooldown": {{ "policy": "flat", "cooldown_secs": 0.8 }},
                    "help": {{ "enabled": false }}
                }},
                "dispatch": {{ "socket_path": "/run/player.sock" }}
            }}"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.pipeline.stabilizer.stable_frames, 4);
        assert_eq!(settings.pipeline.stabilizer.window_capacity, 5);
        assert_eq!(
            settings.pipeline.cooldown,
            CooldownPolicy::Flat { cooldown_secs: 0.8 }
        );
        assert!(!settings.pipeline.help.enabled);
        assert_eq!(settings.pipeline.help.show_duration_secs, 5.0);
        assert_eq!(settings.dispatch.socket_path, PathBuf::from("/run/player.sock"));
        assert_eq!(settings.report_interval_secs, 10);
        assert!(settings.validate(&LabelSet::default()).is_ok());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"pipeline\": 12 }}").unwrap();
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn adaptive_table_must_cover_every_label() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "pipeline": {{ "cooldown": {{ "policy": "adaptive", "base_secs": {{ "PLAY": 1.0 }} }} }} }}"#
        )
        .unwrap();
        let settings = Settings::load(file.path()).unwrap();

        let only_play = LabelSet::new(vec![GestureId::Play]).unwrap();
        assert!(settings.validate(&only_play).is_ok());
        assert_eq!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::MissingCooldown(GestureId::Pause))
        );
    }

    #[test]
    fn rejects_inconsistent_tunables() {
        let mut settings = Settings::default();
        settings.pipeline.stabilizer.window_capacity = 2;
        assert!(matches!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::InvalidStableFrames { .. })
        ));

        let mut settings = Settings::default();
        settings.pipeline.stabilizer.confidence_threshold = 1.5;
        assert!(matches!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::ThresholdOutOfRange { name: "confidence_threshold", .. })
        ));

        let mut settings = Settings::default();
        settings.pipeline.cooldown = CooldownPolicy::Flat { cooldown_secs: -1.0 };
        assert!(matches!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::InvalidDuration { .. })
        ));

        let mut settings = Settings::default();
        settings.pipeline.help.show_duration_secs = f64::NAN;
        assert!(matches!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::InvalidDuration { .. })
        ));

        let mut settings = Settings::default();
        settings.dispatch.commands.insert(GestureId::Next, None);
        assert_eq!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::MissingCommand(GestureId::Next))
        );
    }

    #[test]
    fn rejects_durations_too_large_to_represent() {
        let mut settings = Settings::default();
        settings.pipeline.cooldown = CooldownPolicy::Flat { cooldown_secs: 1e20 };
        assert!(matches!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::InvalidDuration { .. })
        ));

        let mut settings = Settings::default();
        if let CooldownPolicy::Adaptive { base_secs } = &mut settings.pipeline.cooldown {
            base_secs.insert(GestureId::Stop, 1e20);
        }
        assert!(matches!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::InvalidDuration { .. })
        ));

        let mut settings = Settings::default();
        settings.pipeline.help.resume_duration_secs = f64::MAX;
        assert!(matches!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn report_interval_is_bounded() {
        let mut settings = Settings::default();
        settings.report_interval_secs = MAX_REPORT_INTERVAL_SECS;
        assert!(settings.validate(&LabelSet::default()).is_ok());

        settings.report_interval_secs = u64::MAX;
        assert_eq!(
            settings.validate(&LabelSet::default()),
            Err(ConfigError::ReportIntervalTooLong {
                value: u64::MAX,
                max: MAX_REPORT_INTERVAL_SECS,
            })
        );
    }
}
