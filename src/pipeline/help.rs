use serde::Serialize;
use std::time::{Duration, Instant};

use super::config::HelpConfig;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HelpPhase {
    /// Gesture reference table
    Table,
    /// Short "let's continue" screen before returning to normal
    Resume,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status", content = "phase")]
pub enum HelpStatus {
    Inactive,
    Active(HelpPhase),
}

impl HelpStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, HelpStatus::Active(_))
    }
}

impl Default for HelpStatus {
    fn default() -> Self {
        HelpStatus::Inactive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTransition {
    ToResume,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelpState {
    pub active: bool,
    pub phase: HelpPhase,
    pub phase_started_at: Option<Instant>,
    /// Number of help episodes opened so far.
    pub invalid_count: u64,
}

impl Default for HelpState {
    fn default() -> Self {
        Self {
            active: false,
            phase: HelpPhase::Table,
            phase_started_at: None,
            invalid_count: 0,
        }
    }
}

/// Two-phase guidance overlay driven by sustained low-confidence input.
/// It only reports state; it never gates dispatch.
#[derive(Debug, Clone)]
pub struct HelpStateMachine {
    show_duration: Duration,
    resume_duration: Duration,
    state: HelpState,
}

impl HelpStateMachine {
    pub fn new(config: &HelpConfig) -> Self {
        Self {
            show_duration: config.show_duration(),
            resume_duration: config.resume_duration(),
            state: HelpState::default(),
        }
    }

    pub fn state(&self) -> &HelpState {
        &self.state
    }

    pub fn status(&self) -> HelpStatus {
        if self.state.active {
            HelpStatus::Active(self.state.phase)
        } else {
            HelpStatus::Inactive
        }
    }

    pub fn invalid_count(&self) -> u64 {
        self.state.invalid_count
    }

    /// Returns true when this signal opened a new episode. Signals during an
    /// active episode are ignored.
    pub fn observe_invalid(&mut self, now: Instant) -> bool {
        if self.state.active {
            return false;
        }
        self.state.active = true;
        self.state.phase = HelpPhase::Table;
        self.state.phase_started_at = Some(now);
        self.state.invalid_count += 1;
        true
    }

    /// Advance phase timers. At most one transition per call.
    pub fn tick(&mut self, now: Instant) -> Option<HelpTransition> {
        if !self.state.active {
            return None;
        }
        let started = self.state.phase_started_at?;
        let elapsed = now.saturating_duration_since(started);

        match self.state.phase {
            HelpPhase::Table if elapsed > self.show_duration => {
                self.state.phase = HelpPhase::Resume;
                self.state.phase_started_at = Some(now);
                Some(HelpTransition::ToResume)
            }
            HelpPhase::Resume if elapsed > self.resume_duration => {
                self.state.active = false;
                self.state.phase = HelpPhase::Table;
                self.state.phase_started_at = None;
                Some(HelpTransition::Finished)
            }
            _ => None,
        }
    }
}
