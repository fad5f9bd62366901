pub mod config;
pub mod cooldown;
pub mod help;
pub mod stabilizer;

pub use config::{CooldownPolicy, HelpConfig, PipelineConfig, StabilizerConfig};
pub use cooldown::{CooldownGate, CooldownRecord, CooldownStats};
pub use help::{HelpPhase, HelpState, HelpStateMachine, HelpStatus, HelpTransition};
pub use stabilizer::{Stabilizer, StabilizerOutput};

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::dispatch::{ActionDispatcher, CommandSink, DispatchError, DispatchReport};
use crate::labels::GestureId;
use crate::metrics::{FinalReport, MetricsAggregator, MetricsSnapshot, PerformanceTargets};
use crate::models::{ActionHistory, ActionHistoryEntry, Decision, Frame};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("decision for {gesture} ({confidence:.2}) aborted: {source}")]
    Dispatch {
        gesture: GestureId,
        confidence: f32,
        #[source]
        source: DispatchError,
    },
}

/// What happened to one frame on its way through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub decision: Option<Decision>,
    /// A decision was produced but its gesture was still cooling down.
    pub cooldown_blocked: bool,
    pub dispatched: Option<DispatchReport>,
    /// This frame's low confidence opened a new help episode.
    pub help_opened: bool,
    pub help_transition: Option<HelpTransition>,
    pub help: HelpStatus,
}

/// Read-only state for whatever draws the overlay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineView {
    pub current_gesture: Option<GestureId>,
    pub current_confidence: f32,
    pub help: HelpStatus,
    pub invalid_count: u64,
    pub recent_actions: Vec<ActionHistoryEntry>,
    pub command_count: u64,
    pub failed_commands: u64,
}

/// Stabilizer -> help/cooldown -> dispatcher -> metrics, one frame at a
/// time. Owns all mutable pipeline state.
pub struct GesturePipeline<S, C> {
    stabilizer: Stabilizer,
    cooldown: CooldownGate,
    help: Option<HelpStateMachine>,
    dispatcher: ActionDispatcher<S>,
    metrics: MetricsAggregator,
    history: ActionHistory,
    clock: C,
    current: Option<Decision>,
}

impl<S: CommandSink, C: Clock> GesturePipeline<S, C> {
    pub fn new(config: &PipelineConfig, dispatcher: ActionDispatcher<S>, clock: C) -> Self {
        let help = config
            .help
            .enabled
            .then(|| HelpStateMachine::new(&config.help));

        Self {
            stabilizer: Stabilizer::new(config.stabilizer.clone()),
            cooldown: CooldownGate::new(config.cooldown.clone()),
            help,
            dispatcher,
            metrics: MetricsAggregator::new(clock.now()),
            history: ActionHistory::default(),
            clock,
            current: None,
        }
    }

    pub async fn process(&mut self, frame: Frame) -> Result<FrameOutcome, PipelineError> {
        let now = self.clock.now();
        self.metrics.record_frame(now, frame.timing());

        let help_transition = self.help.as_mut().and_then(|help| help.tick(now));
        if let Some(transition) = help_transition {
            log_debug!("help overlay transition: {:?}", transition);
        }

        let mut outcome = FrameOutcome {
            decision: None,
            cooldown_blocked: false,
            dispatched: None,
            help_opened: false,
            help_transition,
            help: HelpStatus::Inactive,
        };

        match frame {
            Frame::NoHand { .. } | Frame::MultipleHands { .. } => {
                self.stabilizer.reset();
            }
            Frame::Pose { sample, .. } => {
                self.metrics.record_prediction();

                match self.stabilizer.offer(sample) {
                    StabilizerOutput::Invalid => {
                        self.current = None;
                        if let Some(help) = self.help.as_mut() {
                            if help.observe_invalid(now) {
                                self.metrics.record_invalid_gesture();
                                outcome.help_opened = true;
                                log_warn!(
                                    "Invalid gesture! Confidence: {:.1}%",
                                    sample.confidence * 100.0
                                );
                            }
                        }
                    }
                    StabilizerOutput::Pending => {}
                    StabilizerOutput::Stable(decision) => {
                        self.current = Some(decision);
                        outcome.decision = Some(decision);
                        self.act_on(decision, now, &mut outcome).await?;
                    }
                }
            }
        }

        outcome.help = self.help_status();
        Ok(outcome)
    }

    async fn act_on(
        &mut self,
        decision: Decision,
        now: std::time::Instant,
        outcome: &mut FrameOutcome,
    ) -> Result<(), PipelineError> {
        let Decision {
            label,
            average_confidence,
        } = decision;
        let abort = |source: DispatchError| PipelineError::Dispatch {
            gesture: label,
            confidence: average_confidence,
            source,
        };

        // Resolve before touching the cooldown so an unmapped label leaves
        // no trace in the gate.
        self.dispatcher.command_for(label).map_err(abort)?;

        if !self.cooldown.try_acquire(label, average_confidence, now) {
            outcome.cooldown_blocked = true;
            return Ok(());
        }

        let report = self.dispatcher.dispatch(label).await.map_err(abort)?;
        if report.success {
            self.history.push(ActionHistoryEntry {
                label,
                timestamp: Utc::now(),
                confidence: average_confidence,
                dispatch_latency_ms: report.latency_ms,
                description: report.description.clone(),
            });
            self.metrics.record_execution(label);
        }
        outcome.dispatched = Some(report);
        Ok(())
    }

    pub fn help_status(&self) -> HelpStatus {
        self.help
            .as_ref()
            .map(HelpStateMachine::status)
            .unwrap_or_default()
    }

    pub fn invalid_count(&self) -> u64 {
        self.help
            .as_ref()
            .map(HelpStateMachine::invalid_count)
            .unwrap_or(0)
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    pub fn dispatcher(&self) -> &ActionDispatcher<S> {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn current_decision(&self) -> Option<Decision> {
        self.current
    }

    pub fn view(&self) -> PipelineView {
        PipelineView {
            current_gesture: self.current.map(|d| d.label),
            current_confidence: self.current.map(|d| d.average_confidence).unwrap_or(0.0),
            help: self.help_status(),
            invalid_count: self.invalid_count(),
            recent_actions: self.history.recent(5),
            command_count: self.dispatcher.command_count(),
            failed_commands: self.dispatcher.failed_commands(),
        }
    }

    pub fn metrics_snapshot(&mut self) -> MetricsSnapshot {
        let now = self.clock.now();
        self.metrics.snapshot(now)
    }

    pub fn report(&mut self, targets: PerformanceTargets) -> FinalReport {
        let metrics = self.metrics_snapshot();
        let cooldowns = self.cooldown.stats();
        let base_cooldowns: BTreeMap<GestureId, f64> = cooldowns
            .keys()
            .map(|gesture| (*gesture, self.cooldown.base_cooldown(*gesture).as_secs_f64()))
            .collect();

        FinalReport {
            assessment: targets.assess(&metrics),
            metrics,
            dispatch: self.dispatcher.stats(),
            cooldowns,
            base_cooldowns,
            help_episodes: self.invalid_count(),
            targets,
        }
    }
}
