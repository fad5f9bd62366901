mod commands;
mod sink;

pub use commands::{probe_command, CommandSpec, CommandTable};
pub use sink::{CommandSink, SinkError, SinkReply, UnixSocketSink};

#[cfg(test)]
pub(crate) use sink::testing;

use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::Instant;

use crate::labels::GestureId;
use crate::metrics::RollingWindow;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const COMMAND_LATENCY_WINDOW: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The label set and the command table disagree; nothing was sent.
    #[error("no command mapped for gesture {0}")]
    UnknownGesture(GestureId),
    #[error("failed to encode command for {gesture}: {source}")]
    Encode {
        gesture: GestureId,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered(SinkReply),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub gesture: GestureId,
    pub success: bool,
    pub latency_ms: f64,
    pub description: String,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub command_count: u64,
    pub failed_commands: u64,
    pub response_timeouts: u64,
    pub commands_by_gesture: BTreeMap<GestureId, u64>,
    pub avg_command_ms: f64,
}

/// Sends the command mapped to a gesture and keeps delivery bookkeeping.
pub struct ActionDispatcher<S> {
    sink: S,
    table: CommandTable,
    command_count: u64,
    failed_commands: u64,
    response_timeouts: u64,
    commands_by_gesture: BTreeMap<GestureId, u64>,
    recent_latencies: RollingWindow,
}

impl<S: CommandSink> ActionDispatcher<S> {
    pub fn new(sink: S, table: CommandTable) -> Self {
        Self {
            sink,
            table,
            command_count: 0,
            failed_commands: 0,
            response_timeouts: 0,
            commands_by_gesture: BTreeMap::new(),
            recent_latencies: RollingWindow::new(COMMAND_LATENCY_WINDOW),
        }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Look up the command for a gesture without sending anything.
    pub fn command_for(&self, gesture: GestureId) -> Result<&CommandSpec, DispatchError> {
        self.table
            .get(gesture)
            .ok_or(DispatchError::UnknownGesture(gesture))
    }

    pub async fn dispatch(&mut self, gesture: GestureId) -> Result<DispatchReport, DispatchError> {
        let spec = self.command_for(gesture)?;
        let description = spec.description.clone();
        let line = spec
            .to_request_line()
            .map_err(|source| DispatchError::Encode { gesture, source })?;

        let started = Instant::now();
        let result = self.sink.send(&line).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        *self.commands_by_gesture.entry(gesture).or_insert(0) += 1;

        let (success, outcome) = match result {
            Ok(reply) => {
                self.command_count += 1;
                if reply == SinkReply::NoResponse {
                    self.response_timeouts += 1;
                    log_debug!("no response to {} within timeout, presumed delivered", gesture);
                }
                self.recent_latencies.push(latency_ms);
                (true, DispatchOutcome::Delivered(reply))
            }
            Err(err) => {
                self.failed_commands += 1;
                log_warn!("dispatch of {} failed after {:.1}ms: {err}", gesture, latency_ms);
                (false, DispatchOutcome::Failed(err.to_string()))
            }
        };

        Ok(DispatchReport {
            gesture,
            success,
            latency_ms,
            description,
            outcome,
        })
    }

    /// Ask the player for its pause state; used once at startup.
    pub async fn probe(&self) -> Result<SinkReply, SinkError> {
        let line = probe_command()
            .to_request_line()
            .map_err(|err| SinkError::Io(err.into()))?;
        self.sink.send(&line).await
    }

    pub fn avg_command_ms(&self) -> f64 {
        self.recent_latencies.mean()
    }

    pub fn command_count(&self) -> u64 {
        self.command_count
    }

    pub fn failed_commands(&self) -> u64 {
        self.failed_commands
    }

    pub fn response_timeouts(&self) -> u64 {
        self.response_timeouts
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            command_count: self.command_count,
            failed_commands: self.failed_commands,
            response_timeouts: self.response_timeouts,
            commands_by_gesture: self.commands_by_gesture.clone(),
            avg_command_ms: self.avg_command_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::labels::LabelSet;

    #[tokio::test]
    async fn successful_dispatch_sends_mapped_command() {
        let sink = RecordingSink::new();
        let mut dispatcher = ActionDispatcher::new(sink.clone(), CommandTable::default());

        let report = dispatcher.dispatch(GestureId::SkipLeft).await.unwrap();
        assert!(report.success);
        assert_eq!(report.description, "-5s");
        assert!(report.latency_ms >= 0.0);
        assert_eq!(sink.lines(), vec!["{\"command\":[\"seek\",-5]}\n".to_string()]);
        assert_eq!(dispatcher.command_count(), 1);
        assert_eq!(dispatcher.failed_commands(), 0);
    }

    #[tokio::test]
    async fn unreachable_sink_counts_failure_and_continues() {
        let sink = RecordingSink::new();
        sink.set_unreachable(true);
        let mut dispatcher = ActionDispatcher::new(sink.clone(), CommandTable::default());

        let report = dispatcher.dispatch(GestureId::Stop).await.unwrap();
        assert!(!report.success);
        assert!(matches!(report.outcome, DispatchOutcome::Failed(_)));
        assert_eq!(dispatcher.failed_commands(), 1);
        assert_eq!(dispatcher.command_count(), 0);
        assert_eq!(dispatcher.avg_command_ms(), 0.0);

        sink.set_unreachable(false);
        let report = dispatcher.dispatch(GestureId::Stop).await.unwrap();
        assert!(report.success);
        assert_eq!(dispatcher.stats().commands_by_gesture[&GestureId::Stop], 2);
    }

    #[tokio::test]
    async fn silent_player_counts_as_delivered_with_timeout() {
        let sink = RecordingSink::new();
        sink.set_silent(true);
        let mut dispatcher = ActionDispatcher::new(sink.clone(), CommandTable::default());

        let report = dispatcher.dispatch(GestureId::VolumeUp).await.unwrap();
        assert!(report.success, "no reply within the timeout is not a failure");
        assert_eq!(report.outcome, DispatchOutcome::Delivered(SinkReply::NoResponse));
        assert_eq!(dispatcher.command_count(), 1);
        assert_eq!(dispatcher.response_timeouts(), 1);
        assert_eq!(dispatcher.failed_commands(), 0);
        assert_eq!(sink.lines().len(), 1);
    }

    #[tokio::test]
    async fn unmapped_gesture_is_rejected_without_sending() {
        let sink = RecordingSink::new();
        let labels = LabelSet::new(vec![GestureId::Play]).unwrap();
        let mut table = CommandTable::empty();
        table.insert(GestureId::Play, CommandTable::default().get(GestureId::Play).unwrap().clone());
        assert!(table.validate(&labels).is_ok());

        let mut dispatcher = ActionDispatcher::new(sink.clone(), table);
        let err = dispatcher.dispatch(GestureId::Next).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownGesture(GestureId::Next)));
        assert!(sink.lines().is_empty());
        assert_eq!(dispatcher.failed_commands(), 0);
    }

    #[tokio::test]
    async fn probe_does_not_touch_counters() {
        let sink = RecordingSink::new();
        let dispatcher = ActionDispatcher::new(sink.clone(), CommandTable::default());
        dispatcher.probe().await.unwrap();
        assert_eq!(sink.lines(), vec!["{\"command\":[\"get_property\",\"pause\"]}\n".to_string()]);
        assert_eq!(dispatcher.command_count(), 0);
    }
}
