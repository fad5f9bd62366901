use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::dispatch::{CommandSink, DispatchOutcome};
use crate::labels::{LabelSet, GESTURE_GUIDE};
use crate::metrics::{FinalReport, PerformanceTargets};
use crate::pipeline::{FrameOutcome, GesturePipeline, HelpTransition};

use super::input::decode_line;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Status report period; `None` disables periodic reports.
    pub report_interval: Option<Duration>,
    pub targets: PerformanceTargets,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            report_interval: Some(Duration::from_secs(10)),
            targets: PerformanceTargets::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "detail")]
pub enum SessionEnd {
    InputExhausted,
    Cancelled,
    ReadError(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end: SessionEnd,
    pub lines_read: u64,
    pub frames_processed: u64,
    pub rejected_lines: u64,
    /// Decisions dropped because the label set and command table disagree
    pub aborted_cycles: u64,
    pub report: FinalReport,
}

#[derive(Default)]
struct LineCounters {
    lines_read: u64,
    frames_processed: u64,
    rejected_lines: u64,
    aborted_cycles: u64,
}

async fn next_report(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Feed JSON frame lines through the pipeline until the input ends or the
/// token is cancelled.
pub async fn session_loop<R, S, C>(
    session_id: Uuid,
    input: R,
    mut pipeline: GesturePipeline<S, C>,
    labels: LabelSet,
    options: SessionOptions,
    cancel_token: CancellationToken,
) -> SessionSummary
where
    R: AsyncBufRead + Unpin,
    S: CommandSink,
    C: Clock,
{
    let started_at = Utc::now();
    let mut lines = input.lines();
    let mut counters = LineCounters::default();

    let mut ticker = options
        .report_interval
        .filter(|d| !d.is_zero())
        .and_then(|period| Some((Instant::now().checked_add(period)?, period)))
        .map(|(start, period)| {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

    log_info!("session {} started with {} labels", session_id, labels.len());

    let end = loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("session loop shutting down");
                break SessionEnd::Cancelled;
            }
            _ = next_report(&mut ticker) => {
                log_status(&mut pipeline);
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    counters.lines_read += 1;
                    handle_line(&line, &labels, &mut pipeline, &mut counters).await;
                }
                Ok(None) => break SessionEnd::InputExhausted,
                Err(err) => {
                    log_error!("frame input read failed for session {}: {err}", session_id);
                    break SessionEnd::ReadError(err.to_string());
                }
            }
        }
    };

    let report = pipeline.report(options.targets);
    log_info!(
        "session {} ended ({:?}): {} frames, {} commands",
        session_id,
        end,
        counters.frames_processed,
        report.metrics.executed
    );

    SessionSummary {
        session_id,
        started_at,
        ended_at: Utc::now(),
        end,
        lines_read: counters.lines_read,
        frames_processed: counters.frames_processed,
        rejected_lines: counters.rejected_lines,
        aborted_cycles: counters.aborted_cycles,
        report,
    }
}

async fn handle_line<S: CommandSink, C: Clock>(
    line: &str,
    labels: &LabelSet,
    pipeline: &mut GesturePipeline<S, C>,
    counters: &mut LineCounters,
) {
    let frame = match decode_line(line, labels, pipeline.clock().now()) {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(err) if err.is_contract_violation() => {
            counters.rejected_lines += 1;
            log_error!("classifier output rejected on line {}: {err}", counters.lines_read);
            return;
        }
        Err(err) => {
            counters.rejected_lines += 1;
            log_warn!("skipping line {}: {err}", counters.lines_read);
            return;
        }
    };

    counters.frames_processed += 1;
    match pipeline.process(frame).await {
        Ok(outcome) => log_outcome(&outcome, pipeline),
        Err(err) => {
            counters.aborted_cycles += 1;
            log_error!("{err}");
        }
    }
}

fn log_outcome<S: CommandSink, C: Clock>(outcome: &FrameOutcome, pipeline: &GesturePipeline<S, C>) {
    if let Some(report) = &outcome.dispatched {
        let confidence = outcome
            .decision
            .map(|d| d.average_confidence)
            .unwrap_or_default();
        let cooldown = pipeline
            .cooldown()
            .effective_cooldown(report.gesture, confidence);
        match &report.outcome {
            DispatchOutcome::Delivered(_) => log_info!(
                "[ACTION] {} | {:.2} | {:.1}ms | {:.1}s | {}",
                report.gesture,
                confidence,
                report.latency_ms,
                cooldown.as_secs_f64(),
                report.description
            ),
            DispatchOutcome::Failed(reason) => log_warn!(
                "[ACTION] {} | {:.2} | failed: {}",
                report.gesture,
                confidence,
                reason
            ),
        }
    } else if outcome.cooldown_blocked {
        if let Some(decision) = outcome.decision {
            log_debug!("{} still cooling down", decision.label);
        }
    }

    if outcome.help_opened {
        log_info!("[HELP] gesture guide");
        for row in GESTURE_GUIDE.iter() {
            log_info!(
                "[HELP]   {:<12} {:<30} {}",
                row.gesture.as_str(),
                row.hand_position,
                row.hand_required
            );
        }
    }
    match outcome.help_transition {
        Some(HelpTransition::ToResume) => log_info!("[HELP] Resuming..."),
        Some(HelpTransition::Finished) => log_debug!("[HELP] overlay cleared"),
        None => {}
    }
}

fn log_status<S: CommandSink, C: Clock>(pipeline: &mut GesturePipeline<S, C>) {
    let snapshot = pipeline.metrics_snapshot();
    log_info!(
        "[STATUS] FPS {:.1} | latency {:.1}ms | accuracy {:.1}% | commands {} | help {} | CPU {:.1}% | {:.1} MB",
        snapshot.fps,
        snapshot.total_latency_ms,
        snapshot.accuracy_percent,
        snapshot.executed,
        pipeline.invalid_count(),
        snapshot.system.cpu_percent,
        snapshot.system.memory_mb
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::testing::RecordingSink;
    use crate::dispatch::{ActionDispatcher, CommandTable};
    use crate::labels::GestureId;
    use crate::pipeline::PipelineConfig;

    fn pipeline(sink: &RecordingSink, clock: &ManualClock) -> GesturePipeline<RecordingSink, ManualClock> {
        GesturePipeline::new(
            &PipelineConfig::default(),
            ActionDispatcher::new(sink.clone(), CommandTable::default()),
            clock.clone(),
        )
    }

    fn pose(label: &str, confidence: f32) -> String {
        format!("{{\"kind\":\"pose\",\"label\":\"{label}\",\"confidence\":{confidence},\"frame_ms\":30.0}}\n")
    }

    #[tokio::test]
    async fn runs_input_to_exhaustion_and_summarizes() {
        let sink = RecordingSink::new();
        let clock = ManualClock::new();
        let mut input = String::new();
        for _ in 0..3 {
            input.push_str(&pose("PLAY", 0.95));
        }
        input.push_str("not json\n");
        input.push_str("{\"kind\":\"no_hand\"}\n");
        input.push('\n');

        let summary = session_loop(
            Uuid::new_v4(),
            input.as_bytes(),
            pipeline(&sink, &clock),
            LabelSet::default(),
            SessionOptions::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.end, SessionEnd::InputExhausted);
        assert_eq!(summary.lines_read, 6);
        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.rejected_lines, 1);
        assert_eq!(summary.aborted_cycles, 0);
        assert_eq!(summary.report.metrics.executed, 1);
        assert_eq!(summary.report.metrics.total_predictions, 3);
        assert_eq!(sink.lines(), vec!["{\"command\":[\"set_property\",\"pause\",false]}\n".to_string()]);
    }

    #[tokio::test]
    async fn unmapped_label_aborts_only_that_cycle() {
        let sink = RecordingSink::new();
        let clock = ManualClock::new();
        let mut table = CommandTable::empty();
        table.insert(GestureId::Play, CommandTable::default().get(GestureId::Play).unwrap().clone());
        let pipeline = GesturePipeline::new(
            &PipelineConfig::default(),
            ActionDispatcher::new(sink.clone(), table),
            clock.clone(),
        );

        let mut input = String::new();
        for _ in 0..3 {
            input.push_str(&pose("STOP", 0.95));
        }
        input.push_str("{\"kind\":\"no_hand\"}\n");
        for _ in 0..3 {
            input.push_str(&pose("PLAY", 0.95));
        }

        let summary = session_loop(
            Uuid::new_v4(),
            input.as_bytes(),
            pipeline,
            LabelSet::default(),
            SessionOptions::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.aborted_cycles, 1);
        assert_eq!(summary.report.metrics.executed, 1);
        assert_eq!(sink.lines().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_a_quiet_input() {
        let sink = RecordingSink::new();
        let clock = ManualClock::new();
        let (reader, _writer) = tokio::io::duplex(64);
        let token = CancellationToken::new();

        let handle = tokio::spawn(session_loop(
            Uuid::new_v4(),
            tokio::io::BufReader::new(reader),
            pipeline(&sink, &clock),
            LabelSet::default(),
            SessionOptions {
                report_interval: None,
                ..SessionOptions::default()
            },
            token.clone(),
        ));

        token.cancel();
        let summary = handle.await.unwrap();
        assert_eq!(summary.end, SessionEnd::Cancelled);
        assert_eq!(summary.frames_processed, 0);
    }
}
