use anyhow::{bail, Context, Result};
use log::info;
use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::dispatch::CommandSink;
use crate::labels::LabelSet;
use crate::pipeline::GesturePipeline;

use super::loop_worker::{session_loop, SessionOptions, SessionSummary};

/// Owns the background task that runs one session.
pub struct SessionController {
    handle: Option<JoinHandle<SessionSummary>>,
    cancel_token: Option<CancellationToken>,
    session_id: Option<Uuid>,
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            session_id: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn start<R, S, C>(
        &mut self,
        input: R,
        pipeline: GesturePipeline<S, C>,
        labels: LabelSet,
        options: SessionOptions,
    ) -> Result<Uuid>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        S: CommandSink + 'static,
        C: Clock + 'static,
    {
        if self.handle.is_some() {
            bail!("session already active");
        }

        let session_id = Uuid::new_v4();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(session_loop(
            session_id,
            input,
            pipeline,
            labels,
            options,
            cancel_token.clone(),
        ));

        info!("Started session {}", session_id);
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.session_id = Some(session_id);
        Ok(session_id)
    }

    /// Token that stops the running session when cancelled, e.g. from a
    /// Ctrl-C handler.
    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.cancel_token.clone()
    }

    /// Wait for the session to end on its own (input exhausted or an
    /// external cancel).
    pub async fn wait(&mut self) -> Result<SessionSummary> {
        let handle = self.handle.take().context("no active session")?;
        self.cancel_token = None;
        self.session_id = None;
        handle.await.context("session loop task failed to join")
    }

    pub async fn stop(&mut self) -> Result<SessionSummary> {
        if let Some(token) = &self.cancel_token {
            token.cancel();
        }
        self.wait().await
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::testing::RecordingSink;
    use crate::dispatch::{ActionDispatcher, CommandTable};
    use crate::pipeline::PipelineConfig;
    use crate::session::SessionEnd;
    use tokio::io::{AsyncWriteExt, BufReader};

    fn pipeline(sink: &RecordingSink) -> GesturePipeline<RecordingSink, ManualClock> {
        GesturePipeline::new(
            &PipelineConfig::default(),
            ActionDispatcher::new(sink.clone(), CommandTable::default()),
            ManualClock::new(),
        )
    }

    #[tokio::test]
    async fn rejects_second_start_and_stops_cleanly() {
        let sink = RecordingSink::new();
        let (reader, mut writer) = tokio::io::duplex(256);
        let mut controller = SessionController::new();

        let id = controller
            .start(BufReader::new(reader), pipeline(&sink), LabelSet::default(), SessionOptions::default())
            .unwrap();
        assert_eq!(controller.session_id(), Some(id));

        let (other, _keep) = tokio::io::duplex(16);
        assert!(controller
            .start(BufReader::new(other), pipeline(&sink), LabelSet::default(), SessionOptions::default())
            .is_err());

        writer.write_all(b"{\"kind\":\"no_hand\"}\n").await.unwrap();
        writer.flush().await.unwrap();

        let summary = controller.stop().await.unwrap();
        assert_eq!(summary.session_id, id);
        assert_eq!(summary.end, SessionEnd::Cancelled);
        assert!(!controller.is_running());
        assert!(controller.stop().await.is_err());
    }

    #[tokio::test]
    async fn wait_returns_when_input_ends() {
        let sink = RecordingSink::new();
        let mut controller = SessionController::new();
        let input: &'static [u8] = b"{\"kind\":\"no_hand\"}\n{\"kind\":\"multiple_hands\"}\n";

        controller
            .start(input, pipeline(&sink), LabelSet::default(), SessionOptions::default())
            .unwrap();
        let summary = controller.wait().await.unwrap();
        assert_eq!(summary.end, SessionEnd::InputExhausted);
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(summary.report.metrics.frames, 2);
    }
}
