pub mod clock;
pub mod dispatch;
pub mod labels;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod settings;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::time::Duration;

use clock::SystemClock;
use dispatch::{ActionDispatcher, SinkReply, UnixSocketSink};
use labels::LabelSet;
use metrics::render_report;
use pipeline::{CooldownPolicy, GesturePipeline};
use session::{SessionController, SessionOptions, SessionSummary};
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "gesture-pilot")]
#[command(about = "Turns classified hand-pose frames into media player commands")]
struct Cli {
    /// Settings JSON file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    /// Player IPC socket path
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Classifier label list, one label per line
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Read frame records from a file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,
    /// Use one cooldown for every gesture, without confidence adjustment
    #[arg(long = "flat-cooldown", value_name = "SECS")]
    flat_cooldown: Option<f64>,
    /// Disable the help overlay
    #[arg(long = "no-help")]
    no_help: bool,
    /// Print the final report as JSON
    #[arg(long = "json-report")]
    json_report: bool,
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(socket) = &self.socket {
            settings.dispatch.socket_path = socket.clone();
        }
        if let Some(labels) = &self.labels {
            settings.labels_path = Some(labels.clone());
        }
        if let Some(cooldown_secs) = self.flat_cooldown {
            settings.pipeline.cooldown = CooldownPolicy::Flat { cooldown_secs };
        }
        if self.no_help {
            settings.pipeline.help.enabled = false;
        }
        Ok(settings)
    }
}

fn debug_mode(cli: &Cli) -> bool {
    cli.verbose
        || std::env::var("GESTURE_PILOT_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (reads RUST_LOG env var)
    let level = if debug_mode(&cli) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("gesture-pilot starting up...");

    let settings = cli.settings()?;
    let labels = settings.load_labels()?;
    settings
        .validate(&labels)
        .context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let summary = runtime.block_on(run_session(&settings, labels, cli.input.as_deref()));
    shutdown_runtime(runtime);
    let summary = summary?;

    if cli.json_report {
        let json = serde_json::to_string_pretty(&summary).context("failed to encode report")?;
        println!("{json}");
    } else {
        print!("{}", render_report(&summary.report));
    }
    Ok(())
}

/// Grace period for runtime tasks after the session ends. The stdin reader
/// sits in a blocking read that only returns on the next line or EOF.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

fn shutdown_runtime(runtime: tokio::runtime::Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open frame input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

async fn run_session(
    settings: &Settings,
    labels: LabelSet,
    input_path: Option<&Path>,
) -> Result<SessionSummary> {
    let input = open_input(input_path).await?;
    let dispatch = &settings.dispatch;
    let sink = UnixSocketSink::new(
        dispatch.socket_path.clone(),
        dispatch.connect_timeout(),
        dispatch.response_timeout(),
    );
    let dispatcher = ActionDispatcher::new(sink, dispatch.command_table());

    match dispatcher.probe().await {
        Ok(SinkReply::Response(reply)) => {
            log::info!("Player connected on {}: {}", dispatch.socket_path.display(), reply.trim())
        }
        Ok(_) => log::info!("Player socket {} accepted the probe", dispatch.socket_path.display()),
        Err(err) => log::warn!("Player not reachable yet: {err}; commands will be counted as failed"),
    }

    let pipeline = GesturePipeline::new(&settings.pipeline, dispatcher, SystemClock);
    let options = SessionOptions {
        report_interval: (settings.report_interval_secs > 0)
            .then(|| Duration::from_secs(settings.report_interval_secs)),
        targets: settings.targets,
    };

    let mut controller = SessionController::new();
    controller.start(input, pipeline, labels, options)?;

    if let Some(token) = controller.cancel_token() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, finishing session");
                token.cancel();
            }
        });
    }

    controller.wait().await
}
