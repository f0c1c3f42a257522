//! Stage orchestration.
//!
//! Runs `[Extraction, Transformation, Loading, Delivery]` in order, each as an
//! isolated child process of this same binary. Stages talk to each other only
//! through the files they leave behind, so the orchestrator never looks at a
//! stage's data: it sees an exit status and nothing else.
//!
//! # Failure policy
//!
//! Every stage carries a [`FailurePolicy`]. When a stage does not succeed and
//! its policy is [`FailurePolicy::Halt`], the remaining stages are skipped,
//! except those marked `runs_on_stale_data`, which still run with a warning.
//! With [`FailurePolicy::Continue`] everywhere the orchestrator attempts every
//! stage regardless of earlier outcomes.
//!
//! # Events
//!
//! Each stage appends `START <stage>` and then one of `SUCCESS`, `FAILURE`,
//! `TIMEOUT` or `CANCELLED`; skipped stages append `SKIPPED <stage>`. The run
//! ends with `PIPELINE RUN COMPLETED`.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::audit::AuditLog;
use crate::config::{FailurePolicy, StageSettings, StagesConfig};

pub const COMPLETION_MARKER: &str = "PIPELINE RUN COMPLETED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Transformation,
    Loading,
    Delivery,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Extraction,
        Stage::Transformation,
        Stage::Loading,
        Stage::Delivery,
    ];

    /// CLI subcommand that runs this stage in a child process.
    pub fn subcommand(self) -> &'static str {
        match self {
            Stage::Extraction => "extract",
            Stage::Transformation => "transform",
            Stage::Loading => "load",
            Stage::Delivery => "deliver",
        }
    }

    pub fn settings(self, stages: &StagesConfig) -> &StageSettings {
        match self {
            Stage::Extraction => &stages.extraction,
            Stage::Transformation => &stages.transformation,
            Stage::Loading => &stages.loading,
            Stage::Delivery => &stages.delivery,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "Extraction",
            Stage::Transformation => "Transformation",
            Stage::Loading => "Loading",
            Stage::Delivery => "Delivery",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Success,
    Failure,
    /// Exceeded its timeout and was killed.
    TimedOut,
    /// Not invoked because an upstream stage halted the run.
    Skipped,
    Cancelled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event = match self {
            StageStatus::Success => "SUCCESS",
            StageStatus::Failure => "FAILURE",
            StageStatus::TimedOut => "TIMEOUT",
            StageStatus::Skipped => "SKIPPED",
            StageStatus::Cancelled => "CANCELLED",
        };
        f.write_str(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub name: Stage,
    pub status: StageStatus,
    pub start_time: DateTime<Local>,
    pub elapsed: Duration,
}

/// Append-only record of one end-to-end execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRun {
    pub stages: Vec<StageResult>,
}

impl PipelineRun {
    pub fn all_succeeded(&self) -> bool {
        self.stages.iter().all(|s| s.status == StageStatus::Success)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }
}

/// Runs one stage to completion, timeout, or cancellation.
pub trait StageInvoker {
    async fn invoke(&self, stage: Stage, timeout: Duration, cancel: &CancellationToken) -> StageStatus;
}

/// Invokes stages as child processes: `<program> <base_args..> <subcommand>`.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    program: PathBuf,
    base_args: Vec<String>,
}

impl ProcessInvoker {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Re-invoke the running executable.
    pub fn current_exe(base_args: Vec<String>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, base_args))
    }
}

impl StageInvoker for ProcessInvoker {
    #[instrument(level = "info", skip(self, cancel), fields(program = %self.program.display()))]
    async fn invoke(&self, stage: Stage, timeout: Duration, cancel: &CancellationToken) -> StageStatus {
        let mut child = match Command::new(&self.program)
            .args(&self.base_args)
            .arg(stage.subcommand())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(%stage, error = %e, "Failed to spawn stage process");
                return StageStatus::Failure;
            }
        };

        let outcome = tokio::select! {
            waited = tokio::time::timeout(timeout, child.wait()) => Some(waited),
            _ = cancel.cancelled() => None,
        };

        match outcome {
            Some(Ok(Ok(status))) if status.success() => StageStatus::Success,
            Some(Ok(Ok(status))) => {
                warn!(%stage, code = ?status.code(), "Stage exited unsuccessfully");
                StageStatus::Failure
            }
            Some(Ok(Err(e))) => {
                error!(%stage, error = %e, "Failed waiting for stage process");
                StageStatus::Failure
            }
            Some(Err(_elapsed)) => {
                error!(%stage, ?timeout, "Stage timed out; killing it");
                if let Err(e) = child.kill().await {
                    warn!(%stage, error = %e, "Failed to kill timed-out stage");
                }
                StageStatus::TimedOut
            }
            None => {
                warn!(%stage, "Run cancelled; killing stage");
                if let Err(e) = child.kill().await {
                    warn!(%stage, error = %e, "Failed to kill cancelled stage");
                }
                StageStatus::Cancelled
            }
        }
    }
}

pub struct Orchestrator<I> {
    invoker: I,
    stages: StagesConfig,
    log: AuditLog,
    cancel: CancellationToken,
}

impl<I: StageInvoker> Orchestrator<I> {
    pub fn new(invoker: I, stages: StagesConfig, log: AuditLog, cancel: CancellationToken) -> Self {
        Self {
            invoker,
            stages,
            log,
            cancel,
        }
    }

    /// Attempt every stage in order under its failure policy.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> PipelineRun {
        let mut run = PipelineRun::default();
        let mut halted_by: Option<Stage> = None;

        for stage in Stage::ALL {
            let settings = stage.settings(&self.stages);
            let start_time = Local::now();
            let started = Instant::now();

            let blocked = self.cancel.is_cancelled()
                || (halted_by.is_some() && !settings.runs_on_stale_data);
            if blocked {
                info!(%stage, ?halted_by, "Skipping stage");
                println!("⏭  {stage} skipped.");
                self.event(&format!("{} {stage}", StageStatus::Skipped)).await;
                run.stages.push(StageResult {
                    name: stage,
                    status: StageStatus::Skipped,
                    start_time,
                    elapsed: started.elapsed(),
                });
                continue;
            }
            if let Some(upstream) = halted_by {
                warn!(%stage, %upstream, "Running on stale data after upstream failure");
            }

            self.event(&format!("START {stage}")).await;
            println!("\n🚀 Running {stage}...");
            let status = self
                .invoker
                .invoke(stage, settings.timeout(), &self.cancel)
                .await;
            self.event(&format!("{status} {stage}")).await;

            match status {
                StageStatus::Success => {
                    println!("✅ {stage} completed.");
                    info!(%stage, elapsed = ?started.elapsed(), "Stage succeeded");
                }
                StageStatus::TimedOut => println!("⏱  {stage} timed out."),
                StageStatus::Cancelled => println!("🛑 {stage} cancelled."),
                _ => println!("❌ {stage} failed."),
            }
            if status != StageStatus::Success {
                warn!(%stage, %status, policy = ?settings.on_failure, "Stage did not succeed");
                if settings.on_failure == FailurePolicy::Halt && halted_by.is_none() {
                    halted_by = Some(stage);
                }
            }

            run.stages.push(StageResult {
                name: stage,
                status,
                start_time,
                elapsed: started.elapsed(),
            });
        }

        self.event(COMPLETION_MARKER).await;
        info!(
            succeeded = run.count(StageStatus::Success),
            failed = run.count(StageStatus::Failure),
            timed_out = run.count(StageStatus::TimedOut),
            skipped = run.count(StageStatus::Skipped),
            "Pipeline run completed"
        );
        run
    }

    async fn event(&self, message: &str) {
        if let Err(e) = self.log.event(message).await {
            error!(path = %self.log.path().display(), error = %e, "Failed to append pipeline log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns a scripted status per stage and remembers what it was asked to run.
    #[derive(Default)]
    struct ScriptedInvoker {
        outcomes: Vec<(Stage, StageStatus)>,
        invoked: Mutex<Vec<Stage>>,
    }

    impl ScriptedInvoker {
        fn failing(stage: Stage, status: StageStatus) -> Self {
            Self {
                outcomes: vec![(stage, status)],
                ..Default::default()
            }
        }
    }

    impl StageInvoker for ScriptedInvoker {
        async fn invoke(&self, stage: Stage, _timeout: Duration, _cancel: &CancellationToken) -> StageStatus {
            self.invoked.lock().unwrap().push(stage);
            self.outcomes
                .iter()
                .find(|(s, _)| *s == stage)
                .map(|(_, status)| *status)
                .unwrap_or(StageStatus::Success)
        }
    }

    fn status_of(run: &PipelineRun, stage: Stage) -> Option<StageStatus> {
        run.stages.iter().find(|s| s.name == stage).map(|s| s.status)
    }

    fn log_events(log: &AuditLog) -> Vec<String> {
        std::fs::read_to_string(log.path())
            .unwrap()
            .lines()
            .map(|l| l.split(" | ").nth(1).unwrap().to_string())
            .collect()
    }

    fn continue_everywhere() -> StagesConfig {
        let mut config = crate::config::PipelineConfig::default();
        config.continue_on_failure();
        config.stages
    }

    #[tokio::test]
    async fn test_continue_policy_runs_loading_after_failed_transformation() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("pipeline_log.txt"));
        let invoker = ScriptedInvoker::failing(Stage::Transformation, StageStatus::Failure);
        let orchestrator = Orchestrator::new(invoker, continue_everywhere(), log.clone(), CancellationToken::new());

        let run = orchestrator.run().await;

        assert_eq!(*orchestrator.invoker.invoked.lock().unwrap(), Stage::ALL.to_vec());
        assert_eq!(status_of(&run, Stage::Transformation), Some(StageStatus::Failure));
        assert_eq!(status_of(&run, Stage::Loading), Some(StageStatus::Success));
        let events = log_events(&log);
        let failure = events.iter().position(|e| e == "FAILURE Transformation").unwrap();
        let loading = events.iter().position(|e| e == "START Loading").unwrap();
        assert!(failure < loading);
        assert_eq!(events.last().unwrap(), COMPLETION_MARKER);
    }

    #[tokio::test]
    async fn test_default_policy_halts_data_stages_but_delivers() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("pipeline_log.txt"));
        let invoker = ScriptedInvoker::failing(Stage::Transformation, StageStatus::Failure);
        let orchestrator =
            Orchestrator::new(invoker, StagesConfig::default(), log.clone(), CancellationToken::new());

        let run = orchestrator.run().await;

        assert_eq!(
            *orchestrator.invoker.invoked.lock().unwrap(),
            vec![Stage::Extraction, Stage::Transformation, Stage::Delivery]
        );
        assert_eq!(status_of(&run, Stage::Loading), Some(StageStatus::Skipped));
        assert_eq!(status_of(&run, Stage::Delivery), Some(StageStatus::Success));
        assert!(!run.all_succeeded());
        assert!(log_events(&log).contains(&"SKIPPED Loading".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_is_logged_distinctly() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("pipeline_log.txt"));
        let invoker = ScriptedInvoker::failing(Stage::Extraction, StageStatus::TimedOut);
        let orchestrator =
            Orchestrator::new(invoker, StagesConfig::default(), log.clone(), CancellationToken::new());

        let run = orchestrator.run().await;

        assert_eq!(status_of(&run, Stage::Extraction), Some(StageStatus::TimedOut));
        let events = log_events(&log);
        assert!(events.contains(&"TIMEOUT Extraction".to_string()));
        assert!(!events.iter().any(|e| e.starts_with("FAILURE")));
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_everything_but_still_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("pipeline_log.txt"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator =
            Orchestrator::new(ScriptedInvoker::default(), StagesConfig::default(), log.clone(), cancel);

        let run = orchestrator.run().await;

        assert!(orchestrator.invoker.invoked.lock().unwrap().is_empty());
        assert_eq!(run.count(StageStatus::Skipped), 4);
        assert_eq!(log_events(&log).last().unwrap(), COMPLETION_MARKER);
    }

    #[tokio::test]
    async fn test_all_success_log_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().join("pipeline_log.txt"));
        let orchestrator = Orchestrator::new(
            ScriptedInvoker::default(),
            StagesConfig::default(),
            log.clone(),
            CancellationToken::new(),
        );

        let run = orchestrator.run().await;

        assert!(run.all_succeeded());
        assert_eq!(
            log_events(&log),
            vec![
                "START Extraction",
                "SUCCESS Extraction",
                "START Transformation",
                "SUCCESS Transformation",
                "START Loading",
                "SUCCESS Loading",
                "START Delivery",
                "SUCCESS Delivery",
                COMPLETION_MARKER,
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_invoker_maps_exit_codes() {
        let ok = ProcessInvoker::new("sh", vec!["-c".into(), "exit 0".into(), "sh".into()]);
        let bad = ProcessInvoker::new("sh", vec!["-c".into(), "exit 3".into(), "sh".into()]);
        let cancel = CancellationToken::new();

        assert_eq!(
            ok.invoke(Stage::Extraction, Duration::from_secs(10), &cancel).await,
            StageStatus::Success
        );
        assert_eq!(
            bad.invoke(Stage::Extraction, Duration::from_secs(10), &cancel).await,
            StageStatus::Failure
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_invoker_times_out() {
        let slow = ProcessInvoker::new("sh", vec!["-c".into(), "sleep 5".into(), "sh".into()]);

        let status = slow
            .invoke(Stage::Loading, Duration::from_millis(100), &CancellationToken::new())
            .await;

        assert_eq!(status, StageStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failure() {
        let missing = ProcessInvoker::new("/nonexistent/news_pipeline", vec![]);
        let status = missing
            .invoke(Stage::Extraction, Duration::from_secs(1), &CancellationToken::new())
            .await;
        assert_eq!(status, StageStatus::Failure);
    }
}
