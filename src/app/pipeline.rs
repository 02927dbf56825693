//! Pipeline orchestration: state machine, stage sequencing, run report
//!
//! One `run` is a single end-to-end execution of ingest → clean → aggregate.
//! Stages are strictly sequential: aggregation needs a fully-written clean
//! partition set, so no stage starts before the previous one reaches its
//! terminal state. On failure the run stops where it is; partial writes are
//! left in place and the report says exactly which stage failed and what was
//! produced. Rollback and retry are the caller's decision.

use crate::app::services::aggregation::{AggregationStage, AggregationStats};
use crate::app::services::audit::AuditSink;
use crate::app::services::cleaning::{CleaningStage, CleaningStats};
use crate::app::services::partition::PartitionStore;
use crate::app::services::source_reader::{CsvSource, RecordSource};
use crate::config::Config;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// =============================================================================
// Run State Machine
// =============================================================================

/// Pipeline run states
///
/// `Idle → Ingesting → Cleaning → Aggregating → Completed`, with `Failed`
/// reachable from every non-terminal state and `Cancelled` entered
/// cooperatively once in-flight batches have completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Ingesting,
    Cleaning,
    Aggregating,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    /// Whether this state ends the run
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    /// Transition table for the strict sequential pipeline
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Ingesting) => true,
            (Ingesting, Cleaning) => true,
            (Cleaning, Aggregating) => true,
            (Aggregating, Completed) => true,
            // Failure and cancellation are reachable from any active state
            (from, Failed) | (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Ingesting => "ingesting",
            RunState::Cleaning => "cleaning",
            RunState::Aggregating => "aggregating",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Stage Statistics and Run Report
// =============================================================================

/// Counters for the ingest stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Data rows read from the source (malformed rows included)
    pub rows_read: usize,
    /// Rows that failed source framing
    pub malformed_rows: usize,
    /// Batches staged into the raw collection
    pub batches_staged: usize,
}

/// Structured summary of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Terminal state of the run
    pub state: RunState,
    /// Stage the run failed or was cancelled in, if any
    pub failed_stage: Option<String>,
    /// Failure reason, if any
    pub failure: Option<String>,
    /// Per-stage elapsed time in seconds, in execution order
    pub stage_elapsed_seconds: Vec<(String, f64)>,
    pub ingest: Option<IngestStats>,
    pub cleaning: Option<CleaningStats>,
    pub aggregation: Option<AggregationStats>,
}

impl RunReport {
    /// Whether the run produced a complete, consistent output
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Whether aggregation views were produced, and from what input.
    /// `Some(true)` means views exist and cover the full clean set.
    pub fn views_produced(&self) -> bool {
        self.aggregation
            .as_ref()
            .map(|a| a.views_written > 0)
            .unwrap_or(false)
    }

    /// Records rejected across the run (validation + duplicates)
    pub fn total_rejected(&self) -> usize {
        self.cleaning
            .as_ref()
            .map(|c| c.total_rejected())
            .unwrap_or(0)
    }

    /// Total elapsed seconds across all stages
    pub fn total_elapsed_seconds(&self) -> f64 {
        self.stage_elapsed_seconds.iter().map(|(_, s)| s).sum()
    }

    /// One-line outcome for logging: distinguishes "completed with N
    /// rejected records" from "failed at stage X"
    pub fn outcome_line(&self) -> String {
        match self.state {
            RunState::Completed => format!(
                "completed with {} rejected records ({} accepted)",
                self.total_rejected(),
                self.cleaning.as_ref().map(|c| c.accepted).unwrap_or(0)
            ),
            RunState::Failed | RunState::Cancelled => {
                let stage = self.failed_stage.as_deref().unwrap_or("unknown");
                let views = if self.views_produced() {
                    "aggregation output from a partial clean set may exist"
                } else {
                    "no aggregation output produced"
                };
                format!("{} at stage {}; {}", self.state, stage, views)
            }
            _ => format!("run in non-terminal state {}", self.state),
        }
    }
}

// =============================================================================
// Stage Runner Abstraction
// =============================================================================

/// The three pipeline stages, abstracted so the orchestrator's state
/// machine can be driven with stubs in tests
#[async_trait]
pub trait StageRunner: Send {
    async fn ingest(&mut self) -> Result<IngestStats>;
    async fn clean(&mut self) -> Result<CleaningStats>;
    async fn aggregate(&mut self) -> Result<AggregationStats>;
}

/// Production stages wired to the real services
pub struct EngineStages {
    config: Config,
    store: Arc<dyn PartitionStore>,
    audit: Arc<dyn AuditSink>,
    cancellation: CancellationToken,
    progress: Option<indicatif::MultiProgress>,
}

impl EngineStages {
    pub fn new(
        config: Config,
        store: Arc<dyn PartitionStore>,
        audit: Arc<dyn AuditSink>,
        cancellation: CancellationToken,
    ) -> Self {
        let progress = config
            .processing
            .show_progress
            .then(indicatif::MultiProgress::new);
        Self {
            config,
            store,
            audit,
            cancellation,
            progress,
        }
    }

    fn progress_bar(&self, total: u64, message: &str) -> Option<indicatif::ProgressBar> {
        let multi = self.progress.as_ref()?;
        Some(multi.add(crate::cli::commands::shared::create_progress_bar(
            total, message,
        )))
    }
}

#[async_trait]
impl StageRunner for EngineStages {
    /// Read the source in bounded chunks and stage the rows verbatim into
    /// the raw collection, clearing any prior staging first
    async fn ingest(&mut self) -> Result<IngestStats> {
        self.store.clear_raw().await?;

        let mut source = CsvSource::open_with_offset(
            &self.config.source.path,
            self.config.source.batch_size,
            self.config.source.resume_offset,
        )?;

        let mut stats = IngestStats::default();
        while let Some(batch) = source.next_batch().await? {
            if self.cancellation.is_cancelled() {
                return Err(Error::interrupted(format!(
                    "ingest cancelled after {} rows",
                    stats.rows_read
                )));
            }

            stats.rows_read += batch.len();
            stats.malformed_rows += batch.iter().filter(|r| r.framing_error.is_some()).count();
            self.store.append_raw_batch(&batch).await?;
            stats.batches_staged += 1;
        }

        info!(
            "Ingest complete: {} rows staged in {} batches ({} malformed)",
            stats.rows_read, stats.batches_staged, stats.malformed_rows
        );
        Ok(stats)
    }

    async fn clean(&mut self) -> Result<CleaningStats> {
        let total = self.store.raw_count().await?;
        let progress = self.progress_bar(total, "Cleaning staged records");
        let stage = CleaningStage::new(&self.config, self.cancellation.clone());
        let stats = stage
            .run(self.store.clone(), self.audit.clone(), progress.clone())
            .await?;
        self.audit.flush().await?;
        if let Some(pb) = progress {
            pb.finish_with_message(format!("Cleaning complete: {} accepted", stats.accepted));
        }
        Ok(stats)
    }

    async fn aggregate(&mut self) -> Result<AggregationStats> {
        let stage = AggregationStage::new(
            self.config.processing.top_users,
            self.cancellation.clone(),
        );
        stage.run(self.store.clone()).await
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives a run through the state machine, one stage at a time
pub struct PipelineOrchestrator<S: StageRunner> {
    stages: S,
    state: RunState,
    cancellation: CancellationToken,
}

impl<S: StageRunner> PipelineOrchestrator<S> {
    pub fn new(stages: S, cancellation: CancellationToken) -> Self {
        Self {
            stages,
            state: RunState::Idle,
            cancellation,
        }
    }

    /// Current state (terminal after `execute` returns)
    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::data_validation(format!(
                "Invalid state transition {} -> {}",
                self.state, next
            )));
        }
        info!("Pipeline state: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Execute the full run and produce its report
    ///
    /// Never returns an error: any stage failure is folded into the report
    /// with the terminal `Failed` (or `Cancelled`) state.
    pub async fn execute(&mut self) -> RunReport {
        let mut report = RunReport {
            state: self.state,
            failed_stage: None,
            failure: None,
            stage_elapsed_seconds: Vec::new(),
            ingest: None,
            cleaning: None,
            aggregation: None,
        };

        // Ingest
        if let Err(e) = self.run_stage(RunState::Ingesting, &mut report).await {
            return self.fail(report, "ingest", e);
        }

        // Clean
        if let Err(e) = self.run_stage(RunState::Cleaning, &mut report).await {
            return self.fail(report, "cleaning", e);
        }

        // Aggregate
        if let Err(e) = self.run_stage(RunState::Aggregating, &mut report).await {
            return self.fail(report, "aggregation", e);
        }

        // The transition table guarantees this cannot fail from Aggregating
        let _ = self.transition(RunState::Completed);
        report.state = self.state;
        info!("Pipeline run {}", report.outcome_line());
        report
    }

    async fn run_stage(&mut self, stage: RunState, report: &mut RunReport) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::interrupted(format!(
                "cancelled before stage {}",
                stage
            )));
        }

        self.transition(stage)?;
        let started = Instant::now();

        let result = match stage {
            RunState::Ingesting => self.stages.ingest().await.map(|s| report.ingest = Some(s)),
            RunState::Cleaning => self.stages.clean().await.map(|s| report.cleaning = Some(s)),
            RunState::Aggregating => self
                .stages
                .aggregate()
                .await
                .map(|s| report.aggregation = Some(s)),
            _ => unreachable!("run_stage called with non-stage state"),
        };

        report
            .stage_elapsed_seconds
            .push((stage.to_string(), started.elapsed().as_secs_f64()));
        result
    }

    /// Fold a stage failure into the terminal report
    fn fail(&mut self, mut report: RunReport, stage: &str, error: Error) -> RunReport {
        let terminal = if matches!(error, Error::Interrupted { .. }) {
            warn!("Pipeline cancelled during {}: {}", stage, error);
            RunState::Cancelled
        } else {
            error!("Pipeline failed during {}: {}", stage, error);
            RunState::Failed
        };

        // Partial writes stay in place; only the state machine moves
        let _ = self.transition(terminal);
        report.state = self.state;
        report.failed_stage = Some(stage.to_string());
        report.failure = Some(error.to_string());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Stage stubs: drive the state machine without any real I/O
    struct StubStages {
        fail_at: Option<RunState>,
        cancel_at: Option<RunState>,
        calls: Vec<RunState>,
    }

    impl StubStages {
        fn new() -> Self {
            Self {
                fail_at: None,
                cancel_at: None,
                calls: Vec::new(),
            }
        }

        fn check(&mut self, stage: RunState) -> Result<()> {
            self.calls.push(stage);
            if self.fail_at == Some(stage) {
                return Err(Error::store_fatal("stub failure"));
            }
            if self.cancel_at == Some(stage) {
                return Err(Error::interrupted("stub cancellation"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StageRunner for StubStages {
        async fn ingest(&mut self) -> Result<IngestStats> {
            self.check(RunState::Ingesting)?;
            Ok(IngestStats {
                rows_read: 10,
                malformed_rows: 0,
                batches_staged: 1,
            })
        }

        async fn clean(&mut self) -> Result<CleaningStats> {
            self.check(RunState::Cleaning)?;
            let mut stats = CleaningStats::new();
            stats.total_input = 10;
            stats.accepted = 9;
            stats.duplicate_count = 1;
            Ok(stats)
        }

        async fn aggregate(&mut self) -> Result<AggregationStats> {
            self.check(RunState::Aggregating)?;
            Ok(AggregationStats {
                input_records: 9,
                views_written: 6,
                ..AggregationStats::default()
            })
        }
    }

    #[test]
    fn test_transition_table() {
        use RunState::*;
        assert!(Idle.can_transition_to(Ingesting));
        assert!(Ingesting.can_transition_to(Cleaning));
        assert!(Cleaning.can_transition_to(Aggregating));
        assert!(Aggregating.can_transition_to(Completed));

        // No stage skipping
        assert!(!Idle.can_transition_to(Cleaning));
        assert!(!Ingesting.can_transition_to(Aggregating));
        assert!(!Cleaning.can_transition_to(Completed));

        // Failure reachable from active states only
        assert!(Idle.can_transition_to(Failed));
        assert!(Aggregating.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Ingesting));

        // Cancellation mirrors failure
        assert!(Cleaning.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cleaning));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Cleaning.is_terminal());
    }

    #[tokio::test]
    async fn test_successful_run_visits_all_stages() {
        let mut orchestrator =
            PipelineOrchestrator::new(StubStages::new(), CancellationToken::new());
        let report = orchestrator.execute().await;

        assert_eq!(report.state, RunState::Completed);
        assert!(report.is_success());
        assert_eq!(
            orchestrator.stages.calls,
            vec![RunState::Ingesting, RunState::Cleaning, RunState::Aggregating]
        );
        assert_eq!(report.stage_elapsed_seconds.len(), 3);
        assert_eq!(report.total_rejected(), 1);
        assert!(report.views_produced());
        assert!(report.outcome_line().contains("completed with 1 rejected"));
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline_at_stage() {
        let mut stages = StubStages::new();
        stages.fail_at = Some(RunState::Cleaning);
        let mut orchestrator = PipelineOrchestrator::new(stages, CancellationToken::new());
        let report = orchestrator.execute().await;

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.failed_stage.as_deref(), Some("cleaning"));
        assert!(report.failure.as_deref().unwrap().contains("stub failure"));
        // Aggregation never ran
        assert_eq!(
            orchestrator.stages.calls,
            vec![RunState::Ingesting, RunState::Cleaning]
        );
        assert!(report.aggregation.is_none());
        assert!(!report.views_produced());
        assert!(report.outcome_line().contains("failed at stage cleaning"));
        assert!(report.outcome_line().contains("no aggregation output"));
    }

    #[tokio::test]
    async fn test_ingest_stats_survive_later_failure() {
        let mut stages = StubStages::new();
        stages.fail_at = Some(RunState::Aggregating);
        let mut orchestrator = PipelineOrchestrator::new(stages, CancellationToken::new());
        let report = orchestrator.execute().await;

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.ingest.as_ref().unwrap().rows_read, 10);
        assert_eq!(report.cleaning.as_ref().unwrap().accepted, 9);
    }

    #[tokio::test]
    async fn test_interrupted_maps_to_cancelled() {
        let mut stages = StubStages::new();
        stages.cancel_at = Some(RunState::Cleaning);
        let mut orchestrator = PipelineOrchestrator::new(stages, CancellationToken::new());
        let report = orchestrator.execute().await;

        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(report.failed_stage.as_deref(), Some("cleaning"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_never_starts_stages() {
        let token = CancellationToken::new();
        token.cancel();
        let mut orchestrator = PipelineOrchestrator::new(StubStages::new(), token);
        let report = orchestrator.execute().await;

        assert_eq!(report.state, RunState::Cancelled);
        assert!(orchestrator.stages.calls.is_empty());
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            state: RunState::Completed,
            failed_stage: None,
            failure: None,
            stage_elapsed_seconds: vec![("ingesting".to_string(), 0.5)],
            ingest: Some(IngestStats::default()),
            cleaning: None,
            aggregation: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"state\":\"completed\""));
    }
}
