//! Migration orchestrator - the run state machine.
//!
//! `Configuring -> Validating -> SelectingItems -> Confirming -> Dumping ->
//! [DroppingDestination] -> Restoring -> Done`, with `Failed` reachable from
//! every state and `Cancelled` from selection and confirmation. The dump
//! workspace is created right before dumping and removed on every exit path.

mod report;
mod workspace;

pub use report::{EndpointSummary, MigrationReport, PhaseSummary};
pub use workspace::DumpWorkspace;

use crate::catalog::{selectable_items, Catalog};
use crate::config::{ConnectionSpec, MigrationConfig, PredefinedConnections, Settings};
use crate::distribute::distribute;
use crate::error::{MigrateError, Result, Side};
use crate::interact::{ItemSelector, Prompter, RunSummary, Selection};
use crate::pool::{Phase, PhaseResult, WorkerPool};
use crate::process::RunOptions;
use crate::tools::{existing_artifact, locate_dump_database_dir, DumpRestore, ItemContext};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How many times the destination is asked for again when it names the
/// source database.
const MAX_DESTINATION_ATTEMPTS: usize = 3;

/// Where the orchestrator is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Configuring,
    Validating,
    SelectingItems,
    Confirming,
    Dumping,
    DroppingDestination,
    Restoring,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    /// States that block on user input.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            RunState::Configuring | RunState::SelectingItems | RunState::Confirming
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Cancelled)
    }
}

/// How a run ended, short of an error.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Box<MigrationReport>),
    /// The user aborted selection or declined confirmation.
    Cancelled,
}

/// Drives one migration run.
pub struct Orchestrator {
    settings: Settings,
    predefined: PredefinedConnections,
    prompter: Box<dyn Prompter>,
    selector: Box<dyn ItemSelector>,
    catalog: Arc<dyn Catalog>,
    tools: Arc<dyn DumpRestore>,
    state: watch::Sender<RunState>,
    workspace: watch::Sender<Option<PathBuf>>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        predefined: PredefinedConnections,
        prompter: Box<dyn Prompter>,
        selector: Box<dyn ItemSelector>,
        catalog: Arc<dyn Catalog>,
        tools: Arc<dyn DumpRestore>,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Configuring);
        let (workspace, _) = watch::channel(None);
        Self {
            settings,
            predefined,
            prompter,
            selector,
            catalog,
            tools,
            state,
            workspace,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Receiver holding the dump workspace path while one exists. A caller
    /// that exits the process without unwinding removes it with
    /// [`DumpWorkspace::remove_path`].
    pub fn subscribe_workspace(&self) -> watch::Receiver<Option<PathBuf>> {
        self.workspace.subscribe()
    }

    /// Run the migration. Cancelling `cancel` kills running tools, stops
    /// workers from starting new items and ends the run with
    /// [`MigrateError::Interrupted`].
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        info!("Starting migration run: {}", run_id);

        let outcome = self.execute(run_id, &cancel).await;
        self.workspace.send_replace(None);
        let outcome = match outcome {
            Err(_) if cancel.is_cancelled() => Err(MigrateError::Interrupted),
            other => other,
        };

        match &outcome {
            Ok(RunOutcome::Completed(_)) => self.transition(RunState::Done),
            Ok(RunOutcome::Cancelled) => {
                self.transition(RunState::Cancelled);
                info!("Migration cancelled, nothing was changed");
            }
            Err(e) => {
                self.transition(RunState::Failed);
                error!("Migration failed: {}", e);
            }
        }
        outcome
    }

    fn transition(&self, next: RunState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("State: {:?} -> {:?}", previous, next);
        }
    }

    async fn execute(&mut self, run_id: Uuid, cancel: &CancellationToken) -> Result<RunOutcome> {
        let started_at = Utc::now();

        self.transition(RunState::Configuring);
        let config = self.configure()?;
        check_interrupted(cancel)?;

        self.transition(RunState::Validating);
        self.catalog.ping(Side::Source, &config.source).await?;
        info!("Source reachable: {}", config.source.describe());
        self.catalog.ping(Side::Destination, &config.destination).await?;
        info!("Destination reachable: {}", config.destination.describe());
        check_interrupted(cancel)?;

        self.transition(RunState::SelectingItems);
        let items = match self.select_items(&config.source).await? {
            Some(items) => items,
            None => return Ok(RunOutcome::Cancelled),
        };
        check_interrupted(cancel)?;

        self.transition(RunState::Confirming);
        let summary = RunSummary::new(
            &config.source,
            &config.destination,
            &items,
            config.worker_count,
            config.drop_destination_first,
        );
        if !self.prompter.confirm(&summary)? {
            return Ok(RunOutcome::Cancelled);
        }
        check_interrupted(cancel)?;

        let workspace = DumpWorkspace::create(self.settings.temp_dir.as_deref())?;
        self.workspace.send_replace(Some(workspace.path().to_path_buf()));
        let options = RunOptions::new(self.settings.item_timeout(), cancel.clone());

        self.transition(RunState::Dumping);
        let started = Instant::now();
        let (dump_workers, dumped) = self
            .dump_phase(&config, &items, workspace.path(), &options)
            .await;
        let dump = PhaseSummary::new(Phase::Dump, dump_workers, &dumped, started.elapsed());
        check_interrupted(cancel)?;
        fail_on_phase_errors(Phase::Dump, dumped)?;
        let database_dir = locate_dump_database_dir(workspace.path(), config.source.database())?;

        if config.drop_destination_first {
            self.transition(RunState::DroppingDestination);
            warn!(
                "Dropping destination database {}",
                config.destination.describe()
            );
            self.catalog
                .drop_database(&config.destination)
                .await
                .map_err(|e| match e {
                    MigrateError::Drop(_) => e,
                    other => MigrateError::Drop(other.to_string()),
                })?;
            check_interrupted(cancel)?;
        }

        self.transition(RunState::Restoring);
        let started = Instant::now();
        let (restore_workers, restored) = self
            .restore_phase(&config, &items, database_dir, &options)
            .await;
        let restore = PhaseSummary::new(Phase::Restore, restore_workers, &restored, started.elapsed());
        check_interrupted(cancel)?;
        fail_on_phase_errors(Phase::Restore, restored)?;

        workspace.close();
        Ok(RunOutcome::Completed(Box::new(MigrationReport::new(
            run_id, started_at, &config, items, dump, restore,
        ))))
    }

    /// Gather both endpoints, worker count and the drop flag.
    fn configure(&mut self) -> Result<MigrationConfig> {
        let source = self.prompter.connection(Side::Source, &self.predefined)?;
        info!("Source: {}", source.describe());

        let mut destination = None;
        for attempt in 1..=MAX_DESTINATION_ATTEMPTS {
            let candidate = self.prompter.connection(Side::Destination, &self.predefined)?;
            if candidate.uri() == source.uri() && candidate.database() == source.database() {
                warn!(
                    "Destination is the source database ({}), attempt {} of {}",
                    candidate.describe(),
                    attempt,
                    MAX_DESTINATION_ATTEMPTS
                );
                continue;
            }
            destination = Some(candidate);
            break;
        }
        let destination = destination.ok_or_else(|| {
            MigrateError::Config("source and destination cannot be the same database".into())
        })?;
        info!("Destination: {}", destination.describe());

        let workers = self.prompter.worker_count(self.settings.get_default_workers())?;
        let drop_first = self.prompter.drop_destination(&destination)?;

        MigrationConfig::new(source, destination, drop_first, workers)
    }

    /// Enumerate, filter and select. `None` means the user cancelled.
    async fn select_items(&mut self, source: &ConnectionSpec) -> Result<Option<Vec<String>>> {
        let infos = self.catalog.list_collections(source).await?;
        let items = selectable_items(&infos);
        info!(
            "{} of {} collections in {} can be migrated",
            items.len(),
            infos.len(),
            source.database()
        );
        if items.is_empty() {
            return Err(MigrateError::Enumeration(format!(
                "no migratable collections in database {}",
                source.database()
            )));
        }

        let chosen = match self.selector.select(&items)? {
            Selection::Chosen(chosen) => chosen,
            Selection::Cancelled => return Ok(None),
        };

        let chosen: BTreeSet<String> = chosen.into_iter().collect();
        let selected: Vec<String> = items.into_iter().filter(|i| chosen.contains(i)).collect();
        if selected.is_empty() {
            return Err(MigrateError::Config("no collections selected".into()));
        }
        info!("Selected {} collections", selected.len());
        Ok(Some(selected))
    }

    async fn dump_phase(
        &self,
        config: &MigrationConfig,
        items: &[String],
        dump_root: &Path,
        options: &RunOptions,
    ) -> (usize, PhaseResult) {
        let assignments = distribute(items, config.worker_count);
        let workers = assignments.len();
        let pool = WorkerPool::new(options.cancel.clone());

        let tools = self.tools.clone();
        let source = config.source.clone();
        let dump_root = dump_root.to_path_buf();
        let options = options.clone();

        let result = pool
            .run_phase(Phase::Dump, assignments, move |worker_id, item| {
                let tools = tools.clone();
                let source = source.clone();
                let dump_root = dump_root.clone();
                let ctx = ItemContext {
                    worker_id,
                    options: options.clone(),
                };
                async move { tools.dump(&ctx, &source, &item, &dump_root).await }
            })
            .await;
        (workers, result)
    }

    async fn restore_phase(
        &self,
        config: &MigrationConfig,
        items: &[String],
        database_dir: PathBuf,
        options: &RunOptions,
    ) -> (usize, PhaseResult) {
        info!("Restoring from {}", database_dir.display());

        let assignments = distribute(items, config.worker_count);
        let workers = assignments.len();
        let pool = WorkerPool::new(options.cancel.clone());

        let tools = self.tools.clone();
        let destination = config.destination.clone();
        let options = options.clone();

        let result = pool
            .run_phase(Phase::Restore, assignments, move |worker_id, item| {
                let tools = tools.clone();
                let destination = destination.clone();
                let database_dir = database_dir.clone();
                let ctx = ItemContext {
                    worker_id,
                    options: options.clone(),
                };
                async move {
                    let artifact = existing_artifact(&database_dir, &item)?;
                    tools.restore(&ctx, &destination, &item, &artifact).await
                }
            })
            .await;
        (workers, result)
    }
}

fn check_interrupted(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(MigrateError::Interrupted)
    } else {
        Ok(())
    }
}

/// Log every failed item and turn a non-clean phase into an error.
fn fail_on_phase_errors(phase: Phase, result: PhaseResult) -> Result<()> {
    if result.is_success() {
        return Ok(());
    }
    error!(
        "{} phase: {} of {} collections failed",
        phase,
        result.failed.len(),
        result.total()
    );
    for failure in &result.failed {
        error!(
            "  - {} (worker {}): {}",
            failure.item, failure.worker_id, failure.message
        );
    }
    let total = result.total();
    Err(MigrateError::Phase {
        phase: phase.to_string(),
        failures: result.failed,
        total,
    })
}
