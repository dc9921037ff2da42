//! # mongo-migrate
//!
//! Parallel MongoDB collection migration driven by the MongoDB database
//! tools.
//!
//! A run dumps the selected collections from a source database with
//! `mongodump` and restores them into a destination database with
//! `mongorestore`, one external process per collection:
//!
//! - **Round-robin distribution** of collections across 1 to 10 workers
//! - **Best-effort phases**: a failing collection never stops its siblings
//! - **Live progress** parsed from tool output
//! - **Scoped dump workspace** removed on every exit path
//! - **Credential masking** wherever a connection string is displayed
//!
//! ## Example
//!
//! ```rust,no_run
//! use mongo_migrate::{
//!     MongoShellCatalog, MongoTools, Orchestrator, PredefinedConnections, RunOutcome, Settings,
//! };
//! # use mongo_migrate::{ItemSelector, Prompter};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(prompter: Box<dyn Prompter>, selector: Box<dyn ItemSelector>) -> mongo_migrate::Result<()> {
//! let settings = Settings::load("settings.yaml")?.with_auto_tuning();
//! let mut orchestrator = Orchestrator::new(
//!     settings.clone(),
//!     PredefinedConnections::from_env(),
//!     prompter,
//!     selector,
//!     Arc::new(MongoShellCatalog::new(&settings.tools.shell)),
//!     Arc::new(MongoTools::new(&settings.tools)),
//! );
//! if let RunOutcome::Completed(report) = orchestrator.run(CancellationToken::new()).await? {
//!     println!("{}", report);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod distribute;
pub mod error;
pub mod interact;
pub mod orchestrator;
pub mod pool;
pub mod process;
pub mod progress;
pub mod tools;

// Re-exports for convenient access
pub use catalog::{Catalog, CollectionInfo, CollectionKind, MongoShellCatalog};
pub use config::{
    mask_uri, ConnectionSpec, MigrationConfig, PredefinedConnection, PredefinedConnections,
    Settings, MAX_WORKERS, MIN_WORKERS,
};
pub use distribute::{distribute, WorkerAssignment};
pub use error::{MigrateError, Result, Side};
pub use interact::{ItemSelector, Prompter, RunSummary, Selection};
pub use orchestrator::{MigrationReport, Orchestrator, RunOutcome, RunState};
pub use pool::{ItemFailure, Phase, PhaseResult, WorkerPool};
pub use process::{ProcessError, ProcessRunner, RunOptions};
pub use progress::{parse_line, ProgressEvent, ProgressKind, ProgressTracker};
pub use tools::{DumpRestore, MongoTools};
