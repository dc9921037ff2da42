//! Dump and restore of single collections through the MongoDB database tools.
//!
//! `mongodump --out=<root>` writes `<root>/<database>/<collection>.bson`;
//! restore reads that file back. [`locate_dump_database_dir`] finds the
//! database directory once per restore phase and [`artifact_path`] maps an
//! item to its file inside it.

use crate::config::{ConnectionSpec, ToolSettings};
use crate::error::{MigrateError, Result};
use crate::process::{ProcessRunner, RunOptions};
use crate::progress::ProgressTracker;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extension of a dumped collection.
pub const ARTIFACT_EXTENSION: &str = "bson";

/// Per-item execution context handed to the tools by a worker.
#[derive(Debug, Clone)]
pub struct ItemContext {
    pub worker_id: usize,
    pub options: RunOptions,
}

/// Dumps and restores one collection at a time.
#[async_trait]
pub trait DumpRestore: Send + Sync {
    /// Dump `item` from `source` into `out_dir`.
    async fn dump(
        &self,
        ctx: &ItemContext,
        source: &ConnectionSpec,
        item: &str,
        out_dir: &Path,
    ) -> Result<()>;

    /// Restore `item` into `destination` from the dumped file at `artifact`.
    async fn restore(
        &self,
        ctx: &ItemContext,
        destination: &ConnectionSpec,
        item: &str,
        artifact: &Path,
    ) -> Result<()>;
}

/// [`DumpRestore`] running `mongodump` and `mongorestore`.
#[derive(Debug, Clone)]
pub struct MongoTools {
    dump_program: String,
    restore_program: String,
}

impl MongoTools {
    pub fn new(tools: &ToolSettings) -> Self {
        Self {
            dump_program: tools.dump.clone(),
            restore_program: tools.restore.clone(),
        }
    }

    async fn run_tracked(&self, program: &str, args: &[String], ctx: &ItemContext, item: &str) -> Result<()> {
        let mut tracker = ProgressTracker::new(ctx.worker_id, item);
        let exit = ProcessRunner::run(program, args, &ctx.options, |line| {
            tracker.record(&line.text);
        })
        .await?;

        debug!(
            "[Worker {}] {}: {} exited with code {} after {:.1}s",
            ctx.worker_id,
            item,
            exit.program,
            exit.code,
            exit.duration.as_secs_f64()
        );
        if let (false, Some(n)) = (tracker.is_completed(), tracker.documents()) {
            info!("[Worker {}] {}: {} documents", ctx.worker_id, item, n);
        }
        Ok(())
    }
}

#[async_trait]
impl DumpRestore for MongoTools {
    async fn dump(
        &self,
        ctx: &ItemContext,
        source: &ConnectionSpec,
        item: &str,
        out_dir: &Path,
    ) -> Result<()> {
        let args = dump_args(source, item, out_dir);
        self.run_tracked(&self.dump_program, &args, ctx, item).await
    }

    async fn restore(
        &self,
        ctx: &ItemContext,
        destination: &ConnectionSpec,
        item: &str,
        artifact: &Path,
    ) -> Result<()> {
        let args = restore_args(destination, item, artifact);
        self.run_tracked(&self.restore_program, &args, ctx, item).await
    }
}

/// Arguments for dumping one collection.
pub fn dump_args(source: &ConnectionSpec, item: &str, out_dir: &Path) -> Vec<String> {
    vec![
        format!("--uri={}", source.tool_uri()),
        format!("--db={}", source.database()),
        format!("--collection={}", item),
        format!("--out={}", out_dir.display()),
    ]
}

/// Arguments for restoring one collection from its dumped file.
pub fn restore_args(destination: &ConnectionSpec, item: &str, artifact: &Path) -> Vec<String> {
    vec![
        format!("--uri={}", destination.tool_uri()),
        format!("--db={}", destination.database()),
        format!("--collection={}", item),
        artifact.display().to_string(),
    ]
}

/// Find the database directory inside a dump root.
///
/// Prefers a directory named `expected`; otherwise the root must hold
/// exactly one non-hidden directory.
pub fn locate_dump_database_dir(dump_root: &Path, expected: &str) -> Result<PathBuf> {
    let preferred = dump_root.join(expected);
    if preferred.is_dir() {
        return Ok(preferred);
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dump_root)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_dir() {
            candidates.push(entry.path());
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(MigrateError::DumpLayout(format!(
            "no database directory found in {}",
            dump_root.display()
        ))),
        n => Err(MigrateError::DumpLayout(format!(
            "expected one database directory in {}, found {}",
            dump_root.display(),
            n
        ))),
    }
}

/// Dumped file for `item` inside the database directory.
pub fn artifact_path(database_dir: &Path, item: &str) -> PathBuf {
    database_dir.join(format!("{}.{}", item, ARTIFACT_EXTENSION))
}

/// [`artifact_path`], failing with `ArtifactNotFound` if the file is missing.
pub fn existing_artifact(database_dir: &Path, item: &str) -> Result<PathBuf> {
    let path = artifact_path(database_dir, item);
    if path.is_file() {
        Ok(path)
    } else {
        Err(MigrateError::ArtifactNotFound {
            item: item.to_string(),
            path,
        })
    }
}
