//! [`Catalog`] backed by the MongoDB shell.
//!
//! Each call runs `mongosh <uri> --quiet --norc --eval <script>` where the
//! script prints a single JSON document. The last non-empty stdout line is
//! parsed; anything the shell prints before it is ignored.

use super::{Catalog, CollectionInfo, CollectionKind};
use crate::config::ConnectionSpec;
use crate::error::{MigrateError, Result, Side};
use crate::process::{ProcessRunner, RunOptions};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default budget for a single shell call.
const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RawCollectionInfo {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Catalog that shells out to `mongosh`.
#[derive(Debug, Clone)]
pub struct MongoShellCatalog {
    shell: String,
    options: RunOptions,
}

impl MongoShellCatalog {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            options: RunOptions::new(Some(DEFAULT_SHELL_TIMEOUT), CancellationToken::new()),
        }
    }

    /// Kill running shell calls when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.options.cancel = cancel;
        self
    }

    /// Budget for ping and listing calls. Drops are never timed out.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    async fn eval<T: DeserializeOwned>(&self, conn: &ConnectionSpec, script: &str) -> Result<T> {
        self.eval_with(conn, script, &self.options).await
    }

    async fn eval_with<T: DeserializeOwned>(
        &self,
        conn: &ConnectionSpec,
        script: &str,
        options: &RunOptions,
    ) -> Result<T> {
        debug!("{}: eval on {}", self.shell, conn.masked_uri());
        let stdout = ProcessRunner::capture(&self.shell, &eval_args(conn, script), options).await?;
        parse_last_json(&stdout)
    }
}

#[async_trait]
impl Catalog for MongoShellCatalog {
    async fn ping(&self, side: Side, conn: &ConnectionSpec) -> Result<()> {
        let reply: Value = self
            .eval(conn, PING_SCRIPT)
            .await
            .map_err(|e| MigrateError::connection(side, e.to_string()))?;
        if command_ok(&reply) {
            Ok(())
        } else {
            Err(MigrateError::connection(side, format!("ping returned {}", reply)))
        }
    }

    async fn list_collections(&self, conn: &ConnectionSpec) -> Result<Vec<CollectionInfo>> {
        let script = list_script(conn.database())?;
        let raw: Vec<RawCollectionInfo> = self
            .eval(conn, &script)
            .await
            .map_err(|e| MigrateError::Enumeration(e.to_string()))?;

        info!(
            "Found {} collection entries in {}",
            raw.len(),
            conn.database()
        );
        Ok(raw
            .into_iter()
            .map(|r| CollectionInfo::new(r.name, CollectionKind::from_type_name(&r.kind)))
            .collect())
    }

    async fn drop_database(&self, conn: &ConnectionSpec) -> Result<()> {
        let script = drop_script(conn.database())?;
        // Killing the shell does not stop a drop in progress
        let options = RunOptions::new(None, self.options.cancel.clone());
        let reply: Value = self
            .eval_with(conn, &script, &options)
            .await
            .map_err(|e| MigrateError::Drop(e.to_string()))?;
        if command_ok(&reply) {
            Ok(())
        } else {
            Err(MigrateError::Drop(format!("server replied {}", reply)))
        }
    }
}

const PING_SCRIPT: &str = "JSON.stringify(db.adminCommand({ ping: 1 }))";

fn list_script(database: &str) -> Result<String> {
    Ok(format!(
        "JSON.stringify(db.getSiblingDB({}).getCollectionInfos({{}}, {{ nameOnly: true, authorizedCollections: true }}).map(c => ({{ name: c.name, type: c.type }})))",
        serde_json::to_string(database)?
    ))
}

fn drop_script(database: &str) -> Result<String> {
    Ok(format!(
        "JSON.stringify(db.getSiblingDB({}).dropDatabase())",
        serde_json::to_string(database)?
    ))
}

fn eval_args(conn: &ConnectionSpec, script: &str) -> Vec<String> {
    vec![
        conn.uri().to_string(),
        "--quiet".to_string(),
        "--norc".to_string(),
        "--eval".to_string(),
        script.to_string(),
    ]
}

fn command_ok(reply: &Value) -> bool {
    reply.get("ok").and_then(Value::as_f64) == Some(1.0)
}

fn parse_last_json<T: DeserializeOwned>(stdout: &str) -> Result<T> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| MigrateError::Enumeration("shell produced no output".into()))?;
    Ok(serde_json::from_str(line)?)
}
