//! Collection catalog: liveness checks, collection enumeration and the
//! destructive database drop.
//!
//! [`Catalog`] is the seam between the orchestrator and whatever talks to
//! the database. [`MongoShellCatalog`] drives `mongosh`; tests substitute an
//! in-memory implementation.

mod shell;

pub use shell::MongoShellCatalog;

use crate::config::ConnectionSpec;
use crate::error::{Result, Side};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Name prefixes of internal namespaces that are never migrated.
pub const RESERVED_PREFIXES: &[&str] = &["system.", "__"];

/// Internal collection names that are never migrated.
pub const RESERVED_NAMES: &[&str] = &[
    "oplog.rs",
    "startup_log",
    "replset.election",
    "replset.minvalid",
    "replset.initialSyncId",
    "replset.oplogTruncateAfterPoint",
    "fs.chunks",
    "fs.files",
];

/// What kind of object a collection-info entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Collection,
    Timeseries,
    View,
    Other,
}

impl CollectionKind {
    /// Map the `type` field of `listCollections` output.
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "collection" | "" => CollectionKind::Collection,
            "timeseries" => CollectionKind::Timeseries,
            "view" => CollectionKind::View,
            _ => CollectionKind::Other,
        }
    }

    /// Whether the object holds documents of its own.
    pub fn is_data(self) -> bool {
        matches!(self, CollectionKind::Collection | CollectionKind::Timeseries)
    }
}

/// One entry of a database's collection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub kind: CollectionKind,
}

impl CollectionInfo {
    pub fn new(name: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Database operations the orchestrator needs besides dump and restore.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Lightweight liveness check. Never mutates data. Failures are
    /// reported as [`MigrateError::Connection`](crate::MigrateError::Connection) for `side`.
    async fn ping(&self, side: Side, conn: &ConnectionSpec) -> Result<()>;

    /// Every collection-like object in `conn`'s database.
    async fn list_collections(&self, conn: &ConnectionSpec) -> Result<Vec<CollectionInfo>>;

    /// Drop `conn`'s entire database. Irreversible.
    async fn drop_database(&self, conn: &ConnectionSpec) -> Result<()>;
}

/// Whether a collection name is an internal namespace.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|p| name.starts_with(p)) || RESERVED_NAMES.contains(&name)
}

/// Names offered for selection: data collections outside reserved
/// namespaces, de-duplicated and sorted.
pub fn selectable_items(infos: &[CollectionInfo]) -> Vec<String> {
    infos
        .iter()
        .filter(|info| info.kind.is_data() && !is_reserved(&info.name))
        .map(|info| info.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_excludes_system_and_views() {
        let infos = vec![
            CollectionInfo::new("users", CollectionKind::Collection),
            CollectionInfo::new("system.views", CollectionKind::Other),
            CollectionInfo::new("fs.chunks", CollectionKind::Other),
            CollectionInfo::new("oplog.rs", CollectionKind::Other),
            CollectionInfo::new("__schema", CollectionKind::View),
            CollectionInfo::new("orders", CollectionKind::Collection),
        ];
        let selectable: BTreeSet<String> = selectable_items(&infos).into_iter().collect();
        let expected: BTreeSet<String> = ["users", "orders"].iter().map(|s| s.to_string()).collect();
        assert_eq!(selectable, expected);
    }

    #[test]
    fn test_reserved_names_excluded_even_when_flagged_as_data() {
        let infos = vec![
            CollectionInfo::new("system.profile", CollectionKind::Collection),
            CollectionInfo::new("oplog.rs", CollectionKind::Collection),
            CollectionInfo::new("__migrations", CollectionKind::Collection),
            CollectionInfo::new("metrics", CollectionKind::Timeseries),
            CollectionInfo::new("active_users", CollectionKind::View),
        ];
        assert_eq!(selectable_items(&infos), vec!["metrics".to_string()]);
    }

    #[test]
    fn test_names_are_case_sensitive_and_sorted() {
        let infos = vec![
            CollectionInfo::new("b", CollectionKind::Collection),
            CollectionInfo::new("B", CollectionKind::Collection),
            CollectionInfo::new("a", CollectionKind::Collection),
            CollectionInfo::new("a", CollectionKind::Collection),
            CollectionInfo::new("System.notreserved", CollectionKind::Collection),
        ];
        assert_eq!(
            selectable_items(&infos),
            vec!["B", "System.notreserved", "a", "b"]
        );
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(CollectionKind::from_type_name("collection"), CollectionKind::Collection);
        assert_eq!(CollectionKind::from_type_name("view"), CollectionKind::View);
        assert_eq!(CollectionKind::from_type_name("timeseries"), CollectionKind::Timeseries);
        assert_eq!(CollectionKind::from_type_name("weird"), CollectionKind::Other);
        assert!(!CollectionKind::Other.is_data());
    }
}
