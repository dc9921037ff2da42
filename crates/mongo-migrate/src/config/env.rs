//! Predefined connections discovered from `DB_<NAME>_URI` environment entries.

use super::validation::validate_uri;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const PREFIX: &str = "DB_";
const SUFFIX: &str = "_URI";

/// A named connection string offered alongside manual entry.
#[derive(Clone, PartialEq, Eq)]
pub struct PredefinedConnection {
    pub label: String,
    pub uri: String,
}

impl std::fmt::Debug for PredefinedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredefinedConnection")
            .field("label", &self.label)
            .field("uri", &super::mask_uri(&self.uri))
            .finish()
    }
}

/// Immutable label -> connection string map, scanned once at startup.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PredefinedConnections {
    entries: BTreeMap<String, String>,
}

impl std::fmt::Debug for PredefinedConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PredefinedConnections {
    /// Scan the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from arbitrary key/value pairs. Keys that are not
    /// `DB_<NAME>_URI` are ignored; values failing the scheme check are
    /// skipped with a warning.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut entries = BTreeMap::new();
        for (key, value) in vars {
            let Some(label) = label_for(key.as_ref()) else {
                continue;
            };
            let uri = value.as_ref().trim();
            if let Err(e) = validate_uri(uri) {
                warn!("Ignoring {}: {}", key.as_ref(), e);
                continue;
            }
            debug!("Found predefined connection '{}'", label);
            entries.insert(label, uri.to_string());
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Connection string for a label.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    /// Entries in label order.
    pub fn iter(&self) -> impl Iterator<Item = PredefinedConnection> + '_ {
        self.entries.iter().map(|(label, uri)| PredefinedConnection {
            label: label.clone(),
            uri: uri.clone(),
        })
    }
}

/// `DB_PROD_EU_URI` -> `prod-eu`.
fn label_for(key: &str) -> Option<String> {
    let name = key.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase().replace('_', "-"))
}
