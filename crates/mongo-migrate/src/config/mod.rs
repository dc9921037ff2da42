//! Configuration loading and validation.

mod env;
mod mask;
mod types;
mod validation;

pub use env::{PredefinedConnection, PredefinedConnections};
pub use mask::mask_uri;
pub use types::*;
pub use validation::{validate_database_name, validate_uri, validate_worker_count, URI_SCHEMES};

use crate::error::Result;
use std::path::Path;

impl Settings {
    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        validation::validate_settings(self)
    }
}
