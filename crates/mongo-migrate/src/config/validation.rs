//! Configuration validation.

use super::types::{Settings, MAX_WORKERS, MIN_WORKERS};
use crate::error::{MigrateError, Result};

/// Connection string prefixes the tools understand.
pub const URI_SCHEMES: &[&str] = &["mongodb://", "mongodb+srv://"];

/// Characters MongoDB does not allow in database names.
const FORBIDDEN_DB_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

/// Longest database name MongoDB accepts.
const MAX_DB_NAME_LEN: usize = 63;

/// Check the scheme prefix of a connection string.
pub fn validate_uri(uri: &str) -> Result<()> {
    if uri.is_empty() {
        return Err(MigrateError::Config("connection string is required".into()));
    }
    let Some(scheme) = URI_SCHEMES.iter().find(|s| uri.starts_with(*s)) else {
        return Err(MigrateError::Config(format!(
            "connection string must start with {}",
            URI_SCHEMES.join(" or ")
        )));
    };
    if uri.len() == scheme.len() {
        return Err(MigrateError::Config("connection string has no host".into()));
    }
    Ok(())
}

/// Check a database name against MongoDB naming rules.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("database name is required".into()));
    }
    if name.len() > MAX_DB_NAME_LEN {
        return Err(MigrateError::Config(format!(
            "database name must be at most {} characters",
            MAX_DB_NAME_LEN
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_DB_CHARS.contains(c)) {
        return Err(MigrateError::Config(format!(
            "database name cannot contain {:?}",
            c
        )));
    }
    Ok(())
}

pub fn validate_worker_count(workers: usize) -> Result<()> {
    if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
        return Err(MigrateError::Config(format!(
            "worker count must be between {} and {}, got {}",
            MIN_WORKERS, MAX_WORKERS, workers
        )));
    }
    Ok(())
}

/// Validate a loaded settings file.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    for (name, value) in [
        ("tools.dump", &settings.tools.dump),
        ("tools.restore", &settings.tools.restore),
        ("tools.shell", &settings.tools.shell),
    ] {
        if value.trim().is_empty() {
            return Err(MigrateError::Config(format!("{} cannot be empty", name)));
        }
    }

    if let Some(workers) = settings.default_workers {
        validate_worker_count(workers)
            .map_err(|_| MigrateError::Config(format!(
                "default_workers must be between {} and {}",
                MIN_WORKERS, MAX_WORKERS
            )))?;
    }

    if let Some(0) = settings.item_timeout_secs {
        return Err(MigrateError::Config(
            "item_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}
