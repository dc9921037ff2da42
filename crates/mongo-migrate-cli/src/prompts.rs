//! Terminal prompts for connection details, worker count and confirmations.

use dialoguer::{Confirm, Input, Select};
use mongo_migrate::config::{validate_database_name, validate_uri, validate_worker_count};
use mongo_migrate::{
    mask_uri, ConnectionSpec, MigrateError, PredefinedConnections, Prompter, Result, RunSummary,
    Side, MAX_WORKERS, MIN_WORKERS,
};
use std::io;

/// [`Prompter`] backed by dialoguer. Invalid input is re-prompted in place.
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for DialoguerPrompter {
    fn connection(&mut self, side: Side, predefined: &PredefinedConnections) -> Result<ConnectionSpec> {
        let title = match side {
            Side::Source => "Source",
            Side::Destination => "Destination",
        };
        println!();
        println!("{} Database", title);
        println!("{}", "-".repeat(title.len() + 9));

        let (uri, label) = if predefined.is_empty() {
            (prompt_uri()?, side.to_string())
        } else {
            let mut options: Vec<String> = predefined
                .iter()
                .map(|c| format!("{} ({})", c.label, mask_uri(&c.uri)))
                .collect();
            options.push("Enter connection string manually".to_string());

            let choice = Select::new()
                .with_prompt("  Connection")
                .items(&options)
                .default(0)
                .interact()
                .map_err(prompt_error)?;

            match predefined.iter().nth(choice) {
                Some(connection) => (connection.uri, connection.label),
                None => (prompt_uri()?, side.to_string()),
            }
        };

        let database: String = Input::new()
            .with_prompt("  Database")
            .validate_with(|name: &String| -> std::result::Result<(), String> {
                validate_database_name(name.trim()).map_err(|e| e.to_string())
            })
            .interact_text()
            .map_err(prompt_error)?;

        ConnectionSpec::new(uri, database, label)
    }

    fn worker_count(&mut self, default: usize) -> Result<usize> {
        println!();
        Input::new()
            .with_prompt(format!("Parallel workers ({}-{})", MIN_WORKERS, MAX_WORKERS))
            .default(default)
            .validate_with(|n: &usize| -> std::result::Result<(), String> {
                validate_worker_count(*n).map_err(|e| e.to_string())
            })
            .interact_text()
            .map_err(prompt_error)
    }

    fn drop_destination(&mut self, destination: &ConnectionSpec) -> Result<bool> {
        Confirm::new()
            .with_prompt(format!(
                "Drop the entire destination database '{}' before restoring? This cannot be undone",
                destination.database()
            ))
            .default(false)
            .interact()
            .map_err(prompt_error)
    }

    fn confirm(&mut self, summary: &RunSummary) -> Result<bool> {
        println!();
        println!("Migration Summary");
        println!("=================");
        print!("{}", summary);
        println!();

        Confirm::new()
            .with_prompt("Start migration?")
            .default(false)
            .interact()
            .map_err(prompt_error)
    }
}

fn prompt_uri() -> Result<String> {
    Input::new()
        .with_prompt("  Connection string (mongodb://...)")
        .validate_with(|uri: &String| -> std::result::Result<(), String> {
            validate_uri(uri.trim()).map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(prompt_error)
}

/// Ctrl-C inside a raw-mode prompt surfaces as an interrupted read.
fn prompt_error(err: dialoguer::Error) -> MigrateError {
    match err {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => MigrateError::Interrupted,
        dialoguer::Error::IO(e) => MigrateError::Prompt(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_read_is_interrupt() {
        let err = prompt_error(dialoguer::Error::IO(io::Error::new(
            io::ErrorKind::Interrupted,
            "read interrupted",
        )));
        assert!(matches!(err, MigrateError::Interrupted));
        assert_eq!(err.exit_code(), 130);
    }

    #[test]
    fn test_other_io_error_is_prompt_error() {
        let err = prompt_error(dialoguer::Error::IO(io::Error::new(
            io::ErrorKind::NotConnected,
            "not a terminal",
        )));
        assert!(matches!(err, MigrateError::Prompt(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
