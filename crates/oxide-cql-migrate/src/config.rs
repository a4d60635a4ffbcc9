//! Migration configuration and schema files.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use oxide_cql_core::SchemaDescription;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// What to do when the live table differs from the declared schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Refuse to change the table.
    #[default]
    Safe,
    /// Alter the table in place where possible.
    Alter,
    /// Drop and recreate the table.
    Drop,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Any non-production environment.
    #[default]
    Development,
    /// Production: schema changes are never applied.
    Production,
}

impl FromStr for Environment {
    type Err = MigrateError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "development" | "dev" | "test" | "" => Ok(Self::Development),
            other => Err(MigrateError::Config(format!("unknown environment '{other}'"))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Settings of the schema synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Keyspace holding the tables.
    pub keyspace: String,
    /// Migration mode. When unset, `drop_table_on_schema_change` selects
    /// between drop and safe.
    #[serde(default)]
    pub migration: Option<MigrationMode>,
    /// Legacy switch equivalent to the drop mode.
    #[serde(default, alias = "dropTableOnSchemaChange")]
    pub drop_table_on_schema_change: bool,
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,
    /// Accept every confirmation without asking.
    #[serde(default, alias = "disableTTYConfirmation")]
    pub disable_tty_confirmation: bool,
}

impl MigrationConfig {
    /// Creates a safe-mode configuration for a keyspace.
    #[must_use]
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            migration: None,
            drop_table_on_schema_change: false,
            environment: Environment::Development,
            disable_tty_confirmation: false,
        }
    }

    /// Sets the migration mode.
    #[must_use]
    pub const fn migration(mut self, mode: MigrationMode) -> Self {
        self.migration = Some(mode);
        self
    }

    /// Sets the legacy drop switch.
    #[must_use]
    pub const fn drop_table_on_schema_change(mut self, enabled: bool) -> Self {
        self.drop_table_on_schema_change = enabled;
        self
    }

    /// Sets the environment.
    #[must_use]
    pub const fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Accepts every confirmation without asking.
    #[must_use]
    pub const fn disable_tty_confirmation(mut self, disabled: bool) -> Self {
        self.disable_tty_confirmation = disabled;
        self
    }

    /// Returns the mode actually applied. Production is always safe.
    #[must_use]
    pub const fn effective_mode(&self) -> MigrationMode {
        if matches!(self.environment, Environment::Production) {
            return MigrationMode::Safe;
        }
        match self.migration {
            Some(mode) => mode,
            None if self.drop_table_on_schema_change => MigrationMode::Drop,
            None => MigrationMode::Safe,
        }
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Serialization`] for malformed documents and
    /// [`MigrateError::Config`] for an empty keyspace.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.keyspace.trim().is_empty() {
            return Err(MigrateError::Config("keyspace must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Loads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Io`] if the file cannot be read, otherwise
    /// see [`Self::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

/// Loads a schema document from a JSON file.
///
/// # Errors
///
/// Returns [`MigrateError::Io`], [`MigrateError::Serialization`] or the
/// schema validation error.
pub fn load_schema_file(path: impl AsRef<Path>) -> Result<SchemaDescription> {
    let document: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(SchemaDescription::from_json(&document)?)
}
