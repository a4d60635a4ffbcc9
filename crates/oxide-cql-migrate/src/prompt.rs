//! Confirmation of destructive schema changes.
//!
//! Every schema change other than creating a missing table is confirmed
//! through a [`ConfirmationPrompt`]. An answer of `y` in any letter case
//! accepts the change; anything else refuses it.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// The kind of change being confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Drop the table and create it again.
    RecreateTable,
    /// Add a column.
    AddColumn,
    /// Drop a column with its dependent indexes and views.
    DropColumn,
    /// Change a column type in place.
    AlterColumnType,
    /// Drop a column and add it again with a new definition.
    RecreateColumn,
    /// Drop views that are no longer declared.
    DropViews,
    /// Drop indexes that are no longer declared.
    DropIndexes,
}

/// A question put to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationRequest {
    /// Table being changed.
    pub table: String,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Message shown to the operator.
    pub message: String,
}

impl ConfirmationRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(table: impl Into<String>, kind: ChangeKind, message: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Returns true if an answer accepts the change.
#[must_use]
pub fn is_accepted(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// Asks whether a schema change may proceed.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    /// Returns the operator's answer.
    async fn ask(&self, request: &ConfirmationRequest) -> Result<String>;
}

/// Asks on the terminal: prints the message and reads one line from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

#[async_trait]
impl ConfirmationPrompt for StdinPrompt {
    async fn ask(&self, request: &ConfirmationRequest) -> Result<String> {
        let message = request.message.clone();
        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut stdout = std::io::stdout();
            stdout.write_all(message.as_bytes())?;
            stdout.flush()?;
            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer)?;
            Ok(answer.trim().to_string())
        })
        .await
        .map_err(|e| MigrateError::Prompt(e.to_string()))?
    }
}

/// Accepts every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationPrompt for AutoConfirm {
    async fn ask(&self, _request: &ConfirmationRequest) -> Result<String> {
        Ok("y".to_string())
    }
}

/// Refuses every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ConfirmationPrompt for DenyAll {
    async fn ask(&self, _request: &ConfirmationRequest) -> Result<String> {
        Ok("n".to_string())
    }
}

/// Accepts only the listed kinds of change.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: HashSet<ChangeKind>,
}

impl AllowList {
    /// Creates a policy accepting the given kinds.
    #[must_use]
    pub fn new(kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        Self {
            allowed: kinds.into_iter().collect(),
        }
    }

    /// Accepts one more kind.
    #[must_use]
    pub fn allow(mut self, kind: ChangeKind) -> Self {
        self.allowed.insert(kind);
        self
    }
}

#[async_trait]
impl ConfirmationPrompt for AllowList {
    async fn ask(&self, request: &ConfirmationRequest) -> Result<String> {
        let answer = if self.allowed.contains(&request.kind) { "y" } else { "n" };
        Ok(answer.to_string())
    }
}
