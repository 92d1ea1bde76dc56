/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Error types for the queue engine.
//!
//! Errors are split the way callers need to treat them:
//!
//! - [`ValidationError`]: malformed caller input, never retried
//! - [`QueueError`]: a domain rule was violated, e.g. an unknown queue
//! - [`StorageError`]: the transaction or the connection failed; the current
//!   operation has been rolled back
//!
//! [`HopperError`] wraps all three and is what every engine operation returns.
//! [`CallbackError`] is deliberately not part of it: a failed completion
//! callback is logged and reported in the submission receipt, never surfaced
//! as a failure of the result write.

use thiserror::Error;

/// Message returned to callers in place of storage failure details.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Top-level error returned by engine operations.
#[derive(Debug, Error)]
pub enum HopperError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The engine could not be set up from its configuration.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl HopperError {
    /// Message suitable for an API response.
    ///
    /// Storage failures are opaque; validation and queue errors carry their
    /// descriptive message.
    pub fn client_message(&self) -> String {
        match self {
            HopperError::Storage(_) | HopperError::Config(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the same call may succeed if the caller tries again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HopperError::Storage(err)
                if !matches!(err, StorageError::PoolBuild(_) | StorageError::InvalidSchema { .. })
        )
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, HopperError::Validation(_) | HopperError::Queue(_))
    }
}

impl From<diesel::result::Error> for HopperError {
    fn from(err: diesel::result::Error) -> Self {
        HopperError::Storage(StorageError::Database(err))
    }
}

impl From<deadpool::managed::PoolError<deadpool_diesel::Error>> for HopperError {
    fn from(err: deadpool::managed::PoolError<deadpool_diesel::Error>) -> Self {
        HopperError::Storage(err.into())
    }
}

impl From<deadpool_diesel::InteractError> for HopperError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        HopperError::Storage(err.into())
    }
}

/// Malformed caller input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Queue type must be a non-empty string")]
    EmptyQueueType,

    #[error("Task list must contain at least one task")]
    EmptyTaskList,

    #[error("Task at position {index} has an empty taskId")]
    EmptyTaskId { index: usize },

    #[error("expiryTime must be a positive number of milliseconds, got {0}")]
    InvalidExpiryTime(i64),

    #[error("Invalid callback URL '{url}': {reason}")]
    InvalidCallbackUrl { url: String, reason: String },

    #[error("Tags must be non-empty strings")]
    EmptyTag,

    #[error("At least one tag is required to claim by tags")]
    EmptyTagSelector,

    #[error("{field} is {len} characters long, the limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Domain-rule violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue {0} does not exist")]
    QueueNotFound(i32),

    #[error("Task {0} does not exist")]
    TaskNotFound(i32),
}

/// Transaction, pool and migration failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Connection interaction failed: {0}")]
    Interaction(String),

    #[error("Failed to build connection pool: {0}")]
    PoolBuild(String),

    #[error("Invalid schema name '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

impl From<deadpool::managed::PoolError<deadpool_diesel::Error>> for StorageError {
    fn from(err: deadpool::managed::PoolError<deadpool_diesel::Error>) -> Self {
        StorageError::ConnectionPool(err.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for StorageError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        StorageError::Interaction(err.to_string())
    }
}

/// Failures delivering a completion callback. Logged only.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Callback request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Callback endpoint responded with status {0}")]
    Status(u16),

    #[error("Failed to build callback client: {0}")]
    Client(String),
}
