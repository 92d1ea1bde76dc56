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

//! Task model and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Priority assigned to tasks ingested without one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Task lifecycle state.
///
/// `Available -> Processing -> {Completed, Error}`. A processing task whose
/// lease has lapsed is claimable again; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Available,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    /// Every state, in lifecycle order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Available,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Error,
    ];

    /// The string stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Available => "available",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    /// Column strings of the states matching `terminal`.
    pub(crate) fn column_values(terminal: bool) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|status| status.is_terminal() == terminal)
            .map(TaskStatus::as_str)
            .collect()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(TaskStatus::Available),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "error" => Ok(TaskStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A task submitted for ingestion.
///
/// Accepted in the `{taskId, params, priority?}` shape producers send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub task_id: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl NewTask {
    pub fn new(task_id: impl Into<String>, params: Value) -> Self {
        Self {
            task_id: task_id.into(),
            params,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

/// A task handed to a worker by a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedTask {
    /// Row id used when submitting the result.
    pub id: i32,
    pub task_id: String,
    pub params: Value,
    pub priority: i32,
    pub queue_id: i32,
    pub queue_type: String,
    pub start_time: DateTime<Utc>,
    /// When the lease lapses and the task becomes claimable again.
    pub expiry_time: DateTime<Utc>,
}

/// Outcome of a bulk ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub queue_id: i32,
    pub inserted: usize,
    pub batches: usize,
}
