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

//! Result submission inputs and receipts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::TaskStatus;

/// A worker's report for a claimed task.
///
/// A non-null `error` marks the task as errored and is stored as
/// `{"error": ...}`; otherwise `result` is stored as `{"result": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub id: i32,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ResultSubmission {
    pub fn completed(id: i32, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(id: i32, error: Value) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    fn error_value(&self) -> Option<&Value> {
        self.error.as_ref().filter(|e| !e.is_null())
    }

    /// The terminal status this submission writes.
    pub fn terminal_status(&self) -> TaskStatus {
        if self.error_value().is_some() {
            TaskStatus::Error
        } else {
            TaskStatus::Completed
        }
    }

    /// The JSON stored in the task's `result` column.
    pub fn stored_value(&self) -> Value {
        let mut stored = serde_json::Map::new();
        match self.error_value() {
            Some(error) => {
                stored.insert("error".to_string(), error.clone());
            }
            None => {
                stored.insert(
                    "result".to_string(),
                    self.result.clone().unwrap_or(Value::Null),
                );
            }
        }
        Value::Object(stored)
    }
}

/// Whether the submission changed the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The task moved to its terminal state.
    Recorded,
    /// The task was already terminal; nothing was written.
    AlreadyFinalized,
}

/// What happened to the queue's completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum CallbackOutcome {
    /// The queue is not complete, has no callback, or the write was a no-op.
    NotRequired,
    /// The results were posted and the receiver answered with success.
    Delivered,
    /// Delivery was attempted and failed. Not retried.
    Failed(String),
    /// Another submission already claimed delivery for this queue.
    AlreadyFired,
}

/// Receipt returned by a result submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Row id of the task.
    pub id: i32,
    pub task_id: String,
    pub queue_id: i32,
    pub status: TaskStatus,
    pub outcome: SubmitOutcome,
    pub queue_completed: bool,
    pub callback: CallbackOutcome,
}
