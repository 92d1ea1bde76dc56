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

//! Diesel row structs and their conversions into domain models.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use tracing::warn;

use crate::database::schema::{queues, tasks};
use crate::error::StorageError;
use crate::models::{Queue, QueueOptions, TaskStatus};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = queues)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbQueue {
    pub id: i32,
    pub queue_type: String,
    pub tags: Option<Vec<String>>,
    pub options: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub callback_fired_at: Option<DateTime<Utc>>,
}

impl DbQueue {
    /// The stored options, with unrecognized or malformed content ignored.
    pub fn parsed_options(&self) -> QueueOptions {
        match &self.options {
            None | Some(Value::Null) => QueueOptions::default(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!(queue_id = self.id, error = %e, "Ignoring malformed queue options");
                QueueOptions::default()
            }),
        }
    }
}

impl From<DbQueue> for Queue {
    fn from(row: DbQueue) -> Self {
        let options = row.parsed_options();
        Queue {
            id: row.id,
            queue_type: row.queue_type,
            tags: row.tags.unwrap_or_default(),
            options,
            created_at: row.created_at,
            callback_fired_at: row.callback_fired_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = queues)]
pub struct NewDbQueue {
    pub queue_type: String,
    pub tags: Option<Vec<String>>,
    pub options: Option<Value>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewDbTask {
    pub task_id: String,
    pub params: Value,
    pub priority: i32,
    pub status: String,
    pub expiry_time: Option<DateTime<Utc>>,
    pub queue_id: i32,
}

pub(crate) fn parse_status(raw: &str) -> Result<TaskStatus, StorageError> {
    raw.parse().map_err(|e: crate::models::task::UnknownStatus| StorageError::InvalidRow {
        table: "tasks",
        reason: e.to_string(),
    })
}
