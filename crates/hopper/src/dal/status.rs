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

//! Read-only aggregates: status counts, completion and collected results.

use std::collections::BTreeMap;

use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::PgConnection;
use serde_json::Value;

use super::models::parse_status;
use super::{queue, DAL};
use crate::database::schema::tasks;
use crate::error::{HopperError, QueueError};
use crate::models::{QueueStatus, TaskStatus};

/// Data access layer for queue aggregates.
#[derive(Clone)]
pub struct StatusDAL<'a> {
    dal: &'a DAL,
}

impl<'a> StatusDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Task counts for a queue. Fails with [`QueueError::QueueNotFound`]
    /// for an unknown queue.
    pub async fn get(&self, queue_id: i32) -> Result<QueueStatus, HopperError> {
        self.dal
            .transaction(move |conn| {
                ensure_queue(conn, queue_id)?;
                count_in(conn, queue_id)
            })
            .await
    }

    /// Whether every task of the queue is terminal. A queue without tasks is
    /// complete.
    pub async fn is_complete(&self, queue_id: i32) -> Result<bool, HopperError> {
        Ok(self.get(queue_id).await?.is_complete())
    }

    /// Results of the queue's terminal tasks keyed by `task_id`.
    pub async fn results(&self, queue_id: i32) -> Result<BTreeMap<String, Value>, HopperError> {
        self.dal
            .transaction(move |conn| {
                ensure_queue(conn, queue_id)?;
                Ok(results_in(conn, queue_id)?)
            })
            .await
    }
}

fn ensure_queue(conn: &mut PgConnection, queue_id: i32) -> Result<(), HopperError> {
    if queue::exists_in(conn, queue_id)? {
        Ok(())
    } else {
        Err(QueueError::QueueNotFound(queue_id).into())
    }
}

pub(crate) fn count_in(conn: &mut PgConnection, queue_id: i32) -> Result<QueueStatus, HopperError> {
    let rows: Vec<(String, i64)> = tasks::table
        .filter(tasks::queue_id.eq(queue_id))
        .group_by(tasks::status)
        .select((tasks::status, count_star()))
        .load(conn)?;

    let mut status = QueueStatus::default();
    for (raw, count) in rows {
        match parse_status(&raw)? {
            TaskStatus::Available => status.available += count,
            TaskStatus::Processing => status.processing += count,
            TaskStatus::Completed => status.completed += count,
            TaskStatus::Error => status.errored += count,
        }
        status.total += count;
    }
    Ok(status)
}

/// Terminal results in insertion order; a repeated `task_id` keeps the
/// latest row.
pub(crate) fn results_in(
    conn: &mut PgConnection,
    queue_id: i32,
) -> QueryResult<BTreeMap<String, Value>> {
    let rows: Vec<(String, Option<Value>)> = tasks::table
        .filter(tasks::queue_id.eq(queue_id))
        .filter(tasks::status.eq_any(TaskStatus::column_values(true)))
        .order(tasks::id.asc())
        .select((tasks::task_id, tasks::result))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(task_id, result)| (task_id, result.unwrap_or(Value::Null)))
        .collect())
}
