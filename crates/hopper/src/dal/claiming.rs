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

//! Task claiming.
//!
//! A claim is a single statement. The CTE picks the highest-priority eligible
//! task and locks it with `FOR UPDATE OF tasks SKIP LOCKED`; the outer
//! `UPDATE ... RETURNING` moves it to `processing` and stamps the lease.
//! Concurrent claimers skip rows another transaction holds instead of
//! waiting on them, so two claims never return the same task.
//!
//! Eligible means `available`, or `processing` with a lapsed lease (the
//! previous worker is presumed dead).

use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Array, Double, Integer, Jsonb, Text, Timestamptz, Varchar};
use diesel::PgConnection;
use serde_json::Value;
use tracing::debug;

use super::DAL;
use crate::error::{HopperError, ValidationError};
use crate::models::ClaimedTask;

/// Which tasks a claim may pick from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSelector {
    /// Tasks of one queue.
    ByQueue(i32),
    /// Tasks of any queue with this type.
    ByType(String),
    /// Tasks of any queue whose tags contain all of these.
    ByTags(Vec<String>),
    /// Tasks of any queue with exactly this priority.
    ByPriority(i32),
}

impl TaskSelector {
    /// The `WHERE` predicate restricting candidates. `$1` is the selector value.
    pub fn predicate(&self) -> &'static str {
        match self {
            TaskSelector::ByQueue(_) => "tasks.queue_id = $1",
            TaskSelector::ByType(_) => "queues.type = $1",
            TaskSelector::ByTags(_) => "queues.tags @> $1::varchar[]",
            TaskSelector::ByPriority(_) => "tasks.priority = $1",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TaskSelector::ByTags(tags) if tags.is_empty() => Err(ValidationError::EmptyTagSelector),
            TaskSelector::ByTags(tags) if tags.iter().any(|t| t.trim().is_empty()) => {
                Err(ValidationError::EmptyTag)
            }
            TaskSelector::ByType(queue_type) if queue_type.trim().is_empty() => {
                Err(ValidationError::EmptyQueueType)
            }
            _ => Ok(()),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TaskSelector::ByQueue(_) => "queue",
            TaskSelector::ByType(_) => "type",
            TaskSelector::ByTags(_) => "tags",
            TaskSelector::ByPriority(_) => "priority",
        }
    }
}

/// Builds the claim statement for a selector predicate.
///
/// `$2` is the fallback lease in milliseconds, applied when the queue's
/// options carry no positive numeric `expiryTime`.
pub(crate) fn claim_sql(predicate: &str) -> String {
    format!(
        r#"
        WITH candidate AS (
            SELECT tasks.id
            FROM tasks
            JOIN queues ON queues.id = tasks.queue_id
            WHERE {predicate}
              AND (tasks.status = 'available'
                   OR (tasks.status = 'processing' AND tasks.expiry_time < NOW()))
            ORDER BY tasks.priority DESC, tasks.id ASC
            LIMIT 1
            FOR UPDATE OF tasks SKIP LOCKED
        )
        UPDATE tasks
        SET status = 'processing',
            start_time = NOW(),
            end_time = NULL,
            expiry_time = NOW() + (CASE
                WHEN jsonb_typeof(queues.options -> 'expiryTime') = 'number'
                     AND (queues.options ->> 'expiryTime')::float8 > 0
                THEN (queues.options ->> 'expiryTime')::float8
                ELSE $2
            END) * INTERVAL '1 millisecond'
        FROM candidate, queues
        WHERE tasks.id = candidate.id
          AND queues.id = tasks.queue_id
        RETURNING tasks.id, tasks.task_id, tasks.params, tasks.priority, tasks.queue_id,
                  queues.type AS queue_type, tasks.start_time, tasks.expiry_time
        "#
    )
}

#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ClaimRow {
    #[diesel(sql_type = Integer)]
    id: i32,
    #[diesel(sql_type = Varchar)]
    task_id: String,
    #[diesel(sql_type = Jsonb)]
    params: Value,
    #[diesel(sql_type = Integer)]
    priority: i32,
    #[diesel(sql_type = Integer)]
    queue_id: i32,
    #[diesel(sql_type = Varchar)]
    queue_type: String,
    #[diesel(sql_type = Timestamptz)]
    start_time: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    expiry_time: DateTime<Utc>,
}

impl From<ClaimRow> for ClaimedTask {
    fn from(row: ClaimRow) -> Self {
        ClaimedTask {
            id: row.id,
            task_id: row.task_id,
            params: row.params,
            priority: row.priority,
            queue_id: row.queue_id,
            queue_type: row.queue_type,
            start_time: row.start_time,
            expiry_time: row.expiry_time,
        }
    }
}

/// Data access layer for claiming tasks.
#[derive(Clone)]
pub struct ClaimDAL<'a> {
    dal: &'a DAL,
}

impl<'a> ClaimDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Claims the next eligible task for `selector`.
    ///
    /// Returns `Ok(None)` when no task is eligible, including when every
    /// eligible row is currently locked by another claimer.
    pub async fn claim_next(
        &self,
        selector: TaskSelector,
    ) -> Result<Option<ClaimedTask>, HopperError> {
        selector.validate()?;
        let default_lease = self.dal.settings().default_expiry;
        let label = selector.label();

        let claimed = self
            .dal
            .transaction(move |conn| Ok(claim_in(conn, &selector, default_lease)?))
            .await?;

        match &claimed {
            Some(task) => debug!(
                selector = label,
                id = task.id,
                task_id = %task.task_id,
                queue_id = task.queue_id,
                priority = task.priority,
                "Claimed task"
            ),
            None => debug!(selector = label, "No task available"),
        }
        Ok(claimed)
    }
}

pub(crate) fn claim_in(
    conn: &mut PgConnection,
    selector: &TaskSelector,
    default_lease: Duration,
) -> QueryResult<Option<ClaimedTask>> {
    let sql = claim_sql(selector.predicate());
    let lease_ms = default_lease.as_millis() as f64;

    let row: Option<ClaimRow> = match selector {
        TaskSelector::ByQueue(queue_id) => diesel::sql_query(sql)
            .bind::<Integer, _>(*queue_id)
            .bind::<Double, _>(lease_ms)
            .get_result(conn)
            .optional()?,
        TaskSelector::ByType(queue_type) => diesel::sql_query(sql)
            .bind::<Text, _>(queue_type.clone())
            .bind::<Double, _>(lease_ms)
            .get_result(conn)
            .optional()?,
        TaskSelector::ByTags(tags) => diesel::sql_query(sql)
            .bind::<Array<Text>, _>(tags.clone())
            .bind::<Double, _>(lease_ms)
            .get_result(conn)
            .optional()?,
        TaskSelector::ByPriority(priority) => diesel::sql_query(sql)
            .bind::<Integer, _>(*priority)
            .bind::<Double, _>(lease_ms)
            .get_result(conn)
            .optional()?,
    };

    Ok(row.map(ClaimedTask::from))
}
