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

//! Result submission and completion detection.
//!
//! The task update, the queue lock, the completion count and the callback
//! flag are one transaction. Locking the queue row serializes concurrent
//! final submissions, so exactly one of them observes the queue as complete
//! with `callback_fired_at` still unset and takes over delivery.

use std::collections::BTreeMap;

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Timestamptz};
use diesel::PgConnection;
use serde_json::Value;

use super::models::parse_status;
use super::{queue, status, DAL};
use crate::database::schema::{queues, tasks};
use crate::error::{HopperError, QueueError};
use crate::models::{QueueStatus, ResultSubmission, SubmitOutcome, TaskStatus};

/// Results to post to a queue's callback URL after commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackDelivery {
    pub queue_id: i32,
    pub url: String,
    pub results: BTreeMap<String, Value>,
}

/// The committed effect of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub id: i32,
    pub task_id: String,
    pub queue_id: i32,
    pub status: TaskStatus,
    pub outcome: SubmitOutcome,
    pub queue_status: QueueStatus,
    /// Set when this submission claimed the queue's callback.
    pub delivery: Option<CallbackDelivery>,
    /// Whether the queue has a callback another submission already claimed.
    pub callback_already_fired: bool,
}

/// Data access layer for result submission.
#[derive(Clone)]
pub struct CompletionDAL<'a> {
    dal: &'a DAL,
}

impl<'a> CompletionDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Records a terminal result for a claimed or available task.
    ///
    /// Fails with [`QueueError::TaskNotFound`] for an unknown task id. A
    /// submission for an already terminal task writes nothing.
    pub async fn submit(&self, submission: ResultSubmission) -> Result<Completion, HopperError> {
        self.dal
            .transaction(move |conn| submit_in(conn, &submission))
            .await
    }
}

pub(crate) fn submit_in(
    conn: &mut PgConnection,
    submission: &ResultSubmission,
) -> Result<Completion, HopperError> {
    let terminal = submission.terminal_status();

    let updated: Option<(String, i32)> = diesel::update(
        tasks::table
            .filter(tasks::id.eq(submission.id))
            .filter(tasks::status.eq_any(TaskStatus::column_values(false))),
    )
    .set((
        tasks::status.eq(terminal.as_str()),
        tasks::result.eq(Some(submission.stored_value())),
        tasks::end_time.eq(sql::<Nullable<Timestamptz>>("NOW()")),
    ))
    .returning((tasks::task_id, tasks::queue_id))
    .get_result(conn)
    .optional()?;

    let Some((task_id, queue_id)) = updated else {
        return already_finalized(conn, submission.id);
    };

    let stored_queue = queue::lock_in(conn, queue_id)?.ok_or(QueueError::QueueNotFound(queue_id))?;
    let queue_status = status::count_in(conn, queue_id)?;
    let callback_url = stored_queue.parsed_options().callback;

    let mut delivery = None;
    let mut callback_already_fired = false;
    if queue_status.is_complete() {
        if let Some(url) = callback_url {
            if stored_queue.callback_fired_at.is_some() {
                callback_already_fired = true;
            } else {
                diesel::update(queues::table.find(queue_id))
                    .set(queues::callback_fired_at.eq(sql::<Nullable<Timestamptz>>("NOW()")))
                    .execute(conn)?;
                delivery = Some(CallbackDelivery {
                    queue_id,
                    url,
                    results: status::results_in(conn, queue_id)?,
                });
            }
        }
    }

    Ok(Completion {
        id: submission.id,
        task_id,
        queue_id,
        status: terminal,
        outcome: SubmitOutcome::Recorded,
        queue_status,
        delivery,
        callback_already_fired,
    })
}

fn already_finalized(conn: &mut PgConnection, id: i32) -> Result<Completion, HopperError> {
    let existing: Option<(String, i32, String)> = tasks::table
        .find(id)
        .select((tasks::task_id, tasks::queue_id, tasks::status))
        .first(conn)
        .optional()?;

    let (task_id, queue_id, raw_status) = existing.ok_or(QueueError::TaskNotFound(id))?;
    let queue_status = status::count_in(conn, queue_id)?;

    Ok(Completion {
        id,
        task_id,
        queue_id,
        status: parse_status(&raw_status)?,
        outcome: SubmitOutcome::AlreadyFinalized,
        queue_status,
        delivery: None,
        callback_already_fired: false,
    })
}
