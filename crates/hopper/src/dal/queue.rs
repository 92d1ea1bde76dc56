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

//! Queue repository: creation, lookup and deletion.

use std::time::Instant;

use diesel::prelude::*;
use diesel::PgConnection;
use tracing::info;

use super::models::{DbQueue, NewDbQueue};
use super::{task, DAL};
use crate::database::schema::queues;
use crate::error::{HopperError, QueueError, StorageError};
use crate::models::{IngestReport, NewQueue, NewTask, Queue};

/// Data access layer for queue rows.
#[derive(Clone)]
pub struct QueueDAL<'a> {
    dal: &'a DAL,
}

impl<'a> QueueDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a queue and returns the stored row.
    ///
    /// Input is expected to be validated already; see [`crate::validation`].
    pub async fn create(&self, new_queue: NewQueue) -> Result<Queue, HopperError> {
        let queue = self
            .dal
            .transaction(move |conn| create_in(conn, &new_queue))
            .await?;

        info!(
            queue_id = queue.id,
            queue_type = %queue.queue_type,
            tags = ?queue.tags,
            "Created queue"
        );
        Ok(queue)
    }

    /// Inserts a queue together with its tasks in one transaction.
    ///
    /// If any chunk of the ingestion fails, the queue insert rolls back with
    /// it and no queue row is ever visible.
    pub async fn create_with_tasks(
        &self,
        new_queue: NewQueue,
        new_tasks: Vec<NewTask>,
    ) -> Result<(Queue, IngestReport), HopperError> {
        let settings = *self.dal.settings();
        let started = Instant::now();

        let (queue, report) = self
            .dal
            .transaction(move |conn| {
                let queue = create_in(conn, &new_queue)?;
                let report = task::add_in(conn, queue.id, &new_tasks, None, &settings)?;
                Ok((queue, report))
            })
            .await?;

        info!(
            queue_id = queue.id,
            queue_type = %queue.queue_type,
            tags = ?queue.tags,
            "Created queue"
        );
        task::log_ingestion(&report, started);
        Ok((queue, report))
    }

    /// Fetches a queue, failing with [`QueueError::QueueNotFound`] if absent.
    pub async fn get(&self, queue_id: i32) -> Result<Queue, HopperError> {
        self.dal
            .transaction(move |conn| {
                find_in(conn, queue_id)?
                    .map(Queue::from)
                    .ok_or_else(|| QueueError::QueueNotFound(queue_id).into())
            })
            .await
    }

    pub async fn exists(&self, queue_id: i32) -> Result<bool, HopperError> {
        self.dal
            .transaction(move |conn| Ok(exists_in(conn, queue_id)?))
            .await
    }

    /// Deletes a queue and, by cascade, all of its tasks.
    ///
    /// Returns whether a queue was removed.
    pub async fn delete(&self, queue_id: i32) -> Result<bool, HopperError> {
        let removed = self
            .dal
            .transaction(move |conn| {
                let count =
                    diesel::delete(queues::table.filter(queues::id.eq(queue_id))).execute(conn)?;
                Ok(count > 0)
            })
            .await?;

        if removed {
            info!(queue_id, "Deleted queue");
        }
        Ok(removed)
    }

    /// Removes every queue and task and resets the id sequences.
    pub async fn delete_everything(&self) -> Result<(), HopperError> {
        self.dal
            .transaction(|conn| {
                diesel::sql_query("TRUNCATE TABLE tasks, queues RESTART IDENTITY CASCADE")
                    .execute(conn)?;
                Ok(())
            })
            .await?;

        info!("Deleted all queues and tasks");
        Ok(())
    }
}

pub(crate) fn create_in(conn: &mut PgConnection, new_queue: &NewQueue) -> Result<Queue, HopperError> {
    let options = if new_queue.options.is_empty() {
        None
    } else {
        Some(serde_json::to_value(&new_queue.options).map_err(|e| {
            StorageError::InvalidRow {
                table: "queues",
                reason: e.to_string(),
            }
        })?)
    };
    let row = NewDbQueue {
        queue_type: new_queue.queue_type.clone(),
        tags: (!new_queue.tags.is_empty()).then(|| new_queue.tags.clone()),
        options,
    };

    let stored: DbQueue = diesel::insert_into(queues::table)
        .values(&row)
        .returning(DbQueue::as_returning())
        .get_result(conn)?;
    Ok(stored.into())
}

pub(crate) fn find_in(conn: &mut PgConnection, queue_id: i32) -> QueryResult<Option<DbQueue>> {
    queues::table
        .find(queue_id)
        .select(DbQueue::as_select())
        .first(conn)
        .optional()
}

/// Fetches a queue row and holds its lock until the transaction ends.
///
/// `FOR NO KEY UPDATE` serializes lockers against each other without blocking
/// task inserts, which only take a key-share lock on the queue.
pub(crate) fn lock_in(conn: &mut PgConnection, queue_id: i32) -> QueryResult<Option<DbQueue>> {
    queues::table
        .find(queue_id)
        .select(DbQueue::as_select())
        .for_no_key_update()
        .first(conn)
        .optional()
}

pub(crate) fn exists_in(conn: &mut PgConnection, queue_id: i32) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(queues::table.find(queue_id))).get_result(conn)
}
