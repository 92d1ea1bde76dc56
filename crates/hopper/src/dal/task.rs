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

//! Bulk task ingestion.
//!
//! Tasks are inserted in chunks of multi-row `INSERT`s, all inside one
//! transaction: either every task of a call becomes visible or none does.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use tracing::{debug, info};

use super::models::NewDbTask;
use super::{queue, DalSettings, DAL};
use crate::database::schema::tasks;
use crate::error::{HopperError, QueueError, ValidationError};
use crate::models::{IngestReport, NewTask, TaskStatus};

/// Upper bound on rows per statement. Each row binds six parameters and
/// Postgres accepts at most 65535 per statement.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Number of insert statements needed for `total` rows.
pub(crate) fn plan_batches(total: usize, batch_size: usize) -> usize {
    let size = effective_batch_size(batch_size);
    total.div_ceil(size)
}

pub(crate) fn effective_batch_size(configured: usize) -> usize {
    configured.clamp(1, MAX_BATCH_SIZE)
}

/// The instant a lease of `lease` started at `start` runs out.
pub(crate) fn lease_deadline(
    start: DateTime<Utc>,
    lease: Duration,
) -> Result<DateTime<Utc>, ValidationError> {
    let millis = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    chrono::Duration::try_milliseconds(millis)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or(ValidationError::InvalidExpiryTime(millis))
}

/// Data access layer for task ingestion.
#[derive(Clone)]
pub struct TaskDAL<'a> {
    dal: &'a DAL,
}

impl<'a> TaskDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts `new_tasks` into `queue_id`.
    ///
    /// `lease` overrides the queue's `expiryTime` for the initial
    /// `expiry_time` stamp. Fails with [`QueueError::QueueNotFound`] if the
    /// queue does not exist. Any failure rolls back every chunk of this call.
    pub async fn add(
        &self,
        queue_id: i32,
        new_tasks: Vec<NewTask>,
        lease: Option<Duration>,
    ) -> Result<IngestReport, HopperError> {
        let settings = *self.dal.settings();
        let started = Instant::now();

        let report = self
            .dal
            .transaction(move |conn| add_in(conn, queue_id, &new_tasks, lease, &settings))
            .await?;

        log_ingestion(&report, started);
        Ok(report)
    }
}

pub(crate) fn log_ingestion(report: &IngestReport, started: Instant) {
    info!(
        queue_id = report.queue_id,
        inserted = report.inserted,
        batches = report.batches,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Added tasks to queue"
    );
}

pub(crate) fn add_in(
    conn: &mut PgConnection,
    queue_id: i32,
    new_tasks: &[NewTask],
    lease: Option<Duration>,
    settings: &DalSettings,
) -> Result<IngestReport, HopperError> {
    let stored_queue =
        queue::find_in(conn, queue_id)?.ok_or(QueueError::QueueNotFound(queue_id))?;
    let lease = match lease {
        Some(lease) => lease,
        None => stored_queue
            .parsed_options()
            .lease_or(settings.default_expiry),
    };
    let expiry_time = lease_deadline(Utc::now(), lease)?;

    debug!(
        queue_id,
        tasks = new_tasks.len(),
        batches = plan_batches(new_tasks.len(), settings.batch_size),
        "Ingesting tasks"
    );

    let mut report = IngestReport {
        queue_id,
        ..Default::default()
    };

    for (batch, chunk) in new_tasks
        .chunks(effective_batch_size(settings.batch_size))
        .enumerate()
    {
        let rows: Vec<NewDbTask> = chunk
            .iter()
            .map(|task| NewDbTask {
                task_id: task.task_id.clone(),
                params: task.params.clone(),
                priority: task.effective_priority(),
                status: TaskStatus::Available.as_str().to_string(),
                expiry_time: Some(expiry_time),
                queue_id,
            })
            .collect();

        let inserted = diesel::insert_into(tasks::table)
            .values(&rows)
            .execute(conn)?;

        debug!(queue_id, batch, rows = inserted, "Inserted task batch");
        report.inserted += inserted;
        report.batches += 1;
    }

    Ok(report)
}
