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

//! The queue engine.
//!
//! [`QueueEngine`] is the surface a routing layer calls: one method per
//! operation, each returning a result object or a typed [`HopperError`].
//! Inputs are validated before any transaction is opened.
//!
//! ```rust,ignore
//! use hopper::{EngineConfig, NewQueue, NewTask, QueueEngine, ResultSubmission};
//! use serde_json::json;
//!
//! let engine = QueueEngine::new(EngineConfig::from_env()?)?;
//! engine.run_migrations().await?;
//!
//! let (queue, _) = engine
//!     .create_queue_and_add_tasks(
//!         NewQueue::new("addition"),
//!         vec![NewTask::new("t1", json!({"num1": 2, "num2": 3}))],
//!     )
//!     .await?;
//!
//! if let Some(task) = engine.next_by_type("addition").await? {
//!     engine.submit_result(ResultSubmission::completed(task.id, json!(5))).await?;
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::callback::{self, CallbackDispatcher, HttpCallbackDispatcher};
use crate::config::{ConfigError, EngineConfig};
use crate::dal::{TaskSelector, DAL};
use crate::database::Database;
use crate::error::HopperError;
use crate::models::{
    CallbackOutcome, ClaimedTask, IngestReport, NewQueue, NewTask, Queue, QueueOptions,
    QueueStatus, ResultSubmission, SubmitReceipt,
};
use crate::validation;

/// Queue/task engine backed by a PostgreSQL pool.
///
/// Cloning is cheap; clones share the pool and the callback dispatcher.
#[derive(Clone)]
pub struct QueueEngine {
    dal: DAL,
    dispatcher: Arc<dyn CallbackDispatcher>,
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("dal", &self.dal)
            .finish_non_exhaustive()
    }
}

impl QueueEngine {
    /// Builds the pool and the HTTP callback dispatcher from `config`.
    ///
    /// No connection is opened until the first operation.
    pub fn new(config: EngineConfig) -> Result<Self, HopperError> {
        let database = Database::from_config(&config)?;
        let dispatcher = HttpCallbackDispatcher::new(config.callback_timeout())
            .map_err(|e| ConfigError::CallbackClient(e.to_string()))?;
        Ok(Self::from_parts(
            DAL::new(database, &config),
            Arc::new(dispatcher),
        ))
    }

    pub fn from_parts(dal: DAL, dispatcher: Arc<dyn CallbackDispatcher>) -> Self {
        Self { dal, dispatcher }
    }

    /// Replaces the callback dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn CallbackDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    pub fn database(&self) -> &Database {
        self.dal.database()
    }

    /// Applies pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), HopperError> {
        self.database()
            .run_migrations()
            .await
            .inspect_err(|e| error!(error = %e, "Migrations failed"))?;
        Ok(())
    }

    /// Creates an empty queue.
    pub async fn create_queue(&self, new_queue: NewQueue) -> Result<Queue, HopperError> {
        validation::validate_new_queue(&new_queue)?;
        self.dal
            .queues()
            .create(new_queue)
            .await
            .inspect_err(|e| log_failure("create_queue", e))
    }

    /// Creates a queue and ingests its tasks.
    ///
    /// The queue insert and every ingestion chunk share one transaction, so a
    /// failed ingestion leaves no queue behind.
    pub async fn create_queue_and_add_tasks(
        &self,
        new_queue: NewQueue,
        tasks: Vec<NewTask>,
    ) -> Result<(Queue, IngestReport), HopperError> {
        validation::validate_new_queue(&new_queue)?;
        validation::validate_tasks(&tasks)?;

        self.dal
            .queues()
            .create_with_tasks(new_queue, tasks)
            .await
            .inspect_err(|e| log_failure("create_queue_and_add_tasks", e))
    }

    /// Ingests tasks into an existing queue.
    ///
    /// A positive `expiryTime` in `options` replaces the queue's lease for
    /// the initial expiry stamp of these tasks. Other options are ignored;
    /// the queue's stored options stay authoritative for claims and callbacks.
    pub async fn add_tasks(
        &self,
        queue_id: i32,
        tasks: Vec<NewTask>,
        options: Option<QueueOptions>,
    ) -> Result<IngestReport, HopperError> {
        validation::validate_tasks(&tasks)?;
        if let Some(options) = &options {
            validation::validate_options(options)?;
        }
        let lease = options.and_then(|o| o.lease());
        self.dal
            .tasks()
            .add(queue_id, tasks, lease)
            .await
            .inspect_err(|e| log_failure("add_tasks", e))
    }

    pub async fn get_queue(&self, queue_id: i32) -> Result<Queue, HopperError> {
        self.dal.queues().get(queue_id).await
    }

    pub async fn queue_exists(&self, queue_id: i32) -> Result<bool, HopperError> {
        self.dal.queues().exists(queue_id).await
    }

    /// Claims the next eligible task. `Ok(None)` means no task is available.
    pub async fn claim_next(
        &self,
        selector: TaskSelector,
    ) -> Result<Option<ClaimedTask>, HopperError> {
        self.dal
            .claims()
            .claim_next(selector)
            .await
            .inspect_err(|e| log_failure("claim_next", e))
    }

    pub async fn next_by_queue(&self, queue_id: i32) -> Result<Option<ClaimedTask>, HopperError> {
        self.claim_next(TaskSelector::ByQueue(queue_id)).await
    }

    pub async fn next_by_type(&self, queue_type: &str) -> Result<Option<ClaimedTask>, HopperError> {
        self.claim_next(TaskSelector::ByType(queue_type.to_string()))
            .await
    }

    /// Claims from queues whose tags include every tag given.
    pub async fn next_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
    ) -> Result<Option<ClaimedTask>, HopperError> {
        let tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self.claim_next(TaskSelector::ByTags(tags)).await
    }

    pub async fn next_by_priority(&self, priority: i32) -> Result<Option<ClaimedTask>, HopperError> {
        self.claim_next(TaskSelector::ByPriority(priority)).await
    }

    /// Records a worker's result and, if this completes the queue, posts the
    /// queue's callback.
    ///
    /// The returned receipt always reflects the committed write; a callback
    /// failure shows up as [`CallbackOutcome::Failed`], never as an error.
    pub async fn submit_result(
        &self,
        submission: ResultSubmission,
    ) -> Result<SubmitReceipt, HopperError> {
        let completion = self
            .dal
            .completion()
            .submit(submission)
            .await
            .inspect_err(|e| log_failure("submit_result", e))?;

        let queue_completed = completion.queue_status.is_complete();
        let callback = match &completion.delivery {
            Some(delivery) => {
                info!(
                    queue_id = delivery.queue_id,
                    total = completion.queue_status.total,
                    "Queue complete, delivering callback"
                );
                callback::dispatch(
                    self.dispatcher.as_ref(),
                    delivery.queue_id,
                    &delivery.url,
                    &delivery.results,
                )
                .await
            }
            None if completion.callback_already_fired => CallbackOutcome::AlreadyFired,
            None => CallbackOutcome::NotRequired,
        };

        if queue_completed && completion.delivery.is_none() {
            info!(queue_id = completion.queue_id, "Queue complete");
        }

        Ok(SubmitReceipt {
            id: completion.id,
            task_id: completion.task_id,
            queue_id: completion.queue_id,
            status: completion.status,
            outcome: completion.outcome,
            queue_completed,
            callback,
        })
    }

    pub async fn get_status(&self, queue_id: i32) -> Result<QueueStatus, HopperError> {
        self.dal
            .status()
            .get(queue_id)
            .await
            .inspect_err(|e| log_failure("get_status", e))
    }

    pub async fn is_queue_complete(&self, queue_id: i32) -> Result<bool, HopperError> {
        self.dal.status().is_complete(queue_id).await
    }

    /// Results of the queue's terminal tasks keyed by `task_id`.
    pub async fn get_results(&self, queue_id: i32) -> Result<BTreeMap<String, Value>, HopperError> {
        self.dal
            .status()
            .results(queue_id)
            .await
            .inspect_err(|e| log_failure("get_results", e))
    }

    /// Deletes a queue with its tasks. Returns whether the queue existed.
    pub async fn delete_queue(&self, queue_id: i32) -> Result<bool, HopperError> {
        self.dal
            .queues()
            .delete(queue_id)
            .await
            .inspect_err(|e| log_failure("delete_queue", e))
    }

    /// Deletes every queue and task.
    pub async fn delete_everything(&self) -> Result<(), HopperError> {
        warn!("Deleting all queues and tasks");
        self.dal
            .queues()
            .delete_everything()
            .await
            .inspect_err(|e| log_failure("delete_everything", e))
    }
}

fn log_failure(operation: &'static str, err: &HopperError) {
    if err.is_client_error() {
        tracing::debug!(operation, error = %err, "Operation rejected");
    } else {
        error!(operation, error = %err, "Operation failed");
    }
}
