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

//! # Hopper
//!
//! A PostgreSQL-backed task queue engine.
//!
//! Producers create queues and ingest tasks in bulk; stateless workers claim
//! the next eligible task, execute it and submit its result; queue owners read
//! aggregate status or the collected results, and may register a callback URL
//! that is posted once every task of the queue has finished.
//!
//! All coordination between workers happens in the database. A claim is a
//! single `SELECT ... FOR UPDATE SKIP LOCKED` driven `UPDATE`, so concurrent
//! workers never block each other and never receive the same task. A claim
//! carries a lease (`expiry_time`); a task whose lease lapses while still
//! `processing` is handed out again, which recovers work from crashed workers.
//!
//! ## Modules
//!
//! - [`engine`]: [`QueueEngine`], the operation surface
//! - [`dal`]: transactional data access used by the engine
//! - [`models`]: queue, task, status and receipt types
//! - [`database`]: connection pool, schema and migrations
//! - [`callback`]: completion callback delivery
//! - [`config`]: [`EngineConfig`] and environment loading
//! - [`error`]: the error taxonomy

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod callback;
pub mod config;
pub mod dal;
pub mod database;
pub mod engine;
pub mod error;
pub mod models;
pub mod validation;

pub use callback::{CallbackDispatcher, HttpCallbackDispatcher};
pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use dal::{TaskSelector, DAL};
pub use database::Database;
pub use engine::QueueEngine;
pub use error::{CallbackError, HopperError, QueueError, StorageError, ValidationError};
pub use models::{
    CallbackOutcome, ClaimedTask, IngestReport, NewQueue, NewTask, Queue, QueueOptions,
    QueueStatus, ResultSubmission, SubmitOutcome, SubmitReceipt, TaskStatus,
};

static LOGGING: Once = Once::new();

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// `level` overrides `RUST_LOG` when given; without either the filter is
/// `info`. Only the first call has an effect, and a subscriber installed
/// elsewhere is left in place.
pub fn init_logging(level: Option<&str>) {
    LOGGING.call_once(|| {
        let filter = match level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let _ = tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init();
    });
}
