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

//! Data Access Layer.
//!
//! Every public operation checks one connection out of the pool and runs all
//! of its statements inside a single transaction on that connection. The
//! `*_in` helpers take an explicit `&mut PgConnection` so that several steps
//! can share the caller's transaction.
//!
//! ```rust,ignore
//! use hopper::dal::DAL;
//! use hopper::database::Database;
//!
//! let db = Database::new("postgres://localhost/hopper", 10)?;
//! let dal = DAL::new(db, &config);
//! let status = dal.status().get(queue_id).await?;
//! ```

use std::time::Duration;

use diesel::prelude::*;
use diesel::PgConnection;

use crate::config::EngineConfig;
use crate::database::Database;
use crate::error::HopperError;

pub mod claiming;
pub mod completion;
pub mod models;
pub mod queue;
pub mod status;
pub mod task;

pub use claiming::{ClaimDAL, TaskSelector};
pub use completion::{CallbackDelivery, CompletionDAL, Completion};
pub use queue::QueueDAL;
pub use status::StatusDAL;
pub use task::TaskDAL;

/// Engine settings the DAL applies to its statements.
#[derive(Debug, Clone, Copy)]
pub struct DalSettings {
    pub default_expiry: Duration,
    pub batch_size: usize,
    pub statement_timeout: Duration,
}

impl DalSettings {
    /// Statement timeout in whole milliseconds, never zero.
    pub fn statement_timeout_ms(&self) -> u128 {
        self.statement_timeout.as_millis().max(1)
    }
}

impl From<&EngineConfig> for DalSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_expiry: config.default_expiry(),
            batch_size: config.batch_size(),
            statement_timeout: config.statement_timeout(),
        }
    }
}

/// The Data Access Layer struct.
///
/// `DAL` is `Clone`; clones share the same connection pool.
#[derive(Clone, Debug)]
pub struct DAL {
    /// The database instance with connection pool
    pub database: Database,
    settings: DalSettings,
}

impl DAL {
    pub fn new(database: Database, config: &EngineConfig) -> Self {
        Self::with_settings(database, DalSettings::from(config))
    }

    pub fn with_settings(database: Database, settings: DalSettings) -> Self {
        DAL { database, settings }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn settings(&self) -> &DalSettings {
        &self.settings
    }

    /// Returns a queue DAL for queue operations.
    pub fn queues(&self) -> QueueDAL {
        QueueDAL::new(self)
    }

    /// Returns a task DAL for bulk ingestion.
    pub fn tasks(&self) -> TaskDAL {
        TaskDAL::new(self)
    }

    /// Returns a claim DAL for dequeue operations.
    pub fn claims(&self) -> ClaimDAL {
        ClaimDAL::new(self)
    }

    /// Returns a completion DAL for result submission.
    pub fn completion(&self) -> CompletionDAL {
        CompletionDAL::new(self)
    }

    /// Returns a status DAL for aggregate reads.
    pub fn status(&self) -> StatusDAL {
        StatusDAL::new(self)
    }

    /// Runs `f` inside one transaction on a pooled connection.
    ///
    /// The transaction is bounded by the configured statement timeout; any
    /// error returned by `f` rolls it back.
    pub(crate) async fn transaction<T, F>(&self, f: F) -> Result<T, HopperError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, HopperError> + Send + 'static,
        T: Send + 'static,
    {
        let timeout_ms = self.settings.statement_timeout_ms();
        let conn = self.database.get_connection().await?;

        conn.interact(move |conn| {
            conn.transaction::<T, HopperError, _>(|conn| {
                diesel::sql_query(format!("SET LOCAL statement_timeout = {}", timeout_ms))
                    .execute(conn)?;
                f(conn)
            })
        })
        .await?
    }
}
