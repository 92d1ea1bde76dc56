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

//! Database layer: connection pooling, the table definitions and migrations.
//!
//! Every engine operation checks one connection out of the pool, runs its
//! statements inside a single transaction on that connection and hands it
//! back. There is no process-wide connection.

pub mod connection;
pub mod schema;

pub use connection::{validate_schema_name, Database};

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

/// Migrations for the queue/task schema, embedded at compile time.
pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

/// Runs pending migrations on an already established connection.
pub fn run_migrations(conn: &mut diesel::PgConnection) -> Result<(), crate::error::StorageError> {
    use diesel_migrations::MigrationHarness;

    conn.run_pending_migrations(POSTGRES_MIGRATIONS)
        .map(|applied| {
            if !applied.is_empty() {
                tracing::info!(count = applied.len(), "Applied pending migrations");
            }
        })
        .map_err(|e| crate::error::StorageError::Migration(e.to_string()))
}
