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

//! PostgreSQL connection pool.
//!
//! Pooling is provided by `deadpool-diesel`. Connections are synchronous
//! diesel connections; work runs on them through `interact`, which moves the
//! closure onto a blocking thread.
//!
//! An optional schema name scopes every checked-out connection to that schema
//! through `search_path`, so several independent queue deployments (or test
//! runs) can share one database.

use deadpool_diesel::postgres::{Manager as PgManager, Pool as PgPool, Runtime as PgRuntime};
use diesel::prelude::*;
use tracing::info;
use url::Url;

use crate::error::StorageError;

/// Pooled connection handle.
pub type PooledConnection = deadpool::managed::Object<PgManager>;

/// Postgres truncates identifiers beyond NAMEDATALEN - 1 bytes.
const MAX_SCHEMA_NAME_LENGTH: usize = 63;

/// Checks that `name` is a plain identifier that can be spliced into
/// `SET search_path` and `CREATE SCHEMA`.
///
/// System schemas (`pg_*`, `information_schema`) are refused since the
/// engine creates and migrates its schema.
pub fn validate_schema_name(name: &str) -> Result<&str, StorageError> {
    let invalid = |reason: &str| StorageError::InvalidSchema {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() || name.len() > MAX_SCHEMA_NAME_LENGTH {
        return Err(invalid("must be 1-63 characters"));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(invalid("must not start with a digit"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only ASCII letters, digits and '_' are allowed"));
    }
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("pg_") || lower == "information_schema" {
        return Err(invalid("system schemas cannot hold queues"));
    }
    Ok(name)
}

/// A pool of PostgreSQL connections.
///
/// `Database` is `Clone`; clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    schema: Option<String>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool", &"PgPool(...)")
            .field("schema", &self.schema)
            .finish()
    }
}

impl Database {
    /// Creates a connection pool for `connection_url`.
    ///
    /// No connection is opened until the first checkout.
    pub fn new(connection_url: &str, max_size: u32) -> Result<Self, StorageError> {
        Self::new_with_schema(connection_url, max_size, None)
    }

    /// Creates a connection pool whose connections use `schema` as their
    /// search path.
    pub fn new_with_schema(
        connection_url: &str,
        max_size: u32,
        schema: Option<&str>,
    ) -> Result<Self, StorageError> {
        check_postgres_url(connection_url)?;

        let schema = schema
            .map(|s| validate_schema_name(s).map(str::to_string))
            .transpose()?;

        let manager = PgManager::new(connection_url, PgRuntime::Tokio1);
        let pool = PgPool::builder(manager)
            .max_size(max_size.max(1) as usize)
            .build()
            .map_err(|e| StorageError::PoolBuild(e.to_string()))?;

        info!(
            max_size,
            "PostgreSQL connection pool initialized{}",
            schema
                .as_ref()
                .map_or(String::new(), |s| format!(" with schema '{}'", s))
        );

        Ok(Self { pool, schema })
    }

    /// Creates a pool from an [`EngineConfig`](crate::EngineConfig).
    pub fn from_config(config: &crate::EngineConfig) -> Result<Self, StorageError> {
        Self::new_with_schema(
            config.database_url(),
            config.pool_size(),
            config.database_schema(),
        )
    }

    /// Returns the schema name if set.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns a clone of the underlying pool.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Checks a connection out of the pool, scoped to the configured schema.
    pub async fn get_connection(&self) -> Result<PooledConnection, StorageError> {
        let conn = self.pool.get().await?;

        if let Some(schema) = self.schema.clone() {
            conn.interact(move |conn| {
                diesel::sql_query(format!("SET search_path TO {}, public", schema)).execute(conn)
            })
            .await??;
        }

        Ok(conn)
    }

    /// Creates the configured schema if needed and runs pending migrations.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.pool.get().await?;
        let schema = self.schema.clone();

        conn.interact(move |conn| -> Result<(), StorageError> {
            if let Some(schema) = schema {
                diesel::sql_query(format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                    .execute(conn)?;
                diesel::sql_query(format!("SET search_path TO {}, public", schema))
                    .execute(conn)?;
            }
            super::run_migrations(conn)
        })
        .await??;

        if let Some(schema) = self.schema() {
            info!("Schema '{}' migrated", schema);
        }
        Ok(())
    }
}

fn check_postgres_url(connection_url: &str) -> Result<(), StorageError> {
    let url = Url::parse(connection_url)
        .map_err(|e| StorageError::PoolBuild(format!("invalid database URL: {}", e)))?;
    match url.scheme() {
        "postgres" | "postgresql" => Ok(()),
        other => Err(StorageError::PoolBuild(format!(
            "unsupported database scheme '{}', expected postgres:// or postgresql://",
            other
        ))),
    }
}
