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

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hopper::{EngineConfig, QueueEngine};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// Hopper - a PostgreSQL-backed task queue
#[derive(Parser)]
#[command(name = "hopper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (can also be set via DATABASE_URL environment variable)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Postgres schema holding the queue tables
    #[arg(long, env = "HOPPER_DATABASE_SCHEMA", global = true)]
    schema: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Print task counts for a queue
    Status {
        /// Queue id
        queue: i32,
    },
    /// Print the collected results of a queue
    Results {
        /// Queue id
        queue: i32,
    },
    /// Delete a queue and all of its tasks
    DeleteQueue {
        /// Queue id
        queue: i32,
    },
    /// Delete every queue and task
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn build_engine(cli: &Cli) -> Result<QueueEngine> {
    let config = match &cli.database_url {
        Some(url) => EngineConfig::builder()
            .database_url(url.clone())
            .database_schema(cli.schema.clone())
            .pool_size(2)
            .build(),
        None => EngineConfig::from_env().context(
            "Database URL is required. Set --database-url, DATABASE_URL or HOPPER_DATABASE_URL",
        )?,
    };
    QueueEngine::new(config).context("Failed to set up the queue engine")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let engine = build_engine(&cli)?;

    match cli.command {
        Commands::Migrate => commands::migrate::run(&engine).await?,
        Commands::Status { queue } => commands::queue::status(&engine, queue).await?,
        Commands::Results { queue } => commands::queue::results(&engine, queue).await?,
        Commands::DeleteQueue { queue } => commands::queue::delete(&engine, queue).await?,
        Commands::Reset { yes } => commands::reset::run(&engine, yes).await?,
    }

    Ok(())
}
