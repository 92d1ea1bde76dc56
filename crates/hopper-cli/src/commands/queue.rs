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

//! Implementation of the per-queue commands: `status`, `results` and
//! `delete-queue`.

use anyhow::{bail, Context, Result};
use hopper::QueueEngine;
use tracing::info;

pub async fn status(engine: &QueueEngine, queue_id: i32) -> Result<()> {
    let status = engine
        .get_status(queue_id)
        .await
        .with_context(|| format!("Failed to read status of queue {}", queue_id))?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    if status.is_complete() {
        info!("Queue {} is complete", queue_id);
    }
    Ok(())
}

pub async fn results(engine: &QueueEngine, queue_id: i32) -> Result<()> {
    let results = engine
        .get_results(queue_id)
        .await
        .with_context(|| format!("Failed to read results of queue {}", queue_id))?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

pub async fn delete(engine: &QueueEngine, queue_id: i32) -> Result<()> {
    let removed = engine
        .delete_queue(queue_id)
        .await
        .with_context(|| format!("Failed to delete queue {}", queue_id))?;

    if !removed {
        bail!("Queue {} does not exist", queue_id);
    }
    info!("Deleted queue {}", queue_id);
    Ok(())
}
