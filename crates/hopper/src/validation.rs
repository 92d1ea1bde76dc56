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

//! Caller-input validation.
//!
//! Engine entry points validate before opening a transaction, so malformed
//! input never reaches the database.

use url::Url;

use crate::error::ValidationError;
use crate::models::{NewQueue, NewTask, QueueOptions};

/// Column width of `queues.type`, `queues.tags` and `tasks.task_id`.
pub const MAX_TEXT_LENGTH: usize = 255;

fn check_length(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > MAX_TEXT_LENGTH {
        return Err(ValidationError::TooLong {
            field,
            len,
            max: MAX_TEXT_LENGTH,
        });
    }
    Ok(())
}

pub fn validate_queue_type(queue_type: &str) -> Result<(), ValidationError> {
    if queue_type.trim().is_empty() {
        return Err(ValidationError::EmptyQueueType);
    }
    check_length("type", queue_type)
}

pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(ValidationError::EmptyTag);
    }
    tags.iter().try_for_each(|tag| check_length("tag", tag))
}

/// Checks `expiryTime` is positive and `callback` is an http(s) URL.
pub fn validate_options(options: &QueueOptions) -> Result<(), ValidationError> {
    if let Some(expiry) = options.expiry_time {
        if expiry <= 0 {
            return Err(ValidationError::InvalidExpiryTime(expiry));
        }
    }
    if let Some(callback) = &options.callback {
        validate_callback_url(callback)?;
    }
    Ok(())
}

pub fn validate_callback_url(raw: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidCallbackUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

pub fn validate_new_queue(new_queue: &NewQueue) -> Result<(), ValidationError> {
    validate_queue_type(&new_queue.queue_type)?;
    validate_tags(&new_queue.tags)?;
    validate_options(&new_queue.options)
}

pub fn validate_tasks(tasks: &[NewTask]) -> Result<(), ValidationError> {
    if tasks.is_empty() {
        return Err(ValidationError::EmptyTaskList);
    }
    if let Some(index) = tasks.iter().position(|t| t.task_id.trim().is_empty()) {
        return Err(ValidationError::EmptyTaskId { index });
    }
    tasks
        .iter()
        .try_for_each(|task| check_length("taskId", &task.task_id))
}
