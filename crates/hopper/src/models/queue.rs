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

//! Queue model.
//!
//! A queue groups tasks that share ingestion options: the lease applied to
//! claims and the URL notified once every task has reached a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recognized fields of a queue's options blob.
///
/// Serialized with the camelCase keys callers submit (`callback`,
/// `expiryTime`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOptions {
    /// URL receiving the collected results once the queue drains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    /// Claim lease in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<i64>,
}

impl QueueOptions {
    /// Options with a completion callback.
    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback = Some(url.into());
        self
    }

    /// Options with a claim lease.
    pub fn with_expiry(mut self, lease: Duration) -> Self {
        self.expiry_time = Some(lease.as_millis().min(i64::MAX as u128) as i64);
        self
    }

    /// The configured lease, if `expiryTime` is set and positive.
    pub fn lease(&self) -> Option<Duration> {
        match self.expiry_time {
            Some(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
            _ => None,
        }
    }

    /// The lease to apply, falling back to `default` when unset or not positive.
    pub fn lease_or(&self, default: Duration) -> Duration {
        self.lease().unwrap_or(default)
    }

    /// Whether no recognized option is set.
    pub fn is_empty(&self) -> bool {
        self.callback.is_none() && self.expiry_time.is_none()
    }
}

/// A queue as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: i32,
    #[serde(rename = "type")]
    pub queue_type: String,
    pub tags: Vec<String>,
    pub options: QueueOptions,
    pub created_at: DateTime<Utc>,
    /// Set once the completion callback has been claimed for delivery.
    pub callback_fired_at: Option<DateTime<Utc>>,
}

/// Input for creating a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewQueue {
    #[serde(rename = "type")]
    pub queue_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub options: QueueOptions,
}

impl NewQueue {
    pub fn new(queue_type: impl Into<String>) -> Self {
        Self {
            queue_type: queue_type.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }
}
