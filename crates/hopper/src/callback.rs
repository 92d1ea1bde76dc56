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

//! Completion callback delivery.
//!
//! Delivery runs after the submitting transaction has committed, so it can
//! never undo a result write. The flag that elects the delivering submission
//! is set before delivery: a callback is posted at most once per queue and a
//! failed post is not retried.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::CallbackError;
use crate::models::CallbackOutcome;

/// Delivers a drained queue's results to its callback URL.
#[async_trait]
pub trait CallbackDispatcher: Send + Sync {
    async fn deliver(
        &self,
        queue_id: i32,
        url: &str,
        results: &BTreeMap<String, Value>,
    ) -> Result<(), CallbackError>;
}

/// Posts results as a JSON object `{task_id: result}`.
#[derive(Debug, Clone)]
pub struct HttpCallbackDispatcher {
    client: reqwest::Client,
}

impl HttpCallbackDispatcher {
    /// Creates a dispatcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallbackError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackDispatcher for HttpCallbackDispatcher {
    async fn deliver(
        &self,
        queue_id: i32,
        url: &str,
        results: &BTreeMap<String, Value>,
    ) -> Result<(), CallbackError> {
        let response = self.client.post(url).json(results).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::Status(status.as_u16()));
        }
        info!(queue_id, url, results = results.len(), "Delivered completion callback");
        Ok(())
    }
}

/// Delivers and folds the result into a receipt outcome. Failures are logged
/// and reported, never propagated.
pub(crate) async fn dispatch(
    dispatcher: &dyn CallbackDispatcher,
    queue_id: i32,
    url: &str,
    results: &BTreeMap<String, Value>,
) -> CallbackOutcome {
    match dispatcher.deliver(queue_id, url, results).await {
        Ok(()) => CallbackOutcome::Delivered,
        Err(e) => {
            warn!(queue_id, url, error = %e, "Completion callback failed");
            CallbackOutcome::Failed(e.to_string())
        }
    }
}
