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

//! Per-queue status counts.

use serde::{Deserialize, Serialize};

/// Task counts for a queue, grouped by status.
///
/// `completed` counts only successful tasks; errored tasks are reported
/// separately. A queue is complete when every task is in a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total: i64,
    pub available: i64,
    pub processing: i64,
    pub completed: i64,
    pub errored: i64,
}

impl QueueStatus {
    /// Tasks that reached a terminal state.
    pub fn finished(&self) -> i64 {
        self.completed + self.errored
    }

    /// Whether every task has finished. An empty queue is vacuously complete.
    pub fn is_complete(&self) -> bool {
        self.finished() == self.total
    }
}
