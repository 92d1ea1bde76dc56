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

//! Domain types for queues, tasks and their aggregate views.
//!
//! These are the types engine callers see. The diesel row structs they are
//! converted from live in [`crate::dal::models`].

pub mod queue;
pub mod status;
pub mod submission;
pub mod task;

pub use queue::{NewQueue, Queue, QueueOptions};
pub use status::QueueStatus;
pub use submission::{CallbackOutcome, ResultSubmission, SubmitOutcome, SubmitReceipt};
pub use task::{ClaimedTask, IngestReport, NewTask, TaskStatus, DEFAULT_PRIORITY};
