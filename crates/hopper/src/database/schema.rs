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

//! Diesel table definitions for the queue/task schema.
//!
//! Kept in sync by hand with `migrations/postgres`.

diesel::table! {
    queues (id) {
        id -> Int4,
        #[sql_name = "type"]
        queue_type -> Varchar,
        tags -> Nullable<Array<Text>>,
        options -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        callback_fired_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    tasks (id) {
        id -> Int4,
        task_id -> Varchar,
        params -> Jsonb,
        priority -> Int4,
        status -> Varchar,
        result -> Nullable<Jsonb>,
        start_time -> Nullable<Timestamptz>,
        end_time -> Nullable<Timestamptz>,
        expiry_time -> Nullable<Timestamptz>,
        queue_id -> Int4,
    }
}

diesel::joinable!(tasks -> queues (queue_id));
diesel::allow_tables_to_appear_in_same_query!(queues, tasks);
