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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::fixtures::TestFixture;
use diesel::prelude::*;
use hopper::{
    HopperError, NewQueue, NewTask, QueueOptions, StorageError, TaskSelector, ValidationError,
};
use serde_json::json;
use serial_test::serial;
use tokio::sync::Barrier;

#[tokio::test]
#[serial]
async fn test_claims_follow_priority() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("ordered"),
            vec![
                NewTask::new("low", json!({})).with_priority(1),
                NewTask::new("mid", json!({})).with_priority(5),
                NewTask::new("high", json!({})).with_priority(10),
            ],
        )
        .await
        .unwrap();

    let mut order = Vec::new();
    while let Some(task) = fx.engine.next_by_queue(queue.id).await.unwrap() {
        assert_eq!(task.queue_id, queue.id);
        order.push(task.priority);
    }
    assert_eq!(order, vec![10, 5, 1]);
}

#[tokio::test]
#[serial]
async fn test_empty_queue_reports_no_task() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let queue = fx
        .engine
        .create_queue(NewQueue::new("idle"))
        .await
        .unwrap();
    assert!(fx.engine.next_by_queue(queue.id).await.unwrap().is_none());
    assert!(fx.engine.next_by_type("idle").await.unwrap().is_none());
    assert!(fx.engine.next_by_queue(12345).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_claim_sets_lease() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("leased")
                .with_options(QueueOptions::default().with_expiry(Duration::from_secs(90))),
            vec![NewTask::new("t1", json!({"x": 1}))],
        )
        .await
        .unwrap();

    let task = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    assert_eq!(task.task_id, "t1");
    assert_eq!(task.params, json!({"x": 1}));
    assert_eq!(task.queue_type, "leased");
    assert_eq!((task.expiry_time - task.start_time).num_milliseconds(), 90_000);

    // Claimed and still leased, so not handed out again.
    assert!(fx.engine.next_by_queue(queue.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_claim_uses_default_lease() {
    let Some(fx) = TestFixture::with_config(|builder| {
        builder.default_expiry(Duration::from_millis(2500))
    })
    .await
    else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(NewQueue::new("default"), vec![NewTask::new("t1", json!({}))])
        .await
        .unwrap();

    let task = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    assert_eq!((task.expiry_time - task.start_time).num_milliseconds(), 2500);
}

#[tokio::test]
#[serial]
async fn test_lapsed_lease_is_reclaimed() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("flaky")
                .with_options(QueueOptions::default().with_expiry(Duration::from_millis(200))),
            vec![NewTask::new("t1", json!({}))],
        )
        .await
        .unwrap();

    let first = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    assert!(fx.engine.next_by_queue(queue.id).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let second = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert!(second.start_time > first.start_time);
    assert!(second.expiry_time > first.expiry_time);

    let status = fx.engine.get_status(queue.id).await.unwrap();
    assert_eq!(status.processing, 1);
    assert_eq!(status.total, 1);
}

#[tokio::test]
#[serial]
async fn test_timed_out_claim_rolls_back() {
    let Some(fx) =
        TestFixture::with_config(|builder| builder.statement_timeout(Duration::from_millis(250)))
            .await
    else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(NewQueue::new("blocked"), vec![NewTask::new("t1", json!({}))])
        .await
        .unwrap();

    // A second connection holds an exclusive table lock for longer than the
    // engine's statement timeout.
    let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
    let conn = fx.engine.database().get_connection().await.unwrap();
    let holder = tokio::spawn(async move {
        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::sql_query("LOCK TABLE tasks IN ACCESS EXCLUSIVE MODE").execute(conn)?;
                let _ = locked_tx.send(());
                std::thread::sleep(Duration::from_millis(1000));
                Ok(())
            })
        })
        .await
    });
    locked_rx.await.unwrap();

    let err = fx.engine.next_by_queue(queue.id).await.unwrap_err();
    assert!(
        matches!(err, HopperError::Storage(StorageError::Database(_))),
        "expected a statement timeout, got {err:?}"
    );
    assert!(err.is_retryable());
    assert!(err.to_string().contains("statement timeout"));

    holder.await.unwrap().unwrap().unwrap();

    // The cancelled claim left nothing behind.
    let status = fx.engine.get_status(queue.id).await.unwrap();
    assert_eq!(status.available, 1);
    assert_eq!(status.processing, 0);

    let claimed = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    assert_eq!(claimed.task_id, "t1");
}

#[tokio::test]
#[serial]
async fn test_claim_by_type_spans_queues() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    for task_id in ["a", "b"] {
        fx.engine
            .create_queue_and_add_tasks(
                NewQueue::new("addition"),
                vec![NewTask::new(task_id, json!({}))],
            )
            .await
            .unwrap();
    }
    fx.engine
        .create_queue_and_add_tasks(
            NewQueue::new("subtraction"),
            vec![NewTask::new("c", json!({}))],
        )
        .await
        .unwrap();

    let mut claimed = HashSet::new();
    while let Some(task) = fx.engine.next_by_type("addition").await.unwrap() {
        assert_eq!(task.queue_type, "addition");
        claimed.insert(task.task_id);
    }
    assert_eq!(claimed, HashSet::from(["a".to_string(), "b".to_string()]));
}

#[tokio::test]
#[serial]
async fn test_claim_by_tags_requires_superset() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (tagged, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("geo").with_tags(["maps", "gpu", "eu"]),
            vec![NewTask::new("render", json!({}))],
        )
        .await
        .unwrap();
    fx.engine
        .create_queue_and_add_tasks(
            NewQueue::new("geo").with_tags(["maps"]),
            vec![NewTask::new("lookup", json!({}))],
        )
        .await
        .unwrap();

    let task = fx
        .engine
        .next_by_tags(&["gpu", "maps"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.queue_id, tagged.id);
    assert_eq!(task.task_id, "render");

    assert!(fx
        .engine
        .next_by_tags(&["gpu", "maps"])
        .await
        .unwrap()
        .is_none());
    assert!(fx.engine.next_by_tags(&["us"]).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_claim_by_tags_rejects_empty_list() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let err = fx
        .engine
        .claim_next(TaskSelector::ByTags(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HopperError::Validation(ValidationError::EmptyTagSelector)
    ));
}

#[tokio::test]
#[serial]
async fn test_claim_by_priority_spans_queues() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    fx.engine
        .create_queue_and_add_tasks(
            NewQueue::new("one"),
            vec![
                NewTask::new("urgent-1", json!({})).with_priority(9),
                NewTask::new("normal-1", json!({})),
            ],
        )
        .await
        .unwrap();
    fx.engine
        .create_queue_and_add_tasks(
            NewQueue::new("two"),
            vec![NewTask::new("urgent-2", json!({})).with_priority(9)],
        )
        .await
        .unwrap();

    let mut claimed = HashSet::new();
    while let Some(task) = fx.engine.next_by_priority(9).await.unwrap() {
        assert_eq!(task.priority, 9);
        claimed.insert(task.task_id);
    }
    assert_eq!(
        claimed,
        HashSet::from(["urgent-1".to_string(), "urgent-2".to_string()])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_single_task_is_claimed_once() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(NewQueue::new("contended"), vec![NewTask::new("only", json!({}))])
        .await
        .unwrap();

    let queue_id = queue.id;
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let engine = fx.engine.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                engine.next_by_queue(queue_id).await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let claimed: Vec<_> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(claimed.iter().filter(|c| c.is_some()).count(), 1);
    assert_eq!(claimed.iter().filter(|c| c.is_none()).count(), workers - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_workers_never_share_tasks() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let total = 40;
    let tasks = (0..total)
        .map(|i| NewTask::new(format!("t{i}"), json!({ "i": i })).with_priority(i % 4))
        .collect();
    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(NewQueue::new("drain"), tasks)
        .await
        .unwrap();

    let queue_id = queue.id;
    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let engine = fx.engine.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                let mut mine = Vec::new();
                while let Some(task) = engine.next_by_queue(queue_id).await.unwrap() {
                    mine.push(task.id);
                }
                mine
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut claimed = 0;
    for joined in futures::future::join_all(handles).await {
        for id in joined.unwrap() {
            claimed += 1;
            assert!(seen.insert(id), "task {id} was claimed twice");
        }
    }
    assert_eq!(claimed, total as usize);

    let status = fx.engine.get_status(queue.id).await.unwrap();
    assert_eq!(status.processing, total as i64);
    assert_eq!(status.available, 0);
}
