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

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use crate::fixtures::TestFixture;
use hopper::{
    CallbackOutcome, HttpCallbackDispatcher, NewQueue, NewTask, QueueOptions, ResultSubmission,
    TaskStatus,
};
use serde_json::{json, Value};
use serial_test::serial;
use tokio::sync::{mpsc, Barrier};

/// Starts a local receiver answering `status` and forwarding each body.
async fn spawn_receiver(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();

    async fn receive(
        State((tx, status)): State<(mpsc::UnboundedSender<Value>, StatusCode)>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let _ = tx.send(body);
        status
    }

    let app = Router::new()
        .route("/done", post(receive))
        .with_state((tx, status));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/done"), rx)
}

fn with_callback(url: &str) -> QueueOptions {
    QueueOptions::default().with_callback(url)
}

#[tokio::test]
#[serial]
async fn test_callback_fires_once_on_completion() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("notify").with_options(with_callback("http://localhost:1/done")),
            vec![NewTask::new("a", json!({})), NewTask::new("b", json!({}))],
        )
        .await
        .unwrap();

    let a = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    let b = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();

    let first = fx
        .engine
        .submit_result(ResultSubmission::completed(a.id, json!(1)))
        .await
        .unwrap();
    assert_eq!(first.callback, CallbackOutcome::NotRequired);
    assert!(fx.recorder.calls().is_empty());

    let last = fx
        .engine
        .submit_result(ResultSubmission::failed(b.id, json!("nope")))
        .await
        .unwrap();
    assert!(last.queue_completed);
    assert_eq!(last.callback, CallbackOutcome::Delivered);

    let calls = fx.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].queue_id, queue.id);
    assert_eq!(calls[0].url, "http://localhost:1/done");
    assert_eq!(calls[0].results[&a.task_id], json!({"result": 1}));
    assert_eq!(calls[0].results[&b.task_id], json!({"error": "nope"}));

    let stored = fx.engine.get_queue(queue.id).await.unwrap();
    assert!(stored.callback_fired_at.is_some());
}

#[tokio::test]
#[serial]
async fn test_queue_without_callback_fires_nothing() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(NewQueue::new("quiet"), vec![NewTask::new("a", json!({}))])
        .await
        .unwrap();
    let task = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();

    let receipt = fx
        .engine
        .submit_result(ResultSubmission::completed(task.id, json!(1)))
        .await
        .unwrap();
    assert!(receipt.queue_completed);
    assert_eq!(receipt.callback, CallbackOutcome::NotRequired);
    assert!(fx.recorder.calls().is_empty());
}

#[tokio::test]
#[serial]
async fn test_callback_is_not_repeated_after_refill() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("refill").with_options(with_callback("http://localhost:1/done")),
            vec![NewTask::new("a", json!({}))],
        )
        .await
        .unwrap();
    let a = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    fx.engine
        .submit_result(ResultSubmission::completed(a.id, json!(1)))
        .await
        .unwrap();

    fx.engine
        .add_tasks(queue.id, vec![NewTask::new("b", json!({}))], None)
        .await
        .unwrap();
    let b = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();
    let receipt = fx
        .engine
        .submit_result(ResultSubmission::completed(b.id, json!(2)))
        .await
        .unwrap();

    assert!(receipt.queue_completed);
    assert_eq!(receipt.callback, CallbackOutcome::AlreadyFired);
    assert_eq!(fx.recorder.calls().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_failed_delivery_keeps_result() {
    let Some(fx) = TestFixture::with_failing_callbacks().await else {
        return;
    };

    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("unreachable").with_options(with_callback("http://localhost:1/done")),
            vec![NewTask::new("a", json!({}))],
        )
        .await
        .unwrap();
    let task = fx.engine.next_by_queue(queue.id).await.unwrap().unwrap();

    let receipt = fx
        .engine
        .submit_result(ResultSubmission::completed(task.id, json!(1)))
        .await
        .unwrap();
    assert_eq!(receipt.status, TaskStatus::Completed);
    assert!(matches!(receipt.callback, CallbackOutcome::Failed(_)));

    let status = fx.engine.get_status(queue.id).await.unwrap();
    assert_eq!(status.completed, 1);
    assert_eq!(fx.recorder.calls().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_final_submissions_fire_once() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };

    let total = 6;
    let tasks = (0..total)
        .map(|i| NewTask::new(format!("t{i}"), json!({})))
        .collect();
    let (queue, _) = fx
        .engine
        .create_queue_and_add_tasks(
            NewQueue::new("race").with_options(with_callback("http://localhost:1/done")),
            tasks,
        )
        .await
        .unwrap();

    let mut claimed = Vec::new();
    while let Some(task) = fx.engine.next_by_queue(queue.id).await.unwrap() {
        claimed.push(task);
    }
    assert_eq!(claimed.len(), total);

    let barrier = Arc::new(Barrier::new(total));
    let handles: Vec<_> = claimed
        .into_iter()
        .map(|task| {
            let engine = fx.engine.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                engine
                    .submit_result(ResultSubmission::completed(task.id, json!(task.task_id)))
                    .await
            })
        })
        .collect();

    let receipts: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let delivered = receipts
        .iter()
        .filter(|r| r.callback == CallbackOutcome::Delivered)
        .count();
    assert_eq!(delivered, 1);
    assert_eq!(receipts.iter().filter(|r| r.queue_completed).count(), 1);

    let calls = fx.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].results.len(), total);
}

#[tokio::test]
#[serial]
async fn test_http_callback_posts_results() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };
    let (url, mut bodies) = spawn_receiver(StatusCode::OK).await;
    let engine = fx.engine.clone().with_dispatcher(Arc::new(
        HttpCallbackDispatcher::new(Duration::from_secs(5)).unwrap(),
    ));

    let (queue, _) = engine
        .create_queue_and_add_tasks(
            NewQueue::new("addition").with_options(with_callback(&url)),
            vec![NewTask::new("t1", json!({"num1": 2, "num2": 3}))],
        )
        .await
        .unwrap();
    let task = engine.next_by_queue(queue.id).await.unwrap().unwrap();

    let receipt = engine
        .submit_result(ResultSubmission::completed(task.id, json!(5)))
        .await
        .unwrap();
    assert_eq!(receipt.callback, CallbackOutcome::Delivered);

    let body = tokio::time::timeout(Duration::from_secs(5), bodies.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body, json!({"t1": {"result": 5}}));
}

#[tokio::test]
#[serial]
async fn test_http_callback_error_status_is_a_failure() {
    let Some(fx) = TestFixture::new().await else {
        return;
    };
    let (url, mut bodies) = spawn_receiver(StatusCode::SERVICE_UNAVAILABLE).await;
    let engine = fx.engine.clone().with_dispatcher(Arc::new(
        HttpCallbackDispatcher::new(Duration::from_secs(5)).unwrap(),
    ));

    let (queue, _) = engine
        .create_queue_and_add_tasks(
            NewQueue::new("flaky-receiver").with_options(with_callback(&url)),
            vec![NewTask::new("t1", json!({}))],
        )
        .await
        .unwrap();
    let task = engine.next_by_queue(queue.id).await.unwrap().unwrap();

    let receipt = engine
        .submit_result(ResultSubmission::completed(task.id, json!(null)))
        .await
        .unwrap();
    assert_eq!(
        receipt.callback,
        CallbackOutcome::Failed("Callback endpoint responded with status 503".to_string())
    );
    assert!(bodies.recv().await.is_some());
    assert_eq!(receipt.status, TaskStatus::Completed);
}
