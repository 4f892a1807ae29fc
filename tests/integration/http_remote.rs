//! Integration tests for the HTTP remote against an in-process server.
//!
//! Each test starts `tasklane-server` on an OS-assigned port and talks to
//! it through [`HttpRemote`], either directly or through the sync engine.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::time::Duration;

use tasklane::remote::http::HttpRemote;
use tasklane::remote::{RemoteApi, RemoteError};
use tasklane::replica::Replica;
use tasklane::service::TaskService;
use tasklane::storage::InMemoryStore;
use tasklane::sync::{SyncConfig, SyncEngine};
use tasklane_proto::task::{NewTask, Priority, TaskId, TaskPatch, TaskStatus, Timestamp};
use tasklane_server::api;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

const HOUR: u64 = 60 * 60 * 1000;
const DAY: u64 = 24 * HOUR;

struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start() -> TestServer {
    let (addr, handle) = api::start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server");
    TestServer { addr, handle }
}

fn client(server: &TestServer) -> HttpRemote {
    HttpRemote::new(&format!("http://{}", server.addr), Duration::from_secs(5)).unwrap()
}

fn tomorrow() -> Timestamp {
    Timestamp::now().plus_millis(DAY)
}

fn status_of(error: &RemoteError) -> Option<u16> {
    match error {
        RemoteError::Rejected { status, .. } => Some(*status),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Direct API calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_reachable_server() {
    let server = start().await;
    assert!(client(&server).health().await);
}

#[tokio::test]
async fn crud_round_trip() {
    let server = start().await;
    let remote = client(&server);

    let created = remote
        .create(&NewTask::new("Buy milk", tomorrow()).with_category("errands"))
        .await
        .unwrap();
    assert!(!created.id.is_temporary());
    assert_eq!(created.category, "errands");

    let updated = remote
        .update(&created.id, &TaskPatch::status(TaskStatus::Completed))
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Completed);
    assert!(updated.completed_at.is_some());

    let listed = remote.list().await.unwrap();
    assert_eq!(listed, vec![updated]);

    remote.delete(&created.id).await.unwrap();
    assert!(remote.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn validation_failures_are_non_retryable_rejections() {
    let server = start().await;
    let remote = client(&server);

    let err = remote
        .create(&NewTask::new("   ", tomorrow()))
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(400));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("title"));

    let past = Timestamp::now().minus_millis(HOUR);
    let err = remote.create(&NewTask::new("late", past)).await.unwrap_err();
    assert_eq!(status_of(&err), Some(400));

    let task = remote.create(&NewTask::new("ok", tomorrow())).await.unwrap();
    let err = remote
        .update(&task.id, &TaskPatch::default())
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(400));
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let server = start().await;
    let remote = client(&server);
    let missing = TaskId::new("does-not-exist");

    let err = remote
        .update(&missing, &TaskPatch::status(TaskStatus::Completed))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = remote.delete(&missing).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_listing_is_ranked() {
    let server = start().await;
    let remote = client(&server);
    let now = Timestamp::now();
    remote
        .create(&NewTask::new("B", now.plus_millis(30 * DAY)).with_priority(Priority::High))
        .await
        .unwrap();
    remote
        .create(&NewTask::new("A", now.plus_millis(HOUR)).with_priority(Priority::Low))
        .await
        .unwrap();

    let titles: Vec<String> = remote
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, ["A", "B"]);
}

// ---------------------------------------------------------------------------
// Full drain over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_edits_drain_through_http() {
    let server = start().await;
    let replica = Replica::load(InMemoryStore::new()).await.unwrap().shared();
    let service = TaskService::new(replica.clone());
    let (engine, _events) = SyncEngine::new(replica, client(&server), SyncConfig::default());

    let task = service
        .create_task(NewTask::new("Buy milk", tomorrow()))
        .await
        .unwrap();
    service.complete_task(&task.id).await.unwrap();
    let doomed = service
        .create_task(NewTask::new("never sent", tomorrow()))
        .await
        .unwrap();
    service.delete_task(&doomed.id).await.unwrap();

    assert!(engine.set_connectivity(true));
    let report = engine.drain().await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.confirmed, 2);
    assert!(report.refreshed);

    let ranked = service.ranked_tasks(Timestamp::now()).await;
    assert_eq!(ranked.len(), 1);
    assert!(!ranked[0].id.is_temporary());
    assert_eq!(ranked[0].status, TaskStatus::Completed);
    assert_eq!(ranked[0].created_at, task.created_at);
    assert_eq!(service.queued_operations().await, 0);

    let server_side = engine.remote().list().await.unwrap();
    assert_eq!(server_side, ranked);
}

#[tokio::test]
async fn unreachable_server_keeps_operations_queued() {
    let server = start().await;
    let addr = server.addr;
    drop(server);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let replica = Replica::load(InMemoryStore::new()).await.unwrap().shared();
    let service = TaskService::new(replica.clone());
    let remote = HttpRemote::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let (engine, _events) = SyncEngine::new(replica, remote, SyncConfig::default());

    service
        .create_task(NewTask::new("waiting", tomorrow()))
        .await
        .unwrap();
    engine.set_connectivity(true);
    let report = engine.drain().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.rejected, 0);
    assert_eq!(service.queued_operations().await, 1);
}
