//! Integration tests for offline editing and queue replay.
//!
//! Drives the task service and the sync engine together against the
//! loopback server: tasks are created and edited offline, then drained
//! once connectivity returns.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tasklane::queue::{Operation, OperationKind};
use tasklane::remote::RemoteError;
use tasklane::remote::loopback::{LoopbackRemote, RemoteCall};
use tasklane::replica::Replica;
use tasklane::service::TaskService;
use tasklane::storage::InMemoryStore;
use tasklane::sync::{SyncConfig, SyncEngine, SyncEvent, SyncState};
use tasklane_proto::task::{NewTask, Priority, TaskId, TaskPatch, TaskStatus, Timestamp};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

const HOUR: u64 = 60 * 60 * 1000;
const DAY: u64 = 24 * HOUR;

type Storage = Arc<InMemoryStore>;
type Engine = SyncEngine<Storage, Arc<LoopbackRemote>>;

struct Harness {
    remote: Arc<LoopbackRemote>,
    engine: Arc<Engine>,
    service: TaskService<Storage>,
    events: mpsc::Receiver<SyncEvent>,
}

async fn harness_on(storage: Storage, config: SyncConfig) -> Harness {
    let replica = Replica::load(storage).await.unwrap().shared();
    let remote = Arc::new(LoopbackRemote::new());
    let (engine, events) = SyncEngine::new(Arc::clone(&replica), Arc::clone(&remote), config);
    Harness {
        remote,
        engine: Arc::new(engine),
        service: TaskService::new(replica),
        events,
    }
}

async fn harness() -> Harness {
    harness_on(Arc::new(InMemoryStore::new()), SyncConfig::default()).await
}

fn in_millis(millis: u64) -> Timestamp {
    Timestamp::now().plus_millis(millis)
}

fn retitle(title: &str) -> TaskPatch {
    TaskPatch {
        title: Some(title.to_string()),
        ..TaskPatch::default()
    }
}

fn drain_events(rx: &mut mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Offline create and reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_create_is_reconciled_to_server_id() {
    let mut h = harness().await;

    let task = h
        .service
        .create_task(NewTask::new("Buy milk", in_millis(DAY)))
        .await
        .unwrap();
    assert!(task.id.is_temporary());
    assert!(h.service.is_pending(&task.id).await);
    assert_eq!(h.service.queued_operations().await, 1);

    // Offline: nothing is sent.
    assert_eq!(h.engine.state(), SyncState::Offline);
    assert!(h.engine.drain().await.is_none());
    assert_eq!(h.remote.mutation_count(), 0);

    h.remote.assign_next_id("abc123");
    assert!(h.engine.set_connectivity(true));
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 1);
    assert!(report.refreshed);

    let abc = TaskId::new("abc123");
    let cached = h.service.task(&abc).await.expect("task under server id");
    assert_eq!(cached.title, "Buy milk");
    assert!(h.service.task(&task.id).await.is_none());
    assert!(!h.service.is_pending(&abc).await);
    assert_eq!(h.service.queued_operations().await, 0);
    assert!(h.remote.task(&abc).is_some());

    let events = drain_events(&mut h.events);
    assert!(events.contains(&SyncEvent::Reconciled {
        temporary: task.id.clone(),
        permanent: abc,
    }));
    assert!(events.contains(&SyncEvent::DrainCompleted(report)));
}

#[tokio::test]
async fn update_behind_unconfirmed_create_reaches_server() {
    let h = harness().await;
    let task = h
        .service
        .create_task(NewTask::new("Write report", in_millis(DAY)))
        .await
        .unwrap();
    h.service.complete_task(&task.id).await.unwrap();
    assert_eq!(h.service.queued_operations().await, 2);

    h.remote.assign_next_id("srv-1");
    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 2);

    let server_copy = h.remote.task(&TaskId::new("srv-1")).unwrap();
    assert_eq!(server_copy.status, TaskStatus::Completed);
    assert!(server_copy.completed_at.is_some());
    assert_eq!(
        h.remote.calls()[1],
        RemoteCall::Update(
            TaskId::new("srv-1"),
            TaskPatch::status(TaskStatus::Completed)
        )
    );
}

#[tokio::test]
async fn local_ranking_matches_expected_order_before_and_after_sync() {
    let h = harness().await;
    h.service
        .create_task(NewTask::new("B", in_millis(30 * DAY)).with_priority(Priority::High))
        .await
        .unwrap();
    h.service
        .create_task(NewTask::new("A", in_millis(HOUR)).with_priority(Priority::Low))
        .await
        .unwrap();

    let titles = |tasks: Vec<tasklane_proto::task::Task>| -> Vec<String> {
        tasks.into_iter().map(|t| t.title).collect()
    };
    assert_eq!(titles(h.service.ranked_tasks(Timestamp::now()).await), ["A", "B"]);

    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();
    assert!(report.refreshed);
    assert_eq!(titles(h.service.ranked_tasks(Timestamp::now()).await), ["A", "B"]);
}

// ---------------------------------------------------------------------------
// Per-task ordering under failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_blocks_the_rest_of_that_tasks_chain() {
    let h = harness().await;
    let task = h
        .service
        .create_task(NewTask::new("chain", in_millis(DAY)))
        .await
        .unwrap();
    h.service.complete_task(&task.id).await.unwrap();
    h.service.update_task(&task.id, retitle("renamed")).await.unwrap();

    // O1 ok, O2 fails: O3 must not be attempted.
    h.remote.pass_next();
    h.remote
        .fail_next(RemoteError::Transport("connection reset".to_string()));
    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert!(!report.refreshed);
    assert_eq!(h.remote.mutation_count(), 2);
    assert_eq!(h.service.queued_operations().await, 2);

    // The next pass replays O2 then O3 in order.
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 2);
    let tasks = h.remote.tasks();
    let server_copy = &tasks[0];
    assert_eq!(server_copy.title, "renamed");
    assert_eq!(server_copy.status, TaskStatus::Completed);
}

#[tokio::test]
async fn only_the_failed_tail_stays_queued() {
    let h = harness().await;
    let task = h
        .service
        .create_task(NewTask::new("chain", in_millis(DAY)))
        .await
        .unwrap();
    h.service.complete_task(&task.id).await.unwrap();
    h.service.update_task(&task.id, retitle("final")).await.unwrap();

    h.remote.pass_next();
    h.remote.pass_next();
    h.remote.fail_next(RemoteError::Rejected {
        status: 503,
        message: "maintenance".to_string(),
    });
    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 2);
    assert_eq!(report.failed, 1);

    let replica = h.engine.replica().lock().await;
    let remaining = replica.queue().entries();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].operation.kind(), OperationKind::Update);
    assert_eq!(remaining[0].attempts, 1);
    assert!(remaining[0].last_error.is_some());
    let Operation::Update { task_id, patch } = &remaining[0].operation else {
        panic!("expected an update");
    };
    assert!(!task_id.is_temporary());
    assert_eq!(patch.title.as_deref(), Some("final"));
    // The unconfirmed edit is still what the user sees.
    assert_eq!(replica.cache().get(task_id).unwrap().title, "final");
    assert!(replica.cache().is_pending(task_id));
}

#[tokio::test]
async fn failure_on_one_task_does_not_block_another() {
    let h = harness().await;
    let first = h
        .service
        .create_task(NewTask::new("first", in_millis(DAY)))
        .await
        .unwrap();
    h.service
        .create_task(NewTask::new("second", in_millis(DAY)))
        .await
        .unwrap();
    h.service.complete_task(&first.id).await.unwrap();

    h.remote
        .fail_next(RemoteError::Transport("timeout".to_string()));
    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.remote.tasks().len(), 1);
    assert_eq!(h.remote.tasks()[0].title, "second");
}

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_survives_restart_in_order() {
    let storage: Storage = Arc::new(InMemoryStore::new());
    let before = {
        let h = harness_on(Arc::clone(&storage), SyncConfig::default()).await;
        for title in ["one", "two", "three"] {
            h.service
                .create_task(NewTask::new(title, in_millis(DAY)))
                .await
                .unwrap();
        }
        let ids = h.engine.replica().lock().await.queue().ids();
        assert_eq!(ids.len(), 3);
        ids
    };

    let h = harness_on(storage, SyncConfig::default()).await;
    let replica = h.engine.replica().lock().await;
    assert_eq!(replica.queue().ids(), before);
    assert_eq!(replica.cache().len(), 3);
    assert_eq!(replica.cache().pending().len(), 3);
    drop(replica);

    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 3);
    let mut titles: Vec<String> = h.remote.tasks().into_iter().map(|t| t.title).collect();
    titles.sort();
    assert_eq!(titles, ["one", "three", "two"]);
}

// ---------------------------------------------------------------------------
// Connectivity and concurrent local edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connectivity_lost_mid_pass_stops_after_in_flight_call() {
    let h = harness().await;
    for title in ["first", "second"] {
        h.service
            .create_task(NewTask::new(title, in_millis(DAY)))
            .await
            .unwrap();
    }

    let engine: Weak<Engine> = Arc::downgrade(&h.engine);
    let fired = AtomicBool::new(false);
    h.remote.on_call(move |call| {
        if matches!(call, RemoteCall::Create(_))
            && !fired.swap(true, Ordering::SeqCst)
            && let Some(engine) = engine.upgrade()
        {
            engine.set_connectivity(false);
        }
    });

    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.skipped, 1);
    assert!(!report.refreshed);
    assert_eq!(h.engine.state(), SyncState::Offline);
    assert_eq!(h.service.queued_operations().await, 1);

    assert!(h.engine.set_connectivity(true));
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 1);
    assert_eq!(h.remote.tasks().len(), 2);
}

#[tokio::test]
async fn delete_while_create_in_flight_is_compensated() {
    let h = harness().await;
    let task = h
        .service
        .create_task(NewTask::new("Doomed", in_millis(DAY)))
        .await
        .unwrap();

    // The user deletes the task while the create is on the wire.
    let replica = Arc::clone(h.engine.replica());
    let temp = task.id.clone();
    h.remote.on_call(move |call| {
        if matches!(call, RemoteCall::Create(_))
            && let Ok(mut guard) = replica.try_lock()
        {
            let (cache, queue) = guard.split_mut();
            cache.remove(&temp, Timestamp::now());
            queue.remove_for_task(&temp);
        }
    });

    h.remote.assign_next_id("perm-1");
    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 1);
    assert!(h.remote.task(&TaskId::new("perm-1")).is_some());

    // A delete for the server id is queued in its place.
    {
        let replica = h.engine.replica().lock().await;
        let entries = replica.queue().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].operation,
            Operation::Delete {
                task_id: TaskId::new("perm-1")
            }
        );
        assert!(replica.cache().is_empty());
    }

    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 1);
    assert!(report.refreshed);
    assert!(h.remote.tasks().is_empty());
    assert!(h.service.ranked_tasks(Timestamp::now()).await.is_empty());
}

#[tokio::test]
async fn deleting_an_unsynced_task_sends_nothing() {
    let h = harness().await;
    let task = h
        .service
        .create_task(NewTask::new("never mind", in_millis(DAY)))
        .await
        .unwrap();
    h.service.complete_task(&task.id).await.unwrap();
    h.service.delete_task(&task.id).await.unwrap();
    assert_eq!(h.service.queued_operations().await, 0);

    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(h.remote.mutation_count(), 0);
}

#[tokio::test]
async fn deleting_a_synced_task_reaches_server() {
    let h = harness().await;
    let task = h
        .service
        .create_task(NewTask::new("synced", in_millis(DAY)))
        .await
        .unwrap();
    h.remote.assign_next_id("srv-9");
    h.engine.set_connectivity(true);
    h.engine.drain().await.unwrap();
    assert!(h.service.task(&task.id).await.is_none());

    let id = TaskId::new("srv-9");
    h.service.delete_task(&id).await.unwrap();
    let report = h.engine.drain().await.unwrap();
    assert_eq!(report.confirmed, 1);
    assert!(h.remote.task(&id).is_none());
    assert_eq!(h.remote.calls().last(), Some(&RemoteCall::List));
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_create_is_dropped_with_its_chain() {
    let config = SyncConfig {
        max_rejections: 1,
        ..SyncConfig::default()
    };
    let mut h = harness_on(Arc::new(InMemoryStore::new()), config).await;
    let task = h
        .service
        .create_task(NewTask::new("refused", in_millis(DAY)))
        .await
        .unwrap();
    h.service.complete_task(&task.id).await.unwrap();

    h.remote.fail_next(RemoteError::Rejected {
        status: 422,
        message: "unprocessable".to_string(),
    });
    h.engine.set_connectivity(true);
    let report = h.engine.drain().await.unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(h.service.queued_operations().await, 0);
    assert!(h.service.task(&task.id).await.is_none());

    let rejected: Vec<_> = drain_events(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::OperationRejected { kind, task_id, .. } => Some((kind, task_id)),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec![(OperationKind::Create, task.id.clone())]);
}

#[tokio::test]
async fn rejection_is_retried_until_the_limit() {
    let h = harness().await;
    let task = h
        .service
        .create_task(NewTask::new("flaky", in_millis(DAY)))
        .await
        .unwrap();
    let rejection = RemoteError::Rejected {
        status: 409,
        message: "conflict".to_string(),
    };
    for _ in 0..3 {
        h.remote.fail_next(rejection.clone());
    }
    h.engine.set_connectivity(true);

    let first = h.engine.drain().await.unwrap();
    assert_eq!(first.failed, 1);
    let second = h.engine.drain().await.unwrap();
    assert_eq!(second.failed, 1);
    let third = h.engine.drain().await.unwrap();
    assert_eq!(third.rejected, 1);
    assert!(h.service.task(&task.id).await.is_none());
}
