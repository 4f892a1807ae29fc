//! Property-based tests for mutation queue ordering.
//!
//! Uses proptest to verify:
//! 1. A drain pass with arbitrary failures leaves exactly the operations a
//!    per-task blocking model predicts, in their original order.
//! 2. What stays queued for a task is always a suffix of its chain.
//! 3. Any number of enqueues survives a reload in order.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use tasklane::queue::{Operation, OperationId};
use tasklane::remote::RemoteError;
use tasklane::remote::loopback::{LoopbackRemote, RemoteCall};
use tasklane::replica::Replica;
use tasklane::storage::InMemoryStore;
use tasklane::sync::{SyncConfig, SyncEngine};
use tasklane_proto::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus, Timestamp};

const DAY: u64 = 24 * 60 * 60 * 1000;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// One queued operation of the generated workload.
#[derive(Debug, Clone)]
struct Planned {
    slot: u8,
    operation_id: OperationId,
}

struct DrainOutcome {
    planned: Vec<Planned>,
    remaining: Vec<OperationId>,
    mutating_calls: usize,
}

/// Queues the workload offline, then runs a single drain with `failures`
/// deciding the fate of each remote mutation in call order.
async fn run_drain(slots: &[u8], failures: &[bool]) -> DrainOutcome {
    let replica = Replica::load(InMemoryStore::new()).await.unwrap().shared();
    let (engine, _events) =
        SyncEngine::new(Arc::clone(&replica), LoopbackRemote::new(), SyncConfig::default());

    let now = Timestamp::now();
    let mut ids: BTreeMap<u8, TaskId> = BTreeMap::new();
    let mut planned = Vec::new();
    {
        let mut replica = replica.lock().await;
        for (n, slot) in slots.iter().copied().enumerate() {
            let operation = if let Some(id) = ids.get(&slot) {
                let patch = if n % 2 == 0 {
                    TaskPatch::status(TaskStatus::InProgress)
                } else {
                    TaskPatch {
                        title: Some(format!("edit {n}")),
                        ..TaskPatch::default()
                    }
                };
                Operation::Update {
                    task_id: id.clone(),
                    patch,
                }
            } else {
                let id = TaskId::new_temporary();
                let new = NewTask::new(format!("task {slot}"), now.plus_millis(DAY))
                    .with_created_at(now);
                replica
                    .cache_mut()
                    .upsert(Task::from_new(id.clone(), &new, now), now);
                ids.insert(slot, id.clone());
                Operation::Create {
                    task_id: id,
                    task: new,
                }
            };
            let operation_id = replica.enqueue(operation, now).await.unwrap();
            planned.push(Planned { slot, operation_id });
        }
    }

    for fail in failures {
        if *fail {
            engine
                .remote()
                .fail_next(RemoteError::Transport("dropped".to_string()));
        } else {
            engine.remote().pass_next();
        }
    }

    engine.set_connectivity(true);
    engine.drain().await.unwrap();

    let remaining = replica.lock().await.queue().ids();
    let mutating_calls = engine
        .remote()
        .calls()
        .iter()
        .filter(|c| !matches!(c, RemoteCall::List))
        .count();
    DrainOutcome {
        planned,
        remaining,
        mutating_calls,
    }
}

/// Expected survivors: walk the queue in order, a failure blocks its task
/// for the rest of the pass, and unscripted calls succeed.
fn model(planned: &[Planned], failures: &[bool]) -> (Vec<OperationId>, usize) {
    let mut blocked: HashSet<u8> = HashSet::new();
    let mut script = failures.iter().copied();
    let mut remaining = Vec::new();
    let mut calls = 0;
    for op in planned {
        if blocked.contains(&op.slot) {
            remaining.push(op.operation_id);
            continue;
        }
        calls += 1;
        if script.next().unwrap_or(false) {
            blocked.insert(op.slot);
            remaining.push(op.operation_id);
        }
    }
    (remaining, calls)
}

proptest! {
    #[test]
    fn drain_matches_blocking_model(
        slots in proptest::collection::vec(0u8..4, 1..16),
        failures in proptest::collection::vec(any::<bool>(), 0..16),
    ) {
        let outcome = runtime().block_on(run_drain(&slots, &failures));
        let (expected, calls) = model(&outcome.planned, &failures);
        prop_assert_eq!(&outcome.remaining, &expected);
        prop_assert_eq!(outcome.mutating_calls, calls);
    }

    #[test]
    fn survivors_are_a_suffix_of_each_chain(
        slots in proptest::collection::vec(0u8..4, 1..16),
        failures in proptest::collection::vec(any::<bool>(), 0..16),
    ) {
        let outcome = runtime().block_on(run_drain(&slots, &failures));
        let remaining: HashSet<OperationId> = outcome.remaining.iter().copied().collect();
        for slot in 0u8..4 {
            let chain: Vec<OperationId> = outcome
                .planned
                .iter()
                .filter(|p| p.slot == slot)
                .map(|p| p.operation_id)
                .collect();
            let first_kept = chain.iter().position(|id| remaining.contains(id));
            if let Some(start) = first_kept {
                prop_assert!(chain[start..].iter().all(|id| remaining.contains(id)));
            }
        }
    }

    #[test]
    fn enqueued_operations_survive_reload(count in 0usize..24) {
        let (before, after) = runtime().block_on(async move {
            let storage = Arc::new(InMemoryStore::new());
            let mut replica = Replica::load(Arc::clone(&storage)).await.unwrap();
            let now = Timestamp::now();
            for n in 0..count {
                replica
                    .enqueue(
                        Operation::Delete { task_id: TaskId::new(format!("task-{n}")) },
                        now,
                    )
                    .await
                    .unwrap();
            }
            let before = replica.queue().peek_all();
            drop(replica);
            let reloaded = Replica::load(storage).await.unwrap();
            (before, reloaded.queue().peek_all())
        });
        prop_assert_eq!(before.len(), count);
        prop_assert_eq!(before, after);
    }
}
