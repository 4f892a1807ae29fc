//! Property-based agreement tests for the client and server rankings.
//!
//! Uses proptest to verify, for arbitrary task sets and instants:
//! 1. The client ranking and the server ranking produce the same order.
//! 2. Completed tasks always come after every open task.
//! 3. Overdue open tasks always come before open tasks not yet due.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use tasklane::ranking::rank;
use tasklane_proto::task::{Priority, Task, TaskId, TaskStatus, Timestamp};
use tasklane_server::ranking::rank_tasks;

const HOUR: u64 = 60 * 60 * 1000;
const DAY: u64 = 24 * HOUR;
const BASE: u64 = 1_700_000_000_000;

// --- Strategies ---

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High)
    ]
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed)
    ]
}

/// Offsets are drawn from coarse and fine grids so exact ties (equal due
/// dates, equal creation instants) show up often.
fn arb_offset(span: u64) -> impl Strategy<Value = u64> {
    prop_oneof![
        (0..=span / HOUR).prop_map(|h| h * HOUR),
        0..=span,
    ]
}

prop_compose! {
    fn arb_task(index: usize)(
        priority in arb_priority(),
        status in arb_status(),
        created_back in arb_offset(60 * DAY),
        due_shift in arb_offset(120 * DAY),
        touched_after in arb_offset(30 * DAY),
    ) -> Task {
        let now = BASE;
        let created_at = now - created_back;
        // Due anywhere from 60 days ago to 60 days ahead.
        let due = (now - 60 * DAY) + due_shift;
        let updated_at = (created_at + touched_after).min(now);
        Task {
            id: TaskId::new(format!("task-{index:02}")),
            title: format!("task {index}"),
            description: String::new(),
            priority,
            status,
            category: "general".to_string(),
            due_date: Timestamp::from_millis(due),
            created_at: Timestamp::from_millis(created_at),
            updated_at: Timestamp::from_millis(updated_at),
            completed_at: (status == TaskStatus::Completed)
                .then(|| Timestamp::from_millis(updated_at)),
        }
    }
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    (0usize..24).prop_flat_map(|len| (0..len).map(arb_task).collect::<Vec<_>>())
}

fn arb_now() -> impl Strategy<Value = Timestamp> {
    (0..=DAY).prop_map(|shift| Timestamp::from_millis(BASE + shift))
}

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

// --- Properties ---

proptest! {
    #[test]
    fn client_and_server_agree(tasks in arb_tasks(), now in arb_now()) {
        let client = rank(&tasks, now);
        let server = rank_tasks(tasks.clone(), now);
        prop_assert_eq!(ids(&client), ids(&server));
    }

    #[test]
    fn agreement_does_not_depend_on_input_order(tasks in arb_tasks(), now in arb_now()) {
        let mut reversed = tasks.clone();
        reversed.reverse();
        let client = rank(&tasks, now);
        let server = rank_tasks(reversed, now);
        prop_assert_eq!(ids(&client), ids(&server));
    }

    #[test]
    fn completed_tasks_rank_last(tasks in arb_tasks(), now in arb_now()) {
        for ranked in [rank(&tasks, now), rank_tasks(tasks.clone(), now)] {
            let first_completed = ranked
                .iter()
                .position(|t| t.status == TaskStatus::Completed)
                .unwrap_or(ranked.len());
            prop_assert!(ranked[first_completed..]
                .iter()
                .all(|t| t.status == TaskStatus::Completed));
        }
    }

    #[test]
    fn overdue_ranks_before_not_yet_due(tasks in arb_tasks(), now in arb_now()) {
        for ranked in [rank(&tasks, now), rank_tasks(tasks.clone(), now)] {
            let open: Vec<&Task> = ranked
                .iter()
                .filter(|t| t.status != TaskStatus::Completed)
                .collect();
            let first_future = open
                .iter()
                .position(|t| t.due_date > now)
                .unwrap_or(open.len());
            prop_assert!(open[first_future..].iter().all(|t| t.due_date > now));
        }
    }
}

#[test]
fn near_low_priority_outranks_distant_high_priority_on_both_sides() {
    let now = Timestamp::from_millis(BASE);
    let make = |id: &str, priority: Priority, due_in: u64| Task {
        id: TaskId::new(id),
        title: id.to_string(),
        description: String::new(),
        priority,
        status: TaskStatus::Pending,
        category: "general".to_string(),
        due_date: now.plus_millis(due_in),
        created_at: now,
        updated_at: now,
        completed_at: None,
    };
    let tasks = vec![
        make("b", Priority::High, 30 * DAY),
        make("a", Priority::Low, HOUR),
    ];
    assert_eq!(ids(&rank(&tasks, now)), ["a", "b"]);
    assert_eq!(ids(&rank_tasks(tasks, now)), ["a", "b"]);
}
