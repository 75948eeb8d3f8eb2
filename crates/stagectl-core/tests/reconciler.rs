mod support;

use std::time::Duration;

use proptest::prelude::*;

use stagectl_core::clock::Interrupt;
use stagectl_core::deploy::{CleanupTask, ReconcileOutcome, Reconciler};
use stagectl_core::types::{GracePeriod, ResourceState};

use support::{FakeCluster, ManualClock, command_error, handle, pods};

const INTERVAL: Duration = Duration::from_secs(1);

#[test]
fn nothing_to_clean_issues_no_deletes() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");

    let outcome = Reconciler::new(&cluster, &clock, &interrupt, INTERVAL)
        .reconcile(&CleanupTask::new(selector.clone(), 3));

    assert!(outcome.is_cleared());
    assert!(cluster.deletes_of(&selector).is_empty());
}

#[test]
fn graceful_delete_clears_cooperative_resources() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.set(&selector, vec![handle("pod", "backend-1", ResourceState::Ready)]);

    let outcome = Reconciler::new(&cluster, &clock, &interrupt, INTERVAL)
        .reconcile(&CleanupTask::new(selector.clone(), 3));

    assert_eq!(outcome, ReconcileOutcome::Cleared);
    assert_eq!(cluster.deletes_of(&selector), vec![GracePeriod::Default]);
    assert_eq!(clock.sleeps(), vec![INTERVAL]);
}

#[test]
fn stubborn_resources_escalate_then_report_residual() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.set(
        &selector,
        vec![handle("pod", "backend-1", ResourceState::Terminating)],
    );
    cluster.make_stubborn(&selector);

    let outcome = Reconciler::new(&cluster, &clock, &interrupt, INTERVAL)
        .reconcile(&CleanupTask::new(selector.clone(), 2));

    assert_eq!(
        cluster.deletes_of(&selector),
        vec![GracePeriod::Default, GracePeriod::Zero, GracePeriod::Zero]
    );
    match outcome {
        ReconcileOutcome::ResidualResourcesReported {
            remaining,
            last_error,
        } => {
            assert_eq!(remaining.len(), 1);
            assert_eq!(remaining[0].name, "backend-1");
            assert!(last_error.is_none());
        }
        other => panic!("expected residual report, got {:?}", other),
    }
}

#[test]
fn escalation_stays_graceful_without_force() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.set(&selector, vec![handle("pod", "backend-1", ResourceState::Ready)]);
    cluster.make_stubborn(&selector);

    Reconciler::new(&cluster, &clock, &interrupt, INTERVAL)
        .allow_force(false)
        .reconcile(&CleanupTask::new(selector.clone(), 2));

    assert!(
        cluster
            .deletes_of(&selector)
            .iter()
            .all(|grace| !grace.is_forced())
    );
}

#[test]
fn custom_force_grace_is_used_for_escalation() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.set(&selector, vec![handle("pod", "backend-1", ResourceState::Ready)]);
    cluster.make_stubborn(&selector);

    let task = CleanupTask::new(selector.clone(), 1).with_force_grace(GracePeriod::Seconds(1));
    Reconciler::new(&cluster, &clock, &interrupt, INTERVAL).reconcile(&task);

    assert_eq!(
        cluster.deletes_of(&selector),
        vec![GracePeriod::Default, GracePeriod::Seconds(1)]
    );
}

#[test]
fn list_errors_are_carried_into_the_residual_report() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.script(
        &selector,
        vec![
            Err(command_error("get")),
            Err(command_error("get")),
            Err(command_error("get")),
        ],
    );

    let outcome = Reconciler::new(&cluster, &clock, &interrupt, INTERVAL)
        .reconcile(&CleanupTask::new(selector.clone(), 1));

    match outcome {
        ReconcileOutcome::ResidualResourcesReported { last_error, .. } => {
            assert_eq!(last_error, Some(command_error("get")));
        }
        other => panic!("expected residual report, got {:?}", other),
    }
}

#[test]
fn interrupt_stops_before_any_delete() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    interrupt.trigger();
    let selector = pods("app=backend");
    cluster.set(&selector, vec![handle("pod", "backend-1", ResourceState::Ready)]);

    let outcome = Reconciler::new(&cluster, &clock, &interrupt, INTERVAL)
        .reconcile(&CleanupTask::new(selector.clone(), 3));

    assert!(matches!(outcome, ReconcileOutcome::Interrupted { .. }));
    assert!(cluster.mutations().is_empty());
}

proptest! {
    #[test]
    fn reconcile_always_terminates_within_budget(budget in 0u32..6, stubborn in any::<bool>()) {
        let cluster = FakeCluster::new();
        let clock = ManualClock::new();
        let interrupt = Interrupt::new();
        let selector = pods("app=worker");
        cluster.set(&selector, vec![handle("pod", "worker-1", ResourceState::Ready)]);
        if stubborn {
            cluster.make_stubborn(&selector);
        }

        let outcome = Reconciler::new(&cluster, &clock, &interrupt, INTERVAL)
            .reconcile(&CleanupTask::new(selector.clone(), budget));

        let deletes = cluster.deletes_of(&selector).len() as u32;
        prop_assert!(deletes <= budget + 1);
        prop_assert_eq!(outcome.is_cleared(), !stubborn);
    }
}
