mod support;

use std::time::Duration;

use stagectl_core::clock::Interrupt;
use stagectl_core::deploy::{GateOutcome, HealthGate};
use stagectl_core::error::FailureReason;
use stagectl_core::plan::Readiness;
use stagectl_core::types::ResourceState;

use support::{FakeCluster, ManualClock, command_error, handle, pods};

const INTERVAL: Duration = Duration::from_secs(2);

#[test]
fn ready_on_first_poll_does_not_sleep() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.set(&selector, vec![handle("pod", "backend-1", ResourceState::Ready)]);

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let outcome = gate.await_ready(&selector, Readiness::AllReady, Duration::from_secs(10));

    assert!(matches!(outcome, GateOutcome::Ready { polls: 1, .. }));
    assert!(clock.sleeps().is_empty());
}

#[test]
fn poll_errors_are_retried_until_ready() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.script(
        &selector,
        vec![
            Err(command_error("get")),
            Ok(vec![handle("pod", "backend-1", ResourceState::Pending)]),
        ],
    );
    cluster.set(&selector, vec![handle("pod", "backend-1", ResourceState::Ready)]);

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let outcome = gate.await_ready(&selector, Readiness::AllReady, Duration::from_secs(10));

    assert!(matches!(outcome, GateOutcome::Ready { polls: 3, .. }));
    assert_eq!(clock.elapsed(), Duration::from_secs(4));
}

#[test]
fn timeout_bounds_polls_and_elapsed_time() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("tier=data");
    cluster.set(&selector, vec![handle("pod", "db-0", ResourceState::Pending)]);

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let outcome = gate.await_ready(&selector, Readiness::AllReady, Duration::from_secs(10));

    match outcome {
        GateOutcome::TimedOut {
            observed, polls, ..
        } => {
            assert_eq!(polls, 5);
            assert_eq!(observed[0].state, ResourceState::Pending);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(cluster.gets_of(&selector), 5);
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
}

#[test]
fn last_sleep_is_clipped_to_the_deadline() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("tier=data");

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let outcome = gate.await_ready(&selector, Readiness::AllReady, Duration::from_secs(5));

    assert!(matches!(outcome, GateOutcome::TimedOut { polls: 3, .. }));
    assert_eq!(
        clock.sleeps(),
        vec![INTERVAL, INTERVAL, Duration::from_secs(1)]
    );
}

#[test]
fn timeout_keeps_the_last_error() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("tier=data");
    cluster.script(&selector, vec![Err(command_error("get")), Err(command_error("get"))]);

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let outcome = gate.await_ready(&selector, Readiness::AllReady, Duration::from_secs(4));

    let reason = outcome.failure(&selector, Duration::from_secs(4)).unwrap();
    match reason {
        FailureReason::HealthTimedOut {
            polls, last_error, ..
        } => {
            assert_eq!(polls, 2);
            assert_eq!(last_error, Some(command_error("get")));
        }
        other => panic!("expected health timeout, got {:?}", other),
    }
}

#[test]
fn gone_is_satisfied_by_an_empty_match() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let outcome = gate.await_ready(&pods("app=frontend"), Readiness::Gone, Duration::from_secs(10));

    assert!(outcome.is_ready());
}

#[test]
fn interrupt_returns_without_polling() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    interrupt.trigger();
    let selector = pods("app=backend");

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let outcome = gate.await_ready(&selector, Readiness::AllReady, Duration::from_secs(10));

    assert!(matches!(outcome, GateOutcome::Interrupted { .. }));
    assert_eq!(cluster.gets_of(&selector), 0);
    assert!(outcome.failure(&selector, Duration::from_secs(10)).unwrap().is_interrupt());
}

#[test]
fn check_once_never_waits() {
    let cluster = FakeCluster::new();
    let clock = ManualClock::new();
    let interrupt = Interrupt::new();
    let selector = pods("app=backend");
    cluster.set(&selector, vec![handle("pod", "backend-1", ResourceState::Pending)]);

    let gate = HealthGate::new(&cluster, &clock, &interrupt, INTERVAL);
    let (ready, observed) = gate.check_once(&selector, Readiness::AllReady).unwrap();

    assert!(!ready);
    assert_eq!(observed.len(), 1);
    assert!(clock.sleeps().is_empty());
}
