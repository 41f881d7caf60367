mod common;
use crate::common::{Recorder, TestResult, init_tracing, test_scheduler, wait_until};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use taskchain::engine::InterleaveCoordinator;
use taskchain::{Affinity, AnyNode, NodeState, TaskNode};

fn recording_nodes(
    scheduler: &taskchain::Scheduler,
    recorder: &Recorder,
    affinity: Affinity,
    n: usize,
) -> Vec<TaskNode<()>> {
    (0..n)
        .map(|i| {
            let r = recorder.clone();
            TaskNode::new(scheduler, format!("{affinity}-{i}"), affinity, move |_| {
                r.record(i.to_string());
                Ok(())
            })
        })
        .collect()
}

fn wait_all(nodes: &[TaskNode<()>]) -> TestResult {
    for node in nodes {
        node.wait()?;
    }
    Ok(())
}

#[test]
fn serial_nodes_complete_in_submission_order() -> TestResult {
    init_tracing();
    let scheduler = test_scheduler();
    let recorder = Recorder::new();

    let nodes = recording_nodes(&scheduler, &recorder, Affinity::Serial, 25);
    scheduler.schedule(nodes.iter())?;
    wait_all(&nodes)?;

    let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
    assert_eq!(recorder.events(), expected);
    Ok(())
}

#[test]
fn pump_nodes_complete_in_submission_order() -> TestResult {
    init_tracing();
    let scheduler = test_scheduler();
    let recorder = Recorder::new();

    let nodes = recording_nodes(&scheduler, &recorder, Affinity::Pump, 25);
    scheduler.schedule(nodes.iter())?;
    wait_all(&nodes)?;

    let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
    assert_eq!(recorder.events(), expected);
    Ok(())
}

#[test]
fn parallel_nodes_all_complete() -> TestResult {
    init_tracing();
    let scheduler = test_scheduler();
    let recorder = Recorder::new();

    let nodes = recording_nodes(&scheduler, &recorder, Affinity::Parallel, 40);
    scheduler.schedule(nodes.iter())?;
    wait_all(&nodes)?;

    let mut seen: Vec<usize> = recorder
        .events()
        .iter()
        .map(|e| e.parse().unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..40).collect::<Vec<_>>());
    assert!(nodes.iter().all(|n| n.state() == NodeState::Completed));
    Ok(())
}

#[test]
fn only_pump_nodes_run_on_the_pump_thread() -> TestResult {
    init_tracing();
    let scheduler = test_scheduler();
    let pump_thread = scheduler.pump().thread_id();
    let misplaced = Arc::new(AtomicUsize::new(0));

    let mut nodes: Vec<AnyNode> = Vec::new();
    for affinity in [Affinity::Parallel, Affinity::Serial, Affinity::Pump] {
        for i in 0..10 {
            let misplaced = Arc::clone(&misplaced);
            let node = TaskNode::new(&scheduler, format!("{affinity}-{i}"), affinity, move |_| {
                let on_pump = thread::current().id() == pump_thread;
                if on_pump != (affinity == Affinity::Pump) {
                    misplaced.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            });
            nodes.push(node.handle());
        }
    }

    scheduler.schedule(nodes.iter().cloned())?;
    for node in &nodes {
        node.wait()?;
    }
    assert_eq!(misplaced.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn pump_continuation_moves_off_the_pump_thread() -> TestResult {
    init_tracing();
    let scheduler = test_scheduler();
    let pump_thread = scheduler.pump().thread_id();

    for next_affinity in [Affinity::Parallel, Affinity::Serial] {
        let a = TaskNode::new(&scheduler, "on-pump", Affinity::Pump, |_| {
            Ok(thread::current().id())
        });
        let b = a.then(TaskNode::new(&scheduler, "off-pump", next_affinity, |_| {
            Ok(thread::current().id())
        }))?;

        scheduler.schedule_one(&b)?;
        assert_eq!(a.result()?, pump_thread);
        assert_ne!(b.result()?, pump_thread);
    }
    Ok(())
}

#[test]
fn serial_work_never_overlaps_parallel_work() -> TestResult {
    init_tracing();
    let scheduler = test_scheduler();
    let parallel_running = Arc::new(AtomicUsize::new(0));
    let serial_running = Arc::new(AtomicBool::new(false));
    let violations = Arc::new(AtomicUsize::new(0));

    let mut nodes: Vec<AnyNode> = Vec::new();
    for i in 0..24 {
        let parallel_running = Arc::clone(&parallel_running);
        let serial_running = Arc::clone(&serial_running);
        let violations = Arc::clone(&violations);

        let node = if i % 3 == 0 {
            TaskNode::new(&scheduler, format!("serial-{i}"), Affinity::Serial, move |_| {
                serial_running.store(true, Ordering::SeqCst);
                if parallel_running.load(Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(5));
                if parallel_running.load(Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                serial_running.store(false, Ordering::SeqCst);
                Ok(())
            })
        } else {
            TaskNode::new(&scheduler, format!("parallel-{i}"), Affinity::Parallel, move |_| {
                parallel_running.fetch_add(1, Ordering::SeqCst);
                if serial_running.load(Ordering::SeqCst) {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(5));
                parallel_running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        };
        nodes.push(node.handle());
    }

    scheduler.schedule(nodes.iter().cloned())?;
    for node in &nodes {
        node.wait()?;
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    // Admissions are released just after the last node reports completion.
    wait_until("admissions released", || {
        let coordinator = scheduler.coordinator();
        coordinator.parallel_active() == 0 && !coordinator.serial_active() && coordinator.is_idle()
    });
    Ok(())
}

#[test]
fn waiting_serial_job_is_admitted_ahead_of_later_parallel_jobs() {
    init_tracing();
    let coordinator = Arc::new(InterleaveCoordinator::new());
    let order = Recorder::new();

    let first = coordinator.enter_parallel();
    assert_eq!(coordinator.parallel_active(), 1);

    let serial = {
        let coordinator = Arc::clone(&coordinator);
        let order = order.clone();
        thread::spawn(move || {
            let _admission = coordinator.enter_serial();
            order.record("serial");
        })
    };
    thread::sleep(Duration::from_millis(50));

    let late = {
        let coordinator = Arc::clone(&coordinator);
        let order = order.clone();
        thread::spawn(move || {
            let _admission = coordinator.enter_parallel();
            order.record("late parallel");
        })
    };
    thread::sleep(Duration::from_millis(50));

    // The serial job queued behind the running parallel job, and the late
    // parallel job queued behind it.
    assert!(order.is_empty());
    assert!(!coordinator.is_idle());

    drop(first);
    serial.join().unwrap();
    late.join().unwrap();

    assert_eq!(order.events(), vec!["serial", "late parallel"]);
    assert_eq!(coordinator.parallel_active(), 0);
    assert!(!coordinator.serial_active());
    assert!(coordinator.is_idle());
}
