use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use taskchain::{Affinity, NodeState, TaskNode};
use taskchain_test_utils::{Recorder, init_tracing, test_scheduler, wait_until};

fn ordered_affinity() -> impl Strategy<Value = Affinity> {
    prop_oneof![Just(Affinity::Serial), Just(Affinity::Pump)]
}

fn any_affinity() -> impl Strategy<Value = Affinity> {
    prop_oneof![
        Just(Affinity::Parallel),
        Just(Affinity::Serial),
        Just(Affinity::Pump)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Serial and pump nodes finish in the order they were scheduled.
    #[test]
    fn ordered_affinities_preserve_submission_order(
        affinity in ordered_affinity(),
        count in 1usize..30,
    ) {
        init_tracing();
        let scheduler = test_scheduler();
        let recorder = Recorder::new();

        let nodes: Vec<TaskNode<()>> = (0..count)
            .map(|i| {
                let r = recorder.clone();
                TaskNode::new(&scheduler, format!("n{i}"), affinity, move |_| {
                    r.record(i.to_string());
                    Ok(())
                })
            })
            .collect();

        scheduler.schedule(nodes.iter()).unwrap();
        for node in &nodes {
            node.wait().unwrap();
        }

        let expected: Vec<String> = (0..count).map(|i| i.to_string()).collect();
        prop_assert_eq!(recorder.events(), expected);
    }

    /// A fault at any position stops the chain there; the finally handler
    /// runs exactly once and sees the failure.
    #[test]
    fn fault_stops_chain_and_finally_runs_once(
        affinities in prop::collection::vec(any_affinity(), 1..8),
        fault_seed in any::<usize>(),
        finally_affinity in any_affinity(),
    ) {
        init_tracing();
        let scheduler = test_scheduler();
        let recorder = Recorder::new();
        let fault_at = fault_seed % affinities.len();

        let make = |i: usize, affinity: Affinity| {
            let r = recorder.clone();
            TaskNode::new(&scheduler, format!("n{i}"), affinity, move |_| {
                r.record(i.to_string());
                anyhow::ensure!(i != fault_at, "fault at {i}");
                Ok(())
            })
        };

        let first = make(0, affinities[0]);
        let mut tail = first.clone();
        let mut chain = vec![first];
        for (i, affinity) in affinities.iter().copied().enumerate().skip(1) {
            tail = tail.then(make(i, affinity)).unwrap();
            chain.push(tail.clone());
        }

        let finally_runs = Arc::new(AtomicUsize::new(0));
        let seen: Arc<Mutex<Option<(bool, String)>>> = Arc::default();
        let runs = Arc::clone(&finally_runs);
        let capture = Arc::clone(&seen);
        let done = tail
            .finally(finally_affinity, move |ok, err| {
                runs.fetch_add(1, Ordering::SeqCst);
                let message = err.map(|e| e.to_string()).unwrap_or_default();
                *capture.lock().unwrap() = Some((ok, message));
            })
            .unwrap();

        scheduler.schedule_one(&done).unwrap();
        done.wait().unwrap();

        let expected: Vec<String> = (0..=fault_at).map(|i| i.to_string()).collect();
        prop_assert_eq!(recorder.events(), expected);
        prop_assert_eq!(finally_runs.load(Ordering::SeqCst), 1);
        prop_assert_eq!(
            seen.lock().unwrap().clone(),
            Some((false, format!("fault at {fault_at}")))
        );

        prop_assert_eq!(chain[fault_at].state(), NodeState::Faulted);
        for node in &chain[fault_at + 1..] {
            prop_assert_eq!(node.state(), NodeState::Created);
        }
        // The finally node may finish before the dead tail is released.
        wait_until("dead chain released", || scheduler.pending_continuations() == 0);
    }
}
