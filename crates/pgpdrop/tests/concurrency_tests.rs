//! Concurrent invocations inside one test process.
//!
//! Each thread builds its own `Invocation`, so each opens its own lock file
//! descriptors; `flock` treats them as independent holders exactly as it
//! would separate processes.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use serial_test::serial;

use common::TestHarness;
use pgpdrop::{Invocation, QueueStore, RunOutcome};

#[test]
#[serial]
fn test_racing_invocations_decrypt_each_item_once() {
    let harness = TestHarness::with_delay(0.2);
    let names = harness.seed_inputs(6);
    let worker = Arc::new(harness.worker_config());

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let worker = Arc::clone(&worker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let invocation = Invocation::from_worker_config(&worker);
                barrier.wait();
                invocation.run_once().unwrap()
            })
        })
        .collect();

    let outcomes: Vec<RunOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let drained: Vec<_> = outcomes.iter().filter_map(|o| o.report()).collect();
    assert_eq!(drained.len(), 1, "exactly one invocation drains: {:?}", outcomes);
    assert_eq!(drained[0].completed.len(), 6);
    assert!(drained[0].failed.is_empty());

    let completions = harness.completions();
    assert_eq!(completions.len(), 6);
    let unique: HashSet<&String> = completions.iter().collect();
    assert_eq!(unique.len(), 6);

    for name in &names {
        let output = harness.output_path(&name.replace(".pgp", ".txt"));
        assert!(output.exists(), "missing {}", output.display());
    }
    assert!(harness.queue_lines().is_empty());
}

#[test]
#[serial]
fn test_enqueue_only_invocation_leaves_items_for_drainer() {
    let harness = TestHarness::with_delay(0.3);
    harness.seed_inputs(2);
    let worker = harness.worker_config();

    let drainer = Invocation::from_worker_config(&worker);
    let drainer_thread = thread::spawn(move || drainer.run_once().unwrap());

    // Wait until the first item is in flight, then drop a new file and run
    // a second invocation against the busy drainer.
    assert!(TestHarness::wait_until(
        std::time::Duration::from_secs(5),
        || harness.queue_lines().len() == 1
    ));
    harness.write_input("late.pgp", b"late");
    let late = Invocation::from_worker_config(&worker).run_once().unwrap();
    // The in-flight item may be re-enqueued too; the drainer skips it once
    // its output exists.
    assert!(
        matches!(late, RunOutcome::EnqueueOnly { enqueued } if enqueued >= 1),
        "{:?}",
        late
    );

    let outcome = drainer_thread.join().unwrap();
    assert_eq!(outcome.report().unwrap().completed.len(), 3);
    assert!(harness.output_path("late.txt").exists());
    assert!(Invocation::from_worker_config(&worker)
        .queue()
        .pending()
        .unwrap()
        .is_empty());
}

#[test]
#[serial]
fn test_failed_item_does_not_block_the_rest() {
    let harness = TestHarness::new();
    harness.write_input("a.pgp", b"a");
    harness.write_input("b-fail.pgp", b"b");
    harness.write_input("c.pgp", b"c");
    let worker = harness.worker_config();

    let outcome = Invocation::from_worker_config(&worker).run_once().unwrap();
    let report = outcome.report().unwrap();

    assert_eq!(report.completed.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0.as_str(), "b-fail.pgp");
    assert!(report.failed[0].1.contains("Bad session key"));
    assert!(!harness.output_path("b-fail.txt").exists());
    let partials: Vec<_> = std::fs::read_dir(&harness.intake_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".partial"))
        .collect();
    assert!(partials.is_empty(), "{:?}", partials);
    assert!(harness.queue_lines().is_empty());
}
