//! End-to-end scenarios from the specification's testable-properties
//! section: AfterRestore snapshotting, multi-reader/single-writer
//! concurrency, and lock timeout. The create/rollback/refusal
//! scenarios are covered by `#[cfg(test)]` unit tests alongside
//! `Engine` itself; these three need real threads and real I/O, so
//! they live here as ordinary integration tests instead.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use prevalence_core::{CommandError, Error, Model};
use prevalence_engine::{Engine, EngineConfiguration, SnapshotBehavior};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Counter {
    n: i64,
}
impl Model for Counter {}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum CounterCommand {
    Increment { by: i64 },
    Sleep { millis: u64 },
}

impl prevalence_core::Command<Counter> for CounterCommand {
    type Output = i64;

    fn execute(&self, model: &mut Counter) -> Result<Self::Output, CommandError> {
        match self {
            CounterCommand::Increment { by } => {
                model.n += by;
                Ok(model.n)
            }
            CounterCommand::Sleep { millis } => {
                thread::sleep(Duration::from_millis(*millis));
                Ok(model.n)
            }
        }
    }
}

struct GetN;
impl prevalence_core::Query<Counter> for GetN {
    type Output = i64;
    fn execute(&self, model: &Counter) -> i64 {
        model.n
    }
}

type TestEngine = Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer>;

/// Scenario 4: with `SnapshotBehavior::AfterRestore`, reopening a
/// journal of accepted commands triggers a background snapshot tied
/// to the post-replay state, so a second reopen replays nothing.
#[test]
fn after_restore_snapshot_collapses_the_journal() {
    let dir = tempfile::tempdir().unwrap();
    let base_config = EngineConfiguration::new(dir.path());
    {
        let engine: TestEngine = Engine::create(Counter { n: 0 }, base_config.clone()).unwrap();
        for _ in 0..10 {
            engine.execute_command(CounterCommand::Increment { by: 1 }).unwrap();
        }
        engine.close().unwrap();
    }

    let after_restore_config = EngineConfiguration {
        snapshot_behavior: SnapshotBehavior::AfterRestore,
        ..base_config.clone()
    };
    {
        let engine: TestEngine = Engine::load(after_restore_config.clone()).unwrap();
        assert_eq!(engine.execute_query(GetN).unwrap(), 10);
        // The background worker is guaranteed to already hold the
        // read lock by the time `load` returns (the handshake in
        // `prevalence_engine::background`), but finishing the
        // snapshot write is still asynchronous; give it a moment
        // before sealing the journal.
        thread::sleep(Duration::from_millis(200));
        engine.close().unwrap();
    }

    // Second reopen: the AfterRestore snapshot written above should
    // already cover all 10 commands, so this replays zero entries.
    // We can't observe the replay count directly from here, but we
    // can confirm the value is still exactly 10 and not, say, 20 (the
    // signature of a snapshot tagged with the wrong segment replaying
    // already-captured commands on top of themselves).
    let engine: TestEngine = Engine::load(base_config).unwrap();
    assert_eq!(engine.execute_query(GetN).unwrap(), 10);
}

/// Scenario 5: 8 reader threads querying concurrently with 1 writer
/// thread incrementing. Final count matches the number of accepted
/// commands, and every value a given reader thread observes is
/// monotonically non-decreasing.
///
/// Scaled down from the specification's literal 8×10,000/1×1,000 to
/// keep the default `FileStorage`/`SegmentedFileJournal` combination
/// (which fsyncs every append) fast enough for a routine test run; the
/// invariant under test does not depend on the magnitude.
#[test]
fn concurrent_readers_observe_monotonic_prefixes_of_writer_progress() {
    const READER_THREADS: usize = 8;
    const QUERIES_PER_READER: usize = 500;
    const WRITES: i64 = 200;

    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfiguration::new(dir.path());
    let engine: Arc<TestEngine> = Arc::new(Engine::create(Counter { n: 0 }, config).unwrap());

    let start = Arc::new(Barrier::new(READER_THREADS + 1));

    let readers: Vec<_> = (0..READER_THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let mut last = 0i64;
                for _ in 0..QUERIES_PER_READER {
                    let n = engine.execute_query(GetN).unwrap();
                    assert!(n >= last, "reader observed n go backwards: {n} < {last}");
                    assert!((0..=WRITES).contains(&n), "n={n} outside [0, {WRITES}]");
                    last = n;
                }
                last
            })
        })
        .collect();

    let writer = {
        let engine = Arc::clone(&engine);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            for _ in 0..WRITES {
                engine.execute_command(CounterCommand::Increment { by: 1 }).unwrap();
            }
        })
    };

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(engine.execute_query(GetN).unwrap(), WRITES);
}

/// Scenario 6: a slow command holding the write lock causes a
/// concurrent `Execute` to fail with `Error::Timeout`; once the slow
/// command completes, a subsequent `Execute` succeeds.
#[test]
fn concurrent_command_times_out_while_write_lock_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfiguration {
        lock_timeout: Duration::from_millis(100),
        ..EngineConfiguration::new(dir.path())
    };
    let engine: Arc<TestEngine> = Arc::new(Engine::create(Counter { n: 0 }, config).unwrap());

    let slow_done = Arc::new(AtomicI64::new(0));
    let slow = {
        let engine = Arc::clone(&engine);
        let slow_done = Arc::clone(&slow_done);
        thread::spawn(move || {
            engine.execute_command(CounterCommand::Sleep { millis: 400 }).unwrap();
            slow_done.store(1, Ordering::SeqCst);
        })
    };

    // Give the slow command time to reach `execute` and acquire the
    // write lock before we contend for it.
    thread::sleep(Duration::from_millis(100));
    let result = engine.execute_command(CounterCommand::Increment { by: 1 });
    assert!(
        matches!(result, Err(Error::Timeout(_))),
        "expected a timeout while the slow command holds the write lock, got {result:?}"
    );
    assert_eq!(slow_done.load(Ordering::SeqCst), 0, "slow command should still be running");

    slow.join().unwrap();
    assert_eq!(slow_done.load(Ordering::SeqCst), 1);

    // The lock is free again; a subsequent command must succeed.
    let n = engine.execute_command(CounterCommand::Increment { by: 1 }).unwrap();
    assert_eq!(n, 1);
}
