//! Invariants over event sequences.

use std::sync::atomic::{AtomicBool, Ordering};

use rtmp_relay::controller::{
    HandleSlot, HandleState, MemoryStore, Outcome, StartOutcome, StateStore, StreamController,
    StreamRecord,
};
use rtmp_relay::events::classify;

use super::{controller, feed, FakeHandle, FakeSupervisor, CREATED, DESTROYED, PUBLISHING_AV};

const NOISE: &[&str] = &[
    "2024/05/01 12:00:00 INF [RTSP] listener opened on :8554 (TCP)",
    "2024/05/01 12:00:00 INF [path live/cam1] ready",
    "2024/05/01 12:00:00 INF [RTMP] [conn 10.0.0.5:41000] opened",
    "",
    "garbage ] created [path",
];

/// Small deterministic generator so sequences are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        usize::try_from(self.0 >> 33).unwrap() % bound
    }
}

fn random_line(rng: &mut Lcg) -> String {
    let path = ["live/a", "live/b", "live/c"][rng.next(3)];
    match rng.next(4) {
        0 => format!("[path {path}] created"),
        1 => format!("[path {path}] destroyed"),
        2 => format!("p is publishing to path '{path}', 2 tracks (H264, AAC)"),
        _ => NOISE[rng.next(NOISE.len())].to_string(),
    }
}

fn assert_handles_subset_of_records(controller: &StreamController<FakeSupervisor>) {
    let records = controller.active_paths();
    for path in controller.transcoding_paths() {
        assert!(
            records.contains(&path),
            "handle for {path} without a record"
        );
    }
}

#[tokio::test]
async fn repeated_publishing_never_spawns_twice() {
    let controller = controller();
    feed(&controller, &[CREATED]).await;

    for _ in 0..5 {
        controller.apply(classify(PUBLISHING_AV)).await;
    }

    assert_eq!(controller.supervisor().starts_for("live/cam1"), 1);
    let outcome = controller.apply(classify(PUBLISHING_AV)).await;
    assert_eq!(
        outcome,
        Outcome::Detected {
            path: "live/cam1".to_string(),
            transcoder: StartOutcome::AlreadyRunning
        }
    );
}

#[tokio::test]
async fn failed_stop_still_removes_handle() {
    let controller = controller();
    controller.supervisor().fail_stop(true);
    feed(&controller, &[CREATED, PUBLISHING_AV, DESTROYED]).await;

    assert!(controller.transcoding_paths().is_empty());
    assert!(controller.store().get_handle("live/cam1").is_none());

    // A fresh cycle is not blocked by a stale entry.
    feed(&controller, &[CREATED, PUBLISHING_AV]).await;
    assert_eq!(controller.supervisor().starts_for("live/cam1"), 2);
}

#[tokio::test]
async fn handles_stay_subset_of_records() {
    for seed in 1..=20 {
        let controller = controller();
        let mut rng = Lcg(seed);
        for _ in 0..200 {
            controller.apply(classify(&random_line(&mut rng))).await;
            assert_handles_subset_of_records(&controller);
        }
    }
}

#[tokio::test]
async fn recreate_resets_record() {
    let controller = controller();
    feed(&controller, &[CREATED, PUBLISHING_AV, CREATED]).await;

    assert_eq!(
        controller.record("live/cam1").unwrap(),
        StreamRecord::new("live/cam1")
    );
}

#[tokio::test]
async fn noise_lines_do_not_change_trajectory() {
    let events = [
        "[path live/a] created",
        "p is publishing to path 'live/a', 2 tracks (H264, AAC)",
        "[path live/b] created",
        "[path live/a] destroyed",
        "q is publishing to path 'live/b', 1 track (H264)",
    ];

    let clean = controller();
    let mut clean_trajectory = Vec::new();
    for line in events {
        clean.apply(classify(line)).await;
        clean_trajectory.push((clean.active_paths(), clean.transcoding_paths()));
    }

    let mut rng = Lcg(42);
    let noisy = controller();
    let mut noisy_trajectory = Vec::new();
    for line in events {
        for _ in 0..rng.next(4) {
            let outcome = noisy.apply(classify(NOISE[rng.next(NOISE.len())])).await;
            assert_eq!(outcome, Outcome::Ignored);
        }
        noisy.apply(classify(line)).await;
        noisy_trajectory.push((noisy.active_paths(), noisy.transcoding_paths()));
    }

    assert_eq!(clean_trajectory, noisy_trajectory);
    assert_eq!(clean.supervisor().started(), noisy.supervisor().started());
    assert_eq!(clean.supervisor().stopped(), noisy.supervisor().stopped());
}

/// Store that empties the handle slot right before a handle is registered,
/// as a concurrent stop for the same path would.
#[derive(Default)]
struct RacingStore {
    inner: MemoryStore<FakeHandle>,
    race: AtomicBool,
}

impl StateStore for RacingStore {
    type Handle = FakeHandle;

    fn upsert_record(&self, record: StreamRecord) -> Option<StreamRecord> {
        self.inner.upsert_record(record)
    }

    fn update_record(&self, path: &str, update: &mut dyn FnMut(&mut StreamRecord)) -> bool {
        self.inner.update_record(path, update)
    }

    fn record(&self, path: &str) -> Option<StreamRecord> {
        self.inner.record(path)
    }

    fn remove_record(&self, path: &str) -> Option<StreamRecord> {
        self.inner.remove_record(path)
    }

    fn record_paths(&self) -> Vec<String> {
        self.inner.record_paths()
    }

    fn get_handle(&self, path: &str) -> Option<HandleState> {
        self.inner.get_handle(path)
    }

    fn reserve_handle(&self, path: &str) -> bool {
        self.inner.reserve_handle(path)
    }

    fn set_handle(&self, path: &str, handle: FakeHandle) -> Result<(), FakeHandle> {
        if self.race.load(Ordering::SeqCst) {
            assert!(matches!(
                self.inner.remove_handle(path),
                Some(HandleSlot::Reserved)
            ));
        }
        self.inner.set_handle(path, handle)
    }

    fn release_reservation(&self, path: &str) -> bool {
        self.inner.release_reservation(path)
    }

    fn remove_handle(&self, path: &str) -> Option<HandleSlot<FakeHandle>> {
        self.inner.remove_handle(path)
    }

    fn handle_paths(&self) -> Vec<String> {
        self.inner.handle_paths()
    }
}

#[tokio::test]
async fn transcoder_spawned_after_concurrent_stop_is_stopped() {
    let store = RacingStore::default();
    store.race.store(true, Ordering::SeqCst);
    let controller = StreamController::with_store(FakeSupervisor::default(), store);

    controller.apply(classify(CREATED)).await;
    let outcome = controller.apply(classify(PUBLISHING_AV)).await;

    assert_eq!(
        outcome,
        Outcome::Detected {
            path: "live/cam1".to_string(),
            transcoder: StartOutcome::Cancelled
        }
    );
    assert_eq!(controller.supervisor().started().len(), 1);
    assert_eq!(controller.supervisor().stopped(), controller.supervisor().started());
    assert!(controller.transcoding_paths().is_empty());
}

#[tokio::test]
async fn stop_during_pending_start_cancels_reservation() {
    let controller = controller();
    feed(&controller, &[CREATED]).await;
    assert!(controller.store().reserve_handle("live/cam1"));

    assert!(!controller.stop_transcoding("live/cam1").await);
    assert!(controller.store().get_handle("live/cam1").is_none());
    assert!(controller.supervisor().stopped().is_empty());
}
