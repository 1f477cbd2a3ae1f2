//! Sync engine: scheduling, single-flight, and adapter fan-out

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::db::{keys, MetadataStore};
use crate::error::Result;
use crate::util::{self, format_timestamp};

use super::adapter::SyncAdapter;
use super::connectivity::Connectivity;

/// Drives the per-entity adapters.
///
/// Cheap to clone; all clones share the same state, so the scheduler task
/// and host-triggered calls coordinate through one single-flight lock.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

struct Inner {
    adapters: Vec<Arc<dyn SyncAdapter>>,
    meta: Arc<dyn MetadataStore>,
    connectivity: Arc<dyn Connectivity>,
    sync_lock: Mutex<()>,
    cycles: AtomicU64,
    running: AtomicBool,
    shutdown: StdMutex<Option<watch::Sender<bool>>>,
    scheduler: StdMutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        adapters: Vec<Arc<dyn SyncAdapter>>,
        meta: Arc<dyn MetadataStore>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapters,
                meta,
                connectivity,
                sync_lock: Mutex::new(()),
                cycles: AtomicU64::new(0),
                running: AtomicBool::new(false),
                shutdown: StdMutex::new(None),
                scheduler: StdMutex::new(None),
            }),
        }
    }

    /// Start the background scheduler.
    ///
    /// Runs one immediate cycle, then a cycle every `interval` while the
    /// device is online, plus an extra cycle on every offline-to-online
    /// transition. Calling this while already started is a no-op.
    pub fn start(&self, interval: Duration) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Sync engine already started");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        if let Ok(mut slot) = self.inner.shutdown.lock() {
            *slot = Some(shutdown_tx);
        }

        let engine = self.clone();
        let handle = tokio::spawn(engine.scheduler_loop(interval, shutdown_rx));
        if let Ok(mut slot) = self.inner.scheduler.lock() {
            *slot = Some(handle);
        }
        info!(interval_secs = interval.as_secs(), "Sync engine started");
    }

    /// Stop the background scheduler.
    ///
    /// Future triggers are disarmed immediately. A cycle already in flight
    /// runs to completion and still records its acknowledgments and
    /// watermarks.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.inner.shutdown.lock().ok().and_then(|mut s| s.take()) {
            let _ = tx.send(true);
        }
        // Detach rather than abort so an in-flight cycle finishes
        if let Ok(mut slot) = self.inner.scheduler.lock() {
            slot.take();
        }
        info!("Sync engine stopped");
    }

    /// Whether the background scheduler is currently armed
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run one full cycle across all adapters.
    ///
    /// Concurrent calls coalesce: a call that arrives while a cycle is in
    /// flight waits for it and returns without starting another.
    pub async fn sync_all(&self) {
        let observed = self.inner.cycles.load(Ordering::Acquire);
        let _guard = self.inner.sync_lock.lock().await;
        if self.inner.cycles.load(Ordering::Acquire) != observed {
            debug!("Coalesced into the cycle that just finished");
            return;
        }

        self.run_cycle().await;
        self.inner.cycles.fetch_add(1, Ordering::Release);
    }

    /// Total local records awaiting remote acknowledgment, across entities
    pub fn pending_count(&self) -> Result<usize> {
        let mut total = 0;
        for adapter in &self.inner.adapters {
            total += adapter.pending()?;
        }
        Ok(total)
    }

    /// Completion time of the most recent cycle, if any has run
    pub fn last_synced(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        self.inner.meta.watermark(keys::LAST_SYNCED)
    }

    /// Number of cycles completed since this engine was built
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles.load(Ordering::Acquire)
    }

    async fn run_cycle(&self) {
        debug!("Sync cycle started");

        let mut tasks = Vec::with_capacity(self.inner.adapters.len());
        for adapter in &self.inner.adapters {
            let adapter = adapter.clone();
            let entity = adapter.entity();
            tasks.push((entity, tokio::spawn(async move { adapter.sync().await })));
        }

        for (entity, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(entity, "Entity sync failed: {e}"),
                Err(e) => warn!(entity, "Entity sync task panicked: {e}"),
            }
        }

        if let Err(e) = self
            .inner
            .meta
            .put(keys::LAST_SYNCED, &format_timestamp(util::now()))
        {
            warn!("Failed to record cycle completion: {e}");
        }
        debug!("Sync cycle finished");
    }

    async fn scheduler_loop(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        self.sync_all().await;

        let mut online_rx = self.inner.connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();
        let mut online_open = true;

        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if self.inner.connectivity.is_online() {
                        self.sync_all().await;
                    } else {
                        debug!("Offline, skipping scheduled sync");
                    }
                }
                changed = online_rx.changed(), if online_open => {
                    match changed {
                        Err(_) => online_open = false,
                        Ok(()) => {
                            let online = *online_rx.borrow_and_update();
                            if online && !was_online {
                                info!("Connectivity restored, syncing");
                                self.sync_all().await;
                            }
                            was_online = online;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteMetadataStore};
    use crate::error::Error;
    use crate::sync::connectivity::ConnectivitySignal;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct RecordingAdapter {
        entity: &'static str,
        runs: AtomicUsize,
        delay: Duration,
        fail: AtomicBool,
        pending: AtomicUsize,
    }

    impl RecordingAdapter {
        fn new(entity: &'static str) -> Arc<Self> {
            Arc::new(Self {
                entity,
                runs: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
            })
        }

        fn slow(entity: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                entity,
                runs: AtomicUsize::new(0),
                delay,
                fail: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncAdapter for RecordingAdapter {
        fn entity(&self) -> &'static str {
            self.entity
        }

        async fn sync(&self) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Remote("injected".to_string()));
            }
            Ok(())
        }

        fn pending(&self) -> Result<usize> {
            Ok(self.pending.load(Ordering::SeqCst))
        }
    }

    fn engine_with(
        adapters: Vec<Arc<dyn SyncAdapter>>,
        connectivity: Arc<dyn Connectivity>,
    ) -> SyncEngine {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let meta = Arc::new(SqliteMetadataStore::new(db));
        SyncEngine::new(adapters, meta, connectivity)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_sync_all_calls_coalesce() {
        let adapter = RecordingAdapter::slow("players", Duration::from_millis(200));
        let engine = engine_with(
            vec![adapter.clone()],
            Arc::new(ConnectivitySignal::new(true)),
        );

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_all().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.sync_all().await;
        first.await.unwrap();

        assert_eq!(adapter.runs(), 1);
        assert_eq!(engine.cycles_completed(), 1);
    }

    #[tokio::test]
    async fn sequential_sync_all_calls_each_run() {
        let adapter = RecordingAdapter::new("players");
        let engine = engine_with(
            vec![adapter.clone()],
            Arc::new(ConnectivitySignal::new(true)),
        );

        engine.sync_all().await;
        engine.sync_all().await;
        assert_eq!(adapter.runs(), 2);
    }

    #[tokio::test]
    async fn failing_adapter_does_not_block_siblings() {
        let players = RecordingAdapter::new("players");
        players.fail.store(true, Ordering::SeqCst);
        let matches = RecordingAdapter::new("matches");

        let engine = engine_with(
            vec![players.clone(), matches.clone()],
            Arc::new(ConnectivitySignal::new(true)),
        );
        engine.sync_all().await;

        assert_eq!(players.runs(), 1);
        assert_eq!(matches.runs(), 1);
        assert!(engine.last_synced().unwrap().is_some());
    }

    #[tokio::test]
    async fn pending_count_sums_adapters() {
        let players = RecordingAdapter::new("players");
        players.pending.store(2, Ordering::SeqCst);
        let matches = RecordingAdapter::new("matches");
        matches.pending.store(3, Ordering::SeqCst);

        let engine = engine_with(
            vec![players, matches],
            Arc::new(ConnectivitySignal::new(true)),
        );
        assert_eq!(engine.pending_count().unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_runs_an_immediate_cycle_and_is_idempotent() {
        let adapter = RecordingAdapter::new("players");
        let engine = engine_with(
            vec![adapter.clone()],
            Arc::new(ConnectivitySignal::new(true)),
        );

        engine.start(Duration::from_secs(3600));
        engine.start(Duration::from_secs(3600));
        assert!(engine.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(adapter.runs(), 1);

        engine.stop();
        assert!(!engine.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_disarms_the_scheduler() {
        let adapter = RecordingAdapter::new("players");
        let engine = engine_with(
            vec![adapter.clone()],
            Arc::new(ConnectivitySignal::new(true)),
        );

        engine.start(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.stop();

        let runs_at_stop = adapter.runs();
        assert!(runs_at_stop >= 2, "immediate cycle plus at least one tick");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(adapter.runs(), runs_at_stop);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_lets_the_in_flight_cycle_finish() {
        let adapter = RecordingAdapter::slow("players", Duration::from_millis(200));
        let engine = engine_with(
            vec![adapter.clone()],
            Arc::new(ConnectivitySignal::new(true)),
        );

        engine.start(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The immediate cycle is still in flight when stop() returns
        engine.stop();
        assert!(!engine.is_running());
        assert_eq!(adapter.runs(), 0);

        // It runs to completion and still records its outcome
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(adapter.runs(), 1);
        assert_eq!(engine.cycles_completed(), 1);
        assert!(engine.last_synced().unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_suppresses_scheduled_cycles() {
        let adapter = RecordingAdapter::new("players");
        let signal = Arc::new(ConnectivitySignal::new(false));
        let engine = engine_with(vec![adapter.clone()], signal);

        engine.start(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(180)).await;
        // The immediate cycle ran; every tick since was skipped
        assert_eq!(adapter.runs(), 1);

        engine.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn becoming_online_triggers_a_cycle() {
        let adapter = RecordingAdapter::new("players");
        let signal = Arc::new(ConnectivitySignal::new(false));
        let engine = engine_with(vec![adapter.clone()], signal.clone());

        // Interval long enough that only the edge can trigger a second cycle
        engine.start(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(adapter.runs(), 1);

        signal.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(adapter.runs(), 2);

        engine.stop();
    }
}
