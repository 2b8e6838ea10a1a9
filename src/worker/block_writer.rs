//! Block writer - background task creating a block on every tick

use crate::error::WriterError;
use crate::store::{BlockDescriptor, BlockStore};
use crate::worker::{EventSink, WriterConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Runs `BlockStore::create_block` on a fixed interval in a single background task.
///
/// Writes never overlap: a tick that fires while a write is still running is
/// skipped, not queued. Call [`BlockWriter::shutdown`] to stop the writer; it
/// returns once any in-flight write has finished. Dropping the writer without
/// calling `shutdown` also ends the background task, but does not wait for it.
pub struct BlockWriter {
    events: Arc<dyn EventSink>,
    timer_stopped: Arc<AtomicBool>,
    shut: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl BlockWriter {
    /// Start a writer that creates a block every `interval`.
    ///
    /// The first write happens one full interval after this call. Must be
    /// called from within a tokio runtime.
    ///
    /// # Panics
    /// Panics if `interval` is zero.
    pub fn new<S: BlockStore>(store: Arc<S>, interval: Duration, events: impl EventSink) -> Self {
        assert!(
            !interval.is_zero(),
            "block writer interval must be greater than zero"
        );

        let events: Arc<dyn EventSink> = Arc::new(events);
        let timer_stopped = Arc::new(AtomicBool::new(false));
        let (shut, shut_rx) = oneshot::channel();

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let tick_loop = TickLoop {
            store,
            events: Arc::clone(&events),
            timer_stopped: Arc::clone(&timer_stopped),
        };
        let handle = tokio::spawn(tick_loop.run(ticker, shut_rx));

        debug!("Block writer started, interval {:?}", interval);

        Self {
            events,
            timer_stopped,
            shut,
            handle,
        }
    }

    /// Start a writer using the interval from `config`
    pub fn from_config<S: BlockStore>(
        store: Arc<S>,
        config: &WriterConfig,
        events: impl EventSink,
    ) -> Self {
        Self::new(store, config.interval, events)
    }

    /// Stop the timer, terminate the background task and wait for it to exit.
    ///
    /// Consumes the writer, so it can only be shut down once.
    pub async fn shutdown(self) {
        self.events.emit("block writer: stop timer");
        self.timer_stopped.store(true, Ordering::SeqCst);

        self.events.emit("block writer: terminate goroutine");
        if self.shut.send(()).is_err() {
            warn!("Block writer task already exited before shutdown");
        }

        if let Err(e) = self.handle.await {
            error!("Block writer task failed: {}", e);
        }

        self.events.emit("block writer: off");
    }
}

/// State owned by the background task
struct TickLoop<S> {
    store: Arc<S>,
    events: Arc<dyn EventSink>,
    timer_stopped: Arc<AtomicBool>,
}

impl<S: BlockStore> TickLoop<S> {
    async fn run(self, mut ticker: Interval, mut shut: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;

                // Resolves on shutdown, or with an error if the writer was dropped.
                _ = &mut shut => break,

                _ = ticker.tick() => {
                    if self.timer_stopped.load(Ordering::SeqCst) {
                        continue;
                    }
                    self.write_block().await;
                }
            }
        }

        debug!("Block writer task exited");
    }

    /// Create one block and report the outcome
    async fn write_block(&self) {
        self.events.emit("block writer: started");
        let _completed = CompletedGuard(self.events.as_ref());

        let block = match self.store.create_block().await {
            Ok(block) => block,
            Err(WriterError::NoTransactions) => {
                self.events.emit("block writer: no transactions in mempool");
                return;
            }
            Err(e) => {
                self.events.emit(&format!("block writer: ERROR {}", e));
                return;
            }
        };

        let hash = match block.hash() {
            Ok(h) => hex::encode(h),
            Err(e) => e.to_string(),
        };

        self.events.emit(&format!(
            "block writer: prevBlk[{}], newBlk[{}], numTrans[{}]",
            hex::encode(block.prev_block()),
            hash,
            block.item_count()
        ));
    }
}

/// Reports "completed" when dropped, whichever way `write_block` returns
struct CompletedGuard<'a>(&'a dyn EventSink);

impl Drop for CompletedGuard<'_> {
    fn drop(&mut self) {
        self.0.emit("block writer: completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::time::sleep;

    const STARTED: &str = "block writer: started";
    const COMPLETED: &str = "block writer: completed";
    const NO_TXNS: &str = "block writer: no transactions in mempool";
    const SHUTDOWN_LINES: [&str; 3] = [
        "block writer: stop timer",
        "block writer: terminate goroutine",
        "block writer: off",
    ];

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, line: &str) -> usize {
            self.lines().iter().filter(|l| *l == line).count()
        }
    }

    impl EventSink for Recorder {
        fn emit(&self, status: &str) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    struct TestBlock {
        prev: Vec<u8>,
        hash: std::result::Result<Vec<u8>, String>,
        count: usize,
    }

    impl BlockDescriptor for TestBlock {
        fn prev_block(&self) -> &[u8] {
            &self.prev
        }

        fn hash(&self) -> Result<Vec<u8>> {
            self.hash.clone().map_err(WriterError::StorageError)
        }

        fn item_count(&self) -> usize {
            self.count
        }
    }

    #[derive(Clone)]
    enum Outcome {
        NoTransactions,
        Fail(&'static str),
        Written {
            prev: Vec<u8>,
            hash: std::result::Result<Vec<u8>, String>,
            count: usize,
        },
    }

    /// Plays back scripted outcomes, then repeats `fallback`
    struct ScriptedStore {
        script: Mutex<VecDeque<Outcome>>,
        fallback: Outcome,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedStore {
        fn new(script: Vec<Outcome>, fallback: Outcome) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self::new(vec![], Outcome::NoTransactions)
        }

        /// Make the first call take `delay`; later calls return at once
        fn with_first_call_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_outcome(&self) -> Outcome {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    impl BlockStore for ScriptedStore {
        type Block = TestBlock;

        async fn create_block(&self) -> Result<TestBlock> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 && !self.delay.is_zero() {
                sleep(self.delay).await;
            }

            match self.next_outcome() {
                Outcome::NoTransactions => Err(WriterError::NoTransactions),
                Outcome::Fail(msg) => Err(WriterError::StorageError(msg.to_string())),
                Outcome::Written { prev, hash, count } => Ok(TestBlock { prev, hash, count }),
            }
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn assert_ticks_not_interleaved(lines: &[String]) {
        let mut open = false;
        for line in lines {
            if line == STARTED {
                assert!(!open, "tick started before previous completed: {:?}", lines);
                open = true;
            } else if line == COMPLETED {
                assert!(open, "completed without started: {:?}", lines);
                open = false;
            }
        }
        assert!(!open, "tick left open: {:?}", lines);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_interval() {
        let store = Arc::new(ScriptedStore::empty());
        let recorder = Recorder::default();
        let writer = BlockWriter::new(Arc::clone(&store), ms(10), recorder.clone());

        sleep(ms(5)).await;
        writer.shutdown().await;

        assert_eq!(store.calls(), 0);
        assert_eq!(recorder.lines(), SHUTDOWN_LINES);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_transactions_sequence() {
        let store = Arc::new(ScriptedStore::empty());
        let recorder = Recorder::default();
        let writer = BlockWriter::new(store, ms(10), recorder.clone());

        sleep(ms(15)).await;
        writer.shutdown().await;

        let mut expected = vec![STARTED, NO_TXNS, COMPLETED];
        expected.extend(SHUTDOWN_LINES);
        assert_eq!(recorder.lines(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_and_worker_keeps_ticking() {
        let store = Arc::new(ScriptedStore::new(
            vec![Outcome::Fail("disk full")],
            Outcome::NoTransactions,
        ));
        let recorder = Recorder::default();
        let writer = BlockWriter::new(Arc::clone(&store), ms(10), recorder.clone());

        sleep(ms(25)).await;
        writer.shutdown().await;

        let mut expected = vec![
            STARTED,
            "block writer: ERROR Storage error: disk full",
            COMPLETED,
            STARTED,
            NO_TXNS,
            COMPLETED,
        ];
        expected.extend(SHUTDOWN_LINES);
        assert_eq!(recorder.lines(), expected);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_reports_summary() {
        let store = Arc::new(ScriptedStore::new(
            vec![Outcome::Written {
                prev: vec![0xab, 0xcd],
                hash: Ok(vec![0x01, 0x02, 0xff]),
                count: 3,
            }],
            Outcome::NoTransactions,
        ));
        let recorder = Recorder::default();
        let writer = BlockWriter::new(store, ms(10), recorder.clone());

        sleep(ms(15)).await;
        writer.shutdown().await;

        let lines = recorder.lines();
        assert_eq!(
            &lines[..3],
            [
                STARTED,
                "block writer: prevBlk[abcd], newBlk[0102ff], numTrans[3]",
                COMPLETED
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_failure_substitutes_description() {
        let store = Arc::new(ScriptedStore::new(
            vec![Outcome::Written {
                prev: vec![0x00, 0x01],
                hash: Err("header unavailable".to_string()),
                count: 0,
            }],
            Outcome::NoTransactions,
        ));
        let recorder = Recorder::default();
        let writer = BlockWriter::new(store, ms(10), recorder.clone());

        sleep(ms(15)).await;
        writer.shutdown().await;

        assert_eq!(
            recorder.lines()[1],
            "block writer: prevBlk[0001], newBlk[Storage error: header unavailable], numTrans[0]"
        );
        assert_eq!(recorder.lines()[2], COMPLETED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_ms_interval_for_35ms() {
        let store = Arc::new(ScriptedStore::empty());
        let recorder = Recorder::default();
        let writer = BlockWriter::new(store, ms(10), recorder.clone());

        sleep(ms(35)).await;
        writer.shutdown().await;

        let cycles = recorder.count(STARTED);
        assert!((3..=4).contains(&cycles), "observed {} cycles", cycles);
        assert_eq!(recorder.count(COMPLETED), cycles);
        assert_eq!(recorder.count(NO_TXNS), cycles);
        assert_ticks_not_interleaved(&recorder.lines());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_write() {
        let store = Arc::new(ScriptedStore::empty().with_first_call_delay(ms(50)));
        let recorder = Recorder::default();
        let writer = BlockWriter::new(Arc::clone(&store), ms(10), recorder.clone());

        // The first write starts at 10ms and runs until 60ms.
        sleep(ms(15)).await;
        assert_eq!(recorder.lines(), [STARTED]);

        writer.shutdown().await;

        assert_eq!(
            recorder.lines(),
            [
                STARTED,
                "block writer: stop timer",
                "block writer: terminate goroutine",
                NO_TXNS,
                COMPLETED,
                "block writer: off",
            ]
        );
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_ticks_are_skipped_not_queued() {
        let store = Arc::new(ScriptedStore::empty().with_first_call_delay(ms(55)));
        let recorder = Recorder::default();
        let writer = BlockWriter::new(Arc::clone(&store), ms(10), recorder.clone());

        // First write runs 10ms..65ms. The ticks missed meanwhile collapse into
        // one immediate tick at 65ms, then the timer realigns to 70ms.
        sleep(ms(72)).await;
        writer.shutdown().await;

        assert_eq!(store.calls(), 3);
        assert_ticks_not_interleaved(&recorder.lines());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_timer_stop_are_discarded() {
        let store = Arc::new(ScriptedStore::empty());
        let recorder = Recorder::default();
        let tick_loop = TickLoop {
            store: Arc::clone(&store),
            events: Arc::new(recorder.clone()),
            timer_stopped: Arc::new(AtomicBool::new(true)),
        };
        let (shut, shut_rx) = oneshot::channel();
        let ticker = interval_at(Instant::now() + ms(10), ms(10));
        let handle = tokio::spawn(tick_loop.run(ticker, shut_rx));

        // Four ticks fire while termination is still pending.
        sleep(ms(45)).await;
        shut.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(store.calls(), 0);
        assert!(recorder.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiescent_after_shutdown() {
        let store = Arc::new(ScriptedStore::empty());
        let recorder = Recorder::default();
        let writer = BlockWriter::new(Arc::clone(&store), ms(10), recorder.clone());

        sleep(ms(25)).await;
        writer.shutdown().await;
        let lines = recorder.lines();
        let calls = store.calls();

        sleep(ms(100)).await;
        assert_eq!(recorder.lines(), lines);
        assert_eq!(store.calls(), calls);
        assert_eq!(lines.last().map(String::as_str), Some("block writer: off"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_stay_balanced() {
        let store = Arc::new(ScriptedStore::new(
            vec![
                Outcome::Fail("boom"),
                Outcome::Written {
                    prev: vec![1],
                    hash: Ok(vec![2]),
                    count: 1,
                },
                Outcome::NoTransactions,
                Outcome::Written {
                    prev: vec![2],
                    hash: Err("bad".to_string()),
                    count: 4,
                },
            ],
            Outcome::Fail("still broken"),
        ));
        let recorder = Recorder::default();
        let writer = BlockWriter::new(store, ms(10), recorder.clone());

        sleep(ms(75)).await;
        writer.shutdown().await;

        assert_eq!(recorder.count(STARTED), recorder.count(COMPLETED));
        assert_eq!(recorder.count(STARTED), 7);
        assert_ticks_not_interleaved(&recorder.lines());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_writer_stops_ticking() {
        let store = Arc::new(ScriptedStore::empty());
        let writer = BlockWriter::new(Arc::clone(&store), ms(10), |_: &str| {});

        sleep(ms(15)).await;
        drop(writer);

        sleep(ms(50)).await;
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config_uses_interval() {
        let store = Arc::new(ScriptedStore::empty());
        let recorder = Recorder::default();
        let config = WriterConfig::builder().interval_millis(20).build();
        let writer = BlockWriter::from_config(Arc::clone(&store), &config, recorder.clone());

        sleep(ms(30)).await;
        writer.shutdown().await;

        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    #[should_panic(expected = "interval must be greater than zero")]
    async fn test_zero_interval_panics() {
        let _ = BlockWriter::new(Arc::new(ScriptedStore::empty()), Duration::ZERO, |_: &str| {});
    }
}
