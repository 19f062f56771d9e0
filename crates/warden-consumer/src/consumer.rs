//! The consumer loop.

use crate::backoff::Backoff;
use crate::cursor::CursorStore;
use crate::error::{ConsumerError, Result};
use crate::tracker::SequenceTracker;
use crate::{EventHandler, EventSource, Sequenced};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_metrics::WardenMetrics;

/// Worker count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Fixed(usize),
    /// Four workers per core; handlers are I/O bound.
    Auto,
}

impl Parallelism {
    /// `0` means auto.
    pub fn from_count(count: usize) -> Self {
        if count == 0 {
            Parallelism::Auto
        } else {
            Parallelism::Fixed(count)
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            Parallelism::Fixed(n) => (*n).max(1),
            Parallelism::Auto => num_cpus::get().max(1) * 4,
        }
    }
}

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream name; also the cursor key and the metrics label.
    pub name: String,
    pub parallelism: Parallelism,
    /// Bound of each shard queue.
    pub queue_capacity: usize,
    pub persist_interval: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl ConsumerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parallelism: Parallelism::Auto,
            queue_capacity: 256,
            persist_interval: Duration::from_secs(5),
            reconnect_initial: Duration::from_millis(100),
            reconnect_max: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval = interval;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial = initial;
        self.reconnect_max = max;
        self
    }
}

struct Shard<E> {
    tx: mpsc::Sender<E>,
    handle: JoinHandle<()>,
}

/// One resumable subscription.
///
/// Run [`Consumer::run`] and [`Consumer::run_persist_cursor`] as separate
/// tasks sharing one shutdown channel. `run` performs the final cursor save
/// after its workers drain.
pub struct Consumer<E> {
    config: ConsumerConfig,
    source: Arc<dyn EventSource<E>>,
    handler: Arc<dyn EventHandler<E>>,
    cursors: Arc<dyn CursorStore>,
    tracker: Arc<SequenceTracker>,
    persisted: Mutex<Option<u64>>,
    metrics: Option<WardenMetrics>,
}

impl<E: Sequenced> Consumer<E> {
    pub fn new(
        config: ConsumerConfig,
        source: Arc<dyn EventSource<E>>,
        handler: Arc<dyn EventHandler<E>>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            config,
            source,
            handler,
            cursors,
            tracker: Arc::new(SequenceTracker::new()),
            persisted: Mutex::new(None),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: WardenMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Highest contiguously completed seq seen by this process.
    pub fn committed(&self) -> Option<u64> {
        self.tracker.committed()
    }

    /// Consume until `shutdown` fires.
    ///
    /// Fails only when the starting cursor cannot be loaded or a worker dies;
    /// upstream failures are retried with backoff.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let name = self.config.name.as_str();
        let start = self.cursors.load_cursor(name).await?;
        if let Some(seq) = start {
            self.tracker.resume_from(seq);
            *self.persisted.lock().await = Some(seq);
        }

        let shards = self.spawn_workers();
        info!(stream = name, cursor = ?start, workers = shards.len(), "starting consumer");

        let mut backoff = Backoff::new(self.config.reconnect_initial, self.config.reconnect_max);
        let outcome = self.read_loop(&shards, &mut backoff, &mut shutdown).await;

        // close queues and let workers drain what they already hold
        let mut handles = Vec::with_capacity(shards.len());
        for shard in shards {
            drop(shard.tx);
            handles.push(shard.handle);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(stream = name, error = %e, "worker task failed");
            }
        }

        self.persist().await?;
        info!(stream = name, cursor = ?self.tracker.committed(), "consumer stopped");
        outcome
    }

    /// Save the committed cursor every `persist_interval` until `shutdown`.
    pub async fn run_persist_cursor(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.persist_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.persist().await {
                        error!(stream = %self.config.name, error = %e, "failed to persist cursor");
                    }
                }
            }
        }
    }

    /// Save the committed cursor if it advanced past the last save.
    ///
    /// The committed seq is read under the lock so concurrent callers never
    /// write an older cursor over a newer one.
    pub async fn persist(&self) -> Result<()> {
        let mut persisted = self.persisted.lock().await;
        let Some(seq) = self.tracker.committed() else {
            return Ok(());
        };
        if persisted.is_some_and(|saved| saved >= seq) {
            return Ok(());
        }
        self.cursors.save_cursor(&self.config.name, seq).await?;
        *persisted = Some(seq);
        if let Some(metrics) = &self.metrics {
            metrics.set_cursor(&self.config.name, seq);
        }
        debug!(stream = %self.config.name, cursor = seq, "persisted cursor");
        Ok(())
    }

    fn spawn_workers(&self) -> Vec<Shard<E>> {
        (0..self.config.parallelism.workers())
            .map(|index| {
                let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
                let handle = tokio::spawn(worker(
                    index,
                    self.config.name.clone(),
                    rx,
                    Arc::clone(&self.handler),
                    Arc::clone(&self.tracker),
                ));
                Shard { tx, handle }
            })
            .collect()
    }

    /// Returns when shutdown fires or a worker is gone.
    async fn read_loop(
        &self,
        shards: &[Shard<E>],
        backoff: &mut Backoff,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let name = self.config.name.as_str();
        loop {
            let from = self.tracker.latest();
            let subscribed = tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                sub = self.source.subscribe(from) => sub,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(stream = name, cursor = ?from, "subscribed");
                    loop {
                        let item = tokio::select! {
                            _ = shutdown.recv() => return Ok(()),
                            item = stream.next() => item,
                        };
                        match item {
                            Some(Ok(event)) => {
                                backoff.reset();
                                self.dispatch(shards, event).await?;
                            }
                            Some(Err(e)) => {
                                warn!(stream = name, error = %e, "upstream error, reconnecting");
                                break;
                            }
                            None => {
                                info!(stream = name, "upstream closed, reconnecting");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!(stream = name, error = %e, "subscribe failed"),
            }

            let delay = backoff.next_delay();
            debug!(stream = name, delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn dispatch(&self, shards: &[Shard<E>], event: E) -> Result<()> {
        let seq = event.seq();
        let index = shard_for(&event.partition_key(), shards.len());
        self.tracker.begin(seq);
        if shards[index].tx.send(event).await.is_err() {
            self.tracker.finish(seq);
            return Err(ConsumerError::WorkerGone(index));
        }
        Ok(())
    }
}

async fn worker<E: Sequenced>(
    index: usize,
    stream: String,
    mut rx: mpsc::Receiver<E>,
    handler: Arc<dyn EventHandler<E>>,
    tracker: Arc<SequenceTracker>,
) {
    while let Some(event) = rx.recv().await {
        let seq = event.seq();
        if let Err(e) = handler.handle(event).await {
            error!(stream = %stream, worker = index, seq, error = %e, "failed to process event");
        }
        tracker.finish(seq);
    }
    debug!(stream = %stream, worker = index, "worker drained");
}

/// Shard index for a partition key.
pub(crate) fn shard_for(key: &str, shards: usize) -> usize {
    if shards <= 1 {
        return 0;
    }
    let hash = blake3::hash(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % shards as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MemCursorStore;
    use crate::{HandlerError, Result as ConsumerResult};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use std::borrow::Cow;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone)]
    struct TestEvent {
        seq: u64,
        key: String,
    }

    impl Sequenced for TestEvent {
        fn seq(&self) -> u64 {
            self.seq
        }

        fn partition_key(&self) -> Cow<'_, str> {
            Cow::Borrowed(&self.key)
        }
    }

    /// Serves events after the requested cursor, then ends (or stays open).
    struct VecSource {
        events: Vec<TestEvent>,
        subscriptions: StdMutex<Vec<Option<u64>>>,
        hang_after: bool,
    }

    #[async_trait]
    impl EventSource<TestEvent> for VecSource {
        async fn subscribe(&self, cursor: Option<u64>) -> ConsumerResult<BoxStream<'static, ConsumerResult<TestEvent>>> {
            self.subscriptions.lock().unwrap().push(cursor);
            let events: Vec<_> = self
                .events
                .iter()
                .filter(|e| cursor.map_or(true, |c| e.seq > c))
                .cloned()
                .map(Ok)
                .collect();
            let head = stream::iter(events);
            if self.hang_after {
                Ok(head.chain(stream::pending()).boxed())
            } else {
                Ok(head.boxed())
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<HashMap<String, Vec<u64>>>,
        fail_seq: Option<u64>,
    }

    #[async_trait]
    impl EventHandler<TestEvent> for Recorder {
        async fn handle(&self, event: TestEvent) -> std::result::Result<(), HandlerError> {
            tokio::task::yield_now().await;
            self.seen.lock().unwrap().entry(event.key.clone()).or_default().push(event.seq);
            if Some(event.seq) == self.fail_seq {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    fn events(range: std::ops::RangeInclusive<u64>) -> Vec<TestEvent> {
        range
            .map(|seq| TestEvent {
                seq,
                key: format!("did:plc:{}", seq % 5),
            })
            .collect()
    }

    #[tokio::test]
    async fn resumes_from_persisted_cursor_and_saves_on_shutdown() {
        let cursors = Arc::new(MemCursorStore::new());
        cursors.save_cursor("firehose", 1000).await.unwrap();
        let source = Arc::new(VecSource {
            events: events(995..=1010),
            subscriptions: StdMutex::new(Vec::new()),
            hang_after: true,
        });
        let handler = Arc::new(Recorder::default());
        let consumer = Arc::new(Consumer::new(
            ConsumerConfig::new("firehose").with_parallelism(Parallelism::Fixed(3)),
            source.clone(),
            handler.clone(),
            cursors.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let rx = shutdown_tx.subscribe();
        let task = {
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move { consumer.run(rx).await })
        };

        while consumer.committed() != Some(1010) {
            tokio::task::yield_now().await;
        }
        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(source.subscriptions.lock().unwrap()[0], Some(1000));
        let seen = handler.seen.lock().unwrap();
        let mut all: Vec<u64> = seen.values().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (1001..=1010).collect::<Vec<_>>());
        // per-key order is preserved
        for seqs in seen.values() {
            assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(cursors.load_cursor("firehose").await.unwrap(), Some(1010));
    }

    #[tokio::test]
    async fn handler_failure_still_advances_cursor() {
        let cursors = Arc::new(MemCursorStore::new());
        let source = Arc::new(VecSource {
            events: events(1..=4),
            subscriptions: StdMutex::new(Vec::new()),
            hang_after: true,
        });
        let handler = Arc::new(Recorder {
            fail_seq: Some(2),
            ..Default::default()
        });
        let consumer = Arc::new(Consumer::new(
            ConsumerConfig::new("moderation").with_parallelism(Parallelism::Fixed(2)),
            source,
            handler,
            cursors.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let rx = shutdown_tx.subscribe();
        let task = {
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move { consumer.run(rx).await })
        };
        while consumer.committed() != Some(4) {
            tokio::task::yield_now().await;
        }
        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(cursors.load_cursor("moderation").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn reconnects_from_latest_dispatched_seq() {
        let source = Arc::new(VecSource {
            events: events(1..=3),
            subscriptions: StdMutex::new(Vec::new()),
            hang_after: false,
        });
        let consumer = Arc::new(Consumer::new(
            ConsumerConfig::new("firehose")
                .with_parallelism(Parallelism::Fixed(1))
                .with_reconnect(Duration::from_millis(1), Duration::from_millis(2)),
            source.clone(),
            Arc::new(Recorder::default()),
            Arc::new(MemCursorStore::new()),
        ));

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let rx = shutdown_tx.subscribe();
        let task = {
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move { consumer.run(rx).await })
        };
        while source.subscriptions.lock().unwrap().len() < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        let subs = source.subscriptions.lock().unwrap().clone();
        assert_eq!(subs[0], None);
        assert!(subs[1..].iter().all(|c| *c == Some(3)));
    }

    #[tokio::test]
    async fn persist_task_saves_only_on_change() {
        let cursors = Arc::new(MemCursorStore::new());
        let consumer = Consumer::<TestEvent>::new(
            ConsumerConfig::new("firehose"),
            Arc::new(VecSource {
                events: Vec::new(),
                subscriptions: StdMutex::new(Vec::new()),
                hang_after: true,
            }),
            Arc::new(Recorder::default()),
            cursors.clone(),
        )
        .with_metrics(WardenMetrics::unregistered().unwrap());

        consumer.persist().await.unwrap();
        assert_eq!(cursors.load_cursor("firehose").await.unwrap(), None);

        consumer.tracker.begin(9);
        consumer.tracker.finish(9);
        consumer.persist().await.unwrap();
        assert_eq!(cursors.load_cursor("firehose").await.unwrap(), Some(9));
        assert_eq!(consumer.metrics.as_ref().unwrap().cursor("firehose"), 9);
    }

    #[tokio::test]
    async fn persist_never_moves_cursor_backwards() {
        let cursors = Arc::new(MemCursorStore::new());
        let consumer = Consumer::<TestEvent>::new(
            ConsumerConfig::new("firehose"),
            Arc::new(VecSource {
                events: Vec::new(),
                subscriptions: StdMutex::new(Vec::new()),
                hang_after: true,
            }),
            Arc::new(Recorder::default()),
            cursors.clone(),
        );

        // another caller already saved 12 while this one still sees 10
        cursors.save_cursor("firehose", 12).await.unwrap();
        *consumer.persisted.lock().await = Some(12);
        consumer.tracker.resume_from(10);

        consumer.persist().await.unwrap();
        assert_eq!(cursors.load_cursor("firehose").await.unwrap(), Some(12));

        consumer.tracker.begin(13);
        consumer.tracker.finish(13);
        consumer.persist().await.unwrap();
        assert_eq!(cursors.load_cursor("firehose").await.unwrap(), Some(13));
    }

    #[test]
    fn shard_selection_is_stable() {
        assert_eq!(shard_for("did:plc:a", 1), 0);
        let first = shard_for("did:plc:a", 8);
        assert!(first < 8);
        assert_eq!(shard_for("did:plc:a", 8), first);
    }

    #[test]
    fn parallelism_resolution() {
        assert_eq!(Parallelism::from_count(0), Parallelism::Auto);
        assert_eq!(Parallelism::from_count(3).workers(), 3);
        assert_eq!(Parallelism::Fixed(0).workers(), 1);
        assert!(Parallelism::Auto.workers() >= 4);
    }
}
