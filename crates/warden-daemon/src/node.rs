//! Warden node - wires stores, policy and both stream consumers.
//!
//! Architecture:
//! - One counter store and one cursor store shared by both pipelines
//! - Firehose consumer (WebSocket) feeding post creations to the policy
//! - Moderation consumer (HTTP polling) purging cached account metadata,
//!   only when moderation credentials are configured
//! - Periodic pruning of closed buckets for the in-memory counter store
//! - HTTP surface for probes, metrics and inspection
//! - Unix admin socket for local ops (warden-admin CLI)
//!
//! Shutdown is a broadcast: consumers stop reading, drain their workers and
//! save their final cursors before [`WardenNode::run_until`] returns.

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::config::{Args, StoreBackend};
use crate::error::{Error, Result};
use crate::moderation::OzoneEventPoller;
use crate::redis_store::RedisStore;
use crate::storage::Storage;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use warden_consumer::{
    Consumer, CursorStore, EventHandler, EventSource, FirehoseSource, MemCursorStore, PollingSource,
};
use warden_counters::{CountStore, MemCountStore};
use warden_labels::{AccountLabeler, OzoneClient};
use warden_metrics::MetricsRegistry;
use warden_policy::{BotVotePolicy, Engine, PolicyContext};
use warden_records::{FirehoseEvent, ModerationEvent};

/// Shared state for the HTTP and admin surfaces.
pub struct DaemonState {
    pub counters: Arc<dyn CountStore>,
    pub cursors: Arc<dyn CursorStore>,
    pub accounts: Arc<AccountLabeler>,
    pub metrics: MetricsRegistry,
    /// Set once every task is running.
    pub ready: AtomicBool,
}

#[cfg(test)]
impl DaemonState {
    pub(crate) fn for_tests(counters: Arc<dyn CountStore>, cursors: Arc<dyn CursorStore>) -> Self {
        let directory = Arc::new(warden_labels::memory::MemDirectory::new());
        Self {
            counters,
            cursors,
            accounts: Arc::new(AccountLabeler::new(directory, Default::default())),
            metrics: MetricsRegistry::new().unwrap(),
            ready: AtomicBool::new(false),
        }
    }
}

/// How often closed in-memory counter buckets are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Counter and cursor backends selected by configuration.
pub struct Stores {
    pub counters: Arc<dyn CountStore>,
    pub cursors: Arc<dyn CursorStore>,
    /// Set for the memory backend, which only sheds closed buckets when pruned.
    pub prunable: Option<Arc<MemCountStore>>,
}

/// Open the configured backend. Unreachable stores are fatal.
pub async fn open_stores(args: &Args) -> Result<Stores> {
    match args.store {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory stores; counts and cursors are lost on restart");
            let counters = Arc::new(MemCountStore::new());
            Ok(Stores {
                counters: counters.clone(),
                cursors: Arc::new(MemCursorStore::new()),
                prunable: Some(counters),
            })
        }
        StoreBackend::Rocksdb => {
            let path = args.data_dir.join("db");
            std::fs::create_dir_all(&path)?;
            let storage = Arc::new(Storage::open(&path)?);
            tracing::info!(path = %path.display(), "opened rocksdb store");
            Ok(Stores {
                counters: storage.clone(),
                cursors: storage,
                prunable: None,
            })
        }
        StoreBackend::Redis => {
            let url = args
                .redis_url
                .as_deref()
                .ok_or_else(|| Error::Config("redis URL is not set".to_string()))?;
            let store = Arc::new(RedisStore::connect(url).await?);
            Ok(Stores {
                counters: store.clone(),
                cursors: store,
                prunable: None,
            })
        }
    }
}

/// A warden daemon instance.
pub struct WardenNode {
    args: Args,
    state: Arc<DaemonState>,
    engine: Engine,
    ozone: Arc<OzoneClient>,
    prunable: Option<Arc<MemCountStore>>,
}

impl WardenNode {
    /// Open stores and build the policy. Nothing runs until [`run`](Self::run).
    pub async fn new(args: Args) -> Result<Self> {
        let stores = open_stores(&args).await?;
        let metrics = MetricsRegistry::new()?;

        let ozone = Arc::new(OzoneClient::new(args.ozone_config()?)?);
        let mut accounts = AccountLabeler::new(ozone.clone(), args.cache_config());
        match args.operator()? {
            Some(operator) => {
                tracing::info!(operator = %operator, "label mutations enabled");
                accounts = accounts.with_moderation(ozone.clone(), operator);
            }
            None => tracing::warn!("no moderation credentials; running read-only"),
        }
        let accounts = Arc::new(accounts);

        let ctx = PolicyContext {
            counters: Arc::clone(&stores.counters),
            accounts: Arc::clone(&accounts),
            metrics: metrics.metrics().clone(),
        };
        let policy = Arc::new(BotVotePolicy::new(args.policy_config(), ctx)?);

        let state = Arc::new(DaemonState {
            counters: stores.counters,
            cursors: stores.cursors,
            accounts,
            metrics,
            ready: AtomicBool::new(false),
        });

        Ok(Self {
            args,
            state,
            engine: Engine::new(policy),
            ozone,
            prunable: stores.prunable,
        })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<DaemonState> {
        Arc::clone(&self.state)
    }

    /// Moderation event consumer, or `None` when running read-only.
    ///
    /// Querying moderation events needs the same admin credentials as
    /// emitting them.
    fn moderation_consumer(&self) -> Option<Arc<Consumer<ModerationEvent>>> {
        if !self.state.accounts.can_mutate() {
            return None;
        }
        let poller = Arc::new(OzoneEventPoller::new(Arc::clone(&self.ozone)));
        let source: Arc<dyn EventSource<ModerationEvent>> =
            Arc::new(PollingSource::new(poller, self.args.moderation_poll_interval()));
        let handler: Arc<dyn EventHandler<ModerationEvent>> = Arc::new(self.engine.clone());
        Some(Arc::new(
            Consumer::new(
                self.args.moderation_consumer(),
                source,
                handler,
                Arc::clone(&self.state.cursors),
            )
            .with_metrics(self.state.metrics.metrics().clone()),
        ))
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
    }

    /// Run until `signal` completes, then shut down gracefully.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let args = &self.args;
        tracing::info!("Warden node starting");
        tracing::info!("  HTTP: http://{}", args.listen);
        tracing::info!("  Relay: {}", args.relay_host);
        tracing::info!("  Admin: {:?}", args.admin_socket_path());
        tracing::info!("  Store: {:?}", args.store);

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let metrics = self.state.metrics.metrics().clone();

        let firehose_source: Arc<dyn EventSource<FirehoseEvent>> =
            Arc::new(FirehoseSource::new(args.relay_host.clone()));
        let firehose_handler: Arc<dyn EventHandler<FirehoseEvent>> = Arc::new(self.engine.clone());
        let firehose = Arc::new(
            Consumer::new(
                args.firehose_consumer(),
                firehose_source,
                firehose_handler,
                Arc::clone(&self.state.cursors),
            )
            .with_metrics(metrics),
        );
        let moderation = self.moderation_consumer();
        if moderation.is_none() {
            tracing::info!("moderation event stream disabled without credentials");
        }

        // Bind before spawning anything so bind failures are fatal
        let listener = tokio::net::TcpListener::bind(args.listen).await?;
        let admin_socket = AdminSocket::bind(self.state(), args.admin_socket_path())?;

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(spawn_consumer(Arc::clone(&firehose), shutdown_tx.subscribe()));
        tasks.push(spawn_persist(firehose, shutdown_tx.subscribe()));
        if let Some(moderation) = moderation {
            tasks.push(spawn_consumer(Arc::clone(&moderation), shutdown_tx.subscribe()));
            tasks.push(spawn_persist(moderation, shutdown_tx.subscribe()));
        }
        if let Some(store) = &self.prunable {
            tasks.push(spawn_prune(Arc::clone(store), PRUNE_INTERVAL, shutdown_tx.subscribe()));
        }
        tasks.push(tokio::spawn(admin_socket.run(shutdown_tx.subscribe())));

        let app = api::build_router(self.state());
        let mut http_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = http_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!("HTTP server error: {}", e);
            }
        }));

        self.state.ready.store(true, Ordering::Release);
        tracing::info!("Warden node running");

        signal.await;
        tracing::info!("shutting down");
        self.state.ready.store(false, Ordering::Release);
        let _ = shutdown_tx.send(());

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("task failed during shutdown: {}", e);
            }
        }
        tracing::info!("Warden node stopped");
        Ok(())
    }
}

fn spawn_consumer<E>(consumer: Arc<Consumer<E>>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()>
where
    E: warden_consumer::Sequenced,
{
    tokio::spawn(async move {
        if let Err(e) = consumer.run(shutdown).await {
            tracing::error!(stream = %consumer.name(), error = %e, "consumer stopped with error");
        }
    })
}

fn spawn_persist<E>(consumer: Arc<Consumer<E>>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()>
where
    E: warden_consumer::Sequenced,
{
    tokio::spawn(async move { consumer.run_persist_cursor(shutdown).await })
}

fn spawn_prune(
    store: Arc<MemCountStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    store.prune_expired();
                }
            }
        }
    })
}
