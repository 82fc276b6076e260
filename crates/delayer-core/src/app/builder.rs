//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store / cache が未設定なら build() で BuildError
//! - expect_kinds() で期待されるバケットに Handler が無ければ BuildError
//! - config は build() 時に検証

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::client::ScheduleClient;
use super::consumer_loop::ConsumerGroup;
use super::scheduler::Scheduler;
use super::sweeper::MigrationSweeper;
use crate::config::{Config, ConfigError};
use crate::domain::Bucket;
use crate::ports::{Clock, DelayCache, SystemClock, TaskStore};
use crate::typed::{Handler, RegistryError, TaskKind, TypedRegistry};

/// ```ignore
/// let app = AppBuilder::new(config)
///     .store(store)
///     .cache(cache)
///     .register::<ArticleReview, _>(ReviewHandler)?
///     .expect_kinds(&[ArticleReview::bucket()])
///     .build()?;
/// let running = app.start();
/// ```
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn TaskStore>>,
    cache: Option<Arc<dyn DelayCache>>,
    clock: Arc<dyn Clock>,
    registry: TypedRegistry,
    expected: Option<Vec<Bucket>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task store configured")]
    MissingStore,

    #[error("no delay cache configured")]
    MissingCache,

    #[error("no handler registered for buckets {0:?}")]
    MissingHandlers(Vec<Bucket>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            cache: None,
            clock: Arc::new(SystemClock),
            registry: TypedRegistry::new(),
            expected: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn DelayCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn register<T: TaskKind, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_kinds(mut self, buckets: &[Bucket]) -> Self {
        self.expected = Some(buckets.to_vec());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let cache = self.cache.ok_or(BuildError::MissingCache)?;

        if let Some(expected) = &self.expected {
            let registered = self.registry.buckets();
            let missing: Vec<Bucket> = expected
                .iter()
                .filter(|b| !registered.contains(b))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingHandlers(missing));
            }
        }

        let scheduler = Arc::new(Scheduler::new(
            store,
            Arc::clone(&cache),
            Arc::clone(&self.clock),
            &self.config.scheduler,
        ));
        let sweeper = Arc::new(MigrationSweeper::new(
            cache,
            self.clock,
            &self.config.scheduler,
        ));

        Ok(App {
            client: ScheduleClient::new(scheduler),
            sweeper,
            registry: self.registry,
            poll_interval: self.config.consumer.poll_interval(),
        })
    }
}

/// A wired instance, not yet running.
pub struct App {
    pub client: ScheduleClient,
    pub sweeper: Arc<MigrationSweeper>,
    pub registry: TypedRegistry,
    poll_interval: Duration,
}

impl App {
    /// Starts the sweeper and one consumer per registered bucket.
    pub fn start(&self) -> RunningApp {
        let (sweeper_tx, sweeper_rx) = watch::channel(false);
        let sweeper = Arc::clone(&self.sweeper).spawn(sweeper_rx);
        let consumers = ConsumerGroup::spawn(self.client.clone(), &self.registry, self.poll_interval);

        RunningApp {
            sweeper_tx,
            sweeper,
            consumers,
        }
    }
}

pub struct RunningApp {
    sweeper_tx: watch::Sender<bool>,
    sweeper: JoinHandle<()>,
    consumers: ConsumerGroup,
}

impl RunningApp {
    /// Stops taking new work and waits for the loops to exit.
    pub async fn shutdown(self) {
        let _ = self.sweeper_tx.send(true);
        self.consumers.shutdown_and_join().await;
        if let Err(e) = self.sweeper.await {
            tracing::error!(error = %e, "sweeper task panicked");
        }
        tracing::info!("app stopped");
    }
}
