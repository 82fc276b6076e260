//! Demo: schedules article reviews at staggered publish times and runs the
//! sweepers and consumers until the timeout or Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use delayer_core::app::{App, AppBuilder};
use delayer_core::config::Config;
use delayer_core::domain::TaskId;
use delayer_core::impls::{InMemoryDelayCache, InMemoryTaskStore, SqliteTaskStore};
use delayer_core::ports::{Clock, DelayCache, SystemClock, TaskStore};
use delayer_core::typed::{Handler, PayloadCodec, TaskKind};

#[derive(Parser)]
#[command(name = "delayer", version, about = "Delayed task scheduler demo")]
struct Cli {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database for the task store; in-memory when omitted
    #[arg(long)]
    db: Option<PathBuf>,

    /// Instances sharing one cache; only one of them sweeps per cycle
    #[arg(long, default_value_t = 2)]
    instances: usize,

    #[arg(long, default_value_t = 10)]
    articles: u64,

    /// Publish times are spread over this many seconds
    #[arg(long, default_value_t = 90)]
    spread_secs: u64,

    #[arg(long, default_value_t = 150)]
    run_for_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArticleReview {
    article_id: u64,
    title: String,
}

impl TaskKind for ArticleReview {
    const TASK_TYPE: i32 = 1001;
    const PRIORITY: i32 = 1;
}

/// Stands in for the moderation pipeline.
struct ModerationHandler {
    instance: usize,
    reviewed: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler<ArticleReview> for ModerationHandler {
    async fn handle(&self, task_id: TaskId, payload: ArticleReview) -> Result<()> {
        tracing::info!(
            instance = self.instance,
            %task_id,
            article_id = payload.article_id,
            title = %payload.title,
            "article published, review started"
        );
        self.reviewed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn TaskStore> = match &cli.db {
        Some(path) => Arc::new(
            SqliteTaskStore::open(path, Arc::clone(&clock))
                .with_context(|| format!("open task store at {}", path.display()))?,
        ),
        None => Arc::new(InMemoryTaskStore::new(Arc::clone(&clock))),
    };
    let cache: Arc<dyn DelayCache> = Arc::new(InMemoryDelayCache::new(Arc::clone(&clock)));

    let reviewed = Arc::new(AtomicUsize::new(0));
    let mut apps: Vec<App> = Vec::with_capacity(cli.instances.max(1));
    for instance in 0..cli.instances.max(1) {
        let app = AppBuilder::new(config.clone())
            .store(Arc::clone(&store))
            .cache(Arc::clone(&cache))
            .clock(Arc::clone(&clock))
            .register::<ArticleReview, _>(ModerationHandler {
                instance,
                reviewed: Arc::clone(&reviewed),
            })?
            .expect_kinds(&[ArticleReview::bucket()])
            .build()?;
        apps.push(app);
    }

    let client = apps[0].client.clone();
    let now = clock.now();
    let mut scheduled = Vec::new();
    for n in 0..cli.articles {
        let offset = cli.spread_secs * n / cli.articles.max(1);
        let review = ArticleReview {
            article_id: 1_000 + n,
            title: format!("draft #{n}"),
        };
        let new_task = PayloadCodec::new_task(&review, now + chrono::Duration::seconds(offset as i64))?;
        scheduled.push(client.add_task_detached(new_task));
    }

    let mut ids = Vec::with_capacity(scheduled.len());
    for handle in scheduled {
        match handle.await? {
            Ok(id) => ids.push(id),
            Err(e) => tracing::error!(error = %e, "scheduling failed"),
        }
    }
    tracing::info!(count = ids.len(), "articles scheduled");

    // every fifth article is retracted before it goes out
    let mut retracted = 0;
    for id in ids.iter().skip(4).step_by(5) {
        if client.cancel_task(*id).await {
            retracted += 1;
        }
    }
    tracing::info!(retracted, "articles retracted");

    let running: Vec<_> = apps.iter().map(App::start).collect();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(cli.run_for_secs)) => {
            tracing::info!("run time elapsed");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listen for ctrl-c")?;
            tracing::info!("interrupted");
        }
    }

    for app in running {
        app.shutdown().await;
    }
    tracing::info!(
        reviewed = reviewed.load(Ordering::SeqCst),
        expected = ids.len() - retracted,
        "done"
    );
    Ok(())
}
