use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use tracing::{info, warn};

use mindfuel_core::{Checkpoint, Frequency};
use mindfuel_infra::alerts::{AlertSink, LogAlertSink, MailAlertSink};
use mindfuel_infra::checkpoint::{CheckpointStore, FileCheckpointStore, PostgresCheckpointStore};
use mindfuel_infra::content::{
    CachedContentProvider, ContentFetcher, ContentProvider, Freshness, HttpQuoteApi,
};
use mindfuel_infra::pipeline::{DeliveryEngine, RunOrchestrator};
use mindfuel_infra::recipients::PostgresRecipientStore;
use mindfuel_infra::render::TemplateRenderer;
use mindfuel_infra::transport::HttpRelayTransport;
use mindfuel_infra::{CheckpointBackend, Clock, PipelineConfig, SystemClock, db};

/// The daily run. Configuration errors abort before anything else, without
/// an alert, since the alert settings themselves may be what is broken.
pub async fn run() -> Result<ExitCode> {
    let config = PipelineConfig::from_env().context("invalid configuration")?;

    let renderer = config.renderer().context("invalid configuration")?;

    let pool = db::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to the database")?;

    let outcome = run_with_pool(&config, pool.clone(), renderer).await;
    pool.close().await;

    let success = outcome?;
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run_with_pool(
    config: &PipelineConfig,
    pool: PgPool,
    renderer: TemplateRenderer,
) -> Result<bool> {
    let transport = HttpRelayTransport::new(
        config.relay_url.clone(),
        config.relay_token.clone(),
        config.send_timeout,
    );
    let checkpoints = checkpoint_store(config.checkpoint_backend, &config.checkpoint_dir, Some(&pool))?;
    let engine = DeliveryEngine::new(
        transport.clone(),
        renderer,
        config.sender(),
        config.delivery_policy(),
    );

    let orchestrator = RunOrchestrator::new(
        Arc::new(PostgresRecipientStore::new(pool)),
        checkpoints,
        engine,
        content_provider(config),
        alert_sink(config, transport),
        Arc::new(SystemClock),
        config.run_config(),
    );

    let report = orchestrator.run().await;
    Ok(report.success)
}

/// The cache alone, or the cache backed by the quote API when one is configured.
fn content_provider(config: &PipelineConfig) -> Arc<dyn ContentProvider> {
    let cache = CachedContentProvider::new(&config.content_path).with_freshness(Freshness::SameDay);
    match &config.content_api_url {
        Some(url) => {
            info!(content_api_url = %url, "content cache falls back to the quote api");
            Arc::new(ContentFetcher::new(HttpQuoteApi::new(url.as_str()), cache))
        }
        None => Arc::new(cache),
    }
}

fn alert_sink(config: &PipelineConfig, transport: HttpRelayTransport) -> Arc<dyn AlertSink> {
    match config.alert_recipient() {
        Some(to) => Arc::new(MailAlertSink::new(transport, config.sender_email.clone(), to)),
        None => {
            if config.send_alerts {
                warn!("SEND_ALERTS is enabled but ALERT_EMAIL is not set; alerts will only be logged");
            } else {
                info!("alert emails disabled (SEND_ALERTS=false)");
            }
            Arc::new(LogAlertSink)
        }
    }
}

fn checkpoint_store(
    backend: CheckpointBackend,
    dir: &std::path::Path,
    pool: Option<&PgPool>,
) -> Result<Arc<dyn CheckpointStore>> {
    Ok(match backend {
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(dir)),
        CheckpointBackend::Postgres => match pool {
            Some(pool) => Arc::new(PostgresCheckpointStore::new(pool.clone())),
            None => bail!("the postgres checkpoint backend needs DATABASE_URL"),
        },
    })
}

pub async fn fetch_content(api_url: &str, content_path: PathBuf) -> Result<ExitCode> {
    let cache = CachedContentProvider::new(content_path);
    let fetcher = ContentFetcher::new(HttpQuoteApi::new(api_url), cache);
    let content = fetcher
        .refresh(SystemClock.now())
        .await
        .context("refreshing today's quote")?;
    info!(author = %content.attribution, date = %content.date, "content ready");
    Ok(ExitCode::SUCCESS)
}

pub async fn migrate(database_url: &str) -> Result<ExitCode> {
    let pool = db::connect(database_url, 1)
        .await
        .context("connecting to the database")?;
    let result = db::apply_schema(&pool).await;
    pool.close().await;
    result.context("applying schema")?;
    info!("schema applied");
    Ok(ExitCode::SUCCESS)
}

pub struct CheckpointTarget {
    pub backend: CheckpointBackend,
    pub dir: PathBuf,
    pub database_url: Option<String>,
}

impl CheckpointTarget {
    async fn open(&self) -> Result<(Arc<dyn CheckpointStore>, Option<PgPool>)> {
        let pool = match (self.backend, &self.database_url) {
            (CheckpointBackend::Postgres, Some(url)) => Some(
                db::connect(url, 1)
                    .await
                    .context("connecting to the database")?,
            ),
            _ => None,
        };
        let store = checkpoint_store(self.backend, &self.dir, pool.as_ref())?;
        Ok((store, pool))
    }
}

pub async fn checkpoint_show(target: &CheckpointTarget, frequency: Frequency) -> Result<ExitCode> {
    let (store, pool) = target.open().await?;
    let loaded = store.load(frequency).await;
    if let Some(pool) = pool {
        pool.close().await;
    }

    match loaded.context("loading checkpoint")? {
        Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
        None => println!("no checkpoint stored for {frequency}"),
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn checkpoint_reset(target: &CheckpointTarget, frequency: Frequency) -> Result<ExitCode> {
    let (store, pool) = target.open().await?;
    let checkpoint = Checkpoint::initial(SystemClock.today());
    let saved = store.save(frequency, &checkpoint).await;
    if let Some(pool) = pool {
        pool.close().await;
    }

    saved.context("saving checkpoint")?;
    info!(%frequency, cycle_date = %checkpoint.cycle_date, "checkpoint reset");
    Ok(ExitCode::SUCCESS)
}
