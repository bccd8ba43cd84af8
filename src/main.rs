//! Job run analyzer - Main entry point.
//!
//! Waits for the job runs of one payload and gates the payload on how often
//! each tracked test passed across them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use jobrun_analyzer_lib::config::Config;
use jobrun_analyzer_lib::db::DbPool;
use jobrun_analyzer_lib::error::AppResult;
use jobrun_analyzer_lib::models::ArtifactLinks;
use jobrun_analyzer_lib::services::{
    CatalogJobGetter, JobCatalog, JobFilter, ObjectStore, Storage, TestCaseAnalyzer,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - Exactly one of JRA_PAYLOAD_TAG and JRA_PAYLOAD_INVOCATION_ID must be set");
            error!("  - JRA_PAYLOAD_INVOCATION_ID requires JRA_EXPLICIT_GCS_PREFIXES");
            error!("  - In production, DATABASE_URL and S3 credentials must be set");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Job Run Analyzer");
    info!("  Environment: {}", config.environment);
    info!("  Payload: {}", config.analyzer.match_id());
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling analysis");
                cancel.cancel();
            }
        });
    }

    match run(&config, &cancel).await {
        Ok(()) => {}
        Err(e) if e.is_soft() => warn!("{}", e),
        Err(e) => {
            error!("Analysis failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config: &Config, cancel: &CancellationToken) -> AppResult<()> {
    let storage = Storage::new(&config.s3).await?;
    let pool = DbPool::connect(&config.database_url, config.db_max_connections).await?;

    let settings = &config.analyzer;
    let links = ArtifactLinks {
        bucket: storage.bucket().to_string(),
        human_url_base: settings.human_url_base.clone(),
        artifact_url_base: settings.artifact_url_base.clone(),
    };
    let catalog: Arc<dyn JobCatalog> = Arc::new(pool);
    let store: Arc<dyn ObjectStore> = Arc::new(storage);
    let filter = JobFilter {
        platform: settings.platform.clone(),
        network: settings.network.clone(),
        infrastructure: settings.infrastructure.clone(),
        exclude_job_names: settings.exclude_job_names.clone(),
    };
    let job_getter = Arc::new(CatalogJobGetter::new(
        catalog.clone(),
        filter,
        settings.explicit_gcs_prefixes.clone(),
    ));

    let analyzer = TestCaseAnalyzer::new(
        TestCaseAnalyzer::options_from_settings(settings)?,
        job_getter,
        catalog,
        store,
        links,
        TestCaseAnalyzer::checkers_from_settings(settings),
    );

    let report = analyzer.run(cancel).await?;
    info!("All test cases passed, report at {}", report.display());
    Ok(())
}
