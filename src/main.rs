use std::net::SocketAddr;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use compass_collector::config::AppConfig;
use compass_collector::services::consumer::{JobProcessor, QueueConsumer};
use compass_collector::services::queue::{JobQueue, SqsJobQueue};
use compass_collector::services::role_assumer::{RoleAssumer, StsRoleAssumer};
use compass_collector::services::rule_evaluation::{
    AwsConfigSourceFactory, EvaluationSourceFactory, RuleEvaluationClient,
};
use compass_collector::stores::postgres::{PgJobRecordStore, PgJobTemplateStore};
use compass_collector::stores::{JobRecordStore, JobTemplateStore};
use compass_collector::{db, routes, AppState};
use mimalloc::MiMalloc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compass_collector=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&pool).await?;

    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()))
        .load()
        .await;

    let queue: Arc<dyn JobQueue> = Arc::new(SqsJobQueue::new(&aws_config, &config));
    let assumer: Arc<dyn RoleAssumer> = Arc::new(StsRoleAssumer::new(
        &aws_config,
        config.collector_role_name.clone(),
        config.assume_timeout,
    ));
    let sources: Arc<dyn EvaluationSourceFactory> =
        Arc::new(AwsConfigSourceFactory::new(config.aws_region.clone()));
    let templates: Arc<dyn JobTemplateStore> = Arc::new(PgJobTemplateStore::new(pool.clone()));
    let records: Arc<dyn JobRecordStore> = Arc::new(PgJobRecordStore::new(pool.clone()));

    let processor = Arc::new(JobProcessor::new(
        assumer,
        sources,
        Arc::clone(&templates),
        Arc::clone(&records),
        RuleEvaluationClient::new(config.evaluation_retry_attempts, config.evaluation_timeout),
    ));
    let consumer = QueueConsumer::new(Arc::clone(&queue), processor, config.batch_size);

    let state = AppState {
        db: pool,
        config: config.clone(),
        queue,
        templates,
        jobs: records,
    };

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(host = %addr, "Starting Compass evidence collector");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = tokio::spawn(async move { axum::serve(listener, app).await });
    let worker = tokio::spawn(async move { consumer.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = server => {
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "HTTP server exited");
            }
        }
        _ = worker => {
            tracing::error!("consumer loop exited");
        }
    }

    Ok(())
}
