//! cardmill API server binary: wires the catalog, Redis-backed store and
//! queue, HTTP clients, pipeline, and in-process dispatcher, then serves
//! the HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardmill_api::{router, AppState, MakeRequestUuidV7};
use cardmill_clients::{AssetStoreConfig, HttpAssetStore, HttpMergeService, MergeServiceConfig};
use cardmill_core::{defaults, Catalog, JobStore, ServiceConfig, WorkQueue};
use cardmill_jobs::{
    CardGenerator, Dispatcher, DispatcherConfig, GeneratePipeline, PipelineSettings, RetryPolicy,
};
use cardmill_store::{RedisJobStore, RedisWorkQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    //
    // Environment variables:
    //   LOG_FORMAT - "json" or "text" (default: "text")
    //   RUST_LOG   - standard env filter (default: "cardmill_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cardmill_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = ServiceConfig::from_env()?;

    let catalog = Arc::new(Catalog::load(&config.config_path)?);
    info!(
        config_path = %config.config_path,
        cards = catalog.cards.len(),
        "Card catalog loaded"
    );

    let store: Arc<dyn JobStore> = Arc::new(
        RedisJobStore::connect(&config.redis_url, config.job_prefix.clone(), config.job_ttl)
            .await?,
    );
    let queue: Arc<dyn WorkQueue> =
        Arc::new(RedisWorkQueue::connect(&config.redis_url, config.queue_name.clone()).await?);
    info!(queue_name = %config.queue_name, "Connected to Redis");

    let assets = Arc::new(HttpAssetStore::new(AssetStoreConfig::new(
        config.storage_api_base.clone(),
        config.storage_api_key.clone(),
    ))?);
    let merge = Arc::new(HttpMergeService::new(MergeServiceConfig::new(
        config.merge_client_id.clone(),
        config.merge_client_secret.clone(),
    ))?);

    let pipeline: Arc<dyn CardGenerator> = Arc::new(GeneratePipeline::new(
        catalog,
        assets,
        merge,
        PipelineSettings {
            data_file_prefix: config.data_file_prefix.clone(),
            font_dir: config.font_dest_dir.clone(),
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
        },
    ));

    let dispatcher = Dispatcher::new(
        store.clone(),
        queue.clone(),
        pipeline.clone(),
        DispatcherConfig {
            concurrency: config.worker_concurrency,
            limiter_max_ops: config.limiter_max_ops,
            limiter_window: config.limiter_window,
            idle_poll_interval: std::time::Duration::from_millis(
                defaults::QUEUE_POLL_INTERVAL_MS,
            ),
            retry: RetryPolicy::default(),
        },
    );
    let _dispatcher_handle = dispatcher.start();

    let state = AppState {
        store,
        queue,
        generator: pipeline,
    };

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(RequestBodyLimitLayer::new(defaults::BODY_LIMIT_BYTES));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "cardmill API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
