use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, Method},
    routing::get,
    Json, Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use setlist_api::config::Config;
use setlist_api::core::thompson::ThompsonSampler;
use setlist_api::routes::{
    feedback_router, health_router, search_router, FeedbackState, HealthState, SearchState,
};
use setlist_api::services::{
    DiversityService, EmbeddingCache, EmbeddingService, FeedbackService, NeuralReranker,
    RankingService, RerankerBackend, RetrievalService, StatisticsService,
};
use setlist_inference_client::{EmbeddingClient, RerankClient};

/// Build the CORS layer based on configuration.
///
/// In production, only configured origins are allowed; without any,
/// CORS requests are rejected. In development an unset `CORS_ORIGINS`
/// falls back to permissive CORS for convenience.
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
                    .max_age(Duration::from_secs(3600))
            }
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setlist_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration (fails fast on invalid scoring weights)
    let config = Config::from_env()?;

    tracing::info!("Starting Setlist API server on port {}", config.port);

    // Initialize database pool
    let database = config.database();
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
        .max_lifetime(Duration::from_secs(database.max_lifetime_secs))
        .test_before_acquire(database.test_before_acquire)
        .connect(&database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    // Embedding provider + cache
    let embedding_client = EmbeddingClient::new(config.embedding())?;
    let embedding_cache = EmbeddingCache::new(
        config.redis().clone(),
        config.embedding().model.clone(),
        config.embedding().dimension,
    );
    let embeddings = EmbeddingService::new(embedding_client, embedding_cache);

    // Pipeline services
    let retrieval = RetrievalService::new(pool.clone(), embeddings, config.search.hnsw_ef_search);
    let sampler = ThompsonSampler::new(config.thompson_prior_alpha, config.thompson_prior_beta);
    let ranking = RankingService::new(
        sampler,
        config.weights,
        config.freshness_decay_rate,
    );

    let backend = if config.enable_neural_rerank {
        match RerankClient::new(config.reranker())? {
            Some(client) => RerankerBackend::Http(client),
            None => {
                tracing::warn!("Neural rerank enabled but RERANKER_URL unset, stage disabled");
                RerankerBackend::Disabled
            }
        }
    } else {
        RerankerBackend::Disabled
    };
    let reranker = Arc::new(NeuralReranker::new(
        backend,
        config.reranker().max_concurrency,
    ));

    let diversity = DiversityService::new(config.mmr_lambda);
    let statistics = StatisticsService::new(
        pool.clone(),
        config.thompson_prior_alpha,
        config.thompson_prior_beta,
        config.position_propensities.clone(),
    );
    let feedback = FeedbackService::new(pool.clone());

    tracing::info!(
        neural_rerank = reranker.is_enabled(),
        "Ranking pipeline initialized"
    );

    let config = Arc::new(config);
    let search_state = SearchState {
        config: config.clone(),
        retrieval,
        ranking,
        reranker,
        diversity,
        statistics,
    };
    let feedback_state = FeedbackState { feedback };
    let health_state = HealthState { db: pool.clone() };

    let cors_layer = build_cors_layer(&config);

    // Build the router
    let app = Router::new()
        .route("/", get(root))
        .nest("/search", search_router(search_state))
        .nest("/feedback", feedback_router(feedback_state))
        .nest("/health", health_router(health_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Setlist Ranking Engine",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "endpoints": {
            "search": "POST /search",
            "feedback": "POST /feedback/{output_id}",
            "stats": "GET /feedback/{output_id}/stats",
        },
    }))
}
