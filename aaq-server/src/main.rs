//! Service entrypoint: config, connections, service graph, serve loop.

use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aaq_cache_redis::RedisCache;
use aaq_core::analytics::topics::ClusteringConfig;
use aaq_core::auth::JwtCodec;
use aaq_core::embeddings::HttpEmbeddingProvider;
use aaq_core::llm::HttpChatModel;
use aaq_core::{
    AnswerGenerator, ContentService, DashboardService, EmbeddingService, FeedbackService,
    GuardrailChecks, IdentityService, LlmService, QueryService, RetrievalEngine, SessionManager,
    Settings, TopicService, UrgencyDetector,
};
use aaq_storage_postgres::PostgresStore;

use aaq_server::{router, with_request_deadline, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "aaq_server=info,aaq_core=info,aaq_storage_postgres=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let settings = Settings::from_env()?;

    let store = Arc::new(
        PostgresStore::connect(
            &settings.store.database_url,
            settings.store.pool_size,
            settings.embedding.dimension,
        )
        .await?,
    );
    let cache = Arc::new(RedisCache::connect(&settings.store.redis_url).await?);

    let embeddings = Arc::new(EmbeddingService::new(
        Arc::new(HttpEmbeddingProvider::new(&settings.embedding)?),
        settings.embedding.cache_size,
        settings.embedding.max_concurrency,
    ));
    // A dimension mismatch is fatal: writes must not produce unsearchable rows
    embeddings.verify_dimension().await?;

    let llm = Arc::new(LlmService::new(
        Arc::new(HttpChatModel::new(&settings.llm)?),
        settings.llm.max_concurrency,
        settings.llm.temperature,
        settings.llm.max_tokens,
    ));

    let identity = Arc::new(IdentityService::new(
        store.clone(),
        JwtCodec::new(&settings.jwt),
        settings.quota.default_content_quota,
        settings.quota.default_api_daily_quota,
    ));
    let contents = Arc::new(ContentService::new(
        store.clone(),
        store.clone(),
        embeddings.clone(),
    ));
    let queries = Arc::new(QueryService::new(
        RetrievalEngine::new(store.clone(), embeddings.clone(), settings.retrieval.clone()),
        GuardrailChecks::new(llm.clone(), settings.guardrails.clone()),
        AnswerGenerator::new(llm.clone()),
        store.clone(),
        cache.clone(),
        SessionManager::new(cache.clone(), settings.session.clone()),
        settings.retrieval.top_k,
    ));
    let feedback = Arc::new(FeedbackService::new(store.clone(), store.clone()));
    let urgency = Arc::new(UrgencyDetector::new(
        store.clone(),
        embeddings.clone(),
        llm.clone(),
        settings.urgency.similarity_threshold,
    ));
    let dashboard = Arc::new(DashboardService::new(store.clone()));
    let topics = Arc::new(TopicService::new(
        store.clone(),
        llm,
        ClusteringConfig::default(),
    ));

    let state = AppState {
        identity,
        contents,
        queries,
        feedback,
        urgency,
        dashboard,
        topics,
    };

    let app = with_request_deadline(
        router(state),
        Duration::from_secs(settings.server.request_timeout_secs),
    )
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
