//! # Test Utilities
//!
//! Shared fixtures for aaq-core and the backend crates:
//!
//! - [`InMemoryStore`]: one struct implementing every storage trait with
//!   Postgres-equivalent semantics
//! - [`InMemorySessionStore`] / [`InMemoryQuotaCounter`]: cache-trait stand-ins
//! - [`StubEmbeddingProvider`]: deterministic token-overlap embeddings so
//!   similarity assertions are meaningful
//! - [`StubChatModel`]: scripted classifier/generation responses with call
//!   recording
//! - [`TestContext`]: a fully wired service graph over the stubs

pub mod cache;
pub mod memory_store;
pub mod providers;

pub use cache::{InMemoryQuotaCounter, InMemorySessionStore};
pub use memory_store::InMemoryStore;
pub use providers::{
    FailingChatModel, FailingEmbeddingProvider, StubChatModel, StubEmbeddingProvider,
};

use std::sync::Arc;

use aaq_core::analytics::topics::ClusteringConfig;
use aaq_core::auth::JwtCodec;
use aaq_core::config::{
    GuardrailSettings, JwtSettings, RetrievalSettings, SessionSettings,
};
use aaq_core::guardrails::SafetyAction;
use aaq_core::model::{NewContent, NewUser, Workspace};
use aaq_core::{
    AnswerGenerator, ContentService, DashboardService, EmbeddingService, FeedbackService,
    GuardrailChecks, IdentityService, LlmService, QueryService, RetrievalEngine, SessionManager,
    TopicService, UrgencyDetector,
};

/// Default embedding dimension used by the stubs
pub const TEST_EMBEDDING_DIM: usize = 64;

/// A fully wired service graph over in-memory stores and stub providers
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub quota: Arc<InMemoryQuotaCounter>,
    pub chat_model: Arc<StubChatModel>,
    pub embeddings: Arc<EmbeddingService>,
    pub identity: Arc<IdentityService>,
    pub contents: Arc<ContentService>,
    pub queries: Arc<QueryService>,
    pub feedback: Arc<FeedbackService>,
    pub urgency: Arc<UrgencyDetector>,
    pub dashboard: Arc<DashboardService>,
    pub topics: Arc<TopicService>,
}

/// Tunables for [`build_context`]
pub struct TestContextConfig {
    pub top_k: usize,
    pub paraphrase_threshold: f32,
    pub urgency_threshold: f32,
    pub chat_model: StubChatModel,
    pub default_api_daily_quota: Option<i64>,
    pub default_content_quota: Option<i64>,
}

impl Default for TestContextConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            // Token-overlap vectors are sparse; keep the relevance gate low
            paraphrase_threshold: 0.05,
            urgency_threshold: 0.6,
            chat_model: StubChatModel::default(),
            default_api_daily_quota: None,
            default_content_quota: None,
        }
    }
}

/// Build a [`TestContext`] with the given tunables
#[must_use]
pub fn build_context(config: TestContextConfig) -> TestContext {
    let store = InMemoryStore::new();
    let quota = Arc::new(InMemoryQuotaCounter::new());
    let sessions_store = Arc::new(InMemorySessionStore::new());
    let chat_model = Arc::new(config.chat_model);

    let embeddings = Arc::new(EmbeddingService::new(
        Arc::new(StubEmbeddingProvider::new(TEST_EMBEDDING_DIM)),
        1024,
        8,
    ));
    let llm = Arc::new(LlmService::new(chat_model.clone(), 8, 0.1, 512));

    let retrieval = RetrievalEngine::new(
        store.clone(),
        embeddings.clone(),
        RetrievalSettings {
            top_k: config.top_k,
            similarity_floor: 0.0,
            exact_search_threshold: 512,
        },
    );
    let checks = GuardrailChecks::new(
        llm.clone(),
        GuardrailSettings {
            allowed_languages: vec!["en".to_string()],
            paraphrase_threshold: config.paraphrase_threshold,
            align_score_threshold: 0.7,
            safety_action: SafetyAction::Block,
            step_timeout_secs: 5,
        },
    );
    let session_manager = SessionManager::new(
        sessions_store,
        SessionSettings {
            ttl_secs: 1800,
            max_turns: 10,
            max_turn_chars: 4000,
        },
    );

    let identity = Arc::new(IdentityService::new(
        store.clone(),
        JwtCodec::new(&JwtSettings {
            secret: "test-secret".to_string(),
            previous_secrets: vec![],
            ttl_hours: 24,
        }),
        config.default_content_quota,
        config.default_api_daily_quota,
    ));
    let contents = Arc::new(ContentService::new(
        store.clone(),
        store.clone(),
        embeddings.clone(),
    ));
    let queries = Arc::new(QueryService::new(
        retrieval,
        checks,
        AnswerGenerator::new(llm.clone()),
        store.clone(),
        quota.clone(),
        session_manager,
        config.top_k,
    ));
    let feedback = Arc::new(FeedbackService::new(store.clone(), store.clone()));
    let urgency = Arc::new(UrgencyDetector::new(
        store.clone(),
        embeddings.clone(),
        llm.clone(),
        config.urgency_threshold,
    ));
    let dashboard = Arc::new(DashboardService::new(store.clone()));
    let topics = Arc::new(TopicService::new(
        store.clone(),
        llm,
        ClusteringConfig::default(),
    ));

    TestContext {
        store,
        quota,
        chat_model,
        embeddings,
        identity,
        contents,
        queries,
        feedback,
        urgency,
        dashboard,
        topics,
    }
}

impl TestContext {
    /// Register a user, create a workspace for them and return both
    pub async fn workspace_with_admin(&self, name: &str) -> (i64, Workspace) {
        let user = self
            .identity
            .register_user(&NewUser {
                username: format!("{name}-admin"),
                password: "test-password".to_string(),
            })
            .await
            .expect("register user");
        let workspace = self
            .identity
            .create_workspace(
                user.id,
                aaq_core::model::NewWorkspace {
                    name: name.to_string(),
                    content_quota: None,
                    api_daily_quota: None,
                },
            )
            .await
            .expect("create workspace");
        (user.id, workspace)
    }

    /// Seed one content item
    pub async fn seed_content(&self, workspace: &Workspace, title: &str, text: &str) -> i64 {
        self.contents
            .create(
                workspace,
                NewContent {
                    title: title.to_string(),
                    text: text.to_string(),
                    metadata: serde_json::Value::Null,
                    tag_ids: vec![],
                },
            )
            .await
            .expect("seed content")
            .id
    }
}
