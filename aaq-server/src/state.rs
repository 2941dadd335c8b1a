//! Shared request state: the wired service graph.
//!
//! One [`AppState`] value is built at startup (or by tests, over stubs) and
//! cloned into every handler. Handlers never touch storage directly; they go
//! through the `aaq-core` services.

use std::sync::Arc;

use aaq_core::{
    ContentService, DashboardService, FeedbackService, IdentityService, QueryService,
    TopicService, UrgencyDetector,
};

/// Cloneable context object handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub contents: Arc<ContentService>,
    pub queries: Arc<QueryService>,
    pub feedback: Arc<FeedbackService>,
    pub urgency: Arc<UrgencyDetector>,
    pub dashboard: Arc<DashboardService>,
    pub topics: Arc<TopicService>,
}
