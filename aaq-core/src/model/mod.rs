//! Domain entities shared across the service.
//!
//! Everything here is storage-agnostic: the structs carry validated data
//! between the HTTP surface, the query pipeline and the storage backends.

pub mod content;
pub mod session;
pub mod trace;
pub mod urgency;
pub mod user;
pub mod workspace;

pub use content::{
    Content, ContentUpdate, ImportError, ImportReport, NewContent, Tag,
};
pub use session::{ChatSession, ChatTurn, TurnRole};
pub use trace::{
    ContentFeedback, FeedbackSentiment, QueryTrace, ResponseFeedback, RetrievedItem, RetrievedRef,
};
pub use urgency::{MatchedRule, UrgencyQueryTrace, UrgencyRule};
pub use user::{NewUser, User};
pub use workspace::{NewWorkspace, UserRole, UserWorkspaceLink, Workspace};
