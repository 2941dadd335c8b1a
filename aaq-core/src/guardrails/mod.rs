//! Input/output guardrails around retrieval and generation.
//!
//! The pipeline is a deterministic state machine:
//!
//! ```text
//! RECEIVED → LANG_OK → SAFE → ON_TOPIC → RETRIEVED → GENERATED → ALIGNED → DELIVERED
//! ```
//!
//! Each step resolves to a [`StepOutcome`]: advance, reject with a reason,
//! or defer to a degraded path (retrieval-only answer, templated fallback).
//! Steps run under an independent timeout and are retried once on transport
//! failure. The driver in [`crate::pipeline`] records every transition on
//! the query trace.

pub mod steps;

pub use steps::GuardrailChecks;

use serde::{Deserialize, Serialize};

/// States of the guardrail pipeline, in declared order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    LangOk,
    Safe,
    OnTopic,
    Retrieved,
    Generated,
    Aligned,
    Delivered,
    Rejected,
}

impl PipelineState {
    /// Trace annotation for this state
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Received => "received",
            PipelineState::LangOk => "lang_ok",
            PipelineState::Safe => "safe",
            PipelineState::OnTopic => "on_topic",
            PipelineState::Retrieved => "retrieved",
            PipelineState::Generated => "generated",
            PipelineState::Aligned => "aligned",
            PipelineState::Delivered => "delivered",
            PipelineState::Rejected => "rejected",
        }
    }
}

/// Why a query was rejected.
///
/// These are trace annotations, not errors: the HTTP response is still 200
/// with an empty result set and a `blocked_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    UnsupportedLanguage,
    Unsafe,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UnsupportedLanguage => "unsupported_language",
            RejectReason::Unsafe => "unsafe",
        }
    }
}

/// Resolution of one guardrail step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    /// Continue to the next state with this payload
    Advance(T),
    /// Stop and return a blocked response
    Reject(RejectReason),
    /// Continue on a degraded path; the string is a warning for the caller
    Defer(String),
}

/// What the safety guardrail does with a flagged query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyAction {
    /// Reject the query outright
    #[default]
    Block,
    /// Strip the flagged content and continue
    Redact,
    /// Continue unchanged, recording a warning
    PassThrough,
}

impl std::str::FromStr for SafetyAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "block" => Ok(SafetyAction::Block),
            "redact" => Ok(SafetyAction::Redact),
            "pass-through" | "pass_through" => Ok(SafetyAction::PassThrough),
            other => Err(crate::Error::Validation(format!(
                "unknown safety action: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_annotations_are_snake_case() {
        assert_eq!(PipelineState::LangOk.as_str(), "lang_ok");
        assert_eq!(PipelineState::Delivered.as_str(), "delivered");
        assert_eq!(RejectReason::UnsupportedLanguage.as_str(), "unsupported_language");
    }

    #[test]
    fn safety_action_parses_both_spellings() {
        assert_eq!("redact".parse::<SafetyAction>().unwrap(), SafetyAction::Redact);
        assert_eq!(
            "pass-through".parse::<SafetyAction>().unwrap(),
            SafetyAction::PassThrough
        );
        assert!("explode".parse::<SafetyAction>().is_err());
    }
}
