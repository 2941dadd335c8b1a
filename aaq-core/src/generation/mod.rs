//! Grounded answer generation.
//!
//! The generator feeds the LLM a system prompt enumerating the retrieved
//! snippets with stable indices `[1..k]` and forbids information beyond
//! them. Citations are extracted with a strict regex and validated against
//! the supplied snippet range; anything out of range forces the caller onto
//! the templated fallback.

use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, LlmService};
use crate::model::TurnRole;
use crate::retrieval::ScoredContent;

/// A generated answer with its validated citations
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub llm_response: String,
    /// 1-based snippet indices the answer cites, deduplicated and sorted
    pub cited_indices: Vec<usize>,
}

/// LLM-backed answer generator
pub struct AnswerGenerator {
    llm: Arc<LlmService>,
}

impl AnswerGenerator {
    #[must_use]
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }

    /// Generate a grounded answer for `query` from the retrieved `hits`.
    ///
    /// `history` is the bounded chat buffer, oldest first. Surfaces
    /// [`Error::GenerationFailed`] when the model cites snippets it was not
    /// given or the upstream call fails after retries; callers may then
    /// degrade to a retrieval-only response.
    pub async fn generate(
        &self,
        query: &str,
        hits: &[ScoredContent],
        history: &[(TurnRole, &str)],
    ) -> Result<GeneratedAnswer> {
        if hits.is_empty() {
            return Err(Error::GenerationFailed(
                "no snippets available for grounding".to_string(),
            ));
        }

        let mut messages = vec![ChatMessage::system(build_system_prompt(hits))];
        for (role, content) in history {
            messages.push(match role {
                TurnRole::User => ChatMessage::user((*content).to_string()),
                TurnRole::Assistant => ChatMessage::assistant((*content).to_string()),
            });
        }
        messages.push(ChatMessage::user(query.to_string()));

        let response = self.llm.complete(messages).await.map_err(|e| match e {
            Error::GenerationFailed(_) => e,
            other => Error::GenerationFailed(other.to_string()),
        })?;

        let cited_indices = extract_citations(&response);
        for index in &cited_indices {
            if *index == 0 || *index > hits.len() {
                return Err(Error::GenerationFailed(format!(
                    "answer cites snippet [{index}] outside the supplied range 1..{}",
                    hits.len()
                )));
            }
        }

        Ok(GeneratedAnswer {
            llm_response: response,
            cited_indices,
        })
    }
}

/// System prompt enumerating the snippets with stable `[n]` indices
fn build_system_prompt(hits: &[ScoredContent]) -> String {
    let mut prompt = String::from(
        "You answer questions using ONLY the reference snippets below. \
         Cite every claim with the snippet index in square brackets, e.g. [1]. \
         If the snippets do not contain the answer, say you cannot answer from \
         the available information. Do not use any knowledge beyond the snippets.\n\n",
    );
    for (i, hit) in hits.iter().enumerate() {
        prompt.push_str(&format!(
            "[{index}] {title}\n{text}\n\n",
            index = i + 1,
            title = hit.content.title,
            text = hit.content.text,
        ));
    }
    prompt
}

/// Extract `[n]` citation markers, deduplicated and sorted
#[must_use]
pub fn extract_citations(response: &str) -> Vec<usize> {
    static CITATION: OnceLock<Regex> = OnceLock::new();
    let regex = CITATION.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid citation regex"));

    let mut indices: Vec<usize> = regex
        .captures_iter(response)
        .filter_map(|cap| cap[1].parse().ok())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Templated fallback referencing only retrieved titles; used when
/// generation fails or the answer fails the alignment check
#[must_use]
pub fn fallback_answer(hits: &[ScoredContent]) -> String {
    if hits.is_empty() {
        return "I could not find relevant information for this question.".to_string();
    }
    let titles: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}", i + 1, hit.content.title))
        .collect();
    format!(
        "I could not generate a reliable answer, but the following related \
         information may help: {}",
        titles.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Content;

    fn hit(id: i64, title: &str, text: &str) -> ScoredContent {
        ScoredContent {
            content: Content {
                id,
                workspace_id: 1,
                title: title.to_string(),
                text: text.to_string(),
                metadata: serde_json::Value::Null,
                tag_ids: vec![],
                is_archived: false,
                positive_votes: 0,
                negative_votes: 0,
                embedding: vec![0.0; 4],
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
            similarity: 0.9,
        }
    }

    #[test]
    fn citations_are_extracted_sorted_and_deduplicated() {
        let cited = extract_citations("Per [2] and [1], rest is covered in [2].");
        assert_eq!(cited, vec![1, 2]);
    }

    #[test]
    fn citation_regex_is_strict() {
        assert!(extract_citations("no citations here [a] [1.5] [ 2 ]").is_empty());
    }

    #[test]
    fn system_prompt_enumerates_snippets() {
        let hits = vec![hit(1, "First", "text one"), hit(2, "Second", "text two")];
        let prompt = build_system_prompt(&hits);
        assert!(prompt.contains("[1] First"));
        assert!(prompt.contains("[2] Second"));
        assert!(prompt.contains("ONLY"));
    }

    #[test]
    fn fallback_lists_titles_only() {
        let hits = vec![hit(1, "Headache during pregnancy", "long body text")];
        let fallback = fallback_answer(&hits);
        assert!(fallback.contains("Headache during pregnancy"));
        assert!(!fallback.contains("long body text"));
    }
}
