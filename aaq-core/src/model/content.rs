//! Content items and tags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::constants::{MAX_TAG_LEN, MAX_TEXT_LEN, MAX_TITLE_LEN};
use crate::error::{Error, Result};

/// A knowledge-base entry owned by a workspace.
///
/// The embedding always matches the configured model dimension; archived
/// content is excluded from retrieval but kept for trace integrity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub workspace_id: i64,
    pub title: String,
    pub text: String,
    /// Free-form caller-supplied metadata
    pub metadata: serde_json::Value,
    pub tag_ids: Vec<i64>,
    pub is_archived: bool,
    pub positive_votes: i32,
    pub negative_votes: i32,
    /// Dense vector over `title + text`; skipped in API responses
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    /// Text that gets embedded: title and body joined with a newline
    #[must_use]
    pub fn embedding_input(title: &str, text: &str) -> String {
        format!("{title}\n{text}")
    }

    /// Title as dashboards display it
    #[must_use]
    pub fn display_title(&self) -> String {
        if self.is_archived {
            format!("[DELETED] {}", self.title)
        } else {
            self.title.clone()
        }
    }
}

/// Payload for content creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContent {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl NewContent {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_text(&self.text)
    }
}

/// Partial update; `None` fields preserve existing values
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub text: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub tag_ids: Option<Vec<i64>>,
}

impl ContentUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(text) = &self.text {
            validate_text(text)?;
        }
        Ok(())
    }

    /// Whether this update forces an embedding recomputation
    #[must_use]
    pub fn changes_embedded_text(&self, current: &Content) -> bool {
        let title_changed = self.title.as_ref().is_some_and(|t| *t != current.title);
        let text_changed = self.text.as_ref().is_some_and(|t| *t != current.text);
        title_changed || text_changed
    }
}

/// Workspace-scoped label attached to content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
}

/// Validate a tag name: non-empty, bounded, unique per workspace is
/// enforced at the storage layer
pub fn validate_tag_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_TAG_LEN {
        return Err(Error::Validation(format!(
            "tag name must be 1..{MAX_TAG_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(Error::Validation(format!(
            "content title must be 1..{MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_text(text: &str) -> Result<()> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(Error::Validation(format!(
            "content text must be 1..{MAX_TEXT_LEN} characters"
        )));
    }
    Ok(())
}

/// One rejected row from a bulk CSV import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportError {
    /// Error class, e.g. `empty_title`, `duplicate_title`, `text_too_long`
    #[serde(rename = "type")]
    pub error_type: String,
    /// 1-indexed data row the error refers to
    pub row: usize,
    pub description: String,
}

impl ImportError {
    #[must_use]
    pub fn new(error_type: &str, row: usize, description: String) -> Self {
        Self {
            error_type: error_type.to_string(),
            row,
            description,
        }
    }
}

/// Outcome of a bulk import; rows are validated independently so partial
/// success is normal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<ImportError>,
}

/// Parse and validate CSV bytes with `title,text` columns.
///
/// Returns the valid rows tagged with their 1-indexed data-row number, plus
/// per-row errors. Duplicates inside the upload are rejected here;
/// duplicates against existing content are checked by the caller, which has
/// store access.
pub fn parse_content_csv(bytes: &[u8]) -> (Vec<(usize, NewContent)>, Vec<ImportError>) {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut seen_texts: HashSet<String> = HashSet::new();

    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row_number = index + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(ImportError::new(
                    "malformed_row",
                    row_number,
                    format!("could not parse row: {e}"),
                ));
                continue;
            }
        };

        if let Err(e) = validate_title(&record.title) {
            errors.push(ImportError::new("invalid_title", row_number, e.to_string()));
            continue;
        }
        if let Err(e) = validate_text(&record.text) {
            errors.push(ImportError::new("invalid_text", row_number, e.to_string()));
            continue;
        }
        if !seen_titles.insert(record.title.clone()) {
            errors.push(ImportError::new(
                "duplicate_title",
                row_number,
                format!("title '{}' appears more than once in the upload", record.title),
            ));
            continue;
        }
        if !seen_texts.insert(record.text.clone()) {
            errors.push(ImportError::new(
                "duplicate_text",
                row_number,
                "text appears more than once in the upload".to_string(),
            ));
            continue;
        }

        rows.push((
            row_number,
            NewContent {
                title: record.title,
                text: record.text,
                metadata: serde_json::Value::Null,
                tag_ids: Vec::new(),
            },
        ));
    }

    (rows, errors)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    title: String,
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_and_text_bounds() {
        assert!(validate_title("Headache during pregnancy").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title(&"x".repeat(151)).is_err());
        assert!(validate_text(&"x".repeat(2000)).is_ok());
        assert!(validate_text(&"x".repeat(2001)).is_err());
    }

    #[test]
    fn display_title_marks_archived() {
        let mut content = sample_content();
        assert_eq!(content.display_title(), "Nutrition basics");
        content.is_archived = true;
        assert_eq!(content.display_title(), "[DELETED] Nutrition basics");
    }

    #[test]
    fn update_detects_embedded_text_changes() {
        let content = sample_content();
        let noop = ContentUpdate {
            title: Some("Nutrition basics".to_string()),
            ..Default::default()
        };
        assert!(!noop.changes_embedded_text(&content));

        let retitled = ContentUpdate {
            title: Some("Feeding basics".to_string()),
            ..Default::default()
        };
        assert!(retitled.changes_embedded_text(&content));

        let metadata_only = ContentUpdate {
            metadata: Some(serde_json::json!({"reviewed": true})),
            ..Default::default()
        };
        assert!(!metadata_only.changes_embedded_text(&content));
    }

    #[test]
    fn csv_rejects_duplicates_within_upload() {
        let csv = b"title,text\nA,first\nB,second\nA,third\nC,second\n";
        let (rows, errors) = parse_content_csv(csv);
        assert_eq!(rows.len(), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].error_type, "duplicate_title");
        assert_eq!(errors[0].row, 3);
        assert_eq!(errors[1].error_type, "duplicate_text");
        assert_eq!(errors[1].row, 4);
    }

    #[test]
    fn csv_reports_invalid_rows_independently() {
        let long_text = "y".repeat(2001);
        let csv = format!("title,text\n,missing title\nOk,{long_text}\nFine,short enough\n");
        let (rows, errors) = parse_content_csv(csv.as_bytes());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 3);
        assert_eq!(rows[0].1.title, "Fine");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].error_type, "invalid_title");
        assert_eq!(errors[1].error_type, "invalid_text");
    }

    fn sample_content() -> Content {
        Content {
            id: 1,
            workspace_id: 1,
            title: "Nutrition basics".to_string(),
            text: "Eat a balanced diet.".to_string(),
            metadata: serde_json::Value::Null,
            tag_ids: vec![],
            is_archived: false,
            positive_votes: 0,
            negative_votes: 0,
            embedding: vec![0.0; 4],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}
