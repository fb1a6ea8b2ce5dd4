//! Content item references consumed by the projection engine.
//!
//! Content items are owned by the ingestion side of the system; the engine
//! only reads them. The one behavior the engine relies on is
//! [`ContentItem::text`], the stable text-extraction contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The collected payload of a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPayload {
    /// An interview answer, optionally with the question that prompted it.
    QuestionAnswer {
        #[serde(default)]
        question: String,
        answer: String,
    },
    /// Free text, including voice transcriptions.
    Text { text: String },
    /// A photo or other media, optionally described.
    Media {
        #[serde(default)]
        description: Option<String>,
    },
}

/// A single piece of collected content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub project_id: String,
    pub contributor_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub payload: ContentPayload,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        contributor_id: impl Into<String>,
        payload: ContentPayload,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            contributor_id: contributor_id.into(),
            tags: Vec::new(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Synthesizable text for this item.
    ///
    /// Question/answer pairs render as `"Q: ...\nA: ..."` (the answer alone
    /// when the question is empty). Items without text yield `""`; they are
    /// left out of synthesis input but still count for provenance.
    pub fn text(&self) -> String {
        match &self.payload {
            ContentPayload::QuestionAnswer { question, answer } => {
                if question.trim().is_empty() {
                    answer.clone()
                } else {
                    format!("Q: {}\nA: {}", question, answer)
                }
            }
            ContentPayload::Text { text } => text.clone(),
            ContentPayload::Media { description } => description.clone().unwrap_or_default(),
        }
    }
}

/// Extract the non-empty texts of `items`, in order.
pub fn extract_texts<'a, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ContentItem>,
{
    items
        .into_iter()
        .map(ContentItem::text)
        .filter(|t| !t.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_answer_text() {
        let item = ContentItem::new(
            "c1",
            "p1",
            "u1",
            ContentPayload::QuestionAnswer {
                question: "Where did you grow up?".into(),
                answer: "On a farm in Iowa.".into(),
            },
        );
        assert_eq!(item.text(), "Q: Where did you grow up?\nA: On a farm in Iowa.");
    }

    #[test]
    fn test_answer_without_question() {
        let item = ContentItem::new(
            "c1",
            "p1",
            "u1",
            ContentPayload::QuestionAnswer {
                question: String::new(),
                answer: "Just the answer.".into(),
            },
        );
        assert_eq!(item.text(), "Just the answer.");
    }

    #[test]
    fn test_media_without_description_is_excluded() {
        let photo = ContentItem::new("c1", "p1", "u1", ContentPayload::Media { description: None });
        let note = ContentItem::new(
            "c2",
            "p1",
            "u1",
            ContentPayload::Text {
                text: "A note.".into(),
            },
        );
        assert_eq!(photo.text(), "");
        assert_eq!(extract_texts([&photo, &note]), vec!["A note.".to_string()]);
    }

    #[test]
    fn test_payload_json_shape() {
        let json = r#"{
            "id": "c1",
            "project_id": "p1",
            "contributor_id": "u1",
            "tags": ["childhood"],
            "payload": {"type": "question_answer", "question": "Q?", "answer": "A."}
        }"#;
        let item: ContentItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.tags, vec!["childhood"]);
        assert_eq!(item.text(), "Q: Q?\nA: A.");
    }
}
