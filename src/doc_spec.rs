//! Blog document schema.
//!
//! The LLM produces the document as loosely-typed JSON. [`DocSpec::from_value`]
//! is the single gate between that JSON and the typed document the renderer
//! consumes: anything it accepts can be rendered.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Paragraph used by [`DocSpec::fallback`].
pub const FALLBACK_NOTICE: &str = "Could not generate a full blog spec reliably. Please retry.";

/// JSON schema shown to the model in every prompt that asks for a document.
pub const SCHEMA_HINT: &str = r#"{
  "title": "string",
  "subtitle": "string",
  "sections": [
    {
      "heading": "string",
      "paragraphs": ["string", "string"],
      "images": [{"asset_id": "string", "caption": "string"}]
    }
  ],
  "references": [{"title": "string", "url": "string"}]
}"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocSpecError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("title must be a non-empty string")]
    MissingTitle,

    #[error("subtitle key is required")]
    MissingSubtitle,

    #[error("sections must be a non-empty list")]
    NoSections,

    #[error("references must be a list")]
    InvalidReferences,

    #[error("section {index}: {reason}")]
    InvalidSection { index: usize, reason: &'static str },
}

/// A complete blog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocSpec {
    pub title: String,
    pub subtitle: String,
    pub sections: Vec<Section>,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub heading: String,
    pub paragraphs: Vec<String>,
    pub images: Vec<ImageRef>,
}

/// Reference from a section to a downloaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub asset_id: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub title: String,
    pub url: String,
}

impl DocSpec {
    /// Decode and validate a JSON document.
    pub fn parse(text: &str) -> Result<Self, DocSpecError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DocSpecError::Json(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Validate a decoded JSON document and convert it to the typed form.
    ///
    /// Required: a non-blank string `title`, a `subtitle` key (null reads as
    /// empty), and a non-empty `sections` list whose entries each carry a
    /// string `heading` and a non-empty `paragraphs` list. `images` and
    /// `references` are optional but must be lists when present.
    pub fn from_value(value: &Value) -> Result<Self, DocSpecError> {
        let obj = value.as_object().ok_or(DocSpecError::NotAnObject)?;

        let title = match obj.get("title") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => return Err(DocSpecError::MissingTitle),
        };

        let subtitle = obj
            .get("subtitle")
            .map(text_of)
            .ok_or(DocSpecError::MissingSubtitle)?;

        let sections = match obj.get("sections") {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .enumerate()
                .map(|(index, item)| parse_section(index, item))
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(DocSpecError::NoSections),
        };

        let references = match obj.get("references") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(|r| Reference {
                    title: r
                        .get("title")
                        .map(text_of)
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| "Source".to_string()),
                    url: r.get("url").map(text_of).unwrap_or_default(),
                })
                .collect(),
            Some(_) => return Err(DocSpecError::InvalidReferences),
        };

        Ok(Self {
            title,
            subtitle,
            sections,
            references,
        })
    }

    /// Minimal valid document used when the model cannot produce one.
    pub fn fallback(topic: &str) -> Self {
        Self {
            title: topic.to_string(),
            subtitle: String::new(),
            sections: vec![Section {
                heading: "Draft".to_string(),
                paragraphs: vec![FALLBACK_NOTICE.to_string()],
                images: Vec::new(),
            }],
            references: Vec::new(),
        }
    }

    /// Approximate word count over all visible text except references.
    pub fn word_count(&self) -> usize {
        let words = |s: &str| s.split_whitespace().count();

        let mut total = words(&self.title) + words(&self.subtitle);
        for section in &self.sections {
            total += words(&section.heading);
            total += section.paragraphs.iter().map(|p| words(p)).sum::<usize>();
            total += section.images.iter().map(|i| words(&i.caption)).sum::<usize>();
        }
        total
    }

    /// Compact JSON form, as fed back to the model.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn parse_section(index: usize, item: &Value) -> Result<Section, DocSpecError> {
    let invalid = |reason| DocSpecError::InvalidSection { index, reason };
    let obj: &Map<String, Value> = item.as_object().ok_or_else(|| invalid("not an object"))?;

    let heading = match obj.get("heading") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(invalid("heading must be a string")),
    };

    let paragraphs = match obj.get("paragraphs") {
        Some(Value::Array(items)) if !items.is_empty() => items.iter().map(text_of).collect(),
        _ => return Err(invalid("paragraphs must be a non-empty list")),
    };

    let images = match obj.get("images") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|i| ImageRef {
                asset_id: i.get("asset_id").map(text_of).unwrap_or_default(),
                caption: i.get("caption").map(text_of).unwrap_or_default(),
            })
            .collect(),
        Some(_) => return Err(invalid("images must be a list")),
    };

    Ok(Section {
        heading,
        paragraphs,
        images,
    })
}

/// Render a scalar as text: strings verbatim, null as empty, anything else as JSON.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Greedy span from the first `{` to the last `}` in `text`.
///
/// Models often wrap JSON in prose or code fences; this strips both.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].trim())
}
