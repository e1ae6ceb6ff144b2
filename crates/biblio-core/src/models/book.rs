use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// A catalog entry owned by the library server.
///
/// Copies held by the client are transient: they are fetched per view and
/// never merged or cached locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default = "default_available", deserialize_with = "null_as_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

// Optional fields may arrive as an explicit `null` as well as be omitted.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_available<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_else(default_available))
}

impl BookRecord {
    pub fn is_borrowed(&self) -> bool {
        !self.available
    }

    pub fn availability_display(&self) -> &'static str {
        if self.available {
            "available"
        } else {
            "borrowed"
        }
    }

    /// True if the record carries the same editable fields as `draft`.
    pub fn matches_draft(&self, draft: &BookDraft) -> bool {
        self.title == draft.title
            && self.author == draft.author
            && self.description == draft.description
    }
}

/// Editable book fields, sent as the body of create and update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct BookDraft {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
}

impl BookDraft {
    /// Build a draft from raw form input. Surrounding whitespace is dropped so
    /// blank fields fail validation.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into().trim().to_string(),
            author: author.into().trim().to_string(),
            description: description.into().trim().to_string(),
        }
    }

    /// Start an edit from an existing record.
    pub fn from_record(book: &BookRecord) -> Self {
        Self::new(&*book.title, &*book.author, &*book.description)
    }
}
