use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const ID_LEN: usize = 10;
const MAX_ID_LEN: usize = 64;

// ______________________________________ Snippet Id ______________________________________
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnippetId(String);

impl SnippetId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Accepts client supplied ids. Only the generator's alphabet is allowed,
    /// which keeps an id from addressing anything outside its collection.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if raw.is_empty() {
            return Err(ApiError::bad_request("Missing snippet ID"));
        }
        if raw.len() > MAX_ID_LEN || !raw.bytes().all(|b| ID_ALPHABET.contains(&b)) {
            return Err(ApiError::bad_request("Invalid snippet ID"));
        }
        Ok(Self(raw.to_string()))
    }
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ______________________________________ Snippet ______________________________________
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: SnippetId,
    pub title: String,
    pub language: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Keys written by other clients, carried through updates untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Snippet {
    pub fn new(id: SnippetId, title: String, language: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            language,
            description,
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }
    }

    /// Applies a partial update. Empty title/language are ignored, a present
    /// description always wins. `updated_at` is refreshed unconditionally.
    pub fn apply(&mut self, changes: &UpdateSnippetRequest) {
        if let Some(title) = non_empty(&changes.title) {
            self.title = title.to_string();
        }
        if let Some(language) = non_empty(&changes.language) {
            self.language = language.to_string();
        }
        if let Some(description) = &changes.description {
            self.description = description.clone();
        }
        self.updated_at = Utc::now().max(self.created_at);
    }
}

// ______________________________________ Requests ______________________________________
#[derive(Debug, Default, Deserialize)]
pub struct CreateSnippetRequest {
    pub title: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
}

/// Fields of a create request that passed validation.
#[derive(Debug)]
pub struct NewSnippet {
    pub title: String,
    pub language: String,
    pub description: String,
    pub code: String,
}

impl CreateSnippetRequest {
    pub fn validate(self) -> Result<NewSnippet, ApiError> {
        let missing: Vec<&str> = [
            ("title", &self.title),
            ("language", &self.language),
            ("code", &self.code),
        ]
        .into_iter()
        .filter(|(_, value)| non_empty(value).is_none())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ApiError::bad_request(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(NewSnippet {
            title: self.title.unwrap_or_default(),
            language: self.language.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            code: self.code.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSnippetRequest {
    pub title: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
}

impl UpdateSnippetRequest {
    pub fn code(&self) -> Option<&str> {
        non_empty(&self.code)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
