use axum::http::HeaderValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ShortenerError;

/// Longest client-supplied short code accepted by [`CreateLinkRequest`].
pub const MAX_CUSTOM_CODE_LEN: usize = 64;

/// A persisted short-code mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub short_code: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// A link that has not been persisted yet.
///
/// An empty `short_code` asks the link directory to generate one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub short_code: String,
    pub source_url: String,
}

impl NewLink {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            short_code: String::new(),
            source_url: source_url.into(),
        }
    }

    pub fn with_code(short_code: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            short_code: short_code.into(),
            source_url: source_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub source_url: String,
    #[serde(default)]
    pub short_url: Option<String>,
}

impl CreateLinkRequest {
    /// Validate the request body and turn it into a [`NewLink`]
    pub fn into_new_link(self) -> Result<NewLink, ShortenerError> {
        let source_url = self.source_url.trim();
        if source_url.is_empty() {
            return Err(ShortenerError::Validation(
                "source_url must not be empty".to_string(),
            ));
        }
        // Must be usable as a redirect Location header
        if HeaderValue::try_from(source_url).is_err() {
            return Err(ShortenerError::Validation(
                "source_url contains characters not allowed in a URL".to_string(),
            ));
        }

        let short_code = self.short_url.unwrap_or_default();
        if short_code.len() > MAX_CUSTOM_CODE_LEN {
            return Err(ShortenerError::Validation(format!(
                "short_url must be at most {MAX_CUSTOM_CODE_LEN} characters"
            )));
        }
        if !short_code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ShortenerError::Validation(
                "short_url may only contain letters, digits, '-' and '_'".to_string(),
            ));
        }

        Ok(NewLink {
            short_code,
            source_url: source_url.to_string(),
        })
    }
}

/// Wire representation of a [`Link`]
#[derive(Debug, Serialize, Deserialize)]
pub struct LinkBody {
    pub source_url: String,
    pub short_url: String,
    pub created_at: String,
}

impl From<&Link> for LinkBody {
    fn from(link: &Link) -> Self {
        Self {
            source_url: link.source_url.clone(),
            short_url: link.short_code.clone(),
            created_at: link.created_at.to_rfc3339(),
        }
    }
}
