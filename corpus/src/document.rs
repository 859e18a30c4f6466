//! Cleaned wiki pages, the input of the chunking step.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::error::{Result, StorageError};

/// A cleaned wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiPage {
    /// Page URL.
    pub url: String,

    /// Page title.
    pub title: String,

    /// Plain-text page content.
    pub content: String,
}

impl WikiPage {
    /// Create a new page.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Load pages from a JSON array of `{url, title, content}` objects.
pub async fn load_pages(path: impl AsRef<Path>) -> Result<Vec<WikiPage>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?;

    let pages: Vec<WikiPage> = serde_json::from_str(&content)?;
    info!("Loaded {} pages from {}", pages.len(), path.display());
    Ok(pages)
}
