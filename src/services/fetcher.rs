use crate::error::{BookSplitterError, Result};
use crate::types::{DocumentMetadata, SourceType};
use std::path::Path;
use tokio::fs;
use tracing::info;
use url::Url;

/// Loads the source document from a local path or an http(s) URL.
pub struct ContentFetcher;

impl ContentFetcher {
    pub async fn fetch_content(source: &str) -> Result<(String, DocumentMetadata)> {
        if Self::is_url(source) {
            Self::fetch_from_url(source).await
        } else {
            Self::fetch_from_file(source).await
        }
    }

    async fn fetch_from_url(url: &str) -> Result<(String, DocumentMetadata)> {
        info!("Fetching content from URL: {}", url);

        let parsed_url = Url::parse(url)?;
        let client = reqwest::Client::new();
        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(BookSplitterError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        let content = response.text().await?;
        let metadata = Self::metadata_for(
            Self::extract_filename_from_url(&parsed_url),
            SourceType::Url,
            &content,
        );

        Ok((content, metadata))
    }

    async fn fetch_from_file(file_path: &str) -> Result<(String, DocumentMetadata)> {
        info!("Reading file: {}", file_path);

        let path = Path::new(file_path);
        if !path.is_file() {
            return Err(BookSplitterError::FileNotFound {
                path: file_path.to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let metadata = Self::metadata_for(filename, SourceType::LocalFile, &content);
        Ok((content, metadata))
    }

    fn metadata_for(filename: String, source_type: SourceType, content: &str) -> DocumentMetadata {
        DocumentMetadata {
            filename,
            source_type,
            created_at: chrono::Utc::now().to_rfc3339(),
            total_lines: content.lines().count(),
            header_count: 0, // filled in by the parser
        }
    }

    pub fn is_url(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }

    fn extract_filename_from_url(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.last())
            .and_then(|name| if name.is_empty() { None } else { Some(name) })
            .unwrap_or("downloaded.md")
            .to_string()
    }

    /// Checks a source without reading it: URLs must parse, files must exist.
    pub fn validate_source(source: &str) -> Result<()> {
        if Self::is_url(source) {
            Url::parse(source)?;
            Ok(())
        } else if Path::new(source).is_file() {
            Ok(())
        } else {
            Err(BookSplitterError::FileNotFound {
                path: source.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let result = ContentFetcher::fetch_content("/definitely/not/here.md").await;
        assert!(matches!(result, Err(BookSplitterError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutorial.md");
        std::fs::write(&path, "# Title\n\ntext\n").unwrap();

        let (content, metadata) = ContentFetcher::fetch_content(path.to_str().unwrap())
            .await
            .unwrap();
        assert!(content.starts_with("# Title"));
        assert_eq!(metadata.filename, "tutorial.md");
        assert_eq!(metadata.total_lines, 3);
    }

    #[test]
    fn test_validate_source() {
        assert!(ContentFetcher::validate_source("https://example.com/book.md").is_ok());
        assert!(ContentFetcher::validate_source("missing.md").is_err());
    }
}
