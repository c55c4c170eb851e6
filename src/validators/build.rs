use super::finish;
use crate::error::Result;
use crate::services::toolchain::{ExternalTool, Requirement};
use crate::types::ValidationResult;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const TEST_NAME: &str = "mdBook Build";
const BUILD_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs `mdbook build` into a scratch directory and checks the output.
pub struct BookBuildValidator {
    mdbook: ExternalTool,
    timeout: Duration,
}

impl Default for BookBuildValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl BookBuildValidator {
    pub fn new() -> Self {
        Self {
            mdbook: ExternalTool::new("mdbook"),
            timeout: BUILD_TIMEOUT,
        }
    }

    pub fn with_tool(mdbook: ExternalTool, timeout: Duration) -> Self {
        Self { mdbook, timeout }
    }

    /// `book_dir` is the directory holding `book.toml`. With a soft
    /// requirement a missing mdbook yields a passing, skipped result.
    pub async fn validate(&self, book_dir: &Path, requirement: Requirement) -> Result<ValidationResult> {
        if self.mdbook.ensure(requirement).await?.is_none() {
            return Ok(finish(
                TEST_NAME,
                "Skipped: mdbook not available".to_string(),
                Vec::new(),
                vec![format!("{} not found; book build not checked", self.mdbook.name())],
            ));
        }

        info!("Building book in {}", book_dir.display());
        let dest = tempfile::tempdir()?;
        let book = book_dir.to_string_lossy().into_owned();
        let dest_arg = dest.path().to_string_lossy().into_owned();
        let run = self
            .mdbook
            .run(
                &["build", book.as_str(), "--dest-dir", dest_arg.as_str()],
                None,
                self.timeout,
            )
            .await?;

        let mut errors = Vec::new();
        if run.timed_out {
            errors.push(format!("mdbook build timed out after {}s", self.timeout.as_secs()));
        } else if !run.success {
            let reason = run
                .stderr
                .lines()
                .find(|l| l.contains("ERROR") || l.contains("error"))
                .unwrap_or("non-zero exit status");
            errors.push(format!("mdbook build failed: {}", reason.trim()));
        } else {
            errors.extend(missing_outputs(dest.path()));
        }

        let details = if errors.is_empty() {
            format!("Book in {} builds cleanly", book_dir.display())
        } else {
            format!("Book in {} failed to build", book_dir.display())
        };
        Ok(finish(TEST_NAME, details, errors, Vec::new()))
    }
}

/// Key files a successful build must produce.
pub fn missing_outputs(dest: &Path) -> Vec<String> {
    let mut missing = Vec::new();
    if !dest.join("index.html").is_file() {
        missing.push("Build output lacks index.html".to_string());
    }

    // Newer mdbook releases add a content hash to the search index name.
    let has_search_index = std::fs::read_dir(dest)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.starts_with("searchindex") && name.ends_with(".js")
            })
        })
        .unwrap_or(false);
    if !has_search_index {
        missing.push("Build output lacks searchindex.js".to_string());
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookSplitterError;

    const MISSING: &str = "mdbook-splitter-no-such-mdbook";

    #[tokio::test]
    async fn test_soft_missing_mdbook_skips() {
        let dir = tempfile::tempdir().unwrap();
        let validator = BookBuildValidator::with_tool(ExternalTool::new(MISSING), BUILD_TIMEOUT);
        let result = validator.validate(dir.path(), Requirement::Soft).await.unwrap();
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_hard_missing_mdbook_errors() {
        let dir = tempfile::tempdir().unwrap();
        let validator = BookBuildValidator::with_tool(ExternalTool::new(MISSING), BUILD_TIMEOUT);
        let result = validator.validate(dir.path(), Requirement::Hard).await;
        assert!(matches!(result, Err(BookSplitterError::ToolMissing { .. })));
    }

    #[test]
    fn test_missing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(missing_outputs(dir.path()).len(), 2);

        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("searchindex-1a2b.js"), "").unwrap();
        assert!(missing_outputs(dir.path()).is_empty());
    }
}
