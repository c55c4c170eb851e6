//! # mdBook Splitter Library
//!
//! Splits one large markdown tutorial into an mdBook source tree: a
//! directory per chapter with an overview page, one file per subsection,
//! `SUMMARY.md` and `introduction.md`. Anchor-only cross-references are
//! rewritten into relative file links, and a set of read-only validators
//! checks the emitted tree.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mdbook_splitter::{BookManifest, ContentFetcher, DocumentSplitter, MarkdownParser, SplitConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (content, metadata) = ContentFetcher::fetch_content("tutorial.md").await?;
//!     let document = MarkdownParser::new().parse_document(&content, metadata);
//!
//!     let manifest = BookManifest::default();
//!     let config = SplitConfig {
//!         output_dir: PathBuf::from("./src"),
//!         write_summary: true,
//!         write_introduction: true,
//!         rewrite_cross_refs: true,
//!     };
//!
//!     let result = DocumentSplitter::new(&manifest)
//!         .split_document(&document, &config)
//!         .await?;
//!
//!     println!("Created {} files", result.output_files.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod manifest;
pub mod services;
pub mod types;
pub mod validators;

// Re-export main types and services for easier usage
pub use error::{BookSplitterError, Result};
pub use manifest::{BookManifest, CompileSettings};
pub use services::{BookCorpus, ContentFetcher, CrossReferenceRewriter, DocumentSplitter, MarkdownParser};
pub use types::{
    DocumentMetadata, ParsedDocument, Section, SourceType, SplitConfig, SplitResult, ValidationResult,
    ValidationSummary,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ChapterEntry, SubsectionEntry};
    use crate::validators::{ContentPreservationValidator, LinkValidator};
    use std::collections::{BTreeMap, BTreeSet};

    const TUTORIAL: &str = r#"# Title

Opening words for the whole tutorial.

## 1. Chapter One

This chapter walks through the first topic in a reasonable amount of detail.

### 1.1 Sub

Sub content, see [the same section](#11-sub).

```rust
fn main() {
    println!("hi");
}
```

#### Deeper Point

More text.
"#;

    fn metadata() -> DocumentMetadata {
        DocumentMetadata {
            filename: "tutorial.md".to_string(),
            source_type: SourceType::LocalFile,
            created_at: chrono::Utc::now().to_rfc3339(),
            total_lines: TUTORIAL.lines().count(),
            header_count: 0,
        }
    }

    fn manifest() -> BookManifest {
        BookManifest {
            chapters: vec![ChapterEntry {
                title: "1. Chapter One".to_string(),
                dir: "chapter-one".to_string(),
            }],
            subsections: vec![SubsectionEntry {
                title: "1.1 Sub".to_string(),
                file: "sub.md".to_string(),
            }],
            anchors: BTreeMap::new(),
            ..Default::default()
        }
    }

    fn titles(content: &str) -> BTreeSet<String> {
        MarkdownParser::with_max_level(6)
            .flat_sections(content)
            .into_iter()
            .map(|(title, _)| title)
            .collect()
    }

    #[tokio::test]
    async fn test_basic_workflow() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = manifest();
        let document = MarkdownParser::new().parse_document(TUTORIAL, metadata());

        assert_eq!(document.sections.len(), 1);
        assert_eq!(document.metadata.header_count, 4);

        let config = SplitConfig {
            output_dir: temp.path().to_path_buf(),
            write_summary: true,
            write_introduction: true,
            rewrite_cross_refs: true,
        };
        let result = DocumentSplitter::new(&manifest)
            .split_document(&document, &config)
            .await
            .unwrap();

        assert_eq!(result.chapters.len(), 1);
        assert_eq!(result.chapters[0].subsections.len(), 1);

        let overview = std::fs::read_to_string(temp.path().join("chapter-one/README.md")).unwrap();
        assert!(overview.contains("[1.1 Sub](./sub.md)"));

        let sub = std::fs::read_to_string(temp.path().join("chapter-one/sub.md")).unwrap();
        assert!(sub.starts_with("# 1.1 Sub\n"));
        assert!(sub.contains("[the same section](../chapter-one/sub.md)"));

        // Every emitted file re-parses to the original title set.
        let corpus = BookCorpus::load(temp.path()).await.unwrap();
        let emitted: BTreeSet<String> = corpus
            .files
            .iter()
            .filter(|(path, _)| path.as_str() != "SUMMARY.md")
            .flat_map(|(_, content)| titles(content))
            .collect();
        assert_eq!(emitted, titles(TUTORIAL));

        let links = LinkValidator::new().validate(&corpus);
        assert!(links.passed, "{:?}", links.errors);
        assert!(links.warnings.is_empty(), "{:?}", links.warnings);

        let content = ContentPreservationValidator::new(&manifest).validate(TUTORIAL, &corpus);
        assert!(content.passed, "{:?}", content.errors);
    }

    #[test]
    fn test_summary_from_results() {
        let ok = ValidationResult {
            test_name: "a".to_string(),
            passed: true,
            details: String::new(),
            errors: Vec::new(),
            warnings: vec!["w".to_string()],
        };
        let bad = ValidationResult {
            test_name: "b".to_string(),
            passed: false,
            details: String::new(),
            errors: vec!["e1".to_string(), "e2".to_string()],
            warnings: Vec::new(),
        };

        let summary = ValidationSummary::from_results(vec![ok, bad]);
        assert_eq!(summary.total_tests, 2);
        assert_eq!(summary.passed_tests, 1);
        assert_eq!(summary.errors_count, 2);
        assert_eq!(summary.warnings_count, 1);
        assert!(!summary.overall_success);
    }
}
