use super::finish;
use crate::manifest::BookManifest;
use crate::services::corpus::BookCorpus;
use crate::services::parser::MarkdownParser;
use crate::types::ValidationResult;
use std::collections::BTreeSet;
use tracing::{debug, info};

const TEST_NAME: &str = "Content Preservation";
const FINGERPRINT_CHARS: usize = 200;
const MIN_CODE_RATIO: f64 = 0.95;

/// Checks that the split tree still carries what the source document had.
pub struct ContentPreservationValidator<'m> {
    manifest: &'m BookManifest,
    parser: MarkdownParser,
}

impl<'m> ContentPreservationValidator<'m> {
    pub fn new(manifest: &'m BookManifest) -> Self {
        Self {
            manifest,
            parser: MarkdownParser::with_max_level(6),
        }
    }

    pub fn validate(&self, original: &str, corpus: &BookCorpus) -> ValidationResult {
        info!("Validating content preservation");

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let original_sections = self.parser.flat_sections(original);
        let mut emitted_titles = BTreeSet::new();
        let mut emitted_text = Vec::with_capacity(corpus.files.len());
        for content in corpus.files.values() {
            for (title, _) in self.parser.flat_sections(content) {
                emitted_titles.insert(title);
            }
            emitted_text.push(normalize(content));
        }

        let mut missing = Vec::new();
        for (title, body) in &original_sections {
            if emitted_titles.contains(title) {
                continue;
            }
            let print = fingerprint(body);
            if !print.is_empty() && emitted_text.iter().any(|text| text.contains(&print)) {
                debug!("Section '{}' found by content fingerprint", title);
                continue;
            }
            missing.push(title.clone());
        }
        for title in &missing {
            errors.push(format!("Missing section: {}", title));
        }

        let original_blocks = self.parser.code_blocks(original, "original").len();
        let emitted_blocks: usize = corpus
            .files
            .iter()
            .map(|(path, content)| self.parser.code_blocks(content, path).len())
            .sum();
        let ratio = emitted_blocks as f64 / original_blocks.max(1) as f64;
        if original_blocks > 0 && ratio < MIN_CODE_RATIO {
            errors.push(format!(
                "Code blocks lost: original {}, emitted {} ({:.1}%)",
                original_blocks,
                emitted_blocks,
                ratio * 100.0
            ));
        }

        let original_lower = original.to_lowercase();
        let emitted_lower = corpus.combined().to_lowercase();
        let mut missing_concepts = 0;
        for concept in &self.manifest.concepts {
            let needle = concept.to_lowercase();
            if original_lower.contains(&needle) && !emitted_lower.contains(&needle) {
                warnings.push(format!("Concept may be missing: {}", concept));
                missing_concepts += 1;
            }
        }

        let details = format!(
            "Sections: {} original, {} missing. Code blocks: {} original, {} emitted. \
             Concepts checked: {}, possibly missing: {}",
            original_sections.len(),
            missing.len(),
            original_blocks,
            emitted_blocks,
            self.manifest.concepts.len(),
            missing_concepts
        );

        finish(TEST_NAME, details, errors, warnings)
    }
}

/// Lowercased text with whitespace runs collapsed to single spaces.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn fingerprint(body: &str) -> String {
    let head: String = body.chars().take(FINGERPRINT_CHARS).collect();
    normalize(&head)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "# Title\n\n## 1. Chapter One\n\nChapter text.\n\n### 1.1 Sub\n\nSub text here.\n\n```rust\nfn a() {}\n```\n";

    fn manifest_with_concepts(concepts: &[&str]) -> BookManifest {
        BookManifest {
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_everything_present_passes() {
        let manifest = manifest_with_concepts(&["chapter text"]);
        let corpus = BookCorpus::from_files([
            ("introduction.md", "# Title\n"),
            ("chapter/README.md", "# 1. Chapter One\n\nChapter text.\n"),
            ("chapter/sub.md", "# 1.1 Sub\n\nSub text here.\n\n```rust\nfn a() {}\n```\n"),
        ]);

        let result = ContentPreservationValidator::new(&manifest).validate(ORIGINAL, &corpus);
        assert!(result.passed, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_renamed_section_found_by_fingerprint() {
        let manifest = manifest_with_concepts(&[]);
        let corpus = BookCorpus::from_files([
            ("a.md", "# Title\n\n# Chapter\n\nChapter   TEXT.\n"),
            ("b.md", "# 1.1 Sub\n\nSub text here.\n\n```rust\nfn a() {}\n```\n"),
        ]);

        let result = ContentPreservationValidator::new(&manifest).validate(ORIGINAL, &corpus);
        assert!(result.passed, "{:?}", result.errors);
    }

    #[test]
    fn test_missing_section_and_code_loss() {
        let manifest = manifest_with_concepts(&["sub text"]);
        let corpus = BookCorpus::from_files([("a.md", "# Title\n\n# 1. Chapter One\n\nChapter text.\n")]);

        let result = ContentPreservationValidator::new(&manifest).validate(ORIGINAL, &corpus);
        assert!(!result.passed);
        assert!(result.errors.iter().any(|e| e == "Missing section: 1.1 Sub"));
        assert!(result.errors.iter().any(|e| e.starts_with("Code blocks lost")));
        assert_eq!(result.warnings, vec!["Concept may be missing: sub text"]);
    }
}
