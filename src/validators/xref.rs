use super::finish;
use crate::manifest::BookManifest;
use crate::services::corpus::{resolve_relative, BookCorpus};
use crate::services::parser::{FenceScanner, LineKind};
use crate::types::ValidationResult;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use url::Url;

const TEST_NAME: &str = "Cross-Reference Validation";
const MIN_DENSITY: f64 = 0.1;
/// The table of contents links every chapter and is not a cross-reference.
const SUMMARY_FILE: &str = "SUMMARY.md";

/// A link that leaves its chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterLink {
    pub source_file: String,
    /// `None` for files outside any chapter directory.
    pub source_chapter: Option<String>,
    pub target_chapter: String,
}

/// Measures how chapters point at each other.
pub struct CrossReferenceValidator<'m> {
    manifest: &'m BookManifest,
    link_pattern: Regex,
}

impl<'m> CrossReferenceValidator<'m> {
    pub fn new(manifest: &'m BookManifest) -> Self {
        Self {
            manifest,
            link_pattern: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap(),
        }
    }

    fn chapter_of(&self, path: &str) -> Option<String> {
        let first = path.split('/').next()?;
        self.manifest
            .chapter_dirs()
            .into_iter()
            .find(|dir| *dir == first)
            .map(str::to_string)
    }

    /// Links that cross a chapter boundary, ignoring fenced code and
    /// `SUMMARY.md`.
    pub fn chapter_links(&self, corpus: &BookCorpus) -> Vec<ChapterLink> {
        let mut links = Vec::new();

        for (path, content) in self.content_files(corpus) {
            let source_chapter = self.chapter_of(path);
            let mut scanner = FenceScanner::new();
            let prose = content.lines().filter(|line| scanner.classify(line) == LineKind::Text);
            for captures in prose.flat_map(|line| self.link_pattern.captures_iter(line)) {
                let target = captures[2].split_whitespace().next().unwrap_or_default();
                if target.is_empty() || target.starts_with('#') || Url::parse(target).is_ok() {
                    continue;
                }
                let file_part = target.split('#').next().unwrap_or_default();
                let target_chapter = resolve_relative(path, file_part)
                    .and_then(|resolved| self.chapter_of(&resolved));

                if let Some(target_chapter) = target_chapter {
                    if source_chapter.as_deref() != Some(target_chapter.as_str()) {
                        links.push(ChapterLink {
                            source_file: path.clone(),
                            source_chapter: source_chapter.clone(),
                            target_chapter,
                        });
                    }
                }
            }
        }

        links
    }

    fn content_files<'c>(&self, corpus: &'c BookCorpus) -> impl Iterator<Item = (&'c String, &'c String)> {
        corpus.files.iter().filter(|(path, _)| path.as_str() != SUMMARY_FILE)
    }

    pub fn validate(&self, corpus: &BookCorpus) -> ValidationResult {
        info!("Validating cross-references between chapters");

        let links = self.chapter_links(corpus);
        let mut graph: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for link in &links {
            if let Some(source) = &link.source_chapter {
                graph
                    .entry(source.as_str())
                    .or_default()
                    .insert(link.target_chapter.as_str());
            }
        }

        let mut warnings = Vec::new();
        let mut missing_patterns = 0;
        for (source, expected_targets) in &self.manifest.expected_cross_refs {
            let actual = graph.get(source.as_str());
            for target in expected_targets {
                if !actual.is_some_and(|targets| targets.contains(target.as_str())) {
                    warnings.push(format!("Missing expected cross-reference: {} -> {}", source, target));
                    missing_patterns += 1;
                }
            }
        }

        let mut circular = BTreeSet::new();
        for (source, targets) in &graph {
            for target in targets {
                if source < target && graph.get(target).is_some_and(|back| back.contains(source)) {
                    circular.insert(format!("{} <-> {}", source, target));
                }
            }
        }
        debug!("Circular chapter references: {:?}", circular);

        let total_files = self.content_files(corpus).count();
        let density = links.len() as f64 / total_files.max(1) as f64;
        if density < MIN_DENSITY {
            warnings.push(format!("Low cross-reference density: {:.2} refs/file", density));
        }

        let details = format!(
            "Cross-references: {}, chapters with cross-refs: {}, missing expected patterns: {}, \
             circular references: {}, density: {:.2} refs/file",
            links.len(),
            graph.len(),
            missing_patterns,
            circular.len(),
            density
        );

        finish(TEST_NAME, details, Vec::new(), warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ChapterEntry;

    fn manifest() -> BookManifest {
        BookManifest {
            chapters: vec![
                ChapterEntry {
                    title: "One".to_string(),
                    dir: "one".to_string(),
                },
                ChapterEntry {
                    title: "Two".to_string(),
                    dir: "two".to_string(),
                },
            ],
            expected_cross_refs: BTreeMap::from([
                ("one".to_string(), vec!["two".to_string()]),
                ("two".to_string(), vec!["one".to_string()]),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn test_links_between_chapters() {
        let manifest = manifest();
        let corpus = BookCorpus::from_files([
            ("SUMMARY.md", "- [One](one/README.md)\n- [Two](two/README.md)\n"),
            ("one/README.md", "[local](./a.md) [other](../two/b.md#x) [web](https://x.dev)\n"),
            ("two/README.md", "[back](../one/README.md)\n"),
        ]);

        let validator = CrossReferenceValidator::new(&manifest);
        let links = validator.chapter_links(&corpus);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.source_file != "SUMMARY.md"));

        let result = validator.validate(&corpus);
        assert!(result.passed);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(result.details.contains("circular references: 1"));
    }

    #[test]
    fn test_fenced_links_and_summary_not_counted() {
        let manifest = manifest();
        let corpus = BookCorpus::from_files([
            ("SUMMARY.md", "- [One](one/README.md)\n- [Two](two/README.md)\n"),
            (
                "one/README.md",
                "# One\n\n```markdown\nSee [two](../two/README.md)\n```\n\n[real](../two/README.md)\n",
            ),
            ("two/README.md", "# Two\n"),
        ]);

        let validator = CrossReferenceValidator::new(&manifest);
        let links = validator.chapter_links(&corpus);
        assert_eq!(
            links,
            vec![ChapterLink {
                source_file: "one/README.md".to_string(),
                source_chapter: Some("one".to_string()),
                target_chapter: "two".to_string(),
            }]
        );

        // one link over two content files
        let result = validator.validate(&corpus);
        assert!(result.details.contains("Cross-references: 1,"));
        assert!(result.details.contains("density: 0.50 refs/file"));
    }

    #[test]
    fn test_missing_patterns_and_low_density() {
        let manifest = manifest();
        let corpus = BookCorpus::from_files([
            ("one/README.md", "# One\n"),
            ("two/README.md", "# Two\n"),
        ]);

        let result = CrossReferenceValidator::new(&manifest).validate(&corpus);
        assert!(result.passed);
        assert_eq!(
            result.warnings,
            vec![
                "Missing expected cross-reference: one -> two",
                "Missing expected cross-reference: two -> one",
                "Low cross-reference density: 0.00 refs/file",
            ]
        );
    }
}
