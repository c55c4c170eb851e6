use super::finish;
use crate::services::anchor::slugify;
use crate::services::corpus::{resolve_relative, BookCorpus};
use crate::services::parser::{FenceScanner, LineKind, MarkdownParser};
use crate::types::{LinkInfo, ValidationResult};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use url::Url;

const TEST_NAME: &str = "Link Integrity";

/// Files mdBook reaches without an explicit link.
const ENTRY_FILES: [&str; 2] = ["SUMMARY.md", "introduction.md"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileLinkStats {
    pub link_count: usize,
    pub header_count: usize,
    pub broken_link_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    pub total_files: usize,
    pub total_links: usize,
    pub external_links: usize,
    pub broken_links: Vec<LinkInfo>,
    pub orphaned_files: Vec<String>,
    pub success_rate: f64,
    pub file_statistics: BTreeMap<String, FileLinkStats>,
}

impl LinkReport {
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("LINK VALIDATION SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Total files scanned: {}", self.total_files);
        println!("Total links found: {}", self.total_links);
        println!("External links skipped: {}", self.external_links);
        println!("Broken links: {}", self.broken_links.len());
        println!("Success rate: {:.1}%", self.success_rate);

        if !self.broken_links.is_empty() {
            println!("\nBROKEN LINKS:");
            for link in self.broken_links.iter().take(10) {
                println!("  {}:{}", link.source_file, link.line_number);
                println!("    [{}]({})", link.link_text, link.raw_target());
                println!("    Error: {}", link.error_message);
            }
            if self.broken_links.len() > 10 {
                println!("  ... and {} more", self.broken_links.len() - 10);
            }
        }
        println!("{}", "=".repeat(60));
    }
}

pub struct LinkValidator {
    link_pattern: Regex,
    parser: MarkdownParser,
}

impl Default for LinkValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkValidator {
    pub fn new() -> Self {
        Self {
            link_pattern: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap(),
            parser: MarkdownParser::with_max_level(6),
        }
    }

    /// Anchors a file exposes: explicit `{#id}` markers, otherwise the
    /// slug of the header text.
    pub fn header_anchors(&self, content: &str) -> BTreeSet<String> {
        let lines: Vec<&str> = content.lines().collect();
        self.parser
            .scan_headers(&lines)
            .into_iter()
            .map(|token| {
                token
                    .explicit_anchor
                    .unwrap_or_else(|| slugify(&token.title))
            })
            .collect()
    }

    /// Internal links of one file, outside code fences. The second value
    /// counts skipped external links.
    pub fn extract_links(&self, content: &str, source_file: &str) -> (Vec<LinkInfo>, usize) {
        let mut scanner = FenceScanner::new();
        let mut links = Vec::new();
        let mut external = 0;

        for (idx, line) in content.lines().enumerate() {
            if scanner.classify(line) != LineKind::Text {
                continue;
            }
            for captures in self.link_pattern.captures_iter(line) {
                // Drop an optional link title: [text](path "title")
                let target = captures[2].split_whitespace().next().unwrap_or_default();
                if target.is_empty() {
                    continue;
                }
                if Url::parse(target).is_ok() {
                    external += 1;
                    continue;
                }

                let (path, anchor) = match target.split_once('#') {
                    Some((path, anchor)) => (path, (!anchor.is_empty()).then(|| anchor.to_string())),
                    None => (target, None),
                };
                links.push(LinkInfo {
                    source_file: source_file.to_string(),
                    line_number: idx + 1,
                    link_text: captures[1].to_string(),
                    link_target: path.to_string(),
                    anchor,
                    is_valid: true,
                    error_message: String::new(),
                });
            }
        }

        (links, external)
    }

    /// Checks every internal link in the corpus.
    pub fn check(&self, corpus: &BookCorpus) -> LinkReport {
        info!("Validating links across {} files", corpus.files.len());

        let headers: BTreeMap<&str, BTreeSet<String>> = corpus
            .files
            .iter()
            .map(|(path, content)| (path.as_str(), self.header_anchors(content)))
            .collect();

        let mut report = LinkReport {
            total_files: corpus.files.len(),
            ..Default::default()
        };
        let mut linked_files = BTreeSet::new();

        for (path, content) in &corpus.files {
            let (mut links, external) = self.extract_links(content, path);
            report.external_links += external;

            for link in &mut links {
                if let Some(target) = self.check_link(link, corpus, &headers) {
                    linked_files.insert(target);
                }
            }

            let broken: Vec<LinkInfo> = links.iter().filter(|l| !l.is_valid).cloned().collect();
            report.file_statistics.insert(
                path.clone(),
                FileLinkStats {
                    link_count: links.len(),
                    header_count: headers.get(path.as_str()).map_or(0, |h| h.len()),
                    broken_link_count: broken.len(),
                },
            );
            report.total_links += links.len();
            report.broken_links.extend(broken);
        }

        report.orphaned_files = corpus
            .files
            .keys()
            .filter(|path| !ENTRY_FILES.contains(&path.as_str()) && !linked_files.contains(*path))
            .cloned()
            .collect();

        report.success_rate = if report.total_links == 0 {
            100.0
        } else {
            (report.total_links - report.broken_links.len()) as f64 / report.total_links as f64 * 100.0
        };

        debug!(
            "{} links, {} broken, {} orphaned files",
            report.total_links,
            report.broken_links.len(),
            report.orphaned_files.len()
        );
        report
    }

    /// Marks `link` broken when it does not resolve. Returns the resolved
    /// target file for path links.
    fn check_link(
        &self,
        link: &mut LinkInfo,
        corpus: &BookCorpus,
        headers: &BTreeMap<&str, BTreeSet<String>>,
    ) -> Option<String> {
        if link.link_target.is_empty() {
            if let Some(anchor) = &link.anchor {
                let known = headers
                    .get(link.source_file.as_str())
                    .is_some_and(|h| h.contains(anchor));
                if !known {
                    link.is_valid = false;
                    link.error_message = format!("Anchor #{} not found in current file", anchor);
                }
            }
            return None;
        }

        let target = match resolve_relative(&link.source_file, &link.link_target) {
            Some(target) => target,
            None => {
                link.is_valid = false;
                link.error_message = format!("Target {} escapes the book root", link.link_target);
                return None;
            }
        };

        if !corpus.exists(&target) {
            link.is_valid = false;
            link.error_message = format!("Target file {} not found", target);
            return None;
        }

        if let (Some(anchor), Some(target_headers)) = (&link.anchor, headers.get(target.as_str())) {
            if !target_headers.contains(anchor) {
                link.is_valid = false;
                link.error_message = format!("Anchor #{} not found in {}", anchor, target);
            }
        }

        Some(target)
    }

    pub fn validate(&self, corpus: &BookCorpus) -> ValidationResult {
        let report = self.check(corpus);

        let errors = report
            .broken_links
            .iter()
            .map(|link| {
                format!(
                    "Broken link in {}:{}: [{}]({}) - {}",
                    link.source_file,
                    link.line_number,
                    link.link_text,
                    link.raw_target(),
                    link.error_message
                )
            })
            .collect();
        let warnings = report
            .orphaned_files
            .iter()
            .map(|file| format!("Potentially orphaned file: {}", file))
            .collect();

        let details = format!(
            "Files: {}, internal links: {}, broken: {}, orphaned files: {}, success rate: {:.1}%",
            report.total_files,
            report.total_links,
            report.broken_links.len(),
            report.orphaned_files.len(),
            report.success_rate
        );

        finish(TEST_NAME, details, errors, warnings)
    }
}
