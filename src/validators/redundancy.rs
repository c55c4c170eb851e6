use crate::services::parser::{FenceScanner, LineKind};
use regex::Regex;
use serde::Serialize;
use similar::TextDiff;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Sequence ratio at which two segments count as near duplicates.
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.9;
/// Lower bound of the "similar content" tier, which ends below
/// [`NEAR_DUPLICATE_THRESHOLD`].
pub const SIMILAR_THRESHOLD: f64 = 0.7;
const MIN_PARAGRAPH_WORDS: usize = 5;
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    pub section: String,
    pub segment_type: String,
    pub line_start: usize,
    pub line_end: usize,
    pub word_count: usize,
    pub preview: String,
    #[serde(skip)]
    pub normalized: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub first: Segment,
    pub second: Segment,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RedundancyReport {
    pub total_segments: usize,
    pub segments_by_type: BTreeMap<String, usize>,
    pub exact_duplicates: Vec<DuplicateMatch>,
    pub near_duplicates: Vec<DuplicateMatch>,
    pub similar_content: Vec<DuplicateMatch>,
}

impl RedundancyReport {
    pub fn print_summary(&self) {
        println!("\nRedundancy analysis:");
        println!("  Segments analysed: {}", self.total_segments);
        for (kind, count) in &self.segments_by_type {
            println!("    {}: {}", kind, count);
        }
        println!("  Exact duplicates: {}", self.exact_duplicates.len());
        println!("  Near duplicates: {}", self.near_duplicates.len());
        println!("  Similar content: {}", self.similar_content.len());
        for m in self
            .exact_duplicates
            .iter()
            .chain(&self.near_duplicates)
            .chain(&self.similar_content)
            .take(10)
        {
            println!(
                "    {:.0}% {} (line {}) ~ {} (line {}): {}",
                m.similarity * 100.0,
                m.first.section,
                m.first.line_start,
                m.second.section,
                m.second.line_start,
                m.first.preview
            );
        }
    }
}

/// Finds repeated paragraphs, lists, tables and code in one document.
pub struct RedundancyDetector {
    bold: Regex,
    italic: Regex,
    inline_code: Regex,
    link: Regex,
    line_comment: Regex,
    block_comment: Regex,
    numbered_item: Regex,
}

impl Default for RedundancyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RedundancyDetector {
    pub fn new() -> Self {
        Self {
            bold: Regex::new(r"\*\*(.*?)\*\*").unwrap(),
            italic: Regex::new(r"\*(.*?)\*").unwrap(),
            inline_code: Regex::new(r"`(.*?)`").unwrap(),
            link: Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap(),
            line_comment: Regex::new(r"//.*$").unwrap(),
            block_comment: Regex::new(r"/\*.*?\*/").unwrap(),
            numbered_item: Regex::new(r"^\d+\.").unwrap(),
        }
    }

    pub fn analyze(&self, content: &str) -> RedundancyReport {
        let segments = self.segments(content);
        info!("Analysing {} content segments for redundancy", segments.len());

        let mut report = RedundancyReport {
            total_segments: segments.len(),
            ..Default::default()
        };
        for segment in &segments {
            *report
                .segments_by_type
                .entry(segment.segment_type.clone())
                .or_default() += 1;
        }

        for i in 0..segments.len() {
            for j in i + 1..segments.len() {
                let (a, b) = (&segments[i], &segments[j]);
                if a.segment_type != b.segment_type {
                    continue;
                }
                if a.normalized == b.normalized {
                    report.exact_duplicates.push(DuplicateMatch {
                        first: a.clone(),
                        second: b.clone(),
                        similarity: 1.0,
                    });
                    continue;
                }
                let similarity = sequence_ratio(&a.normalized, &b.normalized);
                let tier = if similarity >= NEAR_DUPLICATE_THRESHOLD {
                    &mut report.near_duplicates
                } else if similarity >= SIMILAR_THRESHOLD {
                    &mut report.similar_content
                } else {
                    continue;
                };
                tier.push(DuplicateMatch {
                    first: a.clone(),
                    second: b.clone(),
                    similarity,
                });
            }
        }

        debug!(
            "{} exact, {} near duplicates, {} similar",
            report.exact_duplicates.len(),
            report.near_duplicates.len(),
            report.similar_content.len()
        );
        report
    }

    /// Splits `content` into comparable segments, tracking the enclosing
    /// header for each. Fenced code is located with [`FenceScanner`], so
    /// nothing inside a block is read as a header or paragraph.
    pub fn segments(&self, content: &str) -> Vec<Segment> {
        let lines: Vec<&str> = content.lines().collect();
        let mut scanner = FenceScanner::new();
        let kinds: Vec<LineKind> = lines.iter().map(|line| scanner.classify(line)).collect();

        let mut segments = Vec::new();
        let mut section = String::from("(preamble)");
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if let LineKind::FenceOpen(info) = &kinds[i] {
                i = self.take_code(&lines, &kinds, i, info, &section, &mut segments);
            } else if line.trim().is_empty() {
                i += 1;
            } else if line.starts_with('#') {
                section = line.trim_start_matches('#').trim().to_string();
                i += 1;
            } else if line.trim_start().starts_with('|') {
                i = self.take_table(&lines, i, &section, &mut segments);
            } else if self.is_list_item(line) {
                i = self.take_list(&lines, &kinds, i, &section, &mut segments);
            } else {
                i = self.take_paragraph(&lines, &kinds, i, &section, &mut segments);
            }
        }

        segments
    }

    fn is_list_item(&self, line: &str) -> bool {
        line.starts_with("- ")
            || line.starts_with("* ")
            || line.starts_with("+ ")
            || self.numbered_item.is_match(line)
    }

    fn take_code(
        &self,
        lines: &[&str],
        kinds: &[LineKind],
        start: usize,
        info: &str,
        section: &str,
        out: &mut Vec<Segment>,
    ) -> usize {
        // An unterminated block runs to the end of the document.
        let end = kinds[start + 1..]
            .iter()
            .position(|k| *k == LineKind::FenceClose)
            .map_or(lines.len(), |offset| start + 1 + offset);

        let body = lines[start + 1..end].join("\n");
        if !body.trim().is_empty() {
            let language = info.split_whitespace().next().unwrap_or("");
            let segment_type = if language.is_empty() {
                "code".to_string()
            } else {
                format!("code_{}", language)
            };
            let last = end.min(lines.len() - 1);
            out.push(self.segment(&body, self.normalize_code(&body), segment_type, section, start, last));
        }
        end + 1
    }

    fn take_table(&self, lines: &[&str], start: usize, section: &str, out: &mut Vec<Segment>) -> usize {
        let end = lines[start..]
            .iter()
            .position(|l| !l.trim_start().starts_with('|'))
            .map_or(lines.len(), |offset| start + offset);

        if end - start >= 2 {
            let body = lines[start..end].join("\n");
            out.push(self.segment(&body, normalize_table(&body), "table".to_string(), section, start, end - 1));
        }
        end
    }

    fn take_list(
        &self,
        lines: &[&str],
        kinds: &[LineKind],
        start: usize,
        section: &str,
        out: &mut Vec<Segment>,
    ) -> usize {
        let mut items = Vec::new();
        let mut i = start;
        let mut last = start;
        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() {
                i += 1;
                continue;
            }
            if kinds[i] != LineKind::Text {
                break;
            }
            if self.is_list_item(line) || line.starts_with("  ") {
                items.push(line);
                last = i;
                i += 1;
            } else {
                break;
            }
        }

        let body = items.join("\n");
        out.push(self.segment(&body, self.normalize_text(&body), "list".to_string(), section, start, last));
        last + 1
    }

    fn take_paragraph(
        &self,
        lines: &[&str],
        kinds: &[LineKind],
        start: usize,
        section: &str,
        out: &mut Vec<Segment>,
    ) -> usize {
        let mut end = start;
        while end < lines.len() {
            let line = lines[end];
            let stops = kinds[end] != LineKind::Text
                || line.trim().is_empty()
                || line.starts_with('#')
                || line.trim_start().starts_with('|')
                || self.is_list_item(line);
            if stops && end > start {
                break;
            }
            end += 1;
        }

        let body = lines[start..end].join("\n");
        if body.split_whitespace().count() >= MIN_PARAGRAPH_WORDS {
            out.push(self.segment(&body, self.normalize_text(&body), "paragraph".to_string(), section, start, end - 1));
        }
        end
    }

    fn segment(
        &self,
        body: &str,
        normalized: String,
        segment_type: String,
        section: &str,
        start: usize,
        end: usize,
    ) -> Segment {
        let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
        Segment {
            section: section.to_string(),
            segment_type,
            line_start: start + 1,
            line_end: end + 1,
            word_count: body.split_whitespace().count(),
            preview: flat.chars().take(PREVIEW_CHARS).collect(),
            normalized,
        }
    }

    /// Markup-free, lowercased text with collapsed whitespace.
    pub fn normalize_text(&self, content: &str) -> String {
        let text = self.bold.replace_all(content, "$1");
        let text = self.italic.replace_all(&text, "$1");
        let text = self.inline_code.replace_all(&text, "$1");
        let text = self.link.replace_all(&text, "$1");
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Code without comments or blank lines, whitespace collapsed per line.
    pub fn normalize_code(&self, content: &str) -> String {
        content
            .lines()
            .map(|line| {
                let line = self.line_comment.replace(line, "");
                let line = self.block_comment.replace_all(&line, "");
                line.split_whitespace().collect::<Vec<_>>().join(" ")
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Cell text only; alignment rows are dropped.
fn normalize_table(content: &str) -> String {
    content
        .lines()
        .filter_map(|line| {
            let cells: Vec<&str> = line.trim().trim_matches('|').split('|').map(str::trim).collect();
            let separator = cells
                .iter()
                .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':')));
            (!separator).then(|| cells.join("|"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Character-level match ratio, `2 * matches / (len(a) + len(b))`.
fn sequence_ratio(a: &str, b: &str) -> f64 {
    f64::from(TextDiff::from_chars(a, b).ratio())
}
