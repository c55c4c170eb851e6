use crate::services::anchor::slugify;
use crate::types::{CodeBlock, DocumentMetadata, HeaderToken, ParsedDocument, Section};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Deepest header level that takes part in the section tree.
pub const STRUCTURAL_MAX_LEVEL: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Outside,
    Inside { marker: char, width: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// An opening fence with its info string.
    FenceOpen(String),
    FenceClose,
    Code,
    Text,
}

/// Two-state scanner for fenced code blocks.
///
/// A fence only opens on a line whose first non-blank characters are three
/// or more backticks or tildes. It only closes on a line holding nothing but
/// the same marker, at least as wide as the opener. Backticks appearing
/// later in a line never change the state.
#[derive(Debug, Clone)]
pub struct FenceScanner {
    state: FenceState,
}

impl Default for FenceScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceScanner {
    pub fn new() -> Self {
        Self {
            state: FenceState::Outside,
        }
    }

    pub fn classify(&mut self, line: &str) -> LineKind {
        let trimmed = line.trim();
        match self.state {
            FenceState::Outside => {
                let marker = match trimmed.chars().next() {
                    Some(c @ ('`' | '~')) => c,
                    _ => return LineKind::Text,
                };
                let width = trimmed.chars().take_while(|&c| c == marker).count();
                if width < 3 {
                    return LineKind::Text;
                }
                let info = trimmed[width * marker.len_utf8()..].trim();
                if marker == '`' && info.contains('`') {
                    // Inline code such as ```` ```x``` ````, not a fence.
                    return LineKind::Text;
                }
                self.state = FenceState::Inside { marker, width };
                LineKind::FenceOpen(info.to_string())
            }
            FenceState::Inside { marker, width } => {
                let closes = !trimmed.is_empty()
                    && trimmed.chars().all(|c| c == marker)
                    && trimmed.chars().count() >= width;
                if closes {
                    self.state = FenceState::Outside;
                    LineKind::FenceClose
                } else {
                    LineKind::Code
                }
            }
        }
    }
}

pub struct MarkdownParser {
    header_pattern: Regex,
    cross_ref_pattern: Regex,
    max_level: u8,
}

impl MarkdownParser {
    /// Parser for the section tree: `#` through `####`.
    pub fn new() -> Self {
        Self::with_max_level(STRUCTURAL_MAX_LEVEL)
    }

    /// Parser recognising headers up to `max_level` hashes (capped at 6).
    pub fn with_max_level(max_level: u8) -> Self {
        Self {
            header_pattern: Regex::new(r"^(#+)[ \t]+(.*)$").unwrap(),
            cross_ref_pattern: Regex::new(r"\[([^\]]+)\]\(#([^)]+)\)").unwrap(),
            max_level: max_level.clamp(1, 6),
        }
    }

    pub fn parse_document(&self, content: &str, mut metadata: DocumentMetadata) -> ParsedDocument {
        info!("Parsing markdown document: {}", metadata.filename);

        let lines: Vec<&str> = content.lines().collect();
        let tokens = self.scan_headers(&lines);
        let sections = build_section_tree(&tokens, &lines);

        metadata.total_lines = lines.len();
        metadata.header_count = tokens.len();

        debug!(
            "Found {} headers, {} top-level sections",
            tokens.len(),
            sections.len()
        );

        ParsedDocument {
            source: metadata.filename.clone(),
            sections,
            metadata,
        }
    }

    /// Header tokens in document order, skipping anything inside a fence.
    pub fn scan_headers(&self, lines: &[&str]) -> Vec<HeaderToken> {
        let mut scanner = FenceScanner::new();
        let mut tokens = Vec::new();

        for (line_idx, line) in lines.iter().enumerate() {
            if scanner.classify(line) != LineKind::Text {
                continue;
            }
            if let Some((level, title, explicit_anchor)) = self.parse_header_line(line) {
                tokens.push(HeaderToken {
                    line: line_idx,
                    level,
                    title,
                    explicit_anchor,
                });
            }
        }

        tokens
    }

    fn parse_header_line(&self, line: &str) -> Option<(u8, String, Option<String>)> {
        let captures = self.header_pattern.captures(line)?;
        let hashes = captures.get(1)?.as_str().len();
        if hashes > self.max_level as usize {
            return None;
        }

        let title_part = captures.get(2)?.as_str().trim();
        let (title, anchor) = match title_part.find("{#") {
            Some(open) => match title_part[open + 2..].find('}') {
                Some(close) => {
                    let id = title_part[open + 2..open + 2 + close].trim();
                    let title = title_part[..open].trim().to_string();
                    (title, (!id.is_empty()).then(|| id.to_string()))
                }
                None => {
                    debug!("Unterminated anchor marker in header: {}", line);
                    (title_part.to_string(), None)
                }
            },
            None => (title_part.to_string(), None),
        };

        Some((hashes as u8, title, anchor))
    }

    /// Every fenced block with its language tag and 1-based opening line.
    pub fn code_blocks(&self, content: &str, file: &str) -> Vec<CodeBlock> {
        let mut scanner = FenceScanner::new();
        let mut blocks = Vec::new();
        let mut current: Option<(String, usize, Vec<&str>)> = None;

        for (idx, line) in content.lines().enumerate() {
            match scanner.classify(line) {
                LineKind::FenceOpen(info) => {
                    let language: String = info
                        .chars()
                        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                        .collect();
                    current = Some((language, idx + 1, Vec::new()));
                }
                LineKind::Code => {
                    if let Some((_, _, body)) = current.as_mut() {
                        body.push(line);
                    }
                }
                LineKind::FenceClose => {
                    if let Some((language, line, body)) = current.take() {
                        blocks.push(CodeBlock {
                            file: file.to_string(),
                            language,
                            code: body.join("\n"),
                            line,
                        });
                    }
                }
                LineKind::Text => {}
            }
        }

        blocks
    }

    /// Flat (title, text up to the next header of any level) pairs.
    pub fn flat_sections(&self, content: &str) -> Vec<(String, String)> {
        let lines: Vec<&str> = content.lines().collect();
        let tokens = self.scan_headers(&lines);

        tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let end = tokens.get(i + 1).map(|t| t.line).unwrap_or(lines.len());
                (token.title.clone(), join_trimmed(&lines[token.line + 1..end]))
            })
            .collect()
    }

    /// Anchor-only cross references `[text](#anchor)` as (text, anchor).
    pub fn cross_references(&self, content: &str) -> Vec<(String, String)> {
        self.cross_ref_pattern
            .captures_iter(content)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect()
    }

    pub fn get_structure_stats(
        &self,
        document: &ParsedDocument,
        content: &str,
    ) -> BTreeMap<String, serde_json::Value> {
        let mut stats = BTreeMap::new();
        let sections = document.all_sections();

        stats.insert("total_lines".to_string(), document.metadata.total_lines.into());
        stats.insert("total_sections".to_string(), sections.len().into());
        let main_sections = sections.iter().filter(|s| s.level <= 2).count();
        stats.insert("main_sections".to_string(), main_sections.into());

        let known_anchors: BTreeSet<&str> =
            sections.iter().map(|s| s.anchor_id.as_str()).collect();
        let cross_refs = self.cross_references(content);
        let unresolved = cross_refs
            .iter()
            .filter(|(_, anchor)| !known_anchors.contains(anchor.as_str()))
            .count();
        stats.insert("cross_references".to_string(), cross_refs.len().into());
        stats.insert("unresolved_cross_references".to_string(), unresolved.into());

        let mut by_language: BTreeMap<String, usize> = BTreeMap::new();
        for block in self.code_blocks(content, &document.source) {
            let key = if block.language.is_empty() {
                "(untagged)".to_string()
            } else {
                block.language
            };
            *by_language.entry(key).or_default() += 1;
        }
        stats.insert(
            "code_blocks".to_string(),
            serde_json::to_value(by_language).unwrap_or_default(),
        );

        stats
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins lines, dropping blank lines at either end. Indentation is kept.
fn join_trimmed(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Builds the section tree from header tokens.
///
/// Nesting uses a level stack: entries at the incoming level or deeper are
/// popped before the new section is attached to whatever remains on top.
/// Boundaries come second: a section ends on the line before its next
/// sibling, or where its parent ends when it is the last child.
pub fn build_section_tree(tokens: &[HeaderToken], lines: &[&str]) -> Vec<Section> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); tokens.len()];
    let mut roots = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        while let Some(&top) = stack.last() {
            if tokens[top].level >= token.level {
                stack.pop();
            } else {
                break;
            }
        }
        match stack.last() {
            Some(&parent) => children[parent].push(idx),
            None => roots.push(idx),
        }
        stack.push(idx);
    }

    let last_line = lines.len().saturating_sub(1);
    assemble(&roots, last_line, tokens, &children, lines)
}

fn assemble(
    siblings: &[usize],
    parent_end: usize,
    tokens: &[HeaderToken],
    children: &[Vec<usize>],
    lines: &[&str],
) -> Vec<Section> {
    siblings
        .iter()
        .enumerate()
        .map(|(pos, &idx)| {
            let token = &tokens[idx];
            let end_line = siblings
                .get(pos + 1)
                .map(|&next| tokens[next].line - 1)
                .unwrap_or(parent_end)
                .max(token.line);

            let span = &lines[token.line + 1..(end_line + 1).min(lines.len()).max(token.line + 1)];
            let body_end = children[idx]
                .first()
                .map(|&first| tokens[first].line)
                .unwrap_or(end_line + 1)
                .min(lines.len())
                .max(token.line + 1);
            let body = &lines[token.line + 1..body_end];

            Section {
                title: token.title.clone(),
                level: token.level,
                anchor_id: token
                    .explicit_anchor
                    .clone()
                    .unwrap_or_else(|| slugify(&token.title)),
                content: join_trimmed(span),
                body: join_trimmed(body),
                subsections: assemble(&children[idx], end_line, tokens, children, lines),
                start_line: token.line,
                end_line,
            }
        })
        .collect()
}
