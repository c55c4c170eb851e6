use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A header line recognised by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderToken {
    pub line: usize,
    pub level: u8,
    pub title: String,
    pub explicit_anchor: Option<String>,
}

/// A node of the heading-derived section tree.
///
/// `content` is the raw span after the header line up to the next sibling,
/// so it still contains every descendant header and body. `body` is the
/// re-sliced part that belongs to this section alone (up to the first child).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub level: u8,
    pub anchor_id: String,
    pub content: String,
    pub body: String,
    pub subsections: Vec<Section>,
    pub start_line: usize,
    pub end_line: usize,
}

impl Section {
    /// Depth-first, pre-order traversal of this section and its descendants.
    pub fn walk(&self) -> Vec<&Section> {
        let mut out = vec![self];
        for child in &self.subsections {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub source: String,
    pub sections: Vec<Section>,
    pub metadata: DocumentMetadata,
}

impl ParsedDocument {
    pub fn all_sections(&self) -> Vec<&Section> {
        self.sections.iter().flat_map(|s| s.walk()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub source_type: SourceType,
    pub created_at: String,
    pub total_lines: usize,
    pub header_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceType {
    LocalFile,
    Url,
}

#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub output_dir: PathBuf,
    pub write_summary: bool,
    pub write_introduction: bool,
    pub rewrite_cross_refs: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmittedFile {
    pub title: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmittedChapter {
    pub title: String,
    pub dir: String,
    pub overview: PathBuf,
    pub subsections: Vec<EmittedFile>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitResult {
    pub chapters: Vec<EmittedChapter>,
    pub output_files: Vec<PathBuf>,
    pub summary_file: Option<PathBuf>,
    pub introduction_file: Option<PathBuf>,
    pub skipped_chapters: Vec<String>,
    /// slug -> book-relative path for every emitted subsection.
    pub derived_anchors: BTreeMap<String, String>,
    pub rewrites: Vec<LinkRewrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRewrite {
    pub file: String,
    pub old_link: String,
    pub new_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkInfo {
    pub source_file: String,
    pub line_number: usize,
    pub link_text: String,
    pub link_target: String,
    pub anchor: Option<String>,
    pub is_valid: bool,
    pub error_message: String,
}

impl LinkInfo {
    pub fn raw_target(&self) -> String {
        match &self.anchor {
            Some(anchor) => format!("{}#{}", self.link_target, anchor),
            None => self.link_target.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub file: String,
    pub language: String,
    pub code: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompileOutcome {
    Passed,
    Failed { stderr: String },
    TimedOut { seconds: u64 },
    Skipped { reason: String },
}

impl CompileOutcome {
    /// Skipped blocks count as passing.
    pub fn is_pass(&self) -> bool {
        matches!(self, CompileOutcome::Passed | CompileOutcome::Skipped { .. })
    }
}

/// Outcome of one validator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub test_name: String,
    pub passed: bool,
    pub details: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub warnings_count: usize,
    pub errors_count: usize,
    pub overall_success: bool,
    pub generated_at: String,
    pub test_results: Vec<ValidationResult>,
}

impl ValidationSummary {
    pub fn from_results(test_results: Vec<ValidationResult>) -> Self {
        let passed_tests = test_results.iter().filter(|r| r.passed).count();
        let failed_tests = test_results.len() - passed_tests;
        let errors_count = test_results.iter().map(|r| r.errors.len()).sum();
        let warnings_count = test_results.iter().map(|r| r.warnings.len()).sum();

        Self {
            total_tests: test_results.len(),
            passed_tests,
            failed_tests,
            warnings_count,
            errors_count,
            overall_success: failed_tests == 0 && errors_count == 0,
            generated_at: chrono::Utc::now().to_rfc3339(),
            test_results,
        }
    }
}
