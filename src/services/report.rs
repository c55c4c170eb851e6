use crate::error::Result;
use crate::types::{ValidationResult, ValidationSummary};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// How many errors and warnings per test the Markdown report lists.
const LISTED_ITEMS: usize = 5;

/// Writes a validation summary as a JSON file and a Markdown report.
pub struct ReportWriter {
    output_dir: PathBuf,
    stem: String,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stem: stem.into(),
        }
    }

    pub fn json_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_results.json", self.stem))
    }

    pub fn markdown_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_report.md", self.stem))
    }

    /// Writes both files and returns their paths (JSON first).
    pub async fn write(&self, summary: &ValidationSummary, source_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        if !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir).await?;
        }

        let json_path = self.json_path();
        fs::write(&json_path, serde_json::to_string_pretty(summary)?).await?;

        let markdown_path = self.markdown_path();
        fs::write(&markdown_path, render_markdown(summary, source_dir)).await?;

        info!(
            "Reports written to {} and {}",
            json_path.display(),
            markdown_path.display()
        );
        Ok((json_path, markdown_path))
    }
}

pub fn render_markdown(summary: &ValidationSummary, source_dir: &Path) -> String {
    let status = if summary.overall_success { "PASS" } else { "FAIL" };
    let pass_rate = summary.passed_tests as f64 / summary.total_tests.max(1) as f64 * 100.0;

    let mut report = format!(
        "# mdBook Content Validation Report\n\n\
         **Generated:** {}  \n\
         **Source Directory:** `{}`\n\n\
         ## Summary\n\n\
         | Metric | Value |\n\
         |--------|-------|\n\
         | **Overall Status** | {} |\n\
         | **Tests Passed** | {}/{} ({:.1}%) |\n\
         | **Errors** | {} |\n\
         | **Warnings** | {} |\n\n\
         ## Test Results\n\n",
        summary.generated_at,
        source_dir.display(),
        status,
        summary.passed_tests,
        summary.total_tests,
        pass_rate,
        summary.errors_count,
        summary.warnings_count,
    );

    for result in &summary.test_results {
        report.push_str(&render_result(result));
    }

    if !summary.overall_success {
        report.push_str(&format!(
            "## Action Required\n\n{} test(s) failed with {} error(s).\n",
            summary.failed_tests, summary.errors_count
        ));
    }

    report
}

fn render_result(result: &ValidationResult) -> String {
    let mut section = format!(
        "### {} {}\n\n**Errors:** {}  \n**Warnings:** {}  \n\n",
        if result.passed { "PASS" } else { "FAIL" },
        result.test_name,
        result.errors.len(),
        result.warnings.len()
    );

    if !result.details.is_empty() {
        section.push_str(&format!("**Details:**\n```\n{}\n```\n\n", result.details));
    }
    section.push_str(&render_list("Errors", "errors", &result.errors));
    section.push_str(&render_list("Warnings", "warnings", &result.warnings));
    section
}

fn render_list(heading: &str, noun: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = format!("**{}:**\n", heading);
    for item in items.iter().take(LISTED_ITEMS) {
        out.push_str(&format!("- {}\n", item));
    }
    if items.len() > LISTED_ITEMS {
        out.push_str(&format!("- ... and {} more {}\n", items.len() - LISTED_ITEMS, noun));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, errors: usize) -> ValidationResult {
        ValidationResult {
            test_name: name.to_string(),
            passed: errors == 0,
            details: "- checked: 3".to_string(),
            errors: (0..errors).map(|i| format!("error {}", i)).collect(),
            warnings: vec!["minor".to_string()],
        }
    }

    #[test]
    fn test_markdown_truncates_long_lists() {
        let summary = ValidationSummary::from_results(vec![result("Link Integrity", 7)]);
        let markdown = render_markdown(&summary, Path::new("src"));

        assert!(markdown.contains("### FAIL Link Integrity"));
        assert!(markdown.contains("- error 4"));
        assert!(!markdown.contains("- error 5"));
        assert!(markdown.contains("... and 2 more errors"));
        assert!(markdown.contains("## Action Required"));
    }

    #[tokio::test]
    async fn test_write_both_reports() {
        let dir = tempfile::tempdir().unwrap();
        let summary = ValidationSummary::from_results(vec![result("Content Preservation", 0)]);

        let writer = ReportWriter::new(dir.path().join("reports"), "mdbook_validation");
        let (json, markdown) = writer.write(&summary, Path::new("src")).await.unwrap();

        let parsed: ValidationSummary =
            serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert!(parsed.overall_success);
        assert_eq!(parsed.total_tests, 1);
        assert!(std::fs::read_to_string(markdown).unwrap().contains("PASS Content Preservation"));
    }
}
