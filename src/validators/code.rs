use super::compile::skip_reason;
use super::finish;
use crate::manifest::CompileSettings;
use crate::services::corpus::BookCorpus;
use crate::services::parser::MarkdownParser;
use crate::types::{CodeBlock, ValidationResult};
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

const TEST_NAME: &str = "Code Syntax Highlighting";
const LISTED_UNTAGGED: usize = 5;

fn error_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // doubled statement terminator
            Regex::new(r";;").unwrap(),
            // fn without a name
            Regex::new(r"fn\s+\(").unwrap(),
        ]
    })
}

/// True when some line leaves a `"` string open. Escaped quotes and the
/// `'"'` char literal do not count.
fn has_unterminated_string(code: &str) -> bool {
    code.lines().any(|line| {
        let line = line.replace("'\"'", "");
        let mut quotes = 0;
        let mut escaped = false;
        for ch in line.chars() {
            match ch {
                '\\' if !escaped => {
                    escaped = true;
                    continue;
                }
                '"' if !escaped => quotes += 1,
                _ => {}
            }
            escaped = false;
        }
        quotes % 2 == 1
    })
}

/// Cheap plausibility check for a Rust snippet, not a parser.
///
/// Passes when `{}`, `()` and `[]` occur in equal counts, no line leaves a
/// string literal open and none of the error patterns (`;;`, `fn (`)
/// matches.
pub fn bracket_balance_heuristic(code: &str) -> bool {
    let balanced = [('{', '}'), ('(', ')'), ('[', ']')]
        .iter()
        .all(|&(open, close)| code.matches(open).count() == code.matches(close).count());

    balanced
        && !has_unterminated_string(code)
        && !error_patterns().iter().any(|p| p.is_match(code))
}

pub struct CodeSyntaxValidator<'s> {
    settings: &'s CompileSettings,
    parser: MarkdownParser,
}

impl<'s> CodeSyntaxValidator<'s> {
    pub fn new(settings: &'s CompileSettings) -> Self {
        Self {
            settings,
            parser: MarkdownParser::new(),
        }
    }

    pub fn collect_blocks(&self, corpus: &BookCorpus) -> Vec<CodeBlock> {
        corpus
            .files
            .iter()
            .flat_map(|(path, content)| self.parser.code_blocks(content, path))
            .collect()
    }

    pub fn validate(&self, corpus: &BookCorpus) -> ValidationResult {
        info!("Checking code block syntax");

        let blocks = self.collect_blocks(corpus);
        let rust_blocks: Vec<&CodeBlock> = blocks
            .iter()
            .filter(|b| b.language.eq_ignore_ascii_case("rust"))
            .collect();

        let mut errors = Vec::new();
        let mut syntax_valid = 0;
        let mut testable = 0;
        for block in &rust_blocks {
            if bracket_balance_heuristic(&block.code) {
                syntax_valid += 1;
            } else {
                errors.push(format!("Syntax error in {} line {}", block.file, block.line));
            }
            if skip_reason(&block.code, self.settings).is_none() {
                testable += 1;
            }
        }

        let untagged: Vec<&CodeBlock> = blocks.iter().filter(|b| b.language.is_empty()).collect();
        let warnings = untagged
            .iter()
            .take(LISTED_UNTAGGED)
            .map(|b| format!("Untagged code block in {} line {}", b.file, b.line))
            .collect();

        let rust_total = rust_blocks.len();
        let pct = |n: usize| n as f64 / rust_total.max(1) as f64 * 100.0;
        let details = format!(
            "Code blocks: {}, rust: {}, syntax plausible: {} ({:.1}%), compile-testable: {} ({:.1}%), untagged: {}",
            blocks.len(),
            rust_total,
            syntax_valid,
            pct(syntax_valid),
            testable,
            pct(testable),
            untagged.len()
        );

        finish(TEST_NAME, details, errors, warnings)
    }
}
