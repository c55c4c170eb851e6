mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{AnalyzeArgs, BuildCheckArgs, Cli, Commands, FixLinksArgs, SplitArgs, TestCodeArgs, ValidateArgs};
use mdbook_splitter::error::{BookSplitterError, Result};
use mdbook_splitter::manifest::BookManifest;
use mdbook_splitter::services::{
    BookCorpus, ContentFetcher, CrossReferenceRewriter, DocumentSplitter, MarkdownParser, ReportWriter,
    Requirement,
};
use mdbook_splitter::types::{CodeBlock, Section, SplitConfig, ValidationResult, ValidationSummary};
use mdbook_splitter::validators::{
    BookBuildValidator, CargoOracle, CodeSyntaxValidator, CompileTester, ContentPreservationValidator,
    CrossReferenceValidator, LinkValidator, RedundancyDetector,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Split(args) => handle_split_command(args, &cli.output).await,
        Commands::FixLinks(args) => handle_fix_links_command(args, &cli.output).await,
        Commands::Validate(args) => handle_validate_command(args, &cli.output).await,
        Commands::TestCode(args) => handle_test_code_command(args, &cli.output).await,
        Commands::Analyze(args) => handle_analyze_command(args).await,
        Commands::BuildCheck(args) => handle_build_check_command(args, &cli.output).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn handle_split_command(args: &SplitArgs, output_dir: &Path) -> Result<()> {
    ContentFetcher::validate_source(&args.source)?;
    let manifest = BookManifest::load_or_default(args.manifest.as_deref()).await?;

    let (content, metadata) = ContentFetcher::fetch_content(&args.source).await?;
    let parser = MarkdownParser::new();
    let document = parser.parse_document(&content, metadata);

    info!(
        "Document '{}' has {} lines and {} headers",
        document.source, document.metadata.total_lines, document.metadata.header_count
    );

    let config = SplitConfig {
        output_dir: output_dir.to_path_buf(),
        write_summary: !args.no_summary,
        write_introduction: !args.no_intro,
        rewrite_cross_refs: !args.no_rewrite,
    };

    let result = DocumentSplitter::new(&manifest)
        .split_document(&document, &config)
        .await?;

    for chapter in &result.chapters {
        info!("  {} -> {}/", chapter.title, chapter.dir);
        for file in &chapter.subsections {
            info!("    - {}", file.path.display());
        }
    }
    for title in &result.skipped_chapters {
        warn!("  Skipped unmapped chapter: {}", title);
    }
    if let Some(summary) = &result.summary_file {
        info!("  - {} (table of contents)", summary.display());
    }

    info!(
        "Split completed: {} chapters, {} files, {} links rewritten",
        result.chapters.len(),
        result.output_files.len(),
        result.rewrites.len()
    );
    Ok(())
}

async fn handle_fix_links_command(args: &FixLinksArgs, output_dir: &Path) -> Result<()> {
    let manifest = BookManifest::load_or_default(args.manifest.as_deref()).await?;
    let rewriter = CrossReferenceRewriter::new(manifest.anchor_table(&BTreeMap::new()));

    if args.dry_run {
        let corpus = BookCorpus::load(output_dir).await?;
        let mut count = 0;
        for (rel, content) in &corpus.files {
            let (_, rewrites) = rewriter.rewrite(content, rel);
            for rewrite in rewrites {
                println!("{}: {} -> {}", rel, rewrite.old_link, rewrite.new_link);
                count += 1;
            }
        }
        info!("{} cross-references would be rewritten", count);
        return Ok(());
    }

    let rewrites = rewriter.rewrite_tree(output_dir).await?;
    for rewrite in &rewrites {
        println!("{}: {} -> {}", rewrite.file, rewrite.old_link, rewrite.new_link);
    }

    let corpus = BookCorpus::load(output_dir).await?;
    LinkValidator::new().check(&corpus).print_summary();
    Ok(())
}

async fn handle_validate_command(args: &ValidateArgs, output_dir: &Path) -> Result<()> {
    let manifest = BookManifest::load_or_default(args.manifest.as_deref()).await?;
    let corpus = BookCorpus::load(output_dir).await?;

    let mut results = Vec::new();

    match &args.original {
        Some(original) => {
            let (content, _) = ContentFetcher::fetch_content(original).await?;
            results.push(ContentPreservationValidator::new(&manifest).validate(&content, &corpus));
        }
        None => warn!("No --original given; content preservation not checked"),
    }

    results.push(LinkValidator::new().validate(&corpus));
    results.push(CodeSyntaxValidator::new(&manifest.compile).validate(&corpus));
    results.push(CrossReferenceValidator::new(&manifest).validate(&corpus));

    if args.compile {
        let oracle = CargoOracle::new(&manifest.compile);
        if oracle.tool().ensure(Requirement::Soft).await?.is_some() {
            let blocks = CodeSyntaxValidator::new(&manifest.compile).collect_blocks(&corpus);
            results.push(CompileTester::new(&manifest.compile, oracle).test_blocks(&blocks).await);
        } else {
            results.push(skipped_result("Code Compilation", "cargo"));
        }
    }

    if !args.skip_build {
        let book_dir = book_dir_for(output_dir);
        results.push(
            BookBuildValidator::new()
                .validate(&book_dir, Requirement::Soft)
                .await?,
        );
    }

    let summary = ValidationSummary::from_results(results);
    let (json_path, report_path) = ReportWriter::new(&args.report_dir, "mdbook_validation")
        .write(&summary, output_dir)
        .await?;

    print_summary(&summary);
    info!("Results: {}", json_path.display());
    info!("Report: {}", report_path.display());

    finish_summary(&summary)
}

async fn handle_test_code_command(args: &TestCodeArgs, output_dir: &Path) -> Result<()> {
    let manifest = BookManifest::load_or_default(args.manifest.as_deref()).await?;
    let mut settings = manifest.compile.clone();
    if let Some(timeout) = args.timeout {
        settings.timeout_secs = timeout;
    }

    let source = args.source.clone().unwrap_or_else(|| output_dir.to_path_buf());
    let blocks = load_code_blocks(&source).await?;

    let oracle = CargoOracle::new(&settings);
    oracle.tool().ensure(Requirement::Hard).await?;
    info!(
        "Testing {} code blocks from {} ({}s per block)",
        blocks.len(),
        source.display(),
        settings.timeout_secs
    );

    let result = CompileTester::new(&settings, oracle).test_blocks(&blocks).await;
    let summary = ValidationSummary::from_results(vec![result]);
    ReportWriter::new(&args.report_dir, "code_compilation")
        .write(&summary, &source)
        .await?;

    print_summary(&summary);
    finish_summary(&summary)
}

async fn handle_analyze_command(args: &AnalyzeArgs) -> Result<()> {
    info!("Analyzing: {}", args.source);

    let (content, metadata) = ContentFetcher::fetch_content(&args.source).await?;
    let parser = MarkdownParser::new();
    let document = parser.parse_document(&content, metadata);
    let stats = parser.get_structure_stats(&document, &content);
    let redundancy = RedundancyDetector::new().analyze(&content);

    println!("\n=== Analysis for '{}' ===", document.source);
    println!("Source type: {:?}", document.metadata.source_type);
    for (key, value) in &stats {
        println!("{}: {}", key.replace('_', " "), value);
    }

    println!("\nSection tree:");
    let depth_limit = if args.detailed { u8::MAX } else { 2 };
    for root in &document.sections {
        print_section(root, depth_limit);
    }

    redundancy.print_summary();

    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&serde_json::json!({
            "document": document,
            "stats": stats,
            "redundancy": redundancy,
        }))
        .context("Failed to serialize analysis results")?;

        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON analysis file")?;

        info!("Analysis results written to: {}", json_path.display());
    }

    Ok(())
}

async fn handle_build_check_command(args: &BuildCheckArgs, output_dir: &Path) -> Result<()> {
    let book_dir = args.book_dir.clone().unwrap_or_else(|| book_dir_for(output_dir));
    let result = BookBuildValidator::new()
        .validate(&book_dir, Requirement::Hard)
        .await?;

    println!("{}", result.details);
    for e in &result.errors {
        println!("  - {}", e);
    }

    finish_summary(&ValidationSummary::from_results(vec![result]))
}

/// `book.toml` lives one level above the content root.
fn book_dir_for(output_dir: &Path) -> PathBuf {
    match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn load_code_blocks(source: &Path) -> Result<Vec<CodeBlock>> {
    let parser = MarkdownParser::new();
    if source.is_dir() {
        let corpus = BookCorpus::load(source).await?;
        return Ok(corpus
            .files
            .iter()
            .flat_map(|(rel, content)| parser.code_blocks(content, rel))
            .collect());
    }

    let (content, metadata) = ContentFetcher::fetch_content(&source.to_string_lossy()).await?;
    Ok(parser.code_blocks(&content, &metadata.filename))
}

fn skipped_result(test_name: &str, tool: &str) -> ValidationResult {
    ValidationResult {
        test_name: test_name.to_string(),
        passed: true,
        details: format!("Skipped: {} not available", tool),
        errors: Vec::new(),
        warnings: vec![format!("{} not found; {} not checked", tool, test_name)],
    }
}

fn print_section(section: &Section, depth_limit: u8) {
    if section.level > depth_limit {
        return;
    }
    let indent = "  ".repeat(section.level.saturating_sub(1) as usize);
    println!(
        "{}- {} (lines {}-{}, #{})",
        indent,
        section.title,
        section.start_line + 1,
        section.end_line + 1,
        section.anchor_id
    );
    for child in &section.subsections {
        print_section(child, depth_limit);
    }
}

fn print_summary(summary: &ValidationSummary) {
    println!("\n=== Validation Summary ===");
    println!(
        "Tests: {}/{} passed, {} errors, {} warnings",
        summary.passed_tests, summary.total_tests, summary.errors_count, summary.warnings_count
    );
    for result in &summary.test_results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!("  [{}] {}: {}", status, result.test_name, result.details);
    }
}

fn finish_summary(summary: &ValidationSummary) -> Result<()> {
    if summary.overall_success {
        info!("All checks passed");
        Ok(())
    } else {
        Err(BookSplitterError::ValidationFailed {
            failed: summary.failed_tests,
            total: summary.total_tests,
        })
    }
}

