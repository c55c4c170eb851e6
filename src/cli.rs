use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mdbook-split")]
#[command(about = "Split a large markdown tutorial into an mdBook source tree and validate the result")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Book content root (the mdBook `src` directory)
    #[arg(short, long, global = true, default_value = "./src")]
    pub output: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a document into chapter directories and subsection files
    Split(SplitArgs),

    /// Rewrite anchor-only cross-references in an existing book tree
    FixLinks(FixLinksArgs),

    /// Run every validator over the book tree and write reports
    Validate(ValidateArgs),

    /// Compile-check the rust code blocks of a document or book tree
    TestCode(TestCodeArgs),

    /// Analyze a document's structure without writing anything
    Analyze(AnalyzeArgs),

    /// Build the book with mdbook and check the generated site
    BuildCheck(BuildCheckArgs),
}

#[derive(Args)]
pub struct SplitArgs {
    /// Input document (file path or URL)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// JSON manifest overriding the built-in chapter and anchor tables
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Do not write SUMMARY.md
    #[arg(long)]
    pub no_summary: bool,

    /// Do not write introduction.md
    #[arg(long)]
    pub no_intro: bool,

    /// Leave `[text](#anchor)` links untouched
    #[arg(long)]
    pub no_rewrite: bool,
}

#[derive(Args)]
pub struct FixLinksArgs {
    /// JSON manifest providing the anchor table
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Only report what would change
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// The document the book was split from
    #[arg(long, value_name = "SOURCE")]
    pub original: Option<String>,

    /// JSON manifest with chapters, concepts and compile settings
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Directory for the JSON and Markdown reports
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub report_dir: PathBuf,

    /// Skip the mdbook build check
    #[arg(long)]
    pub skip_build: bool,

    /// Also compile-check rust code blocks
    #[arg(long)]
    pub compile: bool,
}

#[derive(Args)]
pub struct TestCodeArgs {
    /// Markdown file or directory; defaults to the book content root
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// JSON manifest with compile settings
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Per-block timeout in seconds (overrides the manifest)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory for the JSON and Markdown reports
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub report_dir: PathBuf,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input document (file path or URL)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Output analysis to JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Show the full section tree
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args)]
pub struct BuildCheckArgs {
    /// Directory holding book.toml; defaults to the parent of the content root
    #[arg(long, value_name = "DIR")]
    pub book_dir: Option<PathBuf>,
}
