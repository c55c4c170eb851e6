use crate::error::{BookSplitterError, Result};
use crate::manifest::{BookManifest, FileLookup};
use crate::services::anchor::fallback_filename;
use crate::services::crossref::CrossReferenceRewriter;
use crate::types::{
    EmittedChapter, EmittedFile, LinkRewrite, ParsedDocument, Section, SplitConfig, SplitResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const OVERVIEW_FILE: &str = "README.md";
const INTRODUCTION_FILE: &str = "introduction.md";
const SUMMARY_FILE: &str = "SUMMARY.md";
const INTRODUCTION_TITLE: &str = "Introduction";

/// Minimum length of the line picked as a chapter description.
const SUBSTANTIAL_LINE_CHARS: usize = 50;

/// A mapped chapter and the files its subsections will be written to.
#[derive(Debug, Clone)]
pub struct ChapterPlan<'d> {
    pub section: &'d Section,
    pub dir: String,
    pub files: Vec<(&'d Section, String)>,
}

impl ChapterPlan<'_> {
    pub fn overview_path(&self) -> String {
        format!("{}/{}", self.dir, OVERVIEW_FILE)
    }
}

/// Writes a parsed document out as an mdBook source tree.
pub struct DocumentSplitter<'m> {
    manifest: &'m BookManifest,
}

impl<'m> DocumentSplitter<'m> {
    pub fn new(manifest: &'m BookManifest) -> Self {
        Self { manifest }
    }

    pub async fn split_document(
        &self,
        document: &ParsedDocument,
        config: &SplitConfig,
    ) -> Result<SplitResult> {
        info!(
            "Splitting document '{}' into {}",
            document.source,
            config.output_dir.display()
        );

        Self::ensure_output_directory(&config.output_dir).await?;

        let (plans, skipped_chapters) = self.plan_chapters(document);
        if plans.is_empty() {
            warn!("No level-2 section matched the chapter mapping; no chapters emitted");
        }

        let derived_anchors = Self::derive_anchors(&plans);
        let rewriter = config.rewrite_cross_refs.then(|| {
            CrossReferenceRewriter::new(self.manifest.anchor_table(&derived_anchors))
        });

        let mut result = SplitResult {
            skipped_chapters,
            derived_anchors,
            ..Default::default()
        };

        for plan in &plans {
            let chapter = self
                .write_chapter(plan, &config.output_dir, rewriter.as_ref(), &mut result.rewrites)
                .await?;
            result.output_files.push(chapter.overview.clone());
            result
                .output_files
                .extend(chapter.subsections.iter().map(|f| f.path.clone()));
            result.chapters.push(chapter);
        }

        if config.write_introduction {
            let rel = INTRODUCTION_FILE.to_string();
            let content = Self::introduction_content(document);
            let content = apply_rewriter(rewriter.as_ref(), content, &rel, &mut result.rewrites);
            let path = config.output_dir.join(&rel);
            write_file(&path, &content).await?;
            info!("Created: {}", path.display());
            result.output_files.push(path.clone());
            result.introduction_file = Some(path);
        }

        if config.write_summary {
            let path = config.output_dir.join(SUMMARY_FILE);
            write_file(&path, &Self::summary_content(&plans)).await?;
            info!("Created: {}", path.display());
            result.summary_file = Some(path);
        }

        info!(
            "Emitted {} chapters, {} files, {} cross-references rewritten",
            result.chapters.len(),
            result.output_files.len(),
            result.rewrites.len()
        );

        Ok(result)
    }

    /// Every level-2 section with an exact chapter mapping, in document order,
    /// plus the titles of level-2 sections that were left out.
    pub fn plan_chapters<'d>(&self, document: &'d ParsedDocument) -> (Vec<ChapterPlan<'d>>, Vec<String>) {
        let mut plans = Vec::new();
        let mut skipped = Vec::new();

        for section in document.all_sections() {
            if section.level != 2 {
                continue;
            }
            let Some(dir) = self.manifest.chapter_dir(&section.title) else {
                if section.title != INTRODUCTION_TITLE {
                    warn!("No chapter mapping for '{}'; skipping", section.title);
                    skipped.push(section.title.clone());
                }
                continue;
            };

            let mut used = BTreeSet::new();
            let files = section
                .subsections
                .iter()
                .map(|sub| {
                    let file = self.subsection_filename(&sub.title);
                    if !used.insert(file.clone()) {
                        warn!(
                            "'{}' maps to {}/{} which another subsection already uses",
                            sub.title, dir, file
                        );
                    }
                    (sub, file)
                })
                .collect();

            plans.push(ChapterPlan {
                section,
                dir: dir.to_string(),
                files,
            });
        }

        (plans, skipped)
    }

    /// Manifest entry by exact title, then by containment, then a slug.
    pub fn subsection_filename(&self, title: &str) -> String {
        match self.manifest.subsection_file(title) {
            Some(FileLookup::Exact(file)) => file.to_string(),
            Some(FileLookup::Contained { key, file }) => {
                warn!(
                    "'{}' has no exact filename mapping; using '{}' from '{}'",
                    title, file, key
                );
                file.to_string()
            }
            None => fallback_filename(title),
        }
    }

    fn derive_anchors(plans: &[ChapterPlan<'_>]) -> BTreeMap<String, String> {
        let mut anchors = BTreeMap::new();
        let mut insert = |anchor: &str, target: String| {
            if anchors.contains_key(anchor) {
                debug!("Anchor '{}' already mapped; ignoring {}", anchor, target);
            } else {
                anchors.insert(anchor.to_string(), target);
            }
        };

        for plan in plans {
            insert(&plan.section.anchor_id, plan.overview_path());
            for (sub, file) in &plan.files {
                let target = format!("{}/{}", plan.dir, file);
                insert(&sub.anchor_id, target.clone());
                for nested in sub.walk().into_iter().skip(1) {
                    insert(&nested.anchor_id, format!("{}#{}", target, nested.anchor_id));
                }
            }
        }

        anchors
    }

    async fn write_chapter(
        &self,
        plan: &ChapterPlan<'_>,
        output_dir: &Path,
        rewriter: Option<&CrossReferenceRewriter>,
        rewrites: &mut Vec<LinkRewrite>,
    ) -> Result<EmittedChapter> {
        let chapter_path = output_dir.join(&plan.dir);
        Self::ensure_output_directory(&chapter_path).await?;

        let overview_rel = plan.overview_path();
        let overview = apply_rewriter(rewriter, Self::overview_content(plan), &overview_rel, rewrites);
        let overview_path = output_dir.join(&overview_rel);
        write_file(&overview_path, &overview).await?;
        info!("Created: {}", overview_path.display());

        let mut subsections = Vec::new();
        for (sub, file) in &plan.files {
            let rel = format!("{}/{}", plan.dir, file);
            let content = format!("# {}\n\n{}\n", sub.title, sub.content);
            let content = apply_rewriter(rewriter, content, &rel, rewrites);
            let path = output_dir.join(&rel);
            write_file(&path, &content).await?;
            debug!("Created: {}", path.display());

            subsections.push(EmittedFile {
                title: sub.title.clone(),
                path,
            });
        }

        Ok(EmittedChapter {
            title: plan.section.title.clone(),
            dir: plan.dir.clone(),
            overview: overview_path,
            subsections,
        })
    }

    /// First line longer than 50 characters that is not a header, table row
    /// or list item.
    pub fn chapter_description(section: &Section) -> Option<&str> {
        section
            .content
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#') && !line.starts_with('|') && !line.starts_with('-'))
            .find(|line| line.chars().count() > SUBSTANTIAL_LINE_CHARS)
    }

    fn overview_content(plan: &ChapterPlan<'_>) -> String {
        let mut overview = format!("# {}\n\n", plan.section.title);

        if let Some(description) = Self::chapter_description(plan.section) {
            overview.push_str(description);
            overview.push_str("\n\n");
        }

        if !plan.files.is_empty() {
            overview.push_str("In this chapter:\n\n");
            for (sub, file) in &plan.files {
                overview.push_str(&format!("- [{}](./{})\n", sub.title, file));
            }
        }

        overview
    }

    fn introduction_content(document: &ParsedDocument) -> String {
        let root = document.sections.iter().find(|s| s.level == 1);
        let intro = document
            .all_sections()
            .into_iter()
            .find(|s| s.level == 2 && s.title == INTRODUCTION_TITLE);

        let title = root.map(|r| r.title.as_str()).unwrap_or(INTRODUCTION_TITLE);
        let mut content = format!("# {}\n\n", title);

        if let Some(root) = root {
            if !root.body.is_empty() {
                content.push_str(&root.body);
                content.push_str("\n\n");
            }
        }
        if let Some(intro) = intro {
            if root.is_some() {
                content.push_str(&format!("## {}\n\n", INTRODUCTION_TITLE));
            }
            content.push_str(&intro.content);
            content.push('\n');
        }

        content
    }

    fn summary_content(plans: &[ChapterPlan<'_>]) -> String {
        let mut summary = format!("# Summary\n\n[{}]({})\n\n", INTRODUCTION_TITLE, INTRODUCTION_FILE);

        for plan in plans {
            summary.push_str(&format!("- [{}]({})\n", plan.section.title, plan.overview_path()));
            for (sub, file) in &plan.files {
                summary.push_str(&format!("  - [{}]({}/{})\n", sub.title, plan.dir, file));
            }
            summary.push('\n');
        }

        summary
    }

    async fn ensure_output_directory(output_dir: &Path) -> Result<()> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).await.map_err(|e| {
                BookSplitterError::OutputDirectory {
                    reason: format!("Failed to create {}: {}", output_dir.display(), e),
                }
            })?;
            info!("Created directory: {}", output_dir.display());
        }
        Ok(())
    }
}

fn apply_rewriter(
    rewriter: Option<&CrossReferenceRewriter>,
    content: String,
    rel_path: &str,
    rewrites: &mut Vec<LinkRewrite>,
) -> String {
    match rewriter {
        Some(rewriter) => {
            let (content, applied) = rewriter.rewrite(&content, rel_path);
            rewrites.extend(applied);
            content
        }
        None => content,
    }
}

async fn write_file(path: &PathBuf, content: &str) -> Result<()> {
    fs::write(path, content)
        .await
        .map_err(|e| BookSplitterError::OutputDirectory {
            reason: format!("Failed to write {}: {}", path.display(), e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ChapterEntry;
    use crate::services::parser::MarkdownParser;
    use crate::types::{DocumentMetadata, SourceType};

    fn parse(content: &str) -> ParsedDocument {
        let metadata = DocumentMetadata {
            filename: "doc.md".to_string(),
            source_type: SourceType::LocalFile,
            created_at: chrono::Utc::now().to_rfc3339(),
            total_lines: 0,
            header_count: 0,
        };
        MarkdownParser::new().parse_document(content, metadata)
    }

    fn manifest() -> BookManifest {
        BookManifest {
            chapters: vec![ChapterEntry {
                title: "1. Chapter One".to_string(),
                dir: "chapter-one".to_string(),
            }],
            subsections: Vec::new(),
            anchors: BTreeMap::new(),
            ..BookManifest::default()
        }
    }

    fn config(dir: &Path) -> SplitConfig {
        SplitConfig {
            output_dir: dir.to_path_buf(),
            write_summary: true,
            write_introduction: true,
            rewrite_cross_refs: true,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_single_chapter() {
        let dir = tempfile::tempdir().unwrap();
        let document = parse("# Title\n\n## 1. Chapter One\n\n### 1.1 Sub\n\nSub body text.\n");
        let manifest = manifest();

        let result = DocumentSplitter::new(&manifest)
            .split_document(&document, &config(dir.path()))
            .await
            .unwrap();

        assert_eq!(result.chapters.len(), 1);
        let dirs: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        assert_eq!(dirs.len(), 1);

        let overview = std::fs::read_to_string(dir.path().join("chapter-one/README.md")).unwrap();
        assert!(overview.starts_with("# 1. Chapter One"));
        assert!(overview.contains("[1.1 Sub](./sub.md)"));

        let sub = std::fs::read_to_string(dir.path().join("chapter-one/sub.md")).unwrap();
        assert!(sub.starts_with("# 1.1 Sub\n"));
        assert!(sub.contains("Sub body text."));

        let summary = std::fs::read_to_string(dir.path().join("SUMMARY.md")).unwrap();
        assert!(summary.contains("- [1. Chapter One](chapter-one/README.md)"));
        assert!(summary.contains("  - [1.1 Sub](chapter-one/sub.md)"));
    }

    #[tokio::test]
    async fn test_unmapped_chapter_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let document = parse("# Title\n## 1. Chapter One\n### A\n## 2. Unknown\n### B\n");
        let manifest = manifest();

        let result = DocumentSplitter::new(&manifest)
            .split_document(&document, &config(dir.path()))
            .await
            .unwrap();

        assert_eq!(result.chapters.len(), 1);
        assert_eq!(result.skipped_chapters, vec!["2. Unknown".to_string()]);
        assert!(!dir.path().join("unknown").exists());
    }

    #[tokio::test]
    async fn test_split_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let document = parse("# Title\n## 1. Chapter One\n### 1.1 Sub\nbody\n");
        let manifest = manifest();
        let splitter = DocumentSplitter::new(&manifest);

        splitter.split_document(&document, &config(dir.path())).await.unwrap();
        let first = std::fs::read_to_string(dir.path().join("chapter-one/sub.md")).unwrap();
        splitter.split_document(&document, &config(dir.path())).await.unwrap();
        let second = std::fs::read_to_string(dir.path().join("chapter-one/sub.md")).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cross_references_use_derived_anchors() {
        let dir = tempfile::tempdir().unwrap();
        let document = parse(
            "# Title\nSee [the sub](#11-sub).\n## 1. Chapter One\n### 1.1 Sub\nbody\n### 1.2 Other\nBack to [sub](#11-sub).\n",
        );
        let manifest = manifest();

        let result = DocumentSplitter::new(&manifest)
            .split_document(&document, &config(dir.path()))
            .await
            .unwrap();

        assert_eq!(result.derived_anchors["11-sub"], "chapter-one/sub.md");
        let other = std::fs::read_to_string(dir.path().join("chapter-one/other.md")).unwrap();
        assert!(other.contains("[sub](../chapter-one/sub.md)"));
        let intro = std::fs::read_to_string(dir.path().join("introduction.md")).unwrap();
        assert!(intro.contains("[the sub](chapter-one/sub.md)"));
        assert_eq!(result.rewrites.len(), 2);
    }

    #[test]
    fn test_chapter_description_skips_short_and_structural_lines() {
        let document = parse(
            "## Chapter\n| a table row that is long enough to count as substantial text |\n- a list item that is long enough to count as substantial text\nshort line\nThis paragraph line is comfortably longer than fifty characters.\n",
        );
        let description = DocumentSplitter::chapter_description(&document.sections[0]);
        assert_eq!(
            description,
            Some("This paragraph line is comfortably longer than fifty characters.")
        );
    }

    #[test]
    fn test_subsection_filename_lookup() {
        let manifest = BookManifest::default();
        let splitter = DocumentSplitter::new(&manifest);
        assert_eq!(splitter.subsection_filename("3.3 Type System Advantages"), "type-system.md");
        assert_eq!(splitter.subsection_filename("Interrupt Handling"), "interrupts.md");
        assert_eq!(splitter.subsection_filename("7.1 Brand New Topic"), "brand-new-topic.md");
    }
}
