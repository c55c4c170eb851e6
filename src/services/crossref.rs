use crate::error::Result;
use crate::services::corpus::relative_key;
use crate::types::LinkRewrite;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Rewrites anchor-only links into file-relative links using one shared
/// anchor table. Anchors missing from the table are left alone.
pub struct CrossReferenceRewriter {
    anchor_table: BTreeMap<String, String>,
    anchor_link: Regex,
}

impl CrossReferenceRewriter {
    pub fn new(anchor_table: BTreeMap<String, String>) -> Self {
        Self {
            anchor_table,
            anchor_link: Regex::new(r"\[([^\]]+)\]\(#([a-zA-Z0-9_-]+)\)").unwrap(),
        }
    }

    /// One `../` per directory between the content root and `rel_path`.
    pub fn depth_prefix(rel_path: &str) -> String {
        let depth = rel_path.split('/').filter(|s| !s.is_empty()).count().saturating_sub(1);
        "../".repeat(depth)
    }

    pub fn resolve(&self, anchor: &str, rel_path: &str) -> Option<String> {
        self.anchor_table
            .get(anchor)
            .map(|target| format!("{}{}", Self::depth_prefix(rel_path), target))
    }

    /// Rewrites `content` as it would appear in the file at `rel_path`.
    pub fn rewrite(&self, content: &str, rel_path: &str) -> (String, Vec<LinkRewrite>) {
        let mut rewrites = Vec::new();

        let rewritten = self.anchor_link.replace_all(content, |caps: &Captures| {
            let text = &caps[1];
            let anchor = &caps[2];
            match self.resolve(anchor, rel_path) {
                Some(path) => {
                    let new_link = format!("[{}]({})", text, path);
                    rewrites.push(LinkRewrite {
                        file: rel_path.to_string(),
                        old_link: caps[0].to_string(),
                        new_link: new_link.clone(),
                    });
                    new_link
                }
                None => caps[0].to_string(),
            }
        });

        (rewritten.into_owned(), rewrites)
    }

    /// Applies `rewrite` to every markdown file under `root`, in place.
    pub async fn rewrite_tree(&self, root: &Path) -> Result<Vec<LinkRewrite>> {
        info!("Fixing cross-references under {}", root.display());

        let mut all_rewrites = Vec::new();
        let mut files_updated = 0;

        for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md")
            {
                continue;
            }

            let rel = relative_key(root, path);
            let content = fs::read_to_string(path).await?;
            let (rewritten, rewrites) = self.rewrite(&content, &rel);

            if rewritten != content {
                fs::write(path, rewritten).await?;
                files_updated += 1;
                for rewrite in &rewrites {
                    debug!("  {}: {} -> {}", rel, rewrite.old_link, rewrite.new_link);
                }
            }
            all_rewrites.extend(rewrites);
        }

        info!(
            "Fixed {} cross-references in {} files",
            all_rewrites.len(),
            files_updated
        );
        Ok(all_rewrites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> CrossReferenceRewriter {
        let mut table = BTreeMap::new();
        table.insert("ownership".to_string(), "core/ownership.md".to_string());
        CrossReferenceRewriter::new(table)
    }

    #[test]
    fn test_root_file_gets_no_prefix() {
        let (out, rewrites) = rewriter().rewrite("See [own](#ownership).", "introduction.md");
        assert_eq!(out, "See [own](core/ownership.md).");
        assert_eq!(rewrites.len(), 1);
    }

    #[test]
    fn test_nested_file_gets_one_prefix_per_level() {
        let r = rewriter();
        let (out, _) = r.rewrite("[a](#ownership) and [b](#ownership)", "crypto/keys.md");
        assert_eq!(out, "[a](../core/ownership.md) and [b](../core/ownership.md)");
        assert_eq!(out.matches("../").count(), 2);

        let (deep, _) = r.rewrite("[a](#ownership)", "crypto/extra/keys.md");
        assert_eq!(deep, "[a](../../core/ownership.md)");
    }

    #[test]
    fn test_unknown_anchor_untouched() {
        let content = "[x](#nowhere) and [y](other.md#ownership)";
        let (out, rewrites) = rewriter().rewrite(content, "a/b.md");
        assert_eq!(out, content);
        assert!(rewrites.is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_tree_in_place() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("crypto")).unwrap();
        std::fs::write(dir.path().join("crypto/keys.md"), "# Keys\n[o](#ownership)\n").unwrap();
        std::fs::write(dir.path().join("intro.md"), "# Intro\nnothing here\n").unwrap();

        let rewrites = rewriter().rewrite_tree(dir.path()).await.unwrap();
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].file, "crypto/keys.md");

        let updated = std::fs::read_to_string(dir.path().join("crypto/keys.md")).unwrap();
        assert!(updated.contains("[o](../core/ownership.md)"));
    }
}
