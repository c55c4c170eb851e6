use crate::error::{BookSplitterError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// The emitted book source tree, loaded into memory for the validators.
///
/// Keys are root-relative paths using `/` separators.
#[derive(Debug, Clone, Default)]
pub struct BookCorpus {
    pub root: PathBuf,
    pub files: BTreeMap<String, String>,
    pub assets: BTreeSet<String>,
}

impl BookCorpus {
    pub async fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(BookSplitterError::FileNotFound {
                path: root.display().to_string(),
            });
        }

        let mut corpus = BookCorpus {
            root: root.to_path_buf(),
            ..Default::default()
        };

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = relative_key(root, entry.path());
            if rel.ends_with(".md") {
                match fs::read_to_string(entry.path()).await {
                    Ok(content) => {
                        corpus.files.insert(rel.clone(), content);
                    }
                    Err(e) => warn!("Error loading {}: {}", entry.path().display(), e),
                }
            }
            corpus.assets.insert(rel);
        }

        info!(
            "Loaded {} markdown files ({} files total) from {}",
            corpus.files.len(),
            corpus.assets.len(),
            root.display()
        );
        Ok(corpus)
    }

    pub fn from_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let files: BTreeMap<String, String> =
            files.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let assets = files.keys().cloned().collect();
        debug!("Built in-memory corpus with {} files", files.len());
        BookCorpus {
            root: PathBuf::new(),
            files,
            assets,
        }
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.files.contains_key(rel) || self.assets.contains(rel)
    }

    pub fn combined(&self) -> String {
        self.files.values().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// `root`-relative path of `path` with forward slashes.
pub fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves `target` relative to the directory of `source`, folding `./`
/// and `../`. Returns `None` when the path climbs above the root.
pub fn resolve_relative(source: &str, target: &str) -> Option<String> {
    let mut parts: Vec<&str> = source.split('/').collect();
    parts.pop();

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }

    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("SUMMARY.md", "intro.md").as_deref(), Some("intro.md"));
        assert_eq!(
            resolve_relative("core/ownership.md", "./safety.md").as_deref(),
            Some("core/safety.md")
        );
        assert_eq!(
            resolve_relative("core/ownership.md", "../crypto/keys.md").as_deref(),
            Some("crypto/keys.md")
        );
        assert_eq!(
            resolve_relative("a/b/c.md", "../../top.md").as_deref(),
            Some("top.md")
        );
        assert_eq!(resolve_relative("top.md", "../escape.md"), None);
    }

    #[tokio::test]
    async fn test_load_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("chapter")).unwrap();
        std::fs::write(dir.path().join("SUMMARY.md"), "# Summary\n").unwrap();
        std::fs::write(dir.path().join("chapter/README.md"), "# Chapter\n").unwrap();
        std::fs::write(dir.path().join("chapter/diagram.png"), [0u8; 4]).unwrap();

        let corpus = BookCorpus::load(dir.path()).await.unwrap();
        assert_eq!(corpus.files.len(), 2);
        assert!(corpus.files.contains_key("chapter/README.md"));
        assert!(corpus.exists("chapter/diagram.png"));
        assert!(!corpus.files.contains_key("chapter/diagram.png"));
    }

    #[tokio::test]
    async fn test_load_missing_root() {
        let result = BookCorpus::load(Path::new("/no/such/book/src")).await;
        assert!(matches!(result, Err(BookSplitterError::FileNotFound { .. })));
    }
}
