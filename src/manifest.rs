//! The book manifest: every lookup table the splitter, the rewriter and the
//! validators consult, owned in one place and passed around by reference.
//!
//! `BookManifest::default()` carries the tables for the embedded Rust
//! tutorial this tool was written for. A JSON manifest supplied with
//! `--manifest` replaces any table it names; omitted keys keep the defaults.

use crate::error::{BookSplitterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub title: String,
    pub dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsectionEntry {
    pub title: String,
    pub file: String,
}

/// How a subsection title was resolved to a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup<'a> {
    Exact(&'a str),
    /// The title only occurs inside a longer manifest key.
    Contained { key: &'a str, file: &'a str },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileSettings {
    pub target: String,
    pub timeout_secs: u64,
    pub dependencies: String,
    pub memory_layout: String,
    pub skip_markers: Vec<String>,
    pub min_lines: usize,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            target: "thumbv7em-none-eabihf".to_string(),
            timeout_secs: 20,
            dependencies: [
                r#"cortex-m = "0.7""#,
                r#"cortex-m-rt = "0.7""#,
                r#"panic-halt = "0.2""#,
                r#"heapless = "0.7""#,
                r#"chacha20poly1305 = { version = "0.10", default-features = false }"#,
                r#"aes-gcm = { version = "0.10", default-features = false }"#,
                r#"sha2 = { version = "0.10", default-features = false }"#,
                r#"subtle = { version = "2.5", default-features = false }"#,
                r#"zeroize = { version = "1.6", default-features = false, features = ["derive"] }"#,
            ]
            .join("\n"),
            memory_layout: "MEMORY\n{\n  FLASH : ORIGIN = 0x08000000, LENGTH = 256K\n  RAM : ORIGIN = 0x20000000, LENGTH = 64K\n}\n"
                .to_string(),
            skip_markers: [
                "// C code",
                "// approach:",
                "memory.x",
                "MEMORY {",
                "...",
                "error:",
                "BUG:",
                "// ERROR:",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_lines: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookManifest {
    pub chapters: Vec<ChapterEntry>,
    pub subsections: Vec<SubsectionEntry>,
    pub anchors: BTreeMap<String, String>,
    pub concepts: Vec<String>,
    pub expected_cross_refs: BTreeMap<String, Vec<String>>,
    pub compile: CompileSettings,
}

fn pairs<T>(entries: &[(&str, &str)], make: impl Fn(String, String) -> T) -> Vec<T> {
    entries
        .iter()
        .map(|(a, b)| make(a.to_string(), b.to_string()))
        .collect()
}

impl Default for BookManifest {
    fn default() -> Self {
        let chapters = pairs(
            &[
                ("1. Quick Reference", "quick-reference"),
                ("2. Environment Setup", "environment-setup"),
                ("3. Core Language Concepts", "core-concepts"),
                ("4. Embedded-Specific Patterns", "embedded-patterns"),
                ("5. Cryptography Implementation", "cryptography"),
                ("6. Migration and Integration", "migration"),
            ],
            |title, dir| ChapterEntry { title, dir },
        );

        let subsections = pairs(
            &[
                ("1.1 C-to-Rust Syntax Mapping", "syntax-mapping.md"),
                ("1.2 Memory and Pointer Patterns", "memory-patterns.md"),
                ("1.3 Control Flow and Functions", "control-flow.md"),
                ("1.4 Error Handling Patterns", "error-handling.md"),
                ("1.5 Crypto-Specific Quick Reference", "crypto-reference.md"),
                ("1.6 Embedded-Specific Quick Reference", "embedded-reference.md"),
                ("1.7 Critical Differences and Gotchas", "gotchas.md"),
                ("2.1 Rust Installation and Toolchain", "installation.md"),
                ("2.2 Target Configuration", "target-config.md"),
                ("2.3 Project Structure and Dependencies", "project-structure.md"),
                ("2.4 Build Configuration", "build-config.md"),
                ("2.5 Verification and Testing", "verification.md"),
                ("3.1 Ownership and Memory Management", "ownership.md"),
                ("3.2 Error Handling Without Exceptions", "error-handling.md"),
                ("3.3 Type System Advantages", "type-system.md"),
                ("3.4 Advanced Type System Features", "advanced-types.md"),
                ("3.5 Functional Programming and Data Processing", "functional.md"),
                ("3.6 Memory Model Differences", "memory-model.md"),
                ("3.7 Safety Guarantees for Crypto", "safety.md"),
                ("4.1 No-std Programming Essentials", "no-std.md"),
                ("4.2 Hardware Abstraction Patterns", "hardware-abstraction.md"),
                ("4.3 Interrupt Handling", "interrupts.md"),
                ("4.4 Static Memory Management", "static-memory.md"),
                ("4.5 DMA and Hardware Integration", "dma-integration.md"),
                ("5.1 Secure Coding Patterns", "secure-patterns.md"),
                ("5.2 Constant-Time Implementations", "constant-time.md"),
                ("5.3 Key Management and Zeroization", "key-management.md"),
                ("5.4 Hardware Crypto Acceleration", "hardware-crypto.md"),
                ("5.5 Side-Channel Mitigations", "side-channels.md"),
                ("6.1 Incremental Migration Strategies", "strategies.md"),
                ("6.2 FFI Integration with C Libraries", "ffi-integration.md"),
                ("6.3 Testing and Validation", "testing.md"),
                ("6.4 Debugging and Tooling", "debugging.md"),
                ("6.5 Performance Considerations", "performance.md"),
            ],
            |title, file| SubsectionEntry { title, file },
        );

        let anchors: BTreeMap<String, String> = [
            ("quick-reference", "quick-reference/README.md"),
            ("environment-setup", "environment-setup/README.md"),
            ("core-language-concepts", "core-concepts/README.md"),
            ("embedded-specific-patterns", "embedded-patterns/README.md"),
            ("cryptography-implementation", "cryptography/README.md"),
            ("migration-and-integration", "migration/README.md"),
            ("constant-time-implementations", "cryptography/constant-time.md"),
            ("secure-coding-patterns", "cryptography/secure-patterns.md"),
            ("key-management-and-zeroization", "cryptography/key-management.md"),
            ("hardware-crypto-acceleration", "cryptography/hardware-crypto.md"),
            ("side-channel-mitigations", "cryptography/side-channels.md"),
            ("functional-programming-and-data-processing", "core-concepts/functional.md"),
            ("advanced-type-system-features", "core-concepts/advanced-types.md"),
            ("memory-model-differences", "core-concepts/memory-model.md"),
            ("ownership-and-memory-management", "core-concepts/ownership.md"),
            ("error-handling-without-exceptions", "core-concepts/error-handling.md"),
            ("type-system-overview", "core-concepts/type-system.md"),
            ("safety-guarantees-for-crypto", "core-concepts/safety.md"),
            ("incremental-migration-strategies", "migration/strategies.md"),
            ("ffi-integration-with-c-libraries", "migration/ffi-integration.md"),
            ("testing-and-validation", "migration/testing.md"),
            ("debugging-and-tooling", "migration/debugging.md"),
            ("performance-considerations", "migration/performance.md"),
            ("no-std-programming-essentials", "embedded-patterns/no-std.md"),
            ("hardware-abstraction-patterns", "embedded-patterns/hardware-abstraction.md"),
            ("interrupt-handling", "embedded-patterns/interrupts.md"),
            ("static-memory-management", "embedded-patterns/static-memory.md"),
            ("dma-and-hardware-integration", "embedded-patterns/dma-integration.md"),
            ("c-to-rust-syntax-mapping", "quick-reference/syntax-mapping.md"),
            ("memory-and-pointer-patterns", "quick-reference/memory-patterns.md"),
            ("control-flow-and-functions", "quick-reference/control-flow.md"),
            ("error-handling-patterns", "quick-reference/error-handling.md"),
            ("crypto-specific-quick-reference", "quick-reference/crypto-reference.md"),
            ("embedded-specific-quick-reference", "quick-reference/embedded-reference.md"),
            ("critical-differences-and-gotchas", "quick-reference/gotchas.md"),
            ("rust-installation-and-toolchain", "environment-setup/installation.md"),
            ("target-configuration", "environment-setup/target-config.md"),
            ("project-structure-and-dependencies", "environment-setup/project-structure.md"),
            ("build-configuration", "environment-setup/build-config.md"),
            ("verification-and-testing", "environment-setup/verification.md"),
        ]
        .iter()
        .map(|(a, p)| (a.to_string(), p.to_string()))
        .collect();

        let concepts = [
            "ownership",
            "borrowing",
            "memory safety",
            "no_std",
            "embedded",
            "cryptography",
            "constant-time",
            "side-channel",
            "zeroization",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let expected_cross_refs = [
            ("quick-reference", &["core-concepts", "embedded-patterns", "cryptography"][..]),
            ("environment-setup", &["quick-reference"][..]),
            ("core-concepts", &["quick-reference", "embedded-patterns", "cryptography"][..]),
            ("embedded-patterns", &["quick-reference", "core-concepts"][..]),
            ("cryptography", &["quick-reference", "core-concepts", "embedded-patterns"][..]),
            (
                "migration",
                &["quick-reference", "core-concepts", "embedded-patterns", "cryptography"][..],
            ),
        ]
        .iter()
        .map(|(from, to)| (from.to_string(), to.iter().map(|t| t.to_string()).collect()))
        .collect();

        Self {
            chapters,
            subsections,
            anchors,
            concepts,
            expected_cross_refs,
            compile: CompileSettings::default(),
        }
    }
}

impl BookManifest {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BookSplitterError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let manifest: BookManifest =
            serde_json::from_str(&raw).map_err(|e| BookSplitterError::Manifest {
                reason: format!("{}: {}", path.display(), e),
            })?;
        manifest.check()?;

        info!(
            "Loaded manifest {} ({} chapters, {} subsections, {} anchors)",
            path.display(),
            manifest.chapters.len(),
            manifest.subsections.len(),
            manifest.anchors.len()
        );
        Ok(manifest)
    }

    /// Loads `path` when given, the built-in tables otherwise.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::default()),
        }
    }

    fn check(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for chapter in &self.chapters {
            if chapter.dir.trim().is_empty() || chapter.dir.contains("..") {
                return Err(BookSplitterError::Manifest {
                    reason: format!("chapter '{}' has an invalid directory", chapter.title),
                });
            }
            if !seen.insert(chapter.title.as_str()) {
                return Err(BookSplitterError::Manifest {
                    reason: format!("chapter '{}' is listed twice", chapter.title),
                });
            }
        }
        Ok(())
    }

    /// Exact title match only.
    pub fn chapter_dir(&self, title: &str) -> Option<&str> {
        self.chapters
            .iter()
            .find(|c| c.title == title)
            .map(|c| c.dir.as_str())
    }

    pub fn chapter_dirs(&self) -> Vec<&str> {
        self.chapters.iter().map(|c| c.dir.as_str()).collect()
    }

    /// Exact match first; otherwise the first key that contains the title.
    pub fn subsection_file(&self, title: &str) -> Option<FileLookup<'_>> {
        if let Some(entry) = self.subsections.iter().find(|s| s.title == title) {
            return Some(FileLookup::Exact(&entry.file));
        }
        if title.trim().is_empty() {
            return None;
        }
        self.subsections
            .iter()
            .find(|s| s.title.contains(title))
            .map(|s| FileLookup::Contained {
                key: &s.title,
                file: &s.file,
            })
    }

    /// Manifest anchors take precedence over the derived ones.
    pub fn anchor_table(&self, derived: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut table = derived.clone();
        table.extend(self.anchors.iter().map(|(k, v)| (k.clone(), v.clone())));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables() {
        let manifest = BookManifest::default();
        assert_eq!(manifest.chapters.len(), 6);
        assert_eq!(manifest.chapter_dir("5. Cryptography Implementation"), Some("cryptography"));
        assert_eq!(manifest.chapter_dir("5. Cryptography"), None);
    }

    #[test]
    fn test_subsection_lookup_prefers_exact_match() {
        let manifest = BookManifest {
            subsections: vec![
                SubsectionEntry {
                    title: "Error Handling Without Exceptions".to_string(),
                    file: "long.md".to_string(),
                },
                SubsectionEntry {
                    title: "Error Handling".to_string(),
                    file: "short.md".to_string(),
                },
            ],
            ..BookManifest::default()
        };

        assert_eq!(
            manifest.subsection_file("Error Handling"),
            Some(FileLookup::Exact("short.md"))
        );
        assert_eq!(
            manifest.subsection_file("Without Exceptions"),
            Some(FileLookup::Contained {
                key: "Error Handling Without Exceptions",
                file: "long.md"
            })
        );
        assert_eq!(manifest.subsection_file("Unrelated"), None);
        assert_eq!(manifest.subsection_file(""), None);
    }

    #[test]
    fn test_anchor_table_prefers_manifest() {
        let manifest = BookManifest::default();
        let mut derived = BTreeMap::new();
        derived.insert("interrupt-handling".to_string(), "elsewhere.md".to_string());
        derived.insert("new-anchor".to_string(), "x/new.md".to_string());

        let table = manifest.anchor_table(&derived);
        assert_eq!(table["interrupt-handling"], "embedded-patterns/interrupts.md");
        assert_eq!(table["new-anchor"], "x/new.md");
    }

    #[tokio::test]
    async fn test_partial_manifest_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        std::fs::write(
            &path,
            r#"{"chapters": [{"title": "1. Chapter One", "dir": "one"}]}"#,
        )
        .unwrap();

        let manifest = BookManifest::load(&path).await.unwrap();
        assert_eq!(manifest.chapters.len(), 1);
        assert_eq!(manifest.compile.target, "thumbv7em-none-eabihf");
        assert!(!manifest.concepts.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_manifest_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        std::fs::write(&path, r#"{"chapters": [{"title": "A", "dir": "../out"}]}"#).unwrap();

        let result = BookManifest::load(&path).await;
        assert!(matches!(result, Err(BookSplitterError::Manifest { .. })));
    }
}
