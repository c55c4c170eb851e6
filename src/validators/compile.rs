use super::finish;
use crate::error::Result;
use crate::manifest::CompileSettings;
use crate::services::toolchain::ExternalTool;
use crate::types::{CodeBlock, CompileOutcome, ValidationResult};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

const TEST_NAME: &str = "Code Compilation";

/// Lines of compiler output kept for a failed block.
const STDERR_TAIL: usize = 20;

/// Why `code` should not be handed to the compiler, if at all.
pub fn skip_reason(code: &str, settings: &CompileSettings) -> Option<String> {
    if let Some(marker) = settings.skip_markers.iter().find(|m| code.contains(m.as_str())) {
        return Some(format!("contains skip marker '{}'", marker));
    }
    let lines = code.trim().lines().count();
    if lines < settings.min_lines {
        return Some(format!("only {} line(s)", lines));
    }
    None
}

/// True when the block already declares itself a bare-metal binary.
pub fn is_standalone(code: &str) -> bool {
    code.contains("#![no_std]") && (code.contains("#![no_main]") || code.contains("#[entry]"))
}

/// Source for `src/main.rs`: standalone blocks verbatim, everything else
/// inside a minimal no-std entry skeleton.
pub fn prepare_source(code: &str) -> String {
    if is_standalone(code) {
        return code.to_string();
    }
    format!(
        "#![no_std]\n#![no_main]\n\nuse panic_halt as _;\nuse cortex_m_rt::entry;\n\n{}\n\n#[entry]\nfn main() -> ! {{\n    loop {{\n        cortex_m::asm::nop();\n    }}\n}}\n",
        code.trim_end()
    )
}

fn cargo_manifest(settings: &CompileSettings) -> String {
    format!(
        "[package]\nname = \"snippet-check\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[dependencies]\n{}\n\n[profile.dev]\npanic = \"abort\"\n\n[profile.release]\npanic = \"abort\"\n",
        settings.dependencies
    )
}

fn cargo_config(settings: &CompileSettings) -> String {
    format!(
        "[target.{target}]\nrustflags = [\"-C\", \"link-arg=-Tlink.x\"]\n\n[build]\ntarget = \"{target}\"\n",
        target = settings.target
    )
}

/// Writes a throwaway embedded project around `code` into `dir`.
pub async fn write_project(dir: &Path, code: &str, settings: &CompileSettings) -> Result<()> {
    fs::create_dir_all(dir.join("src")).await?;
    fs::create_dir_all(dir.join(".cargo")).await?;
    fs::write(dir.join("Cargo.toml"), cargo_manifest(settings)).await?;
    fs::write(dir.join("memory.x"), &settings.memory_layout).await?;
    fs::write(dir.join(".cargo").join("config.toml"), cargo_config(settings)).await?;
    fs::write(dir.join("src").join("main.rs"), prepare_source(code)).await?;
    Ok(())
}

/// Decides whether a prepared project compiles.
#[allow(async_fn_in_trait)]
pub trait CompileOracle {
    async fn check(&self, project_dir: &Path) -> Result<CompileOutcome>;
}

/// `cargo check --target <triple>` under a timeout.
pub struct CargoOracle {
    cargo: ExternalTool,
    target: String,
    timeout: Duration,
}

impl CargoOracle {
    pub fn new(settings: &CompileSettings) -> Self {
        Self {
            cargo: ExternalTool::new("cargo"),
            target: settings.target.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn tool(&self) -> &ExternalTool {
        &self.cargo
    }
}

impl CompileOracle for CargoOracle {
    async fn check(&self, project_dir: &Path) -> Result<CompileOutcome> {
        let run = self
            .cargo
            .run(
                &["check", "--target", self.target.as_str()],
                Some(project_dir),
                self.timeout,
            )
            .await?;

        if run.timed_out {
            return Ok(CompileOutcome::TimedOut {
                seconds: self.timeout.as_secs(),
            });
        }
        if run.success {
            return Ok(CompileOutcome::Passed);
        }

        let lines: Vec<&str> = run.stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");
        Ok(CompileOutcome::Failed { stderr: tail })
    }
}

pub struct CompileTester<'s, O> {
    settings: &'s CompileSettings,
    oracle: O,
}

impl<'s, O: CompileOracle> CompileTester<'s, O> {
    pub fn new(settings: &'s CompileSettings, oracle: O) -> Self {
        Self { settings, oracle }
    }

    /// Skipped blocks never reach the oracle.
    pub async fn test_block(&self, block: &CodeBlock) -> Result<CompileOutcome> {
        if let Some(reason) = skip_reason(&block.code, self.settings) {
            debug!("Skipping {} line {}: {}", block.file, block.line, reason);
            return Ok(CompileOutcome::Skipped { reason });
        }

        let scratch = tempfile::tempdir()?;
        write_project(scratch.path(), &block.code, self.settings).await?;
        self.oracle.check(scratch.path()).await
    }

    /// Tests every `rust` block. Per-block failures are recorded and the
    /// run continues.
    pub async fn test_blocks(&self, blocks: &[CodeBlock]) -> ValidationResult {
        let rust_blocks: Vec<&CodeBlock> = blocks
            .iter()
            .filter(|b| b.language.eq_ignore_ascii_case("rust"))
            .collect();
        info!("Compile-testing {} rust blocks", rust_blocks.len());

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let (mut passed, mut skipped, mut failed, mut timed_out) = (0, 0, 0, 0);

        for block in &rust_blocks {
            match self.test_block(block).await {
                Ok(CompileOutcome::Passed) => passed += 1,
                Ok(CompileOutcome::Skipped { .. }) => skipped += 1,
                Ok(CompileOutcome::Failed { stderr }) => {
                    failed += 1;
                    let first = stderr
                        .lines()
                        .find(|l| l.trim_start().starts_with("error"))
                        .unwrap_or("compiler reported errors");
                    errors.push(format!(
                        "Compilation failed in {} line {}: {}",
                        block.file, block.line, first
                    ));
                }
                Ok(CompileOutcome::TimedOut { seconds }) => {
                    timed_out += 1;
                    errors.push(format!(
                        "Compilation timed out after {}s in {} line {}",
                        seconds, block.file, block.line
                    ));
                }
                Err(e) => {
                    failed += 1;
                    warn!("Could not test {} line {}: {}", block.file, block.line, e);
                    errors.push(format!("Could not test {} line {}: {}", block.file, block.line, e));
                }
            }
        }

        if rust_blocks.is_empty() {
            warnings.push("No rust code blocks found".to_string());
        }

        let details = format!(
            "Rust blocks: {}, compiled: {}, skipped: {}, failed: {}, timed out: {} (target {})",
            rust_blocks.len(),
            passed,
            skipped,
            failed,
            timed_out,
            self.settings.target
        );

        finish(TEST_NAME, details, errors, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOracle {
        calls: AtomicUsize,
        outcome: CompileOutcome,
    }

    impl CountingOracle {
        fn new(outcome: CompileOutcome) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome,
            }
        }
    }

    impl CompileOracle for &CountingOracle {
        async fn check(&self, project_dir: &Path) -> Result<CompileOutcome> {
            assert!(project_dir.join("Cargo.toml").exists());
            assert!(project_dir.join("memory.x").exists());
            assert!(project_dir.join(".cargo/config.toml").exists());
            assert!(project_dir.join("src/main.rs").exists());
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    fn block(code: &str) -> CodeBlock {
        CodeBlock {
            file: "ch/a.md".to_string(),
            language: "rust".to_string(),
            code: code.to_string(),
            line: 7,
        }
    }

    #[tokio::test]
    async fn test_skip_marker_never_reaches_oracle() {
        let settings = CompileSettings::default();
        let oracle = CountingOracle::new(CompileOutcome::Passed);
        let tester = CompileTester::new(&settings, &oracle);

        let outcome = tester
            .test_block(&block("fn main() {\n    ...\n}"))
            .await
            .unwrap();
        assert!(matches!(outcome, CompileOutcome::Skipped { .. }));
        assert!(outcome.is_pass());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_short_block_is_skipped() {
        let settings = CompileSettings::default();
        let oracle = CountingOracle::new(CompileOutcome::Passed);
        let tester = CompileTester::new(&settings, &oracle);

        let outcome = tester.test_block(&block("let x = 1;")).await.unwrap();
        assert!(matches!(outcome, CompileOutcome::Skipped { .. }));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_are_reported_and_run_continues() {
        let settings = CompileSettings::default();
        let oracle = CountingOracle::new(CompileOutcome::Failed {
            stderr: "   Compiling x\nerror[E0425]: cannot find value `y`".to_string(),
        });
        let tester = CompileTester::new(&settings, &oracle);

        let blocks = vec![
            block("fn a() {\n    y\n}"),
            block("fn b() {\n    y\n}"),
            block("// C code\nint x;"),
            CodeBlock {
                language: "c".to_string(),
                ..block("int main() {\n}")
            },
        ];
        let result = tester.test_blocks(&blocks).await;

        assert!(!result.passed);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("ch/a.md line 7: error[E0425]"));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
        assert!(result.details.contains("skipped: 1"));
    }

    #[test]
    fn test_prepare_source_wraps_fragments() {
        let wrapped = prepare_source("fn helper() -> u32 {\n    1\n}");
        assert!(wrapped.starts_with("#![no_std]\n#![no_main]"));
        assert!(wrapped.contains("use panic_halt as _;"));
        assert!(wrapped.contains("fn helper() -> u32"));
        assert!(wrapped.contains("#[entry]\nfn main() -> !"));

        let standalone = "#![no_std]\n#![no_main]\n\n#[entry]\nfn main() -> ! { loop {} }";
        assert_eq!(prepare_source(standalone), standalone);
    }

    #[tokio::test]
    async fn test_write_project_layout() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CompileSettings::default();
        write_project(dir.path(), "fn a() {}\nfn b() {}", &settings)
            .await
            .unwrap();

        let config = std::fs::read_to_string(dir.path().join(".cargo/config.toml")).unwrap();
        assert!(config.contains("[target.thumbv7em-none-eabihf]"));
        let manifest = std::fs::read_to_string(dir.path().join("Cargo.toml")).unwrap();
        assert!(manifest.contains("cortex-m-rt"));
        let memory = std::fs::read_to_string(dir.path().join("memory.x")).unwrap();
        assert!(memory.contains("FLASH"));
    }
}
