//! Read-only checks over an emitted book tree.
//!
//! Every validator produces a [`ValidationResult`]; none of them touch the
//! files they inspect.

pub mod build;
pub mod code;
pub mod compile;
pub mod content;
pub mod links;
pub mod redundancy;
pub mod xref;

pub use build::BookBuildValidator;
pub use code::{bracket_balance_heuristic, CodeSyntaxValidator};
pub use compile::{CargoOracle, CompileOracle, CompileTester};
pub use content::ContentPreservationValidator;
pub use links::{LinkReport, LinkValidator};
pub use redundancy::{RedundancyDetector, RedundancyReport};
pub use xref::CrossReferenceValidator;

use crate::types::ValidationResult;

/// Assembles a result whose pass state follows from `errors`.
pub(crate) fn finish(
    test_name: &str,
    details: String,
    errors: Vec<String>,
    warnings: Vec<String>,
) -> ValidationResult {
    ValidationResult {
        test_name: test_name.to_string(),
        passed: errors.is_empty(),
        details,
        errors,
        warnings,
    }
}
