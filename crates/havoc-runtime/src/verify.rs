//! Differential verification of chaos transformations.

use crate::executor::{ExecResult, Executor};
use havoc_ir::program::ProgramIr;
use serde::{Deserialize, Serialize};

/// Outcome of running an original and a transformed IR independently and
/// comparing both the selected value and the captured stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceReport {
    pub matches: bool,
    pub original: ExecResult,
    pub transformed: ExecResult,
}

/// Execute both programs from fresh state and compare results. This is the
/// semantic-equivalence oracle for the built-in passes; custom rules may
/// legitimately fail it.
pub fn check_equivalence(original: &ProgramIr, transformed: &ProgramIr) -> EquivalenceReport {
    let executor = Executor::default();
    let original = executor.run(original);
    let transformed = executor.run(transformed);
    let matches = original == transformed;

    if matches {
        tracing::debug!("differential check passed");
    } else {
        tracing::warn!(
            original = ?original,
            transformed = ?transformed,
            "differential check failed: transformed IR diverged"
        );
    }

    EquivalenceReport {
        matches,
        original,
        transformed,
    }
}
