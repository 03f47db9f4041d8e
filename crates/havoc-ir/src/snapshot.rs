//! IR snapshots captured between passes.

use crate::program::ProgramIr;
use serde::{Deserialize, Serialize};

/// A structurally independent copy of the IR at one point in the pipeline.
/// Snapshots exist for diffing and audit only; passes always consume the
/// live IR, never a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub ir: ProgramIr,
}

impl Snapshot {
    pub fn capture(name: &str, ir: &ProgramIr) -> Self {
        Self {
            name: name.to_string(),
            ir: ir.clone(),
        }
    }
}
