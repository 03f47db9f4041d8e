//! Configuration types for the chaos pipeline.

use serde::{Deserialize, Serialize};

/// How aggressively the chaos engine rewrites a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    None,
    Low,
    Medium,
    High,
}

impl Intensity {
    /// Scalar applied to every theme weight for this intensity.
    pub fn multiplier(&self) -> f64 {
        match self {
            Intensity::High => 1.0,
            Intensity::Medium => 0.7,
            Intensity::Low => 0.3,
            Intensity::None => 0.0,
        }
    }
}

/// Per-pass enable flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassToggles {
    pub number_encoding: bool,
    pub substitution: bool,
    pub opaque_predicates: bool,
    pub flattening: bool,
}

impl Default for PassToggles {
    fn default() -> Self {
        Self {
            number_encoding: true,
            substitution: true,
            opaque_predicates: true,
            flattening: true,
        }
    }
}

/// A user-authored rewrite rule: replace every instruction whose opcode
/// matches `source` with one instruction per opcode named in `target`
/// (comma-separated). Operand propagation is heuristic; unlike the built-in
/// passes, custom rules carry no semantic-equivalence guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRule {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Full configuration surface consumed by `apply_chaos`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChaosConfig {
    pub passes: PassToggles,
    pub custom_rules: Vec<CustomRule>,
}

/// Soft resource caps for one chaos run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosLimits {
    /// Maximum instructions a run may add
    pub max_new_instructions: u32,
    /// Maximum control-nesting depth
    pub max_control_depth: u32,
    /// Maximum number-encoding operations
    pub max_encoding_ops: u32,
}

impl Default for ChaosLimits {
    fn default() -> Self {
        Self {
            max_new_instructions: 30,
            max_control_depth: 3,
            max_encoding_ops: 10,
        }
    }
}
