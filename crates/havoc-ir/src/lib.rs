//! Intermediate representation and chaos engine for the Havoc compiler lab.
//!
//! This crate owns everything between the parsed AST and execution:
//! - A linear+structured instruction model (`IF`/`WHILE` carry nested blocks)
//! - AST → IR lowering
//! - A seeded Lehmer PRNG and per-run chaos plan
//! - Five budget-constrained, semantics-preserving rewrite passes
//! - Snapshot capture between passes for diffing and audit

pub mod budget;
pub mod chaos;
pub mod instruction;
pub mod lower;
pub mod planner;
pub mod program;
pub mod rng;
pub mod snapshot;
pub mod validation;

pub use budget::{BudgetKind, BudgetTracker, ChaosBudget};
pub use chaos::{apply_chaos, ChaosOutcome, TransformCount};
pub use instruction::{BinaryOp, InstrKind, Instruction, Operand};
pub use lower::generate_ir;
pub use planner::{generate_plan, ChaosPlan, Weights};
pub use program::ProgramIr;
pub use rng::ChaosRng;
pub use snapshot::Snapshot;
pub use validation::validate_ir;
