//! IR execution for the Havoc compiler lab.
//!
//! This crate provides the execution side of the pipeline:
//! - A recursive tree-walking interpreter over the chaos IR
//! - Printf-style stdout capture
//! - Function-call inlining against the AST side-table
//! - A differential verifier comparing original and transformed runs

pub mod executor;
pub mod value;
pub mod verify;

pub use executor::{execute_ir, ExecConfig, ExecResult, Executor, Functions, State};
pub use value::Value;
pub use verify::{check_equivalence, EquivalenceReport};
