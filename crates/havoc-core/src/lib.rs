//! Core types and utilities for the Havoc chaos-compiler lab.

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod error;

pub use config::*;
pub use diagnostics::{Diagnostic, DiagnosticSink, Severity};
pub use error::{Error, Result};
