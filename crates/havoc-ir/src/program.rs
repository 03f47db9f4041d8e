//! Program-level IR container.

use crate::instruction::{InstrKind, Instruction};
use havoc_core::ast::FunctionDecl;
use havoc_core::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The instruction stream of `main` plus a side-table of non-`main`
/// function declarations (still AST; lowered on demand at call time).
/// Chaos passes rewrite only the instruction stream — the side-table is
/// carried through every pass and snapshot untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramIr {
    pub instructions: Vec<Instruction>,
    pub functions: BTreeMap<String, FunctionDecl>,
}

impl ProgramIr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            functions: BTreeMap::new(),
        }
    }

    pub fn add_function(&mut self, decl: FunctionDecl) {
        self.functions.insert(decl.name.clone(), decl);
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Count instructions including those nested in `IF`/`WHILE` blocks.
    pub fn total_instructions(&self) -> usize {
        count_block(&self.instructions)
    }

    /// Serialize the program to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a program from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn count_block(block: &[Instruction]) -> usize {
    block
        .iter()
        .map(|inst| match &inst.kind {
            InstrKind::If {
                consequent,
                alternate,
                ..
            } => {
                1 + count_block(consequent)
                    + alternate.as_deref().map(count_block).unwrap_or(0)
            }
            InstrKind::While { body, .. } => 1 + count_block(body),
            _ => 1,
        })
        .sum()
}
