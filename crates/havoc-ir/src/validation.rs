//! Validation for IR programs.

use crate::instruction::{InstrKind, Instruction};
use crate::program::ProgramIr;
use havoc_core::{Error, Result};

/// Validate that a program is well-formed. The chaos pipeline never
/// produces invalid IR itself; hosts use this to sanity-check IR they
/// assembled by hand before execution.
pub fn validate_ir(program: &ProgramIr) -> Result<()> {
    if program.functions.contains_key("main") {
        return Err(Error::Validation(
            "'main' is lowered inline and must not appear in the function table".to_string(),
        ));
    }

    for (name, decl) in &program.functions {
        if decl.body.is_empty() {
            return Err(Error::Validation(format!(
                "function '{}' has an empty body",
                name
            )));
        }
    }

    validate_block(&program.instructions)
}

fn validate_block(block: &[Instruction]) -> Result<()> {
    for instr in block {
        if let Some(target) = instr.target() {
            if target.is_empty() {
                return Err(Error::Validation(format!(
                    "{} instruction has an empty target",
                    instr.op_name()
                )));
            }
        }

        match &instr.kind {
            InstrKind::While { body, .. } => {
                if body.is_empty() {
                    return Err(Error::Validation("WHILE has an empty body".to_string()));
                }
                validate_block(body)?;
            }
            InstrKind::If {
                consequent,
                alternate,
                ..
            } => {
                validate_block(consequent)?;
                if let Some(alt) = alternate {
                    validate_block(alt)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Operand;
    use havoc_core::ast::FunctionDecl;

    #[test]
    fn test_valid_program() {
        let program = ProgramIr::with_instructions(vec![
            Instruction::assign("x", Operand::Literal(5.0)),
            Instruction::ret(Operand::var("x")),
        ]);
        assert!(validate_ir(&program).is_ok());
    }

    #[test]
    fn test_rejects_main_in_function_table() {
        let mut program = ProgramIr::new();
        program.add_function(FunctionDecl {
            name: "main".to_string(),
            params: vec![],
            body: vec![havoc_core::ast::Stmt::Return { argument: None }],
        });
        assert!(validate_ir(&program).is_err());
    }

    #[test]
    fn test_rejects_empty_while_body() {
        let program = ProgramIr::with_instructions(vec![Instruction::new(InstrKind::While {
            test: Operand::Literal(1.0),
            body: vec![],
        })]);
        assert!(validate_ir(&program).is_err());
    }

    #[test]
    fn test_rejects_empty_target() {
        let program =
            ProgramIr::with_instructions(vec![Instruction::assign("", Operand::Literal(1.0))]);
        assert!(validate_ir(&program).is_err());
    }

    #[test]
    fn test_recurses_into_nested_blocks() {
        let program = ProgramIr::with_instructions(vec![Instruction::new(InstrKind::If {
            test: Operand::var("c"),
            consequent: vec![Instruction::new(InstrKind::While {
                test: Operand::Literal(1.0),
                body: vec![],
            })],
            alternate: None,
        })]);
        assert!(validate_ir(&program).is_err());
    }
}
