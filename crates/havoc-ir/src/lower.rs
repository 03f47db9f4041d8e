//! AST to IR lowering.

use crate::instruction::{BinaryOp, InstrKind, Instruction, Operand};
use crate::program::ProgramIr;
use havoc_core::ast::{self, Expr, FunctionDecl, Stmt};
use std::collections::BTreeMap;

/// Lower a parsed program. `main`'s body becomes the instruction stream;
/// every other function declaration is stored as AST in the side-table and
/// lowered again at each call site during execution.
pub fn generate_ir(program: &ast::Program) -> ProgramIr {
    let mut ir = ProgramIr::new();
    for stmt in &program.body {
        lower_stmt(stmt, &mut ir.instructions, &mut ir.functions);
    }
    ir
}

/// Lower a statement list in isolation (used for function bodies at call
/// time, matching the uncached re-lowering the executor performs).
pub fn lower_block(stmts: &[Stmt]) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut functions = BTreeMap::new();
    for stmt in stmts {
        lower_stmt(stmt, &mut out, &mut functions);
    }
    out
}

fn lower_stmt(
    stmt: &Stmt,
    out: &mut Vec<Instruction>,
    functions: &mut BTreeMap<String, FunctionDecl>,
) {
    match stmt {
        Stmt::Function(decl) => {
            if decl.name == "main" {
                for s in &decl.body {
                    lower_stmt(s, out, functions);
                }
            } else {
                functions.insert(decl.name.clone(), decl.clone());
            }
        }
        Stmt::VariableDecl { declarations } => {
            for decl in declarations {
                let value = match &decl.init {
                    Some(init) => lower_expr(init, out, functions),
                    None => Operand::Literal(0.0),
                };
                out.push(Instruction::assign(&decl.id, value));
            }
        }
        Stmt::Assignment { id, init } => {
            let value = lower_expr(init, out, functions);
            out.push(Instruction::assign(id, value));
        }
        Stmt::Return { argument } => {
            let value = match argument {
                Some(expr) => lower_expr(expr, out, functions),
                None => Operand::Literal(0.0),
            };
            out.push(Instruction::ret(value));
        }
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            let test = lower_expr(test, out, functions);
            let mut cons = Vec::new();
            for s in consequent {
                lower_stmt(s, &mut cons, functions);
            }
            let alt = alternate.as_ref().map(|stmts| {
                let mut block = Vec::new();
                for s in stmts {
                    lower_stmt(s, &mut block, functions);
                }
                block
            });
            out.push(Instruction::new(InstrKind::If {
                test,
                consequent: cons,
                alternate: alt,
            }));
        }
        Stmt::While { test, body } => {
            let test = lower_expr(test, out, functions);
            let mut block = Vec::new();
            for s in body {
                lower_stmt(s, &mut block, functions);
            }
            out.push(Instruction::new(InstrKind::While { test, body: block }));
        }
        Stmt::Block { body } => {
            for s in body {
                lower_stmt(s, out, functions);
            }
        }
        Stmt::ArrayAssignment { id, index, value } => {
            let index = lower_expr(index, out, functions);
            let value = lower_expr(value, out, functions);
            out.push(Instruction::new(InstrKind::Store {
                target: id.clone(),
                index,
                value,
            }));
        }
        Stmt::Expression { expression } => {
            lower_expr(expression, out, functions);
        }
    }
}

fn lower_expr(
    expr: &Expr,
    out: &mut Vec<Instruction>,
    functions: &mut BTreeMap<String, FunctionDecl>,
) -> Operand {
    match expr {
        Expr::Number(n) => Operand::Literal(*n),
        Expr::Str(s) => Operand::Str(s.clone()),
        Expr::Identifier(name) => Operand::Var(name.clone()),
        Expr::Call { callee, arguments } => {
            let args = arguments
                .iter()
                .map(|a| lower_expr(a, out, functions))
                .collect();
            let temp = format!(
                "t{}",
                count_ops(out, &["ADD", "MUL", "SUB", "DIV", "CALL"])
            );
            out.push(Instruction::new(InstrKind::Call {
                target: temp.clone(),
                name: callee.clone(),
                args,
            }));
            Operand::Var(temp)
        }
        Expr::Binary { op, left, right } => {
            let left = lower_expr(left, out, functions);
            let right = lower_expr(right, out, functions);
            let temp = format!(
                "t{}",
                count_ops(out, &["ADD", "MUL", "SUB", "DIV", "LESS", "GREATER"])
            );
            out.push(Instruction::binary(
                lower_binop(*op),
                temp.clone(),
                left,
                right,
            ));
            Operand::Var(temp)
        }
        Expr::Member { object, property } => {
            let index = lower_expr(property, out, functions);
            let temp = format!("t{}", out.len());
            out.push(Instruction::new(InstrKind::Load {
                target: temp.clone(),
                object: object.clone(),
                index,
            }));
            Operand::Var(temp)
        }
        // Mocked for a 32-bit int target
        Expr::Sizeof { .. } => Operand::Literal(4.0),
    }
}

fn lower_binop(op: ast::BinOp) -> BinaryOp {
    match op {
        ast::BinOp::Add => BinaryOp::Add,
        ast::BinOp::Sub => BinaryOp::Sub,
        ast::BinOp::Mul => BinaryOp::Mul,
        ast::BinOp::Div => BinaryOp::Div,
        ast::BinOp::Less => BinaryOp::Less,
        ast::BinOp::Greater => BinaryOp::Greater,
    }
}

fn count_ops(out: &[Instruction], names: &[&str]) -> usize {
    out.iter().filter(|i| names.contains(&i.op_name())).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use havoc_core::ast::{BinOp, Declarator, Param, Program};

    fn main_fn(body: Vec<Stmt>) -> Program {
        Program::new(vec![Stmt::Function(FunctionDecl {
            name: "main".to_string(),
            params: vec![],
            body,
        })])
    }

    #[test]
    fn test_lower_assignment_and_return() {
        let program = main_fn(vec![
            Stmt::VariableDecl {
                declarations: vec![Declarator {
                    id: "x".to_string(),
                    init: Some(Expr::number(10.0)),
                }],
            },
            Stmt::Return {
                argument: Some(Expr::ident("x")),
            },
        ]);
        let ir = generate_ir(&program);

        assert_eq!(ir.len(), 2);
        assert_eq!(ir.instructions[0], Instruction::assign("x", Operand::Literal(10.0)));
        assert_eq!(ir.instructions[1], Instruction::ret(Operand::var("x")));
    }

    #[test]
    fn test_lower_arithmetic_temp_naming() {
        // sum = a + b; diff = sum - 1;
        let program = main_fn(vec![
            Stmt::Assignment {
                id: "sum".to_string(),
                init: Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b")),
            },
            Stmt::Assignment {
                id: "diff".to_string(),
                init: Expr::binary(BinOp::Sub, Expr::ident("sum"), Expr::number(1.0)),
            },
        ]);
        let ir = generate_ir(&program);

        // ADD t0; ASSIGN sum; SUB t1; ASSIGN diff
        assert_eq!(ir.len(), 4);
        assert_eq!(ir.instructions[0].op_name(), "ADD");
        assert_eq!(ir.instructions[0].target(), Some("t0"));
        assert_eq!(ir.instructions[2].op_name(), "SUB");
        assert_eq!(ir.instructions[2].target(), Some("t1"));
    }

    #[test]
    fn test_lower_uninitialized_declaration_defaults_to_zero() {
        let program = main_fn(vec![Stmt::VariableDecl {
            declarations: vec![Declarator {
                id: "x".to_string(),
                init: None,
            }],
        }]);
        let ir = generate_ir(&program);
        assert_eq!(ir.instructions[0], Instruction::assign("x", Operand::Literal(0.0)));
    }

    #[test]
    fn test_non_main_functions_go_to_side_table() {
        let program = Program::new(vec![
            Stmt::Function(FunctionDecl {
                name: "double".to_string(),
                params: vec![Param::scalar("n")],
                body: vec![Stmt::Return {
                    argument: Some(Expr::binary(
                        BinOp::Mul,
                        Expr::ident("n"),
                        Expr::number(2.0),
                    )),
                }],
            }),
            Stmt::Function(FunctionDecl {
                name: "main".to_string(),
                params: vec![],
                body: vec![Stmt::Return {
                    argument: Some(Expr::Call {
                        callee: "double".to_string(),
                        arguments: vec![Expr::number(21.0)],
                    }),
                }],
            }),
        ]);
        let ir = generate_ir(&program);

        assert!(ir.get_function("double").is_some());
        assert!(ir.get_function("main").is_none());
        // CALL t0; RETURN t0
        assert_eq!(ir.instructions[0].op_name(), "CALL");
        assert_eq!(ir.instructions[0].target(), Some("t0"));
        assert_eq!(ir.instructions[1], Instruction::ret(Operand::var("t0")));
    }

    #[test]
    fn test_lower_if_nests_blocks() {
        let program = main_fn(vec![Stmt::If {
            test: Expr::binary(BinOp::Less, Expr::ident("x"), Expr::number(10.0)),
            consequent: vec![Stmt::Assignment {
                id: "y".to_string(),
                init: Expr::number(1.0),
            }],
            alternate: Some(vec![Stmt::Assignment {
                id: "y".to_string(),
                init: Expr::number(2.0),
            }]),
        }]);
        let ir = generate_ir(&program);

        // LESS t0; IF
        assert_eq!(ir.len(), 2);
        match &ir.instructions[1].kind {
            InstrKind::If {
                test,
                consequent,
                alternate,
            } => {
                assert_eq!(test, &Operand::var("t0"));
                assert_eq!(consequent.len(), 1);
                assert_eq!(alternate.as_ref().unwrap().len(), 1);
            }
            other => panic!("expected IF, got {other:?}"),
        }
    }

    #[test]
    fn test_lower_array_store_and_load() {
        let program = main_fn(vec![
            Stmt::ArrayAssignment {
                id: "arr".to_string(),
                index: Expr::number(0.0),
                value: Expr::number(7.0),
            },
            Stmt::Assignment {
                id: "x".to_string(),
                init: Expr::Member {
                    object: "arr".to_string(),
                    property: Box::new(Expr::number(0.0)),
                },
            },
        ]);
        let ir = generate_ir(&program);

        assert_eq!(ir.instructions[0].op_name(), "STORE");
        assert_eq!(ir.instructions[1].op_name(), "LOAD");
        // member temp is named from the instruction count at that point
        assert_eq!(ir.instructions[1].target(), Some("t1"));
    }

    #[test]
    fn test_sizeof_lowers_to_four() {
        let program = main_fn(vec![Stmt::Assignment {
            id: "s".to_string(),
            init: Expr::Sizeof {
                argument: Box::new(Expr::ident("x")),
            },
        }]);
        let ir = generate_ir(&program);
        assert_eq!(ir.instructions[0], Instruction::assign("s", Operand::Literal(4.0)));
    }
}
