//! AST node types produced by the upstream parser.
//!
//! The core consumes this tree; it never builds one itself. `main`'s body is
//! lowered inline while other function declarations ride along as AST in the
//! program's function table, re-lowered on demand at call time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub id: String,
    pub is_array: bool,
}

impl Param {
    pub fn scalar(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_array: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

/// One declarator of a variable declaration (`int x = 5, y;` has two).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub id: String,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Function(FunctionDecl),
    VariableDecl {
        declarations: Vec<Declarator>,
    },
    Assignment {
        id: String,
        init: Expr,
    },
    Return {
        argument: Option<Expr>,
    },
    If {
        test: Expr,
        consequent: Vec<Stmt>,
        alternate: Option<Vec<Stmt>>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Block {
        body: Vec<Stmt>,
    },
    ArrayAssignment {
        id: String,
        index: Expr,
        value: Expr,
    },
    Expression {
        expression: Expr,
    },
}

/// Binary operators the surface language supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    Greater,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// String literal, quotes already stripped
    Str(String),
    Identifier(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: String,
        arguments: Vec<Expr>,
    },
    /// Array element read, `arr[index]`
    Member {
        object: String,
        property: Box<Expr>,
    },
    /// `sizeof(expr)` — mocked for a 32-bit int target
    Sizeof {
        argument: Box<Expr>,
    },
}

impl Expr {
    pub fn number(n: f64) -> Self {
        Expr::Number(n)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier(name.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_builders() {
        let e = Expr::binary(BinOp::Add, Expr::ident("x"), Expr::number(1.0));
        match e {
            Expr::Binary { op, left, .. } => {
                assert_eq!(op, BinOp::Add);
                assert_eq!(*left, Expr::Identifier("x".to_string()));
            }
            _ => panic!("expected binary expression"),
        }
    }

    #[test]
    fn test_ast_serialization() {
        let program = Program::new(vec![Stmt::Assignment {
            id: "x".to_string(),
            init: Expr::number(5.0),
        }]);
        let json = serde_json::to_string(&program).unwrap();
        let deserialized: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, program);
    }
}
