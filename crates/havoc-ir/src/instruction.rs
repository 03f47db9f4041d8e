//! Instruction set for the chaos IR.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One operand slot: a numeric literal, a variable reference resolved at
/// execution time, or a string literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(f64),
    Var(String),
    Str(String),
}

impl Operand {
    pub fn var(name: impl Into<String>) -> Self {
        Operand::Var(name.into())
    }

    pub fn as_literal(&self) -> Option<f64> {
        match self {
            Operand::Literal(n) => Some(*n),
            _ => None,
        }
    }

    /// True for a literal whole number (the shape number encoding targets).
    pub fn is_integer_literal(&self) -> bool {
        matches!(self, Operand::Literal(n) if n.is_finite() && n.fract() == 0.0)
    }

    pub fn is_literal_zero(&self) -> bool {
        matches!(self, Operand::Literal(n) if *n == 0.0)
    }
}

/// Binary opcodes. All write their result to a target variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Xor,
    And,
    Mod,
    Less,
    Greater,
    Equals,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "ADD",
            BinaryOp::Sub => "SUB",
            BinaryOp::Mul => "MUL",
            BinaryOp::Div => "DIV",
            BinaryOp::Xor => "XOR",
            BinaryOp::And => "AND",
            BinaryOp::Mod => "MOD",
            BinaryOp::Less => "LESS",
            BinaryOp::Greater => "GREATER",
            BinaryOp::Equals => "EQUALS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ADD" => Some(BinaryOp::Add),
            "SUB" => Some(BinaryOp::Sub),
            "MUL" => Some(BinaryOp::Mul),
            "DIV" => Some(BinaryOp::Div),
            "XOR" => Some(BinaryOp::Xor),
            "AND" => Some(BinaryOp::And),
            "MOD" => Some(BinaryOp::Mod),
            "LESS" => Some(BinaryOp::Less),
            "GREATER" => Some(BinaryOp::Greater),
            "EQUALS" => Some(BinaryOp::Equals),
            _ => None,
        }
    }

    /// True if operand order does not affect the result
    pub fn is_commutative(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Mul)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instruction payload, one variant per opcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstrKind {
    Assign {
        target: String,
        value: Operand,
    },
    Binary {
        op: BinaryOp,
        target: String,
        left: Operand,
        right: Operand,
    },
    Return {
        value: Operand,
    },
    Break,
    Noop,
    /// Array element read: `target = object[index]`
    Load {
        target: String,
        object: String,
        index: Operand,
    },
    /// Array element write: `target[index] = value`
    Store {
        target: String,
        index: Operand,
        value: Operand,
    },
    Call {
        target: String,
        name: String,
        args: Vec<Operand>,
    },
    If {
        test: Operand,
        consequent: Vec<Instruction>,
        alternate: Option<Vec<Instruction>>,
    },
    While {
        test: Operand,
        body: Vec<Instruction>,
    },
    /// Emitted only by the external assembly path; executed for completeness.
    Print {
        value: Operand,
    },
}

/// A single IR instruction. `meta` marks chaos-introduced instructions with
/// the sub-step that produced them; it never affects execution semantics.
///
/// Serialization is hand-rolled rather than derived: human-readable formats
/// (e.g. JSON) omit `meta` entirely when absent, while binary formats (e.g.
/// bincode) always emit it — bincode isn't self-describing, so a field that
/// is sometimes present and sometimes not would desync the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub kind: InstrKind,
    pub meta: Option<String>,
}

impl Serialize for Instruction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        if serializer.is_human_readable() && self.meta.is_none() {
            let mut state = serializer.serialize_struct("Instruction", 1)?;
            state.serialize_field("kind", &self.kind)?;
            state.end()
        } else {
            let mut state = serializer.serialize_struct("Instruction", 2)?;
            state.serialize_field("kind", &self.kind)?;
            state.serialize_field("meta", &self.meta)?;
            state.end()
        }
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct InstructionShadow {
            kind: InstrKind,
            #[serde(default)]
            meta: Option<String>,
        }
        let shadow = InstructionShadow::deserialize(deserializer)?;
        Ok(Instruction {
            kind: shadow.kind,
            meta: shadow.meta,
        })
    }
}

impl Instruction {
    pub fn new(kind: InstrKind) -> Self {
        Self { kind, meta: None }
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn assign(target: impl Into<String>, value: Operand) -> Self {
        Self::new(InstrKind::Assign {
            target: target.into(),
            value,
        })
    }

    pub fn binary(op: BinaryOp, target: impl Into<String>, left: Operand, right: Operand) -> Self {
        Self::new(InstrKind::Binary {
            op,
            target: target.into(),
            left,
            right,
        })
    }

    pub fn ret(value: Operand) -> Self {
        Self::new(InstrKind::Return { value })
    }

    pub fn brk() -> Self {
        Self::new(InstrKind::Break)
    }

    pub fn noop() -> Self {
        Self::new(InstrKind::Noop)
    }

    /// Opcode name as it appears in custom rules and diagnostics.
    pub fn op_name(&self) -> &'static str {
        match &self.kind {
            InstrKind::Assign { .. } => "ASSIGN",
            InstrKind::Binary { op, .. } => op.name(),
            InstrKind::Return { .. } => "RETURN",
            InstrKind::Break => "BREAK",
            InstrKind::Noop => "NOOP",
            InstrKind::Load { .. } => "LOAD",
            InstrKind::Store { .. } => "STORE",
            InstrKind::Call { .. } => "CALL",
            InstrKind::If { .. } => "IF",
            InstrKind::While { .. } => "WHILE",
            InstrKind::Print { .. } => "PRINT",
        }
    }

    /// The variable this instruction writes, if any.
    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            InstrKind::Assign { target, .. }
            | InstrKind::Binary { target, .. }
            | InstrKind::Load { target, .. }
            | InstrKind::Store { target, .. }
            | InstrKind::Call { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn is_chaos_introduced(&self) -> bool {
        self.meta.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_predicates() {
        assert!(Operand::Literal(5.0).is_integer_literal());
        assert!(!Operand::Literal(5.5).is_integer_literal());
        assert!(!Operand::var("x").is_integer_literal());

        assert!(Operand::Literal(0.0).is_literal_zero());
        assert!(!Operand::Literal(1.0).is_literal_zero());
        assert!(!Operand::var("x").is_literal_zero());
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(BinaryOp::Add.name(), "ADD");
        assert_eq!(BinaryOp::from_name("XOR"), Some(BinaryOp::Xor));
        assert_eq!(BinaryOp::from_name("NOPE"), None);

        assert!(BinaryOp::Add.is_commutative());
        assert!(BinaryOp::Mul.is_commutative());
        assert!(!BinaryOp::Sub.is_commutative());
    }

    #[test]
    fn test_instruction_builders() {
        let inst = Instruction::assign("x", Operand::Literal(5.0));
        assert_eq!(inst.op_name(), "ASSIGN");
        assert_eq!(inst.target(), Some("x"));
        assert!(!inst.is_chaos_introduced());

        let inst = Instruction::binary(
            BinaryOp::Add,
            "sum",
            Operand::var("a"),
            Operand::var("b"),
        )
        .with_meta("CHAOS_SUBST_FINAL");
        assert_eq!(inst.op_name(), "ADD");
        assert!(inst.is_chaos_introduced());

        assert_eq!(Instruction::brk().target(), None);
    }

    #[test]
    fn test_instruction_serialization() {
        let inst = Instruction::assign("x", Operand::Literal(5.0));
        let json = serde_json::to_string(&inst).unwrap();
        // meta is omitted entirely when absent
        assert!(!json.contains("meta"));
        let back: Instruction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inst);
    }
}
