//! Recursive tree-walking interpreter for the chaos IR.
//!
//! Execution is total by design: unresolved references read as 0, division
//! by zero divides by 1, and runaway loops are truncated at the iteration
//! cap. The original and any chaos-transformed IR must execute identically
//! here; that differential check is the pipeline's correctness oracle.

use crate::value::{format_number, Value};
use havoc_core::ast::FunctionDecl;
use havoc_ir::instruction::{BinaryOp, InstrKind, Instruction, Operand};
use havoc_ir::lower;
use havoc_ir::program::ProgramIr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variable store, shared by reference through one execution call tree.
pub type State = BTreeMap<String, Value>;

/// AST side-table consulted for call inlining.
pub type Functions = BTreeMap<String, FunctionDecl>;

/// What one top-level execution produced. `value` is the selected result
/// (PRINT output, else last RETURN, else `result`, else 0); captured
/// printf output is reported separately instead of overloading the value
/// slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    pub value: Value,
    pub stdout: Vec<String>,
}

/// Executor limits.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
    /// Hard cap on iterations of a single `WHILE`, the only safeguard
    /// against non-termination
    pub max_loop_iterations: u32,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1000,
        }
    }
}

/// Per-invocation result bookkeeping. Each recursive block execution gets
/// its own frame; sentinels and pending returns do not leak across `IF`
/// boundaries.
#[derive(Debug, Default)]
struct Frame {
    output: Option<Value>,
    return_value: Option<Value>,
}

enum Flow {
    Normal,
    Break,
    Return(Value),
}

pub struct Executor {
    config: ExecConfig,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecConfig::default())
    }
}

impl Executor {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Execute a program from a fresh state.
    pub fn run(&self, program: &ProgramIr) -> ExecResult {
        let mut state = State::new();
        let mut stdout = Vec::new();
        let value = self.run_frame(
            &program.instructions,
            &mut state,
            &mut stdout,
            &program.functions,
            false,
        );
        ExecResult { value, stdout }
    }

    /// Execute an instruction block against caller-provided state, stdout,
    /// and function table. `is_nested` controls `RETURN` semantics: nested
    /// frames short-circuit, the top level records the value and keeps
    /// scanning.
    pub fn run_with(
        &self,
        block: &[Instruction],
        state: &mut State,
        stdout: &mut Vec<String>,
        functions: &Functions,
        is_nested: bool,
    ) -> Value {
        self.run_frame(block, state, stdout, functions, is_nested)
    }

    fn run_frame(
        &self,
        block: &[Instruction],
        state: &mut State,
        stdout: &mut Vec<String>,
        functions: &Functions,
        is_nested: bool,
    ) -> Value {
        let mut frame = Frame::default();
        match self.exec_block(block, state, stdout, functions, is_nested, &mut frame) {
            Flow::Return(value) => value,
            _ => select_result(frame, state),
        }
    }

    fn exec_block(
        &self,
        block: &[Instruction],
        state: &mut State,
        stdout: &mut Vec<String>,
        functions: &Functions,
        is_nested: bool,
        frame: &mut Frame,
    ) -> Flow {
        for instr in block {
            match &instr.kind {
                InstrKind::Assign { target, value } => {
                    let v = resolve(value, state);
                    state.insert(target.clone(), v);
                }
                InstrKind::Binary {
                    op,
                    target,
                    left,
                    right,
                } => {
                    let l = resolve(left, state);
                    let r = resolve(right, state);
                    state.insert(target.clone(), eval_binary(*op, l, r));
                }
                InstrKind::Return { value } => {
                    let v = resolve(value, state);
                    frame.return_value = Some(v.clone());
                    if is_nested {
                        return Flow::Return(v);
                    }
                    // top level records the value and keeps scanning
                }
                InstrKind::Break => return Flow::Break,
                InstrKind::Noop => {}
                InstrKind::If {
                    test,
                    consequent,
                    alternate,
                } => {
                    let arm = if resolve(test, state).is_truthy() {
                        Some(consequent)
                    } else {
                        alternate.as_ref()
                    };
                    if let Some(arm) = arm {
                        // the arm runs in its own frame; sentinels and
                        // pending returns do not cross the IF boundary
                        let mut inner = Frame::default();
                        let _ = self.exec_block(arm, state, stdout, functions, is_nested, &mut inner);
                    }
                }
                InstrKind::While { test, body } => {
                    let mut iterations = 0;
                    while resolve(test, state).is_truthy()
                        && iterations < self.config.max_loop_iterations
                    {
                        let mut inner = Frame::default();
                        if let Flow::Break =
                            self.exec_block(body, state, stdout, functions, true, &mut inner)
                        {
                            break;
                        }
                        iterations += 1;
                    }
                    if iterations >= self.config.max_loop_iterations {
                        tracing::warn!(
                            cap = self.config.max_loop_iterations,
                            "loop iteration cap reached, truncating execution"
                        );
                    }
                }
                InstrKind::Load {
                    target,
                    object,
                    index,
                } => {
                    let idx = resolve(index, state).as_i64();
                    let v = match state.get(object) {
                        Some(Value::Array(items)) => {
                            items.get(&idx).cloned().unwrap_or(Value::Number(0.0))
                        }
                        _ => Value::Number(0.0),
                    };
                    state.insert(target.clone(), v);
                }
                InstrKind::Store {
                    target,
                    index,
                    value,
                } => {
                    let idx = resolve(index, state).as_i64();
                    let v = resolve(value, state);
                    let is_array = matches!(state.get(target), Some(Value::Array(_)));
                    if is_array {
                        if let Some(Value::Array(items)) = state.get_mut(target) {
                            items.insert(idx, v);
                        }
                    } else {
                        let replace = match state.get(target) {
                            None => true,
                            Some(existing) => !existing.is_truthy(),
                        };
                        // a truthy non-array target silently drops the write
                        if replace {
                            let mut items = BTreeMap::new();
                            items.insert(idx, v);
                            state.insert(target.clone(), Value::Array(items));
                        }
                    }
                }
                InstrKind::Call { target, name, args } => {
                    let resolved: Vec<Value> = args.iter().map(|a| resolve(a, state)).collect();
                    let result = if name == "printf" {
                        exec_printf(&resolved, stdout);
                        Value::Number(0.0)
                    } else if let Some(func) = functions.get(name) {
                        self.call_function(func, &resolved, functions)
                    } else {
                        Value::Number(0.0)
                    };
                    state.insert(target.clone(), result);
                }
                InstrKind::Print { value } => {
                    frame.output = Some(resolve(value, state));
                }
            }
        }
        Flow::Normal
    }

    /// Inline a user function: bind arguments into a fresh state, re-lower
    /// the AST body (no caching), and execute it as a nested frame with its
    /// own stdout.
    fn call_function(&self, func: &FunctionDecl, args: &[Value], functions: &Functions) -> Value {
        let mut func_state = State::new();
        for (i, param) in func.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Number(0.0));
            func_state.insert(param.id.clone(), value);
        }

        let body = lower::lower_block(&func.body);
        let mut func_stdout = Vec::new();
        let mut frame = Frame::default();
        let flow = self.exec_block(
            &body,
            &mut func_state,
            &mut func_stdout,
            functions,
            true,
            &mut frame,
        );
        let result = match flow {
            Flow::Return(value) => value,
            _ => {
                let selected = select_result(frame, &func_state);
                // a function that printed without returning yields its
                // stdout, which the caller coerces away below
                if func_stdout.is_empty() {
                    selected
                } else {
                    Value::Str(func_stdout.join(""))
                }
            }
        };

        // only numeric results flow back to the caller
        match result {
            Value::Number(n) => Value::Number(n),
            _ => Value::Number(0.0),
        }
    }
}

/// End-of-frame result selection: PRINT output, else last RETURN, else a
/// truthy `result` variable, else 0.
fn select_result(frame: Frame, state: &State) -> Value {
    frame
        .output
        .or(frame.return_value)
        .or_else(|| state.get("result").cloned().filter(|v| v.is_truthy()))
        .unwrap_or(Value::Number(0.0))
}

fn resolve(operand: &Operand, state: &State) -> Value {
    match operand {
        Operand::Literal(n) => Value::Number(*n),
        Operand::Str(s) => Value::Str(s.clone()),
        Operand::Var(name) => match state.get(name) {
            Some(v) => v.clone(),
            // numeric-looking names parse, anything else unresolved reads 0
            None => name.parse::<f64>().map(Value::Number).unwrap_or(Value::Number(0.0)),
        },
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                Value::Str(format!("{left}{right}"))
            } else {
                Value::Number(left.as_number() + right.as_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.as_number() - right.as_number()),
        BinaryOp::Mul => Value::Number(left.as_number() * right.as_number()),
        BinaryOp::Div => {
            let l = left.as_number();
            let mut r = right.as_number();
            // division by zero silently divides by 1 to keep execution total
            if r == 0.0 {
                r = 1.0;
            }
            if l.fract() == 0.0 && r.fract() == 0.0 {
                Value::Number((l / r).trunc())
            } else {
                Value::Number(l / r)
            }
        }
        BinaryOp::Xor => {
            Value::Number(((left.as_number() as i64) ^ (right.as_number() as i64)) as f64)
        }
        BinaryOp::And => {
            Value::Number(((left.as_number() as i64) & (right.as_number() as i64)) as f64)
        }
        BinaryOp::Mod => Value::Number(left.as_number() % right.as_number()),
        BinaryOp::Less => bool_value(left.as_number() < right.as_number()),
        BinaryOp::Greater => bool_value(left.as_number() > right.as_number()),
        BinaryOp::Equals => {
            let eq = match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => a == b,
                _ => left.as_number() == right.as_number(),
            };
            bool_value(eq)
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::Number(if b { 1.0 } else { 0.0 })
}

fn exec_printf(args: &[Value], stdout: &mut Vec<String>) {
    match args.first() {
        Some(Value::Str(fmt)) => {
            let line = format_printf(fmt, &args[1..]);
            stdout.push(line);
        }
        _ => {
            let rendered: Vec<String> = args.iter().map(|v| v.to_string()).collect();
            stdout.push(rendered.join(" "));
        }
    }
}

/// `%d`/`%f`/`%s` substitution with optional `%.Nf` precision. A
/// placeholder with no matching argument is left in the output untouched.
fn format_printf(fmt: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut arg_index = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = String::new();
        while let Some(&next) = chars.peek() {
            if (next == '.' && spec.is_empty()) || next.is_ascii_digit() {
                spec.push(next);
                chars.next();
            } else {
                break;
            }
        }

        match chars.peek().copied() {
            Some(conv) if conv == 'd' || conv == 'f' || conv == 's' => {
                chars.next();
                match args.get(arg_index) {
                    Some(val) => {
                        arg_index += 1;
                        out.push_str(&format_conversion(conv, &spec, val));
                    }
                    None => {
                        out.push('%');
                        out.push_str(&spec);
                        out.push(conv);
                    }
                }
            }
            _ => {
                out.push('%');
                out.push_str(&spec);
            }
        }
    }
    out
}

fn format_conversion(conv: char, spec: &str, val: &Value) -> String {
    match conv {
        'f' => {
            let n = val.as_number();
            match spec.strip_prefix('.').and_then(|p| p.parse::<usize>().ok()) {
                Some(precision) => format!("{:.*}", precision, n),
                None => format_number(n),
            }
        }
        // %d truncates toward zero
        'd' => format_number(val.as_number().trunc()),
        _ => val.to_string(),
    }
}

/// Execute with default limits from a fresh state.
pub fn execute_ir(program: &ProgramIr) -> ExecResult {
    Executor::default().run(program)
}
