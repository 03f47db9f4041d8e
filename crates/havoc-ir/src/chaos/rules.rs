//! Custom rule mutation pass: user-authored opcode rewrites.
//!
//! A rule replaces every matching instruction with one instruction per
//! target opcode. Operands are propagated heuristically (every generated
//! instruction sees the same source operands), so unlike the built-in
//! passes this pass does not guarantee semantic equivalence.

use super::PassContext;
use crate::budget::BudgetKind;
use crate::instruction::{BinaryOp, InstrKind, Instruction, Operand};
use havoc_core::CustomRule;
use serde_json::json;
use std::collections::BTreeMap;

pub fn run(
    block: Vec<Instruction>,
    rules: &[CustomRule],
    ctx: &mut PassContext<'_>,
    hits: &mut BTreeMap<String, u32>,
) -> Vec<Instruction> {
    process_block(block, "main", 0, rules, ctx, hits)
}

fn process_block(
    block: Vec<Instruction>,
    block_id: &str,
    depth: u32,
    rules: &[CustomRule],
    ctx: &mut PassContext<'_>,
    hits: &mut BTreeMap<String, u32>,
) -> Vec<Instruction> {
    ctx.budget.observe_depth(depth);
    let mut result = Vec::with_capacity(block.len());

    for (idx, mut instr) in block.into_iter().enumerate() {
        match &mut instr.kind {
            InstrKind::If {
                consequent,
                alternate,
                ..
            } => {
                let inner = std::mem::take(consequent);
                *consequent =
                    process_block(inner, &format!("if_{idx}"), depth + 1, rules, ctx, hits);
                if let Some(alt) = alternate.take() {
                    *alternate = Some(process_block(
                        alt,
                        &format!("else_{idx}"),
                        depth + 1,
                        rules,
                        ctx,
                        hits,
                    ));
                }
            }
            InstrKind::While { body, .. } => {
                let inner = std::mem::take(body);
                *body = process_block(inner, &format!("while_{idx}"), depth + 1, rules, ctx, hits);
            }
            _ => {}
        }

        let rule = rules.iter().find(|r| r.source == instr.op_name());
        let rule = match rule {
            Some(rule) => rule,
            None => {
                result.push(instr);
                continue;
            }
        };

        match apply_rule(&instr, rule, block_id, depth, idx, ctx) {
            Some(chain) => {
                ctx.budget.charge_instructions(chain.len() as u32);
                *hits.entry(rule.id.clone()).or_default() += 1;
                ctx.note(
                    "Custom Rule Mutation",
                    "CHAOS_CUSTOM_RULE",
                    "chaos.custom",
                    vec![
                        ("rule", json!(rule.id)),
                        ("source", json!(rule.source)),
                        ("block", json!(block_id)),
                    ],
                );
                result.extend(chain);
            }
            None => result.push(instr),
        }
    }

    result
}

/// Build the replacement chain, or `None` when the rule cannot apply (no
/// writable target, invalid opcode, or budget exhausted).
fn apply_rule(
    instr: &Instruction,
    rule: &CustomRule,
    block_id: &str,
    depth: u32,
    idx: usize,
    ctx: &mut PassContext<'_>,
) -> Option<Vec<Instruction>> {
    let orig_target = match instr.target() {
        Some(target) => target.to_string(),
        None => {
            ctx.skip("CHAOS_RULE_SKIPPED", "no_target", block_id);
            return None;
        }
    };

    let target_ops: Vec<&str> = rule
        .target
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if target_ops.is_empty() {
        ctx.skip("CHAOS_RULE_INVALID", "empty_target_list", block_id);
        return None;
    }
    if let Some(bad) = target_ops
        .iter()
        .find(|name| BinaryOp::from_name(name).is_none() && **name != "ASSIGN" && **name != "NOOP")
    {
        tracing::warn!(rule = %rule.id, opcode = bad, "custom rule names an unknown opcode");
        ctx.skip("CHAOS_RULE_INVALID", "unknown_opcode", block_id);
        return None;
    }

    if !ctx.check_budget(BudgetKind::Instructions, target_ops.len() as u32) {
        ctx.skip("CHAOS_SKIPPED_BUDGET", "instruction_budget_exceeded", block_id);
        return None;
    }

    // heuristic operand propagation: every generated instruction sees the
    // source's operands, falling back left <- value <- 0
    let (left, right, value) = source_operands(instr);
    let base_left = left
        .clone()
        .or_else(|| value.clone())
        .unwrap_or(Operand::Literal(0.0));
    let base_right = right
        .clone()
        .or_else(|| value.clone())
        .unwrap_or(Operand::Literal(0.0));
    let base_value = value.or(left).unwrap_or(Operand::Literal(0.0));

    let mut chain = Vec::with_capacity(target_ops.len());
    for (k, name) in target_ops.iter().enumerate() {
        let dest = if k == target_ops.len() - 1 {
            orig_target.clone()
        } else {
            format!("rule_{depth}_{idx}_{k}")
        };
        let generated = match BinaryOp::from_name(name) {
            Some(op) => {
                Instruction::binary(op, dest, base_left.clone(), base_right.clone())
            }
            None if *name == "ASSIGN" => Instruction::assign(dest, base_value.clone()),
            _ => Instruction::noop(),
        };
        chain.push(generated.with_meta("CHAOS_CUSTOM_RULE"));
    }

    Some(chain)
}

fn source_operands(instr: &Instruction) -> (Option<Operand>, Option<Operand>, Option<Operand>) {
    match &instr.kind {
        InstrKind::Assign { value, .. } => (None, None, Some(value.clone())),
        InstrKind::Binary { left, right, .. } => {
            (Some(left.clone()), Some(right.clone()), None)
        }
        InstrKind::Store { value, index, .. } => {
            (Some(index.clone()), None, Some(value.clone()))
        }
        InstrKind::Load { index, .. } => (Some(index.clone()), None, None),
        _ => (None, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetTracker;
    use crate::chaos::TransformLog;
    use crate::planner::{ChaosPlan, Weights};
    use crate::rng::ChaosRng;
    use havoc_core::{ChaosLimits, DiagnosticSink};

    struct Harness {
        rng: ChaosRng,
        plan: ChaosPlan,
        budget: BudgetTracker,
        sink: DiagnosticSink,
        transforms: TransformLog,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                rng: ChaosRng::new(1),
                plan: ChaosPlan {
                    theme: "Test".to_string(),
                    weights: Weights {
                        subst: 0.0,
                        opaque: 0.0,
                        flatten: 0.0,
                        number_encoding: 0.0,
                    },
                    seed: 1,
                },
                budget: BudgetTracker::new(ChaosLimits::default()),
                sink: DiagnosticSink::new(),
                transforms: TransformLog::default(),
            }
        }

        fn ctx(&mut self) -> PassContext<'_> {
            PassContext {
                rng: &mut self.rng,
                plan: &self.plan,
                budget: &mut self.budget,
                sink: &mut self.sink,
                transforms: &mut self.transforms,
            }
        }
    }

    fn rule(id: &str, source: &str, target: &str) -> CustomRule {
        CustomRule {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn test_rewrites_matching_op_into_chain() {
        let mut h = Harness::new();
        let mut hits = BTreeMap::new();
        let rules = vec![rule("r1", "ADD", "XOR, ADD")];
        let out = run(
            vec![Instruction::binary(
                BinaryOp::Add,
                "sum",
                Operand::var("a"),
                Operand::var("b"),
            )],
            &rules,
            &mut h.ctx(),
            &mut hits,
        );

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].op_name(), "XOR");
        assert_eq!(out[0].target(), Some("rule_0_0_0"));
        assert_eq!(out[1].op_name(), "ADD");
        // last link writes the original target
        assert_eq!(out[1].target(), Some("sum"));
        // source operands are propagated to every link
        match &out[1].kind {
            InstrKind::Binary { left, right, .. } => {
                assert_eq!(left, &Operand::var("a"));
                assert_eq!(right, &Operand::var("b"));
            }
            other => panic!("expected ADD, got {other:?}"),
        }
        assert_eq!(hits.get("r1"), Some(&1));
    }

    #[test]
    fn test_assign_source_propagates_value() {
        let mut h = Harness::new();
        let mut hits = BTreeMap::new();
        let rules = vec![rule("r2", "ASSIGN", "ADD")];
        let out = run(
            vec![Instruction::assign("x", Operand::Literal(5.0))],
            &rules,
            &mut h.ctx(),
            &mut hits,
        );

        assert_eq!(out.len(), 1);
        match &out[0].kind {
            InstrKind::Binary {
                op: BinaryOp::Add,
                target,
                left,
                right,
            } => {
                assert_eq!(target, "x");
                assert_eq!(left, &Operand::Literal(5.0));
                assert_eq!(right, &Operand::Literal(5.0));
            }
            other => panic!("expected ADD, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_opcode_invalidates_rule() {
        let mut h = Harness::new();
        let mut hits = BTreeMap::new();
        let rules = vec![rule("r3", "ADD", "FROB")];
        let input = vec![Instruction::binary(
            BinaryOp::Add,
            "sum",
            Operand::var("a"),
            Operand::var("b"),
        )];
        let out = run(input.clone(), &rules, &mut h.ctx(), &mut hits);

        assert_eq!(out, input);
        assert!(hits.is_empty());
        assert_eq!(h.sink.with_id("CHAOS_RULE_INVALID").count(), 1);
    }

    #[test]
    fn test_targetless_instruction_skipped() {
        let mut h = Harness::new();
        let mut hits = BTreeMap::new();
        let rules = vec![rule("r4", "RETURN", "ASSIGN")];
        let input = vec![Instruction::ret(Operand::var("x"))];
        let out = run(input.clone(), &rules, &mut h.ctx(), &mut hits);

        assert_eq!(out, input);
        assert_eq!(h.sink.with_id("CHAOS_RULE_SKIPPED").count(), 1);
    }

    #[test]
    fn test_hit_counts_accumulate() {
        let mut h = Harness::new();
        let mut hits = BTreeMap::new();
        let rules = vec![rule("r5", "ASSIGN", "ASSIGN")];
        run(
            vec![
                Instruction::assign("a", Operand::Literal(1.0)),
                Instruction::assign("b", Operand::Literal(2.0)),
                Instruction::assign("c", Operand::Literal(3.0)),
            ],
            &rules,
            &mut h.ctx(),
            &mut hits,
        );
        assert_eq!(hits.get("r5"), Some(&3));
    }

    #[test]
    fn test_recurses_into_nested_blocks() {
        let mut h = Harness::new();
        let mut hits = BTreeMap::new();
        let rules = vec![rule("r6", "ASSIGN", "ASSIGN")];
        let nested = Instruction::new(InstrKind::While {
            test: Operand::var("c"),
            body: vec![Instruction::assign("x", Operand::Literal(1.0))],
        });
        let out = run(vec![nested], &rules, &mut h.ctx(), &mut hits);

        match &out[0].kind {
            InstrKind::While { body, .. } => {
                assert_eq!(body[0].meta.as_deref(), Some("CHAOS_CUSTOM_RULE"));
            }
            other => panic!("expected WHILE, got {other:?}"),
        }
        assert_eq!(hits.get("r6"), Some(&1));
    }
}
