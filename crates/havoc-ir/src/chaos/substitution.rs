//! Instruction substitution pass: rewrite `ADD` through the carry-save
//! identity `a + b = (a ^ b) + 2*(a & b)`, plus an opportunistic
//! commutativity swap on `ADD`/`MUL` encountered along the way.

use super::PassContext;
use crate::budget::BudgetKind;
use crate::instruction::{BinaryOp, InstrKind, Instruction, Operand};
use serde_json::json;

pub fn run(block: Vec<Instruction>, ctx: &mut PassContext<'_>) -> Vec<Instruction> {
    process_block(block, "main", 0, ctx)
}

fn process_block(
    block: Vec<Instruction>,
    block_id: &str,
    depth: u32,
    ctx: &mut PassContext<'_>,
) -> Vec<Instruction> {
    ctx.budget.observe_depth(depth);
    let mut result = Vec::with_capacity(block.len());

    for (idx, mut instr) in block.into_iter().enumerate() {
        recurse(&mut instr, idx, depth, ctx);

        let is_add = matches!(
            &instr.kind,
            InstrKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        );

        if is_add && ctx.draw(ctx.plan.weights.subst) {
            let (target, left, right) = match &instr.kind {
                InstrKind::Binary {
                    target, left, right, ..
                } => (target.clone(), left.clone(), right.clone()),
                _ => {
                    result.push(instr);
                    continue;
                }
            };

            // conservative guard: leave zero-operand adds alone
            if left.is_literal_zero() || right.is_literal_zero() {
                ctx.skip("CHAOS_SKIPPED_SAFETY", "zero_operand", block_id);
                result.push(instr);
                continue;
            }

            if !ctx.check_budget(BudgetKind::Instructions, 4) {
                ctx.skip("CHAOS_SKIPPED_BUDGET", "instruction_budget_exceeded", block_id);
                result.push(instr);
                continue;
            }

            let t_xor = format!("chaos_xor_{depth}_{idx}");
            let t_and = format!("chaos_and_{depth}_{idx}");
            let t_mul = format!("chaos_mul_{depth}_{idx}");

            result.push(
                Instruction::binary(BinaryOp::Xor, &t_xor, left.clone(), right.clone())
                    .with_meta("CHAOS_SUBST_XOR"),
            );
            result.push(
                Instruction::binary(BinaryOp::And, &t_and, left.clone(), right.clone())
                    .with_meta("CHAOS_SUBST_AND"),
            );
            result.push(
                Instruction::binary(
                    BinaryOp::Mul,
                    &t_mul,
                    Operand::var(&t_and),
                    Operand::Literal(2.0),
                )
                .with_meta("CHAOS_SUBST_MUL"),
            );
            result.push(
                Instruction::binary(
                    BinaryOp::Add,
                    &target,
                    Operand::var(&t_xor),
                    Operand::var(&t_mul),
                )
                .with_meta("CHAOS_SUBST_FINAL"),
            );

            ctx.budget.charge_instructions(4);
            ctx.note(
                "Instruction Substitution",
                "CHAOS_SUBST_ADD",
                "chaos.substitution",
                vec![
                    ("block", json!(block_id)),
                    ("instr", json!(idx)),
                    ("left", json!(left)),
                    ("right", json!(right)),
                    ("op", json!("ADD")),
                ],
            );
            continue;
        }

        // commutativity swap for adds that did not substitute, and for muls
        let commutative = matches!(
            &instr.kind,
            InstrKind::Binary { op, .. } if op.is_commutative()
        );
        if commutative && ctx.draw(ctx.plan.weights.subst) {
            if let InstrKind::Binary { op, left, right, .. } = &mut instr.kind {
                std::mem::swap(left, right);
                let op = *op;
                instr.meta = Some("Swapped".to_string());
                ctx.note(
                    "Commutativity Swap",
                    "CHAOS_ALGEBRAIC_SWAP",
                    "chaos.algebraic",
                    vec![("op", json!(op.name()))],
                );
            }
        }

        result.push(instr);
    }

    result
}

fn recurse(instr: &mut Instruction, idx: usize, depth: u32, ctx: &mut PassContext<'_>) {
    match &mut instr.kind {
        InstrKind::If {
            consequent,
            alternate,
            ..
        } => {
            let block = std::mem::take(consequent);
            *consequent = process_block(block, &format!("if_{idx}"), depth + 1, ctx);
            if let Some(alt) = alternate.take() {
                *alternate = Some(process_block(alt, &format!("else_{idx}"), depth + 1, ctx));
            }
        }
        InstrKind::While { body, .. } => {
            let block = std::mem::take(body);
            *body = process_block(block, &format!("while_{idx}"), depth + 1, ctx);
        }
        _ => {}
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
        fn new(subst: f64, limits: ChaosLimits) -> Self {
            Self {
                rng: ChaosRng::new(1),
                plan: ChaosPlan {
                    theme: "Test".to_string(),
                    weights: Weights {
                        subst,
                        opaque: 0.0,
                        flatten: 0.0,
                        number_encoding: 0.0,
                    },
                    seed: 1,
                },
                budget: BudgetTracker::new(limits),
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

    fn add(target: &str, left: Operand, right: Operand) -> Instruction {
        Instruction::binary(BinaryOp::Add, target, left, right)
    }

    #[test]
    fn test_substitutes_add_with_xor_and_chain() {
        let mut h = Harness::new(1.0, ChaosLimits::default());
        let out = run(
            vec![add("sum", Operand::Literal(5.0), Operand::Literal(10.0))],
            &mut h.ctx(),
        );

        assert_eq!(out.len(), 4);
        let ops: Vec<&str> = out.iter().map(|i| i.op_name()).collect();
        assert_eq!(ops, ["XOR", "AND", "MUL", "ADD"]);
        assert_eq!(out[0].target(), Some("chaos_xor_0_0"));
        assert_eq!(out[3].target(), Some("sum"));
        assert_eq!(out[3].meta.as_deref(), Some("CHAOS_SUBST_FINAL"));
        assert_eq!(h.budget.counters().instructions_added, 4);
    }

    #[test]
    fn test_zero_operand_guard() {
        let mut h = Harness::new(1.0, ChaosLimits::default());
        let input = vec![add("sum", Operand::Literal(0.0), Operand::Literal(10.0))];
        let out = run(input.clone(), &mut h.ctx());

        assert_eq!(out, input);
        assert_eq!(h.sink.with_id("CHAOS_SKIPPED_SAFETY").count(), 1);
        assert_eq!(h.budget.counters().instructions_added, 0);
    }

    #[test]
    fn test_budget_exhaustion_passes_through() {
        let limits = ChaosLimits {
            max_new_instructions: 3,
            ..ChaosLimits::default()
        };
        let mut h = Harness::new(1.0, limits);
        let input = vec![add("sum", Operand::Literal(5.0), Operand::Literal(10.0))];
        let out = run(input.clone(), &mut h.ctx());

        assert_eq!(out, input);
        assert_eq!(h.sink.with_id("CHAOS_SKIPPED_BUDGET").count(), 1);
    }

    #[test]
    fn test_mul_gets_commutativity_swap() {
        let mut h = Harness::new(1.0, ChaosLimits::default());
        let out = run(
            vec![Instruction::binary(
                BinaryOp::Mul,
                "p",
                Operand::var("a"),
                Operand::Literal(2.0),
            )],
            &mut h.ctx(),
        );

        assert_eq!(out.len(), 1);
        match &out[0].kind {
            InstrKind::Binary { left, right, .. } => {
                assert_eq!(left, &Operand::Literal(2.0));
                assert_eq!(right, &Operand::var("a"));
            }
            other => panic!("expected MUL, got {other:?}"),
        }
        assert_eq!(out[0].meta.as_deref(), Some("Swapped"));
        assert_eq!(h.transforms.entries()[0].name, "Commutativity Swap");
    }

    #[test]
    fn test_non_commutative_ops_untouched() {
        let mut h = Harness::new(1.0, ChaosLimits::default());
        let input = vec![Instruction::binary(
            BinaryOp::Sub,
            "d",
            Operand::var("a"),
            Operand::var("b"),
        )];
        let out = run(input.clone(), &mut h.ctx());
        assert_eq!(out, input);
    }

    proptest::proptest! {
        // the identity the rewrite rests on, bitwise-exact for integers
        #[test]
        fn prop_carry_save_identity(a in -100_000i64..100_000, b in -100_000i64..100_000) {
            proptest::prop_assume!(a != 0 && b != 0);
            proptest::prop_assert_eq!((a ^ b) + 2 * (a & b), a + b);
        }
    }
}
