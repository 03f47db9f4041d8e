//! Opaque predicate pass: guard an assignment with a condition that is
//! always true, `(x*x + x) % 2 == 0` (x(x+1) is a product of consecutive
//! integers), leaving a dead `NOOP` branch behind.

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

        let is_assign = matches!(&instr.kind, InstrKind::Assign { .. });
        if !is_assign || !ctx.draw(ctx.plan.weights.opaque) {
            result.push(instr);
            continue;
        }

        if !ctx.check_budget(BudgetKind::Control, 1) {
            ctx.skip("CHAOS_SKIPPED_DEPTH", "control_depth_exceeded", block_id);
            result.push(instr);
            continue;
        }

        // x falls back to 1 when the assigned value is not a numeric literal
        let x = match &instr.kind {
            InstrKind::Assign { value, .. } => value.as_literal().unwrap_or(1.0),
            _ => 1.0,
        };

        let t_sq = format!("opaque_sq_{depth}_{idx}");
        let t_sum = format!("opaque_sum_{depth}_{idx}");
        let t_mod = format!("opaque_mod_{depth}_{idx}");
        let t_cond = format!("opaque_cond_{depth}_{idx}");

        result.push(
            Instruction::binary(
                BinaryOp::Mul,
                &t_sq,
                Operand::Literal(x),
                Operand::Literal(x),
            )
            .with_meta("CHAOS_OPAQUE_SQ"),
        );
        result.push(
            Instruction::binary(
                BinaryOp::Add,
                &t_sum,
                Operand::var(&t_sq),
                Operand::Literal(x),
            )
            .with_meta("CHAOS_OPAQUE_SUM"),
        );
        result.push(
            Instruction::binary(
                BinaryOp::Mod,
                &t_mod,
                Operand::var(&t_sum),
                Operand::Literal(2.0),
            )
            .with_meta("CHAOS_OPAQUE_MOD"),
        );
        result.push(Instruction::binary(
            BinaryOp::Equals,
            &t_cond,
            Operand::var(&t_mod),
            Operand::Literal(0.0),
        ));
        result.push(
            Instruction::new(InstrKind::If {
                test: Operand::var(&t_cond),
                consequent: vec![instr],
                alternate: Some(vec![Instruction::noop().with_meta("Dead Branch")]),
            })
            .with_meta("CHAOS_OPAQUE_PREDICATE"),
        );

        ctx.budget.charge_instructions(5);
        ctx.note(
            "Opaque Predicate",
            "CHAOS_OPAQUE_PRED",
            "chaos.control_flow.opaque",
            vec![
                ("block", json!(block_id)),
                ("invariant", json!("(x*x + x) % 2 == 0")),
                ("cond", json!("(x*x+x)%2==0")),
                ("valueBased", json!(false)),
            ],
        );
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
