//! Control-flow flattening (lite): hide a straight-line assignment inside a
//! single-iteration loop, `WHILE(1) { instr; BREAK; }`.

use super::PassContext;
use crate::budget::BudgetKind;
use crate::instruction::{InstrKind, Instruction, Operand};
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
        if !is_assign || !ctx.draw(ctx.plan.weights.flatten) {
            result.push(instr);
            continue;
        }

        if !ctx.check_budget(BudgetKind::Control, 1) {
            ctx.skip("CHAOS_SKIPPED_DEPTH", "control_depth_exceeded", block_id);
            result.push(instr);
            continue;
        }

        result.push(
            Instruction::new(InstrKind::While {
                test: Operand::Literal(1.0),
                body: vec![instr, Instruction::brk().with_meta("Flattening Break")],
            })
            .with_meta("CHAOS_CF_FLATTENING_LITE"),
        );

        ctx.budget.charge_instructions(2);
        ctx.note(
            "CF Flattening",
            "CHAOS_CF_FLATTEN",
            "chaos.control_flow.flatten",
            vec![
                ("block", json!(block_id)),
                ("type", json!("loop_switch_lite")),
                ("reason", json!("straight_line_hidden")),
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
