//! Number encoding pass: split an integer constant into an add/subtract
//! pair, `target = (value + offset) - offset`.

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

        // target shape: ASSIGN of an integer literal
        let site = match &instr.kind {
            InstrKind::Assign { target, value } if value.is_integer_literal() => {
                Some((target.clone(), value.as_literal().unwrap_or(0.0)))
            }
            _ => None,
        };
        let (target, value) = match site {
            Some(site) => site,
            None => {
                result.push(instr);
                continue;
            }
        };

        if !ctx.draw(ctx.plan.weights.number_encoding) {
            result.push(instr);
            continue;
        }

        if !ctx.check_budget(BudgetKind::Encoding, 2) {
            ctx.skip("CHAOS_SKIPPED_BUDGET", "encoding_budget_exceeded", block_id);
            result.push(instr);
            continue;
        }

        let offset = (ctx.rng.next_f64() * 10.0).floor() + 1.0;
        let t1 = format!("enc_add_{depth}_{idx}");

        result.push(
            Instruction::binary(
                BinaryOp::Add,
                &t1,
                Operand::Literal(value),
                Operand::Literal(offset),
            )
            .with_meta("CHAOS_NUM_ENC_ADD"),
        );
        result.push(
            Instruction::binary(
                BinaryOp::Sub,
                &target,
                Operand::var(&t1),
                Operand::Literal(offset),
            )
            .with_meta("CHAOS_NUM_ENC_SUB"),
        );

        ctx.budget.charge_instructions(2);
        ctx.budget.charge_encoding(1);
        ctx.note(
            "Number Encoding",
            "CHAOS_NUM_ENCODING",
            "chaos.data.encoding",
            vec![
                ("orig", json!(value)),
                ("enc", json!(format!("{t1} - {offset}"))),
                ("strategy", json!("offset")),
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
