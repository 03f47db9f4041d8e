//! The chaos engine: seeded, budget-constrained rewrite passes.
//!
//! Passes run in a fixed order, each consuming the previous enabled pass's
//! output and recording a snapshot. Every transformation decision —
//! including skips — is emitted as a diagnostic. Budget exhaustion degrades
//! a rewrite to a pass-through; the pipeline itself has no hard errors.

pub mod flatten;
pub mod number_encoding;
pub mod opaque;
pub mod rules;
pub mod substitution;

use crate::budget::{BudgetKind, BudgetTracker, ChaosBudget};
use crate::planner::{generate_plan, ChaosPlan};
use crate::program::ProgramIr;
use crate::rng::ChaosRng;
use crate::snapshot::Snapshot;
use chrono::Utc;
use havoc_core::{ChaosConfig, ChaosLimits, DiagnosticSink, Intensity, Severity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// How many times one named transform fired during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformCount {
    pub name: String,
    pub count: u32,
}

impl fmt::Display for TransformCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.count)
    }
}

/// Ordered per-transform counters, first-fire order preserved.
#[derive(Debug, Default)]
pub struct TransformLog {
    entries: Vec<TransformCount>,
}

impl TransformLog {
    fn record(&mut self, name: &str) {
        match self.entries.iter_mut().find(|t| t.name == name) {
            Some(entry) => entry.count += 1,
            None => self.entries.push(TransformCount {
                name: name.to_string(),
                count: 1,
            }),
        }
    }

    pub fn entries(&self) -> &[TransformCount] {
        &self.entries
    }

    fn into_entries(self) -> Vec<TransformCount> {
        self.entries
    }
}

/// Shared mutable state threaded through one pass traversal.
pub struct PassContext<'a> {
    pub rng: &'a mut ChaosRng,
    pub plan: &'a ChaosPlan,
    pub budget: &'a mut BudgetTracker,
    pub sink: &'a mut DiagnosticSink,
    pub transforms: &'a mut TransformLog,
}

impl PassContext<'_> {
    /// Record a fired transform: bump its counter and emit the info event.
    fn note(&mut self, name: &str, id: &str, context: &str, params: Vec<(&str, Value)>) {
        self.transforms.record(name);
        self.sink.emit(id, context, Severity::Info, params);
    }

    /// Record a skipped rewrite (budget or safety) as a warning.
    fn skip(&mut self, id: &str, reason: &str, block: &str) {
        self.sink.emit(
            id,
            "chaos.safety",
            Severity::Warning,
            vec![("reason", json!(reason)), ("block", json!(block))],
        );
    }

    /// One eligibility draw against a plan weight.
    fn draw(&mut self, weight: f64) -> bool {
        self.rng.next_f64() < weight
    }

    fn check_budget(&self, kind: BudgetKind, cost: u32) -> bool {
        self.budget.check(kind, cost)
    }
}

/// Everything one `apply_chaos` run produces.
#[derive(Debug)]
pub struct ChaosOutcome {
    pub ir: ProgramIr,
    pub snapshots: Vec<Snapshot>,
    pub transforms: Vec<TransformCount>,
    pub seed: i64,
    pub budget: ChaosBudget,
    pub rule_hits: BTreeMap<String, u32>,
}

/// Run the enabled passes over `ir` in fixed order. A fresh PRNG, plan, and
/// budget are created per call, so runs are independent given an explicit
/// seed; without one the seed falls back to wall-clock milliseconds and the
/// run is not reproducible.
#[tracing::instrument(skip_all, fields(intensity = ?intensity, seed = ?seed))]
pub fn apply_chaos(
    ir: &ProgramIr,
    intensity: Intensity,
    seed: Option<i64>,
    config: &ChaosConfig,
    sink: &mut DiagnosticSink,
) -> ChaosOutcome {
    if intensity == Intensity::None {
        sink.emit(
            "CHAOS_SKIPPED_DISABLED",
            "chaos.safety",
            Severity::Info,
            vec![("reason", json!("intensity_none"))],
        );
        return ChaosOutcome {
            ir: ir.clone(),
            snapshots: vec![Snapshot::capture("Original", ir)],
            transforms: Vec::new(),
            seed: seed.unwrap_or(0),
            budget: ChaosBudget::default(),
            rule_hits: BTreeMap::new(),
        };
    }

    let seed = seed.unwrap_or_else(|| Utc::now().timestamp_millis());
    let mut rng = ChaosRng::new(seed);
    let plan = generate_plan(intensity, seed, &mut rng);

    sink.emit(
        "CHAOS_PLAN_SELECTED",
        "chaos.planner",
        Severity::Info,
        vec![
            ("strategy", json!(plan.theme)),
            ("intensity", json!(intensity)),
            ("seed", json!(seed)),
        ],
    );
    tracing::info!(theme = %plan.theme, seed, "chaos plan selected");

    let mut budget = BudgetTracker::new(ChaosLimits::default());
    let mut transforms = TransformLog::default();
    let mut rule_hits = BTreeMap::new();
    let mut snapshots = vec![Snapshot::capture("Original", ir)];
    let mut current = ir.clone();

    if config.passes.number_encoding {
        let mut ctx = PassContext {
            rng: &mut rng,
            plan: &plan,
            budget: &mut budget,
            sink: &mut *sink,
            transforms: &mut transforms,
        };
        current.instructions =
            number_encoding::run(std::mem::take(&mut current.instructions), &mut ctx);
        snapshots.push(Snapshot::capture("Number Encoding", &current));
    }

    if config.passes.substitution {
        let mut ctx = PassContext {
            rng: &mut rng,
            plan: &plan,
            budget: &mut budget,
            sink: &mut *sink,
            transforms: &mut transforms,
        };
        current.instructions =
            substitution::run(std::mem::take(&mut current.instructions), &mut ctx);
        snapshots.push(Snapshot::capture("Substitution", &current));
    }

    if config.passes.opaque_predicates {
        let mut ctx = PassContext {
            rng: &mut rng,
            plan: &plan,
            budget: &mut budget,
            sink: &mut *sink,
            transforms: &mut transforms,
        };
        current.instructions = opaque::run(std::mem::take(&mut current.instructions), &mut ctx);
        snapshots.push(Snapshot::capture("Opaque Predicates", &current));
    }

    if config.passes.flattening {
        let mut ctx = PassContext {
            rng: &mut rng,
            plan: &plan,
            budget: &mut budget,
            sink: &mut *sink,
            transforms: &mut transforms,
        };
        current.instructions = flatten::run(std::mem::take(&mut current.instructions), &mut ctx);
        snapshots.push(Snapshot::capture("Flattening", &current));
    }

    if !config.custom_rules.is_empty() {
        let mut ctx = PassContext {
            rng: &mut rng,
            plan: &plan,
            budget: &mut budget,
            sink: &mut *sink,
            transforms: &mut transforms,
        };
        current.instructions = rules::run(
            std::mem::take(&mut current.instructions),
            &config.custom_rules,
            &mut ctx,
            &mut rule_hits,
        );
        snapshots.push(Snapshot::capture("Custom Rules", &current));
    }

    let counters = budget.counters();
    sink.emit(
        "CHAOS_BUDGET_SUMMARY",
        "chaos.budget",
        Severity::Info,
        vec![
            ("instructionsAdded", json!(counters.instructions_added)),
            ("maxInstructions", json!(budget.limits().max_new_instructions)),
            ("controlDepth", json!(counters.control_depth)),
            ("encodingOps", json!(counters.encoding_ops)),
        ],
    );
    tracing::debug!(
        instructions_added = counters.instructions_added,
        control_depth = counters.control_depth,
        encoding_ops = counters.encoding_ops,
        "chaos run complete"
    );

    ChaosOutcome {
        ir: current,
        snapshots,
        transforms: transforms.into_entries(),
        seed,
        budget: counters,
        rule_hits,
    }
}
