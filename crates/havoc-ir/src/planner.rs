//! Per-run transformation planning.

use crate::rng::ChaosRng;
use havoc_core::Intensity;
use serde::{Deserialize, Serialize};

/// Firing probability for each transformation category, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub subst: f64,
    pub opaque: f64,
    pub flatten: f64,
    pub number_encoding: f64,
}

/// A named weighting profile.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub key: &'static str,
    pub name: &'static str,
    pub weights: Weights,
}

pub const THEMES: [Theme; 4] = [
    Theme {
        key: "arithmetic",
        name: "Arithmetic Overload",
        weights: Weights {
            subst: 0.9,
            opaque: 0.2,
            flatten: 0.1,
            number_encoding: 0.8,
        },
    },
    Theme {
        key: "control_flow",
        name: "Control Flow Maze",
        weights: Weights {
            subst: 0.3,
            opaque: 0.9,
            flatten: 0.8,
            number_encoding: 0.2,
        },
    },
    Theme {
        key: "balanced",
        name: "Balanced Chaos",
        weights: Weights {
            subst: 0.6,
            opaque: 0.5,
            flatten: 0.4,
            number_encoding: 0.5,
        },
    },
    Theme {
        key: "data_obfuscation",
        name: "Data Obfuscation",
        weights: Weights {
            subst: 0.4,
            opaque: 0.3,
            flatten: 0.2,
            number_encoding: 0.95,
        },
    },
];

fn theme_by_key(key: &str) -> &'static Theme {
    THEMES
        .iter()
        .find(|t| t.key == key)
        .expect("known theme key")
}

/// The plan for one compilation run. Fixed once selected; passes never
/// re-plan mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosPlan {
    pub theme: String,
    pub weights: Weights,
    pub seed: i64,
}

/// Select a theme for this run and scale its weights by intensity.
/// High spends one draw on a uniform choice among the four themes, medium
/// spends one draw on a balanced/arithmetic coin flip, low always picks
/// balanced.
pub fn generate_plan(intensity: Intensity, seed: i64, rng: &mut ChaosRng) -> ChaosPlan {
    let theme = match intensity {
        Intensity::High => {
            let idx = (rng.next_f64() * THEMES.len() as f64).floor() as usize;
            &THEMES[idx]
        }
        Intensity::Medium => {
            if rng.next_f64() > 0.5 {
                theme_by_key("balanced")
            } else {
                theme_by_key("arithmetic")
            }
        }
        _ => theme_by_key("balanced"),
    };

    let m = intensity.multiplier();
    let base = theme.weights;

    tracing::debug!(theme = theme.name, multiplier = m, "chaos theme selected");

    ChaosPlan {
        theme: theme.name.to_string(),
        weights: Weights {
            subst: base.subst * m,
            opaque: base.opaque * m,
            flatten: base.flatten * m,
            number_encoding: base.number_encoding * m,
        },
        seed,
    }
}
