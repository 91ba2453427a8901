use std::sync::Arc;
use super::{SnippetBase, Var, VarAccess, WeightUpdateModel};


/// Adds a fixed weight to the postsynaptic input on each presynaptic spike
pub fn static_pulse() -> Arc<WeightUpdateModel> {
    Arc::new(WeightUpdateModel {
        snippet: SnippetBase::default(),
        vars: vec![Var::read_only("g", "scalar")],
        sim_code: "addToPost(g);".to_string(),
        ..Default::default()
    })
}

/// Static pulse delivered after a per-synapse dendritic delay
pub fn static_pulse_dendritic_delay() -> Arc<WeightUpdateModel> {
    Arc::new(WeightUpdateModel {
        snippet: SnippetBase::default(),
        vars: vec![Var::read_only("g", "scalar"), Var::new("d", "uint8_t", VarAccess::ReadOnly)],
        sim_code: "addToPostDelay(g, d);".to_string(),
        ..Default::default()
    })
}

/// Graded synapse, transmits continuously while the presynaptic voltage is above threshold
pub fn static_graded() -> Arc<WeightUpdateModel> {
    Arc::new(WeightUpdateModel {
        snippet: SnippetBase::new(&["Epre", "Vslope"], vec![], vec![]),
        vars: vec![Var::read_only("g", "scalar")],
        event_code: "addToPost(fmax(0.0, g * tanh((V_pre - Epre) / Vslope) * dt));".to_string(),
        event_threshold_condition_code: "V_pre > Epre".to_string(),
        ..Default::default()
    })
}

/// Additive pair-based STDP with exponential windows, weights are clamped
pub fn stdp() -> Arc<WeightUpdateModel> {
    Arc::new(WeightUpdateModel {
        snippet: SnippetBase::new(&["tauPlus", "tauMinus", "Aplus", "Aminus", "Wmin", "Wmax"], vec![], vec![]),
        vars: vec![Var::read_write("g", "scalar")],
        sim_code: [
            "addToPost(g);",
            "const scalar deltat = t - st_post;",
            "if (deltat > 0.0) {",
            "    const scalar timing = exp(-deltat / tauMinus);",
            "    g = fmax(Wmin, g - (Aminus * timing));",
            "}",
        ].join("\n"),
        learn_post_code: [
            "const scalar deltat = t - st_pre;",
            "if (deltat > 0.0) {",
            "    const scalar timing = exp(-deltat / tauPlus);",
            "    g = fmin(Wmax, g + (Aplus * timing));",
            "}",
        ].join("\n"),
        ..Default::default()
    })
}

pub fn get_weight_update_model(name: &str) -> Option<Arc<WeightUpdateModel>> {
    match name {
        "StaticPulse" => Some(static_pulse()),
        "StaticPulseDendriticDelay" => Some(static_pulse_dendritic_delay()),
        "StaticGraded" => Some(static_graded()),
        "STDP" => Some(stdp()),
        _ => None,
    }
}
