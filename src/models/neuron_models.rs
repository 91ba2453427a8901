use std::sync::Arc;
use super::{DerivedParam, NeuronModel, SnippetBase, Var};


/// Leaky integrate-and-fire neuron with an absolute refractory period
pub fn lif() -> Arc<NeuronModel> {
    Arc::new(NeuronModel {
        snippet: SnippetBase::new(
            &["C", "TauM", "Vrest", "Vreset", "Vthresh", "Ioffset", "TauRefrac"],
            vec![
                DerivedParam::new("ExpTC", |p, dt| (-dt / p["TauM"]).exp()),
                DerivedParam::new("Rmembrane", |p, _| p["TauM"] / p["C"]),
            ],
            vec![],
        ),
        vars: vec![Var::read_write("V", "scalar"), Var::read_write("RefracTime", "scalar")],
        additional_input_vars: vec![],
        sim_code: [
            "if (RefracTime <= 0.0) {",
            "    scalar alpha = ((Isyn + Ioffset) * Rmembrane) + Vrest;",
            "    V = alpha - (ExpTC * (alpha - V));",
            "}",
            "else {",
            "    RefracTime -= dt;",
            "}",
        ].join("\n"),
        threshold_condition_code: "RefracTime <= 0.0 && V >= Vthresh".to_string(),
        reset_code: "V = Vreset;\nRefracTime = TauRefrac;".to_string(),
    })
}

/// Izhikevich neuron with two half steps for the voltage
pub fn izhikevich() -> Arc<NeuronModel> {
    Arc::new(NeuronModel {
        snippet: SnippetBase::new(&["a", "b", "c", "d"], vec![], vec![]),
        vars: vec![Var::read_write("V", "scalar"), Var::read_write("U", "scalar")],
        additional_input_vars: vec![],
        sim_code: [
            "if (V >= 30.0) {",
            "    V = c;",
            "    U += d;",
            "}",
            "V += 0.5 * (0.04 * V * V + 5.0 * V + 140.0 - U + Isyn) * dt;",
            "V += 0.5 * (0.04 * V * V + 5.0 * V + 140.0 - U + Isyn) * dt;",
            "U += a * (b * V - U) * dt;",
            "if (V > 30.0) {",
            "    V = 30.0;",
            "}",
        ].join("\n"),
        threshold_condition_code: "V >= 29.99".to_string(),
        reset_code: String::new(),
    })
}

/// Poisson spike source, draws exponentially distributed inter-spike intervals
pub fn poisson() -> Arc<NeuronModel> {
    Arc::new(NeuronModel {
        snippet: SnippetBase::new(
            &["rate"],
            vec![DerivedParam::new("isi", |p, dt| 1000.0 / (p["rate"] * dt))],
            vec![],
        ),
        vars: vec![Var::read_write("timeStepToSpike", "scalar")],
        additional_input_vars: vec![],
        sim_code: [
            "if (timeStepToSpike <= 0.0) {",
            "    timeStepToSpike += isi * gennrand_exponential();",
            "}",
            "timeStepToSpike -= 1.0;",
        ].join("\n"),
        threshold_condition_code: "timeStepToSpike <= 0.0".to_string(),
        reset_code: String::new(),
    })
}

/// Spike source driven entirely by external input, never updates state
pub fn spike_source() -> Arc<NeuronModel> {
    Arc::new(NeuronModel {
        snippet: SnippetBase::default(),
        vars: vec![],
        additional_input_vars: vec![],
        sim_code: String::new(),
        threshold_condition_code: String::new(),
        reset_code: String::new(),
    })
}

pub fn get_neuron_model(name: &str) -> Option<Arc<NeuronModel>> {
    match name {
        "LIF" => Some(lif()),
        "Izhikevich" => Some(izhikevich()),
        "Poisson" => Some(poisson()),
        "SpikeSource" => Some(spike_source()),
        _ => None,
    }
}
