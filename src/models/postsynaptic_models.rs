use std::sync::Arc;
use super::{DerivedParam, PostsynapticModel, SnippetBase};


/// Input is injected in the same timestep it arrives
pub fn delta_curr() -> Arc<PostsynapticModel> {
    Arc::new(PostsynapticModel {
        snippet: SnippetBase::default(),
        vars: vec![],
        apply_input_code: "injectCurrent(inSyn);".to_string(),
        decay_code: "inSyn = 0;".to_string(),
    })
}

/// Exponentially decaying current
pub fn exp_curr() -> Arc<PostsynapticModel> {
    Arc::new(PostsynapticModel {
        snippet: SnippetBase::new(
            &["tau"],
            vec![
                DerivedParam::new("expDecay", |p, dt| (-dt / p["tau"]).exp()),
                DerivedParam::new("init", |p, dt| (p["tau"] * (1.0 - (-dt / p["tau"]).exp())) * (1.0 / dt)),
            ],
            vec![],
        ),
        vars: vec![],
        apply_input_code: "injectCurrent(init * inSyn);".to_string(),
        decay_code: "inSyn *= expDecay;".to_string(),
    })
}

pub fn get_postsynaptic_model(name: &str) -> Option<Arc<PostsynapticModel>> {
    match name {
        "DeltaCurr" => Some(delta_curr()),
        "ExpCurr" => Some(exp_curr()),
        _ => None,
    }
}
