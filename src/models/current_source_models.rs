use std::sync::Arc;
use super::{CurrentSourceModel, SnippetBase};


/// Constant current
pub fn dc() -> Arc<CurrentSourceModel> {
    Arc::new(CurrentSourceModel {
        snippet: SnippetBase::new(&["amp"], vec![], vec![]),
        vars: vec![],
        injection_code: "injectCurrent(amp);".to_string(),
    })
}

/// Gaussian noise current
pub fn gaussian_noise() -> Arc<CurrentSourceModel> {
    Arc::new(CurrentSourceModel {
        snippet: SnippetBase::new(&["mean", "sd"], vec![], vec![]),
        vars: vec![],
        injection_code: "injectCurrent(mean + (gennrand_normal() * sd));".to_string(),
    })
}

pub fn get_current_source_model(name: &str) -> Option<Arc<CurrentSourceModel>> {
    match name {
        "DC" => Some(dc()),
        "GaussianNoise" => Some(gaussian_noise()),
        _ => None,
    }
}
