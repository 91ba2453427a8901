use std::sync::Arc;
use super::{InitVarSnippet, SnippetBase};


pub const CONSTANT_CODE: &str = "value = constant;";

/// Leaves the variable for the host to initialise
pub fn uninitialised() -> Arc<InitVarSnippet> {
    Arc::new(InitVarSnippet { snippet: SnippetBase::default(), code: String::new() })
}

pub fn constant() -> Arc<InitVarSnippet> {
    Arc::new(InitVarSnippet {
        snippet: SnippetBase::new(&["constant"], vec![], vec![]),
        code: CONSTANT_CODE.to_string(),
    })
}

pub fn uniform() -> Arc<InitVarSnippet> {
    Arc::new(InitVarSnippet {
        snippet: SnippetBase::new(&["min", "max"], vec![], vec![]),
        code: "const scalar scale = max - min;\nvalue = min + (gennrand_uniform() * scale);".to_string(),
    })
}

pub fn normal() -> Arc<InitVarSnippet> {
    Arc::new(InitVarSnippet {
        snippet: SnippetBase::new(&["mean", "sd"], vec![], vec![]),
        code: "value = mean + (gennrand_normal() * sd);".to_string(),
    })
}

/// Index into the weight kernel, used to initialise kernel weights to a ramp
pub fn kernel() -> Arc<InitVarSnippet> {
    Arc::new(InitVarSnippet {
        snippet: SnippetBase::new(&["scale"], vec![], vec![]),
        code: "value = scale * id_kernel;".to_string(),
    })
}

pub fn get_init_var_snippet(name: &str) -> Option<Arc<InitVarSnippet>> {
    match name {
        "Uninitialised" => Some(uninitialised()),
        "Constant" => Some(constant()),
        "Uniform" => Some(uniform()),
        "Normal" => Some(normal()),
        "Kernel" => Some(kernel()),
        _ => None,
    }
}
