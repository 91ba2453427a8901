use std::sync::Arc;
use super::{CustomUpdateModel, SnippetBase, VarAccessMode, VarRef};


/// Transposes a weight variable into the variable of another synapse group
pub fn transpose() -> Arc<CustomUpdateModel> {
    Arc::new(CustomUpdateModel {
        snippet: SnippetBase::default(),
        vars: vec![],
        var_refs: vec![VarRef::new("variable", "scalar", VarAccessMode::ReadWrite)],
        update_code: String::new(),
    })
}

pub fn get_custom_update_model(name: &str) -> Option<Arc<CustomUpdateModel>> {
    match name {
        "Transpose" => Some(transpose()),
        _ => None,
    }
}
