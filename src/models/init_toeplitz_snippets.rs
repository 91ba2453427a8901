use std::sync::Arc;
use super::{InitToeplitzConnectivitySnippet, SnippetBase};


/// One dimensional convolution, each diagonal corresponds to one kernel entry
pub fn conv_1d() -> Arc<InitToeplitzConnectivitySnippet> {
    Arc::new(InitToeplitzConnectivitySnippet {
        snippet: SnippetBase::new(&["conv_kw"], vec![], vec![]),
        diagonal_build_code: [
            "const int idPost = (int)id_pre - (int)id_diag;",
            "if(idPost >= 0 && idPost < (int)num_post) {",
            "    addSynapse(idPost, id_diag);",
            "}",
        ].join("\n"),
        calc_max_row_length: Some(|_, _, p| p["conv_kw"] as usize),
        calc_kernel_size: Some(|p| vec![p["conv_kw"] as usize]),
    })
}

pub fn get_toeplitz_snippet(name: &str) -> Option<Arc<InitToeplitzConnectivitySnippet>> {
    match name {
        "Conv1D" => Some(conv_1d()),
        _ => None,
    }
}
