use std::sync::Arc;
use super::{DerivedParam, InitSparseConnectivitySnippet, SnippetBase};


fn log_sum(a: f64, b: f64) -> f64 {
    let (max, min) = if a > b { (a, b) } else { (b, a) };
    max + (min - max).exp().ln_1p()
}

/// Smallest `k` such that the binomial CDF of `k` successes exceeds `cdf`
pub fn binomial_inverse_cdf(cdf: f64, n: usize, p: f64) -> usize {
    if p <= 0.0 || n == 0 {
        return 0;
    }
    if p >= 1.0 {
        return n;
    }

    let log_cdf = cdf.ln();
    let log_p = p.ln();
    let log_1_minus_p = (1.0 - p).ln();

    let mut log_prob_k = n as f64 * log_1_minus_p;
    let mut log_cumulative_prob_k = log_prob_k;
    for k in 0..n {
        if log_cumulative_prob_k > log_cdf {
            return k;
        }

        log_prob_k += log_p - log_1_minus_p + ((n - k) as f64).ln() - (1.0 + k as f64).ln();
        log_cumulative_prob_k = log_sum(log_cumulative_prob_k, log_prob_k);
    }

    n
}

/// Quantile used so the probability of any row overflowing is below 1e-4
fn row_quantile(num_rows: usize) -> f64 {
    0.9999f64.powf(1.0 / num_rows.max(1) as f64)
}

pub fn one_to_one() -> Arc<InitSparseConnectivitySnippet> {
    Arc::new(InitSparseConnectivitySnippet {
        snippet: SnippetBase::default(),
        row_build_code: "addSynapse(id_pre + id_post_begin);".to_string(),
        col_build_code: String::new(),
        calc_max_row_length: Some(|_, _, _| 1),
        calc_max_col_length: Some(|_, _, _| 1),
    })
}

const FIXED_PROBABILITY_ROW_BUILD: [&str; 11] = [
    "int prevJ = -1;",
    "while(true) {",
    "    const scalar u = gennrand_uniform();",
    "    prevJ += (1 + (int)(log(u) * probLogRecip));",
    "    if(prevJ < num_post) {",
    "        addSynapse(prevJ + id_post_begin);",
    "    }",
    "    else {",
    "        break;",
    "    }",
    "}",
];

fn fixed_probability_snippet(row_build_code: String) -> InitSparseConnectivitySnippet {
    InitSparseConnectivitySnippet {
        snippet: SnippetBase::new(
            &["prob"],
            vec![DerivedParam::new("probLogRecip", |p, _| 1.0 / (1.0 - p["prob"]).ln())],
            vec![],
        ),
        row_build_code,
        col_build_code: String::new(),
        calc_max_row_length: Some(|num_pre, num_post, p| binomial_inverse_cdf(row_quantile(num_pre), num_post, p["prob"])),
        calc_max_col_length: Some(|num_pre, num_post, p| binomial_inverse_cdf(row_quantile(num_post), num_pre, p["prob"])),
    }
}

/// Each possible synapse exists independently with probability `prob`
pub fn fixed_probability() -> Arc<InitSparseConnectivitySnippet> {
    Arc::new(fixed_probability_snippet(FIXED_PROBABILITY_ROW_BUILD.join("\n")))
}

/// As fixed probability but without connections from a neuron to itself
pub fn fixed_probability_no_autapse() -> Arc<InitSparseConnectivitySnippet> {
    let row_build_code = [
        "int prevJ = -1;",
        "while(true) {",
        "    int nextJ;",
        "    do {",
        "        const scalar u = gennrand_uniform();",
        "        nextJ = prevJ + (1 + (int)(log(u) * probLogRecip));",
        "    } while(nextJ == id_pre);",
        "    prevJ = nextJ;",
        "    if(prevJ < num_post) {",
        "        addSynapse(prevJ + id_post_begin);",
        "    }",
        "    else {",
        "        break;",
        "    }",
        "}",
    ].join("\n");

    Arc::new(fixed_probability_snippet(row_build_code))
}

/// Each postsynaptic neuron receives `num` connections drawn with replacement
pub fn fixed_number_pre_with_replacement() -> Arc<InitSparseConnectivitySnippet> {
    Arc::new(InitSparseConnectivitySnippet {
        snippet: SnippetBase::new(&["num"], vec![], vec![]),
        row_build_code: String::new(),
        col_build_code: [
            "for(unsigned int i = 0; i < num; i++) {",
            "    const unsigned int idPre = (unsigned int)(gennrand_uniform() * num_pre);",
            "    addSynapse(idPre + id_pre_begin);",
            "}",
        ].join("\n"),
        calc_max_row_length: Some(|num_pre, num_post, p| {
            let num_connections = p["num"] as usize * num_post;
            binomial_inverse_cdf(row_quantile(num_pre), num_connections, 1.0 / num_pre.max(1) as f64)
        }),
        calc_max_col_length: Some(|_, _, p| p["num"] as usize),
    })
}

pub fn get_sparse_connectivity_snippet(name: &str) -> Option<Arc<InitSparseConnectivitySnippet>> {
    match name {
        "OneToOne" => Some(one_to_one()),
        "FixedProbability" => Some(fixed_probability()),
        "FixedProbabilityNoAutapse" => Some(fixed_probability_no_autapse()),
        "FixedNumberPreWithReplacement" => Some(fixed_number_pre_with_replacement()),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::param_values;

    #[test]
    fn test_binomial_inverse_cdf() {
        assert_eq!(binomial_inverse_cdf(0.5, 10, 0.0), 0);
        assert_eq!(binomial_inverse_cdf(0.5, 10, 1.0), 10);

        let max_row = binomial_inverse_cdf(row_quantile(1000), 1000, 0.1);
        assert!(max_row > 100 && max_row < 200);
    }

    #[test]
    fn test_max_lengths() {
        let params = param_values(&[("prob", 0.1)]);
        let snippet = fixed_probability();
        let max_row = (snippet.calc_max_row_length.unwrap())(1000, 1000, &params);

        assert!(max_row >= 100);
        assert!(max_row <= 1000);
        assert_eq!((one_to_one().calc_max_row_length.unwrap())(10, 10, &params), 1);
    }
}
