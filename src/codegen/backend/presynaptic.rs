//! Ways of parallelising the propagation of presynaptic spikes. Each synapse
//! group uses the last registered strategy it is compatible with.

use crate::config::Preferences;
use crate::error::ConfigurationError;
use crate::groups::{MatrixConnectivity, ModelSpec, SpanType, SynapseGroup};
use crate::merged::synapse::SynapseMergedGroup;
use crate::transpiler::scan_code;
use crate::types::ResolvedType;
use crate::utils::ceil_divide;
use super::super::code_stream::CodeStream;
use super::super::environment::Environment;
use super::synapse_update::{
    gen_spike_block_loop, gen_synapse_code, kernel_index_template, SpikeSource, SynapseIndices,
};
use super::{add_egps, add_params, param_names, Backend, CodegenResult, Kernel};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresynapticStrategy {
    /// Thread per target neuron, spikes are processed a block at a time from shared memory
    PostSpan,
    /// One or more threads per spike, each walking part of a sparse row
    PreSpan,
    /// Threads per spike regenerate their part of the row from the connectivity code
    PreSpanProcedural,
    /// Thread per 32 target neurons, reading whole bitmask words
    PostSpanBitmask,
    /// Thread per diagonal of a Toeplitz matrix
    PostSpanToeplitz,
}

impl PresynapticStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PresynapticStrategy::PostSpan => "PostSpan",
            PresynapticStrategy::PreSpan => "PreSpan",
            PresynapticStrategy::PreSpanProcedural => "PreSpanProcedural",
            PresynapticStrategy::PostSpanBitmask => "PostSpanBitmask",
            PresynapticStrategy::PostSpanToeplitz => "PostSpanToeplitz",
        }
    }

    pub fn is_compatible(&self, sg: &SynapseGroup, preferences: &Preferences) -> bool {
        let connectivity = sg.matrix_type.connectivity;
        match self {
            PresynapticStrategy::PostSpan => {
                sg.span_type == SpanType::Postsynaptic
                    && !matches!(connectivity, MatrixConnectivity::Procedural | MatrixConnectivity::Toeplitz)
            },
            PresynapticStrategy::PreSpan => {
                sg.span_type == SpanType::Presynaptic && connectivity == MatrixConnectivity::Sparse
            },
            PresynapticStrategy::PreSpanProcedural => connectivity == MatrixConnectivity::Procedural,
            PresynapticStrategy::PostSpanBitmask => {
                connectivity == MatrixConnectivity::Bitmask && preferences.enable_bitmask_optimisations
            },
            PresynapticStrategy::PostSpanToeplitz => connectivity == MatrixConnectivity::Toeplitz,
        }
    }

    pub fn num_threads(&self, sg: &SynapseGroup) -> usize {
        match self {
            PresynapticStrategy::PostSpan => {
                if sg.is_sparse() {
                    sg.row_stride()
                } else {
                    sg.num_trg_neurons
                }
            },
            PresynapticStrategy::PreSpan | PresynapticStrategy::PreSpanProcedural => {
                sg.num_src_neurons * sg.num_threads_per_spike
            },
            PresynapticStrategy::PostSpanBitmask => ceil_divide(sg.num_trg_neurons, 32),
            PresynapticStrategy::PostSpanToeplitz => sg.max_connections,
        }
    }

    /// Does the strategy stage spikes through shared memory
    pub(crate) fn uses_shared_spikes(&self) -> bool {
        !matches!(self, PresynapticStrategy::PreSpan | PresynapticStrategy::PreSpanProcedural)
    }

    /// Emits the update of one merged group for either true spikes or spike-like events
    pub(crate) fn gen_update(
        &self,
        backend: &Backend,
        os: &mut CodeStream,
        model: &ModelSpec,
        merged: &SynapseMergedGroup<'_>,
        env: &Environment<'_>,
        true_spike: bool,
    ) -> CodegenResult<()> {
        let sg = merged.archetype();
        let source = SpikeSource::presynaptic(true_spike);
        let (tokens, description) = if true_spike {
            (&sg.wu_sim_tokens, format!("{} sim code", sg.description()))
        } else {
            (&sg.wu_event_tokens, format!("{} event code", sg.description()))
        };
        let block_size = backend.block_size(Kernel::PresynapticUpdate);

        os.line(&format!("// {}", if true_spike { "true spikes" } else { "spike-like events" }));
        os.line("{");
        match self {
            PresynapticStrategy::PostSpan => {
                let row_length = sg.is_sparse().then_some(("shRowLength", "group->rowLength"));
                gen_spike_block_loop(backend, os, block_size, &source, row_length, |os| {
                    match sg.matrix_type.connectivity {
                        MatrixConnectivity::Sparse => {
                            os.line("if(lid < group->rowStride) {");
                            os.line("const unsigned int synAddress = (shSpk[j] * group->rowStride) + lid;");
                            os.line("if(lid < shRowLength[j]) {");
                            os.line("const unsigned int ipost = group->ind[synAddress];");
                            let indices = SynapseIndices::new("shSpk[j]", "ipost").with_syn("synAddress");
                            os.line(&gen_synapse_code(backend, model, merged, env, &indices, tokens, &description, !true_spike)?);
                            os.line("}");
                            os.line("}");
                        },
                        MatrixConnectivity::Bitmask => {
                            os.line("if(lid < group->numTrgNeurons) {");
                            os.line("const uint64_t gid = (shSpk[j] * (uint64_t)group->rowStride) + lid;");
                            os.line("if(group->gp[gid / 32] & (1 << (gid & 31))) {");
                            let indices = SynapseIndices::new("shSpk[j]", "lid");
                            os.line(&gen_synapse_code(backend, model, merged, env, &indices, tokens, &description, !true_spike)?);
                            os.line("}");
                            os.line("}");
                        },
                        _ => {
                            os.line("if(lid < group->numTrgNeurons) {");
                            os.line("const unsigned int synAddress = (shSpk[j] * group->rowStride) + lid;");
                            let indices = SynapseIndices::new("shSpk[j]", "lid").with_syn("synAddress");
                            os.line(&gen_synapse_code(backend, model, merged, env, &indices, tokens, &description, !true_spike)?);
                            os.line("}");
                        },
                    }
                    Ok(())
                })?;
            },
            PresynapticStrategy::PreSpan => {
                let threads = sg.num_threads_per_spike;
                os.line(&format!("const unsigned int spike = lid / {};", threads));
                os.line(&format!("const unsigned int thread = lid % {};", threads));
                os.line(&format!("if(spike < group->{}[{}]) {{", source.count, source.slot));
                os.line(&format!("const unsigned int preInd = group->{}[{} + spike];", source.spikes, source.offset));
                os.line("unsigned int synAddress = (preInd * group->rowStride) + thread;");
                os.line("const unsigned int npost = group->rowLength[preInd];");
                os.line(&format!("for(unsigned int i = thread; i < npost; i += {}, synAddress += {}) {{", threads, threads));
                os.line("const unsigned int ipost = group->ind[synAddress];");
                let indices = SynapseIndices::new("preInd", "ipost").with_syn("synAddress");
                os.line(&gen_synapse_code(backend, model, merged, env, &indices, tokens, &description, !true_spike)?);
                os.line("}");
                os.line("}");
            },
            PresynapticStrategy::PreSpanProcedural => {
                let threads = sg.num_threads_per_spike;
                let init = sg.connectivity_initialiser.as_ref()
                    .filter(|c| !c.snippet.row_build_code.is_empty())
                    .ok_or(ConfigurationError::MissingConnectivityCode)?;

                os.line(&format!("const unsigned int spike = lid / {};", threads));
                os.line(&format!("const unsigned int thread = lid % {};", threads));
                os.line(&format!("if(spike < group->{}[{}]) {{", source.count, source.slot));
                os.line(&format!("const unsigned int preInd = group->{}[{} + spike];", source.spikes, source.offset));
                os.line(&format!("const unsigned int numPostPerThread = (group->numTrgNeurons + {}) / {};", threads - 1, threads));
                os.line("const unsigned int idPostStart = thread * numPostPerThread;");
                os.line("const unsigned int numPostRemaining = (idPostStart < group->numTrgNeurons) ? (group->numTrgNeurons - idPostStart) : 0;");
                os.line("const unsigned int numPost = (numPostPerThread < numPostRemaining) ? numPostPerThread : numPostRemaining;");

                let context = env.context().clone();
                let uint = ResolvedType::uint32().add_const();
                let mut row_env = env.nested();
                row_env.add("id_pre", uint.clone(), "preInd");
                row_env.add("id_post_begin", uint.clone(), "idPostStart");
                row_env.add("num_pre", uint.clone(), "group->numSrcNeurons");
                row_env.add("num_post", uint.clone(), "numPost");
                row_env.add("num_threads", uint.clone(), &threads.to_string());
                add_params(
                    &mut row_env, merged, &param_names(&init.snippet.snippet), "Conn", &context.scalar,
                    |name| init.get_value(name).unwrap_or_default(),
                );
                add_egps(&mut row_env, &init.snippet.snippet.extra_global_params, "Conn");
                backend.add_rng(&mut row_env, model.seed, &format!("(preInd * {}) + thread", threads));

                let kernel_args = if sg.has_kernel_weights() { sg.kernel_size.len() } else { 0 };
                let synapse_code = {
                    let indices = if kernel_args > 0 {
                        SynapseIndices::new("preInd", "id_post").with_kernel("kernelIdx")
                    } else {
                        SynapseIndices::new("preInd", "id_post")
                    };
                    gen_synapse_code(backend, model, merged, &row_env, &indices, tokens, &description, !true_spike)?
                };
                let mut template = String::from("do {\nconst unsigned int id_post = $(0);\n");
                if kernel_args > 0 {
                    template.push_str(&format!("const unsigned int kernelIdx = {};\n", kernel_index_template(kernel_args, 1)));
                }
                template.push_str(&synapse_code);
                template.push_str("} while(false)");
                row_env.add_function("addSynapse", ResolvedType::void(), vec![uint; 1 + kernel_args], &template);

                let row_description = format!("{} row build code", sg.description());
                let row_tokens = scan_code(&init.snippet.row_build_code, &row_description)?;
                let row_code = row_env.print_code(&row_tokens, &row_description)?;
                os.line(&row_env.preamble());
                os.line(&row_code);
                os.line("}");
            },
            PresynapticStrategy::PostSpanBitmask => {
                gen_spike_block_loop(backend, os, block_size, &source, None, |os| {
                    os.line("if(lid < (group->rowStride / 32)) {");
                    os.line("uint32_t connectivityWord = group->gp[(shSpk[j] * (group->rowStride / 32)) + lid];");
                    os.line("while(connectivityWord != 0) {");
                    os.line(&format!("const unsigned int bit = 31 - {}(connectivityWord);", backend.platform().clz()));
                    os.line("const unsigned int ipost = (lid * 32) + bit;");
                    let indices = SynapseIndices::new("shSpk[j]", "ipost");
                    os.line(&gen_synapse_code(backend, model, merged, env, &indices, tokens, &description, !true_spike)?);
                    os.line("connectivityWord &= ~(1u << bit);");
                    os.line("}");
                    os.line("}");
                    Ok(())
                })?;
            },
            PresynapticStrategy::PostSpanToeplitz => {
                let init = sg.toeplitz_initialiser.as_ref().ok_or(ConfigurationError::MissingConnectivityCode)?;
                let context = env.context().clone();
                let uint = ResolvedType::uint32().add_const();
                let kernel_args = sg.kernel_size.len().max(1);

                gen_spike_block_loop(backend, os, block_size, &source, None, |os| {
                    os.line("if(lid < group->rowStride) {");
                    let mut diagonal_env = env.nested();
                    diagonal_env.add("id_pre", uint.clone(), "shSpk[j]");
                    diagonal_env.add("id_diag", uint.clone(), "lid");
                    diagonal_env.add("num_pre", uint.clone(), "group->numSrcNeurons");
                    diagonal_env.add("num_post", uint.clone(), "group->numTrgNeurons");
                    add_params(
                        &mut diagonal_env, merged, &param_names(&init.snippet.snippet), "Toeplitz", &context.scalar,
                        |name| init.get_value(name).unwrap_or_default(),
                    );

                    let synapse_code = {
                        let indices = SynapseIndices::new("shSpk[j]", "id_post").with_kernel("kernelIdx");
                        gen_synapse_code(backend, model, merged, &diagonal_env, &indices, tokens, &description, !true_spike)?
                    };
                    let template = format!(
                        "do {{\nconst unsigned int id_post = $(0);\nconst unsigned int kernelIdx = {};\n{}}} while(false)",
                        kernel_index_template(kernel_args, 1), synapse_code
                    );
                    diagonal_env.add_function("addSynapse", ResolvedType::void(), vec![uint.clone(); 1 + kernel_args], &template);

                    let diagonal_description = format!("{} diagonal build code", sg.description());
                    let diagonal_tokens = scan_code(&init.snippet.diagonal_build_code, &diagonal_description)?;
                    let diagonal_code = diagonal_env.print_code(&diagonal_tokens, &diagonal_description)?;
                    os.line(&diagonal_env.preamble());
                    os.line(&diagonal_code);
                    os.line("}");
                    Ok(())
                })?;
            },
        }
        os.line("}");

        Ok(())
    }
}

/// Ordered presynaptic strategies, later strategies take priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyRegistry {
    strategies: Vec<PresynapticStrategy>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        StrategyRegistry {
            strategies: vec![
                PresynapticStrategy::PreSpan,
                PresynapticStrategy::PostSpan,
                PresynapticStrategy::PreSpanProcedural,
                PresynapticStrategy::PostSpanBitmask,
                PresynapticStrategy::PostSpanToeplitz,
            ],
        }
    }
}

impl StrategyRegistry {
    /// Registry with no strategies
    pub fn new() -> Self {
        StrategyRegistry { strategies: vec![] }
    }

    /// Adds a strategy, taking priority over every strategy already registered
    pub fn register(&mut self, strategy: PresynapticStrategy) {
        self.strategies.retain(|s| *s != strategy);
        self.strategies.push(strategy);
    }

    pub fn strategies(&self) -> &[PresynapticStrategy] {
        &self.strategies
    }

    pub fn select(&self, sg: &SynapseGroup, preferences: &Preferences) -> Result<PresynapticStrategy, ConfigurationError> {
        self.strategies.iter().rev()
            .find(|s| s.is_compatible(sg, preferences))
            .copied()
            .ok_or_else(|| ConfigurationError::NoPresynapticStrategy(sg.name.clone()))
    }
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use crate::config::Preferences;
    use crate::groups::{
        ConnectivityInit, MatrixType, ModelSpec, PostsynapticInit, SpanType, WeightUpdateInit,
    };
    use crate::models::{
        init_sparse_connectivity_snippets, neuron_models, param_values, postsynaptic_models,
        weight_update_models, SparseConnectivityInit, VarInit,
    };
    use super::{PresynapticStrategy, StrategyRegistry};

    fn model_with(matrix_type: MatrixType, span_type: SpanType) -> ModelSpec {
        let mut model = ModelSpec::new("strategies");
        model.add_neuron_population("Pre", 100, neuron_models::spike_source(), param_values(&[]), BTreeMap::new()).unwrap();
        model.add_neuron_population("Post", 50, neuron_models::spike_source(), param_values(&[]), BTreeMap::new()).unwrap();

        let vars = [("g".to_string(), VarInit::constant(0.1))].into_iter().collect();
        let connectivity = if matrix_type == MatrixType::dense() {
            ConnectivityInit::Uninitialised
        } else {
            ConnectivityInit::Sparse(SparseConnectivityInit::new(
                init_sparse_connectivity_snippets::fixed_probability(),
                param_values(&[("prob", 0.1)]),
            ))
        };
        model.add_synapse_population(
            "Syn", matrix_type, "Pre", "Post",
            WeightUpdateInit::new(weight_update_models::static_pulse(), param_values(&[]), vars),
            PostsynapticInit::new(postsynaptic_models::delta_curr(), param_values(&[]), BTreeMap::new()),
            connectivity,
        ).unwrap();
        model.synapse_group_mut("Syn").unwrap().set_span_type(span_type);
        model.finalise().unwrap();
        model
    }

    #[test]
    fn test_default_selection() {
        let preferences = Preferences::default();
        let registry = StrategyRegistry::default();

        let sparse = model_with(MatrixType::sparse(), SpanType::Postsynaptic);
        assert_eq!(registry.select(&sparse.synapse_groups[0], &preferences).unwrap(), PresynapticStrategy::PostSpan);

        let pre_span = model_with(MatrixType::sparse(), SpanType::Presynaptic);
        assert_eq!(registry.select(&pre_span.synapse_groups[0], &preferences).unwrap(), PresynapticStrategy::PreSpan);

        let procedural = model_with(MatrixType::procedural(), SpanType::Postsynaptic);
        assert_eq!(
            registry.select(&procedural.synapse_groups[0], &preferences).unwrap(),
            PresynapticStrategy::PreSpanProcedural
        );
    }

    #[test]
    fn test_bitmask_optimisations() {
        let model = model_with(MatrixType::bitmask(), SpanType::Postsynaptic);
        let registry = StrategyRegistry::default();
        let sg = &model.synapse_groups[0];

        assert_eq!(registry.select(sg, &Preferences::default()).unwrap(), PresynapticStrategy::PostSpan);

        let preferences = Preferences { enable_bitmask_optimisations: true, ..Preferences::default() };
        let strategy = registry.select(sg, &preferences).unwrap();
        assert_eq!(strategy, PresynapticStrategy::PostSpanBitmask);
        assert_eq!(strategy.num_threads(sg), 2);
    }

    #[test]
    fn test_empty_registry_fails() {
        let model = model_with(MatrixType::dense(), SpanType::Postsynaptic);
        let registry = StrategyRegistry::new();

        assert!(registry.select(&model.synapse_groups[0], &Preferences::default()).is_err());
    }

    #[test]
    fn test_registration_order_decides_strategy() {
        let model = model_with(MatrixType::bitmask(), SpanType::Postsynaptic);
        let sg = &model.synapse_groups[0];
        let preferences = Preferences { enable_bitmask_optimisations: true, ..Preferences::default() };
        assert!(PresynapticStrategy::PostSpan.is_compatible(sg, &preferences));
        assert!(PresynapticStrategy::PostSpanBitmask.is_compatible(sg, &preferences));

        let mut registry = StrategyRegistry::new();
        registry.register(PresynapticStrategy::PostSpanBitmask);
        registry.register(PresynapticStrategy::PostSpan);
        assert_eq!(registry.select(sg, &preferences).unwrap(), PresynapticStrategy::PostSpan);

        registry.register(PresynapticStrategy::PostSpanBitmask);
        assert_eq!(registry.select(sg, &preferences).unwrap(), PresynapticStrategy::PostSpanBitmask);
        assert_eq!(
            registry.strategies(),
            &[PresynapticStrategy::PostSpan, PresynapticStrategy::PostSpanBitmask],
        );
    }
}
