//! Presynaptic, postsynaptic and synapse dynamics kernels along with the
//! substitutions shared by every piece of code which runs per synapse.

use crate::error::ConfigurationError;
use crate::groups::{MatrixConnectivity, MatrixWeight, ModelSpec};
use crate::merged::{var_type, ModelMerged};
use crate::merged::synapse::SynapseMergedGroup;
use crate::models::Var;
use crate::transpiler::scan_code;
use crate::transpiler::token::Token;
use crate::types::ResolvedType;
use super::super::code_stream::CodeStream;
use super::super::environment::Environment;
use super::platform::{KernelArg, MemorySpace};
use super::{
    add_egps, add_params, param_names, step_rng_sequence, wrap_code, Backend, CodegenResult, Kernel,
    KernelLayout, ModuleSource, RNG_ENTRY,
};


/// C expressions of the indices a piece of per synapse code runs at
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SynapseIndices {
    pub id_pre: String,
    pub id_post: String,
    /// Index into synaptic arrays, only synapses with stored connectivity have one
    pub id_syn: Option<String>,
    pub id_kernel: Option<String>,
}

impl SynapseIndices {
    pub fn new(id_pre: &str, id_post: &str) -> Self {
        SynapseIndices { id_pre: id_pre.to_string(), id_post: id_post.to_string(), id_syn: None, id_kernel: None }
    }

    pub fn with_syn(mut self, id_syn: &str) -> Self {
        self.id_syn = Some(id_syn.to_string());
        self
    }

    pub fn with_kernel(mut self, id_kernel: &str) -> Self {
        self.id_kernel = Some(id_kernel.to_string());
        self
    }
}

/// Spike arrays a kernel reads along with the slot and offset they are read at
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpikeSource {
    pub count: &'static str,
    pub spikes: &'static str,
    pub slot: &'static str,
    pub offset: &'static str,
}

impl SpikeSource {
    pub fn presynaptic(true_spike: bool) -> Self {
        let (count, spikes) = if true_spike { ("srcSpkCnt", "srcSpk") } else { ("srcSpkCntEvnt", "srcSpkEvnt") };
        SpikeSource { count, spikes, slot: "preBatchDelaySlot", offset: "preDelayOffset" }
    }

    pub fn postsynaptic() -> Self {
        SpikeSource { count: "trgSpkCnt", spikes: "trgSpk", slot: "postBatchDelaySlot", offset: "postDelayOffset" }
    }
}

pub(crate) fn kernel_size_product(num_dims: usize) -> String {
    let sizes: Vec<String> = (0..num_dims).map(|d| format!("group->kernelSize{}", d)).collect();
    format!("({})", sizes.join(" * "))
}

/// Row-major flattening of kernel indices passed as function arguments starting at `first_arg`
pub(crate) fn kernel_index_template(num_dims: usize, first_arg: usize) -> String {
    let mut index = format!("$({})", first_arg);
    for d in 1..num_dims {
        index = format!("(({}) * group->kernelSize{}) + $({})", index, d, first_arg + d);
    }
    index
}

/// Batch and delay offsets into the arrays of both populations
pub(crate) fn gen_synapse_offsets(os: &mut CodeStream, model: &ModelSpec, merged: &SynapseMergedGroup<'_>) {
    let sg = merged.archetype();
    let src = &model.neuron_groups[sg.src];
    let trg = &model.neuron_groups[sg.trg];

    os.line("const unsigned int preBatchOffset = batch * group->numSrcNeurons;");
    os.line("const unsigned int postBatchOffset = batch * group->numTrgNeurons;");
    os.line("const unsigned int synBatchOffset = preBatchOffset * group->rowStride;");
    if !sg.kernel_size.is_empty() {
        os.line(&format!("const unsigned int kernBatchOffset = batch * {};", kernel_size_product(sg.kernel_size.len())));
    }

    if src.is_delay_required() {
        let slots = src.num_delay_slots;
        os.line(&format!(
            "const unsigned int preBatchDelaySlot = (batch * {}) + ((*group->srcSpkQuePtr + {}) % {});",
            slots, slots.saturating_sub(sg.axonal_delay_steps), slots
        ));
    } else {
        os.line("const unsigned int preBatchDelaySlot = batch;");
    }
    os.line("const unsigned int preDelayOffset = preBatchDelaySlot * group->numSrcNeurons;");

    if trg.is_delay_required() {
        let slots = trg.num_delay_slots;
        os.line(&format!(
            "const unsigned int postBatchDelaySlot = (batch * {}) + ((*group->trgSpkQuePtr + {}) % {});",
            slots, slots.saturating_sub(sg.back_prop_delay_steps), slots
        ));
    } else {
        os.line("const unsigned int postBatchDelaySlot = batch;");
    }
    os.line("const unsigned int postDelayOffset = postBatchDelaySlot * group->numTrgNeurons;");
}

/// Adds a procedural weight, generated from its initialiser when first used
fn add_procedural_var(
    backend: &Backend,
    env: &mut Environment<'_>,
    merged: &SynapseMergedGroup<'_>,
    var: &Var,
    indices: &SynapseIndices,
) -> CodegenResult<()> {
    let sg = merged.archetype();
    let Some(var_init) = sg.wu_var_initialisers.get(&var.name) else { return Ok(()) };
    let context = env.context().clone();
    let ty = var_type(var, &context);
    let local = format!("_l{}", var.name);
    let uint = ResolvedType::uint32().add_const();

    let mut init_env = backend.base_environment(&context);
    backend.add_shared_rng(&mut init_env);
    init_env.add("value", ty.clone(), &local);
    init_env.add("id_pre", uint.clone(), &indices.id_pre);
    init_env.add("id_post", uint, &indices.id_post);
    add_params(
        &mut init_env, merged, &param_names(&var_init.snippet.snippet), &var.name, &context.scalar,
        |name| var_init.get_value(name).unwrap_or_default(),
    );

    let description = format!("{} variable '{}' initialisation", sg.description(), var.name);
    let tokens = scan_code(&var_init.snippet.code, &description)?;
    let code = init_env.print_code(&tokens, &description)?;
    let uses_rng = ["gennrand_uniform", "gennrand_normal", "gennrand_exponential"].iter().any(|f| init_env.is_used(f));

    let initialiser = format!("{} {};\n{{\n{}{}\n}}", ty.get_name(), local, init_env.preamble(), code);
    let dependencies = if uses_rng { vec![RNG_ENTRY.to_string()] } else { vec![] };
    env.add_full(&var.name, ty.add_const(), &local, Some(initialiser), None, dependencies);

    Ok(())
}

/// Names available to weight update code running for one synapse
pub(crate) fn add_synapse_substitutions(
    backend: &Backend,
    env: &mut Environment<'_>,
    model: &ModelSpec,
    merged: &SynapseMergedGroup<'_>,
    indices: &SynapseIndices,
) -> CodegenResult<()> {
    let sg = merged.archetype();
    let context = env.context().clone();
    let scalar = context.scalar.clone();
    let uint = ResolvedType::uint32().add_const();
    let batched = model.batch_size > 1;

    env.add("id_pre", uint.clone(), &indices.id_pre);
    env.add("id_post", uint.clone(), &indices.id_post);
    if let Some(id_syn) = &indices.id_syn {
        env.add("id_syn", uint.clone(), id_syn);
    }
    env.add("num_pre", uint.clone(), "group->numSrcNeurons");
    env.add("num_post", uint.clone(), "group->numTrgNeurons");
    env.add("num_batch", uint, &model.batch_size.to_string());

    add_params(
        env, merged, &param_names(&sg.wu_model.snippet), "", &scalar,
        |name| sg.get_wu_param_value(name).unwrap_or_default(),
    );
    add_egps(env, &sg.wu_model.snippet.extra_global_params, "");

    // Neuron variables of either population
    let populations = [
        (&model.neuron_groups[sg.src], "Pre", "_pre", "preBatchOffset", &indices.id_pre),
        (&model.neuron_groups[sg.trg], "Post", "_post", "postBatchOffset", &indices.id_post),
    ];
    for (ng, field_suffix, name_suffix, batch_offset, index) in populations {
        for var in &ng.model.vars {
            let field = format!("{}{}", var.name, field_suffix);
            if !merged.has_field(&field) {
                continue;
            }
            let index = if batched && var.access.is_duplicated() {
                format!("{} + {}", batch_offset, index)
            } else {
                index.clone()
            };
            env.add(
                &format!("{}{}", var.name, name_suffix),
                var_type(var, &context).add_const(),
                &format!("group->{}[{}]", field, index),
            );
        }
    }

    let spike_times = [
        ("sTPre", "st_pre", "preDelayOffset", &indices.id_pre),
        ("prevSTPre", "prev_st_pre", "preDelayOffset", &indices.id_pre),
        ("sTPost", "st_post", "postDelayOffset", &indices.id_post),
        ("prevSTPost", "prev_st_post", "postDelayOffset", &indices.id_post),
    ];
    for (field, name, offset, index) in spike_times {
        if merged.has_field(field) {
            env.add(name, context.timepoint.add_const(), &format!("group->{}[{} + {}]", field, offset, index));
        }
    }

    let atomic = backend.atomic_add(&scalar, MemorySpace::Global);
    env.add_function(
        "addToPost", ResolvedType::void(), vec![scalar.clone()],
        &format!("{}(&group->outPost[postBatchOffset + {}], $(0))", atomic, indices.id_post),
    );
    if merged.has_field("denDelay") {
        env.add_function(
            "addToPostDelay", ResolvedType::void(), vec![scalar.clone(), ResolvedType::uint32()],
            &format!(
                "{}(&group->denDelay[((((*group->denDelayPtr + $(1) + 1) % group->maxDendriticDelayTimesteps) + (batch * group->maxDendriticDelayTimesteps)) * group->numTrgNeurons) + {}], $(0))",
                atomic, indices.id_post
            ),
        );
    }
    if merged.has_field("outPre") {
        env.add_function(
            "addToPre", ResolvedType::void(), vec![scalar.clone()],
            &format!("{}(&group->outPre[preBatchOffset + {}], $(0))", atomic, indices.id_pre),
        );
    }

    for var in &sg.wu_model.vars {
        let ty = var_type(var, &context);
        let ty = if var.access.is_read_only() { ty.add_const() } else { ty };
        let duplicated = batched && var.access.is_duplicated();
        match sg.matrix_type.weight {
            MatrixWeight::Individual => {
                let Some(id_syn) = &indices.id_syn else { continue };
                let index = if duplicated { format!("synBatchOffset + {}", id_syn) } else { id_syn.clone() };
                env.add(&var.name, ty, &format!("group->{}[{}]", var.name, index));
            },
            MatrixWeight::Kernel => {
                let Some(id_kernel) = &indices.id_kernel else { continue };
                let index = if duplicated { format!("kernBatchOffset + {}", id_kernel) } else { id_kernel.clone() };
                env.add(&var.name, ty, &format!("group->{}[{}]", var.name, index));
            },
            MatrixWeight::Global => {
                let value = sg.wu_var_initialisers.get(&var.name)
                    .and_then(|v| v.get_value("constant"))
                    .unwrap_or_default();
                env.add(&var.name, ty.add_const(), &ty.write_numeric(value));
            },
            MatrixWeight::Procedural => add_procedural_var(backend, env, merged, var, indices)?,
        }
    }

    Ok(())
}

/// Prints per synapse code in its own block, guarded by the event threshold for spike-like events
#[allow(clippy::too_many_arguments)]
pub(crate) fn gen_synapse_code(
    backend: &Backend,
    model: &ModelSpec,
    merged: &SynapseMergedGroup<'_>,
    env: &Environment<'_>,
    indices: &SynapseIndices,
    tokens: &[Token],
    description: &str,
    event_threshold: bool,
) -> CodegenResult<String> {
    let sg = merged.archetype();
    let mut synapse_env = env.nested();
    add_synapse_substitutions(backend, &mut synapse_env, model, merged, indices)?;

    let mut code = synapse_env.print_code(tokens, description)?;
    if event_threshold {
        let threshold = synapse_env.print_expression(
            &sg.wu_event_threshold_tokens,
            &format!("{} event threshold condition", sg.description()),
        )?;
        code = format!("if({}) {{\n{}\n}}", threshold, code);
    }

    Ok(format!("{{\n{}\n}}\n", wrap_code(&synapse_env.preamble(), &code, &synapse_env.postamble())))
}

/// Loads spikes into shared memory a block at a time, `body` runs once per spike of each block
pub(crate) fn gen_spike_block_loop(
    backend: &Backend,
    os: &mut CodeStream,
    block_size: usize,
    source: &SpikeSource,
    length: Option<(&str, &str)>,
    body: impl FnOnce(&mut CodeStream) -> CodegenResult<()>,
) -> CodegenResult<()> {
    let tid = backend.platform().thread_id();
    let barrier = backend.platform().barrier();

    os.line(&format!("const unsigned int numSpikes = group->{}[{}];", source.count, source.slot));
    os.line(&format!("const unsigned int numSpikeBlocks = (numSpikes + {}) / {};", block_size - 1, block_size));
    os.line("for(unsigned int r = 0; r < numSpikeBlocks; r++) {");
    os.line(&format!(
        "const unsigned int numSpikesInBlock = (r == numSpikeBlocks - 1) ? ((numSpikes - 1) % {}) + 1 : {};",
        block_size, block_size
    ));
    os.line(&format!("{};", barrier));
    os.line(&format!("if({} < numSpikesInBlock) {{", tid));
    os.line(&format!("const unsigned int spk = group->{}[{} + (r * {}) + {}];", source.spikes, source.offset, block_size, tid));
    os.line(&format!("shSpk[{}] = spk;", tid));
    if let Some((shared, array)) = length {
        os.line(&format!("{}[{}] = {}[spk];", shared, tid, array));
    }
    os.line("}");
    os.line(&format!("{};", barrier));
    os.line("for(unsigned int j = 0; j < numSpikesInBlock; j++) {");
    body(os)?;
    os.line("}");
    os.line("}");

    Ok(())
}

/// Environment every synapse kernel starts from, with a generator seeded per step
fn synapse_kernel_environment(backend: &Backend, model: &ModelSpec, num_threads: usize) -> Environment<'static> {
    let context = model.type_context();
    let mut env = backend.base_environment(&context);
    env.add("t", context.timepoint.add_const(), "t");
    backend.add_rng(&mut env, model.seed, &step_rng_sequence(model.batch_size, num_threads));
    env
}

fn gen_presynaptic_kernel(
    backend: &Backend,
    os: &mut CodeStream,
    model: &ModelSpec,
    groups: &[&SynapseMergedGroup<'_>],
    args: &[KernelArg],
) -> CodegenResult<KernelLayout> {
    let kernel = Kernel::PresynapticUpdate;
    let block_size = backend.block_size(kernel);
    let mut layout = KernelLayout::default();
    layout.append(groups, block_size, |sg| Ok(backend.num_presynaptic_update_threads(sg)?))?;

    let mut shared_spikes = false;
    for merged in groups {
        shared_spikes |= backend.strategies().select(merged.archetype(), backend.preferences())?.uses_shared_spikes();
    }

    backend.gen_start_id_tables(os, &layout);
    backend.gen_kernel_header(os, kernel.name(), args);
    backend.gen_kernel_ids(os, kernel, true);
    if shared_spikes {
        let shared = backend.platform().shared_prefix();
        os.line(&format!("{}unsigned int shSpk[{}];", shared, block_size));
        os.line(&format!("{}unsigned int shRowLength[{}];", shared, block_size));
    }
    os.blank();

    let num_threads = layout.num_threads;
    backend.gen_parallel_groups(os, groups, &layout, |os, merged| {
        let sg = merged.archetype();
        let strategy = backend.strategies().select(sg, backend.preferences())?;
        os.line(&format!("// {} strategy", strategy.name()));
        gen_synapse_offsets(os, model, merged);

        let env = synapse_kernel_environment(backend, model, num_threads);
        let mut body = CodeStream::new();
        if sg.is_true_spike_required() {
            strategy.gen_update(backend, &mut body, model, merged, &env, true)?;
        }
        if sg.is_spike_event_required() {
            strategy.gen_update(backend, &mut body, model, merged, &env, false)?;
        }
        os.line(&env.preamble());
        os.line(body.as_str());
        Ok(())
    })?;
    os.line("}");
    os.blank();

    Ok(layout)
}

fn gen_postsynaptic_kernel(
    backend: &Backend,
    os: &mut CodeStream,
    model: &ModelSpec,
    groups: &[&SynapseMergedGroup<'_>],
    args: &[KernelArg],
) -> CodegenResult<KernelLayout> {
    let kernel = Kernel::PostsynapticUpdate;
    let block_size = backend.block_size(kernel);
    let mut layout = KernelLayout::default();
    layout.append(groups, block_size, |sg| Ok(backend.num_postsynaptic_update_threads(sg)))?;

    backend.gen_start_id_tables(os, &layout);
    backend.gen_kernel_header(os, kernel.name(), args);
    backend.gen_kernel_ids(os, kernel, true);
    let shared = backend.platform().shared_prefix();
    os.line(&format!("{}unsigned int shSpk[{}];", shared, block_size));
    os.line(&format!("{}unsigned int shColLength[{}];", shared, block_size));
    os.blank();

    let num_threads = layout.num_threads;
    backend.gen_parallel_groups(os, groups, &layout, |os, merged| {
        let sg = merged.archetype();
        if !matches!(sg.matrix_type.connectivity, MatrixConnectivity::Dense | MatrixConnectivity::Sparse) {
            return Err(ConfigurationError::Unsupported(format!(
                "{} postsynaptic learning requires dense or sparse connectivity", sg.description()
            )).into());
        }
        gen_synapse_offsets(os, model, merged);

        let env = synapse_kernel_environment(backend, model, num_threads);
        let description = format!("{} learn post code", sg.description());
        let mut body = CodeStream::new();
        let col_length = sg.is_sparse().then_some(("shColLength", "group->colLength"));
        gen_spike_block_loop(backend, &mut body, block_size, &SpikeSource::postsynaptic(), col_length, |os| {
            if sg.is_sparse() {
                os.line("if(lid < shColLength[j]) {");
                os.line("const unsigned int synAddress = group->remap[(shSpk[j] * group->colStride) + lid];");
                os.line("const unsigned int ipre = synAddress / group->rowStride;");
                let indices = SynapseIndices::new("ipre", "shSpk[j]").with_syn("synAddress");
                os.line(&gen_synapse_code(backend, model, merged, &env, &indices, &sg.wu_learn_post_tokens, &description, false)?);
            } else {
                os.line("if(lid < group->numSrcNeurons) {");
                os.line("const unsigned int synAddress = (lid * group->rowStride) + shSpk[j];");
                let indices = SynapseIndices::new("lid", "shSpk[j]").with_syn("synAddress");
                os.line(&gen_synapse_code(backend, model, merged, &env, &indices, &sg.wu_learn_post_tokens, &description, false)?);
            }
            os.line("}");
            Ok(())
        })?;
        os.line(&env.preamble());
        os.line(body.as_str());
        Ok(())
    })?;
    os.line("}");
    os.blank();

    Ok(layout)
}

fn gen_synapse_dynamics_kernel(
    backend: &Backend,
    os: &mut CodeStream,
    model: &ModelSpec,
    groups: &[&SynapseMergedGroup<'_>],
    args: &[KernelArg],
) -> CodegenResult<KernelLayout> {
    let kernel = Kernel::SynapseDynamicsUpdate;
    let block_size = backend.block_size(kernel);
    let mut layout = KernelLayout::default();
    layout.append(groups, block_size, |sg| Ok(backend.num_synapse_dynamics_threads(sg)))?;

    backend.gen_start_id_tables(os, &layout);
    backend.gen_kernel_header(os, kernel.name(), args);
    backend.gen_kernel_ids(os, kernel, true);
    os.blank();

    let num_threads = layout.num_threads;
    backend.gen_parallel_groups(os, groups, &layout, |os, merged| {
        let sg = merged.archetype();
        gen_synapse_offsets(os, model, merged);

        let env = synapse_kernel_environment(backend, model, num_threads);
        let description = format!("{} synapse dynamics code", sg.description());
        let tokens = &sg.wu_synapse_dynamics_tokens;
        let mut body = CodeStream::new();
        match sg.matrix_type.connectivity {
            MatrixConnectivity::Sparse => {
                body.line("const unsigned int row = lid / group->rowStride;");
                body.line("const unsigned int col = lid % group->rowStride;");
                body.line("if(row < group->numSrcNeurons && col < group->rowLength[row]) {");
                body.line("const unsigned int ipost = group->ind[lid];");
                let indices = SynapseIndices::new("row", "ipost").with_syn("lid");
                body.line(&gen_synapse_code(backend, model, merged, &env, &indices, tokens, &description, false)?);
                body.line("}");
            },
            MatrixConnectivity::Dense => {
                body.line("if(lid < (group->numSrcNeurons * group->numTrgNeurons)) {");
                let indices = SynapseIndices::new("(lid / group->numTrgNeurons)", "(lid % group->numTrgNeurons)").with_syn("lid");
                body.line(&gen_synapse_code(backend, model, merged, &env, &indices, tokens, &description, false)?);
                body.line("}");
            },
            connectivity => {
                return Err(ConfigurationError::Unsupported(format!(
                    "{} synapse dynamics cannot be used with {:?} connectivity", sg.description(), connectivity
                )).into());
            },
        }
        os.line(&env.preamble());
        os.line(body.as_str());
        Ok(())
    })?;
    os.line("}");
    os.blank();

    Ok(layout)
}

fn gen_dendritic_delay_kernel(
    backend: &Backend,
    os: &mut CodeStream,
    groups: &[&SynapseMergedGroup<'_>],
    args: &[KernelArg],
) -> CodegenResult<usize> {
    let kernel = Kernel::SynapseDendriticDelayUpdate;
    backend.gen_kernel_header(os, kernel.name(), args);
    backend.gen_kernel_ids(os, kernel, false);
    let count = backend.gen_group_per_thread(os, groups, |os, _| {
        os.line("*group->denDelayPtr = (*group->denDelayPtr + 1) % group->maxDendriticDelayTimesteps;");
        Ok(())
    })?;
    os.line("}");
    os.blank();

    Ok(count)
}

/// Generates `synapseUpdate`, exporting `updateSynapses` which runs every synapse kernel of a time step
pub(crate) fn gen_synapse_update_module(backend: &Backend, merged: &ModelMerged<'_>) -> CodegenResult<ModuleSource> {
    let model = merged.model;
    let context = model.type_context();
    let time_type = context.timepoint.get_name();
    let mut module = ModuleSource::default();

    let presynaptic: Vec<_> = merged.presynaptic_update_groups.iter().collect();
    let postsynaptic: Vec<_> = merged.postsynaptic_update_groups.iter().collect();
    let dynamics: Vec<_> = merged.synapse_dynamics_groups.iter().collect();
    let dendritic_delay: Vec<_> = merged.synapse_dendritic_delay_update_groups.iter().collect();
    for group in presynaptic.iter().chain(&postsynaptic).chain(&dynamics).chain(&dendritic_delay) {
        module.add_merged_group(backend, group);
    }

    let time_arg = KernelArg::value(&time_type, "t");
    let mut launches = CodeStream::new();
    let kernels: [(Kernel, &[&SynapseMergedGroup<'_>]); 3] = [
        (Kernel::PresynapticUpdate, &presynaptic),
        (Kernel::PostsynapticUpdate, &postsynaptic),
        (Kernel::SynapseDynamicsUpdate, &dynamics),
    ];
    for (kernel, groups) in kernels {
        if groups.is_empty() {
            continue;
        }
        let mut args = vec![time_arg.clone()];
        args.extend(backend.merged_array_args(groups));

        let layout = match kernel {
            Kernel::PresynapticUpdate => gen_presynaptic_kernel(backend, &mut module.device, model, groups, &args)?,
            Kernel::PostsynapticUpdate => gen_postsynaptic_kernel(backend, &mut module.device, model, groups, &args)?,
            _ => gen_synapse_dynamics_kernel(backend, &mut module.device, model, groups, &args)?,
        };
        module.kernels.push(kernel.name().to_string());
        backend.gen_launch(&mut launches, kernel, kernel.name(), layout.num_threads, model.batch_size, &args);
    }

    if !dendritic_delay.is_empty() {
        let kernel = Kernel::SynapseDendriticDelayUpdate;
        let args = backend.merged_array_args(&dendritic_delay);
        let count = gen_dendritic_delay_kernel(backend, &mut module.device, &dendritic_delay, &args)?;
        module.kernels.push(kernel.name().to_string());
        backend.gen_launch(&mut launches, kernel, kernel.name(), count, 1, &args);
    }

    module.host.line(&format!("EXPORT_FUNC void updateSynapses({} t) {{", time_type));
    module.host.line(launches.as_str());
    module.host.line("}");

    Ok(module)
}


#[cfg(test)]
mod tests {
    use super::{kernel_index_template, SynapseIndices};

    #[test]
    fn test_kernel_index_flattening() {
        assert_eq!(kernel_index_template(1, 1), "$(1)");
        assert_eq!(kernel_index_template(3, 1), "(((($(1)) * group->kernelSize1) + $(2)) * group->kernelSize2) + $(3)");
    }

    #[test]
    fn test_indices_builder() {
        let indices = SynapseIndices::new("preInd", "ipost").with_syn("synAddress");

        assert_eq!(indices.id_syn.as_deref(), Some("synAddress"));
        assert!(indices.id_kernel.is_none());
    }
}
