//! Initialisation kernels. `initializeKernel` zeroes spike and input arrays,
//! runs variable initialisers of dense populations and builds sparse
//! connectivity; `initializeSparseKernel` then initialises sparse synaptic
//! variables and the column-major back references once row lengths are known.

use crate::groups::{MatrixConnectivity, ModelSpec};
use crate::merged::custom_update::{CustomUpdateMergedGroup, CustomUpdateWUMergedGroup};
use crate::merged::neuron::NeuronMergedGroup;
use crate::merged::synapse::SynapseMergedGroup;
use crate::merged::{var_type, ChildKind, MergedGroup, ModelMerged};
use crate::models::{Var, VarInit};
use crate::transpiler::scan_code;
use crate::types::ResolvedType;
use super::super::code_stream::CodeStream;
use super::super::environment::Environment;
use super::platform::{AtomicOperation, MemorySpace};
use super::synapse_update::kernel_size_product;
use super::{
    add_egps, add_params, archetype_children, param_names, Backend, CodegenResult, Kernel, KernelLayout,
    ModuleSource,
};


/// Salts keeping the streams of initialisation generators apart from those used during simulation
const INIT_SEED_SALT: u64 = 0x2545_F491_4F6C_DD1D;
const SPARSE_INIT_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Emits the initialiser of one variable, `index` maps an optional batch to the element written
#[allow(clippy::too_many_arguments)]
fn gen_var_init<G>(
    os: &mut CodeStream,
    env: &Environment<'_>,
    merged: &MergedGroup<'_, G>,
    var: &Var,
    var_init: &VarInit,
    field: &str,
    copies: usize,
    index: impl Fn(Option<&str>) -> String,
    description: &str,
) -> CodegenResult<()> {
    let context = env.context().clone();
    let ty = var_type(var, &context);

    let mut init_env = env.nested();
    init_env.add("value", ty.clone(), "initVal");
    add_params(
        &mut init_env, merged, &param_names(&var_init.snippet.snippet), field, &context.scalar,
        |name| var_init.get_value(name).unwrap_or_default(),
    );

    let description = format!("{} variable '{}' initialisation", description, var.name);
    let tokens = scan_code(&var_init.snippet.code, &description)?;
    let code = init_env.print_code(&tokens, &description)?;
    let preamble = init_env.preamble();

    if copies > 1 {
        os.line(&format!("for(unsigned int b = 0; b < {}; b++) {{", copies));
        os.line(&format!("{} initVal;", ty.get_name()));
        os.line(&format!("{}{}", preamble, code));
        os.line(&format!("group->{}[{}] = initVal;", field, index(Some("b"))));
        os.line("}");
    } else {
        os.line("{");
        os.line(&format!("{} initVal;", ty.get_name()));
        os.line(&format!("{}{}", preamble, code));
        os.line(&format!("group->{}[{}] = initVal;", field, index(None)));
        os.line("}");
    }

    Ok(())
}

/// Index of a neuron variable, or of its single shared value
fn neuron_var_index(shared_neuron: bool, batch: Option<&str>) -> String {
    match (shared_neuron, batch) {
        (true, Some(b)) => b.to_string(),
        (true, None) => "0".to_string(),
        (false, Some(b)) => format!("({} * group->numNeurons) + lid", b),
        (false, None) => "lid".to_string(),
    }
}

/// Initialises variables with one element per neuron, shared values are written by the first thread
#[allow(clippy::too_many_arguments)]
fn gen_neuron_vars_init<G>(
    os: &mut CodeStream,
    env: &Environment<'_>,
    merged: &MergedGroup<'_, G>,
    vars: &[Var],
    initialisers: &std::collections::BTreeMap<String, VarInit>,
    suffix: &str,
    batch_size: usize,
    description: &str,
) -> CodegenResult<()> {
    for var in vars {
        let Some(var_init) = initialisers.get(&var.name).filter(|v| v.requires_kernel()) else { continue };
        let field = format!("{}{}", var.name, suffix);
        let copies = if var.access.is_duplicated() { batch_size } else { 1 };
        let shared = var.access.is_shared_neuron();

        if shared {
            os.line("if(lid == 0) {");
        }
        gen_var_init(os, env, merged, var, var_init, &field, copies, |b| neuron_var_index(shared, b), description)?;
        if shared {
            os.line("}");
        }
    }

    Ok(())
}

fn init_environment(backend: &Backend, model: &ModelSpec, seed: u64) -> Environment<'static> {
    let context = model.type_context();
    let mut env = backend.base_environment(&context);
    env.add("num_batch", ResolvedType::uint32().add_const(), &model.batch_size.to_string());
    backend.add_rng(&mut env, seed, "id");
    env
}

fn gen_neuron_init(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &NeuronMergedGroup<'_>) -> CodegenResult<()> {
    let ng = merged.archetype();
    let batch_size = model.batch_size;
    let spike_slots = batch_size * ng.num_delay_slots;
    let scalar = model.type_context().scalar;
    let zero = scalar.write_numeric(0.0);

    let mut env = init_environment(backend, model, model.seed ^ INIT_SEED_SALT);
    let uint = ResolvedType::uint32().add_const();
    env.add("id", uint.clone(), "lid");
    env.add("num_neurons", uint, "group->numNeurons");

    let mut body = CodeStream::new();
    body.line("if(lid == 0) {");
    body.line(&format!("for(unsigned int d = 0; d < {}; d++) {{", spike_slots));
    body.line("group->spkCnt[d] = 0;");
    if ng.spike_event_required {
        body.line("group->spkCntEvnt[d] = 0;");
    }
    body.line("}");
    if ng.is_delay_required() {
        body.line("*group->spkQuePtr = 0;");
    }
    body.line("}");

    body.line(&format!("for(unsigned int d = 0; d < {}; d++) {{", spike_slots));
    body.line("group->spk[(d * group->numNeurons) + lid] = 0;");
    if ng.spike_event_required {
        body.line("group->spkEvnt[(d * group->numNeurons) + lid] = 0;");
    }
    if ng.spike_time_required {
        body.line("group->sT[(d * group->numNeurons) + lid] = -TIME_MAX;");
    }
    if ng.prev_spike_time_required {
        body.line("group->prevST[(d * group->numNeurons) + lid] = -TIME_MAX;");
    }
    body.line("}");

    gen_neuron_vars_init(&mut body, &env, merged, &ng.model.vars, &ng.var_initialisers, "", batch_size, &ng.description())?;

    for (c, &sg_index) in archetype_children(merged, ChildKind::InSyn).iter().enumerate() {
        let sg = &model.synapse_groups[sg_index];
        let suffix = ChildKind::InSyn.suffix(c);
        body.line(&format!("// {}", sg.description()));
        body.line(&format!("for(unsigned int b = 0; b < {}; b++) {{", batch_size));
        body.line(&format!("group->outPost{}[(b * group->numNeurons) + lid] = {};", suffix, zero));
        body.line("}");
        if sg.is_dendritic_delay_required() {
            body.line(&format!("for(unsigned int d = 0; d < {}; d++) {{", batch_size * sg.max_dendritic_delay_timesteps));
            body.line(&format!("group->denDelay{}[(d * group->numNeurons) + lid] = {};", suffix, zero));
            body.line("}");
        }
        gen_neuron_vars_init(
            &mut body, &env, merged, &sg.ps_model.vars, &sg.ps_var_initialisers, &suffix, batch_size, &sg.description(),
        )?;
    }

    for c in 0..merged.num_children(ChildKind::OutSynPreOutput) {
        body.line(&format!("for(unsigned int b = 0; b < {}; b++) {{", batch_size));
        body.line(&format!("group->outPre{}[(b * group->numNeurons) + lid] = {};", ChildKind::OutSynPreOutput.suffix(c), zero));
        body.line("}");
    }

    for (c, &cs_index) in archetype_children(merged, ChildKind::CurrentSource).iter().enumerate() {
        let cs = &model.current_sources[cs_index];
        let suffix = ChildKind::CurrentSource.suffix(c);
        gen_neuron_vars_init(
            &mut body, &env, merged, &cs.model.vars, &cs.var_initialisers, &suffix, batch_size, &cs.description(),
        )?;
    }

    os.line("if(lid < group->numNeurons) {");
    os.line(&env.preamble());
    os.line(body.as_str());
    os.line("}");

    Ok(())
}

/// Dense weights loop over rows with one thread per column, kernel weights have one thread per entry
fn gen_synapse_init(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &SynapseMergedGroup<'_>) -> CodegenResult<()> {
    let sg = merged.archetype();
    let mut env = init_environment(backend, model, model.seed ^ INIT_SEED_SALT);
    let uint = ResolvedType::uint32().add_const();
    env.add("num_pre", uint.clone(), "group->numSrcNeurons");
    env.add("num_post", uint.clone(), "group->numTrgNeurons");

    let mut body = CodeStream::new();
    if sg.has_kernel_weights() {
        let size = kernel_size_product(sg.kernel_size.len());
        env.add("id_kernel", uint, "lid");
        gen_weight_vars_init(&mut body, &env, model, merged, &size, "lid")?;
        os.line(&format!("if(lid < {}) {{", size));
    } else {
        env.add("id_pre", uint.clone(), "i");
        env.add("id_post", uint, "lid");
        body.line("for(unsigned int i = 0; i < group->numSrcNeurons; i++) {");
        body.line("const unsigned int idx = (i * group->rowStride) + lid;");
        gen_weight_vars_init(&mut body, &env, model, merged, "(group->numSrcNeurons * group->rowStride)", "idx")?;
        body.line("}");
        os.line("if(lid < group->numTrgNeurons) {");
    }
    os.line(&env.preamble());
    os.line(body.as_str());
    os.line("}");

    Ok(())
}

/// Weight update variables of one synapse, duplicated variables have `size` elements per batch
fn gen_weight_vars_init(
    os: &mut CodeStream,
    env: &Environment<'_>,
    model: &ModelSpec,
    merged: &SynapseMergedGroup<'_>,
    size: &str,
    index: &str,
) -> CodegenResult<()> {
    let sg = merged.archetype();
    for var in &sg.wu_model.vars {
        let Some(var_init) = sg.wu_var_initialisers.get(&var.name).filter(|v| v.requires_kernel()) else { continue };
        let copies = if var.access.is_duplicated() { model.batch_size } else { 1 };
        gen_var_init(
            os, env, merged, var, var_init, &var.name, copies,
            |b| b.map_or_else(|| index.to_string(), |b| format!("({} * {}) + {}", b, size, index)),
            &sg.description(),
        )?;
    }

    Ok(())
}

fn gen_custom_update_init(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &CustomUpdateMergedGroup<'_>) -> CodegenResult<()> {
    let cu = merged.archetype();
    let mut env = init_environment(backend, model, model.seed ^ INIT_SEED_SALT);
    let uint = ResolvedType::uint32().add_const();
    env.add("id", uint.clone(), "lid");
    env.add("size", uint, "group->size");

    let mut body = CodeStream::new();
    for var in &cu.model.vars {
        let Some(var_init) = cu.var_initialisers.get(&var.name).filter(|v| v.requires_kernel()) else { continue };
        let copies = if cu.is_var_duplicated(var) { model.batch_size } else { 1 };
        let shared = var.access.is_shared_neuron();
        if shared {
            body.line("if(lid == 0) {");
        }
        gen_var_init(
            &mut body, &env, merged, var, var_init, &var.name, copies,
            |b| match (shared, b) {
                (true, Some(b)) => b.to_string(),
                (true, None) => "0".to_string(),
                (false, Some(b)) => format!("({} * group->size) + lid", b),
                (false, None) => "lid".to_string(),
            },
            &cu.description(),
        )?;
        if shared {
            body.line("}");
        }
    }

    os.line("if(lid < group->size) {");
    os.line(&env.preamble());
    os.line(body.as_str());
    os.line("}");

    Ok(())
}

/// Variables of weight update custom updates, `index` is the synapse being initialised
fn gen_custom_wu_vars_init(
    os: &mut CodeStream,
    env: &Environment<'_>,
    model: &ModelSpec,
    merged: &CustomUpdateWUMergedGroup<'_>,
    size: &str,
    index: &str,
) -> CodegenResult<()> {
    let cu = merged.archetype();
    for var in &cu.model.vars {
        let Some(var_init) = cu.var_initialisers.get(&var.name).filter(|v| v.requires_kernel()) else { continue };
        let copies = if cu.is_var_duplicated(var) { model.batch_size } else { 1 };
        gen_var_init(
            os, env, merged, var, var_init, &var.name, copies,
            |b| b.map_or_else(|| index.to_string(), |b| format!("({} * {}) + {}", b, size, index)),
            &cu.description(),
        )?;
    }

    Ok(())
}

fn gen_custom_wu_update_init(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &CustomUpdateWUMergedGroup<'_>) -> CodegenResult<()> {
    let sg = &model.synapse_groups[merged.archetype().synapse_group];
    let mut env = init_environment(backend, model, model.seed ^ INIT_SEED_SALT);
    let uint = ResolvedType::uint32().add_const();
    env.add("num_pre", uint.clone(), "group->numSrcNeurons");
    env.add("num_post", uint.clone(), "group->numTrgNeurons");

    let mut body = CodeStream::new();
    if sg.has_kernel_weights() {
        let size = kernel_size_product(sg.kernel_size.len());
        env.add("id_kernel", uint, "lid");
        gen_custom_wu_vars_init(&mut body, &env, model, merged, &size, "lid")?;
        os.line(&format!("if(lid < {}) {{", size));
    } else {
        env.add("id_pre", uint.clone(), "i");
        env.add("id_post", uint, "lid");
        body.line("for(unsigned int i = 0; i < group->numSrcNeurons; i++) {");
        body.line("const unsigned int idx = (i * group->rowStride) + lid;");
        gen_custom_wu_vars_init(&mut body, &env, model, merged, "(group->numSrcNeurons * group->rowStride)", "idx")?;
        body.line("}");
        os.line("if(lid < group->numTrgNeurons) {");
    }
    os.line(&env.preamble());
    os.line(body.as_str());
    os.line("}");

    Ok(())
}

/// Builds connectivity with `addSynapse`, one thread per row or per column
fn gen_connectivity_init(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &SynapseMergedGroup<'_>) -> CodegenResult<()> {
    let sg = merged.archetype();
    let Some(init) = sg.connectivity_initialiser.as_ref() else {
        return Err(crate::error::ConfigurationError::MissingConnectivityCode.into());
    };
    let snippet = &init.snippet;
    let row_build = !snippet.row_build_code.is_empty();
    let bitmask = sg.matrix_type.connectivity == MatrixConnectivity::Bitmask;

    let mut env = init_environment(backend, model, model.seed ^ INIT_SEED_SALT);
    let context = env.context().clone();
    let uint = ResolvedType::uint32().add_const();
    env.add("num_pre", uint.clone(), "group->numSrcNeurons");
    env.add("num_post", uint.clone(), "group->numTrgNeurons");
    env.add("num_threads", uint.clone(), "1");
    add_params(
        &mut env, merged, &param_names(&snippet.snippet), "", &context.scalar,
        |name| init.get_value(name).unwrap_or_default(),
    );
    add_egps(&mut env, &snippet.snippet.extra_global_params, "");

    let or = backend.platform().atomic(AtomicOperation::Or, &ResolvedType::uint32(), MemorySpace::Global);
    let add = backend.platform().atomic(AtomicOperation::Add, &ResolvedType::uint32(), MemorySpace::Global);
    let mut preamble = CodeStream::new();
    let (code, description, bound) = if row_build {
        env.add("id_pre", uint.clone(), "lid");
        env.add("id_post_begin", uint, "0");
        let add_synapse = if bitmask {
            format!("{}(&group->gp[(lid * (group->rowStride / 32)) + (($(0)) / 32)], 1 << (($(0)) & 31))", or)
        } else {
            preamble.line("group->rowLength[lid] = 0;");
            "group->ind[(lid * group->rowStride) + (group->rowLength[lid]++)] = $(0)".to_string()
        };
        env.add_function("addSynapse", ResolvedType::void(), vec![ResolvedType::uint32()], &add_synapse);
        (&snippet.row_build_code, format!("{} row build code", sg.description()), "group->numSrcNeurons")
    } else {
        env.add("id_post", uint.clone(), "lid");
        env.add("id_pre_begin", uint, "0");
        let add_synapse = if bitmask {
            format!("{}(&group->gp[(($(0)) * (group->rowStride / 32)) + (lid / 32)], 1 << (lid & 31))", or)
        } else {
            format!("group->ind[(($(0)) * group->rowStride) + {}(&group->rowLength[$(0)], 1)] = lid", add)
        };
        env.add_function("addSynapse", ResolvedType::void(), vec![ResolvedType::uint32()], &add_synapse);
        (&snippet.col_build_code, format!("{} column build code", sg.description()), "group->numTrgNeurons")
    };

    let tokens = scan_code(code, &description)?;
    let code = env.print_code(&tokens, &description)?;

    os.line(&format!("if(lid < {}) {{", bound));
    os.line(preamble.as_str());
    os.line(&env.preamble());
    os.line(&code);
    os.line("}");

    Ok(())
}

/// Loops over rows with one thread per row entry, initialising variables and column structure
fn gen_sparse_init(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &SynapseMergedGroup<'_>) -> CodegenResult<()> {
    let sg = merged.archetype();
    let mut env = init_environment(backend, model, model.seed ^ SPARSE_INIT_SEED_SALT);
    let uint = ResolvedType::uint32().add_const();
    env.add("num_pre", uint.clone(), "group->numSrcNeurons");
    env.add("num_post", uint.clone(), "group->numTrgNeurons");
    env.add("id_pre", uint.clone(), "i");
    env.add("id_post", uint.clone(), "j");
    env.add("id_syn", uint, "idx");

    let mut body = CodeStream::new();
    body.line("for(unsigned int i = 0; i < group->numSrcNeurons; i++) {");
    body.line("if(lid < group->rowLength[i]) {");
    body.line("const unsigned int idx = (i * group->rowStride) + lid;");
    body.line("const unsigned int j = group->ind[idx];");
    if sg.has_individual_weights() {
        gen_weight_vars_init(&mut body, &env, model, merged, "(group->numSrcNeurons * group->rowStride)", "idx")?;
    }
    if merged.has_field("remap") {
        let add = backend.platform().atomic(AtomicOperation::Add, &ResolvedType::uint32(), MemorySpace::Global);
        body.line(&format!("const unsigned int colIdx = {}(&group->colLength[j], 1);", add));
        body.line("group->remap[(j * group->colStride) + colIdx] = idx;");
    }
    body.line("}");
    body.line("}");

    os.line("if(lid < group->rowStride) {");
    os.line(&env.preamble());
    os.line(body.as_str());
    os.line("}");

    Ok(())
}

fn gen_custom_wu_sparse_init(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &CustomUpdateWUMergedGroup<'_>) -> CodegenResult<()> {
    let mut env = init_environment(backend, model, model.seed ^ SPARSE_INIT_SEED_SALT);
    let uint = ResolvedType::uint32().add_const();
    env.add("num_pre", uint.clone(), "group->numSrcNeurons");
    env.add("num_post", uint.clone(), "group->numTrgNeurons");
    env.add("id_pre", uint.clone(), "i");
    env.add("id_post", uint.clone(), "j");
    env.add("id_syn", uint, "idx");

    let mut body = CodeStream::new();
    body.line("for(unsigned int i = 0; i < group->numSrcNeurons; i++) {");
    body.line("if(lid < group->rowLength[i]) {");
    body.line("const unsigned int idx = (i * group->rowStride) + lid;");
    body.line("const unsigned int j = group->ind[idx];");
    gen_custom_wu_vars_init(&mut body, &env, model, merged, "(group->numSrcNeurons * group->rowStride)", "idx")?;
    body.line("}");
    body.line("}");

    os.line("if(lid < group->rowStride) {");
    os.line(&env.preamble());
    os.line(body.as_str());
    os.line("}");

    Ok(())
}

fn is_sparse_custom_wu(model: &ModelSpec, merged: &CustomUpdateWUMergedGroup<'_>) -> bool {
    model.synapse_groups[merged.archetype().synapse_group].is_sparse()
}

/// Generates `init`, exporting `initialize` and `initializeSparse`
pub(crate) fn gen_init_module(backend: &Backend, merged: &ModelMerged<'_>) -> CodegenResult<ModuleSource> {
    let model = merged.model;
    let mut module = ModuleSource::default();

    let neurons: Vec<_> = merged.neuron_init_groups.iter().collect();
    let synapses: Vec<_> = merged.synapse_init_groups.iter().collect();
    let custom_updates: Vec<_> = merged.custom_update_init_groups.iter().collect();
    let (custom_wu_sparse, custom_wu_dense): (Vec<_>, Vec<_>) = merged.custom_wu_update_init_groups.iter()
        .partition(|m| is_sparse_custom_wu(model, m));
    let connectivity: Vec<_> = merged.synapse_connectivity_init_groups.iter().collect();
    let sparse: Vec<_> = merged.synapse_sparse_init_groups.iter().collect();

    for group in &neurons {
        module.add_merged_group(backend, group);
    }
    for group in synapses.iter().chain(&connectivity).chain(&sparse) {
        module.add_merged_group(backend, group);
    }
    for group in &custom_updates {
        module.add_merged_group(backend, group);
    }
    for group in custom_wu_dense.iter().chain(&custom_wu_sparse) {
        module.add_merged_group(backend, group);
    }

    // Dense initialisation
    let kernel = Kernel::Initialize;
    let block_size = backend.block_size(kernel);
    let mut layout = KernelLayout::default();
    layout.append(&neurons, block_size, |ng| Ok(ng.num_neurons))?;
    layout.append(&synapses, block_size, |sg| Ok(backend.num_synapse_init_threads(sg)))?;
    layout.append(&custom_updates, block_size, |cu| Ok(cu.size))?;
    layout.append(&custom_wu_dense, block_size, |cu| Ok(backend.num_custom_wu_init_threads(&model.synapse_groups[cu.synapse_group])))?;
    layout.append(&connectivity, block_size, |sg| Ok(backend.num_connectivity_init_threads(sg)?))?;

    let mut init_args = backend.merged_array_args(&neurons);
    init_args.extend(backend.merged_array_args(&synapses));
    init_args.extend(backend.merged_array_args(&custom_updates));
    init_args.extend(backend.merged_array_args(&custom_wu_dense));
    init_args.extend(backend.merged_array_args(&connectivity));

    let os = &mut module.device;
    backend.gen_start_id_tables(os, &layout);
    backend.gen_kernel_header(os, kernel.name(), &init_args);
    backend.gen_kernel_ids(os, kernel, false);
    os.blank();
    backend.gen_parallel_groups(os, &neurons, &layout, |os, m| gen_neuron_init(backend, os, model, m))?;
    backend.gen_parallel_groups(os, &synapses, &layout, |os, m| gen_synapse_init(backend, os, model, m))?;
    backend.gen_parallel_groups(os, &custom_updates, &layout, |os, m| gen_custom_update_init(backend, os, model, m))?;
    backend.gen_parallel_groups(os, &custom_wu_dense, &layout, |os, m| gen_custom_wu_update_init(backend, os, model, m))?;
    backend.gen_parallel_groups(os, &connectivity, &layout, |os, m| gen_connectivity_init(backend, os, model, m))?;
    os.line("}");
    os.blank();
    module.kernels.push(kernel.name().to_string());

    let mut init_launch = CodeStream::new();
    backend.gen_launch(&mut init_launch, kernel, kernel.name(), layout.num_threads, 1, &init_args);

    // Sparse initialisation
    let sparse_kernel = Kernel::InitializeSparse;
    let sparse_block_size = backend.block_size(sparse_kernel);
    let mut sparse_layout = KernelLayout::default();
    sparse_layout.append(&sparse, sparse_block_size, |sg| Ok(backend.num_sparse_init_threads(sg)))?;
    sparse_layout.append(&custom_wu_sparse, sparse_block_size, |cu| Ok(backend.num_custom_wu_init_threads(&model.synapse_groups[cu.synapse_group])))?;

    let mut sparse_args = backend.merged_array_args(&sparse);
    sparse_args.extend(backend.merged_array_args(&custom_wu_sparse));

    let mut sparse_launch = CodeStream::new();
    if sparse_layout.num_threads > 0 {
        let os = &mut module.device;
        backend.gen_start_id_tables(os, &sparse_layout);
        backend.gen_kernel_header(os, sparse_kernel.name(), &sparse_args);
        backend.gen_kernel_ids(os, sparse_kernel, false);
        os.blank();
        backend.gen_parallel_groups(os, &sparse, &sparse_layout, |os, m| gen_sparse_init(backend, os, model, m))?;
        backend.gen_parallel_groups(os, &custom_wu_sparse, &sparse_layout, |os, m| gen_custom_wu_sparse_init(backend, os, model, m))?;
        os.line("}");
        os.blank();
        module.kernels.push(sparse_kernel.name().to_string());
        backend.gen_launch(&mut sparse_launch, sparse_kernel, sparse_kernel.name(), sparse_layout.num_threads, 1, &sparse_args);
    }

    let synchronise = backend.platform().synchronise();
    module.host.line("EXPORT_FUNC void initialize() {");
    module.host.line(init_launch.as_str());
    module.host.line(synchronise);
    module.host.line("}");
    module.host.blank();
    module.host.line("EXPORT_FUNC void initializeSparse() {");
    module.host.line(sparse_launch.as_str());
    module.host.line(synchronise);
    module.host.line("}");

    Ok(module)
}


#[cfg(test)]
mod tests {
    use crate::config::Preferences;
    use crate::groups::{ConnectivityInit, MatrixType, ModelSpec, PostsynapticInit, WeightUpdateInit};
    use crate::merged::ModelMerged;
    use crate::models::{
        init_sparse_connectivity_snippets, init_var_snippets, neuron_models, param_values, postsynaptic_models,
        weight_update_models, SparseConnectivityInit, VarInit,
    };
    use super::super::Backend;
    use super::{gen_init_module, neuron_var_index};

    fn sparse_model() -> ModelSpec {
        let mut model = ModelSpec::new("init");
        let uniform = VarInit::new(init_var_snippets::uniform(), param_values(&[("min", -70.0), ("max", -50.0)]));
        let lif_params = param_values(&[
            ("C", 1.0), ("TauM", 20.0), ("Vrest", -70.0), ("Vreset", -70.0),
            ("Vthresh", -51.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ]);
        let vars = [("V", uniform), ("RefracTime", VarInit::constant(0.0))]
            .into_iter().map(|(n, v)| (n.to_string(), v)).collect();
        model.add_neuron_population("Pre", 50, neuron_models::lif(), lif_params.clone(), vars).unwrap();
        let vars = [("V", VarInit::constant(-70.0)), ("RefracTime", VarInit::constant(0.0))]
            .into_iter().map(|(n, v)| (n.to_string(), v)).collect();
        model.add_neuron_population("Post", 50, neuron_models::lif(), lif_params, vars).unwrap();

        let weights = [("g".to_string(), VarInit::constant(0.25))].into_iter().collect();
        model.add_synapse_population(
            "Syn", MatrixType::sparse(), "Pre", "Post",
            WeightUpdateInit::new(weight_update_models::static_pulse(), Default::default(), weights),
            PostsynapticInit::new(postsynaptic_models::delta_curr(), Default::default(), Default::default()),
            ConnectivityInit::Sparse(SparseConnectivityInit::new(
                init_sparse_connectivity_snippets::fixed_probability(), param_values(&[("prob", 0.1)]),
            )),
        ).unwrap();
        model.finalise().unwrap();
        model
    }

    #[test]
    fn test_neuron_var_indices() {
        assert_eq!(neuron_var_index(false, None), "lid");
        assert_eq!(neuron_var_index(false, Some("b")), "(b * group->numNeurons) + lid");
        assert_eq!(neuron_var_index(true, Some("b")), "b");
    }

    #[test]
    fn test_sparse_connectivity_is_built_by_row() {
        let model = sparse_model();
        let merged = ModelMerged::new(&model).unwrap();
        let backend = Backend::new(Preferences::default()).unwrap();
        let module = gen_init_module(&backend, &merged).unwrap();
        let device = module.device.into_string();

        assert!(device.contains("group->rowLength[lid] = 0;"));
        assert!(device.contains("group->ind[(lid * group->rowStride) + (group->rowLength[lid]++)] = "));
        assert!(device.contains("curand_init("));
        assert!(device.contains("initializeSparseKernel"));
        assert!(device.contains("group->spkCnt[d] = 0;"));
    }
}
