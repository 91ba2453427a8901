//! Custom update kernels. Each update group gets one kernel running its custom
//! updates and custom weight updates along with an optional second kernel
//! writing transposed weights, both launched by `update<Group>()`.

use std::collections::BTreeMap;
use crate::groups::{ModelSpec, ResolvedVarReference, SynapseGroup};
use crate::merged::custom_update::{CustomUpdateMergedGroup, CustomUpdateWUMergedGroup};
use crate::merged::{var_type, ModelMerged};
use crate::models::{CustomUpdateModel, ReductionOperation};
use crate::types::{ResolvedType, TypeContext};
use super::super::code_stream::CodeStream;
use super::super::environment::Environment;
use super::synapse_update::kernel_size_product;
use super::{
    add_egps, add_params, element_index, param_names, wrap_code, Backend, CodegenResult, Kernel, KernelLayout,
    ModuleSource,
};


/// Variable or variable reference a custom update reads and writes
#[derive(Debug, Clone)]
struct UpdateTarget {
    name: String,
    ty: ResolvedType,
    read_only: bool,
    /// Set when this kernel folds the target rather than updating it in place
    reduction: Option<ReductionOperation>,
    duplicated: bool,
    shared_neuron: bool,
}

impl UpdateTarget {
    fn accumulator(&self) -> String {
        format!("_lr{}", self.name)
    }

    fn local(&self) -> String {
        format!("_l{}", self.name)
    }
}

fn update_targets(
    model: &CustomUpdateModel,
    references: &BTreeMap<String, ResolvedVarReference>,
    batched: bool,
    context: &TypeContext,
) -> Vec<UpdateTarget> {
    let vars = model.vars.iter().map(|var| UpdateTarget {
        name: var.name.clone(),
        ty: var_type(var, context),
        read_only: var.access.is_read_only(),
        reduction: var.access.reduction(),
        duplicated: batched && var.access.is_duplicated(),
        shared_neuron: var.access.is_shared_neuron(),
    });
    let refs = model.var_refs.iter().filter_map(|var_ref| {
        let resolved = references.get(&var_ref.name)?;
        Some(UpdateTarget {
            name: var_ref.name.clone(),
            ty: var_type(&resolved.var, context),
            read_only: var_ref.access.is_read_only(),
            reduction: var_ref.access.reduction(),
            duplicated: batched && resolved.var.access.is_duplicated(),
            shared_neuron: resolved.var.access.is_shared_neuron(),
        })
    });

    vars.chain(refs).collect()
}

/// Keeps the reductions this kernel performs, `reduces` picks them out
fn select_reductions(targets: &mut [UpdateTarget], reduces: impl Fn(&UpdateTarget) -> bool) {
    for target in targets.iter_mut() {
        if !reduces(target) {
            target.reduction = None;
        }
    }
}

/// Adds targets to an environment, reductions write a local which is folded into their accumulator
fn add_targets(env: &mut Environment<'_>, targets: &[UpdateTarget], index: impl Fn(&UpdateTarget) -> String) {
    for target in targets {
        let ty_name = target.ty.get_name();
        let local = target.local();
        if let Some(operation) = target.reduction {
            let accumulator = target.accumulator();
            env.add_lazy(
                &target.name, target.ty.clone(), &local,
                format!("{} {};", ty_name, local),
                Some(format!("{} = {};", accumulator, operation.fold(&accumulator, &local, &ty_name))),
            );
        } else {
            let array = format!("group->{}[{}]", target.name, index(target));
            let initialiser = format!("{} {} = {};", ty_name, local, array);
            if target.read_only {
                env.add_lazy(&target.name, target.ty.add_const(), &local, initialiser, None);
            } else {
                env.add_lazy(&target.name, target.ty.clone(), &local, initialiser, Some(format!("{} = {};", array, local)));
            }
        }
    }
}

fn gen_accumulators(os: &mut CodeStream, targets: &[UpdateTarget]) {
    for target in targets {
        if let Some(operation) = target.reduction {
            let ty_name = target.ty.get_name();
            os.line(&format!("{} {} = {};", ty_name, target.accumulator(), operation.initial_value(&ty_name)));
        }
    }
}

fn gen_reduction_writes(os: &mut CodeStream, targets: &[UpdateTarget], index: impl Fn(&UpdateTarget) -> String) {
    for target in targets.iter().filter(|t| t.reduction.is_some()) {
        os.line(&format!("group->{}[{}] = {};", target.name, index(target), target.accumulator()));
    }
}

/// Environment holding the parameters and extra global parameters of a custom update
fn update_environment<G>(
    backend: &Backend,
    model: &ModelSpec,
    merged: &crate::merged::MergedGroup<'_, G>,
    custom_model: &CustomUpdateModel,
    param_value: impl Fn(&str) -> Option<f64>,
) -> Environment<'static> {
    let context = model.type_context();
    let mut env = backend.base_environment(&context);
    env.add("num_batch", ResolvedType::uint32().add_const(), &model.batch_size.to_string());
    add_params(
        &mut env, merged, &param_names(&custom_model.snippet), "", &context.scalar,
        |name| param_value(name).unwrap_or_default(),
    );
    add_egps(&mut env, &custom_model.snippet.extra_global_params, "");
    env
}

fn padded_size(size: &str, block_size: usize) -> String {
    format!("({} * (({} + {}) / {}))", block_size, size, block_size - 1, block_size)
}

fn gen_custom_update(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &CustomUpdateMergedGroup<'_>) -> CodegenResult<()> {
    let cu = merged.archetype();
    let context = model.type_context();
    let block_size = backend.block_size(Kernel::CustomUpdate);
    let description = format!("{} update code", cu.description());
    let copies = cu.num_copies(model.batch_size);
    let uint = ResolvedType::uint32().add_const();

    let mut env = update_environment(backend, model, merged, &cu.model, |n| cu.get_param_value(n));
    env.add("size", uint.clone(), "group->size");
    let mut targets = update_targets(&cu.model, &cu.resolved_references, cu.batched, &context);

    if cu.is_neuron_reduction() {
        select_reductions(&mut targets, |t| t.shared_neuron);

        os.line("const unsigned int lane = lid % 32;");
        os.line("const unsigned int batch = lid / 32;");
        os.line(&format!("if(batch < {}) {{", copies));
        os.line("const unsigned int batchOffset = batch * group->size;");
        gen_accumulators(os, &targets);

        let mut loop_env = env.nested();
        loop_env.add("id", uint.clone(), "idx");
        loop_env.add("batch", uint, "batch");
        add_targets(&mut loop_env, &targets, |t| element_index(t.duplicated, t.shared_neuron, "batchOffset", "idx"));
        let code = loop_env.print_code(&cu.update_tokens, &description)?;
        os.line("for(unsigned int idx = lane; idx < group->size; idx += 32) {");
        os.line(&wrap_code(&loop_env.preamble(), &code, &loop_env.postamble()));
        os.line("}");

        for target in &targets {
            if let Some(operation) = target.reduction {
                os.line(&backend.platform().warp_reduce(operation, &target.accumulator(), &target.ty.get_name()));
            }
        }
        os.line("if(lane == 0) {");
        gen_reduction_writes(os, &targets, |t| element_index(t.duplicated, true, "batchOffset", "0"));
        os.line("}");
        os.line("}");
    } else if cu.is_batch_reduction() {
        select_reductions(&mut targets, |t| !t.duplicated);

        os.line("if(lid < group->size) {");
        gen_accumulators(os, &targets);

        let mut loop_env = env.nested();
        loop_env.add("id", uint.clone(), "lid");
        loop_env.add("batch", uint, "batch");
        add_targets(&mut loop_env, &targets, |t| element_index(t.duplicated, t.shared_neuron, "batchOffset", "lid"));
        let code = loop_env.print_code(&cu.update_tokens, &description)?;
        os.line(&format!("for(unsigned int batch = 0; batch < {}; batch++) {{", model.batch_size));
        os.line("const unsigned int batchOffset = batch * group->size;");
        os.line(&wrap_code(&loop_env.preamble(), &code, &loop_env.postamble()));
        os.line("}");

        gen_reduction_writes(os, &targets, |t| element_index(false, t.shared_neuron, "", "lid"));
        os.line("}");
    } else if cu.is_per_element() {
        select_reductions(&mut targets, |_| false);

        os.line(&format!("const unsigned int paddedSize = {};", padded_size("group->size", block_size)));
        os.line("const unsigned int batch = lid / paddedSize;");
        os.line("const unsigned int idx = lid % paddedSize;");
        os.line("if(idx < group->size) {");
        os.line("const unsigned int batchOffset = batch * group->size;");
        env.add("id", uint.clone(), "idx");
        env.add("batch", uint, "batch");
        add_targets(&mut env, &targets, |t| element_index(t.duplicated, t.shared_neuron, "batchOffset", "idx"));
        let code = env.print_code(&cu.update_tokens, &description)?;
        os.line(&wrap_code(&env.preamble(), &code, &env.postamble()));
        os.line("}");
    } else {
        // Every target holds one value per batch
        select_reductions(&mut targets, |_| false);

        os.line(&format!("if(lid < {}) {{", copies));
        os.line("const unsigned int batch = lid;");
        env.add("batch", uint, "batch");
        add_targets(&mut env, &targets, |t| element_index(t.duplicated, t.shared_neuron, "", "0"));
        let code = env.print_code(&cu.update_tokens, &description)?;
        os.line(&wrap_code(&env.preamble(), &code, &env.postamble()));
        os.line("}");
    }

    Ok(())
}

/// Number of synapses a weight update custom update iterates over, as a C expression
fn synapse_count(sg: &SynapseGroup) -> String {
    if sg.has_kernel_weights() {
        kernel_size_product(sg.kernel_size.len())
    } else {
        "(group->numSrcNeurons * group->rowStride)".to_string()
    }
}

/// Adds the synapse indices of `idx`, sparse rows are skipped past their length
fn gen_synapse_indices(os: &mut CodeStream, env: &mut Environment<'_>, sg: &SynapseGroup) -> bool {
    let uint = ResolvedType::uint32().add_const();
    if sg.has_kernel_weights() {
        env.add("id_kernel", uint, "idx");
        return false;
    }

    os.line("const unsigned int idPre = idx / group->rowStride;");
    env.add("id_pre", uint.clone(), "idPre");
    env.add("id_syn", uint.clone(), "idx");
    if sg.is_sparse() {
        os.line("if((idx % group->rowStride) < group->rowLength[idPre]) {");
        os.line("const unsigned int idPost = group->ind[idx];");
        env.add("id_post", uint, "idPost");
        true
    } else {
        os.line("const unsigned int idPost = idx % group->rowStride;");
        env.add("id_post", uint, "idPost");
        false
    }
}

fn gen_custom_wu_update(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &CustomUpdateWUMergedGroup<'_>) -> CodegenResult<()> {
    let cu = merged.archetype();
    let sg = &model.synapse_groups[cu.synapse_group];
    let context = model.type_context();
    let block_size = backend.block_size(Kernel::CustomUpdate);
    let description = format!("{} update code", cu.description());
    let uint = ResolvedType::uint32().add_const();

    let mut env = update_environment(backend, model, merged, &cu.model, |n| cu.get_param_value(n));
    let mut targets = update_targets(&cu.model, &cu.resolved_references, cu.batched, &context);
    let batch_reduction = cu.is_batch_reduction();
    select_reductions(&mut targets, |t| batch_reduction && !t.duplicated);

    os.line(&format!("const unsigned int size = {};", synapse_count(sg)));
    if batch_reduction {
        os.line("const unsigned int idx = lid;");
    } else {
        os.line(&format!("const unsigned int paddedSize = {};", padded_size("size", block_size)));
        os.line("const unsigned int batch = lid / paddedSize;");
        os.line("const unsigned int idx = lid % paddedSize;");
    }
    os.line("if(idx < size) {");
    let sparse_row = gen_synapse_indices(os, &mut env, sg);
    env.add("batch", uint, "batch");

    if batch_reduction {
        gen_accumulators(os, &targets);
        add_targets(&mut env, &targets, |t| element_index(t.duplicated, false, "synBatchOffset", "idx"));
        let code = env.print_code(&cu.update_tokens, &description)?;
        os.line(&format!("for(unsigned int batch = 0; batch < {}; batch++) {{", model.batch_size));
        os.line("const unsigned int synBatchOffset = batch * size;");
        os.line(&wrap_code(&env.preamble(), &code, &env.postamble()));
        os.line("}");
        gen_reduction_writes(os, &targets, |_| "idx".to_string());
    } else {
        os.line("const unsigned int synBatchOffset = batch * size;");
        add_targets(&mut env, &targets, |t| element_index(t.duplicated, false, "synBatchOffset", "idx"));
        let code = env.print_code(&cu.update_tokens, &description)?;
        os.line(&wrap_code(&env.preamble(), &code, &env.postamble()));
    }

    if sparse_row {
        os.line("}");
    }
    os.line("}");

    Ok(())
}

/// Loads a tile of the forward matrix through shared memory and stores it transposed
fn gen_custom_transpose_update(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, merged: &CustomUpdateWUMergedGroup<'_>) -> CodegenResult<()> {
    let cu = merged.archetype();
    let context = model.type_context();
    let block_size = backend.block_size(Kernel::CustomTransposeUpdate);
    let platform = backend.platform();
    let tid = platform.thread_id();
    let description = format!("{} update code", cu.description());
    let uint = ResolvedType::uint32().add_const();

    let Some(transpose_name) = cu.resolved_references.iter().find(|(_, r)| r.transpose.is_some()).map(|(n, _)| n.clone()) else {
        return Ok(());
    };

    let mut env = update_environment(backend, model, merged, &cu.model, |n| cu.get_param_value(n));
    let mut targets = update_targets(&cu.model, &cu.resolved_references, cu.batched, &context);
    select_reductions(&mut targets, |_| false);
    let Some(transposed) = targets.iter().position(|t| t.name == transpose_name).map(|i| targets.remove(i)) else {
        return Ok(());
    };

    os.line(&format!("const unsigned int numXBlocks = (group->numTrgNeurons + {}) / {};", block_size - 1, block_size));
    os.line(&format!("const unsigned int numYBlocks = (group->numSrcNeurons + {}) / {};", block_size - 1, block_size));
    os.line(&format!("const unsigned int tile = lid / {};", block_size));
    os.line("const unsigned int batch = tile / (numXBlocks * numYBlocks);");
    os.line("const unsigned int tileIdx = tile % (numXBlocks * numYBlocks);");
    os.line("const unsigned int blockX = tileIdx % numXBlocks;");
    os.line("const unsigned int blockY = tileIdx / numXBlocks;");
    os.line("const unsigned int synBatchOffset = batch * group->numSrcNeurons * group->rowStride;");
    os.line("const unsigned int transposeBatchOffset = batch * group->numSrcNeurons * group->numTrgNeurons;");

    env.add("batch", uint.clone(), "batch");
    env.add("id_pre", uint.clone(), "y");
    env.add("id_post", uint.clone(), "x");
    env.add("id_syn", uint, "idx");
    env.add(&transposed.name, transposed.ty.clone(), &transposed.local());
    add_targets(&mut env, &targets, |t| element_index(t.duplicated, false, "synBatchOffset", "idx"));
    let code = env.print_code(&cu.update_tokens, &description)?;
    let transposed_index = element_index(transposed.duplicated, false, "synBatchOffset", "idx");

    os.line("// load");
    os.line("{");
    os.line(&format!("const unsigned int x = (blockX * {}) + {};", block_size, tid));
    os.line(&format!("for(unsigned int j = 0; j < {}; j += 8) {{", block_size));
    os.line("for(unsigned int k = 0; k < 8; k++) {");
    os.line(&format!("const unsigned int y = (blockY * {}) + j + k;", block_size));
    os.line("if(x < group->numTrgNeurons && y < group->numSrcNeurons) {");
    os.line("const unsigned int idx = (y * group->rowStride) + x;");
    os.line(&format!(
        "{} {} = group->{}[{}];",
        transposed.ty.get_name(), transposed.local(), transposed.name, transposed_index
    ));
    os.line(&wrap_code(&env.preamble(), &code, &env.postamble()));
    if !transposed.read_only {
        os.line(&format!("group->{}[{}] = {};", transposed.name, transposed_index, transposed.local()));
    }
    os.line(&format!("shTile[j + k][{}] = {};", tid, transposed.local()));
    os.line("}");
    os.line("}");
    os.line("}");
    os.line("}");
    os.line(&format!("{};", platform.barrier()));

    os.line("// store");
    os.line("{");
    os.line(&format!("const unsigned int x = (blockY * {}) + {};", block_size, tid));
    os.line(&format!("for(unsigned int j = 0; j < {}; j += 8) {{", block_size));
    os.line("for(unsigned int k = 0; k < 8; k++) {");
    os.line(&format!("const unsigned int y = (blockX * {}) + j + k;", block_size));
    os.line("if(x < group->numSrcNeurons && y < group->numTrgNeurons) {");
    let transpose_offset = if transposed.duplicated { "transposeBatchOffset + " } else { "" };
    os.line(&format!(
        "group->{}Transpose[{}(y * group->numSrcNeurons) + x] = shTile[{}][j + k];",
        transposed.name, transpose_offset, tid
    ));
    os.line("}");
    os.line("}");
    os.line("}");
    os.line("}");

    Ok(())
}

/// Generates `customUpdate`, exporting one `update<Group>` function per update group
pub(crate) fn gen_custom_update_module(backend: &Backend, merged: &ModelMerged<'_>) -> CodegenResult<ModuleSource> {
    let model = merged.model;
    let mut module = ModuleSource::default();

    for group in &merged.custom_update_groups {
        module.add_merged_group(backend, group);
    }
    for group in merged.custom_wu_update_groups.iter().chain(&merged.custom_transpose_update_groups) {
        module.add_merged_group(backend, group);
    }

    for name in merged.custom_update_group_names() {
        let updates: Vec<_> = merged.custom_update_groups.iter()
            .filter(|m| m.archetype().update_group_name == name)
            .collect();
        let wu_updates: Vec<_> = merged.custom_wu_update_groups.iter()
            .filter(|m| m.archetype().update_group_name == name)
            .collect();
        let transposes: Vec<_> = merged.custom_transpose_update_groups.iter()
            .filter(|m| m.archetype().update_group_name == name)
            .collect();

        let mut launches = CodeStream::new();
        if !updates.is_empty() || !wu_updates.is_empty() {
            let kernel = Kernel::CustomUpdate;
            let kernel_name = format!("{}{}", kernel.name(), name);
            let block_size = backend.block_size(kernel);
            let mut layout = KernelLayout::default();
            layout.append(&updates, block_size, |cu| Ok(backend.num_custom_update_threads(cu, model.batch_size)))?;
            layout.append(&wu_updates, block_size, |cu| {
                Ok(backend.num_custom_wu_update_threads(cu, &model.synapse_groups[cu.synapse_group], model.batch_size))
            })?;

            let mut args = backend.merged_array_args(&updates);
            args.extend(backend.merged_array_args(&wu_updates));

            let os = &mut module.device;
            backend.gen_start_id_tables(os, &layout);
            backend.gen_kernel_header(os, &kernel_name, &args);
            backend.gen_kernel_ids(os, kernel, false);
            os.blank();
            backend.gen_parallel_groups(os, &updates, &layout, |os, m| gen_custom_update(backend, os, model, m))?;
            backend.gen_parallel_groups(os, &wu_updates, &layout, |os, m| gen_custom_wu_update(backend, os, model, m))?;
            os.line("}");
            os.blank();

            backend.gen_launch(&mut launches, kernel, &kernel_name, layout.num_threads, 1, &args);
            module.kernels.push(kernel_name);
        }

        if !transposes.is_empty() {
            let kernel = Kernel::CustomTransposeUpdate;
            let kernel_name = format!("{}{}", kernel.name(), name);
            let block_size = backend.block_size(kernel);
            let mut layout = KernelLayout::default();
            layout.append(&transposes, block_size, |cu| {
                Ok(backend.num_custom_transpose_update_threads(cu, &model.synapse_groups[cu.synapse_group], model.batch_size))
            })?;
            let args = backend.merged_array_args(&transposes);

            let scalar = model.type_context().scalar;
            let os = &mut module.device;
            backend.gen_start_id_tables(os, &layout);
            backend.gen_kernel_header(os, &kernel_name, &args);
            os.line(&format!(
                "{}{} shTile[{}][{}];",
                backend.platform().shared_prefix(), scalar.get_name(), block_size, block_size + 1
            ));
            backend.gen_kernel_ids(os, kernel, false);
            os.blank();
            backend.gen_parallel_groups(os, &transposes, &layout, |os, m| gen_custom_transpose_update(backend, os, model, m))?;
            os.line("}");
            os.blank();

            backend.gen_launch(&mut launches, kernel, &kernel_name, layout.num_threads, 1, &args);
            module.kernels.push(kernel_name);
        }

        module.host.line(&format!("EXPORT_FUNC void update{}() {{", name));
        module.host.line(launches.as_str());
        module.host.line(backend.platform().synchronise());
        module.host.line("}");
        module.host.blank();
    }

    Ok(module)
}


#[cfg(test)]
mod tests {
    use crate::models::{ReductionOperation, VarAccess};
    use crate::types::ResolvedType;
    use super::super::super::environment::Environment;
    use super::{add_targets, padded_size, UpdateTarget};

    fn target(name: &str, access: VarAccess, batched: bool) -> UpdateTarget {
        UpdateTarget {
            name: name.to_string(),
            ty: ResolvedType::float(),
            read_only: access.is_read_only(),
            reduction: access.reduction(),
            duplicated: batched && access.is_duplicated(),
            shared_neuron: access.is_shared_neuron(),
        }
    }

    #[test]
    fn test_padded_size_expression() {
        assert_eq!(padded_size("group->size", 32), "(32 * ((group->size + 31) / 32))");
    }

    #[test]
    fn test_reduction_target_folds_into_accumulator() {
        let context = crate::types::TypeContext::default();
        let mut env = Environment::new(&context);
        let targets = vec![target("total", VarAccess::ReduceBatchSum, true), target("x", VarAccess::ReadWrite, true)];
        add_targets(&mut env, &targets, |t| format!("batchOffset + {}", t.name));

        let tokens = crate::transpiler::scan_code("total = x;", "test").unwrap();
        let code = env.print_code(&tokens, "test").unwrap();

        assert_eq!(code.trim(), "_ltotal = _lx;");
        assert!(env.preamble().contains("float _ltotal;"));
        assert!(env.preamble().contains("float _lx = group->x[batchOffset + x];"));
        assert!(env.postamble().contains("_lrtotal = _lrtotal + _ltotal;"));
        assert_eq!(targets[0].reduction, Some(ReductionOperation::Sum));
    }
}
