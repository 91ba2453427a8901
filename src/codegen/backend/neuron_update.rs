//! Neuron update kernel, along with the housekeeping kernels which update
//! previous spike times and advance spike queues after synapses have run.

use crate::groups::{ModelSpec, NeuronGroup};
use crate::merged::neuron::NeuronMergedGroup;
use crate::merged::{ChildKind, ModelMerged};
use crate::types::{parse_type, ResolvedType};
use crate::utils::ceil_divide;
use super::super::code_stream::CodeStream;
use super::super::environment::Environment;
use super::platform::{AtomicOperation, KernelArg, MemorySpace};
use super::{
    add_cached_vars, add_egps, add_params, archetype_children, element_index, param_names, step_rng_sequence,
    wrap_code, Backend, CodegenResult, Kernel, KernelLayout, ModuleSource,
};


/// Shared memory a neuron kernel needs for any of its groups
#[derive(Debug, Clone, Copy, Default)]
struct SharedArrays {
    spike_events: bool,
    spike_recording: bool,
    spike_event_recording: bool,
}

impl SharedArrays {
    fn of(groups: &[&NeuronMergedGroup<'_>]) -> Self {
        groups.iter().map(|m| m.archetype()).fold(SharedArrays::default(), |shared, ng| SharedArrays {
            spike_events: shared.spike_events || ng.spike_event_required,
            spike_recording: shared.spike_recording || ng.spike_recording_enabled,
            spike_event_recording: shared.spike_event_recording || ng.spike_event_recording_enabled,
        })
    }
}

/// Slot spikes of this time step are written to and the slot of the previous one
fn gen_neuron_offsets(os: &mut CodeStream, ng: &NeuronGroup) {
    os.line("const unsigned int batchOffset = batch * group->numNeurons;");
    if ng.is_delay_required() {
        let slots = ng.num_delay_slots;
        os.line(&format!("const unsigned int readDelaySlot = (*group->spkQuePtr + {}) % {};", slots - 1, slots));
        os.line(&format!("const unsigned int writeBatchDelaySlot = (batch * {}) + *group->spkQuePtr;", slots));
        os.line(&format!("const unsigned int readBatchDelayOffset = ((batch * {}) + readDelaySlot) * group->numNeurons;", slots));
        os.line("const unsigned int writeBatchDelayOffset = writeBatchDelaySlot * group->numNeurons;");
    } else {
        os.line("const unsigned int writeBatchDelaySlot = batch;");
        os.line("const unsigned int readBatchDelayOffset = batchOffset;");
        os.line("const unsigned int writeBatchDelayOffset = batchOffset;");
    }
}

/// Postsynaptic model code of each incoming synapse group
fn gen_in_syn(
    backend: &Backend,
    os: &mut CodeStream,
    model: &ModelSpec,
    merged: &NeuronMergedGroup<'_>,
    env: &Environment<'_>,
) -> CodegenResult<()> {
    let batched = model.batch_size > 1;
    let scalar = env.context().scalar.clone();
    let prefix = backend.platform().pointer_prefix();

    for (c, &sg_index) in archetype_children(merged, ChildKind::InSyn).iter().enumerate() {
        let sg = &model.synapse_groups[sg_index];
        let suffix = ChildKind::InSyn.suffix(c);
        os.line(&format!("// {}", sg.description()));
        os.line("{");
        os.line(&format!("{} linSyn = group->outPost{}[batchOffset + lid];", scalar.get_name(), suffix));
        if sg.is_dendritic_delay_required() {
            os.line(&format!(
                "{}{} *denDelayFront = &group->denDelay{}[(((batch * {}) + *group->denDelayPtr{}) * group->numNeurons) + lid];",
                prefix, scalar.get_name(), suffix, sg.max_dendritic_delay_timesteps, suffix
            ));
            os.line("linSyn += *denDelayFront;");
            os.line(&format!("*denDelayFront = {};", scalar.write_numeric(0.0)));
        }

        let mut in_env = env.nested();
        in_env.add("inSyn", scalar.clone(), "linSyn");
        in_env.add_function("injectCurrent", ResolvedType::void(), vec![scalar.clone()], "Isyn += $(0)");
        add_params(
            &mut in_env, merged, &param_names(&sg.ps_model.snippet), &suffix, &scalar,
            |name| sg.get_ps_param_value(name).unwrap_or_default(),
        );
        add_egps(&mut in_env, &sg.ps_model.snippet.extra_global_params, &suffix);
        add_cached_vars(&mut in_env, &sg.ps_model.vars, &suffix, |v| {
            element_index(batched && v.access.is_duplicated(), v.access.is_shared_neuron(), "batchOffset", "lid")
        });

        let apply = in_env.print_code(&sg.ps_apply_input_tokens, &format!("{} apply input code", sg.description()))?;
        let decay = in_env.print_code(&sg.ps_decay_tokens, &format!("{} decay code", sg.description()))?;
        os.line(&wrap_code(&in_env.preamble(), &format!("{}\n{}\n", apply, decay), &in_env.postamble()));
        os.line(&format!("group->outPost{}[batchOffset + lid] = linSyn;", suffix));
        os.line("}");
    }

    for c in 0..merged.num_children(ChildKind::OutSynPreOutput) {
        let suffix = ChildKind::OutSynPreOutput.suffix(c);
        os.line(&format!("Isyn += group->outPre{}[batchOffset + lid];", suffix));
        os.line(&format!("group->outPre{}[batchOffset + lid] = {};", suffix, scalar.write_numeric(0.0)));
    }

    Ok(())
}

fn gen_current_sources(
    os: &mut CodeStream,
    model: &ModelSpec,
    merged: &NeuronMergedGroup<'_>,
    env: &Environment<'_>,
) -> CodegenResult<()> {
    let batched = model.batch_size > 1;
    let scalar = env.context().scalar.clone();

    for (c, &cs_index) in archetype_children(merged, ChildKind::CurrentSource).iter().enumerate() {
        let cs = &model.current_sources[cs_index];
        let suffix = ChildKind::CurrentSource.suffix(c);

        let mut cs_env = env.nested();
        cs_env.add_function("injectCurrent", ResolvedType::void(), vec![scalar.clone()], "Isyn += $(0)");
        add_params(
            &mut cs_env, merged, &param_names(&cs.model.snippet), &suffix, &scalar,
            |name| cs.get_param_value(name).unwrap_or_default(),
        );
        add_egps(&mut cs_env, &cs.model.snippet.extra_global_params, &suffix);
        add_cached_vars(&mut cs_env, &cs.model.vars, &suffix, |v| {
            element_index(batched && v.access.is_duplicated(), v.access.is_shared_neuron(), "batchOffset", "lid")
        });

        let code = cs_env.print_code(&cs.injection_tokens, &format!("{} injection code", cs.description()))?;
        os.line(&format!("// {}", cs.description()));
        os.line("{");
        os.line(&wrap_code(&cs_env.preamble(), &code, &cs_env.postamble()));
        os.line("}");
    }

    Ok(())
}

/// Combined event threshold condition of every outgoing synapse group which needs spike-like events
fn gen_event_threshold(
    os: &mut CodeStream,
    model: &ModelSpec,
    merged: &NeuronMergedGroup<'_>,
    env: &Environment<'_>,
) -> CodegenResult<Option<String>> {
    let ng = merged.archetype();
    let scalar = env.context().scalar.clone();
    let children = archetype_children(merged, ChildKind::OutSynEventThreshold);
    if children.is_empty() {
        return Ok(None);
    }

    let mut conditions = Vec::with_capacity(children.len());
    for (c, &sg_index) in children.iter().enumerate() {
        let sg = &model.synapse_groups[sg_index];
        let suffix = ChildKind::OutSynEventThreshold.suffix(c);

        let mut threshold_env = env.nested();
        add_params(
            &mut threshold_env, merged, &param_names(&sg.wu_model.snippet), &suffix, &scalar,
            |name| sg.get_wu_param_value(name).unwrap_or_default(),
        );
        add_egps(&mut threshold_env, &sg.wu_model.snippet.extra_global_params, &suffix);
        for var in &ng.model.vars {
            let ty = crate::merged::var_type(var, env.context()).add_const();
            let local = format!("_l{}", var.name);
            threshold_env.add_full(&format!("{}_pre", var.name), ty, &local, None, None, vec![var.name.clone()]);
        }

        let condition = threshold_env.print_expression(
            &sg.wu_event_threshold_tokens,
            &format!("{} event threshold condition", sg.description()),
        )?;
        conditions.push(condition);
    }

    os.line("bool spikeLikeEvent = false;");
    for condition in conditions {
        os.line(&format!("spikeLikeEvent |= ({});", condition));
    }

    Ok(Some("spikeLikeEvent".to_string()))
}

/// Registers the current neuron in the block's shared spike or event list
fn gen_emit(backend: &Backend, os: &mut CodeStream, count: &str, list: &str, record: Option<&str>) {
    let platform = backend.platform();
    let tid = platform.thread_id();
    let uint = ResolvedType::uint32();

    os.line(&format!(
        "const unsigned int {}Idx = {}(&{}, 1);",
        list, platform.atomic(AtomicOperation::Add, &uint, MemorySpace::Shared), count
    ));
    os.line(&format!("{}[{}Idx] = lid;", list, list));
    if let Some(record) = record {
        os.line(&format!(
            "{}(&{}[{} / 32], 1 << ({} % 32));",
            platform.atomic(AtomicOperation::Or, &uint, MemorySpace::Shared), record, tid, tid
        ));
    }
}

/// Copies the block's spikes into the group's global arrays
fn gen_spike_write(backend: &Backend, os: &mut CodeStream, ng: &NeuronGroup) {
    let platform = backend.platform();
    let tid = platform.thread_id();
    let barrier = platform.barrier();
    let global_add = platform.atomic(AtomicOperation::Add, &ResolvedType::uint32(), MemorySpace::Global);

    os.line(&format!("{};", barrier));
    os.line(&format!("if({} == 0) {{", tid));
    os.line("if(shSpkCount > 0) {");
    os.line(&format!("shSpkPos = {}(&group->spkCnt[writeBatchDelaySlot], shSpkCount);", global_add));
    os.line("}");
    if ng.spike_event_required {
        os.line("if(shSpkEvntCount > 0) {");
        os.line(&format!("shSpkEvntPos = {}(&group->spkCntEvnt[writeBatchDelaySlot], shSpkEvntCount);", global_add));
        os.line("}");
    }
    os.line("}");
    os.line(&format!("{};", barrier));

    os.line(&format!("if({} < shSpkCount) {{", tid));
    os.line(&format!("const unsigned int n = shSpk[{}];", tid));
    os.line(&format!("group->spk[writeBatchDelayOffset + shSpkPos + {}] = n;", tid));
    if ng.spike_time_required {
        os.line("group->sT[writeBatchDelayOffset + n] = t;");
    }
    os.line("}");
    if ng.spike_event_required {
        os.line(&format!("if({} < shSpkEvntCount) {{", tid));
        os.line(&format!("group->spkEvnt[writeBatchDelayOffset + shSpkEvntPos + {}] = shSpkEvnt[{}];", tid, tid));
        os.line("}");
    }
}

/// Copies the block's recording words into the recording buffers
fn gen_recording_write(backend: &Backend, os: &mut CodeStream, model: &ModelSpec, ng: &NeuronGroup, block_size: usize) {
    let tid = backend.platform().thread_id();
    let buffers = [
        (ng.spike_recording_enabled, "recordSpk", "shSpkRecord"),
        (ng.spike_event_recording_enabled, "recordSpkEvnt", "shSpkEvntRecord"),
    ];
    if !buffers.iter().any(|(enabled, _, _)| *enabled) {
        return;
    }

    os.line(&format!("if({} < {}) {{", tid, ceil_divide(block_size, 32)));
    os.line("const unsigned int numRecordingWords = (group->numNeurons + 31) / 32;");
    os.line(&format!("const unsigned int popWordIdx = ((lid - {}) / 32) + {};", tid, tid));
    os.line("if(popWordIdx < numRecordingWords) {");
    for (_, buffer, shared) in buffers.iter().filter(|(enabled, _, _)| *enabled) {
        os.line(&format!(
            "group->{}[(recordingTimestep * numRecordingWords * {}) + (batch * numRecordingWords) + popWordIdx] = {}[{}];",
            buffer, model.batch_size, shared, tid
        ));
    }
    os.line("}");
    os.line("}");
}

fn gen_neuron_group(
    backend: &Backend,
    os: &mut CodeStream,
    model: &ModelSpec,
    merged: &NeuronMergedGroup<'_>,
    num_threads: usize,
) -> CodegenResult<()> {
    let ng = merged.archetype();
    let context = model.type_context();
    let scalar = context.scalar.clone();
    let batched = model.batch_size > 1;
    let block_size = backend.block_size(Kernel::NeuronUpdate);
    let uint = ResolvedType::uint32().add_const();

    gen_neuron_offsets(os, ng);

    let mut env = backend.base_environment(&context);
    env.add("t", context.timepoint.add_const(), "t");
    env.add("id", uint.clone(), "lid");
    env.add("batch", uint.clone(), "batch");
    env.add("num_neurons", uint.clone(), "group->numNeurons");
    env.add("num_batch", uint, &model.batch_size.to_string());
    env.add("Isyn", scalar.clone(), "Isyn");
    if ng.spike_time_required {
        env.add("st", context.timepoint.add_const(), "group->sT[writeBatchDelayOffset + lid]");
    }
    if ng.prev_spike_time_required {
        env.add("prev_st", context.timepoint.add_const(), "group->prevST[writeBatchDelayOffset + lid]");
    }
    backend.add_rng(&mut env, model.seed, &step_rng_sequence(model.batch_size, num_threads));
    add_params(
        &mut env, merged, &param_names(&ng.model.snippet), "", &scalar,
        |name| ng.get_param_value(name).unwrap_or_default(),
    );
    add_egps(&mut env, &ng.model.snippet.extra_global_params, "");
    add_cached_vars(&mut env, &ng.model.vars, "", |v| {
        element_index(batched && v.access.is_duplicated(), v.access.is_shared_neuron(), "batchOffset", "lid")
    });

    let mut body = CodeStream::new();
    body.line(&format!("{} Isyn = {};", scalar.get_name(), scalar.write_numeric(0.0)));
    for input in &ng.model.additional_input_vars {
        let ty = parse_type(&input.ty, &context).unwrap_or_else(|| scalar.clone());
        body.line(&format!("{} {} = {};", ty.get_name(), input.name, ty.write_numeric(input.init_value)));
        env.add(&input.name, ty, &input.name);
    }
    if ng.is_delay_required() {
        for (enabled, array) in [(ng.spike_time_required, "sT"), (ng.prev_spike_time_required, "prevST")] {
            if enabled {
                body.line(&format!(
                    "group->{}[writeBatchDelayOffset + lid] = group->{}[readBatchDelayOffset + lid];", array, array
                ));
            }
        }
    }

    gen_in_syn(backend, &mut body, model, merged, &env)?;
    gen_current_sources(&mut body, model, merged, &env)?;

    body.line("// neuron update");
    body.line(&env.print_code(&ng.sim_tokens, &format!("{} sim code", ng.description()))?);

    let spike_event_record = ng.spike_event_recording_enabled.then_some("shSpkEvntRecord");
    if let Some(condition) = gen_event_threshold(&mut body, model, merged, &env)? {
        body.line(&format!("if({}) {{", condition));
        gen_emit(backend, &mut body, "shSpkEvntCount", "shSpkEvnt", spike_event_record);
        body.line("}");
    }

    if !ng.threshold_condition_tokens.is_empty() {
        let threshold = env.print_expression(
            &ng.threshold_condition_tokens,
            &format!("{} threshold condition code", ng.description()),
        )?;
        body.line("// test for and register a true spike");
        body.line(&format!("if({}) {{", threshold));
        gen_emit(backend, &mut body, "shSpkCount", "shSpk", ng.spike_recording_enabled.then_some("shSpkRecord"));
        if !ng.reset_tokens.is_empty() {
            body.line("// spike reset code");
            body.line(&env.print_code(&ng.reset_tokens, &format!("{} reset code", ng.description()))?);
        }
        body.line("}");
    }

    os.line("if(lid < group->numNeurons) {");
    os.line(&wrap_code(&env.preamble(), body.as_str(), &env.postamble()));
    os.line("}");

    gen_spike_write(backend, os, ng);
    gen_recording_write(backend, os, model, ng, block_size);

    Ok(())
}

fn gen_neuron_update_kernel(
    backend: &Backend,
    os: &mut CodeStream,
    model: &ModelSpec,
    groups: &[&NeuronMergedGroup<'_>],
    args: &[KernelArg],
) -> CodegenResult<KernelLayout> {
    let kernel = Kernel::NeuronUpdate;
    let block_size = backend.block_size(kernel);
    let platform = backend.platform();
    let shared_prefix = platform.shared_prefix();
    let tid = platform.thread_id();
    let mut layout = KernelLayout::default();
    layout.append(groups, block_size, |ng| Ok(ng.num_neurons))?;

    let shared = SharedArrays::of(groups);
    let num_words = ceil_divide(block_size, 32);

    backend.gen_start_id_tables(os, &layout);
    backend.gen_kernel_header(os, kernel.name(), args);
    backend.gen_kernel_ids(os, kernel, true);
    os.line(&format!("{}unsigned int shSpk[{}];", shared_prefix, block_size));
    os.line(&format!("{}unsigned int shSpkPos;", shared_prefix));
    os.line(&format!("{}unsigned int shSpkCount;", shared_prefix));
    if shared.spike_events {
        os.line(&format!("{}unsigned int shSpkEvnt[{}];", shared_prefix, block_size));
        os.line(&format!("{}unsigned int shSpkEvntPos;", shared_prefix));
        os.line(&format!("{}unsigned int shSpkEvntCount;", shared_prefix));
    }
    if shared.spike_recording {
        os.line(&format!("{}uint32_t shSpkRecord[{}];", shared_prefix, num_words));
    }
    if shared.spike_event_recording {
        os.line(&format!("{}uint32_t shSpkEvntRecord[{}];", shared_prefix, num_words));
    }
    os.blank();

    os.line(&format!("if({} == 0) {{", tid));
    os.line("shSpkCount = 0;");
    if shared.spike_events {
        os.line("shSpkEvntCount = 0;");
    }
    os.line("}");
    if shared.spike_recording || shared.spike_event_recording {
        os.line(&format!("if({} < {}) {{", tid, num_words));
        if shared.spike_recording {
            os.line(&format!("shSpkRecord[{}] = 0;", tid));
        }
        if shared.spike_event_recording {
            os.line(&format!("shSpkEvntRecord[{}] = 0;", tid));
        }
        os.line("}");
    }
    os.line(&format!("{};", platform.barrier()));
    os.blank();

    let num_threads = layout.num_threads;
    backend.gen_parallel_groups(os, groups, &layout, |os, merged| {
        gen_neuron_group(backend, os, model, merged, num_threads)
    })?;
    os.line("}");
    os.blank();

    Ok(layout)
}

/// Sets the previous spike time of every neuron which spiked this step
fn gen_prev_spike_time_kernel(
    backend: &Backend,
    os: &mut CodeStream,
    groups: &[&NeuronMergedGroup<'_>],
    args: &[KernelArg],
) -> CodegenResult<KernelLayout> {
    let kernel = Kernel::NeuronPrevSpikeTimeUpdate;
    let mut layout = KernelLayout::default();
    layout.append(groups, backend.block_size(kernel), |ng| Ok(ng.num_neurons))?;

    backend.gen_start_id_tables(os, &layout);
    backend.gen_kernel_header(os, kernel.name(), args);
    backend.gen_kernel_ids(os, kernel, true);
    os.blank();

    backend.gen_parallel_groups(os, groups, &layout, |os, merged| {
        let ng = merged.archetype();
        if ng.is_delay_required() {
            os.line(&format!("const unsigned int writeBatchDelaySlot = (batch * {}) + *group->spkQuePtr;", ng.num_delay_slots));
        } else {
            os.line("const unsigned int writeBatchDelaySlot = batch;");
        }
        os.line("const unsigned int writeBatchDelayOffset = writeBatchDelaySlot * group->numNeurons;");
        os.line("if(lid < group->spkCnt[writeBatchDelaySlot]) {");
        os.line("group->prevST[writeBatchDelayOffset + group->spk[writeBatchDelayOffset + lid]] = t;");
        os.line("}");
        Ok(())
    })?;
    os.line("}");
    os.blank();

    Ok(layout)
}

/// Advances each group's spike queue and zeroes the spike counts of the slot it moves to
fn gen_spike_queue_kernel(
    backend: &Backend,
    os: &mut CodeStream,
    model: &ModelSpec,
    groups: &[&NeuronMergedGroup<'_>],
    args: &[KernelArg],
) -> CodegenResult<usize> {
    let kernel = Kernel::NeuronSpikeQueueUpdate;
    backend.gen_kernel_header(os, kernel.name(), args);
    backend.gen_kernel_ids(os, kernel, false);
    let count = backend.gen_group_per_thread(os, groups, |os, merged| {
        let ng = merged.archetype();
        let slot = if ng.is_delay_required() {
            let slots = ng.num_delay_slots;
            os.line(&format!("*group->spkQuePtr = (*group->spkQuePtr + 1) % {};", slots));
            format!("(batch * {}) + *group->spkQuePtr", slots)
        } else {
            "batch".to_string()
        };
        os.line(&format!("for(unsigned int batch = 0; batch < {}; batch++) {{", model.batch_size));
        os.line(&format!("group->spkCnt[{}] = 0;", slot));
        if ng.spike_event_required {
            os.line(&format!("group->spkCntEvnt[{}] = 0;", slot));
        }
        os.line("}");
        Ok(())
    })?;
    os.line("}");
    os.blank();

    Ok(count)
}

/// Generates `neuronUpdate`, exporting `updateNeurons` which runs before
/// synapses and `updateNeuronQueues` which runs after them
pub(crate) fn gen_neuron_update_module(backend: &Backend, merged: &ModelMerged<'_>) -> CodegenResult<ModuleSource> {
    let model = merged.model;
    let time_type = model.type_context().timepoint.get_name();
    let mut module = ModuleSource::default();

    let update: Vec<_> = merged.neuron_update_groups.iter().collect();
    let prev_spike_time: Vec<_> = merged.neuron_prev_spike_time_update_groups.iter().collect();
    let spike_queue: Vec<_> = merged.neuron_spike_queue_update_groups.iter().collect();
    for group in update.iter().chain(&prev_spike_time).chain(&spike_queue) {
        module.add_merged_group(backend, group);
    }

    let time_arg = KernelArg::value(&time_type, "t");
    let mut update_launches = CodeStream::new();
    if !update.is_empty() {
        let kernel = Kernel::NeuronUpdate;
        let mut args = vec![time_arg.clone(), KernelArg::value("unsigned int", "recordingTimestep")];
        args.extend(backend.merged_array_args(&update));
        let layout = gen_neuron_update_kernel(backend, &mut module.device, model, &update, &args)?;
        module.kernels.push(kernel.name().to_string());
        backend.gen_launch(&mut update_launches, kernel, kernel.name(), layout.num_threads, model.batch_size, &args);
    }

    let mut queue_launches = CodeStream::new();
    if !prev_spike_time.is_empty() {
        let kernel = Kernel::NeuronPrevSpikeTimeUpdate;
        let mut args = vec![time_arg];
        args.extend(backend.merged_array_args(&prev_spike_time));
        let layout = gen_prev_spike_time_kernel(backend, &mut module.device, &prev_spike_time, &args)?;
        module.kernels.push(kernel.name().to_string());
        backend.gen_launch(&mut queue_launches, kernel, kernel.name(), layout.num_threads, model.batch_size, &args);
    }
    if !spike_queue.is_empty() {
        let kernel = Kernel::NeuronSpikeQueueUpdate;
        let args = backend.merged_array_args(&spike_queue);
        let count = gen_spike_queue_kernel(backend, &mut module.device, model, &spike_queue, &args)?;
        module.kernels.push(kernel.name().to_string());
        backend.gen_launch(&mut queue_launches, kernel, kernel.name(), count, 1, &args);
    }

    module.host.line(&format!("EXPORT_FUNC void updateNeurons({} t, unsigned int recordingTimestep) {{", time_type));
    module.host.line(update_launches.as_str());
    module.host.line("}");
    module.host.blank();
    module.host.line(&format!("EXPORT_FUNC void updateNeuronQueues({} t) {{", time_type));
    module.host.line(queue_launches.as_str());
    module.host.line("}");

    Ok(module)
}


#[cfg(test)]
mod tests {
    use crate::config::Preferences;
    use crate::groups::ModelSpec;
    use crate::merged::ModelMerged;
    use crate::models::{current_source_models, neuron_models, param_values, VarInit};
    use super::super::Backend;
    use super::gen_neuron_update_module;

    fn lif_model(recording: bool) -> ModelSpec {
        let mut model = ModelSpec::new("neurons");
        let params = param_values(&[
            ("C", 1.0), ("TauM", 20.0), ("Vrest", -70.0), ("Vreset", -70.0),
            ("Vthresh", -51.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ]);
        let vars = [("V", VarInit::constant(-70.0)), ("RefracTime", VarInit::constant(0.0))]
            .into_iter().map(|(n, v)| (n.to_string(), v)).collect();
        model.add_neuron_population("Exc", 100, neuron_models::lif(), params, vars).unwrap()
            .set_spike_recording_enabled(recording);
        model.add_current_source("Stim", current_source_models::dc(), "Exc", param_values(&[("amp", 0.5)]), Default::default())
            .unwrap();
        model.finalise().unwrap();
        model
    }

    fn generate(model: &ModelSpec) -> String {
        let merged = ModelMerged::new(model).unwrap();
        let backend = Backend::new(Preferences::default()).unwrap();
        let module = gen_neuron_update_module(&backend, &merged).unwrap();
        format!("{}\n{}", module.device.into_string(), module.host.into_string())
    }

    #[test]
    fn test_update_reads_and_writes_back_state() {
        let code = generate(&lif_model(false));

        assert!(code.contains("float _lV = group->V[lid];"));
        assert!(code.contains("group->V[lid] = _lV;"));
        assert!(code.contains("Isyn += 5.000000000e-1f"));
        assert!(code.contains("shSpk[shSpkIdx] = lid;"));
        assert!(code.contains("EXPORT_FUNC void updateNeurons(float t, unsigned int recordingTimestep)"));
    }

    #[test]
    fn test_recording_only_when_enabled() {
        assert!(!generate(&lif_model(false)).contains("shSpkRecord"));

        let code = generate(&lif_model(true));
        assert!(code.contains("atomicOr(&shSpkRecord[threadIdx.x / 32], 1 << (threadIdx.x % 32));"));
        assert!(code.contains("group->recordSpk[(recordingTimestep * numRecordingWords * 1) + (batch * numRecordingWords) + popWordIdx]"));
    }

    #[test]
    fn test_spike_counts_are_zeroed_after_synapses() {
        let code = generate(&lif_model(false));

        assert!(code.contains("EXPORT_FUNC void updateNeuronQueues(float t)"));
        assert!(code.contains("group->spkCnt[batch] = 0;"));
    }
}
