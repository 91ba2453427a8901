use std::sync::Arc;
use sha2::{Sha256, Digest};
use crate::groups::{GroupKind, GroupRef, ModelSpec, NeuronGroup};
use crate::types::ResolvedType;
use crate::utils::{finish_hash, HashDigest, UpdateHash};
use super::{group_by_digest, sort_children, var_type, ChildKind, FieldKind, FieldValue, MergedGroup, MergedKind};


pub type NeuronMergedGroup<'a> = MergedGroup<'a, NeuronGroup>;

fn neuron_owner(g: &NeuronGroup, _: usize) -> GroupRef {
    GroupRef::new(GroupKind::NeuronGroup, &g.name)
}

/// Children of a neuron group in the order they are merged for its update
pub(crate) fn update_children(model: &ModelSpec, ng: &NeuronGroup, kind: ChildKind) -> Vec<usize> {
    match kind {
        ChildKind::CurrentSource => sort_children(&ng.current_sources, |i| model.current_sources[i].hash_digest()),
        ChildKind::InSyn => sort_children(&ng.in_syn, |i| model.synapse_groups[i].ps_hash_digest()),
        ChildKind::OutSynPreOutput => {
            let pre_output: Vec<usize> = ng.out_syn.iter().copied()
                .filter(|&i| model.synapse_groups[i].is_pre_output_required())
                .collect();
            sort_children(&pre_output, |i| model.synapse_groups[i].pre_output_hash_digest())
        },
        ChildKind::OutSynEventThreshold => {
            let event: Vec<usize> = ng.out_syn.iter().copied()
                .filter(|&i| model.synapse_groups[i].is_spike_event_required())
                .collect();
            sort_children(&event, |i| model.synapse_groups[i].event_threshold_hash_digest())
        },
    }
}

/// Children of a neuron group in the order they are merged for initialisation
pub(crate) fn init_children(model: &ModelSpec, ng: &NeuronGroup, kind: ChildKind) -> Vec<usize> {
    match kind {
        ChildKind::CurrentSource => sort_children(&ng.current_sources, |i| model.current_sources[i].init_hash_digest()),
        ChildKind::InSyn => sort_children(&ng.in_syn, |i| model.synapse_groups[i].init_hash_digest()),
        ChildKind::OutSynPreOutput => {
            let pre_output: Vec<usize> = ng.out_syn.iter().copied()
                .filter(|&i| model.synapse_groups[i].is_pre_output_required())
                .collect();
            sort_children(&pre_output, |i| model.synapse_groups[i].pre_output_hash_digest())
        },
        ChildKind::OutSynEventThreshold => vec![],
    }
}

const UPDATE_CHILD_KINDS: [ChildKind; 4] = [
    ChildKind::CurrentSource, ChildKind::InSyn, ChildKind::OutSynPreOutput, ChildKind::OutSynEventThreshold,
];

const INIT_CHILD_KINDS: [ChildKind; 3] = [ChildKind::CurrentSource, ChildKind::InSyn, ChildKind::OutSynPreOutput];

fn child_digest(model: &ModelSpec, kind: ChildKind, index: usize, init: bool) -> HashDigest {
    match (kind, init) {
        (ChildKind::CurrentSource, false) => model.current_sources[index].hash_digest(),
        (ChildKind::CurrentSource, true) => model.current_sources[index].init_hash_digest(),
        (ChildKind::InSyn, false) => model.synapse_groups[index].ps_hash_digest(),
        (ChildKind::InSyn, true) => model.synapse_groups[index].init_hash_digest(),
        (ChildKind::OutSynPreOutput, _) => model.synapse_groups[index].pre_output_hash_digest(),
        (ChildKind::OutSynEventThreshold, _) => model.synapse_groups[index].event_threshold_hash_digest(),
    }
}

/// Digest of everything which changes the neuron update code of a group
pub fn update_hash_digest(model: &ModelSpec, ng: &NeuronGroup) -> HashDigest {
    let mut hasher = Sha256::new();
    ng.hash_update_shape(&mut hasher);
    for kind in UPDATE_CHILD_KINDS {
        let children: Vec<HashDigest> = update_children(model, ng, kind).into_iter()
            .map(|i| child_digest(model, kind, i, false))
            .collect();
        children.update_hash(&mut hasher);
    }

    finish_hash(hasher)
}

pub fn init_hash_digest(model: &ModelSpec, ng: &NeuronGroup) -> HashDigest {
    let mut hasher = Sha256::new();
    ng.init_hash_digest().update_hash(&mut hasher);
    for kind in INIT_CHILD_KINDS {
        let children: Vec<HashDigest> = init_children(model, ng, kind).into_iter()
            .map(|i| child_digest(model, kind, i, true))
            .collect();
        children.update_hash(&mut hasher);
    }

    finish_hash(hasher)
}

fn add_children<'a>(
    merged: &mut NeuronMergedGroup<'a>,
    model: &'a ModelSpec,
    kinds: &[ChildKind],
    order: fn(&ModelSpec, &NeuronGroup, ChildKind) -> Vec<usize>,
) {
    for &kind in kinds {
        let children: Vec<Vec<usize>> = merged.groups.iter().map(|ng| order(model, ng, kind)).collect();
        merged.children.insert(kind, Arc::new(children));
    }
}

/// Spike arrays shared by the update and initialisation of neuron groups
fn add_spike_fields(merged: &mut NeuronMergedGroup<'_>, model: &ModelSpec) {
    let archetype = merged.archetype();
    let timepoint = model.type_context().timepoint;

    merged.add_field(ResolvedType::uint32(), "numNeurons", |g, _| FieldValue::Scalar(g.num_neurons as f64), FieldKind::Standard);
    merged.add_array_field(ResolvedType::uint32(), "spkCnt", neuron_owner, "spkCnt");
    merged.add_array_field(ResolvedType::uint32(), "spk", neuron_owner, "spk");
    if archetype.is_delay_required() {
        merged.add_array_field(ResolvedType::uint32(), "spkQuePtr", neuron_owner, "spkQuePtr");
    }
    if archetype.spike_time_required {
        merged.add_array_field(timepoint.clone(), "sT", neuron_owner, "sT");
    }
    if archetype.prev_spike_time_required {
        merged.add_array_field(timepoint, "prevST", neuron_owner, "prevST");
    }
    if archetype.spike_event_required {
        merged.add_array_field(ResolvedType::uint32(), "spkCntEvnt", neuron_owner, "spkCntEvnt");
        merged.add_array_field(ResolvedType::uint32(), "spkEvnt", neuron_owner, "spkEvnt");
    }
}

fn add_update_fields<'a>(merged: &mut NeuronMergedGroup<'a>, model: &'a ModelSpec) {
    let archetype = merged.archetype();
    let context = model.type_context();
    let scalar = context.scalar.clone();

    add_spike_fields(merged, model);
    if archetype.spike_recording_enabled {
        merged.add_array_field(ResolvedType::uint32(), "recordSpk", neuron_owner, "recordSpk");
    }
    if archetype.spike_event_recording_enabled {
        merged.add_array_field(ResolvedType::uint32(), "recordSpkEvnt", neuron_owner, "recordSpkEvnt");
    }

    for var in &archetype.model.vars {
        merged.add_array_field(var_type(var, &context), &var.name, neuron_owner, &var.name);
    }

    let snippet = &archetype.model.snippet;
    let param_names: Vec<String> = snippet.params.iter().cloned()
        .chain(snippet.derived_params.iter().map(|d| d.name.clone()))
        .collect();
    merged.add_heterogeneous_params(
        &param_names, "", &scalar, neuron_owner,
        |g, _, name| g.get_param_value(name).unwrap_or_default(),
        |g, name| g.is_param_dynamic(name),
    );
    merged.add_egp_fields(&snippet.extra_global_params, "", &context, neuron_owner);

    // Current sources
    let cs_children = merged.children[&ChildKind::CurrentSource].clone();
    for (c, &cs_index) in cs_children[0].iter().enumerate() {
        let suffix = ChildKind::CurrentSource.suffix(c);
        let cs_archetype = &model.current_sources[cs_index];
        let owner = {
            let children = cs_children.clone();
            move |_: &NeuronGroup, i: usize| GroupRef::new(GroupKind::CurrentSource, &model.current_sources[children[i][c]].name)
        };

        for var in &cs_archetype.model.vars {
            merged.add_array_field(var_type(var, &context), &format!("{}{}", var.name, suffix), owner.clone(), &var.name);
        }

        let snippet = &cs_archetype.model.snippet;
        let param_names: Vec<String> = snippet.params.iter().cloned()
            .chain(snippet.derived_params.iter().map(|d| d.name.clone()))
            .collect();
        let children = cs_children.clone();
        let dynamic_params = cs_archetype.dynamic_params.clone();
        merged.add_heterogeneous_params(
            &param_names, &suffix, &scalar, owner.clone(),
            move |_, i, name| model.current_sources[children[i][c]].get_param_value(name).unwrap_or_default(),
            |_, name| dynamic_params.contains(name),
        );
        merged.add_egp_fields(&snippet.extra_global_params, &suffix, &context, owner);
    }

    add_in_syn_fields(merged, model, false);
    add_pre_output_fields(merged, model);

    // Event thresholds of outgoing synapse groups
    let event_children = merged.children[&ChildKind::OutSynEventThreshold].clone();
    for (c, &sg_index) in event_children[0].iter().enumerate() {
        let suffix = ChildKind::OutSynEventThreshold.suffix(c);
        let sg_archetype = &model.synapse_groups[sg_index];
        let owner = {
            let children = event_children.clone();
            move |_: &NeuronGroup, i: usize| GroupRef::new(GroupKind::SynapseGroup, &model.synapse_groups[children[i][c]].name)
        };

        let snippet = &sg_archetype.wu_model.snippet;
        let param_names: Vec<String> = snippet.params.iter().cloned()
            .chain(snippet.derived_params.iter().map(|d| d.name.clone()))
            .collect();
        let children = event_children.clone();
        let dynamic_params = sg_archetype.wu_dynamic_params.clone();
        merged.add_heterogeneous_params(
            &param_names, &suffix, &scalar, owner.clone(),
            move |_, i, name| model.synapse_groups[children[i][c]].get_wu_param_value(name).unwrap_or_default(),
            |_, name| dynamic_params.contains(name),
        );
        merged.add_egp_fields(&snippet.extra_global_params, &suffix, &context, owner);
    }
}

/// Input accumulated by incoming synapse groups and their postsynaptic models
fn add_in_syn_fields<'a>(merged: &mut NeuronMergedGroup<'a>, model: &'a ModelSpec, init: bool) {
    let context = model.type_context();
    let scalar = context.scalar.clone();
    let in_syn_children = merged.children[&ChildKind::InSyn].clone();

    for (c, &sg_index) in in_syn_children[0].iter().enumerate() {
        let suffix = ChildKind::InSyn.suffix(c);
        let sg_archetype = &model.synapse_groups[sg_index];
        let owner = {
            let children = in_syn_children.clone();
            move |_: &NeuronGroup, i: usize| GroupRef::new(GroupKind::SynapseGroup, &model.synapse_groups[children[i][c]].name)
        };

        merged.add_array_field(scalar.clone(), &format!("outPost{}", suffix), owner.clone(), "outPost");
        if sg_archetype.is_dendritic_delay_required() {
            merged.add_array_field(scalar.clone(), &format!("denDelay{}", suffix), owner.clone(), "denDelay");
            if !init {
                merged.add_array_field(ResolvedType::uint32(), &format!("denDelayPtr{}", suffix), owner.clone(), "denDelayPtr");
            }
        }

        for var in &sg_archetype.ps_model.vars {
            if init && !sg_archetype.ps_var_initialisers.get(&var.name).map_or(false, |v| v.requires_kernel()) {
                continue;
            }
            merged.add_array_field(var_type(var, &context), &format!("{}{}", var.name, suffix), owner.clone(), &var.name);

            if init {
                let var_name = var.name.clone();
                let children = in_syn_children.clone();
                let init_params = &sg_archetype.ps_var_initialisers[&var.name].snippet.snippet;
                let names: Vec<String> = init_params.params.iter().cloned()
                    .chain(init_params.derived_params.iter().map(|d| d.name.clone()))
                    .collect();
                merged.add_heterogeneous_params(
                    &names, &format!("{}{}", var.name, suffix), &scalar, owner.clone(),
                    move |_, i, name| model.synapse_groups[children[i][c]].ps_var_initialisers
                        .get(&var_name).and_then(|v| v.get_value(name)).unwrap_or_default(),
                    |_, _| false,
                );
            }
        }

        if !init {
            let snippet = &sg_archetype.ps_model.snippet;
            let param_names: Vec<String> = snippet.params.iter().cloned()
                .chain(snippet.derived_params.iter().map(|d| d.name.clone()))
                .collect();
            let children = in_syn_children.clone();
            let dynamic_params = sg_archetype.ps_dynamic_params.clone();
            merged.add_heterogeneous_params(
                &param_names, &suffix, &scalar, owner.clone(),
                move |_, i, name| model.synapse_groups[children[i][c]].get_ps_param_value(name).unwrap_or_default(),
                |_, name| dynamic_params.contains(name),
            );
            merged.add_egp_fields(&snippet.extra_global_params, &suffix, &context, owner);
        }
    }
}

fn add_pre_output_fields<'a>(merged: &mut NeuronMergedGroup<'a>, model: &'a ModelSpec) {
    let scalar = model.precision.clone();
    let pre_output_children = merged.children[&ChildKind::OutSynPreOutput].clone();

    for c in 0..pre_output_children[0].len() {
        let children = pre_output_children.clone();
        merged.add_array_field(
            scalar.clone(),
            &format!("outPre{}", ChildKind::OutSynPreOutput.suffix(c)),
            move |_, i| GroupRef::new(GroupKind::SynapseGroup, &model.synapse_groups[children[i][c]].name),
            "outPre",
        );
    }
}

fn add_init_fields<'a>(merged: &mut NeuronMergedGroup<'a>, model: &'a ModelSpec) {
    let archetype = merged.archetype();
    let context = model.type_context();
    let scalar = context.scalar.clone();

    add_spike_fields(merged, model);

    for var in &archetype.model.vars {
        let Some(var_init) = archetype.var_initialisers.get(&var.name) else { continue };
        if !var_init.requires_kernel() {
            continue;
        }
        merged.add_array_field(var_type(var, &context), &var.name, neuron_owner, &var.name);

        let names: Vec<String> = var_init.snippet.snippet.params.iter().cloned()
            .chain(var_init.snippet.snippet.derived_params.iter().map(|d| d.name.clone()))
            .collect();
        let var_name = var.name.clone();
        merged.add_heterogeneous_params(
            &names, &var.name, &scalar, neuron_owner,
            move |g, _, name| g.var_initialisers.get(&var_name).and_then(|v| v.get_value(name)).unwrap_or_default(),
            |_, _| false,
        );
    }

    let cs_children = merged.children[&ChildKind::CurrentSource].clone();
    for (c, &cs_index) in cs_children[0].iter().enumerate() {
        let suffix = ChildKind::CurrentSource.suffix(c);
        let cs_archetype = &model.current_sources[cs_index];
        let owner = {
            let children = cs_children.clone();
            move |_: &NeuronGroup, i: usize| GroupRef::new(GroupKind::CurrentSource, &model.current_sources[children[i][c]].name)
        };

        for var in &cs_archetype.model.vars {
            let Some(var_init) = cs_archetype.var_initialisers.get(&var.name) else { continue };
            if !var_init.requires_kernel() {
                continue;
            }
            merged.add_array_field(var_type(var, &context), &format!("{}{}", var.name, suffix), owner.clone(), &var.name);

            let names: Vec<String> = var_init.snippet.snippet.params.iter().cloned()
                .chain(var_init.snippet.snippet.derived_params.iter().map(|d| d.name.clone()))
                .collect();
            let var_name = var.name.clone();
            let children = cs_children.clone();
            merged.add_heterogeneous_params(
                &names, &format!("{}{}", var.name, suffix), &scalar, owner.clone(),
                move |_, i, name| model.current_sources[children[i][c]].var_initialisers
                    .get(&var_name).and_then(|v| v.get_value(name)).unwrap_or_default(),
                |_, _| false,
            );
        }
    }

    add_in_syn_fields(merged, model, true);
    add_pre_output_fields(merged, model);
}

pub fn build_neuron_update_groups(model: &ModelSpec) -> Vec<NeuronMergedGroup<'_>> {
    let grouped = group_by_digest(model.neuron_groups.iter().enumerate(), |_, ng| update_hash_digest(model, ng));

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::NeuronUpdate, index, members, digest);
        add_children(&mut merged, model, &UPDATE_CHILD_KINDS, update_children);
        add_update_fields(&mut merged, model);
        merged
    }).collect()
}

pub fn build_neuron_init_groups(model: &ModelSpec) -> Vec<NeuronMergedGroup<'_>> {
    let grouped = group_by_digest(model.neuron_groups.iter().enumerate(), |_, ng| init_hash_digest(model, ng));

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::NeuronInit, index, members, digest);
        add_children(&mut merged, model, &INIT_CHILD_KINDS, init_children);
        add_init_fields(&mut merged, model);
        merged
    }).collect()
}

/// Groups whose spike queues are advanced and counts reset each time step
pub fn build_spike_queue_update_groups(model: &ModelSpec) -> Vec<NeuronMergedGroup<'_>> {
    let grouped = group_by_digest(model.neuron_groups.iter().enumerate(), |_, ng| ng.housekeeping_hash_digest());

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::NeuronSpikeQueueUpdate, index, members, digest);
        let archetype = merged.archetype();
        merged.add_array_field(ResolvedType::uint32(), "spkCnt", neuron_owner, "spkCnt");
        if archetype.is_delay_required() {
            merged.add_array_field(ResolvedType::uint32(), "spkQuePtr", neuron_owner, "spkQuePtr");
        }
        if archetype.spike_event_required {
            merged.add_array_field(ResolvedType::uint32(), "spkCntEvnt", neuron_owner, "spkCntEvnt");
        }
        merged
    }).collect()
}

/// Groups whose previous spike times are updated after each time step
pub fn build_prev_spike_time_update_groups(model: &ModelSpec) -> Vec<NeuronMergedGroup<'_>> {
    let groups = model.neuron_groups.iter().enumerate().filter(|(_, ng)| ng.prev_spike_time_required);
    let grouped = group_by_digest(groups, |_, ng| ng.housekeeping_hash_digest());
    let timepoint = model.type_context().timepoint;

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::NeuronPrevSpikeTimeUpdate, index, members, digest);
        let archetype = merged.archetype();
        merged.add_field(ResolvedType::uint32(), "numNeurons", |g, _| FieldValue::Scalar(g.num_neurons as f64), FieldKind::Standard);
        merged.add_array_field(ResolvedType::uint32(), "spkCnt", neuron_owner, "spkCnt");
        merged.add_array_field(ResolvedType::uint32(), "spk", neuron_owner, "spk");
        merged.add_array_field(timepoint.clone(), "prevST", neuron_owner, "prevST");
        if archetype.is_delay_required() {
            merged.add_array_field(ResolvedType::uint32(), "spkQuePtr", neuron_owner, "spkQuePtr");
        }
        merged
    }).collect()
}
