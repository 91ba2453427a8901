use sha2::{Sha256, Digest};
use crate::groups::{GroupKind, GroupRef, MatrixConnectivity, MatrixWeight, ModelSpec, SynapseGroup};
use crate::models::{Var, VarInit};
use crate::types::ResolvedType;
use crate::utils::{finish_hash, HashDigest, UpdateHash};
use super::{group_by_digest, var_type, FieldKind, FieldValue, MergedGroup, MergedKind};


pub type SynapseMergedGroup<'a> = MergedGroup<'a, SynapseGroup>;

fn synapse_owner(g: &SynapseGroup, _: usize) -> GroupRef {
    GroupRef::new(GroupKind::SynapseGroup, &g.name)
}

/// Neuron variables of the source and target population referenced by weight update code
pub fn referenced_neuron_vars<'m>(model: &'m ModelSpec, sg: &SynapseGroup) -> (Vec<&'m Var>, Vec<&'m Var>) {
    let src = &model.neuron_groups[sg.src];
    let trg = &model.neuron_groups[sg.trg];
    let pre = src.model.vars.iter().filter(|v| sg.wu_references(&format!("{}_pre", v.name))).collect();
    let post = trg.model.vars.iter().filter(|v| sg.wu_references(&format!("{}_post", v.name))).collect();

    (pre, post)
}

/// Digest of the weight update code along with the shape of the populations it touches
pub fn update_hash_digest(model: &ModelSpec, sg: &SynapseGroup) -> HashDigest {
    let mut hasher = Sha256::new();
    sg.wu_hash_digest().update_hash(&mut hasher);

    let (pre_vars, post_vars) = referenced_neuron_vars(model, sg);
    pre_vars.update_hash(&mut hasher);
    post_vars.update_hash(&mut hasher);

    let src = &model.neuron_groups[sg.src];
    let trg = &model.neuron_groups[sg.trg];
    src.num_delay_slots.update_hash(&mut hasher);
    trg.num_delay_slots.update_hash(&mut hasher);
    sg.axonal_delay_steps.update_hash(&mut hasher);
    sg.back_prop_delay_steps.update_hash(&mut hasher);
    sg.max_dendritic_delay_timesteps.update_hash(&mut hasher);
    src.spike_time_required.update_hash(&mut hasher);
    trg.spike_time_required.update_hash(&mut hasher);
    src.prev_spike_time_required.update_hash(&mut hasher);
    trg.prev_spike_time_required.update_hash(&mut hasher);

    finish_hash(hasher)
}

fn param_names(snippet: &crate::models::SnippetBase) -> Vec<String> {
    snippet.params.iter().cloned()
        .chain(snippet.derived_params.iter().map(|d| d.name.clone()))
        .collect()
}

fn add_size_fields(merged: &mut SynapseMergedGroup<'_>) {
    let archetype = merged.archetype();

    merged.add_field(ResolvedType::uint32(), "numSrcNeurons", |g, _| FieldValue::Scalar(g.num_src_neurons as f64), FieldKind::Standard);
    merged.add_field(ResolvedType::uint32(), "numTrgNeurons", |g, _| FieldValue::Scalar(g.num_trg_neurons as f64), FieldKind::Standard);
    merged.add_field(ResolvedType::uint32(), "rowStride", |g, _| FieldValue::Scalar(g.row_stride() as f64), FieldKind::Standard);
    if archetype.is_col_structure_required() {
        merged.add_field(ResolvedType::uint32(), "colStride", |g, _| FieldValue::Scalar(g.col_stride() as f64), FieldKind::Standard);
    }
    for d in 0..archetype.kernel_size.len() {
        merged.add_field(
            ResolvedType::uint32(),
            &format!("kernelSize{}", d),
            move |g, _| FieldValue::Scalar(g.kernel_size.get(d).copied().unwrap_or_default() as f64),
            FieldKind::Standard,
        );
    }
}

fn add_connectivity_fields(merged: &mut SynapseMergedGroup<'_>, col_structure: bool) {
    let archetype = merged.archetype();
    match archetype.matrix_type.connectivity {
        MatrixConnectivity::Sparse => {
            merged.add_array_field(ResolvedType::uint32(), "rowLength", synapse_owner, "rowLength");
            merged.add_array_field(ResolvedType::uint32(), "ind", synapse_owner, "ind");
            if col_structure && archetype.is_col_structure_required() {
                merged.add_array_field(ResolvedType::uint32(), "colLength", synapse_owner, "colLength");
                merged.add_array_field(ResolvedType::uint32(), "remap", synapse_owner, "remap");
            }
        },
        MatrixConnectivity::Bitmask => {
            merged.add_array_field(ResolvedType::uint32(), "gp", synapse_owner, "gp");
        },
        _ => {},
    }
}

/// Parameters of a variable initialiser, suffixed with the variable name
fn add_var_init_params<'a>(
    merged: &mut SynapseMergedGroup<'a>,
    scalar: &ResolvedType,
    var_name: &str,
    var_init: &VarInit,
    initialisers: fn(&SynapseGroup) -> &std::collections::BTreeMap<String, VarInit>,
) {
    let name = var_name.to_string();
    merged.add_heterogeneous_params(
        &param_names(&var_init.snippet.snippet),
        var_name,
        scalar,
        synapse_owner,
        move |g, _, param| initialisers(g).get(&name).and_then(|v| v.get_value(param)).unwrap_or_default(),
        |_, _| false,
    );
}

fn wu_initialisers(g: &SynapseGroup) -> &std::collections::BTreeMap<String, VarInit> {
    &g.wu_var_initialisers
}

/// Fields used by code which runs per synapse with access to both populations
fn add_update_fields<'a>(merged: &mut SynapseMergedGroup<'a>, model: &'a ModelSpec) {
    let archetype = merged.archetype();
    let context = model.type_context();
    let scalar = context.scalar.clone();
    let src = &model.neuron_groups[archetype.src];
    let trg = &model.neuron_groups[archetype.trg];
    let src_owner = move |g: &SynapseGroup, _: usize| GroupRef::new(GroupKind::NeuronGroup, &model.neuron_groups[g.src].name);
    let trg_owner = move |g: &SynapseGroup, _: usize| GroupRef::new(GroupKind::NeuronGroup, &model.neuron_groups[g.trg].name);

    add_size_fields(merged);

    merged.add_array_field(ResolvedType::uint32(), "srcSpkCnt", src_owner, "spkCnt");
    merged.add_array_field(ResolvedType::uint32(), "srcSpk", src_owner, "spk");
    if src.is_delay_required() {
        merged.add_array_field(ResolvedType::uint32(), "srcSpkQuePtr", src_owner, "spkQuePtr");
    }
    if archetype.is_spike_event_required() {
        merged.add_array_field(ResolvedType::uint32(), "srcSpkCntEvnt", src_owner, "spkCntEvnt");
        merged.add_array_field(ResolvedType::uint32(), "srcSpkEvnt", src_owner, "spkEvnt");
    }
    if archetype.is_postsynaptic_learning_required() {
        merged.add_array_field(ResolvedType::uint32(), "trgSpkCnt", trg_owner, "spkCnt");
        merged.add_array_field(ResolvedType::uint32(), "trgSpk", trg_owner, "spk");
    }
    if trg.is_delay_required() {
        merged.add_array_field(ResolvedType::uint32(), "trgSpkQuePtr", trg_owner, "spkQuePtr");
    }

    if src.spike_time_required && archetype.wu_references("st_pre") {
        merged.add_array_field(context.timepoint.clone(), "sTPre", src_owner, "sT");
    }
    if src.prev_spike_time_required && archetype.wu_references("prev_st_pre") {
        merged.add_array_field(context.timepoint.clone(), "prevSTPre", src_owner, "prevST");
    }
    if trg.spike_time_required && archetype.wu_references("st_post") {
        merged.add_array_field(context.timepoint.clone(), "sTPost", trg_owner, "sT");
    }
    if trg.prev_spike_time_required && archetype.wu_references("prev_st_post") {
        merged.add_array_field(context.timepoint.clone(), "prevSTPost", trg_owner, "prevST");
    }

    let (pre_vars, post_vars) = referenced_neuron_vars(model, archetype);
    for var in pre_vars {
        merged.add_array_field(var_type(var, &context), &format!("{}Pre", var.name), src_owner, &var.name);
    }
    for var in post_vars {
        merged.add_array_field(var_type(var, &context), &format!("{}Post", var.name), trg_owner, &var.name);
    }

    merged.add_array_field(scalar.clone(), "outPost", synapse_owner, "outPost");
    if archetype.is_dendritic_delay_required() {
        merged.add_array_field(scalar.clone(), "denDelay", synapse_owner, "denDelay");
        merged.add_array_field(ResolvedType::uint32(), "denDelayPtr", synapse_owner, "denDelayPtr");
        merged.add_field(
            ResolvedType::uint32(), "maxDendriticDelayTimesteps",
            |g, _| FieldValue::Scalar(g.max_dendritic_delay_timesteps as f64),
            FieldKind::Standard,
        );
    }
    if archetype.is_pre_output_required() {
        merged.add_array_field(scalar.clone(), "outPre", synapse_owner, "outPre");
    }

    let col_structure = merged.kind == MergedKind::PostsynapticUpdate;
    add_connectivity_fields(merged, col_structure);

    if matches!(archetype.matrix_type.weight, MatrixWeight::Individual | MatrixWeight::Kernel) {
        for var in &archetype.wu_model.vars {
            merged.add_array_field(var_type(var, &context), &var.name, synapse_owner, &var.name);
        }
    } else if archetype.matrix_type.weight == MatrixWeight::Procedural {
        for var in &archetype.wu_model.vars {
            if let Some(var_init) = archetype.wu_var_initialisers.get(&var.name) {
                add_var_init_params(merged, &scalar, &var.name, var_init, wu_initialisers);
            }
        }
    }

    merged.add_heterogeneous_params(
        &param_names(&archetype.wu_model.snippet), "", &scalar, synapse_owner,
        |g, _, name| g.get_wu_param_value(name).unwrap_or_default(),
        |g, name| g.wu_dynamic_params.contains(name),
    );
    merged.add_egp_fields(&archetype.wu_model.snippet.extra_global_params, "", &context, synapse_owner);

    if archetype.matrix_type.connectivity == MatrixConnectivity::Procedural {
        if let Some(init) = archetype.connectivity_initialiser.as_ref() {
            merged.add_heterogeneous_params(
                &param_names(&init.snippet.snippet), "Conn", &scalar, synapse_owner,
                |g, _, name| g.connectivity_initialiser.as_ref().and_then(|c| c.get_value(name)).unwrap_or_default(),
                |_, _| false,
            );
            merged.add_egp_fields(&init.snippet.snippet.extra_global_params, "Conn", &context, synapse_owner);
        }
    }
    if let Some(init) = archetype.toeplitz_initialiser.as_ref() {
        merged.add_heterogeneous_params(
            &param_names(&init.snippet.snippet), "Toeplitz", &scalar, synapse_owner,
            |g, _, name| g.toeplitz_initialiser.as_ref().and_then(|c| c.get_value(name)).unwrap_or_default(),
            |_, _| false,
        );
    }
}

fn build_update_groups<'a>(
    model: &'a ModelSpec,
    kind: MergedKind,
    filter: fn(&SynapseGroup) -> bool,
) -> Vec<SynapseMergedGroup<'a>> {
    let groups = model.synapse_groups.iter().enumerate().filter(|(_, sg)| filter(sg));
    let grouped = group_by_digest(groups, |_, sg| update_hash_digest(model, sg));

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(kind, index, members, digest);
        add_update_fields(&mut merged, model);
        merged
    }).collect()
}

pub fn build_presynaptic_update_groups(model: &ModelSpec) -> Vec<SynapseMergedGroup<'_>> {
    build_update_groups(model, MergedKind::PresynapticUpdate, |sg| sg.is_true_spike_required() || sg.is_spike_event_required())
}

pub fn build_postsynaptic_update_groups(model: &ModelSpec) -> Vec<SynapseMergedGroup<'_>> {
    build_update_groups(model, MergedKind::PostsynapticUpdate, |sg| sg.is_postsynaptic_learning_required())
}

pub fn build_synapse_dynamics_groups(model: &ModelSpec) -> Vec<SynapseMergedGroup<'_>> {
    build_update_groups(model, MergedKind::SynapseDynamics, |sg| sg.is_synapse_dynamics_required())
}

fn any_var_requires_kernel(sg: &SynapseGroup) -> bool {
    sg.wu_var_initialisers.values().any(|v| v.requires_kernel())
}

/// Dense and kernel weights initialised by a kernel over rows of the matrix
pub fn build_synapse_init_groups(model: &ModelSpec) -> Vec<SynapseMergedGroup<'_>> {
    let groups = model.synapse_groups.iter().enumerate().filter(|(_, sg)| {
        let dense_individual = sg.matrix_type.connectivity == MatrixConnectivity::Dense && sg.has_individual_weights();
        (dense_individual || sg.has_kernel_weights()) && any_var_requires_kernel(sg)
    });
    let grouped = group_by_digest(groups, |_, sg| sg.init_hash_digest());
    let context = model.type_context();

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::SynapseInit, index, members, digest);
        let archetype = merged.archetype();
        add_size_fields(&mut merged);
        for var in &archetype.wu_model.vars {
            if let Some(var_init) = archetype.wu_var_initialisers.get(&var.name).filter(|v| v.requires_kernel()) {
                merged.add_array_field(var_type(var, &context), &var.name, synapse_owner, &var.name);
                add_var_init_params(&mut merged, &context.scalar, &var.name, var_init, wu_initialisers);
            }
        }
        merged
    }).collect()
}

/// Groups whose connectivity is built on the device from row or column building code
pub fn build_connectivity_init_groups(model: &ModelSpec) -> Vec<SynapseMergedGroup<'_>> {
    let groups = model.synapse_groups.iter().enumerate().filter(|(_, sg)| {
        matches!(sg.matrix_type.connectivity, MatrixConnectivity::Sparse | MatrixConnectivity::Bitmask)
            && sg.connectivity_initialiser.as_ref().map_or(false, |c| {
                !c.snippet.row_build_code.is_empty() || !c.snippet.col_build_code.is_empty()
            })
    });
    let grouped = group_by_digest(groups, |_, sg| sg.connectivity_init_hash_digest());
    let context = model.type_context();

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::SynapseConnectivityInit, index, members, digest);
        let archetype = merged.archetype();
        add_size_fields(&mut merged);
        add_connectivity_fields(&mut merged, false);
        if let Some(init) = archetype.connectivity_initialiser.as_ref() {
            merged.add_heterogeneous_params(
                &param_names(&init.snippet.snippet), "", &context.scalar, synapse_owner,
                |g, _, name| g.connectivity_initialiser.as_ref().and_then(|c| c.get_value(name)).unwrap_or_default(),
                |_, _| false,
            );
            merged.add_egp_fields(&init.snippet.snippet.extra_global_params, "", &context, synapse_owner);
        }
        merged
    }).collect()
}

/// Sparse groups whose variables or column structure are initialised once connectivity exists
pub fn build_sparse_init_groups(model: &ModelSpec) -> Vec<SynapseMergedGroup<'_>> {
    let groups = model.synapse_groups.iter().enumerate().filter(|(_, sg)| {
        sg.is_sparse() && ((sg.has_individual_weights() && any_var_requires_kernel(sg)) || sg.is_col_structure_required())
    });
    let grouped = group_by_digest(groups, |_, sg| {
        let mut hasher = Sha256::new();
        sg.init_hash_digest().update_hash(&mut hasher);
        sg.connectivity_init_hash_digest().update_hash(&mut hasher);
        finish_hash(hasher)
    });
    let context = model.type_context();

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::SynapseSparseInit, index, members, digest);
        let archetype = merged.archetype();
        add_size_fields(&mut merged);
        add_connectivity_fields(&mut merged, true);
        for var in &archetype.wu_model.vars {
            if let Some(var_init) = archetype.wu_var_initialisers.get(&var.name).filter(|v| v.requires_kernel()) {
                merged.add_array_field(var_type(var, &context), &var.name, synapse_owner, &var.name);
                add_var_init_params(&mut merged, &context.scalar, &var.name, var_init, wu_initialisers);
            }
        }
        merged
    }).collect()
}

/// Groups whose dendritic delay ring buffer pointer is advanced each time step
pub fn build_dendritic_delay_update_groups(model: &ModelSpec) -> Vec<SynapseMergedGroup<'_>> {
    let groups = model.synapse_groups.iter().enumerate().filter(|(_, sg)| sg.is_dendritic_delay_required());
    let grouped = group_by_digest(groups, |_, sg| sg.dendritic_delay_hash_digest());

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::SynapseDendriticDelayUpdate, index, members, digest);
        merged.add_array_field(ResolvedType::uint32(), "denDelayPtr", synapse_owner, "denDelayPtr");
        merged.add_field(
            ResolvedType::uint32(), "maxDendriticDelayTimesteps",
            |g, _| FieldValue::Scalar(g.max_dendritic_delay_timesteps as f64),
            FieldKind::Standard,
        );
        merged
    }).collect()
}
