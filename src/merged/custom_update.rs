use std::collections::BTreeMap;
use crate::groups::{CustomUpdate, CustomUpdateWU, GroupKind, GroupRef, MatrixConnectivity, ModelSpec, ResolvedVarReference};
use crate::models::{CustomUpdateModel, VarInit};
use crate::types::{ResolvedType, TypeContext};
use super::{group_by_digest, var_type, FieldKind, FieldValue, MergedGroup, MergedKind};


pub type CustomUpdateMergedGroup<'a> = MergedGroup<'a, CustomUpdate>;
pub type CustomUpdateWUMergedGroup<'a> = MergedGroup<'a, CustomUpdateWU>;

fn custom_update_owner(g: &CustomUpdate, _: usize) -> GroupRef {
    GroupRef::new(GroupKind::CustomUpdate, &g.name)
}

fn custom_update_wu_owner(g: &CustomUpdateWU, _: usize) -> GroupRef {
    GroupRef::new(GroupKind::CustomUpdateWU, &g.name)
}

/// Shared by custom updates and their weight update counterparts
trait CustomUpdateBase {
    fn model(&self) -> &CustomUpdateModel;
    fn resolved_references(&self) -> &BTreeMap<String, ResolvedVarReference>;
    fn var_initialisers(&self) -> &BTreeMap<String, VarInit>;
    fn param_value(&self, name: &str) -> Option<f64>;
    fn is_param_dynamic(&self, name: &str) -> bool;
}

impl CustomUpdateBase for CustomUpdate {
    fn model(&self) -> &CustomUpdateModel { &self.model }
    fn resolved_references(&self) -> &BTreeMap<String, ResolvedVarReference> { &self.resolved_references }
    fn var_initialisers(&self) -> &BTreeMap<String, VarInit> { &self.var_initialisers }
    fn param_value(&self, name: &str) -> Option<f64> { self.get_param_value(name) }
    fn is_param_dynamic(&self, name: &str) -> bool { self.dynamic_params.contains(name) }
}

impl CustomUpdateBase for CustomUpdateWU {
    fn model(&self) -> &CustomUpdateModel { &self.model }
    fn resolved_references(&self) -> &BTreeMap<String, ResolvedVarReference> { &self.resolved_references }
    fn var_initialisers(&self) -> &BTreeMap<String, VarInit> { &self.var_initialisers }
    fn param_value(&self, name: &str) -> Option<f64> { self.get_param_value(name) }
    fn is_param_dynamic(&self, name: &str) -> bool { self.dynamic_params.contains(name) }
}

fn add_model_fields<'a, G: CustomUpdateBase>(
    merged: &mut MergedGroup<'a, G>,
    context: &TypeContext,
    owner: fn(&G, usize) -> GroupRef,
) {
    let archetype = merged.archetype();
    let model = archetype.model();

    for var in &model.vars {
        merged.add_array_field(var_type(var, context), &var.name, owner, &var.name);
    }

    for (name, resolved) in archetype.resolved_references() {
        let ref_name = name.clone();
        merged.add_field(
            var_type(&resolved.var, context).create_pointer(),
            name,
            move |g, _| {
                let resolved = &g.resolved_references()[&ref_name];
                FieldValue::array(resolved.target.clone(), &resolved.var.name)
            },
            FieldKind::Standard,
        );
    }

    let param_names: Vec<String> = model.snippet.params.iter().cloned()
        .chain(model.snippet.derived_params.iter().map(|d| d.name.clone()))
        .collect();
    merged.add_heterogeneous_params(
        &param_names, "", &context.scalar, owner,
        |g, _, name| g.param_value(name).unwrap_or_default(),
        |g, name| g.is_param_dynamic(name),
    );
    merged.add_egp_fields(&model.snippet.extra_global_params, "", context, owner);
}

fn add_init_var_fields<'a, G: CustomUpdateBase>(
    merged: &mut MergedGroup<'a, G>,
    context: &TypeContext,
    owner: fn(&G, usize) -> GroupRef,
) {
    let archetype = merged.archetype();
    for var in &archetype.model().vars {
        let Some(var_init) = archetype.var_initialisers().get(&var.name) else { continue };
        if !var_init.requires_kernel() {
            continue;
        }
        merged.add_array_field(var_type(var, context), &var.name, owner, &var.name);

        let names: Vec<String> = var_init.snippet.snippet.params.iter().cloned()
            .chain(var_init.snippet.snippet.derived_params.iter().map(|d| d.name.clone()))
            .collect();
        let var_name = var.name.clone();
        merged.add_heterogeneous_params(
            &names, &var.name, &context.scalar, owner,
            move |g, _, name| g.var_initialisers().get(&var_name).and_then(|v| v.get_value(name)).unwrap_or_default(),
            |_, _| false,
        );
    }
}

fn add_synapse_shape_fields<'a>(merged: &mut CustomUpdateWUMergedGroup<'a>, model: &'a ModelSpec) {
    let archetype = merged.archetype();
    let sg = &model.synapse_groups[archetype.synapse_group];
    let synapse_owner = move |g: &CustomUpdateWU, _: usize| {
        GroupRef::new(GroupKind::SynapseGroup, &model.synapse_groups[g.synapse_group].name)
    };

    merged.add_field(
        ResolvedType::uint32(), "numSrcNeurons",
        move |g, _| FieldValue::Scalar(model.synapse_groups[g.synapse_group].num_src_neurons as f64),
        FieldKind::Standard,
    );
    merged.add_field(
        ResolvedType::uint32(), "numTrgNeurons",
        move |g, _| FieldValue::Scalar(model.synapse_groups[g.synapse_group].num_trg_neurons as f64),
        FieldKind::Standard,
    );
    merged.add_field(
        ResolvedType::uint32(), "rowStride",
        move |g, _| FieldValue::Scalar(model.synapse_groups[g.synapse_group].row_stride() as f64),
        FieldKind::Standard,
    );
    for d in 0..sg.kernel_size.len() {
        merged.add_field(
            ResolvedType::uint32(),
            &format!("kernelSize{}", d),
            move |g, _| FieldValue::Scalar(
                model.synapse_groups[g.synapse_group].kernel_size.get(d).copied().unwrap_or_default() as f64
            ),
            FieldKind::Standard,
        );
    }
    if sg.matrix_type.connectivity == MatrixConnectivity::Sparse {
        merged.add_array_field(ResolvedType::uint32(), "rowLength", synapse_owner, "rowLength");
        merged.add_array_field(ResolvedType::uint32(), "ind", synapse_owner, "ind");
    }
}

/// Custom updates of one update group with identical code
pub fn build_custom_update_groups(model: &ModelSpec) -> Vec<CustomUpdateMergedGroup<'_>> {
    let grouped = group_by_digest(model.custom_updates.iter().enumerate(), |_, cu| cu.hash_digest());
    let context = model.type_context();

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::CustomUpdate, index, members, digest);
        merged.add_field(ResolvedType::uint32(), "size", |g, _| FieldValue::Scalar(g.size as f64), FieldKind::Standard);
        add_model_fields(&mut merged, &context, custom_update_owner);
        merged
    }).collect()
}

fn build_custom_wu_groups<'a>(model: &'a ModelSpec, kind: MergedKind, transpose: bool) -> Vec<CustomUpdateWUMergedGroup<'a>> {
    let groups = model.custom_wu_updates.iter().enumerate()
        .filter(|(_, cu)| cu.is_transpose_operation() == transpose);
    let grouped = group_by_digest(groups, |_, cu| {
        cu.hash_digest(&model.synapse_groups[cu.synapse_group].connectivity_init_hash_digest())
    });
    let context = model.type_context();

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(kind, index, members, digest);
        add_synapse_shape_fields(&mut merged, model);
        add_model_fields(&mut merged, &context, custom_update_wu_owner);

        if transpose {
            let archetype = merged.archetype();
            for (name, resolved) in &archetype.resolved_references {
                let Some((_, transpose_var)) = resolved.transpose.as_ref() else { continue };
                let ref_name = name.clone();
                merged.add_field(
                    var_type(transpose_var, &context).create_pointer(),
                    &format!("{}Transpose", name),
                    move |g, _| match g.resolved_references[&ref_name].transpose.as_ref() {
                        Some((target, var)) => FieldValue::array(target.clone(), &var.name),
                        None => FieldValue::Scalar(0.0),
                    },
                    FieldKind::Standard,
                );
            }
        }
        merged
    }).collect()
}

pub fn build_custom_wu_update_groups(model: &ModelSpec) -> Vec<CustomUpdateWUMergedGroup<'_>> {
    build_custom_wu_groups(model, MergedKind::CustomWUUpdate, false)
}

/// Weight update custom updates which write the transpose of a variable into another group
pub fn build_custom_transpose_update_groups(model: &ModelSpec) -> Vec<CustomUpdateWUMergedGroup<'_>> {
    build_custom_wu_groups(model, MergedKind::CustomTransposeUpdate, true)
}

pub fn build_custom_update_init_groups(model: &ModelSpec) -> Vec<CustomUpdateMergedGroup<'_>> {
    let groups = model.custom_updates.iter().enumerate()
        .filter(|(_, cu)| cu.var_initialisers.values().any(|v| v.requires_kernel()));
    let grouped = group_by_digest(groups, |_, cu| cu.init_hash_digest());
    let context = model.type_context();

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::CustomUpdateInit, index, members, digest);
        merged.add_field(ResolvedType::uint32(), "size", |g, _| FieldValue::Scalar(g.size as f64), FieldKind::Standard);
        add_init_var_fields(&mut merged, &context, custom_update_owner);
        merged
    }).collect()
}

pub fn build_custom_wu_update_init_groups(model: &ModelSpec) -> Vec<CustomUpdateWUMergedGroup<'_>> {
    let groups = model.custom_wu_updates.iter().enumerate()
        .filter(|(_, cu)| cu.var_initialisers.values().any(|v| v.requires_kernel()));
    let grouped = group_by_digest(groups, |_, cu| {
        cu.init_hash_digest(&model.synapse_groups[cu.synapse_group].connectivity_init_hash_digest())
    });
    let context = model.type_context();

    grouped.into_iter().enumerate().map(|(index, (digest, members))| {
        let mut merged = MergedGroup::new(MergedKind::CustomWUUpdateInit, index, members, digest);
        add_synapse_shape_fields(&mut merged, model);
        add_init_var_fields(&mut merged, &context, custom_update_wu_owner);
        merged
    }).collect()
}
