use std::collections::BTreeMap;
use sha2::{Sha256, Digest};
use tracing::{debug, info};
use crate::error::ConfigurationError;
use crate::groups::{CustomUpdate, CustomUpdateWU, GroupRef, ModelSpec, NeuronGroup, SynapseGroup};
use crate::utils::{finish_hash, HashDigest, UpdateHash};
use super::{FieldKind, FieldValue, MergedGroup, MergedKind};
use super::custom_update::{
    build_custom_transpose_update_groups, build_custom_update_groups, build_custom_update_init_groups,
    build_custom_wu_update_groups, build_custom_wu_update_init_groups,
};
use super::neuron::{
    build_neuron_init_groups, build_neuron_update_groups, build_prev_spike_time_update_groups,
    build_spike_queue_update_groups,
};
use super::synapse::{
    build_connectivity_init_groups, build_dendritic_delay_update_groups, build_postsynaptic_update_groups,
    build_presynaptic_update_groups, build_sparse_init_groups, build_synapse_dynamics_groups,
    build_synapse_init_groups,
};


/// Location of a dynamic field, the runtime pushes a new value here when the
/// parameter or extra global parameter it holds changes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DynamicFieldDestination {
    pub kind: MergedKind,
    pub merged_index: usize,
    pub field_name: String,
    pub member_index: usize,
}

impl DynamicFieldDestination {
    pub fn push_function_name(&self) -> String {
        format!("pushMerged{}Group{}{}ToDevice", self.kind.name(), self.merged_index, self.field_name)
    }
}

/// Every merged group of a finalised model
#[derive(Debug)]
pub struct ModelMerged<'a> {
    pub model: &'a ModelSpec,
    pub neuron_update_groups: Vec<MergedGroup<'a, NeuronGroup>>,
    pub presynaptic_update_groups: Vec<MergedGroup<'a, SynapseGroup>>,
    pub postsynaptic_update_groups: Vec<MergedGroup<'a, SynapseGroup>>,
    pub synapse_dynamics_groups: Vec<MergedGroup<'a, SynapseGroup>>,
    pub neuron_init_groups: Vec<MergedGroup<'a, NeuronGroup>>,
    pub synapse_init_groups: Vec<MergedGroup<'a, SynapseGroup>>,
    pub synapse_connectivity_init_groups: Vec<MergedGroup<'a, SynapseGroup>>,
    pub synapse_sparse_init_groups: Vec<MergedGroup<'a, SynapseGroup>>,
    pub custom_update_init_groups: Vec<MergedGroup<'a, CustomUpdate>>,
    pub custom_wu_update_init_groups: Vec<MergedGroup<'a, CustomUpdateWU>>,
    pub neuron_spike_queue_update_groups: Vec<MergedGroup<'a, NeuronGroup>>,
    pub neuron_prev_spike_time_update_groups: Vec<MergedGroup<'a, NeuronGroup>>,
    pub synapse_dendritic_delay_update_groups: Vec<MergedGroup<'a, SynapseGroup>>,
    pub custom_update_groups: Vec<MergedGroup<'a, CustomUpdate>>,
    pub custom_wu_update_groups: Vec<MergedGroup<'a, CustomUpdateWU>>,
    pub custom_transpose_update_groups: Vec<MergedGroup<'a, CustomUpdateWU>>,
    /// Destinations of each dynamic parameter and extra global parameter, keyed by owner and name
    pub dynamic_fields: BTreeMap<(GroupRef, String), Vec<DynamicFieldDestination>>,
}

fn index_dynamic_fields<G>(
    groups: &[MergedGroup<'_, G>],
    index: &mut BTreeMap<(GroupRef, String), Vec<DynamicFieldDestination>>,
) {
    for merged in groups {
        for field in merged.fields.iter().filter(|f| f.kind == FieldKind::Dynamic) {
            for member in 0..merged.groups.len() {
                let key = match merged.get_field_value(field, member) {
                    FieldValue::Array { owner, name } | FieldValue::DynamicParam { owner, name, .. } => (owner, name),
                    FieldValue::Scalar(_) => continue,
                };
                index.entry(key).or_default().push(DynamicFieldDestination {
                    kind: merged.kind,
                    merged_index: merged.index,
                    field_name: field.name.clone(),
                    member_index: member,
                });
            }
        }
    }
}

fn hash_merged<G>(groups: &[MergedGroup<'_, G>], hasher: &mut Sha256) {
    groups.len().update_hash(hasher);
    for merged in groups {
        merged.digest.update_hash(hasher);
        merged.groups.len().update_hash(hasher);
        merged.literal_params.update_hash(hasher);
    }
}

impl<'a> ModelMerged<'a> {
    /// Merges the groups of a finalised model for every kind of kernel
    pub fn new(model: &'a ModelSpec) -> Result<Self, ConfigurationError> {
        if !model.is_finalised() {
            return Err(ConfigurationError::NotFinalised(model.name.clone()));
        }

        let mut merged = ModelMerged {
            model,
            neuron_update_groups: build_neuron_update_groups(model),
            presynaptic_update_groups: build_presynaptic_update_groups(model),
            postsynaptic_update_groups: build_postsynaptic_update_groups(model),
            synapse_dynamics_groups: build_synapse_dynamics_groups(model),
            neuron_init_groups: build_neuron_init_groups(model),
            synapse_init_groups: build_synapse_init_groups(model),
            synapse_connectivity_init_groups: build_connectivity_init_groups(model),
            synapse_sparse_init_groups: build_sparse_init_groups(model),
            custom_update_init_groups: build_custom_update_init_groups(model),
            custom_wu_update_init_groups: build_custom_wu_update_init_groups(model),
            neuron_spike_queue_update_groups: build_spike_queue_update_groups(model),
            neuron_prev_spike_time_update_groups: build_prev_spike_time_update_groups(model),
            synapse_dendritic_delay_update_groups: build_dendritic_delay_update_groups(model),
            custom_update_groups: build_custom_update_groups(model),
            custom_wu_update_groups: build_custom_wu_update_groups(model),
            custom_transpose_update_groups: build_custom_transpose_update_groups(model),
            dynamic_fields: BTreeMap::new(),
        };

        let mut dynamic_fields = BTreeMap::new();
        index_dynamic_fields(&merged.neuron_update_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.presynaptic_update_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.postsynaptic_update_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.synapse_dynamics_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.neuron_init_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.synapse_init_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.synapse_connectivity_init_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.synapse_sparse_init_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.custom_update_init_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.custom_wu_update_init_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.custom_update_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.custom_wu_update_groups, &mut dynamic_fields);
        index_dynamic_fields(&merged.custom_transpose_update_groups, &mut dynamic_fields);
        merged.dynamic_fields = dynamic_fields;

        debug!(
            "Merged {} neuron groups into {} neuron update groups",
            model.neuron_groups.len(), merged.neuron_update_groups.len(),
        );
        debug!(
            "Merged {} synapse groups into {} presynaptic, {} postsynaptic and {} synapse dynamics groups",
            model.synapse_groups.len(),
            merged.presynaptic_update_groups.len(),
            merged.postsynaptic_update_groups.len(),
            merged.synapse_dynamics_groups.len(),
        );
        debug!(
            "Merged {} custom updates and {} custom weight update updates",
            merged.custom_update_groups.len(),
            merged.custom_wu_update_groups.len() + merged.custom_transpose_update_groups.len(),
        );
        info!("Model '{}' merged, digest {}", model.name, crate::utils::digest_to_hex(&merged.hash_digest()));

        Ok(merged)
    }

    /// Digest of the whole model, changes whenever generated code would
    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        hash_merged(&self.neuron_update_groups, &mut hasher);
        hash_merged(&self.presynaptic_update_groups, &mut hasher);
        hash_merged(&self.postsynaptic_update_groups, &mut hasher);
        hash_merged(&self.synapse_dynamics_groups, &mut hasher);
        hash_merged(&self.neuron_init_groups, &mut hasher);
        hash_merged(&self.synapse_init_groups, &mut hasher);
        hash_merged(&self.synapse_connectivity_init_groups, &mut hasher);
        hash_merged(&self.synapse_sparse_init_groups, &mut hasher);
        hash_merged(&self.custom_update_init_groups, &mut hasher);
        hash_merged(&self.custom_wu_update_init_groups, &mut hasher);
        hash_merged(&self.neuron_spike_queue_update_groups, &mut hasher);
        hash_merged(&self.neuron_prev_spike_time_update_groups, &mut hasher);
        hash_merged(&self.synapse_dendritic_delay_update_groups, &mut hasher);
        hash_merged(&self.custom_update_groups, &mut hasher);
        hash_merged(&self.custom_wu_update_groups, &mut hasher);
        hash_merged(&self.custom_transpose_update_groups, &mut hasher);

        self.model.precision.update_hash(&mut hasher);
        self.model.time_precision.update_hash(&mut hasher);
        self.model.batch_size.update_hash(&mut hasher);
        self.model.dt.update_hash(&mut hasher);

        finish_hash(hasher)
    }

    /// Where a dynamic parameter or extra global parameter of a group was merged
    pub fn get_dynamic_field_destinations(&self, owner: &GroupRef, name: &str) -> &[DynamicFieldDestination] {
        self.dynamic_fields.get(&(owner.clone(), name.to_string())).map_or(&[], |d| d.as_slice())
    }

    /// Names of the custom update groups, one `update<Group>` function is generated per name
    pub fn custom_update_group_names(&self) -> Vec<String> {
        self.model.custom_update_group_names().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use crate::groups::{GroupKind, GroupRef, ModelSpec};
    use crate::models::{neuron_models, param_values, VarInit};
    use super::ModelMerged;

    fn lif_params(c: f64) -> crate::models::ParamValues {
        param_values(&[
            ("C", c), ("TauM", 20.0), ("Vrest", -70.0), ("Vreset", -70.0),
            ("Vthresh", -51.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ])
    }

    fn lif_vars() -> BTreeMap<String, VarInit> {
        BTreeMap::from([
            ("V".to_string(), VarInit::constant(-70.0)),
            ("RefracTime".to_string(), VarInit::constant(0.0)),
        ])
    }

    #[test]
    fn test_unfinalised_model_is_rejected() {
        let model = ModelSpec::new("test");
        assert!(ModelMerged::new(&model).is_err());
    }

    #[test]
    fn test_dynamic_param_destinations() {
        let mut model = ModelSpec::new("test");
        model.add_neuron_population("A", 10, neuron_models::lif(), lif_params(1.0), lif_vars()).unwrap()
            .set_param_dynamic("C", true).unwrap();
        model.add_neuron_population("B", 20, neuron_models::lif(), lif_params(1.0), lif_vars()).unwrap()
            .set_param_dynamic("C", true).unwrap();
        model.finalise().unwrap();

        let merged = ModelMerged::new(&model).unwrap();
        assert_eq!(merged.neuron_update_groups.len(), 1);

        let destinations = merged.get_dynamic_field_destinations(&GroupRef::new(GroupKind::NeuronGroup, "B"), "C");
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].field_name, "C");
        assert_eq!(destinations[0].member_index, 1);
    }

    #[test]
    fn test_digest_changes_with_dt() {
        let build = |dt: f64| {
            let mut model = ModelSpec::new("test");
            model.set_dt(dt).unwrap();
            model.add_neuron_population("A", 10, neuron_models::lif(), lif_params(1.0), lif_vars()).unwrap();
            model.finalise().unwrap();
            model
        };
        let first = build(0.1);
        let second = build(0.1);
        let third = build(0.5);

        let digest = |m: &ModelSpec| ModelMerged::new(m).unwrap().hash_digest();
        assert_eq!(digest(&first), digest(&second));
        assert_ne!(digest(&first), digest(&third));
    }
}
