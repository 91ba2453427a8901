use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};
use crate::error::{ConfigurationError, SpikeCodegenError};
use crate::models::{CurrentSourceModel, CustomUpdateModel, NeuronModel, ParamValues, VarInit};
use crate::types::{ResolvedType, TypeContext};
use crate::utils::validate_pop_name;
use super::{
    ConnectivityInit, CurrentSource, CustomUpdate, CustomUpdateWU, GroupKind, GroupRef,
    MatrixConnectivity, MatrixType, MatrixWeight, NeuronGroup, PostsynapticInit, SynapseGroup,
    VarReference, WUVarReference, WeightUpdateInit,
};
use super::custom_update::ResolvedVarReference;
use super::resolve_var_type;


/// Declarative description of a network, owns every group
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub precision: ResolvedType,
    pub time_precision: Option<ResolvedType>,
    /// Simulation time step in ms
    pub dt: f64,
    pub batch_size: usize,
    pub seed: u64,
    pub neuron_groups: Vec<NeuronGroup>,
    pub synapse_groups: Vec<SynapseGroup>,
    pub current_sources: Vec<CurrentSource>,
    pub custom_updates: Vec<CustomUpdate>,
    pub custom_wu_updates: Vec<CustomUpdateWU>,
    finalised: bool,
}

fn validate_var_initialisers(var_initialisers: &BTreeMap<String, VarInit>, description: &str) -> Result<(), ConfigurationError> {
    for (name, var_init) in var_initialisers {
        var_init.validate(&format!("{} variable '{}' initialiser", description, name))?;
    }

    Ok(())
}

impl ModelSpec {
    pub fn new(name: &str) -> Self {
        ModelSpec {
            name: name.to_string(),
            precision: ResolvedType::float(),
            time_precision: None,
            dt: 0.1,
            batch_size: 1,
            seed: 0,
            neuron_groups: vec![],
            synapse_groups: vec![],
            current_sources: vec![],
            custom_updates: vec![],
            custom_wu_updates: vec![],
            finalised: false,
        }
    }

    fn check_not_finalised(&self) -> Result<(), ConfigurationError> {
        if self.finalised {
            Err(ConfigurationError::AlreadyFinalised(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn check_floating_point(ty: &ResolvedType) -> Result<(), ConfigurationError> {
        match ty.get_numeric() {
            Some(numeric) if !numeric.is_integral => Ok(()),
            _ => Err(ConfigurationError::Unsupported(format!(
                "Model precision must be a floating point type not '{}'", ty.get_name()
            ))),
        }
    }

    pub fn set_precision(&mut self, precision: ResolvedType) -> Result<(), ConfigurationError> {
        self.check_not_finalised()?;
        Self::check_floating_point(&precision)?;
        self.precision = precision;

        Ok(())
    }

    pub fn set_time_precision(&mut self, precision: ResolvedType) -> Result<(), ConfigurationError> {
        self.check_not_finalised()?;
        Self::check_floating_point(&precision)?;
        self.time_precision = Some(precision);

        Ok(())
    }

    pub fn set_dt(&mut self, dt: f64) -> Result<(), ConfigurationError> {
        self.check_not_finalised()?;
        self.dt = dt;

        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigurationError> {
        self.check_not_finalised()?;
        self.batch_size = batch_size.max(1);

        Ok(())
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Types `scalar` and `timepoint` resolve to
    pub fn type_context(&self) -> TypeContext {
        TypeContext {
            scalar: self.precision.clone(),
            timepoint: self.time_precision.clone().unwrap_or_else(|| self.precision.clone()),
        }
    }

    pub fn is_finalised(&self) -> bool {
        self.finalised
    }

    pub fn find_neuron_group(&self, name: &str) -> Option<usize> {
        self.neuron_groups.iter().position(|n| n.name == name)
    }

    pub fn find_synapse_group(&self, name: &str) -> Option<usize> {
        self.synapse_groups.iter().position(|s| s.name == name)
    }

    pub fn find_current_source(&self, name: &str) -> Option<usize> {
        self.current_sources.iter().position(|c| c.name == name)
    }

    pub fn find_custom_update(&self, name: &str) -> Option<usize> {
        self.custom_updates.iter().position(|c| c.name == name)
    }

    pub fn find_custom_wu_update(&self, name: &str) -> Option<usize> {
        self.custom_wu_updates.iter().position(|c| c.name == name)
    }

    pub fn get_neuron_group(&self, name: &str) -> Option<&NeuronGroup> {
        self.neuron_groups.iter().find(|n| n.name == name)
    }

    pub fn get_synapse_group(&self, name: &str) -> Option<&SynapseGroup> {
        self.synapse_groups.iter().find(|s| s.name == name)
    }

    fn unknown(kind: GroupKind, name: &str) -> ConfigurationError {
        ConfigurationError::UnknownGroup { kind: kind.description(), name: name.to_string() }
    }

    pub fn neuron_group_mut(&mut self, name: &str) -> Result<&mut NeuronGroup, ConfigurationError> {
        self.check_not_finalised()?;
        self.neuron_groups.iter_mut().find(|n| n.name == name)
            .ok_or_else(|| Self::unknown(GroupKind::NeuronGroup, name))
    }

    pub fn synapse_group_mut(&mut self, name: &str) -> Result<&mut SynapseGroup, ConfigurationError> {
        self.check_not_finalised()?;
        self.synapse_groups.iter_mut().find(|s| s.name == name)
            .ok_or_else(|| Self::unknown(GroupKind::SynapseGroup, name))
    }

    pub fn current_source_mut(&mut self, name: &str) -> Result<&mut CurrentSource, ConfigurationError> {
        self.check_not_finalised()?;
        self.current_sources.iter_mut().find(|c| c.name == name)
            .ok_or_else(|| Self::unknown(GroupKind::CurrentSource, name))
    }

    pub fn custom_update_mut(&mut self, name: &str) -> Result<&mut CustomUpdate, ConfigurationError> {
        self.check_not_finalised()?;
        self.custom_updates.iter_mut().find(|c| c.name == name)
            .ok_or_else(|| Self::unknown(GroupKind::CustomUpdate, name))
    }

    pub fn custom_wu_update_mut(&mut self, name: &str) -> Result<&mut CustomUpdateWU, ConfigurationError> {
        self.check_not_finalised()?;
        self.custom_wu_updates.iter_mut().find(|c| c.name == name)
            .ok_or_else(|| Self::unknown(GroupKind::CustomUpdateWU, name))
    }

    /// Names of every custom update group, each gets its own entry point
    pub fn custom_update_group_names(&self) -> BTreeSet<String> {
        self.custom_updates.iter().map(|c| c.update_group_name.clone())
            .chain(self.custom_wu_updates.iter().map(|c| c.update_group_name.clone()))
            .collect()
    }

    pub fn add_neuron_population(
        &mut self,
        name: &str,
        num_neurons: usize,
        model: Arc<NeuronModel>,
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
    ) -> Result<&mut NeuronGroup, ConfigurationError> {
        self.check_not_finalised()?;
        let description = format!("Neuron group '{}'", name);
        validate_pop_name(name, "Neuron group")?;
        if self.find_neuron_group(name).is_some() {
            return Err(ConfigurationError::DuplicateGroupName { kind: "neuron population", name: name.to_string() });
        }
        model.validate(&params, &var_initialisers, &description)?;
        validate_var_initialisers(&var_initialisers, &description)?;

        let index = self.neuron_groups.len();
        self.neuron_groups.push(NeuronGroup::new(name, num_neurons, model, params, var_initialisers));

        Ok(&mut self.neuron_groups[index])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_synapse_population(
        &mut self,
        name: &str,
        matrix_type: MatrixType,
        src: &str,
        trg: &str,
        wu: WeightUpdateInit,
        ps: PostsynapticInit,
        connectivity: ConnectivityInit,
    ) -> Result<&mut SynapseGroup, ConfigurationError> {
        self.check_not_finalised()?;
        let description = format!("Synapse group '{}'", name);
        validate_pop_name(name, "Synapse group")?;
        if self.find_synapse_group(name).is_some() {
            return Err(ConfigurationError::DuplicateGroupName { kind: "synapse population", name: name.to_string() });
        }

        let src_index = self.find_neuron_group(src).ok_or_else(|| Self::unknown(GroupKind::NeuronGroup, src))?;
        let trg_index = self.find_neuron_group(trg).ok_or_else(|| Self::unknown(GroupKind::NeuronGroup, trg))?;

        wu.model.validate(&wu.params, &wu.var_initialisers, &format!("{} weight update model", description))?;
        ps.model.validate(&ps.params, &ps.var_initialisers, &format!("{} postsynaptic model", description))?;
        validate_var_initialisers(&wu.var_initialisers, &description)?;
        validate_var_initialisers(&ps.var_initialisers, &description)?;

        match (&connectivity, matrix_type.connectivity) {
            (ConnectivityInit::Sparse(init), MatrixConnectivity::Sparse | MatrixConnectivity::Bitmask | MatrixConnectivity::Procedural) => {
                init.validate(&format!("{} connectivity initialiser", description))?;
            },
            (ConnectivityInit::Toeplitz(init), MatrixConnectivity::Toeplitz) => {
                init.validate(&format!("{} Toeplitz initialiser", description))?;
            },
            (ConnectivityInit::Uninitialised, MatrixConnectivity::Dense | MatrixConnectivity::Sparse | MatrixConnectivity::Bitmask) => {},
            _ => {
                return Err(ConfigurationError::Unsupported(format!(
                    "{} connectivity initialiser does not match its {:?} connectivity",
                    description, matrix_type.connectivity
                )));
            },
        }

        if matrix_type.weight == MatrixWeight::Global && !wu.var_initialisers.values().all(|v| v.is_constant()) {
            return Err(ConfigurationError::Unsupported(
                "GLOBALG variables can only be initialised with constant values".to_string()
            ));
        }
        if matrix_type.weight == MatrixWeight::Individual && matches!(
            matrix_type.connectivity, MatrixConnectivity::Bitmask | MatrixConnectivity::Toeplitz | MatrixConnectivity::Procedural
        ) {
            return Err(ConfigurationError::Unsupported(format!(
                "{} connectivity cannot be combined with individual weights", description
            )));
        }

        let src_group = &self.neuron_groups[src_index];
        let trg_group = &self.neuron_groups[trg_index];
        let synapse_group = SynapseGroup::new(
            name,
            matrix_type,
            (src, src_index, src_group.num_neurons),
            (trg, trg_index, trg_group.num_neurons),
            wu,
            ps,
            connectivity,
        );

        let index = self.synapse_groups.len();
        self.synapse_groups.push(synapse_group);

        Ok(&mut self.synapse_groups[index])
    }

    pub fn add_current_source(
        &mut self,
        name: &str,
        model: Arc<CurrentSourceModel>,
        target: &str,
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
    ) -> Result<&mut CurrentSource, ConfigurationError> {
        self.check_not_finalised()?;
        let description = format!("Current source '{}'", name);
        validate_pop_name(name, "Current source")?;
        if self.find_current_source(name).is_some() {
            return Err(ConfigurationError::DuplicateGroupName { kind: "current source", name: name.to_string() });
        }
        let target_index = self.find_neuron_group(target)
            .ok_or_else(|| Self::unknown(GroupKind::NeuronGroup, target))?;
        model.validate(&params, &var_initialisers, &description)?;
        validate_var_initialisers(&var_initialisers, &description)?;

        let num_neurons = self.neuron_groups[target_index].num_neurons;
        let index = self.current_sources.len();
        self.current_sources.push(CurrentSource::new(
            name, model, (target, target_index, num_neurons), params, var_initialisers,
        ));

        Ok(&mut self.current_sources[index])
    }

    fn resolve_var_reference(&self, reference: &VarReference) -> Result<ResolvedVarReference, ConfigurationError> {
        let (kind, group, var_name) = match reference {
            VarReference::Neuron { group, var } => (GroupKind::NeuronGroup, group, var),
            VarReference::CurrentSource { group, var } => (GroupKind::CurrentSource, group, var),
            VarReference::CustomUpdate { group, var } => (GroupKind::CustomUpdate, group, var),
        };

        let (vars, size, description) = match kind {
            GroupKind::NeuronGroup => {
                let target = self.get_neuron_group(group).ok_or_else(|| Self::unknown(kind, group))?;
                (&target.model.vars, target.num_neurons, target.description())
            },
            GroupKind::CurrentSource => {
                let target = self.current_sources.iter().find(|c| &c.name == group)
                    .ok_or_else(|| Self::unknown(kind, group))?;
                (&target.model.vars, target.num_neurons, target.description())
            },
            _ => {
                let target = self.custom_updates.iter().find(|c| &c.name == group)
                    .ok_or_else(|| Self::unknown(kind, group))?;
                (&target.model.vars, target.size, target.description())
            },
        };

        let var = vars.iter().find(|v| &v.name == var_name)
            .ok_or_else(|| ConfigurationError::UnknownTarget {
                description,
                kind: "variable",
                name: var_name.clone(),
            })?;

        Ok(ResolvedVarReference { target: GroupRef::new(kind, group), var: var.clone(), size, transpose: None })
    }

    fn check_reference_types(
        model: &CustomUpdateModel,
        resolved: &BTreeMap<String, ResolvedVarReference>,
        description: &str,
    ) -> Result<(), ConfigurationError> {
        for var_ref in &model.var_refs {
            if let Some(target) = resolved.get(&var_ref.name) {
                if target.var.ty != var_ref.ty {
                    return Err(ConfigurationError::Unsupported(format!(
                        "{} variable reference '{}' has type '{}' but references a variable of type '{}'",
                        description, var_ref.name, var_ref.ty, target.var.ty
                    )));
                }
                if target.var.access.is_shared_neuron() && !var_ref.access.is_read_only() && var_ref.access.reduction().is_none() {
                    return Err(ConfigurationError::Unsupported(
                        "Variable references to SHARED_NEURON variables cannot be read-write".to_string()
                    ));
                }
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_custom_update(
        &mut self,
        name: &str,
        update_group_name: &str,
        model: Arc<CustomUpdateModel>,
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
        var_references: BTreeMap<String, VarReference>,
    ) -> Result<&mut CustomUpdate, ConfigurationError> {
        self.check_not_finalised()?;
        let description = format!("Custom update '{}'", name);
        validate_pop_name(name, "Custom update")?;
        validate_pop_name(update_group_name, "Custom update group")?;
        if self.find_custom_update(name).is_some() {
            return Err(ConfigurationError::DuplicateGroupName { kind: "custom update", name: name.to_string() });
        }
        model.validate(&params, &var_initialisers, &var_references, &description)?;
        validate_var_initialisers(&var_initialisers, &description)?;

        let mut resolved = BTreeMap::new();
        for (ref_name, reference) in &var_references {
            resolved.insert(ref_name.clone(), self.resolve_var_reference(reference)?);
        }
        Self::check_reference_types(&model, &resolved, &description)?;

        let size = resolved.values().next().map(|r| r.size).ok_or_else(|| ConfigurationError::Unsupported(
            format!("{} must reference at least one variable", description)
        ))?;
        if resolved.values().any(|r| r.size != size) {
            return Err(ConfigurationError::Unsupported(
                "All referenced variables must have the same size".to_string()
            ));
        }

        let index = self.custom_updates.len();
        self.custom_updates.push(CustomUpdate::new(
            name, update_group_name, model, params, var_initialisers, var_references, resolved, size,
        ));

        Ok(&mut self.custom_updates[index])
    }

    fn resolve_wu_var_reference(&self, reference: &WUVarReference) -> Result<(usize, ResolvedVarReference), ConfigurationError> {
        let sg_index = self.find_synapse_group(&reference.synapse_group)
            .ok_or_else(|| Self::unknown(GroupKind::SynapseGroup, &reference.synapse_group))?;
        let synapse_group = &self.synapse_groups[sg_index];
        if !(synapse_group.has_individual_weights() || synapse_group.has_kernel_weights()) {
            return Err(ConfigurationError::Unsupported(
                "Only INDIVIDUAL or KERNEL weight update variables can be referenced".to_string()
            ));
        }
        let var = synapse_group.wu_model.get_var(&reference.var)
            .ok_or_else(|| ConfigurationError::UnknownTarget {
                description: synapse_group.description(),
                kind: "variable",
                name: reference.var.clone(),
            })?;

        let transpose = match (&reference.transpose_synapse_group, &reference.transpose_var) {
            (Some(transpose_name), Some(transpose_var)) => {
                let transpose_group = self.get_synapse_group(transpose_name)
                    .ok_or_else(|| Self::unknown(GroupKind::SynapseGroup, transpose_name))?;
                let dense_individual = |sg: &SynapseGroup| sg.matrix_type == MatrixType::dense();
                if !dense_individual(synapse_group) || !dense_individual(transpose_group) {
                    return Err(ConfigurationError::Unsupported(
                        "Transpose updates can only be performed on DENSE weight update model variables".to_string()
                    ));
                }
                if transpose_group.num_src_neurons != synapse_group.num_trg_neurons
                    || transpose_group.num_trg_neurons != synapse_group.num_src_neurons
                {
                    return Err(ConfigurationError::Unsupported(
                        "Transpose updates can only be performed on connections between appropriately sized neuron groups".to_string()
                    ));
                }
                let transpose_var = transpose_group.wu_model.get_var(transpose_var)
                    .ok_or_else(|| ConfigurationError::UnknownTarget {
                        description: transpose_group.description(),
                        kind: "variable",
                        name: transpose_var.clone(),
                    })?;
                if transpose_var.ty != var.ty {
                    return Err(ConfigurationError::Unsupported(
                        "Transpose updates can only be performed on variables with the same type".to_string()
                    ));
                }

                Some((GroupRef::new(GroupKind::SynapseGroup, transpose_name), transpose_var.clone()))
            },
            (None, None) => None,
            _ => {
                return Err(ConfigurationError::Unsupported(
                    "Transpose references need both a synapse group and a variable".to_string()
                ));
            },
        };

        let size = synapse_group.num_src_neurons * synapse_group.max_connections;
        Ok((sg_index, ResolvedVarReference {
            target: GroupRef::new(GroupKind::SynapseGroup, &reference.synapse_group),
            var: var.clone(),
            size,
            transpose,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_custom_update_wu(
        &mut self,
        name: &str,
        update_group_name: &str,
        model: Arc<CustomUpdateModel>,
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
        var_references: BTreeMap<String, WUVarReference>,
    ) -> Result<&mut CustomUpdateWU, ConfigurationError> {
        self.check_not_finalised()?;
        let description = format!("Custom weight update '{}'", name);
        validate_pop_name(name, "Custom update")?;
        validate_pop_name(update_group_name, "Custom update group")?;
        if self.find_custom_wu_update(name).is_some() {
            return Err(ConfigurationError::DuplicateGroupName { kind: "custom update", name: name.to_string() });
        }
        model.validate(&params, &var_initialisers, &var_references, &description)?;
        validate_var_initialisers(&var_initialisers, &description)?;

        let mut resolved = BTreeMap::new();
        let mut sg_indices = BTreeSet::new();
        for (ref_name, reference) in &var_references {
            let (sg_index, resolved_ref) = self.resolve_wu_var_reference(reference)?;
            sg_indices.insert(sg_index);
            resolved.insert(ref_name.clone(), resolved_ref);
        }
        Self::check_reference_types(&model, &resolved, &description)?;

        let sg_index = match sg_indices.len() {
            1 => sg_indices.into_iter().next().unwrap_or_default(),
            0 => {
                return Err(ConfigurationError::Unsupported(format!(
                    "{} must reference at least one variable", description
                )));
            },
            _ => {
                return Err(ConfigurationError::Unsupported(
                    "All referenced variables must belong to the same synapse group".to_string()
                ));
            },
        };
        let sg_name = self.synapse_groups[sg_index].name.clone();

        let index = self.custom_wu_updates.len();
        self.custom_wu_updates.push(CustomUpdateWU::new(
            name, update_group_name, model, params, var_initialisers, var_references, resolved,
            (&sg_name, sg_index),
        ));

        Ok(&mut self.custom_wu_updates[index])
    }

    /// Calculates derived parameters, scans code and links groups together,
    /// after which the model can no longer be changed
    pub fn finalise(&mut self) -> Result<(), SpikeCodegenError> {
        self.check_not_finalised()?;
        let dt = self.dt;

        for neuron_group in self.neuron_groups.iter_mut() {
            neuron_group.in_syn.clear();
            neuron_group.out_syn.clear();
            neuron_group.current_sources.clear();
            neuron_group.num_delay_slots = 1;
            neuron_group.finalise(dt)?;
        }

        for (index, synapse_group) in self.synapse_groups.iter_mut().enumerate() {
            synapse_group.finalise(dt)?;
            if synapse_group.max_dendritic_delay_timesteps == 0 && synapse_group.is_dendritic_delay_required() {
                synapse_group.max_dendritic_delay_timesteps = 1;
            }

            let src = &mut self.neuron_groups[synapse_group.src];
            src.out_syn.push(index);
            src.num_delay_slots = src.num_delay_slots.max(synapse_group.axonal_delay_steps + 1);
            if synapse_group.wu_references("st_pre") {
                src.spike_time_required = true;
            }
            if synapse_group.wu_references("prev_st_pre") {
                src.prev_spike_time_required = true;
            }
            if synapse_group.is_spike_event_required() {
                src.spike_event_required = true;
            }

            let trg = &mut self.neuron_groups[synapse_group.trg];
            trg.in_syn.push(index);
            trg.num_delay_slots = trg.num_delay_slots.max(synapse_group.back_prop_delay_steps + 1);
            if synapse_group.wu_references("st_post") || synapse_group.is_postsynaptic_learning_required() {
                trg.spike_time_required = true;
            }
            if synapse_group.wu_references("prev_st_post") {
                trg.prev_spike_time_required = true;
            }

            synapse_group.validate_finalised()?;
        }

        // Sizes of weight update references depend on max row lengths calculated above
        for custom_wu_update in self.custom_wu_updates.iter_mut() {
            let synapse_group = &self.synapse_groups[custom_wu_update.synapse_group];
            let size = synapse_group.num_src_neurons * synapse_group.max_connections;
            for resolved in custom_wu_update.resolved_references.values_mut() {
                resolved.size = size;
            }
        }

        for (index, current_source) in self.current_sources.iter_mut().enumerate() {
            current_source.finalise(dt)?;
            self.neuron_groups[current_source.target].current_sources.push(index);
        }

        let batch_size = self.batch_size;
        for custom_update in self.custom_updates.iter_mut() {
            custom_update.finalise(dt, batch_size)?;
        }
        for custom_wu_update in self.custom_wu_updates.iter_mut() {
            custom_wu_update.finalise(dt, batch_size)?;
        }

        let context = self.type_context();
        let all_vars = self.neuron_groups.iter().flat_map(|n| n.model.vars.iter())
            .chain(self.synapse_groups.iter().flat_map(|s| s.wu_model.vars.iter().chain(s.ps_model.vars.iter())))
            .chain(self.current_sources.iter().flat_map(|c| c.model.vars.iter()))
            .chain(self.custom_updates.iter().flat_map(|c| c.model.vars.iter()))
            .chain(self.custom_wu_updates.iter().flat_map(|c| c.model.vars.iter()));
        for var in all_vars {
            resolve_var_type(var, &context)?;
        }

        for neuron_group in &self.neuron_groups {
            debug!(
                "Neuron group '{}': {} delay slots, spike times {}, spike events {}",
                neuron_group.name, neuron_group.num_delay_slots,
                neuron_group.spike_time_required, neuron_group.spike_event_required,
            );
        }

        self.finalised = true;
        info!(
            "Finalised model '{}' with {} neuron groups, {} synapse groups, {} current sources and {} custom updates",
            self.name, self.neuron_groups.len(), self.synapse_groups.len(), self.current_sources.len(),
            self.custom_updates.len() + self.custom_wu_updates.len(),
        );

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{current_source_models, neuron_models, param_values, postsynaptic_models, weight_update_models};
    use crate::models::init_sparse_connectivity_snippets;
    use crate::models::{SnippetBase, SparseConnectivityInit, VarAccessMode, VarRef};

    fn lif_vars() -> BTreeMap<String, VarInit> {
        BTreeMap::from([
            ("V".to_string(), VarInit::constant(-65.0)),
            ("RefracTime".to_string(), VarInit::constant(0.0)),
        ])
    }

    fn lif_params() -> ParamValues {
        param_values(&[
            ("C", 1.0), ("TauM", 20.0), ("Vrest", -65.0), ("Vreset", -65.0),
            ("Vthresh", -50.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ])
    }

    #[test]
    fn test_duplicate_neuron_group() {
        let mut model = ModelSpec::new("test");
        model.add_neuron_population("Pop", 10, neuron_models::lif(), lif_params(), lif_vars()).unwrap();

        let result = model.add_neuron_population("Pop", 10, neuron_models::lif(), lif_params(), lif_vars());
        assert_eq!(
            result.err().map(|e| e.to_string()),
            Some("Cannot add a neuron population with duplicate name:'Pop'".to_string()),
        );
    }

    #[test]
    fn test_finalise_links_groups() {
        let mut model = ModelSpec::new("test");
        model.add_neuron_population("Pre", 100, neuron_models::lif(), lif_params(), lif_vars()).unwrap();
        model.add_neuron_population("Post", 50, neuron_models::lif(), lif_params(), lif_vars()).unwrap();

        let wu = WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            ParamValues::new(),
            BTreeMap::from([("g".to_string(), VarInit::constant(0.1))]),
        );
        let ps = PostsynapticInit::new(postsynaptic_models::delta_curr(), ParamValues::new(), BTreeMap::new());
        let connectivity = ConnectivityInit::Sparse(SparseConnectivityInit::new(
            init_sparse_connectivity_snippets::fixed_probability(),
            param_values(&[("prob", 0.1)]),
        ));
        model.add_synapse_population("Syn", MatrixType::sparse(), "Pre", "Post", wu, ps, connectivity)
            .unwrap()
            .set_axonal_delay_steps(5);

        model.finalise().unwrap();

        let pre = model.get_neuron_group("Pre").unwrap();
        let post = model.get_neuron_group("Post").unwrap();
        let syn = model.get_synapse_group("Syn").unwrap();
        assert_eq!(pre.num_delay_slots, 6);
        assert_eq!(pre.out_syn, vec![0]);
        assert_eq!(post.in_syn, vec![0]);
        assert!(syn.max_connections > 0 && syn.max_connections <= 50);
        assert!(model.neuron_group_mut("Pre").is_err());
    }

    #[test]
    fn test_unknown_source() {
        let mut model = ModelSpec::new("test");
        model.add_neuron_population("Post", 50, neuron_models::lif(), lif_params(), lif_vars()).unwrap();

        let wu = WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            ParamValues::new(),
            BTreeMap::from([("g".to_string(), VarInit::constant(0.1))]),
        );
        let ps = PostsynapticInit::new(postsynaptic_models::delta_curr(), ParamValues::new(), BTreeMap::new());
        let result = model.add_synapse_population(
            "Syn", MatrixType::dense(), "Missing", "Post", wu, ps, ConnectivityInit::Uninitialised,
        );

        assert!(matches!(result, Err(ConfigurationError::UnknownGroup { .. })));
    }

    #[test]
    fn test_set_params_dynamic() {
        let mut model = ModelSpec::new("test");
        model.add_neuron_population("Pre", 10, neuron_models::lif(), lif_params(), lif_vars()).unwrap();
        model.add_neuron_population("Post", 10, neuron_models::lif(), lif_params(), lif_vars()).unwrap();
        model.add_current_source("Stim", current_source_models::dc(), "Post", param_values(&[("amp", 0.5)]), BTreeMap::new())
            .unwrap();

        let wu = WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            ParamValues::new(),
            BTreeMap::from([("g".to_string(), VarInit::constant(0.1))]),
        );
        let ps = PostsynapticInit::new(postsynaptic_models::exp_curr(), param_values(&[("tau", 5.0)]), BTreeMap::new());
        model.add_synapse_population("Syn", MatrixType::dense(), "Pre", "Post", wu, ps, ConnectivityInit::Uninitialised)
            .unwrap();

        let pop = model.neuron_group_mut("Post").unwrap();
        pop.set_param_dynamic("Vthresh", true).unwrap();
        assert!(pop.is_param_dynamic("Vthresh"));
        pop.set_param_dynamic("Vthresh", false).unwrap();
        assert!(!pop.is_param_dynamic("Vthresh"));
        assert!(matches!(
            pop.set_param_dynamic("Missing", true),
            Err(ConfigurationError::UnknownTarget { kind: "parameter", .. }),
        ));

        let syn = model.synapse_group_mut("Syn").unwrap();
        syn.set_ps_param_dynamic("tau", true).unwrap();
        assert!(syn.ps_dynamic_params.contains("tau"));
        assert!(matches!(
            syn.set_wu_param_dynamic("tau", true),
            Err(ConfigurationError::UnknownTarget { .. }),
        ));

        let stim = model.current_source_mut("Stim").unwrap();
        stim.set_param_dynamic("amp", true).unwrap();
        assert!(stim.dynamic_params.contains("amp"));
        assert!(stim.set_param_dynamic("sd", true).is_err());

        let scale = Arc::new(CustomUpdateModel {
            snippet: SnippetBase::new(&["factor"], vec![], vec![]),
            vars: vec![],
            var_refs: vec![VarRef::new("V", "scalar", VarAccessMode::ReadWrite)],
            update_code: "V *= factor;".to_string(),
        });
        let refs = BTreeMap::from([
            ("V".to_string(), VarReference::Neuron { group: "Post".to_string(), var: "V".to_string() }),
        ]);
        model.add_custom_update("Scale", "Reset", scale, param_values(&[("factor", 0.5)]), BTreeMap::new(), refs)
            .unwrap();
        let update = model.custom_update_mut("Scale").unwrap();
        update.set_param_dynamic("factor", true).unwrap();
        assert!(update.dynamic_params.contains("factor"));
        assert!(update.set_param_dynamic("V", true).is_err());
    }
}
