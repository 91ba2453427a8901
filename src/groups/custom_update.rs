use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use sha2::{Sha256, Digest};
use crate::error::{ConfigurationError, FrontEndError};
use crate::models::{CustomUpdateModel, ParamValues, Var, VarInit};
use crate::utils::{finish_hash, HashDigest, UpdateHash};
use super::{scan_group_code, set_param_dynamic, CodeTokens, GroupRef};


/// Reference from a custom update to a variable of a population sized group
#[derive(Debug, Clone, PartialEq)]
pub enum VarReference {
    Neuron { group: String, var: String },
    CurrentSource { group: String, var: String },
    CustomUpdate { group: String, var: String },
}

impl VarReference {
    pub fn neuron(group: &str, var: &str) -> Self {
        VarReference::Neuron { group: group.to_string(), var: var.to_string() }
    }

    pub fn current_source(group: &str, var: &str) -> Self {
        VarReference::CurrentSource { group: group.to_string(), var: var.to_string() }
    }

    pub fn custom_update(group: &str, var: &str) -> Self {
        VarReference::CustomUpdate { group: group.to_string(), var: var.to_string() }
    }

    pub fn var_name(&self) -> &str {
        match self {
            VarReference::Neuron { var, .. }
            | VarReference::CurrentSource { var, .. }
            | VarReference::CustomUpdate { var, .. } => var,
        }
    }
}

/// Reference from a custom update to a weight update variable, optionally
/// with a second synapse group to write the transpose into
#[derive(Debug, Clone, PartialEq)]
pub struct WUVarReference {
    pub synapse_group: String,
    pub var: String,
    pub transpose_synapse_group: Option<String>,
    pub transpose_var: Option<String>,
}

impl WUVarReference {
    pub fn new(synapse_group: &str, var: &str) -> Self {
        WUVarReference {
            synapse_group: synapse_group.to_string(),
            var: var.to_string(),
            transpose_synapse_group: None,
            transpose_var: None,
        }
    }

    pub fn with_transpose(synapse_group: &str, var: &str, transpose_synapse_group: &str, transpose_var: &str) -> Self {
        WUVarReference {
            synapse_group: synapse_group.to_string(),
            var: var.to_string(),
            transpose_synapse_group: Some(transpose_synapse_group.to_string()),
            transpose_var: Some(transpose_var.to_string()),
        }
    }
}

/// Variable reference after looking up its target
#[derive(Debug, Clone)]
pub struct ResolvedVarReference {
    pub target: GroupRef,
    pub var: Var,
    /// Number of elements the target variable has per batch
    pub size: usize,
    /// Transpose target and its variable, only for weight update references
    pub transpose: Option<(GroupRef, Var)>,
}

fn hash_resolved_refs(refs: &BTreeMap<String, ResolvedVarReference>, hasher: &mut Sha256) {
    for (name, resolved) in refs {
        name.update_hash(hasher);
        (resolved.target.kind as u8).update_hash(hasher);
        resolved.var.update_hash(hasher);
        resolved.transpose.as_ref().map(|(_, var)| var).update_hash(hasher);
    }
}

/// Update which runs on demand over a population, grouped by update group name
#[derive(Debug, Clone)]
pub struct CustomUpdate {
    pub name: String,
    pub update_group_name: String,
    pub model: Arc<CustomUpdateModel>,
    pub params: ParamValues,
    pub derived_params: ParamValues,
    pub var_initialisers: BTreeMap<String, VarInit>,
    pub dynamic_params: BTreeSet<String>,
    pub var_references: BTreeMap<String, VarReference>,
    pub resolved_references: BTreeMap<String, ResolvedVarReference>,
    /// Number of elements updated per batch
    pub size: usize,
    pub batched: bool,
    pub update_tokens: CodeTokens,
}

impl CustomUpdate {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: &str,
        update_group_name: &str,
        model: Arc<CustomUpdateModel>,
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
        var_references: BTreeMap<String, VarReference>,
        resolved_references: BTreeMap<String, ResolvedVarReference>,
        size: usize,
    ) -> Self {
        CustomUpdate {
            name: name.to_string(),
            update_group_name: update_group_name.to_string(),
            model,
            params,
            derived_params: ParamValues::new(),
            var_initialisers,
            dynamic_params: BTreeSet::new(),
            var_references,
            resolved_references,
            size,
            batched: false,
            update_tokens: vec![],
        }
    }

    pub fn description(&self) -> String {
        format!("Custom update '{}'", self.name)
    }

    pub fn set_param_dynamic(&mut self, name: &str, dynamic: bool) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_param_dynamic(&mut self.dynamic_params, &self.params, name, dynamic, &description)
    }

    pub fn get_param_value(&self, name: &str) -> Option<f64> {
        self.params.get(name).or_else(|| self.derived_params.get(name)).copied()
    }

    /// Does the update reduce over neurons into shared variables
    pub fn is_neuron_reduction(&self) -> bool {
        self.model.vars.iter().any(|v| v.access.is_neuron_reduction())
            || self.model.var_refs.iter().any(|r| {
                r.access.reduction().is_some()
                    && self.resolved_references.get(&r.name).map_or(false, |t| t.var.access.is_shared_neuron())
            })
    }

    /// Does the update reduce over batches into unduplicated variables
    pub fn is_batch_reduction(&self) -> bool {
        self.batched && (
            self.model.vars.iter().any(|v| v.access.is_batch_reduction())
            || self.model.var_refs.iter().any(|r| {
                r.access.reduction().is_some()
                    && self.resolved_references.get(&r.name).map_or(false, |t| !t.var.access.is_duplicated())
            })
        )
    }

    /// Is there at least one variable with a value per element rather than one shared value
    pub fn is_per_element(&self) -> bool {
        self.model.vars.iter().any(|v| !v.access.is_shared_neuron())
            || self.resolved_references.values().any(|r| !r.var.access.is_shared_neuron())
    }

    /// Number of batch copies a thread range is replicated over
    pub fn num_copies(&self, batch_size: usize) -> usize {
        if self.batched && !self.is_batch_reduction() {
            batch_size
        } else {
            1
        }
    }

    pub fn is_var_duplicated(&self, var: &Var) -> bool {
        self.batched && var.access.is_duplicated()
    }

    pub(crate) fn finalise(&mut self, dt: f64, batch_size: usize) -> Result<(), FrontEndError> {
        self.derived_params = self.model.snippet.calc_derived_params(&self.params, dt);
        for var_init in self.var_initialisers.values_mut() {
            var_init.finalise(dt);
        }
        self.batched = batch_size > 1
            && self.resolved_references.values().any(|r| r.var.access.is_duplicated());
        self.update_tokens = scan_group_code(
            &self.model.update_code,
            &format!("{} update code", self.description()),
        )?;

        Ok(())
    }

    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.model.hash_digest().update_hash(&mut hasher);
        self.update_group_name.update_hash(&mut hasher);
        self.dynamic_params.iter().collect::<Vec<_>>().update_hash(&mut hasher);
        self.batched.update_hash(&mut hasher);
        hash_resolved_refs(&self.resolved_references, &mut hasher);

        finish_hash(hasher)
    }

    pub fn init_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.batched.update_hash(&mut hasher);
        for (name, var_init) in &self.var_initialisers {
            name.update_hash(&mut hasher);
            var_init.hash_digest().update_hash(&mut hasher);
        }

        finish_hash(hasher)
    }
}

/// Custom update over the synapses of one synapse group
#[derive(Debug, Clone)]
pub struct CustomUpdateWU {
    pub name: String,
    pub update_group_name: String,
    pub model: Arc<CustomUpdateModel>,
    pub params: ParamValues,
    pub derived_params: ParamValues,
    pub var_initialisers: BTreeMap<String, VarInit>,
    pub dynamic_params: BTreeSet<String>,
    pub var_references: BTreeMap<String, WUVarReference>,
    pub resolved_references: BTreeMap<String, ResolvedVarReference>,
    pub synapse_group_name: String,
    /// Index of the synapse group all references point into
    pub synapse_group: usize,
    pub batched: bool,
    pub update_tokens: CodeTokens,
}

impl CustomUpdateWU {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: &str,
        update_group_name: &str,
        model: Arc<CustomUpdateModel>,
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
        var_references: BTreeMap<String, WUVarReference>,
        resolved_references: BTreeMap<String, ResolvedVarReference>,
        (synapse_group_name, synapse_group): (&str, usize),
    ) -> Self {
        CustomUpdateWU {
            name: name.to_string(),
            update_group_name: update_group_name.to_string(),
            model,
            params,
            derived_params: ParamValues::new(),
            var_initialisers,
            dynamic_params: BTreeSet::new(),
            var_references,
            resolved_references,
            synapse_group_name: synapse_group_name.to_string(),
            synapse_group,
            batched: false,
            update_tokens: vec![],
        }
    }

    pub fn description(&self) -> String {
        format!("Custom weight update '{}'", self.name)
    }

    pub fn set_param_dynamic(&mut self, name: &str, dynamic: bool) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_param_dynamic(&mut self.dynamic_params, &self.params, name, dynamic, &description)
    }

    pub fn get_param_value(&self, name: &str) -> Option<f64> {
        self.params.get(name).or_else(|| self.derived_params.get(name)).copied()
    }

    /// Does any reference write its transpose into another synapse group
    pub fn is_transpose_operation(&self) -> bool {
        self.resolved_references.values().any(|r| r.transpose.is_some())
    }

    pub fn is_batch_reduction(&self) -> bool {
        self.batched && (
            self.model.vars.iter().any(|v| v.access.is_batch_reduction())
            || self.model.var_refs.iter().any(|r| {
                r.access.reduction().is_some()
                    && self.resolved_references.get(&r.name).map_or(false, |t| !t.var.access.is_duplicated())
            })
        )
    }

    pub fn num_copies(&self, batch_size: usize) -> usize {
        if self.batched && !self.is_batch_reduction() {
            batch_size
        } else {
            1
        }
    }

    pub fn is_var_duplicated(&self, var: &Var) -> bool {
        self.batched && var.access.is_duplicated()
    }

    pub(crate) fn finalise(&mut self, dt: f64, batch_size: usize) -> Result<(), FrontEndError> {
        self.derived_params = self.model.snippet.calc_derived_params(&self.params, dt);
        for var_init in self.var_initialisers.values_mut() {
            var_init.finalise(dt);
        }
        self.batched = batch_size > 1
            && self.resolved_references.values().any(|r| r.var.access.is_duplicated());
        self.update_tokens = scan_group_code(
            &self.model.update_code,
            &format!("{} update code", self.description()),
        )?;

        Ok(())
    }

    /// Digest including the shape of the referenced synapse group
    pub fn hash_digest(&self, synapse_shape: &HashDigest) -> HashDigest {
        let mut hasher = Sha256::new();
        self.model.hash_digest().update_hash(&mut hasher);
        self.update_group_name.update_hash(&mut hasher);
        self.dynamic_params.iter().collect::<Vec<_>>().update_hash(&mut hasher);
        self.batched.update_hash(&mut hasher);
        hash_resolved_refs(&self.resolved_references, &mut hasher);
        synapse_shape.update_hash(&mut hasher);

        finish_hash(hasher)
    }

    pub fn init_hash_digest(&self, synapse_shape: &HashDigest) -> HashDigest {
        let mut hasher = Sha256::new();
        self.batched.update_hash(&mut hasher);
        for (name, var_init) in &self.var_initialisers {
            name.update_hash(&mut hasher);
            var_init.hash_digest().update_hash(&mut hasher);
        }
        synapse_shape.update_hash(&mut hasher);

        finish_hash(hasher)
    }
}
