use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use sha2::{Sha256, Digest};
use crate::error::{ConfigurationError, FrontEndError};
use crate::models::{NeuronModel, ParamValues, VarInit};
use crate::utils::{finish_hash, HashDigest, UpdateHash};
use super::{scan_group_code, set_param_dynamic, set_var_location, CodeTokens, VarLocation};


/// Population of neurons sharing a model
#[derive(Debug, Clone)]
pub struct NeuronGroup {
    pub name: String,
    pub num_neurons: usize,
    pub model: Arc<NeuronModel>,
    pub params: ParamValues,
    pub derived_params: ParamValues,
    pub var_initialisers: BTreeMap<String, VarInit>,
    pub var_locations: BTreeMap<String, VarLocation>,
    pub dynamic_params: BTreeSet<String>,
    pub spike_recording_enabled: bool,
    pub spike_event_recording_enabled: bool,
    /// Number of slots in the spike ring buffer, one unless outgoing synapses are delayed
    pub num_delay_slots: usize,
    pub spike_time_required: bool,
    pub prev_spike_time_required: bool,
    pub spike_event_required: bool,
    /// Indices of incoming synapse groups
    pub in_syn: Vec<usize>,
    /// Indices of outgoing synapse groups
    pub out_syn: Vec<usize>,
    pub current_sources: Vec<usize>,
    pub sim_tokens: CodeTokens,
    pub threshold_condition_tokens: CodeTokens,
    pub reset_tokens: CodeTokens,
}

impl NeuronGroup {
    pub(crate) fn new(
        name: &str,
        num_neurons: usize,
        model: Arc<NeuronModel>,
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
    ) -> Self {
        NeuronGroup {
            name: name.to_string(),
            num_neurons,
            model,
            params,
            derived_params: ParamValues::new(),
            var_initialisers,
            var_locations: BTreeMap::new(),
            dynamic_params: BTreeSet::new(),
            spike_recording_enabled: false,
            spike_event_recording_enabled: false,
            num_delay_slots: 1,
            spike_time_required: false,
            prev_spike_time_required: false,
            spike_event_required: false,
            in_syn: vec![],
            out_syn: vec![],
            current_sources: vec![],
            sim_tokens: vec![],
            threshold_condition_tokens: vec![],
            reset_tokens: vec![],
        }
    }

    pub fn description(&self) -> String {
        format!("Neuron group '{}'", self.name)
    }

    pub fn set_param_dynamic(&mut self, name: &str, dynamic: bool) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_param_dynamic(&mut self.dynamic_params, &self.params, name, dynamic, &description)
    }

    pub fn set_var_location(&mut self, name: &str, location: VarLocation) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_var_location(&mut self.var_locations, &self.model.vars, name, location, &description)
    }

    pub fn get_var_location(&self, name: &str) -> VarLocation {
        self.var_locations.get(name).copied().unwrap_or_default()
    }

    pub fn set_spike_recording_enabled(&mut self, enabled: bool) {
        self.spike_recording_enabled = enabled;
    }

    pub fn set_spike_event_recording_enabled(&mut self, enabled: bool) {
        self.spike_event_recording_enabled = enabled;
    }

    pub fn is_delay_required(&self) -> bool {
        self.num_delay_slots > 1
    }

    pub fn is_recording_enabled(&self) -> bool {
        self.spike_recording_enabled || self.spike_event_recording_enabled
    }

    pub fn is_param_dynamic(&self, name: &str) -> bool {
        self.dynamic_params.contains(name)
    }

    /// Value of a parameter or derived parameter
    pub fn get_param_value(&self, name: &str) -> Option<f64> {
        self.params.get(name).or_else(|| self.derived_params.get(name)).copied()
    }

    pub(crate) fn finalise(&mut self, dt: f64) -> Result<(), FrontEndError> {
        self.derived_params = self.model.snippet.calc_derived_params(&self.params, dt);
        for var_init in self.var_initialisers.values_mut() {
            var_init.finalise(dt);
        }

        let description = self.description();
        self.sim_tokens = scan_group_code(&self.model.sim_code, &format!("{} sim code", description))?;
        self.threshold_condition_tokens = scan_group_code(
            &self.model.threshold_condition_code,
            &format!("{} threshold condition code", description),
        )?;
        self.reset_tokens = scan_group_code(&self.model.reset_code, &format!("{} reset code", description))?;

        Ok(())
    }

    /// Shape of the update code, excluding parameter values and children
    pub(crate) fn hash_update_shape(&self, hasher: &mut Sha256) {
        self.model.hash_digest().update_hash(hasher);
        self.dynamic_params.iter().collect::<Vec<_>>().update_hash(hasher);
        self.num_delay_slots.update_hash(hasher);
        self.spike_time_required.update_hash(hasher);
        self.prev_spike_time_required.update_hash(hasher);
        self.spike_event_required.update_hash(hasher);
        self.spike_recording_enabled.update_hash(hasher);
        self.spike_event_recording_enabled.update_hash(hasher);
    }

    /// Digest of everything which changes the variable initialisation code
    pub fn init_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.num_delay_slots.update_hash(&mut hasher);
        self.spike_time_required.update_hash(&mut hasher);
        self.prev_spike_time_required.update_hash(&mut hasher);
        self.spike_event_required.update_hash(&mut hasher);
        for (name, var_init) in &self.var_initialisers {
            name.update_hash(&mut hasher);
            var_init.hash_digest().update_hash(&mut hasher);
        }

        finish_hash(hasher)
    }

    /// Digest for the spike queue and previous spike time housekeeping kernels
    pub fn housekeeping_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.num_delay_slots.update_hash(&mut hasher);
        self.spike_event_required.update_hash(&mut hasher);
        self.prev_spike_time_required.update_hash(&mut hasher);

        finish_hash(hasher)
    }
}
