use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use sha2::{Sha256, Digest};
use crate::error::{ConfigurationError, FrontEndError};
use crate::models::{
    ParamValues, PostsynapticModel, SparseConnectivityInit, ToeplitzConnectivityInit,
    VarInit, WeightUpdateModel,
};
use crate::utils::{finish_hash, HashDigest, UpdateHash};
use super::{
    is_code_empty, references_identifier, scan_group_code, set_param_dynamic,
    set_var_location, CodeTokens, VarLocation,
};


/// How connectivity between the two populations is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixConnectivity {
    Dense,
    /// Row-major ragged matrix with `rowLength` and `ind`
    Sparse,
    /// One bit per possible synapse
    Bitmask,
    /// Generated on the fly from diagonals of a Toeplitz matrix
    Toeplitz,
    /// Regenerated every time step from the connectivity initialiser
    Procedural,
}

/// How synaptic weights are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixWeight {
    Individual,
    /// One value for all synapses, baked into the code
    Global,
    /// Shared weight kernel indexed by kernel position
    Kernel,
    /// Regenerated every time step from the variable initialisers
    Procedural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixType {
    pub connectivity: MatrixConnectivity,
    pub weight: MatrixWeight,
}

impl MatrixType {
    pub fn new(connectivity: MatrixConnectivity, weight: MatrixWeight) -> Self {
        MatrixType { connectivity, weight }
    }

    pub fn dense() -> Self {
        MatrixType::new(MatrixConnectivity::Dense, MatrixWeight::Individual)
    }

    pub fn sparse() -> Self {
        MatrixType::new(MatrixConnectivity::Sparse, MatrixWeight::Individual)
    }

    pub fn bitmask() -> Self {
        MatrixType::new(MatrixConnectivity::Bitmask, MatrixWeight::Global)
    }

    pub fn toeplitz() -> Self {
        MatrixType::new(MatrixConnectivity::Toeplitz, MatrixWeight::Kernel)
    }

    pub fn procedural() -> Self {
        MatrixType::new(MatrixConnectivity::Procedural, MatrixWeight::Procedural)
    }

    /// Parses names such as `SPARSE_INDIVIDUALG`
    pub fn from_name(name: &str) -> Option<Self> {
        let (connectivity, weight) = name.split_once('_')?;
        let connectivity = match connectivity {
            "DENSE" => MatrixConnectivity::Dense,
            "SPARSE" => MatrixConnectivity::Sparse,
            "BITMASK" => MatrixConnectivity::Bitmask,
            "TOEPLITZ" => MatrixConnectivity::Toeplitz,
            "PROCEDURAL" => MatrixConnectivity::Procedural,
            _ => return None,
        };
        let weight = match weight {
            "INDIVIDUALG" => MatrixWeight::Individual,
            "GLOBALG" => MatrixWeight::Global,
            "KERNELG" => MatrixWeight::Kernel,
            "PROCEDURALG" => MatrixWeight::Procedural,
            _ => return None,
        };

        Some(MatrixType { connectivity, weight })
    }

    fn hash_id(&self) -> u32 {
        ((self.connectivity as u32) << 8) | self.weight as u32
    }
}

/// Whether presynaptic updates parallelise over target or source neurons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpanType {
    #[default]
    Postsynaptic,
    Presynaptic,
}

/// How the connectivity of a synapse group is generated
#[derive(Debug, Clone, Default)]
pub enum ConnectivityInit {
    /// Dense connectivity or sparse connectivity filled in from the host
    #[default]
    Uninitialised,
    Sparse(SparseConnectivityInit),
    Toeplitz(ToeplitzConnectivityInit),
}

/// Weight update model along with its parameters and variable initialisers
#[derive(Debug, Clone)]
pub struct WeightUpdateInit {
    pub model: Arc<WeightUpdateModel>,
    pub params: ParamValues,
    pub var_initialisers: BTreeMap<String, VarInit>,
}

impl WeightUpdateInit {
    pub fn new(model: Arc<WeightUpdateModel>, params: ParamValues, var_initialisers: BTreeMap<String, VarInit>) -> Self {
        WeightUpdateInit { model, params, var_initialisers }
    }
}

/// Postsynaptic model along with its parameters and variable initialisers
#[derive(Debug, Clone)]
pub struct PostsynapticInit {
    pub model: Arc<PostsynapticModel>,
    pub params: ParamValues,
    pub var_initialisers: BTreeMap<String, VarInit>,
}

impl PostsynapticInit {
    pub fn new(model: Arc<PostsynapticModel>, params: ParamValues, var_initialisers: BTreeMap<String, VarInit>) -> Self {
        PostsynapticInit { model, params, var_initialisers }
    }
}

/// Projection between a source and target neuron group
#[derive(Debug, Clone)]
pub struct SynapseGroup {
    pub name: String,
    pub src_name: String,
    pub trg_name: String,
    /// Index of the source neuron group
    pub src: usize,
    /// Index of the target neuron group
    pub trg: usize,
    pub num_src_neurons: usize,
    pub num_trg_neurons: usize,
    pub matrix_type: MatrixType,
    pub wu_model: Arc<WeightUpdateModel>,
    pub wu_params: ParamValues,
    pub wu_derived_params: ParamValues,
    pub wu_var_initialisers: BTreeMap<String, VarInit>,
    pub wu_var_locations: BTreeMap<String, VarLocation>,
    pub wu_dynamic_params: BTreeSet<String>,
    pub ps_model: Arc<PostsynapticModel>,
    pub ps_params: ParamValues,
    pub ps_derived_params: ParamValues,
    pub ps_var_initialisers: BTreeMap<String, VarInit>,
    pub ps_dynamic_params: BTreeSet<String>,
    pub connectivity_initialiser: Option<SparseConnectivityInit>,
    pub toeplitz_initialiser: Option<ToeplitzConnectivityInit>,
    pub axonal_delay_steps: usize,
    pub back_prop_delay_steps: usize,
    /// Zero when dendritic delays are not used
    pub max_dendritic_delay_timesteps: usize,
    pub max_connections: usize,
    pub max_source_connections: usize,
    pub kernel_size: Vec<usize>,
    pub span_type: SpanType,
    pub num_threads_per_spike: usize,
    pub wu_sim_tokens: CodeTokens,
    pub wu_event_tokens: CodeTokens,
    pub wu_learn_post_tokens: CodeTokens,
    pub wu_synapse_dynamics_tokens: CodeTokens,
    pub wu_event_threshold_tokens: CodeTokens,
    pub ps_apply_input_tokens: CodeTokens,
    pub ps_decay_tokens: CodeTokens,
    max_connections_set: bool,
    max_source_connections_set: bool,
}

impl SynapseGroup {
    pub(crate) fn new(
        name: &str,
        matrix_type: MatrixType,
        (src_name, src, num_src_neurons): (&str, usize, usize),
        (trg_name, trg, num_trg_neurons): (&str, usize, usize),
        wu: WeightUpdateInit,
        ps: PostsynapticInit,
        connectivity: ConnectivityInit,
    ) -> Self {
        let (connectivity_initialiser, toeplitz_initialiser) = match connectivity {
            ConnectivityInit::Uninitialised => (None, None),
            ConnectivityInit::Sparse(init) => (Some(init), None),
            ConnectivityInit::Toeplitz(init) => (None, Some(init)),
        };

        SynapseGroup {
            name: name.to_string(),
            src_name: src_name.to_string(),
            trg_name: trg_name.to_string(),
            src,
            trg,
            num_src_neurons,
            num_trg_neurons,
            matrix_type,
            wu_model: wu.model,
            wu_params: wu.params,
            wu_derived_params: ParamValues::new(),
            wu_var_initialisers: wu.var_initialisers,
            wu_var_locations: BTreeMap::new(),
            wu_dynamic_params: BTreeSet::new(),
            ps_model: ps.model,
            ps_params: ps.params,
            ps_derived_params: ParamValues::new(),
            ps_var_initialisers: ps.var_initialisers,
            ps_dynamic_params: BTreeSet::new(),
            connectivity_initialiser,
            toeplitz_initialiser,
            axonal_delay_steps: 0,
            back_prop_delay_steps: 0,
            max_dendritic_delay_timesteps: 0,
            max_connections: num_trg_neurons,
            max_source_connections: num_src_neurons,
            kernel_size: vec![],
            span_type: SpanType::Postsynaptic,
            num_threads_per_spike: 1,
            wu_sim_tokens: vec![],
            wu_event_tokens: vec![],
            wu_learn_post_tokens: vec![],
            wu_synapse_dynamics_tokens: vec![],
            wu_event_threshold_tokens: vec![],
            ps_apply_input_tokens: vec![],
            ps_decay_tokens: vec![],
            max_connections_set: false,
            max_source_connections_set: false,
        }
    }

    pub fn description(&self) -> String {
        format!("Synapse group '{}'", self.name)
    }

    pub fn set_axonal_delay_steps(&mut self, steps: usize) {
        self.axonal_delay_steps = steps;
    }

    pub fn set_back_prop_delay_steps(&mut self, steps: usize) {
        self.back_prop_delay_steps = steps;
    }

    pub fn set_max_dendritic_delay_timesteps(&mut self, timesteps: usize) {
        self.max_dendritic_delay_timesteps = timesteps;
    }

    /// Overrides the maximum row length otherwise calculated from the connectivity initialiser
    pub fn set_max_connections(&mut self, max_connections: usize) -> Result<(), ConfigurationError> {
        if !self.is_sparse() {
            return Err(ConfigurationError::Unsupported(
                "Maximum row length can only be set for synapse groups with sparse connectivity".to_string()
            ));
        }
        self.max_connections = max_connections;
        self.max_connections_set = true;

        Ok(())
    }

    pub fn set_max_source_connections(&mut self, max_connections: usize) -> Result<(), ConfigurationError> {
        if !self.is_sparse() {
            return Err(ConfigurationError::Unsupported(
                "Maximum column length can only be set for synapse groups with sparse connectivity".to_string()
            ));
        }
        self.max_source_connections = max_connections;
        self.max_source_connections_set = true;

        Ok(())
    }

    pub fn set_kernel_size(&mut self, kernel_size: Vec<usize>) -> Result<(), ConfigurationError> {
        if self.matrix_type.weight != MatrixWeight::Kernel {
            return Err(ConfigurationError::Unsupported(
                "Kernel size can only be set for synapse groups with kernel weights".to_string()
            ));
        }
        self.kernel_size = kernel_size;

        Ok(())
    }

    pub fn set_span_type(&mut self, span_type: SpanType) {
        self.span_type = span_type;
    }

    pub fn set_num_threads_per_spike(&mut self, num_threads: usize) {
        self.num_threads_per_spike = num_threads.max(1);
    }

    pub fn set_wu_param_dynamic(&mut self, name: &str, dynamic: bool) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_param_dynamic(&mut self.wu_dynamic_params, &self.wu_params, name, dynamic, &description)
    }

    pub fn set_ps_param_dynamic(&mut self, name: &str, dynamic: bool) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_param_dynamic(&mut self.ps_dynamic_params, &self.ps_params, name, dynamic, &description)
    }

    pub fn set_wu_var_location(&mut self, name: &str, location: VarLocation) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_var_location(&mut self.wu_var_locations, &self.wu_model.vars, name, location, &description)
    }

    pub fn is_sparse(&self) -> bool {
        self.matrix_type.connectivity == MatrixConnectivity::Sparse
    }

    pub fn is_dendritic_delay_required(&self) -> bool {
        self.max_dendritic_delay_timesteps > 0
            || references_identifier(&self.wu_sim_tokens, "addToPostDelay")
            || references_identifier(&self.wu_event_tokens, "addToPostDelay")
            || references_identifier(&self.wu_synapse_dynamics_tokens, "addToPostDelay")
    }

    /// Does any weight update code write input back to the presynaptic population
    pub fn is_pre_output_required(&self) -> bool {
        references_identifier(&self.wu_sim_tokens, "addToPre")
            || references_identifier(&self.wu_event_tokens, "addToPre")
            || references_identifier(&self.wu_synapse_dynamics_tokens, "addToPre")
    }

    pub fn is_spike_event_required(&self) -> bool {
        !is_code_empty(&self.wu_event_threshold_tokens)
    }

    pub fn is_true_spike_required(&self) -> bool {
        !is_code_empty(&self.wu_sim_tokens)
    }

    pub fn is_postsynaptic_learning_required(&self) -> bool {
        !is_code_empty(&self.wu_learn_post_tokens)
    }

    pub fn is_synapse_dynamics_required(&self) -> bool {
        !is_code_empty(&self.wu_synapse_dynamics_tokens)
    }

    /// Sparse groups with postsynaptic learning need column-major back references
    pub fn is_col_structure_required(&self) -> bool {
        self.is_sparse() && self.is_postsynaptic_learning_required()
    }

    /// Are variables stored per synapse rather than baked in or kernel-shared
    pub fn has_individual_weights(&self) -> bool {
        self.matrix_type.weight == MatrixWeight::Individual
    }

    pub fn has_kernel_weights(&self) -> bool {
        self.matrix_type.weight == MatrixWeight::Kernel
    }

    /// Does weight update code reference an identifier in any code string
    pub fn wu_references(&self, name: &str) -> bool {
        [
            &self.wu_sim_tokens, &self.wu_event_tokens, &self.wu_learn_post_tokens,
            &self.wu_synapse_dynamics_tokens, &self.wu_event_threshold_tokens,
        ].iter().any(|tokens| references_identifier(tokens, name))
    }

    /// Number of elements allocated per row of synaptic arrays, bitmask rows are padded to whole words
    pub fn row_stride(&self) -> usize {
        match self.matrix_type.connectivity {
            MatrixConnectivity::Sparse | MatrixConnectivity::Toeplitz => self.max_connections,
            MatrixConnectivity::Bitmask => crate::utils::pad_size(self.num_trg_neurons, 32),
            _ => self.num_trg_neurons,
        }
    }

    /// Number of elements allocated per column of the column-major back references
    pub fn col_stride(&self) -> usize {
        self.max_source_connections
    }

    /// Number of elements in the weight kernel
    pub fn flattened_kernel_size(&self) -> usize {
        self.kernel_size.iter().product()
    }

    pub fn get_wu_param_value(&self, name: &str) -> Option<f64> {
        self.wu_params.get(name).or_else(|| self.wu_derived_params.get(name)).copied()
    }

    pub fn get_ps_param_value(&self, name: &str) -> Option<f64> {
        self.ps_params.get(name).or_else(|| self.ps_derived_params.get(name)).copied()
    }

    pub(crate) fn finalise(&mut self, dt: f64) -> Result<(), FrontEndError> {
        self.wu_derived_params = self.wu_model.snippet.calc_derived_params(&self.wu_params, dt);
        self.ps_derived_params = self.ps_model.snippet.calc_derived_params(&self.ps_params, dt);
        for var_init in self.wu_var_initialisers.values_mut().chain(self.ps_var_initialisers.values_mut()) {
            var_init.finalise(dt);
        }

        if let Some(connectivity_initialiser) = self.connectivity_initialiser.as_mut() {
            connectivity_initialiser.finalise(dt);
            if !self.max_connections_set {
                if let Some(max) = connectivity_initialiser.max_row_length(self.num_src_neurons, self.num_trg_neurons) {
                    self.max_connections = max;
                }
            }
            if !self.max_source_connections_set {
                if let Some(max) = connectivity_initialiser.max_col_length(self.num_src_neurons, self.num_trg_neurons) {
                    self.max_source_connections = max;
                }
            }
        }

        if let Some(toeplitz_initialiser) = self.toeplitz_initialiser.as_mut() {
            toeplitz_initialiser.finalise(dt);
            if let Some(max) = toeplitz_initialiser.max_row_length(self.num_src_neurons, self.num_trg_neurons) {
                self.max_connections = max;
            }
            self.kernel_size = toeplitz_initialiser.kernel_size();
        }

        let description = self.description();
        let scan = |code: &str, kind: &str| scan_group_code(code, &format!("{} {}", description, kind));
        self.wu_sim_tokens = scan(&self.wu_model.sim_code, "weight update sim code")?;
        self.wu_event_tokens = scan(&self.wu_model.event_code, "weight update event code")?;
        self.wu_learn_post_tokens = scan(&self.wu_model.learn_post_code, "weight update learn post code")?;
        self.wu_synapse_dynamics_tokens = scan(&self.wu_model.synapse_dynamics_code, "weight update synapse dynamics code")?;
        self.wu_event_threshold_tokens = scan(
            &self.wu_model.event_threshold_condition_code,
            "weight update event threshold condition code",
        )?;
        self.ps_apply_input_tokens = scan(&self.ps_model.apply_input_code, "postsynaptic apply input code")?;
        self.ps_decay_tokens = scan(&self.ps_model.decay_code, "postsynaptic decay code")?;

        Ok(())
    }

    /// Checks options which can only be validated once code has been scanned
    pub(crate) fn validate_finalised(&self) -> Result<(), ConfigurationError> {
        let connectivity = self.matrix_type.connectivity;
        if matches!(connectivity, MatrixConnectivity::Procedural) && self.connectivity_initialiser.is_none() {
            return Err(ConfigurationError::Unsupported(format!(
                "{} has procedural connectivity but no connectivity initialiser", self.description()
            )));
        }
        if connectivity == MatrixConnectivity::Toeplitz && self.toeplitz_initialiser.is_none() {
            return Err(ConfigurationError::Unsupported(format!(
                "{} has Toeplitz connectivity but no Toeplitz initialiser", self.description()
            )));
        }
        if self.has_kernel_weights() && self.kernel_size.is_empty() {
            return Err(ConfigurationError::Unsupported(format!(
                "{} has kernel weights but no kernel size", self.description()
            )));
        }
        if self.has_kernel_weights() && !matches!(connectivity, MatrixConnectivity::Toeplitz | MatrixConnectivity::Procedural) {
            return Err(ConfigurationError::Unsupported(format!(
                "{} has kernel weights which require Toeplitz or procedural connectivity", self.description()
            )));
        }
        if !matches!(connectivity, MatrixConnectivity::Dense | MatrixConnectivity::Sparse)
            && (self.is_postsynaptic_learning_required() || self.is_synapse_dynamics_required())
        {
            return Err(ConfigurationError::Unsupported(format!(
                "{} uses postsynaptic learning or synapse dynamics which require dense or sparse connectivity",
                self.description()
            )));
        }

        Ok(())
    }

    fn hash_connectivity_shape(&self, hasher: &mut Sha256) {
        self.matrix_type.hash_id().update_hash(hasher);
        self.connectivity_initialiser.as_ref().map(|c| c.hash_digest()).update_hash(hasher);
        self.toeplitz_initialiser.as_ref().map(|c| c.hash_digest()).update_hash(hasher);
        self.kernel_size.len().update_hash(hasher);
    }

    /// Digest of everything which changes the presynaptic, postsynaptic and synapse dynamics code
    pub fn wu_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.wu_model.hash_digest().update_hash(&mut hasher);
        self.hash_connectivity_shape(&mut hasher);
        self.wu_dynamic_params.iter().collect::<Vec<_>>().update_hash(&mut hasher);
        (self.span_type as u8).update_hash(&mut hasher);
        self.num_threads_per_spike.update_hash(&mut hasher);
        (self.axonal_delay_steps > 0).update_hash(&mut hasher);
        (self.back_prop_delay_steps > 0).update_hash(&mut hasher);
        self.is_dendritic_delay_required().update_hash(&mut hasher);

        // Weights baked into code must match exactly
        if self.matrix_type.weight == MatrixWeight::Global {
            for var in &self.wu_model.vars {
                self.wu_var_initialisers.get(&var.name)
                    .and_then(|init| init.get_value("constant"))
                    .update_hash(&mut hasher);
            }
        }

        finish_hash(hasher)
    }

    /// Digest of the postsynaptic model, used to merge inputs into the target neuron update
    pub fn ps_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.ps_model.hash_digest().update_hash(&mut hasher);
        self.ps_dynamic_params.iter().collect::<Vec<_>>().update_hash(&mut hasher);
        self.is_dendritic_delay_required().update_hash(&mut hasher);
        self.max_dendritic_delay_timesteps.update_hash(&mut hasher);

        finish_hash(hasher)
    }

    /// Digest of presynaptic output, used by the source neuron update
    pub fn pre_output_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.is_pre_output_required().update_hash(&mut hasher);

        finish_hash(hasher)
    }

    /// Digest of the event threshold, used by the source neuron update
    pub fn event_threshold_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.wu_model.event_threshold_condition_code.update_hash(&mut hasher);
        self.wu_model.snippet.update_hash(&mut hasher);
        self.wu_dynamic_params.iter().collect::<Vec<_>>().update_hash(&mut hasher);

        finish_hash(hasher)
    }

    /// Digest of the per-synapse variable and postsynaptic variable initialisation
    pub fn init_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.matrix_type.hash_id().update_hash(&mut hasher);
        self.kernel_size.len().update_hash(&mut hasher);
        for (name, var_init) in &self.wu_var_initialisers {
            name.update_hash(&mut hasher);
            var_init.hash_digest().update_hash(&mut hasher);
        }
        for (name, var_init) in &self.ps_var_initialisers {
            name.update_hash(&mut hasher);
            var_init.hash_digest().update_hash(&mut hasher);
        }
        self.is_dendritic_delay_required().update_hash(&mut hasher);

        finish_hash(hasher)
    }

    /// Digest of the connectivity initialisation code
    pub fn connectivity_init_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.hash_connectivity_shape(&mut hasher);
        self.is_col_structure_required().update_hash(&mut hasher);

        finish_hash(hasher)
    }

    pub fn dendritic_delay_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.is_dendritic_delay_required().update_hash(&mut hasher);

        finish_hash(hasher)
    }
}
