//! TOML model descriptions, for example
//!
//! ```toml
//! name = "va_benchmark"
//! dt = 0.1
//!
//! [[neurons]]
//! name = "E"
//! size = 3200
//! model = "LIF"
//! params = { C = 1.0, TauM = 20.0, Vrest = -60.0, Vreset = -60.0, Vthresh = -50.0, Ioffset = 0.0, TauRefrac = 5.0 }
//! vars = { V = { snippet = "Uniform", params = { min = -60.0, max = -50.0 } }, RefracTime = 0.0 }
//!
//! [[synapses]]
//! name = "EE"
//! matrix_type = "SPARSE_GLOBALG"
//! source = "E"
//! target = "E"
//! weight_update = { model = "StaticPulse", vars = { g = 0.0004 } }
//! postsynaptic = { model = "ExpCurr", params = { tau = 5.0 } }
//! connectivity = { snippet = "FixedProbability", params = { prob = 0.02 } }
//! ```
//!
//! Models are looked up among the models declared in the file first and the
//! built in library second.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use serde::Deserialize;
use crate::error::{ConfigurationError, SpikeCodegenError};
use crate::groups::{
    ConnectivityInit, MatrixConnectivity, MatrixType, ModelSpec, PostsynapticInit, SpanType, VarReference,
    WUVarReference, WeightUpdateInit,
};
use crate::models::{
    current_source_models, custom_update_models, init_sparse_connectivity_snippets,
    init_toeplitz_snippets, init_var_snippets, neuron_models, postsynaptic_models,
    weight_update_models, AdditionalInputVar, CurrentSourceModel, CustomUpdateModel, EGP,
    NeuronModel, ParamValues, PostsynapticModel, SnippetBase, SparseConnectivityInit,
    ToeplitzConnectivityInit, Var, VarAccess, VarAccessMode, VarInit, VarRef, WeightUpdateModel,
};
use crate::types::{parse_type, ResolvedType, TypeContext};


fn default_var_type() -> String {
    "scalar".to_string()
}

fn default_dt() -> f64 {
    0.1
}

fn default_batch_size() -> usize {
    1
}

fn default_precision() -> String {
    "float".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AccessDescription {
    #[default]
    ReadWrite,
    ReadOnly,
    ReadOnlyDuplicate,
    ReadOnlySharedNeuron,
    ReduceBatchSum,
    ReduceBatchMax,
    ReduceNeuronSum,
    ReduceNeuronMax,
}

impl From<AccessDescription> for VarAccess {
    fn from(access: AccessDescription) -> Self {
        match access {
            AccessDescription::ReadWrite => VarAccess::ReadWrite,
            AccessDescription::ReadOnly => VarAccess::ReadOnly,
            AccessDescription::ReadOnlyDuplicate => VarAccess::ReadOnlyDuplicate,
            AccessDescription::ReadOnlySharedNeuron => VarAccess::ReadOnlySharedNeuron,
            AccessDescription::ReduceBatchSum => VarAccess::ReduceBatchSum,
            AccessDescription::ReduceBatchMax => VarAccess::ReduceBatchMax,
            AccessDescription::ReduceNeuronSum => VarAccess::ReduceNeuronSum,
            AccessDescription::ReduceNeuronMax => VarAccess::ReduceNeuronMax,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RefAccessDescription {
    #[default]
    ReadWrite,
    ReadOnly,
    ReduceSum,
    ReduceMax,
}

impl From<RefAccessDescription> for VarAccessMode {
    fn from(access: RefAccessDescription) -> Self {
        match access {
            RefAccessDescription::ReadWrite => VarAccessMode::ReadWrite,
            RefAccessDescription::ReadOnly => VarAccessMode::ReadOnly,
            RefAccessDescription::ReduceSum => VarAccessMode::ReduceSum,
            RefAccessDescription::ReduceMax => VarAccessMode::ReduceMax,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VarDescription {
    name: String,
    #[serde(rename = "type", default = "default_var_type")]
    ty: String,
    #[serde(default)]
    access: AccessDescription,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VarRefDescription {
    name: String,
    #[serde(rename = "type", default = "default_var_type")]
    ty: String,
    #[serde(default)]
    access: RefAccessDescription,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EGPDescription {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdditionalInputDescription {
    name: String,
    #[serde(rename = "type", default = "default_var_type")]
    ty: String,
    #[serde(default)]
    init_value: f64,
}

/// Declarations shared by every user defined model
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnippetDescription {
    params: Vec<String>,
    extra_global_params: Vec<EGPDescription>,
    vars: Vec<VarDescription>,
}

impl SnippetDescription {
    fn snippet(&self) -> SnippetBase {
        let params: Vec<&str> = self.params.iter().map(|p| p.as_str()).collect();
        let egps = self.extra_global_params.iter().map(|e| EGP::new(&e.name, &e.ty)).collect();

        SnippetBase::new(&params, vec![], egps)
    }

    fn vars(&self) -> Vec<Var> {
        self.vars.iter().map(|v| Var::new(&v.name, &v.ty, v.access.into())).collect()
    }
}

#[derive(Debug, Deserialize)]
struct NeuronModelDescription {
    name: String,
    #[serde(flatten)]
    declarations: SnippetDescription,
    #[serde(default)]
    additional_input_vars: Vec<AdditionalInputDescription>,
    #[serde(default)]
    sim_code: String,
    #[serde(default)]
    threshold_condition_code: String,
    #[serde(default)]
    reset_code: String,
}

#[derive(Debug, Deserialize)]
struct WeightUpdateModelDescription {
    name: String,
    #[serde(flatten)]
    declarations: SnippetDescription,
    #[serde(default)]
    sim_code: String,
    #[serde(default)]
    event_code: String,
    #[serde(default)]
    learn_post_code: String,
    #[serde(default)]
    synapse_dynamics_code: String,
    #[serde(default)]
    event_threshold_condition_code: String,
}

#[derive(Debug, Deserialize)]
struct PostsynapticModelDescription {
    name: String,
    #[serde(flatten)]
    declarations: SnippetDescription,
    #[serde(default)]
    apply_input_code: String,
    #[serde(default)]
    decay_code: String,
}

#[derive(Debug, Deserialize)]
struct CurrentSourceModelDescription {
    name: String,
    #[serde(flatten)]
    declarations: SnippetDescription,
    #[serde(default)]
    injection_code: String,
}

#[derive(Debug, Deserialize)]
struct CustomUpdateModelDescription {
    name: String,
    #[serde(flatten)]
    declarations: SnippetDescription,
    #[serde(default)]
    var_refs: Vec<VarRefDescription>,
    #[serde(default)]
    update_code: String,
}

/// Variable initialiser, either a bare constant or a snippet with parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VarInitDescription {
    Constant(f64),
    Snippet {
        snippet: String,
        #[serde(default)]
        params: ParamValues,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NeuronPopulationDescription {
    name: String,
    size: usize,
    model: String,
    #[serde(default)]
    params: ParamValues,
    #[serde(default)]
    vars: BTreeMap<String, VarInitDescription>,
    #[serde(default)]
    dynamic_params: Vec<String>,
    #[serde(default)]
    record_spikes: bool,
    #[serde(default)]
    record_spike_events: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelInitDescription {
    model: String,
    #[serde(default)]
    params: ParamValues,
    #[serde(default)]
    vars: BTreeMap<String, VarInitDescription>,
    #[serde(default)]
    dynamic_params: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConnectivityDescription {
    snippet: String,
    #[serde(default)]
    params: ParamValues,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SpanDescription {
    Postsynaptic,
    Presynaptic,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SynapsePopulationDescription {
    name: String,
    matrix_type: String,
    source: String,
    target: String,
    weight_update: ModelInitDescription,
    postsynaptic: ModelInitDescription,
    connectivity: Option<ConnectivityDescription>,
    #[serde(default)]
    axonal_delay_steps: usize,
    #[serde(default)]
    back_prop_delay_steps: usize,
    max_dendritic_delay_timesteps: Option<usize>,
    max_connections: Option<usize>,
    max_source_connections: Option<usize>,
    kernel_size: Option<Vec<usize>>,
    span_type: Option<SpanDescription>,
    num_threads_per_spike: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CurrentSourceDescription {
    name: String,
    target: String,
    model: String,
    #[serde(default)]
    params: ParamValues,
    #[serde(default)]
    vars: BTreeMap<String, VarInitDescription>,
    #[serde(default)]
    dynamic_params: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
enum VarReferenceDescription {
    Neuron { group: String, var: String },
    CurrentSource { group: String, var: String },
    CustomUpdate { group: String, var: String },
}

impl From<&VarReferenceDescription> for VarReference {
    fn from(reference: &VarReferenceDescription) -> Self {
        match reference {
            VarReferenceDescription::Neuron { group, var } => VarReference::neuron(group, var),
            VarReferenceDescription::CurrentSource { group, var } => VarReference::current_source(group, var),
            VarReferenceDescription::CustomUpdate { group, var } => VarReference::custom_update(group, var),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WUVarReferenceDescription {
    synapse_group: String,
    var: String,
    transpose_synapse_group: Option<String>,
    transpose_var: Option<String>,
}

impl From<&WUVarReferenceDescription> for WUVarReference {
    fn from(reference: &WUVarReferenceDescription) -> Self {
        WUVarReference {
            synapse_group: reference.synapse_group.clone(),
            var: reference.var.clone(),
            transpose_synapse_group: reference.transpose_synapse_group.clone(),
            transpose_var: reference.transpose_var.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomUpdateDescription<R> {
    name: String,
    group: String,
    model: String,
    #[serde(default)]
    params: ParamValues,
    #[serde(default)]
    vars: BTreeMap<String, VarInitDescription>,
    var_refs: BTreeMap<String, R>,
    #[serde(default)]
    dynamic_params: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelDescription {
    name: String,
    #[serde(default = "default_precision")]
    precision: String,
    time_precision: Option<String>,
    #[serde(default = "default_dt")]
    dt: f64,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default)]
    seed: u64,

    #[serde(default)]
    neuron_models: Vec<NeuronModelDescription>,
    #[serde(default)]
    weight_update_models: Vec<WeightUpdateModelDescription>,
    #[serde(default)]
    postsynaptic_models: Vec<PostsynapticModelDescription>,
    #[serde(default)]
    current_source_models: Vec<CurrentSourceModelDescription>,
    #[serde(default)]
    custom_update_models: Vec<CustomUpdateModelDescription>,

    #[serde(default)]
    neurons: Vec<NeuronPopulationDescription>,
    #[serde(default)]
    synapses: Vec<SynapsePopulationDescription>,
    #[serde(default)]
    current_sources: Vec<CurrentSourceDescription>,
    #[serde(default)]
    custom_updates: Vec<CustomUpdateDescription<VarReferenceDescription>>,
    #[serde(default)]
    custom_wu_updates: Vec<CustomUpdateDescription<WUVarReferenceDescription>>,
}

/// Models declared in the file, keyed by name
#[derive(Default)]
struct ModelLibrary {
    neuron: BTreeMap<String, Arc<NeuronModel>>,
    weight_update: BTreeMap<String, Arc<WeightUpdateModel>>,
    postsynaptic: BTreeMap<String, Arc<PostsynapticModel>>,
    current_source: BTreeMap<String, Arc<CurrentSourceModel>>,
    custom_update: BTreeMap<String, Arc<CustomUpdateModel>>,
}

fn find_model<T>(
    declared: &BTreeMap<String, Arc<T>>,
    built_in: fn(&str) -> Option<Arc<T>>,
    kind: &'static str,
    name: &str,
) -> Result<Arc<T>, ConfigurationError> {
    declared.get(name).cloned()
        .or_else(|| built_in(name))
        .ok_or_else(|| ConfigurationError::UnknownGroup { kind, name: name.to_string() })
}

impl ModelLibrary {
    fn new(description: &ModelDescription) -> Self {
        let mut library = ModelLibrary::default();

        for model in &description.neuron_models {
            library.neuron.insert(model.name.clone(), Arc::new(NeuronModel {
                snippet: model.declarations.snippet(),
                vars: model.declarations.vars(),
                additional_input_vars: model.additional_input_vars.iter()
                    .map(|a| AdditionalInputVar { name: a.name.clone(), ty: a.ty.clone(), init_value: a.init_value })
                    .collect(),
                sim_code: model.sim_code.clone(),
                threshold_condition_code: model.threshold_condition_code.clone(),
                reset_code: model.reset_code.clone(),
            }));
        }
        for model in &description.weight_update_models {
            library.weight_update.insert(model.name.clone(), Arc::new(WeightUpdateModel {
                snippet: model.declarations.snippet(),
                vars: model.declarations.vars(),
                sim_code: model.sim_code.clone(),
                event_code: model.event_code.clone(),
                learn_post_code: model.learn_post_code.clone(),
                synapse_dynamics_code: model.synapse_dynamics_code.clone(),
                event_threshold_condition_code: model.event_threshold_condition_code.clone(),
            }));
        }
        for model in &description.postsynaptic_models {
            library.postsynaptic.insert(model.name.clone(), Arc::new(PostsynapticModel {
                snippet: model.declarations.snippet(),
                vars: model.declarations.vars(),
                apply_input_code: model.apply_input_code.clone(),
                decay_code: model.decay_code.clone(),
            }));
        }
        for model in &description.current_source_models {
            library.current_source.insert(model.name.clone(), Arc::new(CurrentSourceModel {
                snippet: model.declarations.snippet(),
                vars: model.declarations.vars(),
                injection_code: model.injection_code.clone(),
            }));
        }
        for model in &description.custom_update_models {
            library.custom_update.insert(model.name.clone(), Arc::new(CustomUpdateModel {
                snippet: model.declarations.snippet(),
                vars: model.declarations.vars(),
                var_refs: model.var_refs.iter().map(|r| VarRef::new(&r.name, &r.ty, r.access.into())).collect(),
                update_code: model.update_code.clone(),
            }));
        }

        library
    }
}

fn var_initialisers(
    descriptions: &BTreeMap<String, VarInitDescription>,
) -> Result<BTreeMap<String, VarInit>, ConfigurationError> {
    descriptions.iter()
        .map(|(name, description)| {
            let init = match description {
                VarInitDescription::Constant(value) => VarInit::constant(*value),
                VarInitDescription::Snippet { snippet, params } => {
                    let snippet = init_var_snippets::get_init_var_snippet(snippet)
                        .ok_or_else(|| ConfigurationError::UnknownGroup {
                            kind: "variable initialisation snippet",
                            name: snippet.clone(),
                        })?;
                    VarInit::new(snippet, params.clone())
                },
            };

            Ok((name.clone(), init))
        })
        .collect()
}

fn parse_precision(name: &str) -> Result<ResolvedType, ConfigurationError> {
    parse_type(name, &TypeContext::default())
        .ok_or_else(|| ConfigurationError::Unsupported(format!("Unknown precision '{}'", name)))
}

fn connectivity_init(
    description: &Option<ConnectivityDescription>,
    matrix_type: &MatrixType,
) -> Result<ConnectivityInit, ConfigurationError> {
    let Some(description) = description else {
        return Ok(ConnectivityInit::Uninitialised);
    };

    if matrix_type.connectivity == MatrixConnectivity::Toeplitz {
        let snippet = init_toeplitz_snippets::get_toeplitz_snippet(&description.snippet)
            .ok_or_else(|| ConfigurationError::UnknownGroup {
                kind: "Toeplitz connectivity snippet",
                name: description.snippet.clone(),
            })?;
        return Ok(ConnectivityInit::Toeplitz(ToeplitzConnectivityInit::new(snippet, description.params.clone())));
    }

    let snippet = init_sparse_connectivity_snippets::get_sparse_connectivity_snippet(&description.snippet)
        .ok_or_else(|| ConfigurationError::UnknownGroup {
            kind: "sparse connectivity snippet",
            name: description.snippet.clone(),
        })?;

    Ok(ConnectivityInit::Sparse(SparseConnectivityInit::new(snippet, description.params.clone())))
}

fn build_model(description: ModelDescription) -> Result<ModelSpec, ConfigurationError> {
    let library = ModelLibrary::new(&description);

    let mut model = ModelSpec::new(&description.name);
    model.set_precision(parse_precision(&description.precision)?)?;
    if let Some(time_precision) = &description.time_precision {
        model.set_time_precision(parse_precision(time_precision)?)?;
    }
    model.set_dt(description.dt)?;
    model.set_batch_size(description.batch_size)?;
    model.set_seed(description.seed);

    for pop in &description.neurons {
        let neuron_model = find_model(&library.neuron, neuron_models::get_neuron_model, "neuron model", &pop.model)?;
        let group = model.add_neuron_population(
            &pop.name, pop.size, neuron_model, pop.params.clone(), var_initialisers(&pop.vars)?,
        )?;
        group.set_spike_recording_enabled(pop.record_spikes);
        group.set_spike_event_recording_enabled(pop.record_spike_events);
        for param in &pop.dynamic_params {
            group.set_param_dynamic(param, true)?;
        }
    }

    for syn in &description.synapses {
        let matrix_type = MatrixType::from_name(&syn.matrix_type)
            .ok_or_else(|| ConfigurationError::Unsupported(format!("Unknown matrix type '{}'", syn.matrix_type)))?;
        let wu = WeightUpdateInit::new(
            find_model(&library.weight_update, weight_update_models::get_weight_update_model, "weight update model", &syn.weight_update.model)?,
            syn.weight_update.params.clone(),
            var_initialisers(&syn.weight_update.vars)?,
        );
        let ps = PostsynapticInit::new(
            find_model(&library.postsynaptic, postsynaptic_models::get_postsynaptic_model, "postsynaptic model", &syn.postsynaptic.model)?,
            syn.postsynaptic.params.clone(),
            var_initialisers(&syn.postsynaptic.vars)?,
        );
        let connectivity = connectivity_init(&syn.connectivity, &matrix_type)?;

        let group = model.add_synapse_population(&syn.name, matrix_type, &syn.source, &syn.target, wu, ps, connectivity)?;
        group.set_axonal_delay_steps(syn.axonal_delay_steps);
        group.set_back_prop_delay_steps(syn.back_prop_delay_steps);
        if let Some(timesteps) = syn.max_dendritic_delay_timesteps {
            group.set_max_dendritic_delay_timesteps(timesteps);
        }
        if let Some(max_connections) = syn.max_connections {
            group.set_max_connections(max_connections)?;
        }
        if let Some(max_connections) = syn.max_source_connections {
            group.set_max_source_connections(max_connections)?;
        }
        if let Some(kernel_size) = &syn.kernel_size {
            group.set_kernel_size(kernel_size.clone())?;
        }
        if let Some(span_type) = syn.span_type {
            group.set_span_type(match span_type {
                SpanDescription::Postsynaptic => SpanType::Postsynaptic,
                SpanDescription::Presynaptic => SpanType::Presynaptic,
            });
        }
        if let Some(num_threads) = syn.num_threads_per_spike {
            group.set_num_threads_per_spike(num_threads);
        }
        for param in &syn.weight_update.dynamic_params {
            group.set_wu_param_dynamic(param, true)?;
        }
        for param in &syn.postsynaptic.dynamic_params {
            group.set_ps_param_dynamic(param, true)?;
        }
    }

    for cs in &description.current_sources {
        let cs_model = find_model(
            &library.current_source, current_source_models::get_current_source_model, "current source model", &cs.model,
        )?;
        let group = model.add_current_source(&cs.name, cs_model, &cs.target, cs.params.clone(), var_initialisers(&cs.vars)?)?;
        for param in &cs.dynamic_params {
            group.set_param_dynamic(param, true)?;
        }
    }

    for cu in &description.custom_updates {
        let cu_model = find_model(
            &library.custom_update, custom_update_models::get_custom_update_model, "custom update model", &cu.model,
        )?;
        let refs = cu.var_refs.iter().map(|(name, r)| (name.clone(), r.into())).collect();
        let group = model.add_custom_update(&cu.name, &cu.group, cu_model, cu.params.clone(), var_initialisers(&cu.vars)?, refs)?;
        for param in &cu.dynamic_params {
            group.set_param_dynamic(param, true)?;
        }
    }

    for cu in &description.custom_wu_updates {
        let cu_model = find_model(
            &library.custom_update, custom_update_models::get_custom_update_model, "custom update model", &cu.model,
        )?;
        let refs = cu.var_refs.iter().map(|(name, r)| (name.clone(), r.into())).collect();
        let group = model.add_custom_update_wu(&cu.name, &cu.group, cu_model, cu.params.clone(), var_initialisers(&cu.vars)?, refs)?;
        for param in &cu.dynamic_params {
            group.set_param_dynamic(param, true)?;
        }
    }

    tracing::debug!(
        "loaded model '{}' with {} neuron groups and {} synapse groups",
        model.name, model.neuron_groups.len(), model.synapse_groups.len(),
    );

    Ok(model)
}

/// Builds an unfinalised model from a TOML description
pub fn parse_model(contents: &str) -> Result<ModelSpec, SpikeCodegenError> {
    let description: ModelDescription = toml::from_str(contents)?;

    Ok(build_model(description)?)
}

pub fn load_model(path: &Path) -> Result<ModelSpec, SpikeCodegenError> {
    let contents = std::fs::read_to_string(path)?;
    parse_model(&contents)
}

#[cfg(test)]
mod tests {
    use crate::error::{ConfigurationError, SpikeCodegenError};
    use crate::groups::MatrixConnectivity;
    use super::parse_model;

    const MODEL: &str = r#"
        name = "small"
        dt = 0.5
        batch_size = 2

        [[neuron_models]]
        name = "Leaky"
        params = ["tau"]
        vars = [{ name = "V" }, { name = "Count", type = "unsigned int", access = "read_only" }]
        sim_code = "V += (-V + Isyn) * (dt / tau);"
        threshold_condition_code = "V > 1.0"
        reset_code = "V = 0.0;"

        [[neurons]]
        name = "In"
        size = 10
        model = "Leaky"
        params = { tau = 10 }
        vars = { V = { snippet = "Uniform", params = { min = 0.0, max = 1.0 } }, Count = 0 }
        record_spikes = true

        [[neurons]]
        name = "Out"
        size = 5
        model = "Leaky"
        params = { tau = 20.0 }
        vars = { V = 0.0, Count = 0 }
        dynamic_params = ["tau"]

        [[synapses]]
        name = "InOut"
        matrix_type = "SPARSE_INDIVIDUALG"
        source = "In"
        target = "Out"
        axonal_delay_steps = 2
        weight_update = { model = "StaticPulse", vars = { g = 0.5 } }
        postsynaptic = { model = "DeltaCurr" }
        connectivity = { snippet = "FixedProbability", params = { prob = 0.5 } }
    "#;

    #[test]
    fn test_model_populations_are_built() {
        let model = parse_model(MODEL).unwrap();

        assert_eq!(model.name, "small");
        assert_eq!(model.dt, 0.5);
        assert_eq!(model.batch_size, 2);
        assert_eq!(model.neuron_groups.len(), 2);
        assert!(model.get_neuron_group("In").unwrap().spike_recording_enabled);
        assert_eq!(model.get_neuron_group("Out").unwrap().model.vars.len(), 2);

        let synapses = model.get_synapse_group("InOut").unwrap();
        assert_eq!(synapses.matrix_type.connectivity, MatrixConnectivity::Sparse);
        assert_eq!(synapses.axonal_delay_steps, 2);
        assert!(synapses.connectivity_initialiser.is_some());
    }

    #[test]
    fn test_unknown_model_is_reported() {
        let error = parse_model("name = \"m\"\n[[neurons]]\nname = \"A\"\nsize = 1\nmodel = \"Hodgkin\"\n").unwrap_err();

        match error {
            SpikeCodegenError::ConfigurationRelatedError(ConfigurationError::UnknownGroup { kind, name }) => {
                assert_eq!(kind, "neuron model");
                assert_eq!(name, "Hodgkin");
            },
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        assert!(matches!(parse_model("name = "), Err(SpikeCodegenError::ConfigParseError(_))));
    }
}
