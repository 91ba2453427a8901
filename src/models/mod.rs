//! Model snippets describing the code, parameters and state of neurons,
//! synapses, current sources and custom updates, along with the built in
//! library of common models.

pub mod neuron_models;
pub mod weight_update_models;
pub mod postsynaptic_models;
pub mod current_source_models;
pub mod custom_update_models;
pub mod init_var_snippets;
pub mod init_sparse_connectivity_snippets;
pub mod init_toeplitz_snippets;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use sha2::{Sha256, Digest};
use crate::error::ConfigurationError;
use crate::utils::{UpdateHash, HashDigest, finish_hash, validate_var_name};


/// Parameter values keyed by parameter name
pub type ParamValues = BTreeMap<String, f64>;

/// Calculates a derived parameter from parameter values and the timestep
pub type DerivedParamFunc = fn(&ParamValues, f64) -> f64;

/// Calculates a maximum row or column length from population sizes and parameters
pub type CalcMaxLengthFunc = fn(usize, usize, &ParamValues) -> usize;

/// Calculates the dimensions of a weight kernel from parameters
pub type CalcKernelSizeFunc = fn(&ParamValues) -> Vec<usize>;

#[derive(Clone)]
pub struct DerivedParam {
    pub name: String,
    pub func: DerivedParamFunc,
}

impl DerivedParam {
    pub fn new(name: &str, func: DerivedParamFunc) -> Self {
        DerivedParam { name: name.to_string(), func }
    }
}

impl Debug for DerivedParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DerivedParam({})", self.name)
    }
}

/// Operation used to fold a reduction variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionOperation {
    Sum,
    Max,
}

impl ReductionOperation {
    /// Identity element written as code for a given type name
    pub fn initial_value(&self, type_name: &str) -> String {
        match self {
            ReductionOperation::Sum => "0".to_string(),
            ReductionOperation::Max => {
                match type_name {
                    "float" => "-FLT_MAX".to_string(),
                    "double" => "-DBL_MAX".to_string(),
                    "int32_t" => "INT_MIN".to_string(),
                    _ => "0".to_string(),
                }
            },
        }
    }

    /// Code folding `value` into `reduction`
    pub fn fold(&self, reduction: &str, value: &str, type_name: &str) -> String {
        match self {
            ReductionOperation::Sum => format!("{} + {}", reduction, value),
            ReductionOperation::Max => {
                if type_name == "float" || type_name == "double" {
                    format!("fmax({}, {})", reduction, value)
                } else {
                    format!("max({}, {})", reduction, value)
                }
            },
        }
    }
}

/// How a variable is accessed and whether it is duplicated across batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarAccess {
    ReadWrite,
    /// Read only and shared between batches
    ReadOnly,
    /// Read only but one copy per batch
    ReadOnlyDuplicate,
    /// Read only, one value per batch shared by every neuron
    ReadOnlySharedNeuron,
    ReduceBatchSum,
    ReduceBatchMax,
    ReduceNeuronSum,
    ReduceNeuronMax,
}

impl VarAccess {
    pub fn is_read_only(&self) -> bool {
        matches!(self, VarAccess::ReadOnly | VarAccess::ReadOnlyDuplicate | VarAccess::ReadOnlySharedNeuron)
    }

    /// Is there one copy of the variable per batch
    pub fn is_duplicated(&self) -> bool {
        !matches!(self, VarAccess::ReadOnly | VarAccess::ReduceBatchSum | VarAccess::ReduceBatchMax)
    }

    /// Is one value shared between every element of the population
    pub fn is_shared_neuron(&self) -> bool {
        matches!(self, VarAccess::ReadOnlySharedNeuron | VarAccess::ReduceNeuronSum | VarAccess::ReduceNeuronMax)
    }

    pub fn reduction(&self) -> Option<ReductionOperation> {
        match self {
            VarAccess::ReduceBatchSum | VarAccess::ReduceNeuronSum => Some(ReductionOperation::Sum),
            VarAccess::ReduceBatchMax | VarAccess::ReduceNeuronMax => Some(ReductionOperation::Max),
            _ => None,
        }
    }

    pub fn is_batch_reduction(&self) -> bool {
        matches!(self, VarAccess::ReduceBatchSum | VarAccess::ReduceBatchMax)
    }

    pub fn is_neuron_reduction(&self) -> bool {
        matches!(self, VarAccess::ReduceNeuronSum | VarAccess::ReduceNeuronMax)
    }

    fn hash_id(&self) -> u8 {
        *self as u8
    }
}

/// Access to a variable through a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarAccessMode {
    ReadWrite,
    ReadOnly,
    ReduceSum,
    ReduceMax,
}

impl VarAccessMode {
    pub fn is_read_only(&self) -> bool {
        matches!(self, VarAccessMode::ReadOnly)
    }

    pub fn reduction(&self) -> Option<ReductionOperation> {
        match self {
            VarAccessMode::ReduceSum => Some(ReductionOperation::Sum),
            VarAccessMode::ReduceMax => Some(ReductionOperation::Max),
            _ => None,
        }
    }
}

/// Model state variable
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: String,
    pub ty: String,
    pub access: VarAccess,
}

impl Var {
    pub fn new(name: &str, ty: &str, access: VarAccess) -> Self {
        Var { name: name.to_string(), ty: ty.to_string(), access }
    }

    pub fn read_write(name: &str, ty: &str) -> Self {
        Var::new(name, ty, VarAccess::ReadWrite)
    }

    pub fn read_only(name: &str, ty: &str) -> Self {
        Var::new(name, ty, VarAccess::ReadOnly)
    }
}

impl UpdateHash for Var {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.name.update_hash(hasher);
        self.ty.update_hash(hasher);
        self.access.hash_id().update_hash(hasher);
    }
}

/// Reference to a variable belonging to another group
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    pub ty: String,
    pub access: VarAccessMode,
}

impl VarRef {
    pub fn new(name: &str, ty: &str, access: VarAccessMode) -> Self {
        VarRef { name: name.to_string(), ty: ty.to_string(), access }
    }
}

impl UpdateHash for VarRef {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.name.update_hash(hasher);
        self.ty.update_hash(hasher);
        (self.access as u8).update_hash(hasher);
    }
}

/// Extra global parameter, an array whose size is only known at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct EGP {
    pub name: String,
    /// Pointer type such as `scalar*`
    pub ty: String,
}

impl EGP {
    pub fn new(name: &str, ty: &str) -> Self {
        EGP { name: name.to_string(), ty: ty.to_string() }
    }
}

impl UpdateHash for EGP {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.name.update_hash(hasher);
        self.ty.update_hash(hasher);
    }
}

/// Additional input variable a neuron model accumulates alongside `Isyn`
#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalInputVar {
    pub name: String,
    pub ty: String,
    pub init_value: f64,
}

/// Parameters, derived parameters and extra global parameters every snippet has
#[derive(Debug, Clone, Default)]
pub struct SnippetBase {
    pub params: Vec<String>,
    pub derived_params: Vec<DerivedParam>,
    pub extra_global_params: Vec<EGP>,
}

impl SnippetBase {
    pub fn new(params: &[&str], derived_params: Vec<DerivedParam>, extra_global_params: Vec<EGP>) -> Self {
        SnippetBase {
            params: params.iter().map(|p| p.to_string()).collect(),
            derived_params,
            extra_global_params,
        }
    }

    pub fn validate(&self, description: &str) -> Result<(), ConfigurationError> {
        for param in &self.params {
            validate_var_name(param, &format!("{} parameter", description))?;
        }
        for derived_param in &self.derived_params {
            validate_var_name(&derived_param.name, &format!("{} derived parameter", description))?;
        }
        for egp in &self.extra_global_params {
            validate_var_name(&egp.name, &format!("{} extra global parameter", description))?;
        }

        Ok(())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }

    /// Evaluates every derived parameter in order, later ones may use earlier ones
    pub fn calc_derived_params(&self, params: &ParamValues, dt: f64) -> ParamValues {
        let mut all_params = params.clone();
        let mut derived = ParamValues::new();
        for derived_param in &self.derived_params {
            let value = (derived_param.func)(&all_params, dt);
            all_params.insert(derived_param.name.clone(), value);
            derived.insert(derived_param.name.clone(), value);
        }

        derived
    }
}

impl UpdateHash for SnippetBase {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.params.update_hash(hasher);
        let derived_names: Vec<&str> = self.derived_params.iter().map(|d| d.name.as_str()).collect();
        derived_names.update_hash(hasher);
        self.extra_global_params.update_hash(hasher);
    }
}

/// Checks a set of values holds exactly the declared names
pub fn validate_values<T>(
    declared: &[String],
    values: &BTreeMap<String, T>,
    description: &str,
    kind: &'static str,
    singular: &'static str,
) -> Result<(), ConfigurationError> {
    if declared.len() != values.len() {
        return Err(ConfigurationError::WrongNumberOfValues {
            description: description.to_string(),
            kind,
            expected: declared.len(),
            actual: values.len(),
        });
    }

    for name in declared {
        if !values.contains_key(name) {
            return Err(ConfigurationError::MissingValue {
                description: description.to_string(),
                kind: singular,
                name: name.clone(),
            });
        }
    }

    Ok(())
}

/// Checks parameter values match the declared parameters
pub fn validate_params(declared: &[String], values: &ParamValues, description: &str) -> Result<(), ConfigurationError> {
    validate_values(declared, values, description, "params", "param")
}

fn validate_vars(vars: &[Var], description: &str) -> Result<(), ConfigurationError> {
    for var in vars {
        validate_var_name(&var.name, &format!("{} variable", description))?;
    }

    Ok(())
}

fn hash_vars(vars: &[Var], hasher: &mut Sha256) {
    vars.update_hash(hasher);
}

/// Neuron model
#[derive(Debug, Clone, Default)]
pub struct NeuronModel {
    pub snippet: SnippetBase,
    pub vars: Vec<Var>,
    pub additional_input_vars: Vec<AdditionalInputVar>,
    pub sim_code: String,
    pub threshold_condition_code: String,
    pub reset_code: String,
}

impl NeuronModel {
    pub fn validate(&self, params: &ParamValues, var_inits: &BTreeMap<String, VarInit>, description: &str) -> Result<(), ConfigurationError> {
        self.snippet.validate(description)?;
        validate_vars(&self.vars, description)?;
        validate_params(&self.snippet.params, params, description)?;
        let var_names: Vec<String> = self.vars.iter().map(|v| v.name.clone()).collect();
        validate_values(&var_names, var_inits, description, "variable initialisers", "variable")?;

        for var in &self.vars {
            if var.access.reduction().is_some() {
                return Err(ConfigurationError::Unsupported(
                    "Neuron models cannot include variables with REDUCE access modes - they are only supported by custom update models".to_string()
                ));
            }
        }

        Ok(())
    }

    pub fn get_var(&self, name: &str) -> Option<&Var> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.snippet.update_hash(&mut hasher);
        hash_vars(&self.vars, &mut hasher);
        for input in &self.additional_input_vars {
            input.name.update_hash(&mut hasher);
            input.ty.update_hash(&mut hasher);
            input.init_value.update_hash(&mut hasher);
        }
        self.sim_code.update_hash(&mut hasher);
        self.threshold_condition_code.update_hash(&mut hasher);
        self.reset_code.update_hash(&mut hasher);

        finish_hash(hasher)
    }
}

/// Weight update model, code runs per synapse
#[derive(Debug, Clone, Default)]
pub struct WeightUpdateModel {
    pub snippet: SnippetBase,
    pub vars: Vec<Var>,
    pub sim_code: String,
    pub event_code: String,
    pub learn_post_code: String,
    pub synapse_dynamics_code: String,
    pub event_threshold_condition_code: String,
}

impl WeightUpdateModel {
    pub fn validate(&self, params: &ParamValues, var_inits: &BTreeMap<String, VarInit>, description: &str) -> Result<(), ConfigurationError> {
        self.snippet.validate(description)?;
        validate_vars(&self.vars, description)?;
        validate_params(&self.snippet.params, params, description)?;
        let var_names: Vec<String> = self.vars.iter().map(|v| v.name.clone()).collect();
        validate_values(&var_names, var_inits, description, "variable initialisers", "variable")?;

        for var in &self.vars {
            if var.access.reduction().is_some() {
                return Err(ConfigurationError::Unsupported(
                    "Weight update models cannot include variables with REDUCE access modes - they are only supported by custom update models".to_string()
                ));
            }
            if var.access.is_shared_neuron() {
                return Err(ConfigurationError::Unsupported(
                    "Weight update models cannot include variables with SHARED_NEURON access modes - they are only supported by custom update models".to_string()
                ));
            }
        }

        Ok(())
    }

    pub fn get_var(&self, name: &str) -> Option<&Var> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.snippet.update_hash(&mut hasher);
        hash_vars(&self.vars, &mut hasher);
        self.sim_code.update_hash(&mut hasher);
        self.event_code.update_hash(&mut hasher);
        self.learn_post_code.update_hash(&mut hasher);
        self.synapse_dynamics_code.update_hash(&mut hasher);
        self.event_threshold_condition_code.update_hash(&mut hasher);

        finish_hash(hasher)
    }
}

/// Postsynaptic model, converts accumulated input into neuron input current
#[derive(Debug, Clone, Default)]
pub struct PostsynapticModel {
    pub snippet: SnippetBase,
    pub vars: Vec<Var>,
    pub apply_input_code: String,
    pub decay_code: String,
}

impl PostsynapticModel {
    pub fn validate(&self, params: &ParamValues, var_inits: &BTreeMap<String, VarInit>, description: &str) -> Result<(), ConfigurationError> {
        self.snippet.validate(description)?;
        validate_vars(&self.vars, description)?;
        validate_params(&self.snippet.params, params, description)?;
        let var_names: Vec<String> = self.vars.iter().map(|v| v.name.clone()).collect();
        validate_values(&var_names, var_inits, description, "variable initialisers", "variable")
    }

    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.snippet.update_hash(&mut hasher);
        hash_vars(&self.vars, &mut hasher);
        self.apply_input_code.update_hash(&mut hasher);
        self.decay_code.update_hash(&mut hasher);

        finish_hash(hasher)
    }
}

/// Current source model, injects current into a neuron population
#[derive(Debug, Clone, Default)]
pub struct CurrentSourceModel {
    pub snippet: SnippetBase,
    pub vars: Vec<Var>,
    pub injection_code: String,
}

impl CurrentSourceModel {
    pub fn validate(&self, params: &ParamValues, var_inits: &BTreeMap<String, VarInit>, description: &str) -> Result<(), ConfigurationError> {
        self.snippet.validate(description)?;
        validate_vars(&self.vars, description)?;
        validate_params(&self.snippet.params, params, description)?;
        let var_names: Vec<String> = self.vars.iter().map(|v| v.name.clone()).collect();
        validate_values(&var_names, var_inits, description, "variable initialisers", "variable")
    }

    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.snippet.update_hash(&mut hasher);
        hash_vars(&self.vars, &mut hasher);
        self.injection_code.update_hash(&mut hasher);

        finish_hash(hasher)
    }
}

/// Custom update model, runs on demand over a population or synapse group
#[derive(Debug, Clone, Default)]
pub struct CustomUpdateModel {
    pub snippet: SnippetBase,
    pub vars: Vec<Var>,
    pub var_refs: Vec<VarRef>,
    pub update_code: String,
}

impl CustomUpdateModel {
    pub fn validate<R>(
        &self,
        params: &ParamValues,
        var_inits: &BTreeMap<String, VarInit>,
        var_refs: &BTreeMap<String, R>,
        description: &str,
    ) -> Result<(), ConfigurationError> {
        self.snippet.validate(description)?;
        validate_vars(&self.vars, description)?;
        validate_params(&self.snippet.params, params, description)?;
        let var_names: Vec<String> = self.vars.iter().map(|v| v.name.clone()).collect();
        validate_values(&var_names, var_inits, description, "variable initialisers", "variable")?;
        let ref_names: Vec<String> = self.var_refs.iter().map(|v| v.name.clone()).collect();
        validate_values(&ref_names, var_refs, description, "variable references", "variable reference")
    }

    pub fn get_var(&self, name: &str) -> Option<&Var> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.snippet.update_hash(&mut hasher);
        hash_vars(&self.vars, &mut hasher);
        self.var_refs.update_hash(&mut hasher);
        self.update_code.update_hash(&mut hasher);

        finish_hash(hasher)
    }
}

/// Snippet initialising a variable, code assigns to `value`
#[derive(Debug, Clone, Default)]
pub struct InitVarSnippet {
    pub snippet: SnippetBase,
    pub code: String,
}

/// Snippet building sparse connectivity by row or by column with `addSynapse`
#[derive(Debug, Clone, Default)]
pub struct InitSparseConnectivitySnippet {
    pub snippet: SnippetBase,
    pub row_build_code: String,
    pub col_build_code: String,
    pub calc_max_row_length: Option<CalcMaxLengthFunc>,
    pub calc_max_col_length: Option<CalcMaxLengthFunc>,
}

/// Snippet generating connectivity along the diagonals of a Toeplitz matrix
#[derive(Debug, Clone, Default)]
pub struct InitToeplitzConnectivitySnippet {
    pub snippet: SnippetBase,
    pub diagonal_build_code: String,
    pub calc_max_row_length: Option<CalcMaxLengthFunc>,
    pub calc_kernel_size: Option<CalcKernelSizeFunc>,
}

macro_rules! impl_initialiser {
    ($name:ident, $snippet:ty, $code_hash:expr) => {
        /// Snippet along with the parameters it is used with
        #[derive(Debug, Clone)]
        pub struct $name {
            pub snippet: Arc<$snippet>,
            pub params: ParamValues,
            pub derived_params: ParamValues,
        }

        impl $name {
            pub fn new(snippet: Arc<$snippet>, params: ParamValues) -> Self {
                $name { snippet, params, derived_params: ParamValues::new() }
            }

            pub fn validate(&self, description: &str) -> Result<(), ConfigurationError> {
                self.snippet.snippet.validate(description)?;
                validate_params(&self.snippet.snippet.params, &self.params, description)
            }

            pub fn finalise(&mut self, dt: f64) {
                self.derived_params = self.snippet.snippet.calc_derived_params(&self.params, dt);
            }

            /// Value of a parameter or derived parameter
            pub fn get_value(&self, name: &str) -> Option<f64> {
                self.params.get(name).or_else(|| self.derived_params.get(name)).copied()
            }

            /// Digest of the code and declarations, excluding parameter values
            pub fn hash_digest(&self) -> HashDigest {
                let mut hasher = Sha256::new();
                self.snippet.snippet.update_hash(&mut hasher);
                let code_hash: fn(&$snippet, &mut Sha256) = $code_hash;
                code_hash(&self.snippet, &mut hasher);

                finish_hash(hasher)
            }
        }
    };
}

impl_initialiser!(VarInit, InitVarSnippet, |s, h| s.code.update_hash(h));
impl_initialiser!(SparseConnectivityInit, InitSparseConnectivitySnippet, |s, h| {
    s.row_build_code.update_hash(h);
    s.col_build_code.update_hash(h);
});
impl_initialiser!(ToeplitzConnectivityInit, InitToeplitzConnectivitySnippet, |s, h| {
    s.diagonal_build_code.update_hash(h);
});

impl VarInit {
    /// Initialises a variable to a constant value
    pub fn constant(value: f64) -> Self {
        let mut params = ParamValues::new();
        params.insert("constant".to_string(), value);

        VarInit::new(init_var_snippets::constant(), params)
    }

    /// Uninitialised variables are left for the user to fill in on the host
    pub fn uninitialised() -> Self {
        VarInit::new(init_var_snippets::uninitialised(), ParamValues::new())
    }

    pub fn is_constant(&self) -> bool {
        self.snippet.code == init_var_snippets::CONSTANT_CODE
    }

    pub fn requires_kernel(&self) -> bool {
        !self.snippet.code.is_empty()
    }
}

impl SparseConnectivityInit {
    pub fn max_row_length(&self, num_pre: usize, num_post: usize) -> Option<usize> {
        self.snippet.calc_max_row_length.map(|f| f(num_pre, num_post, &self.params))
    }

    pub fn max_col_length(&self, num_pre: usize, num_post: usize) -> Option<usize> {
        self.snippet.calc_max_col_length.map(|f| f(num_pre, num_post, &self.params))
    }
}

impl ToeplitzConnectivityInit {
    pub fn max_row_length(&self, num_pre: usize, num_post: usize) -> Option<usize> {
        self.snippet.calc_max_row_length.map(|f| f(num_pre, num_post, &self.params))
    }

    pub fn kernel_size(&self) -> Vec<usize> {
        self.snippet.calc_kernel_size.map(|f| f(&self.params)).unwrap_or_default()
    }
}

/// Builds a parameter map from name value pairs
pub fn param_values(values: &[(&str, f64)]) -> ParamValues {
    values.iter().map(|(name, value)| (name.to_string(), *value)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_params_chain() {
        let snippet = SnippetBase::new(
            &["tau"],
            vec![
                DerivedParam::new("decay", |p, dt| (-dt / p["tau"]).exp()),
                DerivedParam::new("oneMinusDecay", |p, _| 1.0 - p["decay"]),
            ],
            vec![],
        );

        let derived = snippet.calc_derived_params(&param_values(&[("tau", 10.0)]), 1.0);
        assert!((derived["decay"] - (-0.1f64).exp()).abs() < 1e-12);
        assert!((derived["oneMinusDecay"] - (1.0 - (-0.1f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_var_access() {
        assert!(VarAccess::ReadOnly.is_read_only());
        assert!(!VarAccess::ReadOnly.is_duplicated());
        assert!(VarAccess::ReadOnlyDuplicate.is_duplicated());
        assert!(VarAccess::ReduceNeuronSum.is_shared_neuron());
        assert_eq!(VarAccess::ReduceBatchMax.reduction(), Some(ReductionOperation::Max));
        assert_eq!(ReductionOperation::Max.initial_value("float"), "-FLT_MAX");
    }

    #[test]
    fn test_constant_var_init() {
        let init = VarInit::constant(0.5);

        assert!(init.is_constant());
        assert_eq!(init.get_value("constant"), Some(0.5));
        assert!(!VarInit::uninitialised().requires_kernel());
    }
}
