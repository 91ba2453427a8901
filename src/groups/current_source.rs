use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use sha2::{Sha256, Digest};
use crate::error::{ConfigurationError, FrontEndError};
use crate::models::{CurrentSourceModel, ParamValues, VarInit};
use crate::utils::{finish_hash, HashDigest, UpdateHash};
use super::{scan_group_code, set_param_dynamic, CodeTokens};


/// Injects current into a target neuron group every time step
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub model: Arc<CurrentSourceModel>,
    pub params: ParamValues,
    pub derived_params: ParamValues,
    pub var_initialisers: BTreeMap<String, VarInit>,
    pub dynamic_params: BTreeSet<String>,
    pub target_name: String,
    /// Index of the target neuron group
    pub target: usize,
    pub num_neurons: usize,
    pub injection_tokens: CodeTokens,
}

impl CurrentSource {
    pub(crate) fn new(
        name: &str,
        model: Arc<CurrentSourceModel>,
        (target_name, target, num_neurons): (&str, usize, usize),
        params: ParamValues,
        var_initialisers: BTreeMap<String, VarInit>,
    ) -> Self {
        CurrentSource {
            name: name.to_string(),
            model,
            params,
            derived_params: ParamValues::new(),
            var_initialisers,
            dynamic_params: BTreeSet::new(),
            target_name: target_name.to_string(),
            target,
            num_neurons,
            injection_tokens: vec![],
        }
    }

    pub fn description(&self) -> String {
        format!("Current source '{}'", self.name)
    }

    pub fn set_param_dynamic(&mut self, name: &str, dynamic: bool) -> Result<(), ConfigurationError> {
        let description = self.description();
        set_param_dynamic(&mut self.dynamic_params, &self.params, name, dynamic, &description)
    }

    pub fn get_param_value(&self, name: &str) -> Option<f64> {
        self.params.get(name).or_else(|| self.derived_params.get(name)).copied()
    }

    pub(crate) fn finalise(&mut self, dt: f64) -> Result<(), FrontEndError> {
        self.derived_params = self.model.snippet.calc_derived_params(&self.params, dt);
        for var_init in self.var_initialisers.values_mut() {
            var_init.finalise(dt);
        }
        self.injection_tokens = scan_group_code(
            &self.model.injection_code,
            &format!("{} injection code", self.description()),
        )?;

        Ok(())
    }

    /// Digest used when merging into the target's neuron update
    pub fn hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        self.model.hash_digest().update_hash(&mut hasher);
        self.dynamic_params.iter().collect::<Vec<_>>().update_hash(&mut hasher);

        finish_hash(hasher)
    }

    pub fn init_hash_digest(&self) -> HashDigest {
        let mut hasher = Sha256::new();
        for (name, var_init) in &self.var_initialisers {
            name.update_hash(&mut hasher);
            var_init.hash_digest().update_hash(&mut hasher);
        }

        finish_hash(hasher)
    }
}
