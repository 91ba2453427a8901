//! Group instances declared in a model: neuron populations, synapse
//! projections, current sources and custom updates, plus the [`ModelSpec`]
//! which owns them.

pub mod neuron_group;
pub mod synapse_group;
pub mod current_source;
pub mod custom_update;
pub mod model_spec;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};
use crate::error::{ConfigurationError, FrontEndError};
use crate::models::{ParamValues, Var};
use crate::transpiler::scan_code;
use crate::transpiler::token::{Token, TokenType};
use crate::types::{parse_type, ResolvedType, TypeContext};

pub use neuron_group::NeuronGroup;
pub use synapse_group::{
    ConnectivityInit, MatrixConnectivity, MatrixType, MatrixWeight, PostsynapticInit, SpanType,
    SynapseGroup, WeightUpdateInit,
};
pub use current_source::CurrentSource;
pub use custom_update::{CustomUpdate, CustomUpdateWU, ResolvedVarReference, VarReference, WUVarReference};
pub use model_spec::ModelSpec;


/// Kind of group, used to identify the owner of runtime arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKind {
    NeuronGroup,
    SynapseGroup,
    CurrentSource,
    CustomUpdate,
    CustomUpdateWU,
}

impl GroupKind {
    pub fn description(&self) -> &'static str {
        match self {
            GroupKind::NeuronGroup => "neuron group",
            GroupKind::SynapseGroup => "synapse group",
            GroupKind::CurrentSource => "current source",
            GroupKind::CustomUpdate => "custom update",
            GroupKind::CustomUpdateWU => "custom weight update",
        }
    }
}

/// Identifies a group by kind and name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupRef {
    pub kind: GroupKind,
    pub name: String,
}

impl GroupRef {
    pub fn new(kind: GroupKind, name: &str) -> Self {
        GroupRef { kind, name: name.to_string() }
    }
}

impl Display for GroupRef {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{} '{}'", self.kind.description(), self.name)
    }
}

/// Where the memory backing a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VarLocation {
    #[default]
    HostDevice,
    Device,
    HostDeviceZeroCopy,
}

impl VarLocation {
    pub fn has_host(&self) -> bool {
        !matches!(self, VarLocation::Device)
    }
}

/// Scanned code, empty code scans to just the end token
pub type CodeTokens = Vec<Token>;

pub(crate) fn scan_group_code(code: &str, description: &str) -> Result<CodeTokens, FrontEndError> {
    scan_code(code, description)
}

pub fn is_code_empty(tokens: &[Token]) -> bool {
    tokens.iter().all(|t| t.token_type == TokenType::EndOfFile)
}

/// Does the code refer to an identifier
pub fn references_identifier(tokens: &[Token], name: &str) -> bool {
    tokens.iter().any(|t| t.token_type == TokenType::Identifier && t.lexeme == name)
}

/// Resolves the declared type of a variable
pub fn resolve_var_type(var: &Var, context: &TypeContext) -> Result<ResolvedType, ConfigurationError> {
    parse_type(&var.ty, context).ok_or_else(|| {
        ConfigurationError::Unsupported(format!("Unknown type '{}' for variable '{}'", var.ty, var.name))
    })
}

/// Marks a parameter as dynamic or not, checking it exists
pub(crate) fn set_param_dynamic(
    dynamic_params: &mut BTreeSet<String>,
    params: &ParamValues,
    name: &str,
    dynamic: bool,
    description: &str,
) -> Result<(), ConfigurationError> {
    if !params.contains_key(name) {
        return Err(ConfigurationError::UnknownTarget {
            description: description.to_string(),
            kind: "parameter",
            name: name.to_string(),
        });
    }

    if dynamic {
        dynamic_params.insert(name.to_string());
    } else {
        dynamic_params.remove(name);
    }

    Ok(())
}

/// Sets the location of a variable, checking it exists
pub(crate) fn set_var_location(
    locations: &mut BTreeMap<String, VarLocation>,
    vars: &[Var],
    name: &str,
    location: VarLocation,
    description: &str,
) -> Result<(), ConfigurationError> {
    if !vars.iter().any(|v| v.name == name) {
        return Err(ConfigurationError::UnknownTarget {
            description: description.to_string(),
            kind: "variable",
            name: name.to_string(),
        });
    }

    locations.insert(name.to_string(), location);

    Ok(())
}
