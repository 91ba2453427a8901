//! Code generation preferences and the TOML model description format.

pub mod model_file;

use std::path::Path;
use serde::Deserialize;
use crate::error::SpikeCodegenError;

pub use model_file::{load_model, parse_model};


fn default_block_size() -> usize {
    32
}

/// Threads per block of each generated kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BlockSizes {
    pub neuron_update: usize,
    pub presynaptic_update: usize,
    pub postsynaptic_update: usize,
    pub synapse_dynamics_update: usize,
    pub initialize: usize,
    pub initialize_sparse: usize,
    pub neuron_spike_queue_update: usize,
    pub neuron_prev_spike_time_update: usize,
    pub synapse_dendritic_delay_update: usize,
    pub custom_update: usize,
    pub custom_transpose_update: usize,
}

impl Default for BlockSizes {
    fn default() -> Self {
        let size = default_block_size();
        BlockSizes {
            neuron_update: size,
            presynaptic_update: size,
            postsynaptic_update: size,
            synapse_dynamics_update: size,
            initialize: size,
            initialize_sparse: size,
            neuron_spike_queue_update: size,
            neuron_prev_spike_time_update: size,
            synapse_dendritic_delay_update: size,
            custom_update: size,
            custom_transpose_update: size,
        }
    }
}

/// Target platform of the generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Cuda,
    OpenCL,
}

/// Options which change generated code but not model semantics
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub platform: Platform,
    pub block_sizes: BlockSizes,
    /// Use the word-per-thread presynaptic strategy for bitmask connectivity
    pub enable_bitmask_optimisations: bool,
    /// Copy every array to and from the device around each step
    pub automatic_copy: bool,
    /// Emit `#line` directives pointing back at model code
    pub generate_line_info: bool,
    /// Filter used by the command line tool when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            platform: Platform::default(),
            block_sizes: BlockSizes::default(),
            enable_bitmask_optimisations: false,
            automatic_copy: false,
            generate_line_info: false,
            log_level: "info".to_string(),
        }
    }
}

impl Preferences {
    pub fn from_toml(contents: &str) -> Result<Self, SpikeCodegenError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, SpikeCodegenError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::{Platform, Preferences};

    #[test]
    fn test_defaults_fill_missing_keys() {
        let preferences = Preferences::from_toml("enable_bitmask_optimisations = true\n[block_sizes]\nneuron_update = 64\n").unwrap();

        assert!(preferences.enable_bitmask_optimisations);
        assert_eq!(preferences.block_sizes.neuron_update, 64);
        assert_eq!(preferences.block_sizes.presynaptic_update, 32);
        assert_eq!(preferences.platform, Platform::Cuda);
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        assert!(Preferences::from_toml("platform = \"metal\"").is_err());
    }
}
