//! # Spike Codegen
//!
//! `spike_codegen` generates SIMT code for simulating spiking neural networks.
//! A model is declared as populations of neurons, synaptic projections between
//! them, current sources and custom updates, each described by a model whose
//! behaviour is written as small snippets of C-like code. Structurally
//! identical groups are merged so that one kernel serves all of them and
//! anything differing between them is read from a generated struct. The
//! generated modules target CUDA or OpenCL and are driven from Rust by a
//! [`runtime::Runtime`] once compiled into a shared library.
//!
//! ## Generating code for a model
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use spike_codegen::codegen::{generate_module_sources, Backend};
//! use spike_codegen::config::Preferences;
//! use spike_codegen::groups::ModelSpec;
//! use spike_codegen::merged::ModelMerged;
//! use spike_codegen::models::{neuron_models, param_values, VarInit};
//!
//! let mut model = ModelSpec::new("izhikevich");
//! model.set_dt(0.1).unwrap();
//!
//! let params = param_values(&[("a", 0.02), ("b", 0.2), ("c", -65.0), ("d", 8.0)]);
//! let vars = BTreeMap::from([
//!     ("V".to_string(), VarInit::constant(-65.0)),
//!     ("U".to_string(), VarInit::constant(-20.0)),
//! ]);
//! model.add_neuron_population("Exc", 1000, neuron_models::izhikevich(), params, vars).unwrap();
//! model.finalise().unwrap();
//!
//! let merged = ModelMerged::new(&model).unwrap();
//! let backend = Backend::new(Preferences::default()).unwrap();
//! let sources = generate_module_sources(&merged, &backend).unwrap();
//!
//! assert!(sources.contains_key("neuronUpdate.cc"));
//! assert!(sources.contains_key("runner.cc"));
//! ```
//!
//! ## Describing models in TOML
//!
//! Models can also be loaded from a TOML description with
//! [`config::parse_model`] or [`config::load_model`], see
//! [`config::model_file`] for the format. The `spike_codegen` binary reads
//! such a file and writes the generated modules into a directory.

pub mod error;
pub mod utils;
pub mod types;
pub mod transpiler;
pub mod models;
pub mod groups;
pub mod merged;
pub mod codegen;
pub mod config;
pub mod runtime;
