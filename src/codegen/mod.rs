//! Generation of SIMT kernels and host code from a merged model

pub mod code_stream;
pub mod environment;
pub mod backend;
pub mod generator;

pub use backend::{Backend, CodegenResult, Kernel};
pub use generator::{generate_module_sources, write_module_sources, MODULES};
