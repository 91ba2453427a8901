//! Error sets for each stage of building, generating and running a model.

use thiserror::Error;


/// Error set for problems with how a model was declared or configured
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Group names must be unique within their kind
    #[error("Cannot add a {kind} with duplicate name:'{name}'")]
    DuplicateGroupName { kind: &'static str, name: String },
    /// Name does not follow C identifier rules
    #[error("{description} name '{name}' is not valid")]
    InvalidName { description: String, name: String },
    /// Number of provided values does not match the number declared
    #[error("{description} expected {expected} {kind} but got {actual}")]
    WrongNumberOfValues { description: String, kind: &'static str, expected: usize, actual: usize },
    /// A declared value was not provided
    #[error("{description} missing initialiser for {kind}: '{name}'")]
    MissingValue { description: String, kind: &'static str, name: String },
    /// Referenced group does not exist
    #[error("Unknown {kind} '{name}'")]
    UnknownGroup { kind: &'static str, name: String },
    /// Referenced variable, parameter or extra global parameter does not exist
    #[error("{description} has no {kind} named '{name}'")]
    UnknownTarget { description: String, kind: &'static str, name: String },
    /// Sparse connectivity needs row or column building code
    #[error("Cannot calculate number of connectivity init threads without connectivity building code")]
    MissingConnectivityCode,
    /// No registered presynaptic update strategy can handle this synapse group
    #[error("Unable to find a suitable presynaptic update strategy for synapse group '{0}'")]
    NoPresynapticStrategy(String),
    /// Combination of options which cannot be generated
    #[error("{0}")]
    Unsupported(String),
    /// Model has already been finalised and can no longer be changed
    #[error("Model '{0}' has already been finalised")]
    AlreadyFinalised(String),
    /// Model must be finalised before merging or generation
    #[error("Model '{0}' must be finalised first")]
    NotFinalised(String),
}

/// Error raised when snippet code fails to scan, parse or type check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrontEndError {
    /// Diagnostics were reported while processing code
    #[error("{context}: {count} error(s) found\n{messages}")]
    Diagnostics { context: String, count: usize, messages: String },
}

/// Error set for loading the generated library
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Shared object could not be opened
    #[error("Unable to load library - error:{0}")]
    LoadError(String),
    /// Required symbol is missing from the shared object
    #[error("Cannot find symbol '{0}'")]
    MissingSymbol(String),
}

/// Error set for runtime preconditions
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Two arrays of one group share a name
    #[error("Unable to allocate array with duplicate name '{0}'")]
    DuplicateArray(String),
    /// Two dynamic parameters of one group share a name
    #[error("Unable to add dynamic parameter with duplicate name '{0}'")]
    DuplicateDynamicParam(String),
    /// Recording was enabled but no recording length was given
    #[error("Cannot use recording system without specifying number of recording timesteps")]
    RecordingTimestepsRequired,
    /// Recording buffers were requested but never allocated
    #[error("Recording buffer not allocated - cannot {0}")]
    RecordingNotAllocated(&'static str),
    /// Recording buffer has not yet been filled
    #[error("Event recording data can only be accessed once buffer is full")]
    RecordingBufferNotFull,
    /// Runtime must be allocated before use
    #[error("Runtime has not been allocated")]
    NotAllocated,
    /// Array could not be found
    #[error("Group '{group}' has no array named '{name}'")]
    UnknownArray { group: String, name: String },
    /// Dynamic parameter could not be found
    #[error("Group '{group}' has no dynamic parameter named '{name}'")]
    UnknownDynamicParam { group: String, name: String },
    /// No custom update group of this name
    #[error("No custom update group named '{0}'")]
    UnknownCustomUpdate(String),
    /// Error writing recorded data
    #[error("Unable to write '{path}': {message}")]
    Io { path: String, message: String },
}

/// A set of errors that may occur when using the library
#[derive(Error, Debug)]
pub enum SpikeCodegenError {
    /// Errors related to model declaration
    #[error("{0}")]
    ConfigurationRelatedError(#[from] ConfigurationError),
    /// Errors related to model code
    #[error("{0}")]
    FrontEndRelatedError(#[from] FrontEndError),
    /// Errors related to the generated library
    #[error("{0}")]
    LibraryRelatedError(#[from] LibraryError),
    /// Errors related to running a model
    #[error("{0}")]
    RuntimeRelatedError(#[from] RuntimeError),
    /// Errors reading configuration or writing generated code
    #[error("{0}")]
    IoRelatedError(#[from] std::io::Error),
    /// Errors parsing configuration files
    #[error("{0}")]
    ConfigParseError(#[from] toml::de::Error),
}
