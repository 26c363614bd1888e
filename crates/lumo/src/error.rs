//! Host runtime errors.

use thiserror::Error;

/// Host runtime result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving, instantiating, or marshaling values for a
/// guest module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown import module: {module}")]
    UnknownModule { module: String },

    #[error("function {function} not found in module {module}")]
    FunctionNotFound { module: String, function: String },

    #[error("function {function} registered twice in module {module}")]
    DuplicateFunction { module: String, function: String },

    #[error("malformed layout at {address:#x}: {reason}")]
    MalformedLayout { address: i64, reason: String },

    #[error("malformed type descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("dict value is missing field '{0}'")]
    MissingField(String),

    #[error("invalid parameter for {function}: {reason}")]
    InvalidDistributionParameter {
        function: &'static str,
        reason: String,
    },

    #[error("module {module} accessed guest memory before it was bound to an instance")]
    Unbound { module: String },

    #[error("guest module does not export '{0}'")]
    MissingExport(String),

    #[error("compile failed: {0}")]
    Compile(String),

    #[error("{function}: {reason}")]
    Capability {
        function: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wasm(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn layout(address: impl Into<i64>, reason: impl Into<String>) -> Self {
        Error::MalformedLayout {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn distribution(function: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidDistributionParameter {
            function,
            reason: reason.into(),
        }
    }

    pub(crate) fn capability(function: &'static str, reason: impl ToString) -> Self {
        Error::Capability {
            function,
            reason: reason.to_string(),
        }
    }

    /// Recover a host error that travelled through a guest trap.
    ///
    /// Host functions return `Error` to the engine, which wraps it in its own
    /// error type on the way back out of the guest call.
    pub fn from_trap(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Wasm(err),
        }
    }
}
