//! Error taxonomy for the execution pipeline.

use std::io;

use thiserror::Error;

/// How the embedded result protocol on stdout was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// No start marker at all: the program exited early or skipped the trailer.
    #[error("no result marker found in output")]
    MissingMarker,

    /// A start marker without a matching end marker after it.
    #[error("result marker is not terminated")]
    Unterminated,

    /// Markers are balanced but the payload between them is not a valid result.
    #[error("result payload could not be decoded: {0}")]
    Undecodable(String),
}

/// Errors surfaced by [`crate::context::ExecutionContext`] and the components below it.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The execution environment could not be launched or connected to.
    #[error("failed to start '{connection}': {source}")]
    AdapterStart {
        connection: String,
        #[source]
        source: io::Error,
    },

    /// The environment ran but finished with a failure status.
    #[error("remote connection '{connection}' exited with {}", describe_code(.code))]
    NonSuccessExit {
        connection: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Replay was requested for a unit that was never recorded.
    #[error("no cached run for {hash} in {dir}")]
    CacheMiss { hash: String, dir: String },

    #[error("malformed result: {0}")]
    MalformedResult(#[from] ProtocolViolation),

    /// A binding name that cannot be used as a local variable.
    #[error("invalid binding name '{0}'")]
    InvalidBinding(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "a signal".to_string(),
    }
}

pub type Result<T, E = ExecError> = std::result::Result<T, E>;
