//! Error types shared across the simulator.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, validating, or expanding a plan.
///
/// All variants are fatal: nothing starts running until the plan is clean.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Unable to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON
    #[error("Invalid JSON in config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A node failed schema validation; `path` points at the offending node
    #[error("Config validation failed at {path}: {message}")]
    Validation { path: String, message: String },

    /// A topic or payload template referenced a variable outside its expansion
    #[error("Missing template variable '{0}' in stream template.")]
    MissingVariable(String),

    /// A template contained a stray unescaped brace
    #[error("Unbalanced brace in template '{0}'")]
    UnbalancedBrace(String),
}

impl ConfigError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors from the value-generator algebra.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Generator spec carried invalid bounds or parameters
    #[error("Invalid generator spec: {0}")]
    InvalidSpec(String),

    /// Expression failed to parse
    #[error("Expression parse error: {0}")]
    ExpressionParse(String),

    /// Expression failed to evaluate
    #[error("Expression evaluation error: {0}")]
    ExpressionEval(String),
}

/// Errors from payload construction and encoding.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Reading a file-backed payload failed
    #[error("Unable to read payload file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Inline payload value could not be decoded
    #[error("Payload decoding failed: {0}")]
    Decode(String),

    /// A field generator failed while assembling the payload
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// JSON serialization of the assembled payload failed
    #[error("Payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the broker transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Broker connection could not be established
    #[error("Failed to connect to broker '{broker}': {message}")]
    Connect { broker: String, message: String },

    /// A publish was rejected or the client reported a failure
    #[error("Publish failed for topic '{topic}': {message}")]
    Publish { topic: String, message: String },

    /// The publisher was used after close or its event loop died
    #[error("Broker '{0}' connection is closed")]
    Closed(String),
}

/// Short kind tags used in error log lines and the file log.
pub trait ErrorKind {
    fn kind(&self) -> &'static str;
}

impl ErrorKind for PayloadError {
    fn kind(&self) -> &'static str {
        match self {
            PayloadError::Io { .. } => "payload-io",
            PayloadError::Decode(_) => "payload-decode",
            PayloadError::Generator(_) => "generator",
            PayloadError::Serialize(_) => "payload-serialize",
        }
    }
}

impl ErrorKind for TransportError {
    fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect { .. } => "transport-connect",
            TransportError::Publish { .. } => "transport-publish",
            TransportError::Closed(_) => "transport-closed",
        }
    }
}
