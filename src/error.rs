// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Failure modes of a single live server query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query to {addr} timed out")]
    Timeout { addr: String },

    /// The port refused the datagram, usually while the server changes map.
    #[error("{addr} is changing map or restarting")]
    ServerRestarting { addr: String },

    #[error("socket error talking to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response from {addr}: {reason}")]
    Malformed { addr: String, reason: String },
}

/// A group or server named by the caller does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("server group {requested:?} not found (default group: {default:?})")]
    GroupNotFound {
        requested: Option<String>,
        default: Option<String>,
    },

    #[error("server {server:?} not found in group {group:?}")]
    ServerNotFound { group: String, server: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
