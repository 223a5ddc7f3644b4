//! Error types for loading configs and writing artifacts.
//!
//! Validation findings are not errors in this sense; they are collected by
//! [`crate::validator`] and never abort a run on their own.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a generation run.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not a well-formed YAML document.
    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Document does not convert into the typed policy model.
    #[error("config does not match schema: {0}")]
    Schema(String),

    /// Writing an artifact failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing an artifact failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PolicyError {
    /// Config load failures happen before validation and abort the run.
    pub fn is_config_load(&self) -> bool {
        matches!(
            self,
            PolicyError::ConfigRead { .. } | PolicyError::ConfigParse { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PolicyError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
