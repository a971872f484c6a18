//! Error types for the tracer simulator.

use thiserror::Error;

/// Errors surfaced by configuration, simulation and export.
#[derive(Error, Debug)]
pub enum SimError {
    /// A configuration parameter is out of its valid range.
    #[error("invalid configuration: `{parameter}` = {value} ({reason})")]
    InvalidConfiguration {
        parameter: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Tensor backend failure (allocation, shape mismatch, dtype conversion).
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    pub fn invalid(parameter: &'static str, value: impl ToString, reason: &'static str) -> Self {
        SimError::InvalidConfiguration {
            parameter,
            value: value.to_string(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
