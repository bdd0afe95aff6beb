// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::ActionStatus;

#[derive(Error, Debug)]
pub enum ActionGraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Action not found: {0}")]
    ActionNotFound(usize),

    #[error("Action {action} has unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { action: usize, prerequisite: usize },

    #[error("Action at position {position} carries index {index}; indices must be dense")]
    NonDenseIndex { position: usize, index: usize },

    #[error("Cycle detected in action graph: {0}")]
    DagCycle(String),

    #[error("Invalid transition for action {action}: {from:?} -> {to:?}")]
    InvalidTransition {
        action: usize,
        from: ActionStatus,
        to: ActionStatus,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ActionGraphError>;
