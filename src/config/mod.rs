// src/config/mod.rs

//! Action-graph file configuration.
//!
//! - [`model`] holds the serde types mirroring the TOML layout.
//! - [`loader`] reads a file and runs validation.
//! - [`validate`] implements `TryFrom<RawConfigFile> for ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ActionConfig, ConfigFile, ConfigSection, RawConfigFile};
