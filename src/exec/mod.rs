// src/exec/mod.rs

//! Execution backends used by the `actiongraph` binary.
//!
//! - [`process`] provides [`ProcessRunner`], a compile-phase runner that
//!   runs shell commands with `tokio::process`.
//! - [`cache`] provides [`CacheRunner`], an artifact-check runner backed by
//!   blake3 fingerprints persisted under `.actiongraph/`.
//! - [`summary`] provides [`SummaryReporter`], which collects terminal
//!   actions and prints failures with their captured output.

pub mod cache;
pub mod process;
pub mod summary;

pub use cache::{CacheRunner, FingerprintStore};
pub use process::ProcessRunner;
pub use summary::SummaryReporter;
