// src/graph/mod.rs

//! Action graph representation.
//!
//! - [`action`] holds the immutable [`Action`] node type.
//! - [`arena`] holds [`ActionGraph`], a dense index-addressed arena of
//!   actions with prerequisite lists stored as index slices.

pub mod action;
pub mod arena;

pub use action::Action;
pub use arena::ActionGraph;
