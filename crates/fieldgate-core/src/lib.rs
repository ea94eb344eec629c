//! # Fieldgate Core
//!
//! Domain model for the fieldgate gateway: the hosted variable store that field
//! clients write into, and the tolerance-based change detector that decides whether
//! a sampling cycle is worth publishing.
//!
//! This crate is free of I/O; the gateway binary wires it to the network.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod variable;

pub use change::{ChangeDetector, Decision, DEFAULT_THRESHOLD};
pub use variable::{StoreError, VariableSpec, VariableStore, PRESSURE, TEMPERATURE};
