//! Magnetic circuit representation and validation.
//!
//! This module provides the immutable simulation configuration built from a
//! case file or a [`MagneticCircuitBuilder`]. The [`MagneticCircuit`] struct
//! holds regions, nodes, material assignments, coils and run settings in a
//! form suitable for the solver.

mod builder;
mod graph;
mod types;
mod validate;

pub use builder::MagneticCircuitBuilder;
pub use graph::{MagneticCircuit, Region, RunnerDef, ScanDef, DEFAULT_AXIS, DEFAULT_COIL_NORMAL};
pub use types::*;
pub use validate::validate_circuit;
