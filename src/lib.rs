//! # Magcore
//!
//! Nonlinear material evaluation and iteration control for magnetostatic and
//! low-frequency magnetic simulation.
//!
//! This library provides:
//! - B-H curve handling for soft magnetic materials (tabulated, monotone, with
//!   configurable extrapolation margin) plus constant and permanent-magnet models
//! - Coil excitation with prescribed currents or voltage-driven circuits
//! - A magnetic equivalent circuit (MEC) of reluctance regions solved with
//!   Newton (with step damping) or fixed-point iteration under a divergence monitor
//! - Steady and backward-Euler transient runners, integral reports and a
//!   field export hook
//!
//! ## Architecture
//!
//! - [`dsl`] - Parser for the case description language
//! - [`circuit`] - Regions, nodes, material assignments and validation
//! - [`material`] - B-H tables and material models
//! - [`coil`] - Coil specifications and excitation waveforms
//! - [`solver`] - Linearisation, assembly, the nonlinear controller and runners
//! - [`report`] - Probes, integral reports and field export
//! - [`diagnostics`] - Out-of-range warning bookkeeping
//!
//! ## Usage
//!
//! ```bash
//! magcore core.case -v
//! ```
//!
//! ## Solution Method
//!
//! Each region is a flux tube of length `l` and cross-section `A` between
//! two magnetic scalar potential nodes. For every nonlinear iteration:
//!
//! 1. Linearise every region's material around the current field strength
//!    (differential permeability for Newton, secant for fixed point)
//! 2. Stamp permeances, flux sources and coil ampere-turns into `A x = z`
//! 3. Solve for node potentials and voltage-coil currents
//! 4. Compare flux densities with the previous iterate; stop on tolerance,
//!    budget exhaustion or divergence
//!
//! Voltage-driven coils are discretised with backward Euler on `dPhi/dt`.

pub mod circuit;
pub mod coil;
pub mod diagnostics;
pub mod dsl;
pub mod error;
pub mod material;
pub mod report;
pub mod solver;

// Re-export main types for convenience
pub use circuit::{MagneticCircuit, MagneticCircuitBuilder};
pub use error::{MagError, Result};
pub use solver::{NonlinearController, SolverSettings, SteadyRunner, TransientRunner};
