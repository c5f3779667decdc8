//! Nonlinear magnetostatic solver.
//!
//! This module provides the numerical engine: linearisation of every region
//! around the current operating point, assembly of a linear system in the
//! style of modified nodal analysis, and the iteration controller that
//! sequences assemble / solve / convergence checks.
//!
//! ## Magnetic nodal analysis
//!
//! Each region is a branch between two nodes of magnetic scalar potential.
//! Linearised around `H0` it behaves like a permeance `g` in parallel with a
//! flux source `Phi_eq`, so flux conservation at the nodes gives `Ax = z`:
//!
//! ```text
//! [ P   K ] [ psi ]   [ phi ]
//! [ C   R ] [  i  ] = [  v  ]
//! ```
//!
//! where:
//! - P is the permeance matrix (node equations)
//! - K couples the currents of voltage-driven coils into the node equations
//!   through their ampere-turns
//! - C, R form the circuit rows `V = R I + N dPhi/dt` of those coils
//! - psi is the vector of node potentials, i the vector of coil currents
//! - phi is the sum of flux sources into each node, v the coil voltages

mod controller;
mod convergence;
mod linearize;
mod matrix;
mod problem;
mod runner;
mod settings;

pub use controller::{
    AdvanceOutcome, CancelFlag, ControllerState, ConvergenceStatus, IterationState,
    NonlinearController,
};
pub use convergence::{max_norm, DivergenceMonitor};
pub use linearize::{linearize_region, RegionLinearization};
pub use matrix::SystemMatrix;
pub use problem::{MagneticProblem, NonlinearProblem};
pub use runner::{ScanPoint, SteadyRunner, TransientRunner};
pub use settings::{DivergenceSettings, IterationScheme, SolverSettings};

/// Default convergence tolerance on the relative change of flux density.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Default iteration budget when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Default ratio between consecutive residuals that counts as growth.
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

/// Default number of growths in a row that abort a run.
pub const DEFAULT_CONSECUTIVE_GROWTHS: usize = 1;

/// Residuals above this abort immediately.
pub const DEFAULT_RESIDUAL_LIMIT: f64 = 1e12;

/// Default number of step halvings in a Newton line search.
pub const DEFAULT_MAX_BACKTRACKS: usize = 8;

/// Relative flux imbalance treated as exact balance (roundoff level).
pub const IMBALANCE_FLOOR: f64 = 1e-12;

/// Minimum region permeance (H) to prevent a singular matrix.
pub const MIN_PERMEANCE: f64 = 1e-18;

/// Flux densities below this (T) are compared absolutely.
pub const FLUX_DENSITY_FLOOR: f64 = 1e-9;

/// Coil currents below this (A) are compared absolutely.
pub const CURRENT_FLOOR: f64 = 1e-9;
