//! Magnetic material models.
//!
//! - [`BhTable`]: tabulated B-H curve with monotone piecewise-linear
//!   interpolation, extrapolation past the last sample and tabular I/O.
//! - [`MaterialModel`]: closed set of material variants (constant,
//!   nonlinear, permanent magnet) evaluated pointwise into a
//!   [`MaterialResponse`].

mod bh_table;
mod model;

pub use bh_table::{BhTable, ColumnOrder, DEFAULT_RANGE_MARGIN, MAX_FLUX_DENSITY};
pub use model::{MaterialKind, MaterialModel, MaterialResponse, MU_0};
