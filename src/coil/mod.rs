//! Coil excitation.
//!
//! A [`CoilSpecification`] ties a winding to a region and drives it either
//! with a prescribed current or with a terminal voltage behind a series
//! resistance. At each instant a coil yields a [`SourceDistribution`]; for
//! voltage drive the current stays an unknown of the coupled solve:
//!
//! ```text
//! V(t) = R I + N dPhi/dt
//! ```

mod specification;
mod waveform;

pub use specification::{
    CoilSpecification, CoilTopology, Excitation, SourceDirection, SourceDistribution, SourceDrive,
    Winding,
};
pub use waveform::{TimeTable, Waveform};
