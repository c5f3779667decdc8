//! Companion model of one region around an operating point.

use crate::diagnostics::OutOfRangeWarning;
use crate::material::MaterialModel;

use super::settings::IterationScheme;
use super::MIN_PERMEANCE;

/// Linearised region: a permeance in parallel with a flux source.
///
/// Around the operating point `H0` the region flux is approximated by
/// `Phi = g * H * l + Phi_eq`, exact at `H0`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionLinearization {
    /// Permeance g (H), floored at [`MIN_PERMEANCE`]
    pub permeance: f64,
    /// Companion flux Phi_eq (Wb)
    pub flux_source: f64,
    /// B(H0) along the region axis (T)
    pub flux_density: f64,
    pub warning: Option<OutOfRangeWarning>,
}

/// Linearise a region of cross-section `area` and length `length` at field
/// strength `h`.
///
/// Newton uses the differential permeability, fixed point the secant one.
/// Linear materials always use their (constant) differential permeability,
/// which keeps the remanent flux of a magnet in the companion source.
pub fn linearize_region(
    material: &MaterialModel,
    h: f64,
    axis: [f64; 3],
    area: f64,
    length: f64,
    scheme: IterationScheme,
) -> RegionLinearization {
    let response = material.evaluate(h, axis);

    let mu = match scheme {
        IterationScheme::FixedPoint if !material.is_linear() => response.secant_permeability,
        _ => response.differential_permeability,
    };

    let permeance = (area * mu / length).max(MIN_PERMEANCE);
    let flux_source = area * response.flux_density - permeance * h * length;

    RegionLinearization {
        permeance,
        flux_source,
        flux_density: response.flux_density,
        warning: response.warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{BhTable, MU_0};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    const AXIS: [f64; 3] = [1.0, 0.0, 0.0];

    fn iron() -> MaterialModel {
        let table = BhTable::new("IRON", vec![0.0, 100.0, 1000.0], vec![0.0, 0.1, 1.2]).unwrap();
        MaterialModel::non_linear("Iron", Arc::new(table))
    }

    #[test]
    fn test_newton_companion_is_exact_at_operating_point() {
        let lin = linearize_region(&iron(), 500.0, AXIS, 1e-4, 0.1, IterationScheme::Newton);
        let slope = 1.1 / 900.0;
        assert_relative_eq!(lin.permeance, 1e-4 * slope / 0.1);
        let flux = lin.permeance * 500.0 * 0.1 + lin.flux_source;
        assert_relative_eq!(flux, 1e-4 * lin.flux_density);
    }

    #[test]
    fn test_fixed_point_has_no_companion_flux() {
        let lin = linearize_region(&iron(), 500.0, AXIS, 1e-4, 0.1, IterationScheme::FixedPoint);
        assert_relative_eq!(lin.permeance, 1e-4 * (lin.flux_density / 500.0) / 0.1);
        assert_relative_eq!(lin.flux_source, 0.0, epsilon = 1e-18);
    }

    #[test]
    fn test_magnet_keeps_remanent_flux() {
        let magnet = MaterialModel::permanent("NdFeB", [1.2, 0.0, 0.0], 1.05);
        for scheme in [IterationScheme::Newton, IterationScheme::FixedPoint] {
            let lin = linearize_region(&magnet, -2.0e4, AXIS, 1e-4, 0.01, scheme);
            assert_relative_eq!(lin.permeance, 1e-4 * 1.05 * MU_0 / 0.01);
            assert_relative_eq!(lin.flux_source, 1.2e-4, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_flat_segment_is_floored() {
        let table = BhTable::new("SAT", vec![0.0, 10.0, 20.0], vec![0.0, 1.0, 1.0]).unwrap();
        let sat = MaterialModel::non_linear("Sat", Arc::new(table));
        let lin = linearize_region(&sat, 15.0, AXIS, 1e-4, 0.1, IterationScheme::Newton);
        assert_eq!(lin.permeance, MIN_PERMEANCE);
    }

    #[test]
    fn test_negative_field_is_odd() {
        let pos = linearize_region(&iron(), 500.0, AXIS, 1e-4, 0.1, IterationScheme::Newton);
        let neg = linearize_region(&iron(), -500.0, AXIS, 1e-4, 0.1, IterationScheme::Newton);
        assert_relative_eq!(neg.permeance, pos.permeance);
        assert_relative_eq!(neg.flux_source, -pos.flux_source);
        assert_relative_eq!(neg.flux_density, -pos.flux_density);
    }
}
