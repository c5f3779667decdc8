//! Material variants and their pointwise evaluation.

use std::f64::consts::PI;
use std::sync::Arc;

use super::bh_table::BhTable;
use crate::diagnostics::OutOfRangeWarning;
use crate::error::{MagError, Result};

/// Vacuum permeability (H/m).
pub const MU_0: f64 = 4.0e-7 * PI;

/// Constitutive law of a material.
#[derive(Debug, Clone)]
pub enum MaterialKind {
    /// Linear material with fixed relative permeability.
    Constant { relative_permeability: f64 },
    /// Saturable material described by a B-H curve.
    NonLinear { table: Arc<BhTable> },
    /// Linear recoil line `B = Br + mu H`.
    Permanent {
        /// Remanent flux density vector (T)
        remanence: [f64; 3],
        relative_permeability: f64,
    },
}

/// A named material assigned to one or more regions.
#[derive(Debug, Clone)]
pub struct MaterialModel {
    pub name: String,
    pub kind: MaterialKind,
    /// Electric conductivity (S/m), used for ohmic losses
    pub conductivity: f64,
}

/// Result of evaluating a material at one field strength.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialResponse {
    /// Flux density B along the evaluation axis (T)
    pub flux_density: f64,
    /// Secant reluctivity H/B (m/H)
    pub reluctivity: f64,
    /// d(reluctivity)/dH
    pub reluctivity_derivative: f64,
    /// dB/dH
    pub differential_permeability: f64,
    /// B/H
    pub secant_permeability: f64,
    /// Set when the table had to be extrapolated past its margin
    pub warning: Option<OutOfRangeWarning>,
}

impl MaterialModel {
    /// Linear material with relative permeability `mur`.
    pub fn constant(name: impl Into<String>, mur: f64) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::Constant {
                relative_permeability: mur,
            },
            conductivity: 0.0,
        }
    }

    /// Air / vacuum.
    pub fn vacuum(name: impl Into<String>) -> Self {
        Self::constant(name, 1.0)
    }

    /// Saturable material backed by a shared B-H table.
    pub fn non_linear(name: impl Into<String>, table: Arc<BhTable>) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::NonLinear { table },
            conductivity: 0.0,
        }
    }

    /// Permanent magnet with remanence vector `br` and recoil permeability `mur`.
    pub fn permanent(name: impl Into<String>, br: [f64; 3], mur: f64) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::Permanent {
                remanence: br,
                relative_permeability: mur,
            },
            conductivity: 0.0,
        }
    }

    pub fn with_conductivity(mut self, conductivity: f64) -> Self {
        self.conductivity = conductivity;
        self
    }

    /// Check material parameters before a solve.
    pub fn validate(&self) -> Result<()> {
        let bad = |message: String| {
            Err(MagError::configuration(format!("material '{}': {}", self.name, message)))
        };

        if !self.conductivity.is_finite() || self.conductivity < 0.0 {
            return bad(format!("conductivity must be non-negative, got {}", self.conductivity));
        }

        match &self.kind {
            MaterialKind::Constant { relative_permeability: mur }
            | MaterialKind::Permanent { relative_permeability: mur, .. } => {
                if !mur.is_finite() || *mur <= 0.0 {
                    return bad(format!("relative permeability must be positive, got {}", mur));
                }
            }
            // Odd extension of a curve with B(0) > 0 would jump at H = 0
            MaterialKind::NonLinear { table } if table.remanence() > 0.0 => {
                return bad(format!(
                    "table '{}' starts at B = {} T; model remanence with a permanent material",
                    table.name(),
                    table.remanence()
                ));
            }
            MaterialKind::NonLinear { .. } => {}
        }

        if let MaterialKind::Permanent { remanence, .. } = &self.kind {
            if remanence.iter().any(|c| !c.is_finite()) {
                return bad("remanence must be finite".to_string());
            }
        }

        Ok(())
    }

    /// Whether B depends linearly on H.
    pub fn is_linear(&self) -> bool {
        !matches!(self.kind, MaterialKind::NonLinear { .. })
    }

    /// The B-H table of a nonlinear material.
    pub fn table(&self) -> Option<&Arc<BhTable>> {
        match &self.kind {
            MaterialKind::NonLinear { table } => Some(table),
            _ => None,
        }
    }

    /// Evaluate the material at field strength `h` (A/m) along the unit `axis`.
    ///
    /// Pure function of its inputs; safe to call concurrently.
    pub fn evaluate(&self, h: f64, axis: [f64; 3]) -> MaterialResponse {
        match &self.kind {
            MaterialKind::Constant { relative_permeability } => {
                let mu = relative_permeability * MU_0;
                linear_response(mu * h, mu)
            }

            MaterialKind::Permanent {
                remanence,
                relative_permeability,
            } => {
                let mu = relative_permeability * MU_0;
                linear_response(dot(remanence, &axis) + mu * h, mu)
            }

            MaterialKind::NonLinear { table } => {
                let magnitude = h.abs();
                let sign = if h < 0.0 { -1.0 } else { 1.0 };

                let b = table.permeability_at(magnitude);
                let db = table.derivative_at(magnitude);
                let mu = table.secant_permeability(magnitude);

                // nu(H) = H / B(H), even in H
                let dnu = if magnitude > 0.0 && b > 0.0 {
                    sign * (b - magnitude * db) / (b * b)
                } else {
                    0.0
                };

                MaterialResponse {
                    flux_density: sign * b,
                    reluctivity: 1.0 / mu,
                    reluctivity_derivative: dnu,
                    differential_permeability: db,
                    secant_permeability: mu,
                    warning: table.check_range(magnitude),
                }
            }
        }
    }

    /// Stored magnetic energy density at field strength `h` (J/m^3).
    ///
    /// For a magnet this is `(B - Br)^2 / (2 mu)` on the recoil line, which
    /// equals `mu H^2 / 2`.
    pub fn energy_density(&self, h: f64) -> f64 {
        match &self.kind {
            MaterialKind::Constant { relative_permeability }
            | MaterialKind::Permanent { relative_permeability, .. } => {
                0.5 * relative_permeability * MU_0 * h * h
            }
            MaterialKind::NonLinear { table } => table.energy_density(h),
        }
    }
}

fn linear_response(flux_density: f64, mu: f64) -> MaterialResponse {
    MaterialResponse {
        flux_density,
        reluctivity: 1.0 / mu,
        reluctivity_derivative: 0.0,
        differential_permeability: mu,
        secant_permeability: mu,
        warning: None,
    }
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const X: [f64; 3] = [1.0, 0.0, 0.0];

    fn iron() -> MaterialModel {
        let table = BhTable::new(
            "IRON",
            vec![0.0, 100.0, 400.0, 2000.0],
            vec![0.0, 0.6, 1.3, 1.6],
        )
        .unwrap();
        MaterialModel::non_linear("Iron", Arc::new(table))
    }

    #[test]
    fn test_constant_has_zero_derivative() {
        let air = MaterialModel::vacuum("Air");
        let r = air.evaluate(1000.0, X);
        assert_relative_eq!(r.flux_density, MU_0 * 1000.0);
        assert_relative_eq!(r.reluctivity, 1.0 / MU_0);
        assert_eq!(r.reluctivity_derivative, 0.0);
        assert!(r.warning.is_none());
        assert!(air.is_linear());
    }

    #[test]
    fn test_nonlinear_delegates_to_table() {
        let iron = iron();
        let r = iron.evaluate(250.0, X);
        let table = iron.table().unwrap();
        assert_eq!(r.flux_density, table.permeability_at(250.0));
        assert_eq!(r.differential_permeability, table.derivative_at(250.0));
        assert_relative_eq!(r.reluctivity, 250.0 / r.flux_density);
        assert!(!iron.is_linear());
    }

    #[test]
    fn test_nonlinear_is_odd_in_field() {
        let iron = iron();
        let pos = iron.evaluate(700.0, X);
        let neg = iron.evaluate(-700.0, X);
        assert_eq!(neg.flux_density, -pos.flux_density);
        assert_eq!(neg.reluctivity, pos.reluctivity);
        assert_eq!(neg.reluctivity_derivative, -pos.reluctivity_derivative);
    }

    #[test]
    fn test_reluctivity_derivative_matches_finite_difference() {
        let iron = iron();
        let h = 900.0;
        let step = 1e-3;
        let nu = |h: f64| iron.evaluate(h, X).reluctivity;
        let fd = (nu(h + step) - nu(h - step)) / (2.0 * step);
        assert_relative_eq!(iron.evaluate(h, X).reluctivity_derivative, fd, max_relative = 1e-6);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let iron = iron();
        for h in [0.0, 1.0, 99.9, 100.0, 1234.5, 5000.0] {
            let a = iron.evaluate(h, X);
            let b = iron.evaluate(h, X);
            assert_eq!(a.flux_density.to_bits(), b.flux_density.to_bits());
            assert_eq!(a.reluctivity.to_bits(), b.reluctivity.to_bits());
            assert_eq!(a.reluctivity_derivative.to_bits(), b.reluctivity_derivative.to_bits());
        }
    }

    #[test]
    fn test_concurrent_evaluation_matches_serial() {
        let iron = iron();
        let fields: Vec<f64> = (0..64).map(|k| k as f64 * 37.0).collect();
        let serial: Vec<f64> = fields.iter().map(|&h| iron.evaluate(h, X).flux_density).collect();

        let parallel: Vec<f64> = std::thread::scope(|s| {
            let handles: Vec<_> = fields
                .chunks(16)
                .map(|chunk| {
                    let iron = &iron;
                    s.spawn(move || {
                        chunk.iter().map(|&h| iron.evaluate(h, X).flux_density).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_out_of_range_is_reported_not_fatal() {
        let r = iron().evaluate(-4000.0, X);
        let w = r.warning.unwrap();
        assert_eq!(w.field_strength, 4000.0);
        assert!(r.flux_density < -1.6);
    }

    #[test]
    fn test_permanent_magnet_recoil_line() {
        let magnet = MaterialModel::permanent("NdFeB", [0.0, 0.0, 1.2], 1.05);
        let axis = [0.0, 0.0, 1.0];
        let r = magnet.evaluate(-1000.0, axis);
        assert_relative_eq!(r.flux_density, 1.2 - 1.05 * MU_0 * 1000.0);
        assert_eq!(r.reluctivity_derivative, 0.0);

        // remanence perpendicular to the axis contributes nothing
        let side = magnet.evaluate(0.0, X);
        assert_eq!(side.flux_density, 0.0);
    }

    #[test]
    fn test_validation() {
        assert!(MaterialModel::constant("Bad", 0.0).validate().is_err());
        assert!(MaterialModel::vacuum("Air").with_conductivity(-1.0).validate().is_err());
        assert!(MaterialModel::permanent("PM", [1.0, 0.0, 0.0], 1.05).validate().is_ok());
        assert!(iron().with_conductivity(4.54e6).validate().is_ok());
    }

    #[test]
    fn test_remanent_table_is_rejected_for_nonlinear_material() {
        let table = BhTable::new("R", vec![0.0, 10.0], vec![0.05, 0.5]).unwrap();
        let err = MaterialModel::non_linear("Ferrite", Arc::new(table)).validate().unwrap_err();
        assert!(matches!(err, MagError::Configuration { ref message } if message.contains("'R'")));
    }

    #[test]
    fn test_magnet_energy_is_recoil_line_value() {
        let magnet = MaterialModel::permanent("NdFeB", [0.0, 0.0, 1.2], 1.05);
        let axis = [0.0, 0.0, 1.0];
        let mu = 1.05 * MU_0;
        for h in [-8.0e5, -1000.0, 0.0, 2.5e4] {
            let b = magnet.evaluate(h, axis).flux_density;
            assert_relative_eq!(magnet.energy_density(h), (b - 1.2) * (b - 1.2) / (2.0 * mu), max_relative = 1e-9);
        }
        assert_eq!(magnet.energy_density(0.0), 0.0);
    }

    #[test]
    fn test_energy_density() {
        let air = MaterialModel::vacuum("Air");
        assert_relative_eq!(air.energy_density(100.0), 0.5 * MU_0 * 1.0e4);
        let iron = iron();
        let table = iron.table().unwrap();
        assert_eq!(iron.energy_density(300.0), table.energy_density(300.0));
    }
}
