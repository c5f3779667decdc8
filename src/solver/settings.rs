//! Solver configuration.

use crate::error::{MagError, Result};

use super::{
    DEFAULT_CONSECUTIVE_GROWTHS, DEFAULT_GROWTH_FACTOR, DEFAULT_MAX_BACKTRACKS, DEFAULT_RESIDUAL_LIMIT,
    DEFAULT_TOLERANCE,
};

/// Linearisation used between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationScheme {
    /// Differential permeability plus companion flux source.
    #[default]
    Newton,
    /// Secant permeability (Picard iteration).
    FixedPoint,
}

impl IterationScheme {
    /// Parse a scheme keyword.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "newton" | "nr" => Some(Self::Newton),
            "fixed_point" | "fixedpoint" | "picard" => Some(Self::FixedPoint),
            _ => None,
        }
    }
}

/// When a growing residual counts as divergence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivergenceSettings {
    /// Residual must exceed this multiple of the previous one to count as growth.
    pub growth_factor: f64,
    /// Number of growths in a row that abort the run.
    pub consecutive_growths: usize,
    /// Residuals above this value abort immediately.
    pub residual_limit: f64,
}

impl Default for DivergenceSettings {
    fn default() -> Self {
        Self {
            growth_factor: DEFAULT_GROWTH_FACTOR,
            consecutive_growths: DEFAULT_CONSECUTIVE_GROWTHS,
            residual_limit: DEFAULT_RESIDUAL_LIMIT,
        }
    }
}

/// Configuration for the nonlinear iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    pub scheme: IterationScheme,
    /// Convergence tolerance on the max-norm region residual.
    pub tolerance: f64,
    pub divergence: DivergenceSettings,
    /// Halvings of a Newton step allowed while the flux imbalance does not
    /// drop; 0 takes full steps.
    pub max_backtracks: usize,
    /// Relative margin past a B-H table before lookups warn. `None` keeps
    /// the margin of every table.
    pub range_margin: Option<f64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            scheme: IterationScheme::default(),
            tolerance: DEFAULT_TOLERANCE,
            divergence: DivergenceSettings::default(),
            max_backtracks: DEFAULT_MAX_BACKTRACKS,
            range_margin: None,
        }
    }
}

impl SolverSettings {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheme(mut self, scheme: IterationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the convergence tolerance.
    ///
    /// The residual is the relative change of flux density between two
    /// iterations, so 1e-6 asks for roughly six significant digits in B.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.divergence.growth_factor = growth_factor;
        self
    }

    pub fn with_consecutive_growths(mut self, count: usize) -> Self {
        self.divergence.consecutive_growths = count;
        self
    }

    pub fn with_residual_limit(mut self, limit: f64) -> Self {
        self.divergence.residual_limit = limit;
        self
    }

    pub fn with_max_backtracks(mut self, count: usize) -> Self {
        self.max_backtracks = count;
        self
    }

    /// Override the range margin of every B-H table in the circuit.
    pub fn with_range_margin(mut self, margin: f64) -> Self {
        self.range_margin = Some(margin);
        self
    }

    /// Reject settings the controller cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(MagError::InvalidSolverParam { message });

        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return invalid(format!("tolerance must be positive, got {}", self.tolerance));
        }
        if !(self.divergence.growth_factor > 1.0) {
            return invalid(format!(
                "growth factor must be greater than 1, got {}",
                self.divergence.growth_factor
            ));
        }
        if self.divergence.consecutive_growths == 0 {
            return invalid("consecutive growth count must be at least 1".to_string());
        }
        if !(self.divergence.residual_limit > self.tolerance) {
            return invalid(format!(
                "residual limit {} must exceed the tolerance",
                self.divergence.residual_limit
            ));
        }
        if let Some(margin) = self.range_margin {
            if !(margin >= 0.0) {
                return invalid(format!("range margin must be non-negative, got {}", margin));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_validation() {
        let s = SolverSettings::new()
            .with_scheme(IterationScheme::FixedPoint)
            .with_tolerance(1e-4)
            .with_growth_factor(3.0)
            .with_consecutive_growths(2);
        assert_eq!(s.scheme, IterationScheme::FixedPoint);
        assert!(s.validate().is_ok());

        assert!(SolverSettings::new().with_tolerance(0.0).validate().is_err());
        assert!(SolverSettings::new().with_growth_factor(1.0).validate().is_err());
        assert!(SolverSettings::new().with_consecutive_growths(0).validate().is_err());
        assert!(SolverSettings::new().with_range_margin(-0.1).validate().is_err());
        assert!(SolverSettings::new().with_max_backtracks(0).validate().is_ok());
    }

    #[test]
    fn test_range_margin_is_only_set_on_request() {
        assert_eq!(SolverSettings::default().range_margin, None);
        assert_eq!(SolverSettings::new().with_range_margin(0.2).range_margin, Some(0.2));
    }

    #[test]
    fn test_scheme_keywords() {
        assert_eq!(IterationScheme::from_str("Newton"), Some(IterationScheme::Newton));
        assert_eq!(IterationScheme::from_str("picard"), Some(IterationScheme::FixedPoint));
        assert_eq!(IterationScheme::from_str("fixed-point"), Some(IterationScheme::FixedPoint));
        assert_eq!(IterationScheme::from_str("gauss"), None);
    }
}
