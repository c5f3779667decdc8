//! Residual reduction and divergence detection.

use super::settings::DivergenceSettings;

/// Max-norm over per-region residuals.
///
/// Returns the index of the worst region together with its residual. A
/// non-finite residual always wins so that blow-ups are attributed to the
/// region that produced them. `None` when there are no regions.
pub fn max_norm(residuals: &[f64]) -> Option<(usize, f64)> {
    let mut worst: Option<(usize, f64)> = None;
    for (i, &r) in residuals.iter().enumerate() {
        if !r.is_finite() {
            return Some((i, r));
        }
        match worst {
            Some((_, w)) if w >= r => {}
            _ => worst = Some((i, r)),
        }
    }
    worst
}

/// Watches the residual history of one iteration phase.
#[derive(Debug, Clone)]
pub struct DivergenceMonitor {
    settings: DivergenceSettings,
    previous: Option<f64>,
    growths: usize,
}

impl DivergenceMonitor {
    pub fn new(settings: DivergenceSettings) -> Self {
        Self {
            settings,
            previous: None,
            growths: 0,
        }
    }

    /// Forget the history (a new phase starts from scratch).
    pub fn reset(&mut self) {
        self.previous = None;
        self.growths = 0;
    }

    /// Number of growths in a row observed so far.
    pub fn growths(&self) -> usize {
        self.growths
    }

    /// Record the next residual; returns `true` when the run has diverged.
    pub fn observe(&mut self, residual: f64) -> bool {
        if !residual.is_finite() || residual > self.settings.residual_limit {
            return true;
        }

        match self.previous {
            Some(prev) if residual > self.settings.growth_factor * prev => self.growths += 1,
            _ => self.growths = 0,
        }
        self.previous = Some(residual);

        self.growths >= self.settings.consecutive_growths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(growth_factor: f64, consecutive_growths: usize) -> DivergenceSettings {
        DivergenceSettings {
            growth_factor,
            consecutive_growths,
            residual_limit: 1e12,
        }
    }

    #[test]
    fn test_blow_up_detected_on_fourth_residual() {
        let mut monitor = DivergenceMonitor::new(settings(2.0, 1));
        let diverged: Vec<bool> = [1.0, 0.5, 0.26, 10.0].iter().map(|&r| monitor.observe(r)).collect();
        assert_eq!(diverged, vec![false, false, false, true]);
    }

    #[test]
    fn test_growth_needs_consecutive_iterations() {
        let mut monitor = DivergenceMonitor::new(settings(2.0, 2));
        assert!(!monitor.observe(1.0));
        assert!(!monitor.observe(3.0));
        assert_eq!(monitor.growths(), 1);
        // a shrinking step clears the streak
        assert!(!monitor.observe(2.0));
        assert!(!monitor.observe(5.0));
        assert!(monitor.observe(11.0));
    }

    #[test]
    fn test_mild_growth_is_tolerated() {
        let mut monitor = DivergenceMonitor::new(settings(2.0, 1));
        assert!(!monitor.observe(1.0));
        assert!(!monitor.observe(1.9));
        assert!(!monitor.observe(3.7));
    }

    #[test]
    fn test_limit_and_nan() {
        let mut monitor = DivergenceMonitor::new(settings(2.0, 3));
        assert!(monitor.observe(f64::NAN));
        monitor.reset();
        assert!(monitor.observe(1e13));
        monitor.reset();
        assert!(!monitor.observe(1e11));
    }

    #[test]
    fn test_max_norm() {
        assert_eq!(max_norm(&[0.1, 0.4, 0.2]), Some((1, 0.4)));
        assert_eq!(max_norm(&[]), None);
        let (worst, r) = max_norm(&[0.1, f64::INFINITY, 5.0]).unwrap();
        assert_eq!(worst, 1);
        assert!(r.is_infinite());
        // ties keep the first region
        assert_eq!(max_norm(&[0.3, 0.3]), Some((0, 0.3)));
    }
}
