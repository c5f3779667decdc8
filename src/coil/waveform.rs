//! Time functions driving coil excitations.

use std::f64::consts::PI;

use crate::error::{MagError, Result};

/// Piecewise-linear time series.
///
/// Values are held constant before the first and after the last breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTable {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TimeTable {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(MagError::configuration(format!(
                "time table has {} times but {} values",
                times.len(),
                values.len()
            )));
        }
        if times.is_empty() {
            return Err(MagError::configuration("time table is empty"));
        }
        if times.iter().chain(&values).any(|v| !v.is_finite()) {
            return Err(MagError::configuration("time table contains non-finite values"));
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(MagError::configuration("time table times must be strictly increasing"));
        }
        Ok(Self { times, values })
    }

    /// Build from interleaved `t0 v0 t1 v1 ...` pairs.
    pub fn from_pairs(pairs: &[f64]) -> Result<Self> {
        if pairs.len() % 2 != 0 {
            return Err(MagError::configuration("time table needs an even number of entries"));
        }
        let times = pairs.iter().step_by(2).copied().collect();
        let values = pairs.iter().skip(1).step_by(2).copied().collect();
        Self::new(times, values)
    }

    fn segment(&self, t: f64) -> Option<usize> {
        let n = self.times.len();
        if n < 2 || t <= self.times[0] || t >= self.times[n - 1] {
            return None;
        }
        Some(self.times.partition_point(|&x| x <= t) - 1)
    }

    pub fn value_at(&self, t: f64) -> f64 {
        let n = self.times.len();
        match self.segment(t) {
            Some(i) => {
                let frac = (t - self.times[i]) / (self.times[i + 1] - self.times[i]);
                self.values[i] + frac * (self.values[i + 1] - self.values[i])
            }
            None if t <= self.times[0] => self.values[0],
            None => self.values[n - 1],
        }
    }

}

/// Scalar time function.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Fixed value
    Constant(f64),
    /// `amplitude * cos(2 pi frequency t + phase)`, phase in radians
    Harmonic {
        amplitude: f64,
        frequency: f64,
        phase: f64,
    },
    /// Tabulated breakpoints
    Table(TimeTable),
}

impl Waveform {
    pub fn value_at(&self, t: f64) -> f64 {
        match self {
            Waveform::Constant(v) => *v,
            Waveform::Harmonic {
                amplitude,
                frequency,
                phase,
            } => amplitude * (2.0 * PI * frequency * t + phase).cos(),
            Waveform::Table(table) => table.value_at(t),
        }
    }

    /// Whether the value never changes with time.
    pub fn is_constant(&self) -> bool {
        match self {
            Waveform::Constant(_) => true,
            Waveform::Harmonic {
                amplitude,
                frequency,
                ..
            } => *amplitude == 0.0 || *frequency == 0.0,
            Waveform::Table(table) => table.values.windows(2).all(|w| w[0] == w[1]),
        }
    }

    /// Check parameters are finite.
    pub fn validate(&self) -> Result<()> {
        if let Waveform::Harmonic {
            amplitude,
            frequency,
            phase,
        } = self
        {
            if !amplitude.is_finite() || !frequency.is_finite() || !phase.is_finite() {
                return Err(MagError::configuration("harmonic waveform has non-finite parameters"));
            }
            if *frequency < 0.0 {
                return Err(MagError::configuration("harmonic frequency must be non-negative"));
            }
        }
        if let Waveform::Constant(v) = self {
            if !v.is_finite() {
                return Err(MagError::configuration("constant waveform is not finite"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_time_table_interpolation() {
        let table = TimeTable::from_pairs(&[0.0, 0.0, 0.01, 5.0, 0.02, 5.0, 0.03, -1.0]).unwrap();
        assert_relative_eq!(table.value_at(0.005), 2.5);
        assert_relative_eq!(table.value_at(0.015), 5.0);
        assert_relative_eq!(table.value_at(0.025), 2.0, epsilon = 1e-12);
        // held outside the breakpoints
        assert_eq!(table.value_at(-1.0), 0.0);
        assert_eq!(table.value_at(1.0), -1.0);
    }

    #[test]
    fn test_time_table_rejects_bad_input() {
        assert!(TimeTable::new(vec![0.0, 0.0], vec![1.0, 2.0]).is_err());
        assert!(TimeTable::new(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(TimeTable::from_pairs(&[0.0, 1.0, 2.0]).is_err());
        assert!(TimeTable::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_harmonic() {
        let w = Waveform::Harmonic {
            amplitude: 2.0,
            frequency: 50.0,
            phase: 0.0,
        };
        assert_relative_eq!(w.value_at(0.0), 2.0);
        assert_relative_eq!(w.value_at(0.01), -2.0, epsilon = 1e-12);
        assert!(!w.is_constant());
    }

    #[test]
    fn test_constant_detection() {
        assert!(Waveform::Constant(3.0).is_constant());
        let flat = TimeTable::from_pairs(&[0.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(Waveform::Table(flat).is_constant());
        let ramp = TimeTable::from_pairs(&[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!(!Waveform::Table(ramp).is_constant());
    }
}
