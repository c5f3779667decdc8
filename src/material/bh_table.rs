//! Tabulated B-H magnetisation curves.

use std::path::Path;

use crate::diagnostics::OutOfRangeWarning;
use crate::error::{MagError, Result};

/// Largest flux density (T) a column may reach to be recognised as B.
pub const MAX_FLUX_DENSITY: f64 = 5.0;

/// Default relative margin past the last sample before a lookup warns.
pub const DEFAULT_RANGE_MARGIN: f64 = 0.0;

/// Column layout of two-column B-H data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnOrder {
    /// Decide from the data
    #[default]
    Detect,
    /// Field strength first, flux density second
    HB,
    /// Flux density first, field strength second
    BH,
}

impl ColumnOrder {
    /// Parse an order keyword.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" | "detect" => Some(Self::Detect),
            "hb" => Some(Self::HB),
            "bh" => Some(Self::BH),
            _ => None,
        }
    }
}

/// Monotone B-H curve with piecewise-linear interpolation.
///
/// Samples are strictly increasing in H and non-decreasing in B, starting at
/// H = 0. A table that starts above H = 0 gets an implicit `(0, 0)` sample.
/// The table is immutable after construction and is shared read-only by all
/// region evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct BhTable {
    name: String,
    h: Vec<f64>,
    b: Vec<f64>,
    margin: f64,
}

impl BhTable {
    /// Build a table from field strength (A/m) and flux density (T) samples.
    pub fn new(name: impl Into<String>, h: Vec<f64>, b: Vec<f64>) -> Result<Self> {
        let name = name.into();

        if h.len() != b.len() {
            return Err(MagError::table(
                &name,
                format!("H has {} samples but B has {}", h.len(), b.len()),
            ));
        }
        if h.len() < 2 {
            return Err(MagError::table(&name, "at least two samples are required"));
        }

        for (row, (&hi, &bi)) in h.iter().zip(&b).enumerate() {
            if !hi.is_finite() || !bi.is_finite() {
                return Err(MagError::table(&name, format!("non-finite sample at row {}", row)));
            }
            if hi < 0.0 || bi < 0.0 {
                return Err(MagError::table(
                    &name,
                    format!("negative sample at row {} (H = {}, B = {})", row, hi, bi),
                ));
            }
        }

        for row in 1..h.len() {
            if h[row] <= h[row - 1] {
                return Err(MagError::table(
                    &name,
                    format!("H is not strictly increasing at row {}", row),
                ));
            }
            if b[row] < b[row - 1] {
                return Err(MagError::table(&name, format!("B decreases at row {}", row)));
            }
        }

        let (mut h, mut b) = (h, b);
        if h[0] > 0.0 {
            h.insert(0, 0.0);
            b.insert(0, 0.0);
        }

        Ok(Self {
            name,
            h,
            b,
            margin: DEFAULT_RANGE_MARGIN,
        })
    }

    /// Build a table from two raw columns, validating which one is B.
    pub fn from_columns(
        name: impl Into<String>,
        first: Vec<f64>,
        second: Vec<f64>,
        order: ColumnOrder,
    ) -> Result<Self> {
        let name = name.into();
        let order = match order {
            ColumnOrder::Detect => detect_order(&name, &first, &second)?,
            explicit => explicit,
        };
        match order {
            ColumnOrder::BH => Self::new(name, second, first),
            _ => Self::new(name, first, second),
        }
    }

    /// Parse two-column text data (comma or whitespace separated).
    ///
    /// `#` starts a comment. Non-numeric lines before the first data row are
    /// treated as headers.
    pub fn parse(name: impl Into<String>, text: &str, order: ColumnOrder) -> Result<Self> {
        let name = name.into();
        let mut first = Vec::new();
        let mut second = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .collect();
            let values: Option<Vec<f64>> = fields.iter().map(|s| s.parse::<f64>().ok()).collect();

            match values {
                Some(values) if values.len() >= 2 => {
                    first.push(values[0]);
                    second.push(values[1]);
                }
                Some(_) => {
                    return Err(MagError::table(
                        &name,
                        format!("line {} has fewer than two columns", index + 1),
                    ));
                }
                None if first.is_empty() => continue,
                None => {
                    return Err(MagError::table(
                        &name,
                        format!("line {} is not numeric", index + 1),
                    ));
                }
            }
        }

        Self::from_columns(name, first, second, order)
    }

    /// Load a table from a file. The table is named after the file stem.
    pub fn load(path: &Path, order: ColumnOrder) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MagError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(name, &text, order)
    }

    /// Export as `h,b` lines. Re-parsing the output reproduces the table.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("# H [A/m], B [T]\n");
        for (h, b) in self.samples() {
            out.push_str(&format!("{},{}\n", h, b));
        }
        out
    }

    /// Set the relative margin past the last sample before lookups warn.
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin.max(0.0);
        self
    }

    /// Rename the table.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.h.len()
    }

    pub fn is_empty(&self) -> bool {
        self.h.is_empty()
    }

    /// Largest tabulated field strength.
    pub fn h_max(&self) -> f64 {
        self.h[self.h.len() - 1]
    }

    /// Flux density at H = 0.
    pub fn remanence(&self) -> f64 {
        self.b[0]
    }

    /// Iterate over the stored `(H, B)` samples.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.h.iter().copied().zip(self.b.iter().copied())
    }

    /// Index of the segment used for `h` (the last segment past the table).
    fn segment(&self, h: f64) -> usize {
        let count = self.h.partition_point(|&x| x <= h);
        count.saturating_sub(1).min(self.h.len() - 2)
    }

    fn slope(&self, segment: usize) -> f64 {
        (self.b[segment + 1] - self.b[segment]) / (self.h[segment + 1] - self.h[segment])
    }

    /// Interpolated curve value B(H) at the field magnitude `h`.
    ///
    /// Past the last sample the last segment's slope is continued.
    pub fn permeability_at(&self, h: f64) -> f64 {
        let h = h.abs();
        let i = self.segment(h);
        self.b[i] + self.slope(i) * (h - self.h[i])
    }

    /// Slope dB/dH of the interpolant at the field magnitude `h`.
    pub fn derivative_at(&self, h: f64) -> f64 {
        self.slope(self.segment(h.abs()))
    }

    /// Secant permeability B/H; the initial slope at the origin.
    pub fn secant_permeability(&self, h: f64) -> f64 {
        let h = h.abs();
        if h <= f64::EPSILON * self.h_max() {
            self.derivative_at(0.0)
        } else {
            self.permeability_at(h) / h
        }
    }

    /// Co-energy density: integral of B dH from 0 to `|h|` (J/m^3).
    pub fn coenergy_density(&self, h: f64) -> f64 {
        let h = h.abs();
        let seg = self.segment(h);
        let mut w = 0.0;
        for i in 0..seg {
            w += 0.5 * (self.b[i] + self.b[i + 1]) * (self.h[i + 1] - self.h[i]);
        }
        w + 0.5 * (self.b[seg] + self.permeability_at(h)) * (h - self.h[seg])
    }

    /// Energy density: integral of H dB up to the working point (J/m^3).
    pub fn energy_density(&self, h: f64) -> f64 {
        let h = h.abs();
        h * self.permeability_at(h) - self.coenergy_density(h)
    }

    /// Warn when `|h|` lies past the last sample by more than the margin.
    pub fn check_range(&self, h: f64) -> Option<OutOfRangeWarning> {
        let h = h.abs();
        let limit = self.h_max();
        if h > limit * (1.0 + self.margin) {
            Some(OutOfRangeWarning {
                table: self.name.clone(),
                field_strength: h,
                table_limit: limit,
            })
        } else {
            None
        }
    }
}

fn detect_order(name: &str, first: &[f64], second: &[f64]) -> Result<ColumnOrder> {
    let max_abs = |v: &[f64]| v.iter().fold(0.0f64, |m, x| m.max(x.abs()));
    let (m1, m2) = (max_abs(first), max_abs(second));

    let first_is_b = m1 <= MAX_FLUX_DENSITY && m1 < m2;
    let second_is_b = m2 <= MAX_FLUX_DENSITY && m2 < m1;

    match (first_is_b, second_is_b) {
        (true, false) => Ok(ColumnOrder::BH),
        (false, true) => Ok(ColumnOrder::HB),
        _ => Err(MagError::table(
            name,
            "cannot tell which column holds B; specify the column order explicitly",
        )),
    }
}
