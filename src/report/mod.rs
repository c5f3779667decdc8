//! Probes, integral reports and field export.
//!
//! Everything here reads a finished [`Solution`]; nothing feeds back into the
//! solve. The plotting/visualisation side is an external collaborator reached
//! through [`FieldSink`].

use crate::circuit::{MagneticCircuit, RegionId};
use crate::error::{MagError, Result};
use crate::material::MU_0;

/// Field quantities of one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionProbe {
    /// H along the region axis (A/m)
    pub field_strength: f64,
    /// B along the region axis (T)
    pub flux_density: f64,
    /// Flux through the region cross-section (Wb)
    pub flux: f64,
    /// Secant permeability B/H (H/m)
    pub permeability: f64,
}

/// Converged (or best available) state of a magnetic network.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub time: f64,
    /// One entry per region, in region order
    pub regions: Vec<RegionProbe>,
    /// Terminal current of every coil, in coil order
    pub coil_currents: Vec<f64>,
}

impl Solution {
    /// Point query of one region by name.
    pub fn probe(&self, circuit: &MagneticCircuit, region: &str) -> Result<RegionProbe> {
        let id = region_id(circuit, region, "probe")?;
        Ok(self.regions[id.0])
    }
}

/// Scalar quantity extracted from a solution.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Flux through a region (Wb)
    Flux { region: String },
    /// Flux density in a region (T)
    FluxDensity { region: String },
    /// Field strength in a region (A/m)
    FieldStrength { region: String },
    /// Stored magnetic energy of one region, or of all regions (J)
    Energy { region: Option<String> },
    /// Maxwell-stress attraction across an air-gap region (N)
    GapForce { region: String },
    /// Flux linkage N Phi of a coil (Wb)
    FluxLinkage { coil: String },
    /// Flux linkage over current (H); NaN at zero current
    Inductance { coil: String },
    /// Terminal current of a coil (A)
    CoilCurrent { coil: String },
    /// Joule losses of the winding current in a region (W)
    OhmicLosses { region: String },
}

impl Report {
    /// Build a report from a keyword and an optional target name.
    pub fn from_keyword(kind: &str, target: Option<&str>) -> Option<Self> {
        let region = || target.map(str::to_string);
        match kind.to_lowercase().as_str() {
            "flux" => Some(Self::Flux { region: region()? }),
            "b" | "flux_density" => Some(Self::FluxDensity { region: region()? }),
            "h" | "field_strength" => Some(Self::FieldStrength { region: region()? }),
            "energy" => Some(Self::Energy { region: region() }),
            "force" | "gap_force" => Some(Self::GapForce { region: region()? }),
            "linkage" | "flux_linkage" => Some(Self::FluxLinkage { coil: region()? }),
            "inductance" => Some(Self::Inductance { coil: region()? }),
            "current" => Some(Self::CoilCurrent { coil: region()? }),
            "losses" | "ohmic_losses" => Some(Self::OhmicLosses { region: region()? }),
            _ => None,
        }
    }

    /// Short label for tables and logs.
    pub fn label(&self) -> String {
        match self {
            Report::Flux { region } => format!("flux({})", region),
            Report::FluxDensity { region } => format!("B({})", region),
            Report::FieldStrength { region } => format!("H({})", region),
            Report::Energy { region: Some(region) } => format!("energy({})", region),
            Report::Energy { region: None } => "energy".to_string(),
            Report::GapForce { region } => format!("force({})", region),
            Report::FluxLinkage { coil } => format!("linkage({})", coil),
            Report::Inductance { coil } => format!("inductance({})", coil),
            Report::CoilCurrent { coil } => format!("current({})", coil),
            Report::OhmicLosses { region } => format!("losses({})", region),
        }
    }

    /// Check that the target exists.
    pub fn validate(&self, circuit: &MagneticCircuit) -> Result<()> {
        match self {
            Report::Flux { region }
            | Report::FluxDensity { region }
            | Report::FieldStrength { region }
            | Report::GapForce { region }
            | Report::OhmicLosses { region }
            | Report::Energy { region: Some(region) } => {
                region_id(circuit, region, "report").map(|_| ())
            }
            Report::Energy { region: None } => Ok(()),
            Report::FluxLinkage { coil } | Report::Inductance { coil } | Report::CoilCurrent { coil } => {
                coil_index(circuit, coil).map(|_| ())
            }
        }
    }

    pub fn evaluate(&self, circuit: &MagneticCircuit, solution: &Solution) -> Result<f64> {
        match self {
            Report::Flux { region } => Ok(solution.probe(circuit, region)?.flux),
            Report::FluxDensity { region } => Ok(solution.probe(circuit, region)?.flux_density),
            Report::FieldStrength { region } => Ok(solution.probe(circuit, region)?.field_strength),

            Report::Energy { region: Some(region) } => {
                let id = region_id(circuit, region, "report")?;
                Ok(region_energy(circuit, solution, id))
            }
            Report::Energy { region: None } => Ok((0..circuit.regions.len())
                .map(|i| region_energy(circuit, solution, RegionId(i)))
                .sum()),

            Report::GapForce { region } => {
                let id = region_id(circuit, region, "report")?;
                let b = solution.regions[id.0].flux_density;
                Ok(b * b * circuit.regions[id.0].area / (2.0 * MU_0))
            }

            Report::FluxLinkage { coil } => {
                let k = coil_index(circuit, coil)?;
                Ok(flux_linkage(circuit, solution, k))
            }
            Report::Inductance { coil } => {
                let k = coil_index(circuit, coil)?;
                let current = solution.coil_currents[k];
                if current == 0.0 {
                    Ok(f64::NAN)
                } else {
                    Ok(flux_linkage(circuit, solution, k) / current)
                }
            }
            Report::CoilCurrent { coil } => {
                let k = coil_index(circuit, coil)?;
                Ok(solution.coil_currents[k])
            }

            Report::OhmicLosses { region } => {
                let id = region_id(circuit, region, "report")?;
                let sigma = circuit.material_of(id).conductivity;
                if sigma <= 0.0 {
                    return Ok(0.0);
                }
                let r = &circuit.regions[id.0];
                let j = current_density(circuit, solution, id);
                Ok(j * j / sigma * r.volume())
            }
        }
    }
}

fn region_id(circuit: &MagneticCircuit, region: &str, referenced_by: &str) -> Result<RegionId> {
    circuit.find_region(region).ok_or_else(|| MagError::UnknownRegion {
        region: region.to_string(),
        referenced_by: referenced_by.to_string(),
    })
}

fn coil_index(circuit: &MagneticCircuit, coil: &str) -> Result<usize> {
    circuit
        .find_coil(coil)
        .ok_or_else(|| MagError::UnknownCoil { coil: coil.to_string() })
}

fn region_energy(circuit: &MagneticCircuit, solution: &Solution, id: RegionId) -> f64 {
    let h = solution.regions[id.0].field_strength;
    circuit.material_of(id).energy_density(h) * circuit.regions[id.0].volume()
}

fn flux_linkage(circuit: &MagneticCircuit, solution: &Solution, coil: usize) -> f64 {
    let region = circuit.coil_region[coil];
    circuit.coils[coil].turns() * solution.regions[region.0].flux
}

/// Winding current density N I / A summed over the coils in a region.
fn current_density(circuit: &MagneticCircuit, solution: &Solution, id: RegionId) -> f64 {
    let ampere_turns: f64 = circuit
        .coils_in(id)
        .map(|k| circuit.coils[k].turns() * solution.coil_currents[k])
        .sum();
    ampere_turns / circuit.regions[id.0].area
}

/// Time history of one report over a transient run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMonitor {
    pub report: Report,
    pub values: Vec<(f64, f64)>,
}

impl ReportMonitor {
    pub fn new(report: Report) -> Self {
        Self {
            report,
            values: Vec::new(),
        }
    }

    /// Evaluate the report and append `(time, value)`.
    pub fn record(&mut self, circuit: &MagneticCircuit, solution: &Solution) -> Result<()> {
        let value = self.report.evaluate(circuit, solution)?;
        self.values.push((solution.time, value));
        Ok(())
    }
}

/// Per-region field that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    MagneticFluxDensity,
    MagneticFieldStrength,
    MagneticFlux,
    CurrentDensity,
}

impl FieldKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "b" | "flux_density" => Some(Self::MagneticFluxDensity),
            "h" | "field_strength" => Some(Self::MagneticFieldStrength),
            "flux" => Some(Self::MagneticFlux),
            "j" | "current_density" => Some(Self::CurrentDensity),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::MagneticFluxDensity => "Magnetic Flux Density",
            FieldKind::MagneticFieldStrength => "Magnetic Field Strength",
            FieldKind::MagneticFlux => "Magnetic Flux",
            FieldKind::CurrentDensity => "Electric Current Density",
        }
    }
}

/// Receiver of exported fields (visualisation writer, test collector, ...).
pub trait FieldSink {
    /// Accept one named field as `(region, value)` pairs.
    fn write_field(&mut self, name: &str, values: &[(String, f64)]) -> Result<()>;

    /// Called once after all fields of a save.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects fields in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub fields: Vec<(String, Vec<(String, f64)>)>,
    pub saves: usize,
}

impl FieldSink for MemorySink {
    fn write_field(&mut self, name: &str, values: &[(String, f64)]) -> Result<()> {
        self.fields.push((name.to_string(), values.to_vec()));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.saves += 1;
        Ok(())
    }
}

/// Pass-through export hook: pick fields, then save them to a sink.
#[derive(Debug, Clone, Default)]
pub struct FieldExport {
    fields: Vec<FieldKind>,
}

impl FieldExport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a field; requesting it twice has no effect.
    pub fn add_field(&mut self, kind: FieldKind) {
        if !self.fields.contains(&kind) {
            self.fields.push(kind);
        }
    }

    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    pub fn save(&self, circuit: &MagneticCircuit, solution: &Solution, sink: &mut dyn FieldSink) -> Result<()> {
        for kind in &self.fields {
            let values: Vec<(String, f64)> = circuit
                .regions
                .iter()
                .map(|r| {
                    let p = &solution.regions[r.id.0];
                    let value = match kind {
                        FieldKind::MagneticFluxDensity => p.flux_density,
                        FieldKind::MagneticFieldStrength => p.field_strength,
                        FieldKind::MagneticFlux => p.flux,
                        FieldKind::CurrentDensity => current_density(circuit, solution, r.id),
                    };
                    (r.name.clone(), value)
                })
                .collect();
            sink.write_field(kind.label(), &values)?;
        }
        sink.finish()
    }
}
