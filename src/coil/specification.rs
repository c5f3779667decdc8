//! Coil specifications and the source terms they contribute.

use super::waveform::Waveform;
use crate::error::{MagError, Result};

/// Geometric description of how current flows through the coil region.
#[derive(Debug, Clone, PartialEq)]
pub enum CoilTopology {
    /// Current circulates around `normal` through `center`.
    Closed {
        center: [f64; 3],
        normal: [f64; 3],
        inner_radius: f64,
        outer_radius: f64,
    },
    /// Current enters through one boundary and leaves through another.
    Open { inlet: String, outlet: String },
}

/// Winding model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Winding {
    /// Turns carry the same prescribed current.
    Stranded { turns: u32 },
}

/// How the coil is driven. Exactly one mode is active.
#[derive(Debug, Clone, PartialEq)]
pub enum Excitation {
    /// Prescribed terminal current (A)
    Current(Waveform),
    /// Terminal voltage (V) across a series resistance (ohm)
    Voltage { voltage: Waveform, resistance: f64 },
}

/// Direction of the source current density inside the coil region.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDirection {
    /// Around a unit `axis` through `center`
    Azimuthal { center: [f64; 3], axis: [f64; 3] },
    /// From the inlet boundary towards the outlet boundary
    Conducting { inlet: String, outlet: String },
}

/// Current drive of a source at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceDrive {
    /// Current is known.
    Prescribed { current: f64 },
    /// Current is a circuit unknown solved together with the field.
    Coupled { voltage: f64, resistance: f64 },
}

/// Source contributed by one coil at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDistribution {
    pub coil: String,
    pub region: String,
    pub turns: f64,
    pub drive: SourceDrive,
    pub direction: SourceDirection,
}

impl SourceDistribution {
    /// Ampere-turns when the current is prescribed.
    pub fn ampere_turns(&self) -> Option<f64> {
        match self.drive {
            SourceDrive::Prescribed { current } => Some(self.turns * current),
            SourceDrive::Coupled { .. } => None,
        }
    }

    /// Ampere-turns for a given terminal current.
    pub fn ampere_turns_for(&self, current: f64) -> f64 {
        self.turns * current
    }
}

/// A coil attached to one region.
#[derive(Debug, Clone, PartialEq)]
pub struct CoilSpecification {
    pub name: String,
    pub region: String,
    pub topology: CoilTopology,
    pub winding: Winding,
    pub excitation: Excitation,
}

impl CoilSpecification {
    /// Create a coil, rejecting ill-posed setups up front.
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        topology: CoilTopology,
        winding: Winding,
        excitation: Excitation,
    ) -> Result<Self> {
        let coil = Self {
            name: name.into(),
            region: region.into(),
            topology,
            winding,
            excitation,
        };
        coil.validate()?;
        Ok(coil)
    }

    fn validate(&self) -> Result<()> {
        let Winding::Stranded { turns } = self.winding;
        if turns == 0 {
            return Err(MagError::configuration(format!("coil '{}' has zero turns", self.name)));
        }

        if let CoilTopology::Closed {
            normal,
            inner_radius,
            outer_radius,
            ..
        } = &self.topology
        {
            let n2 = normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2];
            if !(n2 > 0.0) || !n2.is_finite() {
                return Err(MagError::configuration(format!(
                    "coil '{}' has a zero or non-finite normal",
                    self.name
                )));
            }
            if *inner_radius < 0.0 || outer_radius < inner_radius {
                return Err(MagError::configuration(format!(
                    "coil '{}' needs 0 <= inner radius <= outer radius",
                    self.name
                )));
            }
        }

        match &self.excitation {
            Excitation::Current(waveform) => waveform.validate(),
            Excitation::Voltage {
                voltage,
                resistance,
            } => {
                voltage.validate()?;
                if !resistance.is_finite() || *resistance < 0.0 {
                    return Err(MagError::circuit(
                        &self.name,
                        format!("resistance must be non-negative, got {}", resistance),
                    ));
                }
                if *resistance == 0.0 && voltage.is_constant() && voltage.value_at(0.0) != 0.0 {
                    return Err(MagError::circuit(
                        &self.name,
                        "constant voltage across zero resistance drives an unbounded flux ramp",
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn turns(&self) -> f64 {
        let Winding::Stranded { turns } = self.winding;
        turns as f64
    }

    pub fn is_voltage_driven(&self) -> bool {
        matches!(self.excitation, Excitation::Voltage { .. })
    }

    /// Series resistance of a voltage-driven coil.
    pub fn resistance(&self) -> Option<f64> {
        match self.excitation {
            Excitation::Voltage { resistance, .. } => Some(resistance),
            Excitation::Current(_) => None,
        }
    }

    pub fn direction(&self) -> SourceDirection {
        match &self.topology {
            CoilTopology::Closed { center, normal, .. } => {
                let n = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
                SourceDirection::Azimuthal {
                    center: *center,
                    axis: [normal[0] / n, normal[1] / n, normal[2] / n],
                }
            }
            CoilTopology::Open { inlet, outlet } => SourceDirection::Conducting {
                inlet: inlet.clone(),
                outlet: outlet.clone(),
            },
        }
    }

    /// Source contributed at `time`.
    pub fn source_term_at(&self, time: f64) -> SourceDistribution {
        let drive = match &self.excitation {
            Excitation::Current(waveform) => SourceDrive::Prescribed {
                current: waveform.value_at(time),
            },
            Excitation::Voltage {
                voltage,
                resistance,
            } => SourceDrive::Coupled {
                voltage: voltage.value_at(time),
                resistance: *resistance,
            },
        };

        SourceDistribution {
            coil: self.name.clone(),
            region: self.region.clone(),
            turns: self.turns(),
            drive,
            direction: self.direction(),
        }
    }
}
