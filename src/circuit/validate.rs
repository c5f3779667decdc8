//! Circuit validation.

use std::collections::VecDeque;

use crate::error::{MagError, Result};

use super::graph::{MagneticCircuit, RunnerDef};
use super::types::NodeId;

/// Validate a circuit before any iteration starts.
///
/// Checks:
/// - There is at least one region and its geometry is usable
/// - Every material is well formed
/// - Every node has a flux path to the reference node
/// - Voltage-driven coils under a steady runner have a positive resistance
/// - Runner, scan, reports and solver settings are consistent
pub fn validate_circuit(circuit: &MagneticCircuit) -> Result<()> {
    if circuit.regions.is_empty() {
        return Err(MagError::configuration("circuit has no regions"));
    }

    for region in &circuit.regions {
        let bad = |message: &str| {
            Err(MagError::configuration(format!("region '{}': {}", region.name, message)))
        };
        if !(region.length > 0.0) || !region.length.is_finite() {
            return bad("length must be positive");
        }
        if !(region.area > 0.0) || !region.area.is_finite() {
            return bad("area must be positive");
        }
        if region.nodes[0] == region.nodes[1] {
            return bad("both ends are on the same node");
        }
        let norm = region.axis.iter().map(|c| c * c).sum::<f64>().sqrt();
        if !(norm > 0.0) || !norm.is_finite() {
            return bad("axis must be a non-zero vector");
        }
    }

    for material in &circuit.materials {
        material.validate()?;
    }

    check_connectivity(circuit)?;

    let steady = matches!(circuit.runner, RunnerDef::Steady { .. });
    for coil in &circuit.coils {
        if steady && coil.resistance() == Some(0.0) {
            return Err(MagError::circuit(
                &coil.name,
                "a steady solve needs a positive resistance for voltage drive",
            ));
        }
    }

    if let RunnerDef::Transient {
        total_time,
        time_step,
        ..
    } = circuit.runner
    {
        if !(time_step > 0.0) || !time_step.is_finite() {
            return Err(MagError::configuration(format!("time step must be positive, got {}", time_step)));
        }
        if !(total_time >= 0.0) || !total_time.is_finite() {
            return Err(MagError::configuration(format!(
                "total time must be non-negative, got {}",
                total_time
            )));
        }
    }

    if let Some(scan) = &circuit.scan {
        let k = circuit
            .find_coil(&scan.coil)
            .ok_or_else(|| MagError::UnknownCoil { coil: scan.coil.clone() })?;
        if circuit.coils[k].is_voltage_driven() {
            return Err(MagError::configuration(format!(
                "scan coil '{}' must be current driven",
                scan.coil
            )));
        }
        if scan.count == 0 {
            return Err(MagError::configuration("scan needs at least one level"));
        }
    }

    for report in &circuit.reports {
        report.validate(circuit)?;
    }

    circuit.settings.validate()
}

/// Every node must reach the reference through regions, otherwise its
/// potential is undetermined.
fn check_connectivity(circuit: &MagneticCircuit) -> Result<()> {
    let mut adjacency = vec![Vec::new(); circuit.num_nodes];
    for region in &circuit.regions {
        let [a, b] = region.nodes;
        adjacency[a.0].push(b);
        adjacency[b.0].push(a);
    }

    let mut reached = vec![false; circuit.num_nodes];
    let mut queue = VecDeque::from([NodeId::GROUND]);
    reached[0] = true;
    while let Some(node) = queue.pop_front() {
        for next in &adjacency[node.0] {
            if !reached[next.0] {
                reached[next.0] = true;
                queue.push_back(*next);
            }
        }
    }

    match reached.iter().position(|r| !r) {
        Some(n) => Err(MagError::configuration(format!(
            "node '{}' has no flux path to the reference node",
            circuit.node_name(NodeId(n))
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use crate::circuit::{MagneticCircuitBuilder, RunnerDef, ScanDef};
    use crate::coil::{CoilSpecification, CoilTopology, Excitation, Waveform, Winding};
    use crate::error::{ErrorCategory, MagError};
    use crate::material::MaterialModel;
    use crate::report::Report;

    fn loop_builder() -> MagneticCircuitBuilder {
        MagneticCircuitBuilder::new()
            .region("core", "0", "a", 0.1, 1e-4)
            .region("gap", "a", "0", 1e-3, 1e-4)
            .material(MaterialModel::vacuum("Air"), &["core", "gap"])
    }

    fn voltage_coil(resistance: f64) -> CoilSpecification {
        CoilSpecification::new(
            "drive",
            "core",
            CoilTopology::Open {
                inlet: "In".into(),
                outlet: "Out".into(),
            },
            Winding::Stranded { turns: 10 },
            Excitation::Voltage {
                voltage: Waveform::Harmonic {
                    amplitude: 1.0,
                    frequency: 50.0,
                    phase: 0.0,
                },
                resistance,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_valid_loop() {
        assert!(loop_builder().build().is_ok());
    }

    #[test]
    fn test_floating_node() {
        let err = loop_builder()
            .region("island", "x", "y", 0.1, 1e-4)
            .material(MaterialModel::vacuum("Air2"), &["island"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'x'"));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_bad_geometry() {
        let err = MagneticCircuitBuilder::new()
            .region("core", "a", "0", 0.0, 1e-4)
            .material(MaterialModel::vacuum("Air"), &["core"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("length"));

        let err = MagneticCircuitBuilder::new()
            .region("core", "a", "a", 0.1, 1e-4)
            .material(MaterialModel::vacuum("Air"), &["core"])
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_bad_material_is_rejected() {
        let err = MagneticCircuitBuilder::new()
            .region("core", "a", "0", 0.1, 1e-4)
            .material(MaterialModel::constant("Odd", -3.0), &["core"])
            .build()
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_steady_voltage_coil_needs_resistance() {
        let err = loop_builder().coil(voltage_coil(0.0)).build().unwrap_err();
        assert!(matches!(err, MagError::CircuitConfiguration { .. }));

        // under time stepping the flux derivative keeps the row well posed
        let transient = RunnerDef::Transient {
            total_time: 0.02,
            time_step: 1e-3,
            total_inner_iterations: 5,
        };
        assert!(loop_builder().coil(voltage_coil(0.0)).runner(transient).build().is_ok());
        assert!(loop_builder().coil(voltage_coil(1.5)).build().is_ok());
    }

    #[test]
    fn test_bad_time_step() {
        let runner = RunnerDef::Transient {
            total_time: 0.02,
            time_step: 0.0,
            total_inner_iterations: 5,
        };
        assert!(loop_builder().runner(runner).build().is_err());
    }

    #[test]
    fn test_references_in_reports_and_scan() {
        let err = loop_builder()
            .report(Report::Flux { region: "yoke".into() })
            .build()
            .unwrap_err();
        assert!(matches!(err, MagError::UnknownRegion { .. }));

        let err = loop_builder()
            .scan(ScanDef {
                coil: "missing".into(),
                start: 0.0,
                stop: 1.0,
                count: 3,
                iterations: 5,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, MagError::UnknownCoil { .. }));
    }
}
