//! Programmatic construction of a [`MagneticCircuit`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::graph::{MagneticCircuit, Region, RunnerDef, ScanDef, DEFAULT_AXIS};
use super::types::{BranchId, NodeId, RegionId};
use super::validate::validate_circuit;
use crate::coil::CoilSpecification;
use crate::error::{MagError, Result};
use crate::material::{MaterialKind, MaterialModel};
use crate::report::{FieldExport, FieldKind, Report};
use crate::solver::SolverSettings;

#[derive(Debug, Clone)]
struct RegionEntry {
    name: String,
    nodes: [String; 2],
    length: f64,
    area: f64,
    axis: [f64; 3],
}

/// Collects regions, materials and coils, then resolves names and validates
/// everything at once in [`MagneticCircuitBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct MagneticCircuitBuilder {
    regions: Vec<RegionEntry>,
    materials: Vec<(MaterialModel, Vec<String>)>,
    coils: Vec<CoilSpecification>,
    runner: RunnerDef,
    settings: SolverSettings,
    reports: Vec<Report>,
    scan: Option<ScanDef>,
    exports: FieldExport,
}

impl MagneticCircuitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region from node `a` to node `b` along the default axis.
    pub fn region(self, name: &str, a: &str, b: &str, length: f64, area: f64) -> Self {
        self.region_with_axis(name, a, b, length, area, DEFAULT_AXIS)
    }

    pub fn region_with_axis(mut self, name: &str, a: &str, b: &str, length: f64, area: f64, axis: [f64; 3]) -> Self {
        self.regions.push(RegionEntry {
            name: name.to_string(),
            nodes: [a.to_string(), b.to_string()],
            length,
            area,
            axis,
        });
        self
    }

    /// Add a material and the regions it is assigned to.
    pub fn material(mut self, material: MaterialModel, regions: &[&str]) -> Self {
        let regions = regions.iter().map(|r| r.to_string()).collect();
        self.materials.push((material, regions));
        self
    }

    pub fn coil(mut self, coil: CoilSpecification) -> Self {
        self.coils.push(coil);
        self
    }

    pub fn runner(mut self, runner: RunnerDef) -> Self {
        self.runner = runner;
        self
    }

    pub fn settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn report(mut self, report: Report) -> Self {
        self.reports.push(report);
        self
    }

    pub fn scan(mut self, scan: ScanDef) -> Self {
        self.scan = Some(scan);
        self
    }

    pub fn export(mut self, kind: FieldKind) -> Self {
        self.exports.add_field(kind);
        self
    }

    /// Resolve all names and validate the result.
    pub fn build(self) -> Result<MagneticCircuit> {
        check_unique("region", self.regions.iter().map(|r| r.name.as_str()))?;
        check_unique("material", self.materials.iter().map(|(m, _)| m.name.as_str()))?;
        check_unique("coil", self.coils.iter().map(|c| c.name.as_str()))?;

        // The reference node is always node 0
        let mut node_map = HashMap::new();
        node_map.insert("0".to_string(), NodeId::GROUND);
        node_map.insert("GND".to_string(), NodeId::GROUND);
        let mut node_names = vec!["0".to_string()];

        let mut regions = Vec::with_capacity(self.regions.len());
        for (i, entry) in self.regions.into_iter().enumerate() {
            let mut nodes = [NodeId::GROUND; 2];
            for (slot, name) in nodes.iter_mut().zip(&entry.nodes) {
                *slot = *node_map.entry(name.clone()).or_insert_with(|| {
                    node_names.push(name.clone());
                    NodeId(node_names.len() - 1)
                });
            }
            regions.push(Region {
                id: RegionId(i),
                name: entry.name,
                nodes,
                length: entry.length,
                area: entry.area,
                axis: entry.axis,
            });
        }
        let num_nodes = node_names.len();

        let find_region = |name: &str, referenced_by: &str| {
            regions
                .iter()
                .position(|r| r.name == name)
                .ok_or_else(|| MagError::UnknownRegion {
                    region: name.to_string(),
                    referenced_by: referenced_by.to_string(),
                })
        };

        // Exactly one material per region
        let mut assigned: Vec<Option<usize>> = vec![None; regions.len()];
        for (m, (material, names)) in self.materials.iter().enumerate() {
            for name in names {
                let r = find_region(name, &material.name)?;
                if let Some(first) = assigned[r] {
                    return Err(MagError::DuplicateAssignment {
                        region: name.clone(),
                        first: self.materials[first].0.name.clone(),
                        second: material.name.clone(),
                    });
                }
                assigned[r] = Some(m);
            }
        }
        let region_material = assigned
            .iter()
            .zip(&regions)
            .map(|(m, r)| {
                m.ok_or_else(|| MagError::UnassignedRegion {
                    region: r.name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut coil_region = Vec::with_capacity(self.coils.len());
        let mut coil_branch = Vec::with_capacity(self.coils.len());
        let mut num_branches = 0usize;
        for coil in &self.coils {
            coil_region.push(RegionId(find_region(&coil.region, &coil.name)?));
            if coil.is_voltage_driven() {
                coil_branch.push(Some(BranchId(num_branches)));
                num_branches += 1;
            } else {
                coil_branch.push(None);
            }
        }

        // An explicit solver margin overrides the one each table carries
        let margin = self.settings.range_margin;
        let materials = self
            .materials
            .into_iter()
            .map(|(mut material, _)| {
                if let (Some(margin), MaterialKind::NonLinear { table }) = (margin, &mut material.kind) {
                    if table.margin() != margin {
                        *table = Arc::new(table.as_ref().clone().with_margin(margin));
                    }
                }
                material
            })
            .collect();

        let circuit = MagneticCircuit {
            regions,
            materials,
            region_material,
            coils: self.coils,
            coil_region,
            coil_branch,
            node_map,
            node_names,
            num_nodes,
            num_branches,
            runner: self.runner,
            settings: self.settings,
            reports: self.reports,
            scan: self.scan,
            exports: self.exports,
        };

        validate_circuit(&circuit)?;
        Ok(circuit)
    }
}

fn check_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(MagError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
