//! Magnetic circuit structure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::builder::MagneticCircuitBuilder;
use super::types::{BranchId, NodeId, RegionId, VarIndex};
use crate::coil::{CoilSpecification, CoilTopology, Excitation, TimeTable, Waveform, Winding};
use crate::dsl::{CaseAst, Statement, Value};
use crate::error::{MagError, Result};
use crate::material::{BhTable, ColumnOrder, MaterialModel};
use crate::report::{FieldExport, FieldKind, Report};
use crate::solver::{IterationScheme, SolverSettings, DEFAULT_MAX_BACKTRACKS, DEFAULT_MAX_ITERATIONS};

/// Direction of a region when no axis is given.
pub const DEFAULT_AXIS: [f64; 3] = [1.0, 0.0, 0.0];

/// Normal of a closed coil when none is given.
pub const DEFAULT_COIL_NORMAL: [f64; 3] = [0.0, 0.0, 1.0];

/// A material region, modelled as a flux tube between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    /// Flux enters at `nodes[0]` and leaves at `nodes[1]`
    pub nodes: [NodeId; 2],
    /// Mean path length (m)
    pub length: f64,
    /// Cross-section (m^2)
    pub area: f64,
    /// Unit direction of the flux path, used by magnet remanence
    pub axis: [f64; 3],
}

impl Region {
    pub fn volume(&self) -> f64 {
        self.length * self.area
    }
}

/// How the case is driven.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunnerDef {
    /// Magnetostatic solve with a fixed iteration budget.
    Steady { total_iterations: usize },
    /// Time stepping with a fixed inner budget per step.
    Transient {
        total_time: f64,
        time_step: f64,
        total_inner_iterations: usize,
    },
}

impl Default for RunnerDef {
    fn default() -> Self {
        RunnerDef::Steady {
            total_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Parametric sweep of a current-driven coil.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDef {
    pub coil: String,
    pub start: f64,
    pub stop: f64,
    pub count: usize,
    /// Iterations run at every level
    pub iterations: usize,
}

impl ScanDef {
    /// Evenly spaced levels from `start` to `stop` inclusive.
    pub fn values(&self) -> Vec<f64> {
        match self.count {
            0 => Vec::new(),
            1 => vec![self.start],
            n => (0..n)
                .map(|i| self.start + (self.stop - self.start) * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }
}

/// A complete magnetic circuit ready for simulation.
///
/// Built once and never mutated during a solve.
#[derive(Debug, Clone)]
pub struct MagneticCircuit {
    pub regions: Vec<Region>,

    pub materials: Vec<MaterialModel>,

    /// Index into `materials` for every region
    pub region_material: Vec<usize>,

    pub coils: Vec<CoilSpecification>,

    /// Region carrying each coil
    pub coil_region: Vec<RegionId>,

    /// Current unknown of each voltage-driven coil
    pub coil_branch: Vec<Option<BranchId>>,

    /// Mapping from node names to node IDs
    pub node_map: HashMap<String, NodeId>,

    /// Reverse mapping from node IDs to names (for error messages)
    pub node_names: Vec<String>,

    /// Number of nodes (including the reference)
    pub num_nodes: usize,

    /// Number of coil current unknowns
    pub num_branches: usize,

    pub runner: RunnerDef,
    pub settings: SolverSettings,
    pub reports: Vec<Report>,
    pub scan: Option<ScanDef>,
    pub exports: FieldExport,
}

impl MagneticCircuit {
    /// Build a circuit from a parsed case.
    ///
    /// Relative table paths are resolved against `base_dir`.
    pub fn from_ast(ast: CaseAst, base_dir: &Path) -> Result<Self> {
        let mut builder = MagneticCircuitBuilder::new();

        let mut settings = SolverSettings::default();
        if let Some(stmt) = ast.directive("solver") {
            settings = solver_settings(stmt)?;
        }
        builder = builder.settings(settings);

        if let Some(stmt) = ast.directive("runner") {
            builder = builder.runner(runner_def(stmt)?);
        }

        let mut tables: HashMap<String, Arc<BhTable>> = HashMap::new();
        for stmt in ast.directives_named("table") {
            let (name, table) = table_def(stmt, base_dir)?;
            if tables.insert(name.clone(), Arc::new(table)).is_some() {
                return Err(MagError::DuplicateName { kind: "table", name });
            }
        }

        let mut waveforms: HashMap<String, Waveform> = HashMap::new();
        for stmt in ast.directives_named("waveform") {
            let (name, waveform) = waveform_def(stmt)?;
            if waveforms.insert(name.clone(), waveform).is_some() {
                return Err(MagError::DuplicateName { kind: "waveform", name });
            }
        }

        for stmt in ast.directives_named("material") {
            let (material, regions) = material_def(stmt, &tables)?;
            let regions: Vec<&str> = regions.iter().map(String::as_str).collect();
            builder = builder.material(material, &regions);
        }

        for stmt in &ast.regions {
            let name = stmt.name(0)?;
            let a = stmt.node(1)?;
            let b = stmt.node(2)?;
            let length = stmt.number("length")?;
            let area = stmt.number("area")?;
            let axis = match stmt.trailing_numbers(3)?.as_slice() {
                [] => DEFAULT_AXIS,
                [x, y, z] => [*x, *y, *z],
                other => {
                    return Err(stmt.invalid(format!(
                        "axis needs three components, got {}",
                        other.len()
                    )))
                }
            };
            builder = builder.region_with_axis(&name, &a, &b, length, area, axis);
        }

        for stmt in &ast.coils {
            builder = builder.coil(coil_def(stmt, &waveforms)?);
        }

        for stmt in ast.directives_named("report") {
            let kind = stmt.name(0)?;
            let target = stmt.args.get(1).map(Value::text);
            let report = Report::from_keyword(&kind, target.as_deref())
                .ok_or_else(|| stmt.invalid(format!("unknown report '{}' or missing target", kind)))?;
            builder = builder.report(report);
        }

        if let Some(stmt) = ast.directive("scan") {
            let coil = stmt.name(0)?;
            let count = stmt.positional_number(3)?;
            if count < 1.0 || count.fract() != 0.0 {
                return Err(stmt.invalid("level count must be a positive integer"));
            }
            builder = builder.scan(ScanDef {
                coil,
                start: stmt.positional_number(1)?,
                stop: stmt.positional_number(2)?,
                count: count as usize,
                iterations: stmt.count_or("iterations", DEFAULT_MAX_ITERATIONS)?,
            });
        }

        for stmt in ast.directives_named("export") {
            for arg in &stmt.args {
                let text = arg.text();
                let kind = FieldKind::from_str(&text)
                    .ok_or_else(|| stmt.invalid(format!("unknown field '{}'", text)))?;
                builder = builder.export(kind);
            }
        }

        builder.build()
    }

    /// Replace the solver settings (e.g. from command-line overrides).
    pub fn with_settings(mut self, settings: SolverSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// Replace the iteration budget of the configured runner.
    pub fn with_iteration_budget(mut self, iterations: usize) -> Self {
        match &mut self.runner {
            RunnerDef::Steady { total_iterations } => *total_iterations = iterations,
            RunnerDef::Transient {
                total_inner_iterations,
                ..
            } => *total_inner_iterations = iterations,
        }
        self
    }

    /// Get the total size of the solution vector.
    pub fn matrix_size(&self) -> usize {
        // Nodes (excluding the reference) + coil currents
        (self.num_nodes - 1) + self.num_branches
    }

    /// Get the matrix index for a node potential.
    /// Returns None for the reference node.
    pub fn node_index(&self, node: NodeId) -> Option<usize> {
        if node.is_ground() {
            None
        } else {
            Some(VarIndex::Potential(node).to_index(self.num_nodes))
        }
    }

    /// Get the matrix index for a coil current.
    pub fn branch_index(&self, branch: BranchId) -> usize {
        VarIndex::Current(branch).to_index(self.num_nodes)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.node_map.get(name).copied()
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        &self.node_names[node.0]
    }

    pub fn find_region(&self, name: &str) -> Option<RegionId> {
        self.regions.iter().find(|r| r.name == name).map(|r| r.id)
    }

    /// Index of a coil by name.
    pub fn find_coil(&self, name: &str) -> Option<usize> {
        self.coils.iter().position(|c| c.name == name)
    }

    pub fn material_of(&self, region: RegionId) -> &MaterialModel {
        &self.materials[self.region_material[region.0]]
    }

    /// Indices of the coils wound on `region`.
    pub fn coils_in(&self, region: RegionId) -> impl Iterator<Item = usize> + '_ {
        self.coil_region
            .iter()
            .enumerate()
            .filter(move |(_, r)| **r == region)
            .map(|(k, _)| k)
    }

    /// Whether every region has a linear material. Materials no region
    /// uses do not count.
    pub fn is_linear(&self) -> bool {
        self.region_material.iter().all(|&m| self.materials[m].is_linear())
    }
}

fn solver_settings(stmt: &Statement) -> Result<SolverSettings> {
    let mut settings = SolverSettings::default();
    if let Some(value) = stmt.params.get("scheme") {
        let text = value.text();
        let scheme = IterationScheme::from_str(&text)
            .ok_or_else(|| stmt.invalid(format!("unknown scheme '{}'", text)))?;
        settings = settings.with_scheme(scheme);
    }
    if let Some(tolerance) = stmt.optional_number("tolerance")? {
        settings = settings.with_tolerance(tolerance);
    }
    if let Some(growth) = stmt.optional_number("growth")? {
        settings = settings.with_growth_factor(growth);
    }
    if stmt.params.contains_key("patience") {
        settings = settings.with_consecutive_growths(stmt.count_or("patience", 1)?);
    }
    if let Some(limit) = stmt.optional_number("limit")? {
        settings = settings.with_residual_limit(limit);
    }
    if let Some(margin) = stmt.optional_number("margin")? {
        settings = settings.with_range_margin(margin);
    }
    if stmt.params.contains_key("backtracks") {
        settings = settings.with_max_backtracks(stmt.count_or("backtracks", DEFAULT_MAX_BACKTRACKS)?);
    }
    Ok(settings)
}

fn runner_def(stmt: &Statement) -> Result<RunnerDef> {
    let kind = stmt.name(0)?;
    match kind.to_lowercase().as_str() {
        "steady" | "static" => Ok(RunnerDef::Steady {
            total_iterations: stmt.count_or("iterations", DEFAULT_MAX_ITERATIONS)?,
        }),
        "transient" => Ok(RunnerDef::Transient {
            total_time: stmt.number("time")?,
            time_step: stmt.number("step")?,
            total_inner_iterations: stmt.count_or("inner", DEFAULT_MAX_ITERATIONS)?,
        }),
        _ => Err(stmt.invalid(format!("unknown runner '{}'", kind))),
    }
}

fn table_def(stmt: &Statement, base_dir: &Path) -> Result<(String, BhTable)> {
    let name = stmt.name(0)?;
    let order = match stmt.params.get("order") {
        Some(value) => {
            let text = value.text();
            ColumnOrder::from_str(&text)
                .ok_or_else(|| stmt.invalid(format!("unknown column order '{}'", text)))?
        }
        None => ColumnOrder::Detect,
    };

    let table = match stmt.params.get("file") {
        Some(path) => {
            let path = base_dir.join(path.text());
            BhTable::load(&path, order)?.with_name(name.clone())
        }
        None => {
            let values = stmt.list_numbers()?;
            if values.len() % 2 != 0 {
                return Err(stmt.invalid("table needs an even number of values"));
            }
            let first = values.iter().step_by(2).copied().collect();
            let second = values.iter().skip(1).step_by(2).copied().collect();
            BhTable::from_columns(name.clone(), first, second, order)?
        }
    };
    Ok((name, table))
}

fn waveform_def(stmt: &Statement) -> Result<(String, Waveform)> {
    let name = stmt.name(0)?;
    let kind = stmt.name(1)?;
    let waveform = match kind.to_lowercase().as_str() {
        "constant" => Waveform::Constant(stmt.number("value")?),
        "harmonic" => Waveform::Harmonic {
            amplitude: stmt.number("amplitude")?,
            frequency: stmt.number("frequency")?,
            phase: stmt.optional_number("phase")?.unwrap_or(0.0),
        },
        "table" => Waveform::Table(
            TimeTable::from_pairs(&stmt.list_numbers()?).map_err(|e| stmt.invalid(e.to_string()))?,
        ),
        _ => return Err(stmt.invalid(format!("unknown waveform kind '{}'", kind))),
    };
    waveform.validate().map_err(|e| stmt.invalid(e.to_string()))?;
    Ok((name, waveform))
}

fn material_def(stmt: &Statement, tables: &HashMap<String, Arc<BhTable>>) -> Result<(MaterialModel, Vec<String>)> {
    let name = stmt.name(0)?;
    let kind = stmt.name(1)?;
    let material = match kind.to_lowercase().as_str() {
        "constant" | "linear" => MaterialModel::constant(&name, stmt.optional_number("mur")?.unwrap_or(1.0)),
        "vacuum" | "air" => MaterialModel::vacuum(&name),
        "nonlinear" => {
            let table_name = stmt
                .params
                .get("table")
                .map(Value::text)
                .ok_or_else(|| stmt.invalid("nonlinear material needs table=<name>"))?;
            let table = tables.get(&table_name).ok_or_else(|| MagError::UnknownTable {
                table: table_name.clone(),
                material: name.clone(),
            })?;
            MaterialModel::non_linear(&name, Arc::clone(table))
        }
        "permanent" | "magnet" => {
            let br = match stmt.optional_number("br")? {
                Some(br) => [br, 0.0, 0.0],
                None => [
                    stmt.optional_number("bx")?.unwrap_or(0.0),
                    stmt.optional_number("by")?.unwrap_or(0.0),
                    stmt.optional_number("bz")?.unwrap_or(0.0),
                ],
            };
            MaterialModel::permanent(&name, br, stmt.optional_number("mur")?.unwrap_or(1.0))
        }
        _ => return Err(stmt.invalid(format!("unknown material kind '{}'", kind))),
    };

    let material = match stmt.optional_number("sigma")? {
        Some(sigma) => material.with_conductivity(sigma),
        None => material,
    };
    let regions = stmt.list.iter().map(Value::text).collect();
    Ok((material, regions))
}

fn coil_def(stmt: &Statement, waveforms: &HashMap<String, Waveform>) -> Result<CoilSpecification> {
    let name = stmt.name(0)?;
    let region = stmt.name(1)?;

    let turns = stmt.number("turns")?;
    if turns < 1.0 || turns.fract() != 0.0 || turns > u32::MAX as f64 {
        return Err(stmt.invalid("turns must be a positive integer"));
    }

    let waveform = |key: &str| -> Result<Waveform> {
        match stmt.params.get(key) {
            Some(Value::Number(v)) => Ok(Waveform::Constant(*v)),
            Some(other) => {
                let w = other.text();
                waveforms.get(&w).cloned().ok_or(MagError::UnknownWaveform {
                    waveform: w,
                    coil: name.clone(),
                })
            }
            None => Err(stmt.invalid(format!("missing '{}'", key))),
        }
    };

    let excitation = match (stmt.params.contains_key("current"), stmt.params.contains_key("voltage")) {
        (true, false) => Excitation::Current(waveform("current")?),
        (false, true) => Excitation::Voltage {
            voltage: waveform("voltage")?,
            resistance: stmt.number("resistance")?,
        },
        _ => return Err(stmt.invalid("coil needs exactly one of current= or voltage=")),
    };

    let topology = match (stmt.params.get("inlet"), stmt.params.get("outlet")) {
        (Some(inlet), Some(outlet)) => CoilTopology::Open {
            inlet: inlet.text(),
            outlet: outlet.text(),
        },
        (None, None) => {
            let values = stmt.trailing_numbers(2)?;
            let (center, normal, inner_radius, outer_radius) = match values.as_slice() {
                [] => ([0.0; 3], DEFAULT_COIL_NORMAL, 0.0, 0.0),
                [cx, cy, cz, nx, ny, nz] => ([*cx, *cy, *cz], [*nx, *ny, *nz], 0.0, 0.0),
                [cx, cy, cz, nx, ny, nz, ri, ro] => ([*cx, *cy, *cz], [*nx, *ny, *nz], *ri, *ro),
                other => {
                    return Err(stmt.invalid(format!(
                        "closed coil takes 0, 6 or 8 geometry values, got {}",
                        other.len()
                    )))
                }
            };
            CoilTopology::Closed {
                center,
                normal,
                inner_radius,
                outer_radius,
            }
        }
        _ => return Err(stmt.invalid("open coil needs both inlet= and outlet=")),
    };

    CoilSpecification::new(name, region, topology, Winding::Stranded { turns: turns as u32 }, excitation)
        .map_err(|e| match e {
            MagError::Configuration { message } => stmt.invalid(message),
            other => other,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl;

    const CASE: &str = "\
.runner transient time=150m step=5m inner=6
.solver scheme=fixed_point tolerance=1e-5 margin=0.1
.table IRON order=hb (0 0 100 0.1 1000 1.2)
.waveform DRIVE table (0 0 10m 5 20m 5)
.material Air constant mur=1 (gap)
.material Iron nonlinear table=IRON sigma=4.54e6 (core)
.report flux core
.report energy
.export b
REGION core 0 a length=0.2 area=1e-3
REGION gap a 0 length=1m area=1e-3 0 1 0
COIL drive core turns=500 current=DRIVE inlet=In outlet=Out
";

    #[test]
    fn test_from_ast() {
        let ast = dsl::parse(CASE).unwrap();
        let circuit = MagneticCircuit::from_ast(ast, Path::new(".")).unwrap();

        assert_eq!(circuit.regions.len(), 2);
        assert_eq!(circuit.num_nodes, 2);
        assert_eq!(circuit.matrix_size(), 1);
        assert_eq!(circuit.regions[1].axis, [0.0, 1.0, 0.0]);
        assert_eq!(circuit.regions[1].length, 1e-3);

        assert_eq!(
            circuit.runner,
            RunnerDef::Transient {
                total_time: 0.15,
                time_step: 0.005,
                total_inner_iterations: 6
            }
        );
        assert_eq!(circuit.settings.scheme, IterationScheme::FixedPoint);
        assert_eq!(circuit.settings.tolerance, 1e-5);

        let core = circuit.find_region("core").unwrap();
        let iron = circuit.material_of(core);
        assert_eq!(iron.name, "Iron");
        assert_eq!(iron.conductivity, 4.54e6);
        assert_eq!(iron.table().unwrap().margin(), 0.1);
        assert!(!circuit.is_linear());

        assert_eq!(circuit.coils_in(core).collect::<Vec<_>>(), vec![0]);
        assert_eq!(circuit.coil_branch, vec![None]);
        assert_eq!(circuit.reports.len(), 2);
        assert_eq!(circuit.exports.fields(), &[FieldKind::MagneticFluxDensity]);
    }

    #[test]
    fn test_voltage_coil_gets_a_branch() {
        let input = "\
.runner transient time=10m step=1m
.material Air constant (core)
REGION core a 0 length=0.1 area=1e-4
COIL sense core turns=100 voltage=12 resistance=2
";
        let circuit = MagneticCircuit::from_ast(dsl::parse(input).unwrap(), Path::new(".")).unwrap();
        assert_eq!(circuit.num_branches, 1);
        assert_eq!(circuit.coil_branch, vec![Some(BranchId(0))]);
        assert_eq!(circuit.branch_index(BranchId(0)), 1);
        assert_eq!(circuit.matrix_size(), 2);
    }

    #[test]
    fn test_unknown_references() {
        let missing_table = ".material Iron nonlinear table=STEEL (core)\nREGION core a 0 length=1 area=1";
        let err = MagneticCircuit::from_ast(dsl::parse(missing_table).unwrap(), Path::new(".")).unwrap_err();
        assert!(matches!(err, MagError::UnknownTable { ref table, .. } if table == "STEEL"));

        let missing_waveform = "\
.material Air constant (core)
REGION core a 0 length=1 area=1
COIL c core turns=1 current=RAMP
";
        let err = MagneticCircuit::from_ast(dsl::parse(missing_waveform).unwrap(), Path::new(".")).unwrap_err();
        assert!(matches!(err, MagError::UnknownWaveform { ref waveform, .. } if waveform == "RAMP"));
    }

    #[test]
    fn test_zero_resistance_constant_voltage() {
        let input = "\
.runner transient time=10m step=1m
.material Air constant (core)
REGION core a 0 length=1 area=1
COIL drive core turns=10 voltage=5 resistance=0
";
        let err = MagneticCircuit::from_ast(dsl::parse(input).unwrap(), Path::new(".")).unwrap_err();
        assert!(matches!(err, MagError::CircuitConfiguration { ref coil, .. } if coil == "drive"));
    }

    #[test]
    fn test_scan_levels() {
        let scan = ScanDef {
            coil: "drive".into(),
            start: 0.0,
            stop: 5.0,
            count: 11,
            iterations: 5,
        };
        let values = scan.values();
        assert_eq!(values.len(), 11);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[10], 5.0);
        assert!((values[3] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_solver_directive_without_margin_keeps_table_margins() {
        let input = "\
.solver tolerance=1e-4 backtracks=3
.table IRON order=hb (0 0 100 0.1 1000 1.2)
.material Iron nonlinear table=IRON (core)
REGION core a 0 length=1 area=1
";
        let circuit = MagneticCircuit::from_ast(dsl::parse(input).unwrap(), Path::new(".")).unwrap();
        assert_eq!(circuit.settings.range_margin, None);
        assert_eq!(circuit.settings.max_backtracks, 3);
        let core = circuit.find_region("core").unwrap();
        assert_eq!(
            circuit.material_of(core).table().unwrap().margin(),
            crate::material::DEFAULT_RANGE_MARGIN
        );
    }

    #[test]
    fn test_budget_override() {
        let input = ".material Air constant (core)\nREGION core a 0 length=1 area=1";
        let circuit = MagneticCircuit::from_ast(dsl::parse(input).unwrap(), Path::new("."))
            .unwrap()
            .with_iteration_budget(7);
        assert_eq!(circuit.runner, RunnerDef::Steady { total_iterations: 7 });
    }
}
