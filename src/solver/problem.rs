//! Problems driven by the iteration controller.

use rayon::prelude::*;
use tracing::trace;

use crate::circuit::{MagneticCircuit, NodeId, Region, RegionId};
use crate::coil::{SourceDistribution, SourceDrive};
use crate::diagnostics::WarningLog;
use crate::error::{MagError, Result};
use crate::report::{RegionProbe, Solution};

use super::linearize::{linearize_region, RegionLinearization};
use super::convergence::max_norm;
use super::matrix::SystemMatrix;
use super::settings::IterationScheme;
use super::{CURRENT_FLOOR, FLUX_DENSITY_FLOOR};

/// A discretised nonlinear problem seen through the controller's eyes.
///
/// The controller owns the solution vector; the problem only reads it. An
/// external assembler can implement this trait to reuse the controller.
pub trait NonlinearProblem {
    /// Length of the solution vector.
    fn unknowns(&self) -> usize;

    /// Whether one linear solve gives the exact answer.
    fn is_linear(&self) -> bool;

    /// Build the linear system around the linearisation point `point`.
    fn assemble(&mut self, point: &[f64]) -> Result<()>;

    /// Solve the assembled system.
    fn solve(&mut self) -> Result<Vec<f64>>;

    /// Per-region residuals between two consecutive solutions.
    fn residuals(&self, previous: &[f64], current: &[f64]) -> Vec<f64>;

    /// Relative imbalance of the true (not linearised) equations at `x`.
    ///
    /// Drives the Newton line search and the divergence monitor. Problems
    /// that cannot evaluate it return `None`; the controller then takes full
    /// steps and watches the step residual instead.
    fn imbalance(&self, _x: &[f64]) -> Option<f64> {
        None
    }

    fn region_name(&self, region: usize) -> &str;

    fn region_material(&self, region: usize) -> &str;
}

/// Nonlinear magnetic equivalent circuit at one instant.
pub struct MagneticProblem<'a> {
    circuit: &'a MagneticCircuit,
    matrix: SystemMatrix,
    scheme: IterationScheme,
    time: f64,
    /// Backward Euler step for voltage-driven coils; `None` in steady state
    time_step: Option<f64>,
    /// Region fluxes at the end of the previous time step
    previous_flux: Vec<f64>,
    /// Source of every coil at `time`
    sources: Vec<SourceDistribution>,
    /// Current set by a parametric scan, per coil
    current_overrides: Vec<Option<f64>>,
    warnings: WarningLog,
}

impl<'a> MagneticProblem<'a> {
    /// Steady problem at `t = 0`.
    pub fn new(circuit: &'a MagneticCircuit) -> Self {
        let sources = circuit.coils.iter().map(|c| c.source_term_at(0.0)).collect();
        Self {
            circuit,
            matrix: SystemMatrix::new(circuit.matrix_size()),
            scheme: circuit.settings.scheme,
            time: 0.0,
            time_step: None,
            previous_flux: vec![0.0; circuit.regions.len()],
            sources,
            current_overrides: vec![None; circuit.coils.len()],
            warnings: WarningLog::new(),
        }
    }

    /// Problem stepped in time with backward Euler.
    pub fn transient(circuit: &'a MagneticCircuit, time_step: f64) -> Self {
        Self {
            time_step: Some(time_step),
            ..Self::new(circuit)
        }
    }

    pub fn circuit(&self) -> &'a MagneticCircuit {
        self.circuit
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Move to `time` and refresh every coil source.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.sources = self.circuit.coils.iter().map(|c| c.source_term_at(time)).collect();
    }

    /// Override the current of a current-driven coil.
    pub fn set_coil_current(&mut self, coil: &str, current: f64) -> Result<()> {
        let k = self
            .circuit
            .find_coil(coil)
            .ok_or_else(|| MagError::UnknownCoil { coil: coil.to_string() })?;
        if self.circuit.coils[k].is_voltage_driven() {
            return Err(MagError::configuration(format!(
                "coil '{}' is voltage driven, its current is a solve unknown",
                coil
            )));
        }
        if !current.is_finite() {
            return Err(MagError::configuration(format!("coil '{}': current must be finite", coil)));
        }
        self.current_overrides[k] = Some(current);
        Ok(())
    }

    /// Accept `x` as the state at the end of the current time step.
    pub fn commit_step(&mut self, x: &[f64]) {
        self.previous_flux = self
            .circuit
            .regions
            .iter()
            .map(|r| r.area * self.flux_density(r, x))
            .collect();
    }

    /// Warnings gathered so far.
    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    pub fn warnings_mut(&mut self) -> &mut WarningLog {
        &mut self.warnings
    }

    /// Field quantities of every region for the solution vector `x`.
    pub fn snapshot(&self, x: &[f64]) -> Solution {
        let regions = self
            .circuit
            .regions
            .iter()
            .map(|r| {
                let h = self.field_strength(r, x);
                let response = self.circuit.material_of(r.id).evaluate(h, r.axis);
                let b = response.flux_density;
                RegionProbe {
                    field_strength: h,
                    flux_density: b,
                    flux: r.area * b,
                    permeability: if h != 0.0 { b / h } else { response.differential_permeability },
                }
            })
            .collect();

        Solution {
            time: self.time,
            regions,
            coil_currents: (0..self.circuit.coils.len()).map(|k| self.coil_current(k, x)).collect(),
        }
    }

    /// Current of coil `k` when it does not depend on the solve.
    fn prescribed_current(&self, k: usize) -> Option<f64> {
        match self.sources[k].drive {
            SourceDrive::Prescribed { current } => Some(self.current_overrides[k].unwrap_or(current)),
            SourceDrive::Coupled { .. } => None,
        }
    }

    /// Terminal current of coil `k`.
    fn coil_current(&self, k: usize, x: &[f64]) -> f64 {
        match (self.prescribed_current(k), self.circuit.coil_branch[k]) {
            (Some(current), _) => current,
            (None, Some(branch)) => x[self.circuit.branch_index(branch)],
            (None, None) => 0.0,
        }
    }

    fn potential(&self, node: NodeId, x: &[f64]) -> f64 {
        self.circuit.node_index(node).map(|i| x[i]).unwrap_or(0.0)
    }

    /// H = (psi_a - psi_b + sum N I) / l
    fn field_strength(&self, region: &Region, x: &[f64]) -> f64 {
        let [a, b] = region.nodes;
        let mmf: f64 = self
            .circuit
            .coils_in(region.id)
            .map(|k| self.sources[k].ampere_turns_for(self.coil_current(k, x)))
            .sum();
        (self.potential(a, x) - self.potential(b, x) + mmf) / region.length
    }

    fn flux_density(&self, region: &Region, x: &[f64]) -> f64 {
        let h = self.field_strength(region, x);
        self.circuit.material_of(region.id).evaluate(h, region.axis).flux_density
    }

    /// Stamp one linearised region together with the coils wound on it.
    fn stamp_region(&mut self, region: &Region, lin: &RegionLinearization) {
        let circuit = self.circuit;
        let [a, b] = region.nodes.map(|n| circuit.node_index(n));
        let g = lin.permeance;

        // Prescribed ampere-turns act like a flux source g N I
        let prescribed: f64 = circuit
            .coils_in(region.id)
            .filter_map(|k| Some(self.sources[k].ampere_turns_for(self.prescribed_current(k)?)))
            .sum();
        let flux_source = lin.flux_source + g * prescribed;

        self.matrix.stamp_permeance(a, b, g);
        self.matrix.stamp_flux_source(a, b, flux_source);

        let coupled: Vec<(usize, usize)> = circuit
            .coils_in(region.id)
            .filter_map(|k| circuit.coil_branch[k].map(|br| (k, circuit.branch_index(br))))
            .collect();

        for &(k, col) in &coupled {
            self.matrix.stamp_ampere_turns(a, b, col, g * self.sources[k].turns);
        }

        // Circuit rows: V = R I + N (Phi - Phi_prev) / dt
        for &(k, row) in &coupled {
            let SourceDrive::Coupled { voltage, resistance } = self.sources[k].drive else {
                continue;
            };
            self.matrix.add(row, row, resistance);
            self.matrix.add_source(row, voltage);

            if let Some(dt) = self.time_step {
                let kappa = self.sources[k].turns / dt;
                if let Some(i) = a {
                    self.matrix.add(row, i, kappa * g);
                }
                if let Some(j) = b {
                    self.matrix.add(row, j, -kappa * g);
                }
                for &(m, col) in &coupled {
                    self.matrix.add(row, col, kappa * g * self.sources[m].turns);
                }
                self.matrix
                    .add_source(row, -kappa * (flux_source - self.previous_flux[region.id.0]));
            }
        }
    }
}

impl NonlinearProblem for MagneticProblem<'_> {
    fn unknowns(&self) -> usize {
        self.circuit.matrix_size()
    }

    fn is_linear(&self) -> bool {
        self.circuit.is_linear()
    }

    fn assemble(&mut self, point: &[f64]) -> Result<()> {
        let circuit = self.circuit;

        // Workers read the same snapshot; collecting is the barrier.
        let linearized: Vec<RegionLinearization> = {
            let this = &*self;
            circuit
                .regions
                .par_iter()
                .map(|r| {
                    let h = this.field_strength(r, point);
                    linearize_region(circuit.material_of(r.id), h, r.axis, r.area, r.length, this.scheme)
                })
                .collect()
        };

        self.matrix.clear();
        for (region, lin) in circuit.regions.iter().zip(&linearized) {
            if let Some(warning) = &lin.warning {
                self.warnings
                    .record(&circuit.material_of(region.id).name, &region.name, warning);
            }
            self.stamp_region(region, lin);
        }
        trace!(size = self.matrix.size, time = self.time, "assembled");
        Ok(())
    }

    fn solve(&mut self) -> Result<Vec<f64>> {
        Ok(self.matrix.factor_and_solve()?.to_vec())
    }

    fn residuals(&self, previous: &[f64], current: &[f64]) -> Vec<f64> {
        let circuit = self.circuit;
        circuit
            .regions
            .par_iter()
            .map(|r| {
                let old = self.flux_density(r, previous);
                let new = self.flux_density(r, current);
                let field = (new - old).abs() / new.abs().max(FLUX_DENSITY_FLOOR);

                circuit
                    .coils_in(r.id)
                    .filter(|&k| circuit.coil_branch[k].is_some())
                    .map(|k| {
                        let old = self.coil_current(k, previous);
                        let new = self.coil_current(k, current);
                        (new - old).abs() / new.abs().max(CURRENT_FLOOR)
                    })
                    .fold(field, f64::max)
            })
            .collect()
    }

    /// Flux conservation at every free node, scaled by the largest region
    /// flux, and the circuit row of every voltage-driven coil, scaled by its
    /// largest term.
    fn imbalance(&self, x: &[f64]) -> Option<f64> {
        let circuit = self.circuit;
        let fluxes: Vec<f64> = circuit
            .regions
            .par_iter()
            .map(|r| r.area * self.flux_density(r, x))
            .collect();
        let scale = fluxes.iter().fold(0.0_f64, |m, f| m.max(f.abs()));

        let mut net = vec![0.0; circuit.num_nodes];
        for (region, flux) in circuit.regions.iter().zip(&fluxes) {
            let [a, b] = region.nodes;
            net[a.0] += flux;
            net[b.0] -= flux;
        }
        let mut errors: Vec<f64> = net
            .iter()
            .enumerate()
            .filter(|&(n, _)| circuit.node_index(NodeId(n)).is_some())
            .map(|(_, sum)| sum.abs() / scale.max(f64::MIN_POSITIVE))
            .collect();

        for k in 0..circuit.coils.len() {
            let SourceDrive::Coupled { voltage, resistance } = self.sources[k].drive else {
                continue;
            };
            let region = circuit.coil_region[k].0;
            let ohmic = resistance * self.coil_current(k, x);
            let induced = match self.time_step {
                Some(dt) => self.sources[k].turns * (fluxes[region] - self.previous_flux[region]) / dt,
                None => 0.0,
            };
            let row_scale = voltage.abs().max(ohmic.abs()).max(induced.abs());
            errors.push((voltage - ohmic - induced).abs() / row_scale.max(f64::MIN_POSITIVE));
        }

        Some(max_norm(&errors).map_or(0.0, |(_, e)| e))
    }

    fn region_name(&self, region: usize) -> &str {
        &self.circuit.regions[region].name
    }

    fn region_material(&self, region: usize) -> &str {
        &self.circuit.material_of(RegionId(region)).name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{MagneticCircuitBuilder, RunnerDef};
    use crate::coil::{CoilSpecification, CoilTopology, Excitation, Waveform, Winding};
    use crate::material::{BhTable, MaterialModel, MU_0};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn coil(excitation: Excitation) -> CoilSpecification {
        CoilSpecification::new(
            "drive",
            "core",
            CoilTopology::Closed {
                center: [0.0; 3],
                normal: [0.0, 0.0, 1.0],
                inner_radius: 0.0,
                outer_radius: 0.0,
            },
            Winding::Stranded { turns: 100 },
            excitation,
        )
        .unwrap()
    }

    /// Core (mur 1000, 0.1 m) in series with a 0.1 mm air gap.
    fn linear_loop(excitation: Excitation, runner: RunnerDef) -> MagneticCircuit {
        MagneticCircuitBuilder::new()
            .region("core", "0", "a", 0.1, 1e-4)
            .region("gap", "a", "0", 1e-4, 1e-4)
            .material(MaterialModel::constant("Ferrite", 1000.0), &["core"])
            .material(MaterialModel::vacuum("Air"), &["gap"])
            .coil(coil(excitation))
            .runner(runner)
            .build()
            .unwrap()
    }

    fn total_permeance() -> f64 {
        let reluctance = 0.1 / (1000.0 * MU_0 * 1e-4) + 1e-4 / (MU_0 * 1e-4);
        1.0 / reluctance
    }

    fn solve_once(problem: &mut MagneticProblem) -> Vec<f64> {
        let zero = vec![0.0; problem.unknowns()];
        problem.assemble(&zero).unwrap();
        problem.solve().unwrap()
    }

    #[test]
    fn test_series_loop_flux() {
        let circuit = linear_loop(
            Excitation::Current(Waveform::Constant(2.0)),
            RunnerDef::default(),
        );
        let mut problem = MagneticProblem::new(&circuit);
        let x = solve_once(&mut problem);
        let solution = problem.snapshot(&x);

        let expected = 200.0 * total_permeance();
        assert_relative_eq!(solution.regions[0].flux, expected, max_relative = 1e-10);
        assert_relative_eq!(solution.regions[1].flux, expected, max_relative = 1e-10);
        assert_eq!(solution.coil_currents, vec![2.0]);
    }

    #[test]
    fn test_current_override() {
        let circuit = linear_loop(
            Excitation::Current(Waveform::Constant(2.0)),
            RunnerDef::default(),
        );
        let mut problem = MagneticProblem::new(&circuit);
        problem.set_coil_current("drive", 5.0).unwrap();
        let x = solve_once(&mut problem);
        let solution = problem.snapshot(&x);
        assert_relative_eq!(solution.regions[1].flux, 500.0 * total_permeance(), max_relative = 1e-10);
        assert!(problem.set_coil_current("nothing", 1.0).is_err());
    }

    #[test]
    fn test_steady_voltage_coil_is_ohmic() {
        let circuit = linear_loop(
            Excitation::Voltage {
                voltage: Waveform::Constant(12.0),
                resistance: 2.0,
            },
            RunnerDef::default(),
        );
        let mut problem = MagneticProblem::new(&circuit);
        assert_eq!(problem.unknowns(), 2);
        let x = solve_once(&mut problem);
        let solution = problem.snapshot(&x);
        assert_relative_eq!(solution.coil_currents[0], 6.0, max_relative = 1e-10);
        assert_relative_eq!(solution.regions[0].flux, 600.0 * total_permeance(), max_relative = 1e-10);
    }

    #[test]
    fn test_backward_euler_rl_step() {
        let dt = 1e-3;
        let circuit = linear_loop(
            Excitation::Voltage {
                voltage: Waveform::Constant(12.0),
                resistance: 2.0,
            },
            RunnerDef::Transient {
                total_time: 0.01,
                time_step: dt,
                total_inner_iterations: 1,
            },
        );
        let inductance = 100.0 * 100.0 * total_permeance();

        let mut problem = MagneticProblem::transient(&circuit, dt);
        let mut current = 0.0;
        for step in 1..=3 {
            problem.set_time(step as f64 * dt);
            let x = solve_once(&mut problem);
            problem.commit_step(&x);

            current = (12.0 + inductance / dt * current) / (2.0 + inductance / dt);
            let solution = problem.snapshot(&x);
            assert_relative_eq!(solution.coil_currents[0], current, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_saturating_core_residual_equation() {
        let table = BhTable::new("IRON", vec![0.0, 100.0, 1000.0], vec![0.0, 0.1, 1.2]).unwrap();
        let circuit = MagneticCircuitBuilder::new()
            .region("core", "0", "a", 0.1, 1e-4)
            .region("gap", "a", "0", 1e-4, 1e-4)
            .material(MaterialModel::non_linear("Iron", Arc::new(table)), &["core"])
            .material(MaterialModel::vacuum("Air"), &["gap"])
            .coil(coil(Excitation::Current(Waveform::Constant(1.0))))
            .build()
            .unwrap();

        let mut problem = MagneticProblem::new(&circuit);
        let mut x = vec![0.0; problem.unknowns()];
        for _ in 0..4 {
            problem.assemble(&x).unwrap();
            x = problem.solve().unwrap();
        }
        let s = problem.snapshot(&x);

        // Ampere's law around the loop and flux continuity
        let mmf = s.regions[0].field_strength * 0.1 + s.regions[1].field_strength * 1e-4;
        assert_relative_eq!(mmf, 100.0, max_relative = 1e-9);
        assert_relative_eq!(s.regions[0].flux, s.regions[1].flux, max_relative = 1e-9);
        assert!(s.regions[0].field_strength > 100.0 && s.regions[0].field_strength < 1000.0);

        let converged = problem.residuals(&x, &x);
        assert_eq!(converged, vec![0.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_lookups_are_logged() {
        let table = BhTable::new("IRON", vec![0.0, 10.0], vec![0.0, 0.01]).unwrap();
        let circuit = MagneticCircuitBuilder::new()
            .region("core", "0", "a", 0.1, 1e-4)
            .region("gap", "a", "0", 1e-4, 1e-4)
            .material(MaterialModel::non_linear("Iron", Arc::new(table)), &["core"])
            .material(MaterialModel::vacuum("Air"), &["gap"])
            .coil(coil(Excitation::Current(Waveform::Constant(10.0))))
            .build()
            .unwrap();

        let mut problem = MagneticProblem::new(&circuit);
        let x = solve_once(&mut problem);
        problem.assemble(&x).unwrap();

        // both assemblies are past the table, folded into one entry
        assert_eq!(problem.warnings().len(), 1);
        let (key, summary) = problem.warnings().iter().next().unwrap();
        assert_eq!(key, &("Iron".to_string(), "core".to_string()));
        assert_eq!(summary.occurrences, 2);
        let first = problem.field_strength(&circuit.regions[0], &vec![0.0; x.len()]).abs();
        let second = problem.field_strength(&circuit.regions[0], &x).abs();
        assert_eq!(summary.worst_field_strength, first.max(second));
    }
}
