//! Steady and transient runners.
//!
//! A runner pairs a [`MagneticProblem`] with a [`NonlinearController`] and
//! drives it with the fixed iteration budgets of the case description.

use tracing::info;

use crate::circuit::MagneticCircuit;
use crate::diagnostics::WarningLog;
use crate::error::{MagError, Result};
use crate::report::{Report, ReportMonitor, Solution};

use super::controller::{AdvanceOutcome, CancelFlag, NonlinearController};
use super::problem::MagneticProblem;

/// Reports evaluated at one level of a parametric scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPoint {
    /// Coil current of this level (A)
    pub value: f64,
    pub outcome: AdvanceOutcome,
    /// One value per requested report, in request order
    pub reports: Vec<f64>,
}

/// Magnetostatic run with a fixed iteration budget.
pub struct SteadyRunner<'a> {
    problem: MagneticProblem<'a>,
    controller: NonlinearController,
    total_iterations: usize,
}

impl<'a> SteadyRunner<'a> {
    pub fn new(circuit: &'a MagneticCircuit, total_iterations: usize) -> Result<Self> {
        circuit.settings.validate()?;
        Ok(Self {
            problem: MagneticProblem::new(circuit),
            controller: NonlinearController::new(circuit.settings.clone()),
            total_iterations,
        })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.controller = self.controller.with_cancel_flag(cancel);
        self
    }

    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn controller(&self) -> &NonlinearController {
        &self.controller
    }

    /// Spend the whole configured budget.
    pub fn run(&mut self) -> Result<AdvanceOutcome> {
        self.advance(self.total_iterations)
    }

    pub fn advance(&mut self, n: usize) -> Result<AdvanceOutcome> {
        self.controller.advance(&mut self.problem, n)
    }

    /// Change a coil current; the next `advance` starts a new phase from the
    /// current solution.
    pub fn set_coil_current(&mut self, coil: &str, current: f64) -> Result<()> {
        self.problem.set_coil_current(coil, current)?;
        self.controller.reset();
        Ok(())
    }

    pub fn solution(&self) -> Solution {
        self.problem.snapshot(self.controller.solution())
    }

    pub fn evaluate(&self, report: &Report) -> Result<f64> {
        report.evaluate(self.problem.circuit(), &self.solution())
    }

    /// Sweep a coil through `values`, running `iterations` at every level.
    pub fn scan(&mut self, coil: &str, values: &[f64], iterations: usize, reports: &[Report]) -> Result<Vec<ScanPoint>> {
        let mut points = Vec::with_capacity(values.len());
        for &value in values {
            self.set_coil_current(coil, value)?;
            let outcome = self.advance(iterations)?;
            let solution = self.solution();
            let reports = reports
                .iter()
                .map(|r| r.evaluate(self.problem.circuit(), &solution))
                .collect::<Result<Vec<_>>>()?;
            info!(coil, value, iterations = outcome.iterations, "scan level");
            points.push(ScanPoint {
                value,
                outcome,
                reports,
            });
        }
        Ok(points)
    }

    pub fn warnings(&self) -> &WarningLog {
        self.problem.warnings()
    }

    /// Log accumulated out-of-range warnings once and clear them.
    pub fn report_warnings(&mut self) {
        self.problem.warnings_mut().report();
    }
}

/// Backward Euler time stepping with a fixed inner budget per step.
pub struct TransientRunner<'a> {
    problem: MagneticProblem<'a>,
    controller: NonlinearController,
    total_time: f64,
    time_step: f64,
    total_inner_iterations: usize,
    steps_taken: usize,
    monitors: Vec<ReportMonitor>,
}

impl<'a> TransientRunner<'a> {
    pub fn new(
        circuit: &'a MagneticCircuit,
        total_time: f64,
        time_step: f64,
        total_inner_iterations: usize,
    ) -> Result<Self> {
        circuit.settings.validate()?;
        if !(time_step > 0.0) || !time_step.is_finite() {
            return Err(MagError::configuration(format!("time step must be positive, got {}", time_step)));
        }
        Ok(Self {
            problem: MagneticProblem::transient(circuit, time_step),
            controller: NonlinearController::new(circuit.settings.clone()),
            total_time,
            time_step,
            total_inner_iterations,
            steps_taken: 0,
            monitors: Vec::new(),
        })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.controller = self.controller.with_cancel_flag(cancel);
        self
    }

    /// Record `report` after every step.
    pub fn add_monitor(&mut self, report: Report) -> Result<()> {
        report.validate(self.problem.circuit())?;
        self.monitors.push(ReportMonitor::new(report));
        Ok(())
    }

    pub fn monitors(&self) -> &[ReportMonitor] {
        &self.monitors
    }

    pub fn time(&self) -> f64 {
        self.problem.time()
    }

    /// Number of steps needed to reach `total_time`.
    pub fn total_steps(&self) -> usize {
        // tolerate rounding in total_time / time_step
        (self.total_time / self.time_step - 1e-9).ceil().max(0.0) as usize
    }

    pub fn controller(&self) -> &NonlinearController {
        &self.controller
    }

    pub fn solution(&self) -> Solution {
        self.problem.snapshot(self.controller.solution())
    }

    /// Advance time by one step and iterate at the new instant.
    pub fn step(&mut self) -> Result<AdvanceOutcome> {
        self.steps_taken += 1;
        let time = self.steps_taken as f64 * self.time_step;
        self.problem.set_time(time);
        self.controller.reset();

        let outcome = self.controller.advance(&mut self.problem, self.total_inner_iterations)?;
        self.problem.commit_step(self.controller.solution());

        let solution = self.solution();
        for monitor in &mut self.monitors {
            monitor.record(self.problem.circuit(), &solution)?;
        }
        Ok(outcome)
    }

    /// Step until `total_time`; returns the outcome of every step.
    pub fn run(&mut self) -> Result<Vec<AdvanceOutcome>> {
        let mut outcomes = Vec::new();
        while self.steps_taken < self.total_steps() {
            outcomes.push(self.step()?);
        }
        let unconverged = outcomes.iter().filter(|o| !o.is_converged()).count();
        info!(steps = outcomes.len(), unconverged, time = self.time(), "transient run finished");
        Ok(outcomes)
    }

    pub fn warnings(&self) -> &WarningLog {
        self.problem.warnings()
    }

    pub fn report_warnings(&mut self) {
        self.problem.warnings_mut().report();
    }
}
