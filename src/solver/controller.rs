//! Nonlinear iteration controller.
//!
//! Sequences assemble / solve / convergence checks over a
//! [`NonlinearProblem`]. The controller owns the [`IterationState`]; the
//! solution inside it is only written here, after the problem has finished
//! a full iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::error::{MagError, Result};

use super::convergence::{max_norm, DivergenceMonitor};
use super::problem::NonlinearProblem;
use super::settings::{IterationScheme, SolverSettings};
use super::IMBALANCE_FLOOR;

/// Fraction of the imbalance a full Newton step must remove, scaled by the
/// step length (Armijo condition).
const SUFFICIENT_DECREASE: f64 = 1e-4;

/// Controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Assembling,
    Solving,
    CheckingConvergence,
    /// Tolerance met or budget spent; the solution is usable
    Converged,
    /// Fatal; the last valid solution is kept for diagnostics
    Diverged,
}

/// Why an [`NonlinearController::advance`] call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The residual dropped below the tolerance.
    Converged,
    /// The iteration budget ran out first; the best available solution is kept.
    BudgetExhausted,
}

/// Result of one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvanceOutcome {
    pub status: ConvergenceStatus,
    /// Iterations performed by this call
    pub iterations: usize,
    /// Global residual after the last iteration
    pub residual: f64,
}

impl AdvanceOutcome {
    pub fn is_converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }
}

/// Shared flag to abort a run between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Mutable state of the iteration, owned by the controller.
#[derive(Debug, Clone, Default)]
pub struct IterationState {
    /// Last accepted solution vector (initial guess for the next iteration)
    pub solution: Vec<f64>,
    /// Global residual of the last iteration
    pub residual: f64,
    /// Iterations performed in the current phase
    pub iteration: usize,
    pub converged: bool,
    /// Region with the largest residual in the last iteration
    pub worst_region: Option<String>,
}

impl IterationState {
    /// Start a new phase, keeping the solution as the initial guess.
    pub fn reset(&mut self) {
        self.residual = f64::INFINITY;
        self.iteration = 0;
        self.converged = false;
        self.worst_region = None;
    }

    /// Start over from a zero initial guess.
    pub fn reset_solution(&mut self) {
        self.reset();
        self.solution.clear();
    }
}

/// Drives a [`NonlinearProblem`] to convergence in caller-sized chunks.
#[derive(Debug)]
pub struct NonlinearController {
    settings: SolverSettings,
    state: ControllerState,
    iteration: IterationState,
    monitor: DivergenceMonitor,
    cancel: CancelFlag,
}

impl NonlinearController {
    pub fn new(settings: SolverSettings) -> Self {
        let monitor = DivergenceMonitor::new(settings.divergence);
        let mut iteration = IterationState::default();
        iteration.reset();
        Self {
            settings,
            state: ControllerState::Idle,
            iteration,
            monitor,
            cancel: CancelFlag::new(),
        }
    }

    /// Share an external cancel flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn iteration_state(&self) -> &IterationState {
        &self.iteration
    }

    pub fn solution(&self) -> &[f64] {
        &self.iteration.solution
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// New phase (e.g. after a source change); keeps the solution.
    pub fn reset(&mut self) {
        self.iteration.reset();
        self.monitor.reset();
        self.transition(ControllerState::Idle);
    }

    /// New phase from a zero initial guess.
    pub fn reset_solution(&mut self) {
        self.iteration.reset_solution();
        self.monitor.reset();
        self.transition(ControllerState::Idle);
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "controller state");
            self.state = next;
        }
    }

    /// Run up to `n` iterations.
    ///
    /// A linear problem always takes exactly one solve. Running out of
    /// budget is reported through [`ConvergenceStatus::BudgetExhausted`], not
    /// as an error. `n == 0` does no work.
    pub fn advance<P: NonlinearProblem + ?Sized>(&mut self, problem: &mut P, n: usize) -> Result<AdvanceOutcome> {
        if self.iteration.solution.len() != problem.unknowns() {
            self.iteration.solution = vec![0.0; problem.unknowns()];
        }

        if n == 0 {
            return Ok(AdvanceOutcome {
                status: ConvergenceStatus::BudgetExhausted,
                iterations: 0,
                residual: self.iteration.residual,
            });
        }

        let budget = if problem.is_linear() { 1 } else { n };

        for performed in 1..=budget {
            if self.cancel.is_cancelled() {
                self.transition(ControllerState::Idle);
                return Err(MagError::Cancelled {
                    iteration: self.iteration.iteration + 1,
                });
            }

            self.transition(ControllerState::Assembling);
            problem.assemble(&self.iteration.solution)?;

            self.transition(ControllerState::Solving);
            let mut next = problem.solve()?;
            let imbalance = if problem.is_linear() {
                None
            } else {
                self.damp_step(problem, &mut next)
            };

            self.transition(ControllerState::CheckingConvergence);
            let residuals = problem.residuals(&self.iteration.solution, &next);
            let (worst, residual) = max_norm(&residuals).unwrap_or((0, 0.0));
            let worst_name = if residuals.is_empty() {
                None
            } else {
                Some(problem.region_name(worst).to_string())
            };
            self.iteration.iteration += 1;

            debug!(
                iteration = self.iteration.iteration,
                residual,
                imbalance = ?imbalance,
                region = worst_name.as_deref().unwrap_or("-"),
                "nonlinear iteration"
            );

            let converged = problem.is_linear() || residual < self.settings.tolerance;

            // Growth is watched on the equation imbalance when there is one
            if !converged {
                let watched = match imbalance {
                    Some(e) if residual.is_finite() => e.max(IMBALANCE_FLOOR),
                    _ => residual,
                };
                if self.monitor.observe(watched) {
                    self.transition(ControllerState::Diverged);
                    return Err(MagError::Divergence {
                        iteration: self.iteration.iteration,
                        residual: watched,
                        region: worst_name.unwrap_or_default(),
                        material: if residuals.is_empty() {
                            String::new()
                        } else {
                            problem.region_material(worst).to_string()
                        },
                    });
                }
            }

            self.iteration.solution = next;
            self.iteration.residual = residual;
            self.iteration.worst_region = worst_name;

            if converged {
                self.iteration.converged = true;
                self.transition(ControllerState::Converged);
                info!(iterations = performed, residual, "converged");
                return Ok(AdvanceOutcome {
                    status: ConvergenceStatus::Converged,
                    iterations: performed,
                    residual,
                });
            }
        }

        self.iteration.converged = false;
        self.transition(ControllerState::Converged);
        info!(
            iterations = budget,
            residual = self.iteration.residual,
            region = self.iteration.worst_region.as_deref().unwrap_or("-"),
            "iteration budget exhausted"
        );
        Ok(AdvanceOutcome {
            status: ConvergenceStatus::BudgetExhausted,
            iterations: budget,
            residual: self.iteration.residual,
        })
    }

    /// Shorten a Newton step from the accepted solution towards `next` by
    /// halving until the true imbalance drops, at most `max_backtracks`
    /// times. Returns the imbalance at the step taken.
    fn damp_step<P: NonlinearProblem + ?Sized>(&self, problem: &P, next: &mut [f64]) -> Option<f64> {
        let mut imbalance = problem.imbalance(next)?;
        if self.settings.scheme != IterationScheme::Newton || self.settings.max_backtracks == 0 {
            return Some(imbalance);
        }
        let start = match problem.imbalance(&self.iteration.solution) {
            Some(e) if e.is_finite() && e > IMBALANCE_FLOOR => e,
            _ => return Some(imbalance),
        };

        let full = next.to_vec();
        let mut step = 1.0;
        for _ in 0..self.settings.max_backtracks {
            if imbalance.is_finite() && imbalance <= (1.0 - SUFFICIENT_DECREASE * step) * start {
                break;
            }
            step *= 0.5;
            for ((x, &from), &to) in next.iter_mut().zip(&self.iteration.solution).zip(&full) {
                *x = from + step * (to - from);
            }
            imbalance = problem.imbalance(next)?;
        }

        if step < 1.0 {
            trace!(step, start, imbalance, "damped newton step");
        }
        Some(imbalance)
    }
}
