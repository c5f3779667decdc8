//! Magcore - magnetic equivalent circuit solver
//!
//! Runs a case file and prints the requested reports.
//!
//! # Usage
//!
//! ```bash
//! magcore core.case --scheme fixed-point --tolerance 1e-8 -vv
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use magcore::{
    circuit::{MagneticCircuit, RunnerDef},
    dsl,
    error::Result,
    report::{FieldSink, Solution},
    solver::IterationScheme,
    SteadyRunner, TransientRunner,
};
use tracing::Level;

/// Nonlinear magnetic equivalent circuit solver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the case description file
    #[arg(value_name = "CASE_FILE")]
    case_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Iteration scheme (newton or fixed-point)
    #[arg(long, value_parser = parse_scheme)]
    scheme: Option<IterationScheme>,

    /// Convergence tolerance on the relative flux density change
    #[arg(long)]
    tolerance: Option<f64>,

    /// Iteration budget (per step for transient runs)
    #[arg(long)]
    iterations: Option<usize>,
}

fn parse_scheme(s: &str) -> std::result::Result<IterationScheme, String> {
    IterationScheme::from_str(s).ok_or_else(|| format!("unknown scheme '{}'", s))
}

/// Prints exported fields as `field region value` lines.
struct StdoutSink;

impl FieldSink for StdoutSink {
    fn write_field(&mut self, name: &str, values: &[(String, f64)]) -> Result<()> {
        for (region, value) in values {
            println!("{} {} {:.6e}", name, region, value);
        }
        Ok(())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let ast = dsl::parse_file(&args.case_file)?;
    let base_dir = args.case_file.parent().unwrap_or_else(|| Path::new("."));
    let mut circuit = MagneticCircuit::from_ast(ast, base_dir)?;

    if args.scheme.is_some() || args.tolerance.is_some() {
        let mut settings = circuit.settings.clone();
        if let Some(scheme) = args.scheme {
            settings = settings.with_scheme(scheme);
        }
        if let Some(tolerance) = args.tolerance {
            settings = settings.with_tolerance(tolerance);
        }
        circuit = circuit.with_settings(settings)?;
    }
    if let Some(iterations) = args.iterations {
        circuit = circuit.with_iteration_budget(iterations);
    }

    match circuit.runner.clone() {
        RunnerDef::Steady { total_iterations } => run_steady(&circuit, total_iterations),
        RunnerDef::Transient {
            total_time,
            time_step,
            total_inner_iterations,
        } => run_transient(&circuit, total_time, time_step, total_inner_iterations),
    }
}

// Warnings are reported on the error path too.
fn run_steady(circuit: &MagneticCircuit, total_iterations: usize) -> Result<()> {
    let mut runner = SteadyRunner::new(circuit, total_iterations)?;
    let result = print_steady(circuit, &mut runner);
    runner.report_warnings();
    result
}

fn print_steady(circuit: &MagneticCircuit, runner: &mut SteadyRunner) -> Result<()> {
    let outcome = runner.run()?;
    println!(
        "# {:?} after {} iterations (residual {:.3e})",
        outcome.status, outcome.iterations, outcome.residual
    );

    for report in &circuit.reports {
        println!("{} = {:.6e}", report.label(), runner.evaluate(report)?);
    }
    export(circuit, &runner.solution())?;

    if let Some(scan) = &circuit.scan {
        let points = runner.scan(&scan.coil, &scan.values(), scan.iterations, &circuit.reports)?;
        let header: Vec<String> = circuit.reports.iter().map(|r| r.label()).collect();
        println!("# scan {}: current {}", scan.coil, header.join(" "));
        for point in &points {
            let values: Vec<String> = point.reports.iter().map(|v| format!("{:.6e}", v)).collect();
            println!("{:.6e} {}", point.value, values.join(" "));
        }
    }
    Ok(())
}

fn run_transient(circuit: &MagneticCircuit, total_time: f64, time_step: f64, inner: usize) -> Result<()> {
    let mut runner = TransientRunner::new(circuit, total_time, time_step, inner)?;
    for report in &circuit.reports {
        runner.add_monitor(report.clone())?;
    }
    let result = print_transient(circuit, &mut runner);
    runner.report_warnings();
    result
}

fn print_transient(circuit: &MagneticCircuit, runner: &mut TransientRunner) -> Result<()> {
    let outcomes = runner.run()?;
    let unconverged = outcomes.iter().filter(|o| !o.is_converged()).count();
    println!("# {} steps, {} without convergence", outcomes.len(), unconverged);

    let header: Vec<String> = runner.monitors().iter().map(|m| m.report.label()).collect();
    println!("# time {}", header.join(" "));
    for step in 0..outcomes.len() {
        let mut line = String::new();
        for (i, monitor) in runner.monitors().iter().enumerate() {
            if let Some((time, value)) = monitor.values.get(step) {
                if i == 0 {
                    line.push_str(&format!("{:.6e}", time));
                }
                line.push_str(&format!(" {:.6e}", value));
            }
        }
        if !line.is_empty() {
            println!("{}", line);
        }
    }
    export(circuit, &runner.solution())
}

fn export(circuit: &MagneticCircuit, solution: &Solution) -> Result<()> {
    if circuit.exports.fields().is_empty() {
        return Ok(());
    }
    circuit.exports.save(circuit, solution, &mut StdoutSink)
}
