//! Implementation of `liquid solve <file>`.
//!
//! Validates a JSON instance and prints the splittable flow that minimizes
//! the heaviest voter, together with that congestion. The JSON output can
//! be passed to `liquid round --flow` unchanged.
//!
//! Exit codes: 0 = success, 1 = solver failure or timeout, 2 = input failure.
use liquid_core::{
    DelegationGraph, FractionalFlow, FractionalFlowSolver, MaxFlowSolver, RoundingConfig,
    RoundingError,
};
use tracing::info;

use super::stdout_error;
use crate::error::CliError;
use crate::{OutputFormat, PathOrStdin, io};

/// Runs the `solve` command.
///
/// # Errors
///
/// - Exit code 2 for unreadable input, malformed JSON, or an invalid
///   instance.
/// - Exit code 1 if the solver fails or the time limit expires.
pub fn run(
    file: &PathOrStdin,
    config: &RoundingConfig,
    format: OutputFormat,
    max_file_size: u64,
) -> Result<(), CliError> {
    let graph: DelegationGraph = io::read_json(file, max_file_size)?;
    graph.validate().map_err(RoundingError::from)?;

    let deadline = config.deadline();
    let flow = MaxFlowSolver::from_config(config).solve(&graph, &deadline)?;
    info!(
        nodes = graph.node_count(),
        congestion = flow.congestion,
        elapsed_ms = deadline.elapsed().as_millis(),
        "fractional flow solved"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Human => print_human(&mut out, &flow),
        OutputFormat::Json => print_json(&mut out, &flow),
    }
    .map_err(|e| stdout_error(&e))
}

/// Writes the congestion and one line per delegator listing its arcs.
fn print_human<W: std::io::Write>(w: &mut W, flow: &FractionalFlow) -> std::io::Result<()> {
    writeln!(w, "congestion:     {:.4}", flow.congestion)?;
    writeln!(w, "flows:")?;
    for (node, arcs) in flow.flows.iter().enumerate() {
        let Some(arcs) = arcs else { continue };
        let parts: Vec<String> = arcs
            .iter()
            .map(|(succ, value)| format!("{succ}={value:.4}"))
            .collect();
        writeln!(w, "  {node}: {}", parts.join(" "))?;
    }
    Ok(())
}

fn print_json<W: std::io::Write>(w: &mut W, flow: &FractionalFlow) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, flow).map_err(std::io::Error::other)?;
    writeln!(w)
}
