//! Implementation of `liquid round <file>`.
//!
//! Reads a JSON instance, obtains a fractional flow (solved with the
//! max-flow solver, or read from `--flow`, either the bare per-node array
//! or the object `liquid solve -f json` prints), rounds it with the chosen
//! mechanism and prints:
//! - the mechanism and its approximation bound
//! - maximum voter weight, fractional congestion and their ratio
//! - engine counters
//! - one delegate per delegator and the weight of every voter
//!
//! In `--format json` mode a single JSON object is emitted to stdout.
//!
//! Exit codes: 0 = success, 1 = rounding failure, 2 = input failure.
use std::collections::BTreeMap;
use std::path::Path;

use liquid_core::{
    DelegationGraph, FixedFlow, FractionalFlow, FractionalFlowSolver, MaxFlowSolver, Mechanism,
    RoundingConfig, RoundingOutcome, RoundingStats, get_delegations, voter_weights,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stdout_error;
use crate::error::CliError;
use crate::{OutputFormat, PathOrStdin, io};

/// Contents of a `--flow` file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlowFile {
    /// `liquid solve -f json` output.
    Solved(FractionalFlow),
    /// Per-node successor maps, `null` for voters.
    Entries(Vec<Option<BTreeMap<usize, f64>>>),
}

impl FlowFile {
    /// The flow to round. A stored congestion is recomputed from the arcs.
    fn into_flow(self) -> FractionalFlow {
        match self {
            Self::Solved(flow) => FractionalFlow::from_flows(flow.flows),
            Self::Entries(entries) => FractionalFlow::from_flows(entries),
        }
    }
}

/// Everything `round` reports.
#[derive(Debug, Serialize)]
pub struct RoundReport {
    /// Stable mechanism name.
    pub mechanism: Mechanism,
    /// Number of nodes in the instance.
    pub nodes: usize,
    /// Per node, the chosen delegate; `null` for voters.
    pub delegations: Vec<Option<usize>>,
    /// Per voter id, the number of nodes resolving to it.
    pub weights: BTreeMap<usize, usize>,
    /// Largest voter weight.
    pub max_weight: usize,
    /// Maximum voter load of the fractional flow.
    pub fractional_congestion: f64,
    /// `max_weight / fractional_congestion`.
    pub approximation_ratio: f64,
    /// Worst case the mechanism guarantees for this instance size.
    pub approximation_bound: f64,
    /// Engine counters.
    pub stats: RoundingStats,
}

impl RoundReport {
    /// Builds the report for `outcome` on an instance with `nodes` nodes.
    ///
    /// # Errors
    ///
    /// The converted [`liquid_core::RoundingError`] if the delegations do
    /// not resolve to voters.
    pub fn new(nodes: usize, outcome: RoundingOutcome) -> Result<Self, CliError> {
        let weights = voter_weights(&outcome.delegations)?
            .into_iter()
            .enumerate()
            .zip(&outcome.delegations)
            .filter(|(_, delegate)| delegate.is_none())
            .map(|(entry, _)| entry)
            .collect();
        Ok(Self {
            mechanism: outcome.mechanism,
            nodes,
            approximation_ratio: outcome.approximation_ratio(),
            approximation_bound: outcome.mechanism.approximation_factor(nodes),
            delegations: outcome.delegations,
            weights,
            max_weight: outcome.max_weight,
            fractional_congestion: outcome.fractional_congestion,
            stats: outcome.stats,
        })
    }
}

/// Runs the `round` command.
///
/// # Errors
///
/// - Exit code 2 for unreadable input, malformed JSON, or an invalid
///   instance or flow.
/// - Exit code 1 if solving or rounding fails or times out.
pub fn run(
    file: &PathOrStdin,
    mechanism: Mechanism,
    flow_file: Option<&Path>,
    config: &RoundingConfig,
    format: OutputFormat,
    max_file_size: u64,
) -> Result<(), CliError> {
    let graph: DelegationGraph = io::read_json(file, max_file_size)?;
    debug!(nodes = graph.node_count(), source = %file.label(), "instance loaded");

    let outcome = match flow_file {
        Some(path) => {
            let file: FlowFile =
                io::read_json(&PathOrStdin::Path(path.to_path_buf()), max_file_size)?;
            let solver = FixedFlow(file.into_flow());
            round_with(&graph, mechanism, &solver, config)?
        }
        None => round_with(&graph, mechanism, &MaxFlowSolver::from_config(config), config)?,
    };
    let report = RoundReport::new(graph.node_count(), outcome)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Human => print_human(&mut out, &report),
        OutputFormat::Json => print_json(&mut out, &report),
    }
    .map_err(|e| stdout_error(&e))
}

fn round_with<S: FractionalFlowSolver>(
    graph: &DelegationGraph,
    mechanism: Mechanism,
    solver: &S,
    config: &RoundingConfig,
) -> Result<RoundingOutcome, CliError> {
    Ok(get_delegations(graph, mechanism, solver, config)?)
}

/// Writes the report as aligned key/value lines.
fn print_human<W: std::io::Write>(w: &mut W, report: &RoundReport) -> std::io::Result<()> {
    writeln!(
        w,
        "mechanism:      {} {}",
        report.mechanism,
        report.mechanism.label()
    )?;
    writeln!(w, "nodes:          {}", report.nodes)?;
    writeln!(w, "max_weight:     {}", report.max_weight)?;
    writeln!(w, "congestion:     {:.4}", report.fractional_congestion)?;
    writeln!(
        w,
        "ratio:          {:.4} (bound {:.4})",
        report.approximation_ratio, report.approximation_bound
    )?;
    writeln!(
        w,
        "steps:          {} iterations, {} aggregations, {} cycles broken, {} deactivations",
        report.stats.iterations,
        report.stats.aggregations,
        report.stats.cycles_broken,
        report.stats.deactivations
    )?;
    if report.stats.rebalance_fallbacks > 0 {
        writeln!(w, "fallbacks:      {}", report.stats.rebalance_fallbacks)?;
    }

    writeln!(w, "delegations:")?;
    for (node, delegate) in report.delegations.iter().enumerate() {
        if let Some(delegate) = delegate {
            writeln!(w, "  {node} -> {delegate}")?;
        }
    }
    writeln!(w, "weights:")?;
    for (voter, weight) in &report.weights {
        writeln!(w, "  {voter}: {weight}")?;
    }
    Ok(())
}

/// Writes the report as one pretty-printed JSON object.
fn print_json<W: std::io::Write>(w: &mut W, report: &RoundReport) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, report).map_err(std::io::Error::other)?;
    writeln!(w)
}
