//! Layered delegation instance generator.
//!
//! Node ids `0..voters` are voters; every later node is a delegator whose
//! candidates all have smaller ids, so each generated instance is valid and
//! every delegator reaches a voter. Candidates are drawn mostly from a
//! window of recent nodes, which produces long delegation chains, and
//! occasionally straight from the voters.

use liquid_core::DelegationGraph;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Configuration for the instance generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Seed for the random number generator (deterministic).
    pub seed: u64,
    /// Number of voters.
    pub voters: usize,
    /// Number of delegators.
    pub delegators: usize,
    /// Fewest distinct candidates per delegator (at least 1).
    pub min_candidates: usize,
    /// Most distinct candidates per delegator.
    pub max_candidates: usize,
    /// How many preceding nodes a delegator usually picks from.
    pub window: usize,
    /// Probability that a candidate is drawn from the voters instead of
    /// the window (0.0-1.0).
    pub voter_bias: f64,
}

/// Predefined size tiers for benchmarking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeTier {
    /// 60 nodes
    Small,
    /// 300 nodes
    Medium,
    /// 1000 nodes
    Large,
}

impl SizeTier {
    /// Returns the default `GeneratorConfig` for this size tier.
    pub fn config(self, seed: u64) -> GeneratorConfig {
        match self {
            SizeTier::Small => GeneratorConfig {
                seed,
                voters: 6,
                delegators: 54,
                min_candidates: 1,
                max_candidates: 3,
                window: 12,
                voter_bias: 0.2,
            },
            SizeTier::Medium => GeneratorConfig {
                seed,
                voters: 20,
                delegators: 280,
                min_candidates: 1,
                max_candidates: 4,
                window: 30,
                voter_bias: 0.15,
            },
            SizeTier::Large => GeneratorConfig {
                seed,
                voters: 50,
                delegators: 950,
                min_candidates: 1,
                max_candidates: 4,
                window: 60,
                voter_bias: 0.1,
            },
        }
    }
}

/// Generates a layered instance from `config`.
///
/// The same config always yields the same instance. `voters` is raised to
/// one if zero, and the candidate range is clamped to what each node can
/// actually pick.
pub fn generate_instance(config: &GeneratorConfig) -> DelegationGraph {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let voters = config.voters.max(1);
    let min = config.min_candidates.max(1);
    let max = config.max_candidates.max(min);
    let window = config.window.max(1);
    let bias = if config.voter_bias.is_nan() {
        0.0
    } else {
        config.voter_bias.clamp(0.0, 1.0)
    };

    let mut entries: Vec<Option<Vec<usize>>> = vec![None; voters];
    for node in voters..voters + config.delegators {
        let low = node.saturating_sub(window);
        // Voters inside the window are only drawn through the window.
        let mut recent: Vec<usize> = (low..node).collect();
        let mut far_voters: Vec<usize> = (0..voters.min(low)).collect();
        let wanted = rng
            .gen_range(min..=max)
            .min(recent.len() + far_voters.len());
        let mut candidates: Vec<usize> = Vec::with_capacity(wanted);
        while candidates.len() < wanted {
            let from_voters =
                recent.is_empty() || (!far_voters.is_empty() && rng.gen_bool(bias));
            let pool = if from_voters {
                &mut far_voters
            } else {
                &mut recent
            };
            let pick = rng.gen_range(0..pool.len());
            candidates.push(pool.swap_remove(pick));
        }
        entries.push(Some(candidates));
    }
    DelegationGraph::new(entries)
}
