//! Error types shared by validation, the flow solvers, and the rounding engine.
//!
//! [`RoundingError`] is the single error type returned by every fallible
//! public operation in this crate. Input problems are described in more
//! detail by [`InputError`], which is wrapped by
//! [`RoundingError::InvalidInput`].
use std::time::Duration;

// ---------------------------------------------------------------------------
// InputError
// ---------------------------------------------------------------------------

/// A structural problem with a delegation instance, a fractional flow, or a
/// delegation assignment.
///
/// Detected before any rounding work starts and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// A delegator lists no candidates at all.
    #[error("delegator {node} has no delegation candidates")]
    EmptyCandidates {
        /// The offending delegator.
        node: usize,
    },

    /// A delegator lists itself as a candidate.
    #[error("delegator {node} lists itself as a delegation candidate")]
    SelfLoop {
        /// The offending delegator.
        node: usize,
    },

    /// A candidate id is outside `[0, node_count)`.
    #[error("node {node} refers to node {candidate}, but there are only {node_count} nodes")]
    UnknownCandidate {
        /// The node holding the reference.
        node: usize,
        /// The out-of-range id.
        candidate: usize,
        /// Number of nodes in the instance.
        node_count: usize,
    },

    /// The instance has nodes but not a single voter.
    #[error("instance with {node_count} nodes contains no voter")]
    NoVoters {
        /// Number of nodes in the instance.
        node_count: usize,
    },

    /// A delegator has no delegation path to any voter.
    #[error("node {node} cannot reach any voter")]
    Unreachable {
        /// The first unreachable node in index order.
        node: usize,
    },

    /// A fractional flow does not fit the instance it was computed for.
    #[error("flow at node {node} is inconsistent with the instance: {detail}")]
    InconsistentFlow {
        /// The node whose flow entry is wrong.
        node: usize,
        /// What is wrong with it.
        detail: String,
    },

    /// A delegation assignment does not fit the instance.
    #[error("delegation of node {node} is inconsistent with the instance: {detail}")]
    InconsistentDelegation {
        /// The node whose delegation is wrong.
        node: usize,
        /// What is wrong with it.
        detail: String,
    },

    /// Following delegations from a node never reaches a voter.
    #[error("delegation chain starting at node {node} is cyclic")]
    DelegationCycle {
        /// A node on (or leading into) the cycle.
        node: usize,
    },
}

// ---------------------------------------------------------------------------
// RoundingError
// ---------------------------------------------------------------------------

/// Every failure a rounding computation can end in.
///
/// No partial delegation is ever returned alongside an error: a caller that
/// receives [`RoundingError::TimedOut`] may retry with a fresh deadline, but
/// nothing from the aborted run is reused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoundingError {
    /// The instance or the supplied flow is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    /// An optimization capability reported an error or an infeasible problem.
    #[error("{solver} failed: {detail}")]
    SolverFailure {
        /// Name of the failing solver.
        solver: &'static str,
        /// The solver's own description of the failure.
        detail: String,
    },

    /// The deadline elapsed inside the engine loop or inside a solver call.
    #[error("deadline exceeded after {elapsed:?}")]
    TimedOut {
        /// Time spent before the deadline check fired.
        elapsed: Duration,
    },

    /// The engine reached a state its invariants rule out.
    #[error("internal invariant violated: {detail}")]
    InternalInvariantViolation {
        /// Description of the violated invariant.
        detail: String,
    },
}

impl RoundingError {
    /// Shorthand for [`RoundingError::InternalInvariantViolation`].
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::InternalInvariantViolation {
            detail: detail.into(),
        }
    }

    /// Shorthand for [`RoundingError::SolverFailure`].
    pub fn solver(solver: &'static str, detail: impl Into<String>) -> Self {
        Self::SolverFailure {
            solver,
            detail: detail.into(),
        }
    }

    /// Returns `true` for [`RoundingError::TimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_error_converts_into_invalid_input() {
        let err: RoundingError = InputError::SelfLoop { node: 3 }.into();
        assert_eq!(
            err,
            RoundingError::InvalidInput(InputError::SelfLoop { node: 3 })
        );
        assert_eq!(
            err.to_string(),
            "invalid input: delegator 3 lists itself as a delegation candidate"
        );
    }

    #[test]
    fn timeout_is_distinguishable() {
        let err = RoundingError::TimedOut {
            elapsed: Duration::from_millis(5),
        };
        assert!(err.is_timeout());
        assert!(!RoundingError::invariant("x").is_timeout());
    }

    #[test]
    fn solver_failure_names_the_solver() {
        let err = RoundingError::solver("max-flow", "infeasible");
        assert_eq!(err.to_string(), "max-flow failed: infeasible");
    }
}
