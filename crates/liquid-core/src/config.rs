//! Tunable parameters of a rounding run and the deadline it runs against.
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::RoundingError;

/// Tolerance below which a flow value counts as zero.
pub const DEFAULT_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// RoundingConfig
// ---------------------------------------------------------------------------

/// Configuration for [`crate::get_delegations`] and the rounding engine.
///
/// Every field has a default, so a JSON config file only needs to list the
/// fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoundingConfig {
    /// Tolerance used for every "is this effectively zero" decision on flow
    /// values.
    ///
    /// Default: [`DEFAULT_EPSILON`].
    pub epsilon: f64,

    /// Wall-clock limit in seconds for solving plus rounding.
    ///
    /// Default: `None` (unbounded).
    pub time_limit: Option<f64>,

    /// Hard cap on engine iterations. Hitting it is reported as an internal
    /// invariant violation, since the loop is guaranteed to finish in
    /// `O(n²)` steps.
    ///
    /// Default: `None`.
    pub max_iterations: Option<usize>,

    /// Maximum number of coordinate-descent sweeps per rebalancing call.
    ///
    /// Default: 10 000.
    pub rebalance_max_sweeps: usize,

    /// Largest per-arc change at which a rebalancing call counts as
    /// converged.
    ///
    /// Default: `1e-12`.
    pub rebalance_tolerance: f64,

    /// Width at which the fractional solver stops bisecting the congestion.
    ///
    /// Default: `1e-9`.
    pub bisection_tolerance: f64,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            time_limit: None,
            max_iterations: None,
            rebalance_max_sweeps: 10_000,
            rebalance_tolerance: 1e-12,
            bisection_tolerance: 1e-9,
        }
    }
}

impl RoundingConfig {
    /// Starts the clock: returns a [`Deadline`] that expires `time_limit`
    /// seconds from now, or never when no limit is set.
    ///
    /// Negative or non-finite limits are treated as already expired.
    pub fn deadline(&self) -> Deadline {
        match self.time_limit {
            None => Deadline::none(),
            Some(secs) => {
                Deadline::after(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// A point in time after which a computation must stop.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    /// A deadline `limit` from now.
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    /// Time elapsed since the deadline was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns `true` once the limit has been reached.
    pub fn is_expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.elapsed() >= limit)
    }

    /// Fails with [`RoundingError::TimedOut`] once the limit has been reached.
    ///
    /// # Errors
    ///
    /// [`RoundingError::TimedOut`] carrying the elapsed time.
    pub fn check(&self) -> Result<(), RoundingError> {
        if self.is_expired() {
            return Err(RoundingError::TimedOut {
                elapsed: self.elapsed(),
            });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
