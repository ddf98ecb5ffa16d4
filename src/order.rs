//! Fractional indexing (C1): a dense total-order key over the reals so
//! insertion between two neighbors touches no other task.

use crate::error::{CoordinatorError, Result};

/// One side of a `between` call: a concrete order, or an open end of the
/// column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Value(f64),
    Unbounded,
}

impl Bound {
    pub fn value(self) -> Option<f64> {
        match self {
            Bound::Value(v) => Some(v),
            Bound::Unbounded => None,
        }
    }
}

/// Gap below which a rebalance should be triggered. `1e-9` is the
/// authoritative threshold — looser than `f64::EPSILON` and actually
/// reachable after repeated bisection.
pub const EXHAUSTION_THRESHOLD: f64 = 1e-9;

/// Dense gap used when handing out a fresh rebalanced sequence.
const REBALANCE_GAP: f64 = 1000.0;

/// Returns a key strictly between `prev` and `next`. `prev ?? 0` and
/// `next ?? low + 1` define the open-end defaults; fails when both sides
/// are bounded and `prev >= next`.
pub fn between(prev: Bound, next: Bound) -> Result<f64> {
    let low = prev.value().unwrap_or(0.0);
    let high = match next.value() {
        Some(h) => h,
        None => low + 1.0,
    };

    if let (Bound::Value(p), Bound::Value(n)) = (prev, next) {
        if p >= n {
            return Err(CoordinatorError::InvalidRange(format!(
                "prev ({p}) must be < next ({n})"
            )));
        }
    }

    let mid = (low + high) / 2.0;
    if !mid.is_finite() {
        return Err(CoordinatorError::InvalidRange(
            "midpoint is not finite".to_string(),
        ));
    }
    Ok(mid)
}

/// True when two neighboring orders are too close for another insertion to
/// fit between them without a rebalance.
pub fn exhausted(a: f64, b: f64) -> bool {
    (b - a).abs() < EXHAUSTION_THRESHOLD
}

/// Produces `n` strictly increasing keys, `1000, 2000, ..., n*1000`, dense
/// enough for roughly a thousand future insertions between any pair before
/// the column needs rebalancing again.
pub fn rebalanced(n: usize) -> Vec<f64> {
    (1..=n).map(|i| i as f64 * REBALANCE_GAP).collect()
}
