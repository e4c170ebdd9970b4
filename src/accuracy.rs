//! Hit-count reconstruction from a target accuracy.
//!
//! Accuracy weights: great = 1, ok = 1/3, meh = 1/6, miss = 0.

use crate::error::{PerfError, Result};
use crate::model::HitCounts;

/// Tolerance for float noise before rounding counts up
const EPSILON: f64 = 1e-9;

/// Empirical divisor: one percent of accuracy is about `object_count / 66.6`
/// oks on a full combo.
const OKS_PER_PERCENT_DIVISOR: f64 = 66.6;

/// Weighted accuracy of a hit distribution, in [0, 1].
pub fn accuracy_of(counts: &HitCounts) -> f64 {
    let total = counts.total();
    if total == 0 {
        return 0.0;
    }
    let weighted = 6.0 * counts.great as f64 + 2.0 * counts.ok as f64 + counts.meh as f64;
    weighted / (6.0 * total as f64)
}

/// Derive a great/ok/meh split for `object_count` objects with `miss_count`
/// misses whose accuracy is at most `target_accuracy` and as close to it as a
/// single object allows.
///
/// Oks are used first. Only when turning every non-miss into an ok is not
/// enough are oks downgraded to mehs. Targets above what the misses allow are
/// clamped down to the all-great distribution; targets below the all-meh
/// floor yield all mehs.
pub fn reconstruct(target_accuracy: f64, object_count: u32, miss_count: u32) -> Result<HitCounts> {
    if object_count == 0 {
        return Err(PerfError::invalid("object count must be greater than zero"));
    }
    if !(0.0..=1.0).contains(&target_accuracy) {
        return Err(PerfError::invalid(format!(
            "target accuracy {} outside [0, 1]",
            target_accuracy
        )));
    }

    let misses = miss_count.min(object_count);
    let hits = object_count - misses;
    let n = object_count as f64;

    // Deficit against an all-great distribution, in great-equivalents.
    let deficit = (hits as f64 - target_accuracy * n).max(0.0);

    // Each ok costs 2/3 of a great.
    let oks_needed = ceil_count(deficit * 1.5);
    let (ok, meh) = if oks_needed <= hits {
        (oks_needed, 0)
    } else {
        // All oks cost hits * 2/3; each ok downgraded to meh costs 1/6 more.
        let remaining = deficit - hits as f64 * 2.0 / 3.0;
        let mehs = ceil_count(remaining * 6.0).min(hits);
        (hits - mehs, mehs)
    };

    Ok(HitCounts {
        great: hits - ok - meh,
        ok,
        meh,
        miss: misses,
    })
}

/// Approximate full-combo distribution for a round accuracy threshold.
///
/// Uses a fixed divisor instead of inverting the accuracy formula, so the
/// resulting accuracy is close to but not exactly `threshold`.
pub fn threshold_counts(threshold: f64, object_count: u32) -> Result<HitCounts> {
    if object_count == 0 {
        return Err(PerfError::invalid("object count must be greater than zero"));
    }
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(PerfError::invalid(format!(
            "accuracy threshold {} outside (0, 1]",
            threshold
        )));
    }

    let percent_lost = ((1.0 - threshold) * 100.0).max(0.0);
    let ok = if percent_lost < EPSILON {
        0
    } else {
        let raw = object_count as f64 / (OKS_PER_PERCENT_DIVISOR / percent_lost);
        ((raw + EPSILON).floor() as u32).min(object_count)
    };

    Ok(HitCounts {
        great: object_count - ok,
        ok,
        meh: 0,
        miss: 0,
    })
}

fn ceil_count(x: f64) -> u32 {
    if x <= EPSILON {
        0
    } else {
        (x - EPSILON).ceil() as u32
    }
}
