//! Golden sub-window refinement
//!
//! Long elected regions are narrowed to their best fixed-length
//! sub-window by sliding over the enclosed intervals in 250 ms steps.
//! Silence and speech share this machinery and differ only in window
//! length, minimum data requirement, the window scorer and which
//! direction counts as better.

use crate::interval::IntervalSample;
use crate::INTERVAL_SECONDS;

/// Window geometry for one refinement
#[derive(Debug, Clone, Copy)]
pub struct RefineParams {
    /// Golden window length in seconds
    pub window_secs: f64,
    /// Minimum seconds of intervals required to attempt refinement
    pub minimum_secs: f64,
}

/// Slide a golden window across a region's intervals
///
/// Returns the `(start_index, length)` of the winning window, or `None`
/// when the region already fits inside the window (the caller keeps the
/// original region untouched) or when fewer than `minimum_secs` of
/// intervals are available.
pub fn refine_region<S, B>(
    intervals: &[IntervalSample],
    params: &RefineParams,
    mut score: S,
    better: B,
) -> Option<(usize, usize)>
where
    S: FnMut(&[IntervalSample]) -> f64,
    B: Fn(f64, f64) -> bool,
{
    let available_secs = intervals.len() as f64 * INTERVAL_SECONDS;
    if available_secs <= params.window_secs {
        return None;
    }
    if available_secs < params.minimum_secs {
        return None;
    }

    let window_len = (params.window_secs / INTERVAL_SECONDS).round() as usize;
    let window_len = window_len.min(intervals.len()).max(1);

    let mut best_start = 0;
    let mut best_score = score(&intervals[..window_len]);
    for start in 1..=intervals.len() - window_len {
        let candidate = score(&intervals[start..start + window_len]);
        if better(candidate, best_score) {
            best_score = candidate;
            best_start = start;
        }
    }

    Some((best_start, window_len))
}

/// Mean interval RMS, the silence refinement scorer
pub(crate) fn mean_rms(intervals: &[IntervalSample]) -> f64 {
    if intervals.is_empty() {
        return 0.0;
    }
    intervals.iter().map(|i| i.rms_level).sum::<f64>() / intervals.len() as f64
}
