//! Pre-scan noise floor and adaptive silence-detect threshold
//!
//! Before any region election, the head of the recording is scored for
//! "room-tone likeness" to derive a noise-floor estimate and the
//! threshold the silence detector qualifies intervals against.

use crate::interval::IntervalSample;

/// Fraction of the file the pre-scan (and silence search) covers
pub const SEARCH_FRACTION: f64 = 0.15;
/// Minimum prefix length before the fallback applies
const MIN_PREFIX: usize = 10;
/// Share of the best-scored intervals used for the floor estimate
const TOP_FRACTION: f64 = 0.20;
/// Minimum number of intervals in the top set
const MIN_TOP: usize = 8;
/// Amplitude-decay component reaches zero this far above the median
const AMPLITUDE_DECAY_DB: f64 = 6.0;
const AMPLITUDE_WEIGHT: f64 = 0.60;
const FLUX_WEIGHT: f64 = 0.40;
/// Headroom added on top of the estimated floor
const THRESHOLD_HEADROOM_DB: f64 = 1.0;
/// Fallback values when the prefix is too short
const FALLBACK_FLOOR_DB: f64 = -50.0;
const FALLBACK_HEADROOM_DB: f64 = 6.0;
/// Final clamp on the silence-detect threshold
const THRESHOLD_MIN_DB: f64 = -70.0;
const THRESHOLD_MAX_DB: f64 = -35.0;

/// Result of the pre-scan over the head of the recording
#[derive(Debug, Clone, Copy)]
pub struct PreScan {
    /// Noise-floor estimate (dBFS)
    pub noise_floor: f64,
    /// Adaptive silence-detect threshold (dBFS)
    pub threshold: f64,
    /// Median interval RMS of the prefix (dBFS)
    pub median_rms: f64,
    /// Median spectral flux of the prefix
    pub median_flux: f64,
    /// Number of prefix intervals that were scored
    pub prefix_len: usize,
    /// Whether the short-prefix fallback was taken
    pub fallback: bool,
}

/// Room-tone score for one interval against the pre-scan medians
///
/// Combines an amplitude-decay component (1.0 at or below the median,
/// linearly reaching 0 at 6 dB above it) with a flux-ratio component
/// (`1 / ratio-above-median`).
pub fn room_tone_score(interval: &IntervalSample, scan: &PreScan) -> f64 {
    let amplitude = (1.0 - (interval.rms_level - scan.median_rms) / AMPLITUDE_DECAY_DB)
        .clamp(0.0, 1.0);

    let flux_ratio = interval.spectral.flux / scan.median_flux.max(1e-9);
    let flux = if flux_ratio <= 1.0 {
        1.0
    } else {
        1.0 / flux_ratio
    };

    AMPLITUDE_WEIGHT * amplitude + FLUX_WEIGHT * flux
}

/// Run the pre-scan over the interval sequence
pub fn run(intervals: &[IntervalSample]) -> PreScan {
    let prefix_len = ((intervals.len() as f64 * SEARCH_FRACTION).ceil() as usize)
        .max(MIN_PREFIX)
        .min(intervals.len());

    if intervals.len() < MIN_PREFIX {
        let threshold =
            (FALLBACK_FLOOR_DB + FALLBACK_HEADROOM_DB).clamp(THRESHOLD_MIN_DB, THRESHOLD_MAX_DB);
        return PreScan {
            noise_floor: FALLBACK_FLOOR_DB,
            threshold,
            median_rms: FALLBACK_FLOOR_DB,
            median_flux: 0.0,
            prefix_len: intervals.len(),
            fallback: true,
        };
    }

    let prefix = &intervals[..prefix_len];
    let median_rms = median(prefix.iter().map(|i| i.rms_level));
    let median_flux = median(prefix.iter().map(|i| i.spectral.flux));

    let mut scan = PreScan {
        noise_floor: FALLBACK_FLOOR_DB,
        threshold: 0.0,
        median_rms,
        median_flux,
        prefix_len,
        fallback: false,
    };

    let mut scored: Vec<(f64, f64)> = prefix
        .iter()
        .map(|i| (room_tone_score(i, &scan), i.rms_level))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let top = ((prefix_len as f64 * TOP_FRACTION).ceil() as usize)
        .max(MIN_TOP)
        .min(prefix_len);

    // The floor is the *loudest* RMS among the room-tone-like intervals:
    // a conservative bound that the detector threshold sits just above
    let floor = scored[..top]
        .iter()
        .map(|(_, rms)| *rms)
        .fold(f64::NEG_INFINITY, f64::max);

    scan.noise_floor = floor;
    scan.threshold =
        (floor + THRESHOLD_HEADROOM_DB).clamp(THRESHOLD_MIN_DB, THRESHOLD_MAX_DB);
    scan
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralSnapshot;
    use approx::assert_relative_eq;

    fn interval(t: f64, rms: f64, flux: f64) -> IntervalSample {
        IntervalSample {
            timestamp: t,
            rms_level: rms,
            peak_level: rms + 10.0,
            spectral: SpectralSnapshot {
                flux,
                ..SpectralSnapshot::default()
            },
            momentary_lufs: rms,
            short_term_lufs: rms,
            true_peak: rms + 10.0,
            sample_peak: rms + 10.0,
        }
    }

    #[test]
    fn short_prefix_takes_fallback() {
        let intervals: Vec<_> = (0..5).map(|i| interval(i as f64 * 0.25, -60.0, 0.001)).collect();
        let scan = run(&intervals);
        assert!(scan.fallback);
        assert_eq!(scan.noise_floor, -50.0);
        assert_eq!(scan.threshold, -44.0);
    }

    #[test]
    fn quiet_head_produces_low_threshold() {
        // 100 intervals: head has quiet room tone at -65 dBFS, a few
        // louder ones at -40 dBFS
        let mut intervals: Vec<_> =
            (0..90).map(|i| interval(i as f64 * 0.25, -65.0, 0.001)).collect();
        for i in 0..10 {
            intervals.push(interval((90 + i) as f64 * 0.25, -40.0, 0.02));
        }

        let scan = run(&intervals);
        assert!(!scan.fallback);
        assert_relative_eq!(scan.noise_floor, -65.0, epsilon = 0.01);
        assert_relative_eq!(scan.threshold, -64.0, epsilon = 0.01);
    }

    #[test]
    fn threshold_is_clamped() {
        let intervals: Vec<_> =
            (0..100).map(|i| interval(i as f64 * 0.25, -100.0, 0.001)).collect();
        let scan = run(&intervals);
        assert_eq!(scan.threshold, -70.0);
    }

    #[test]
    fn room_tone_score_prefers_quiet_stable_intervals() {
        let intervals: Vec<_> =
            (0..40).map(|i| interval(i as f64 * 0.25, -60.0, 0.002)).collect();
        let scan = run(&intervals);

        let quiet = interval(0.0, -62.0, 0.002);
        let loud = interval(0.0, -50.0, 0.002);
        let busy = interval(0.0, -62.0, 0.02);

        assert!(room_tone_score(&quiet, &scan) > room_tone_score(&loud, &scan));
        assert!(room_tone_score(&quiet, &scan) > room_tone_score(&busy, &scan));
        assert_relative_eq!(room_tone_score(&quiet, &scan), 1.0);
    }
}
