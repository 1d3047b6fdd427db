//! Silence (room tone) candidate discovery, scoring and election
//!
//! Intentional room tone is recorded near the head of a session, so the
//! search is confined to the first 15 % of the timeline and the election
//! prefers the earliest candidate whose score is within tolerance of the
//! best. Long quiet stretches are segmented before scoring so accidental
//! and intentional silence cannot blur into one averaged candidate.

use cf_core::{units, TimeSpan};
use serde::{Deserialize, Serialize};

use crate::interval::{IntervalSample, RegionStats};
use crate::prescan::{room_tone_score, PreScan};
use crate::refine::{mean_rms, refine_region, RefineParams};
use crate::INTERVAL_SECONDS;

/// Runs may not start earlier than this (seconds)
const EARLIEST_START_SECS: f64 = 15.0;
/// Minimum run length (32 intervals = 8 s)
const MIN_RUN_SECS: f64 = 8.0;
/// Consecutive non-silent intervals tolerated inside a run
const RUN_TOLERANCE: usize = 3;
/// Room-tone score an interval must reach to qualify as silent
const QUALIFY_SCORE: f64 = 0.5;

/// Candidates longer than this are split into overlapping segments
const SEGMENT_THRESHOLD_SECS: f64 = 20.0;
const SEGMENT_LEN_SECS: f64 = 12.0;
const SEGMENT_OVERLAP_SECS: f64 = 4.0;

/// Amplitude score range: [-80, -40] dBFS maps to [1, 0]
const AMPLITUDE_LOW_DB: f64 = -80.0;
const AMPLITUDE_HIGH_DB: f64 = -40.0;

/// Human-voice spectral band used by the crosstalk rules (Hz)
const VOICE_BAND_LOW_HZ: f64 = 250.0;
const VOICE_BAND_HIGH_HZ: f64 = 4500.0;

/// Ideal duration range and Gaussian falloff outside it
const IDEAL_MIN_SECS: f64 = 8.0;
const IDEAL_MAX_SECS: f64 = 18.0;
const DURATION_SIGMA_SECS: f64 = 5.0;

/// Stability knees
const STABILITY_VARIANCE_KNEE: f64 = 9.0;
const STABILITY_FLUX_KNEE: f64 = 0.02;

/// Composite weights (sum to 1.0)
const WEIGHT_AMPLITUDE: f64 = 0.30;
const WEIGHT_SPECTRAL: f64 = 0.35;
const WEIGHT_DURATION: f64 = 0.10;
const WEIGHT_STABILITY: f64 = 0.25;

/// Crosstalk rejection: crest factor above this always rejects
const REJECT_CREST_DB: f64 = 45.0;
/// In-band rejection triggers
const REJECT_KURTOSIS: f64 = 10.0;
const REJECT_CREST_IN_BAND_DB: f64 = 15.0;

/// Crest penalty stage one
const PENALTY_CREST_DB: f64 = 30.0;
const PENALTY_CREST_SLOPE: f64 = 50.0;
const PENALTY_CREST_MAX: f64 = 0.2;
/// Danger-zone signature (stage two)
const DANGER_CREST_DB: f64 = 35.0;
const DANGER_PEAK_LOW_DB: f64 = -40.0;
const DANGER_PEAK_HIGH_DB: f64 = -25.0;
const DANGER_RMS_DB: f64 = -70.0;
const DANGER_PENALTY: f64 = 0.5;

/// Election parameters
const SELECTION_TOLERANCE: f64 = 0.02;
const MIN_ACCEPTABLE_SCORE: f64 = 0.3;

/// Golden sub-window refinement geometry
const REFINE: RefineParams = RefineParams {
    window_secs: 10.0,
    minimum_secs: 8.0,
};

/// One scored silence candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilenceCandidate {
    /// Candidate region on the timeline
    pub span: TimeSpan,
    /// Aggregated metrics over the enclosed intervals
    pub stats: RegionStats,
    /// Component scores
    pub amplitude_score: f64,
    pub spectral_score: f64,
    pub duration_score: f64,
    pub stability_score: f64,
    /// Composite score in [0, 1]; 0 when rejected as crosstalk
    pub score: f64,
    /// Set when the danger-zone crest signature fired without rejection
    pub transient_warning: Option<String>,
    /// Set when golden sub-window refinement replaced the region
    pub was_refined: bool,
    /// Pre-refinement bounds, preserved for reporting
    pub original_start: Option<f64>,
    pub original_duration: Option<f64>,
}

/// Outcome of the silence election
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SilenceElection {
    /// Every discovered candidate in chronological order
    pub candidates: Vec<SilenceCandidate>,
    /// The elected (and possibly refined) candidate
    pub elected: Option<SilenceCandidate>,
}

/// Discover, score and elect a silence region
pub fn elect_silence(
    intervals: &[IntervalSample],
    scan: &PreScan,
) -> SilenceElection {
    let spans = discover_runs(intervals, scan);
    let spans = segment_long_runs(spans);

    let candidates: Vec<SilenceCandidate> = spans
        .into_iter()
        .map(|span| score_candidate(span, intervals))
        .collect();

    let elected = elect(&candidates).map(|idx| refine_elected(candidates[idx].clone(), intervals));

    if let Some(ref winner) = elected {
        log::debug!(
            "elected silence region {:.2}-{:.2}s (score {:.3}, refined: {})",
            winner.span.start,
            winner.span.end,
            winner.score,
            winner.was_refined
        );
    } else {
        log::debug!("no silence region elected ({} candidates)", candidates.len());
    }

    SilenceElection { candidates, elected }
}

/// Walk the search prefix and collect qualifying runs
fn discover_runs(intervals: &[IntervalSample], scan: &PreScan) -> Vec<TimeSpan> {
    let search = &intervals[..scan.prefix_len.min(intervals.len())];
    let mut runs = Vec::new();

    let mut run_start: Option<f64> = None;
    let mut last_silent_end = 0.0;
    let mut loud_streak = 0usize;

    let close = |start: f64, end: f64, runs: &mut Vec<TimeSpan>| {
        let duration = end - start;
        if start >= EARLIEST_START_SECS && duration >= MIN_RUN_SECS {
            runs.push(TimeSpan::new(start, end));
        }
    };

    for interval in search {
        let silent = interval.rms_level <= scan.threshold
            && room_tone_score(interval, scan) >= QUALIFY_SCORE;

        if silent {
            if run_start.is_none() {
                run_start = Some(interval.timestamp);
            }
            last_silent_end = interval.timestamp + INTERVAL_SECONDS;
            loud_streak = 0;
        } else if let Some(start) = run_start {
            loud_streak += 1;
            if loud_streak > RUN_TOLERANCE {
                close(start, last_silent_end, &mut runs);
                run_start = None;
                loud_streak = 0;
            }
        }
    }

    // A run that reaches the search limit closes at the limit
    if let Some(start) = run_start {
        let limit = search
            .last()
            .map(|i| i.timestamp + INTERVAL_SECONDS)
            .unwrap_or(last_silent_end);
        close(start, limit, &mut runs);
    }

    runs
}

/// Split candidates longer than the threshold into overlapping segments
fn segment_long_runs(spans: Vec<TimeSpan>) -> Vec<TimeSpan> {
    let step = SEGMENT_LEN_SECS - SEGMENT_OVERLAP_SECS;
    let mut out = Vec::new();

    for span in spans {
        if span.duration() <= SEGMENT_THRESHOLD_SECS {
            out.push(span);
            continue;
        }

        let mut start = span.start;
        while start < span.end {
            let end = (start + SEGMENT_LEN_SECS).min(span.end);
            if end - start >= MIN_RUN_SECS {
                out.push(TimeSpan::new(start, end));
            }
            if end >= span.end {
                break;
            }
            start += step;
        }
    }

    out
}

/// Intervals whose window starts inside the span
fn enclosed<'a>(span: TimeSpan, intervals: &'a [IntervalSample]) -> &'a [IntervalSample] {
    let first = intervals.partition_point(|i| i.timestamp < span.start - 1e-9);
    let last = intervals.partition_point(|i| i.timestamp < span.end - 1e-9);
    &intervals[first..last]
}

/// Score one candidate span against the enclosed intervals
pub(crate) fn score_candidate(span: TimeSpan, intervals: &[IntervalSample]) -> SilenceCandidate {
    let stats = RegionStats::from_intervals(enclosed(span, intervals));

    let amplitude_score =
        1.0 - units::normalize_db(stats.rms_level, AMPLITUDE_LOW_DB, AMPLITUDE_HIGH_DB);

    let band_mid = (VOICE_BAND_LOW_HZ + VOICE_BAND_HIGH_HZ) / 2.0;
    let band_half = (VOICE_BAND_HIGH_HZ - VOICE_BAND_LOW_HZ) / 2.0;
    let in_voice_band =
        stats.centroid >= VOICE_BAND_LOW_HZ && stats.centroid <= VOICE_BAND_HIGH_HZ;
    let centroid_component = if in_voice_band {
        0.5 * ((stats.centroid - band_mid).abs() / band_half)
    } else {
        1.0
    };
    let spectral_score = 0.5 * centroid_component
        + 0.3 * stats.flatness
        + 0.2 * (1.0 - (stats.kurtosis / 20.0).min(1.0));

    let duration = span.duration();
    let duration_score = if (IDEAL_MIN_SECS..=IDEAL_MAX_SECS).contains(&duration) {
        1.0
    } else {
        let edge = if duration < IDEAL_MIN_SECS {
            IDEAL_MIN_SECS
        } else {
            IDEAL_MAX_SECS
        };
        let d = duration - edge;
        (-d * d / (2.0 * DURATION_SIGMA_SECS * DURATION_SIGMA_SECS)).exp()
    };

    let stability_score = 0.6 * (1.0 - (stats.rms_variance / STABILITY_VARIANCE_KNEE).min(1.0))
        + 0.4 * (1.0 - (stats.flux / STABILITY_FLUX_KNEE).min(1.0));

    let mut score = WEIGHT_AMPLITUDE * amplitude_score
        + WEIGHT_SPECTRAL * spectral_score
        + WEIGHT_DURATION * duration_score
        + WEIGHT_STABILITY * stability_score;
    let mut transient_warning = None;

    // Crosstalk rejection: either rule zeroes the score outright
    let crest = stats.crest_factor;
    let rejected = crest > REJECT_CREST_DB
        || (in_voice_band
            && (stats.kurtosis > REJECT_KURTOSIS || crest > REJECT_CREST_IN_BAND_DB));

    if rejected {
        score = 0.0;
    } else {
        if crest > PENALTY_CREST_DB {
            score *= 1.0 - PENALTY_CREST_MAX.min((crest - PENALTY_CREST_DB) / PENALTY_CREST_SLOPE);
        }
        let danger = crest > DANGER_CREST_DB
            && stats.peak_level > DANGER_PEAK_LOW_DB
            && stats.peak_level < DANGER_PEAK_HIGH_DB
            && stats.rms_level < DANGER_RMS_DB;
        if danger {
            score *= DANGER_PENALTY;
            transient_warning = Some(format!(
                "transient spikes over a very low floor (crest {:.1} dB, peak {:.1} dBFS): \
                 room tone may contain bleed",
                crest, stats.peak_level
            ));
        }
    }

    SilenceCandidate {
        span,
        stats,
        amplitude_score,
        spectral_score,
        duration_score,
        stability_score,
        score,
        transient_warning,
        was_refined: false,
        original_start: None,
        original_duration: None,
    }
}

/// Earliest candidate within tolerance of the best score
fn elect(candidates: &[SilenceCandidate]) -> Option<usize> {
    let best = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);
    if !best.is_finite() {
        return None;
    }

    candidates
        .iter()
        .position(|c| c.score >= best - SELECTION_TOLERANCE && c.score >= MIN_ACCEPTABLE_SCORE)
}

/// Narrow a long elected region to its quietest golden sub-window
fn refine_elected(
    mut candidate: SilenceCandidate,
    intervals: &[IntervalSample],
) -> SilenceCandidate {
    let region = enclosed(candidate.span, intervals);
    let Some((start, len)) = refine_region(region, &REFINE, mean_rms, |a, b| a < b) else {
        return candidate;
    };

    let original = candidate.span;
    candidate.span = TimeSpan::from_duration(
        region[start].timestamp,
        len as f64 * INTERVAL_SECONDS,
    );
    candidate.stats = RegionStats::from_intervals(&region[start..start + len]);
    candidate.was_refined = true;
    candidate.original_start = Some(original.start);
    candidate.original_duration = Some(original.duration());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prescan;
    use crate::spectral::SpectralSnapshot;
    use approx::assert_relative_eq;

    fn interval(t: f64, rms: f64, peak_offset: f64) -> IntervalSample {
        IntervalSample {
            timestamp: t,
            rms_level: rms,
            peak_level: rms + peak_offset,
            spectral: SpectralSnapshot {
                centroid: 120.0,
                flatness: 0.8,
                kurtosis: 2.0,
                entropy: 0.9,
                flux: 0.001,
                rolloff: 900.0,
                ..SpectralSnapshot::default()
            },
            momentary_lufs: rms,
            short_term_lufs: rms,
            true_peak: rms + peak_offset,
            sample_peak: rms + peak_offset,
        }
    }

    fn speech_interval(t: f64) -> IntervalSample {
        let mut iv = interval(t, -22.0, 12.0);
        iv.spectral.centroid = 1400.0;
        iv.spectral.kurtosis = 6.0;
        iv.spectral.flux = 0.02;
        iv
    }

    /// A 500 s timeline: speech everywhere except room tone over
    /// `tone` (seconds)
    fn timeline(tone: std::ops::Range<usize>) -> Vec<IntervalSample> {
        (0..2000)
            .map(|i| {
                let t = i as f64 * 0.25;
                if tone.contains(&(i / 4)) {
                    interval(t, -70.0, 8.0)
                } else {
                    speech_interval(t)
                }
            })
            .collect()
    }

    fn run(intervals: &[IntervalSample]) -> SilenceElection {
        let scan = prescan::run(intervals);
        elect_silence(intervals, &scan)
    }

    #[test]
    fn finds_room_tone_in_head() {
        let intervals = timeline(18..30);
        let election = run(&intervals);

        assert_eq!(election.candidates.len(), 1);
        let winner = election.elected.expect("should elect the tone");
        // 12 s of tone exceeds the 10 s golden window, so the elected
        // region is refined down to [18, 28]
        assert!(winner.was_refined);
        assert_relative_eq!(winner.span.start, 18.0, epsilon = 0.3);
        assert_relative_eq!(winner.span.duration(), 10.0, epsilon = 1e-9);
        assert_eq!(winner.original_duration, Some(12.0));
        assert!(winner.score >= MIN_ACCEPTABLE_SCORE);
    }

    #[test]
    fn runs_before_fifteen_seconds_are_rejected() {
        let intervals = timeline(5..14);
        let election = run(&intervals);
        assert!(election.candidates.is_empty());
        assert!(election.elected.is_none());
    }

    #[test]
    fn run_of_exactly_min_duration_is_accepted() {
        // 8 s of tone = 32 intervals, starting right at 16 s
        let intervals = timeline(16..24);
        let election = run(&intervals);
        assert_eq!(election.candidates.len(), 1);
        assert_relative_eq!(election.candidates[0].span.duration(), 8.0, epsilon = 0.3);
    }

    #[test]
    fn tolerance_bridges_short_interruptions() {
        let mut intervals = timeline(18..30);
        // Three loud intervals (750 ms) in the middle of the tone must
        // not split the run
        for i in 88..91 {
            intervals[i] = speech_interval(i as f64 * 0.25);
        }
        let election = run(&intervals);
        assert_eq!(election.candidates.len(), 1);
        assert!(election.candidates[0].span.duration() > 10.0);
    }

    #[test]
    fn four_interruptions_split_the_run() {
        let mut intervals = timeline(18..34);
        for i in 96..100 {
            intervals[i] = speech_interval(i as f64 * 0.25);
        }
        let election = run(&intervals);
        // First half survives (18-24 s = 6 s -> too short, rejected);
        // the second half (25-34 s = 9 s) is a candidate
        assert_eq!(election.candidates.len(), 1);
        assert!(election.candidates[0].span.start > 24.0);
    }

    #[test]
    fn long_run_is_segmented() {
        let intervals = timeline(20..44);
        let election = run(&intervals);

        // 24 s -> 0-12 / 8-20 / 16-24 relative segments
        assert_eq!(election.candidates.len(), 3);
        assert_relative_eq!(election.candidates[0].span.start, 20.0, epsilon = 0.3);
        assert_relative_eq!(election.candidates[1].span.start, 28.0, epsilon = 0.3);
        assert_relative_eq!(election.candidates[2].span.start, 36.0, epsilon = 0.3);
        assert_relative_eq!(election.candidates[2].span.end, 44.0, epsilon = 0.3);
    }

    #[test]
    fn crosstalk_candidate_is_zeroed() {
        // Centroid 1800 Hz with kurtosis 14: crosstalk, score forced to 0
        let intervals: Vec<IntervalSample> = (0..48)
            .map(|i| {
                let mut iv = interval(16.0 + i as f64 * 0.25, -60.0, 10.0);
                iv.spectral.centroid = 1800.0;
                iv.spectral.kurtosis = 14.0;
                iv
            })
            .collect();
        let candidate = score_candidate(TimeSpan::new(16.0, 28.0), &intervals);
        assert_eq!(candidate.score, 0.0);
    }

    #[test]
    fn crest_exactly_45_is_not_rejected() {
        // Rule is strictly greater-than; pin the boundary
        let intervals: Vec<IntervalSample> = (0..48)
            .map(|i| interval(16.0 + i as f64 * 0.25, -75.0, 45.0))
            .collect();
        let candidate = score_candidate(TimeSpan::new(16.0, 28.0), &intervals);
        assert_relative_eq!(candidate.stats.crest_factor, 45.0, epsilon = 1e-9);
        assert!(candidate.score > 0.0);

        let above: Vec<IntervalSample> = (0..48)
            .map(|i| interval(16.0 + i as f64 * 0.25, -75.0, 45.1))
            .collect();
        let rejected = score_candidate(TimeSpan::new(16.0, 28.0), &above);
        assert_eq!(rejected.score, 0.0);
    }

    #[test]
    fn danger_zone_penalises_and_warns() {
        // Crest 38 dB, peak -34 dBFS, RMS -72 dBFS: warn and halve,
        // do not reject
        let intervals: Vec<IntervalSample> = (0..48)
            .map(|i| interval(16.0 + i as f64 * 0.25, -72.0, 38.0))
            .collect();
        let candidate = score_candidate(TimeSpan::new(16.0, 28.0), &intervals);

        assert!(candidate.score > 0.0);
        assert!(candidate.transient_warning.is_some());

        // Same region without the spikes scores at least twice as high
        let clean: Vec<IntervalSample> = (0..48)
            .map(|i| interval(16.0 + i as f64 * 0.25, -72.0, 8.0))
            .collect();
        let reference = score_candidate(TimeSpan::new(16.0, 28.0), &clean);
        assert!(reference.score > candidate.score * 1.9);
    }

    #[test]
    fn earliest_candidate_within_tolerance_wins() {
        let mut a = score_candidate(
            TimeSpan::new(16.0, 26.0),
            &timeline(16..26),
        );
        let mut b = a.clone();
        a.score = 0.90;
        b.score = 0.91;
        b.span = TimeSpan::new(40.0, 50.0);

        let elected = elect(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(elected, 0, "earlier candidate within 0.02 must win");

        b.score = 0.95;
        let elected = elect(&[a, b]).unwrap();
        assert_eq!(elected, 1, "outside tolerance the best one wins");
    }

    #[test]
    fn score_exactly_at_minimum_is_accepted() {
        let mut c = score_candidate(TimeSpan::new(16.0, 26.0), &timeline(16..26));
        c.score = MIN_ACCEPTABLE_SCORE;
        assert_eq!(elect(&[c]), Some(0));
    }

    #[test]
    fn refinement_keeps_quietest_window() {
        // 16 s candidate whose second half is quieter
        let mut intervals = Vec::new();
        for i in 0..64 {
            let rms = if i < 32 { -62.0 } else { -74.0 };
            intervals.push(interval(16.0 + i as f64 * 0.25, rms, 8.0));
        }
        let candidate = score_candidate(TimeSpan::new(16.0, 32.0), &intervals);
        let refined = refine_elected(candidate, &intervals);

        assert!(refined.was_refined);
        assert_eq!(refined.original_start, Some(16.0));
        assert_eq!(refined.original_duration, Some(16.0));
        assert_relative_eq!(refined.span.duration(), 10.0, epsilon = 1e-9);
        assert!(refined.span.start >= 21.5, "window should sit in the quiet half");
        assert!(refined.stats.rms_level < -70.0);
    }

    #[test]
    fn no_candidates_yields_empty_election() {
        let intervals = timeline(2000..2001);
        let election = run(&intervals);
        assert!(election.candidates.is_empty());
        assert!(election.elected.is_none());
    }
}
