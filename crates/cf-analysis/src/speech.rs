//! Speech candidate discovery, scoring and election
//!
//! Runs only after the silence election so the representative speech
//! region is guaranteed to sit after the room tone. Unlike silence,
//! where "first good enough" wins, speech benefits from more data: the
//! longest candidate above the floor is elected.

use cf_core::{units, TimeSpan};
use serde::{Deserialize, Serialize};

use crate::interval::{IntervalSample, RegionStats};
use crate::profile::NoiseProfile;
use crate::refine::{refine_region, RefineParams};
use crate::INTERVAL_SECONDS;

/// Search starts this far after the elected silence region (seconds)
const SEARCH_GAP_SECS: f64 = 2.0;
/// Search start when no silence region was elected (seconds)
const FALLBACK_SEARCH_START_SECS: f64 = 30.0;

/// Qualifying floor: an interval this quiet can never be speech (dBFS)
const QUALIFY_RMS_DB: f64 = -40.0;
/// Qualifying speech score
const QUALIFY_SCORE: f64 = 0.4;
/// Amplitude-boost window above the median RMS (dB)
const QUALIFY_BOOST_DB: f64 = 6.0;
/// Entropy below this contributes to the qualifying score
const QUALIFY_ENTROPY_KNEE: f64 = 0.70;

/// Minimum run length (120 intervals = 30 s)
const MIN_RUN_SECS: f64 = 30.0;
/// Consecutive non-speech intervals tolerated inside a run (2 s)
const RUN_TOLERANCE: usize = 8;

/// Voice spectral band (Hz)
const VOICE_BAND_LOW_HZ: f64 = 200.0;
const VOICE_BAND_HIGH_HZ: f64 = 4500.0;

/// Amplitude score range: [-30, -12] dBFS maps to [0, 1]
const AMPLITUDE_LOW_DB: f64 = -30.0;
const AMPLITUDE_HIGH_DB: f64 = -12.0;

/// Crest optimum for spoken word (dB)
const CREST_PEAK_DB: f64 = 12.0;
const CREST_MIN_DB: f64 = 9.0;
const CREST_MAX_DB: f64 = 18.0;

/// Duration plateau (seconds)
const DURATION_PLATEAU_SECS: f64 = 60.0;

/// Voicing density target
const VOICING_TARGET: f64 = 0.60;

/// Rolloff bands (Hz)
const ROLLOFF_FULL_LOW_HZ: f64 = 4000.0;
const ROLLOFF_FULL_HIGH_HZ: f64 = 8000.0;
const ROLLOFF_EDGE_LOW_HZ: f64 = 2500.0;
const ROLLOFF_EDGE_HIGH_HZ: f64 = 10000.0;

/// Flux knees
const FLUX_FULL: f64 = 0.004;
const FLUX_FLOOR_AT: f64 = 0.030;
const FLUX_FLOOR: f64 = 0.2;

/// Composite weights (sum to 1.0)
const WEIGHT_AMPLITUDE: f64 = 0.20;
const WEIGHT_CENTROID: f64 = 0.15;
const WEIGHT_CREST: f64 = 0.15;
const WEIGHT_DURATION: f64 = 0.10;
const WEIGHT_VOICING: f64 = 0.10;
const WEIGHT_ROLLOFF: f64 = 0.15;
const WEIGHT_FLUX: f64 = 0.15;

/// SNR margin below which the score is scaled down (dB)
const SNR_MARGIN_DB: f64 = 20.0;
const SNR_SCALE_FLOOR: f64 = 0.1;

/// Election floor
const MIN_ACCEPTABLE_SCORE: f64 = 0.3;

/// Golden sub-window refinement geometry
const REFINE: RefineParams = RefineParams {
    window_secs: 60.0,
    minimum_secs: 30.0,
};

/// One scored speech candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechCandidate {
    /// Candidate region on the timeline
    pub span: TimeSpan,
    /// Aggregated metrics over the enclosed intervals
    pub stats: RegionStats,
    /// Component scores
    pub amplitude_score: f64,
    pub centroid_score: f64,
    pub crest_score: f64,
    pub duration_score: f64,
    pub voicing_score: f64,
    pub rolloff_score: f64,
    pub flux_score: f64,
    /// Composite score in [0, 1], after any SNR margin scaling
    pub score: f64,
    /// Proportion of voiced intervals
    pub voicing_density: f64,
    /// Set when golden sub-window refinement replaced the region
    pub was_refined: bool,
    /// Pre-refinement bounds, preserved for reporting
    pub original_start: Option<f64>,
    pub original_duration: Option<f64>,
}

/// Outcome of the speech election
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechElection {
    /// Every discovered candidate in chronological order
    pub candidates: Vec<SpeechCandidate>,
    /// The elected (and possibly refined) candidate
    pub elected: Option<SpeechCandidate>,
}

/// Discover, score and elect a speech region
///
/// `silence_end` is the end of the elected silence region when one
/// exists; the search begins two seconds after it.
pub fn elect_speech(
    intervals: &[IntervalSample],
    silence_end: Option<f64>,
    noise_profile: Option<&NoiseProfile>,
) -> SpeechElection {
    let search_start = silence_end
        .map(|end| end + SEARCH_GAP_SECS)
        .unwrap_or(FALLBACK_SEARCH_START_SECS);
    let median_rms = median_rms(intervals);

    let spans = discover_runs(intervals, search_start, median_rms);
    let candidates: Vec<SpeechCandidate> = spans
        .into_iter()
        .map(|span| score_candidate(span, intervals, noise_profile))
        .collect();

    let elected = elect(&candidates).map(|idx| refine_elected(candidates[idx].clone(), intervals));

    if let Some(ref winner) = elected {
        log::debug!(
            "elected speech region {:.2}-{:.2}s (score {:.3}, voicing {:.2}, refined: {})",
            winner.span.start,
            winner.span.end,
            winner.score,
            winner.voicing_density,
            winner.was_refined
        );
    } else {
        log::debug!("no speech region elected ({} candidates)", candidates.len());
    }

    SpeechElection { candidates, elected }
}

/// Median interval RMS over the whole sequence
fn median_rms(intervals: &[IntervalSample]) -> f64 {
    let mut levels: Vec<f64> = intervals.iter().map(|i| i.rms_level).collect();
    if levels.is_empty() {
        return units::DB_FLOOR;
    }
    levels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = levels.len() / 2;
    if levels.len() % 2 == 0 {
        (levels[mid - 1] + levels[mid]) / 2.0
    } else {
        levels[mid]
    }
}

/// Per-interval qualifying score
fn qualify_score(interval: &IntervalSample, median_rms: f64) -> f64 {
    let boost = ((interval.rms_level - median_rms) / QUALIFY_BOOST_DB).clamp(0.0, 1.0);
    let in_band = interval.spectral.centroid >= VOICE_BAND_LOW_HZ
        && interval.spectral.centroid <= VOICE_BAND_HIGH_HZ;
    let entropy = if interval.spectral.entropy < QUALIFY_ENTROPY_KNEE {
        1.0 - interval.spectral.entropy / QUALIFY_ENTROPY_KNEE
    } else {
        0.0
    };

    0.5 * boost + 0.3 * if in_band { 1.0 } else { 0.0 } + 0.2 * entropy
}

/// Walk the tail of the timeline and collect qualifying runs
fn discover_runs(
    intervals: &[IntervalSample],
    search_start: f64,
    median_rms: f64,
) -> Vec<TimeSpan> {
    let begin = intervals.partition_point(|i| i.timestamp < search_start);
    let mut runs = Vec::new();

    let mut run_start: Option<f64> = None;
    let mut last_speech_end = 0.0;
    let mut quiet_streak = 0usize;

    let close = |start: f64, end: f64, runs: &mut Vec<TimeSpan>| {
        if end - start >= MIN_RUN_SECS {
            runs.push(TimeSpan::new(start, end));
        }
    };

    for interval in &intervals[begin..] {
        let speech = interval.rms_level >= QUALIFY_RMS_DB
            && qualify_score(interval, median_rms) >= QUALIFY_SCORE;

        if speech {
            if run_start.is_none() {
                run_start = Some(interval.timestamp);
            }
            last_speech_end = interval.timestamp + INTERVAL_SECONDS;
            quiet_streak = 0;
        } else if let Some(start) = run_start {
            quiet_streak += 1;
            if quiet_streak > RUN_TOLERANCE {
                close(start, last_speech_end, &mut runs);
                run_start = None;
                quiet_streak = 0;
            }
        }
    }

    if let Some(start) = run_start {
        close(start, last_speech_end, &mut runs);
    }

    runs
}

/// Intervals whose window starts inside the span
fn enclosed<'a>(span: TimeSpan, intervals: &'a [IntervalSample]) -> &'a [IntervalSample] {
    let first = intervals.partition_point(|i| i.timestamp < span.start - 1e-9);
    let last = intervals.partition_point(|i| i.timestamp < span.end - 1e-9);
    &intervals[first..last]
}

fn rolloff_score(rolloff: f64) -> f64 {
    if (ROLLOFF_FULL_LOW_HZ..=ROLLOFF_FULL_HIGH_HZ).contains(&rolloff) {
        1.0
    } else if rolloff >= ROLLOFF_EDGE_LOW_HZ && rolloff < ROLLOFF_FULL_LOW_HZ {
        0.5 + 0.5 * (rolloff - ROLLOFF_EDGE_LOW_HZ) / (ROLLOFF_FULL_LOW_HZ - ROLLOFF_EDGE_LOW_HZ)
    } else if rolloff > ROLLOFF_FULL_HIGH_HZ && rolloff <= ROLLOFF_EDGE_HIGH_HZ {
        1.0 - 0.5 * (rolloff - ROLLOFF_FULL_HIGH_HZ)
            / (ROLLOFF_EDGE_HIGH_HZ - ROLLOFF_FULL_HIGH_HZ)
    } else {
        0.0
    }
}

fn flux_score(flux: f64) -> f64 {
    if flux <= FLUX_FULL {
        1.0
    } else if flux >= FLUX_FLOOR_AT {
        FLUX_FLOOR
    } else {
        1.0 - (1.0 - FLUX_FLOOR) * (flux - FLUX_FULL) / (FLUX_FLOOR_AT - FLUX_FULL)
    }
}

fn crest_score(crest: f64) -> f64 {
    if crest < CREST_MIN_DB || crest > CREST_MAX_DB {
        0.0
    } else if crest <= CREST_PEAK_DB {
        (crest - CREST_MIN_DB) / (CREST_PEAK_DB - CREST_MIN_DB)
    } else {
        (CREST_MAX_DB - crest) / (CREST_MAX_DB - CREST_PEAK_DB)
    }
}

/// Score one candidate span against the enclosed intervals
pub(crate) fn score_candidate(
    span: TimeSpan,
    intervals: &[IntervalSample],
    noise_profile: Option<&NoiseProfile>,
) -> SpeechCandidate {
    let stats = RegionStats::from_intervals(enclosed(span, intervals));

    let amplitude_score = units::normalize_db(stats.rms_level, AMPLITUDE_LOW_DB, AMPLITUDE_HIGH_DB);
    let centroid_score = if stats.centroid >= VOICE_BAND_LOW_HZ
        && stats.centroid <= VOICE_BAND_HIGH_HZ
    {
        1.0
    } else {
        0.0
    };
    let crest_score = crest_score(stats.crest_factor);
    let duration_score = (span.duration() / DURATION_PLATEAU_SECS).min(1.0);
    let voicing_score = (stats.voicing_density / VOICING_TARGET).min(1.0);
    let rolloff_score = rolloff_score(stats.rolloff);
    let flux_score = flux_score(stats.flux);

    let mut score = WEIGHT_AMPLITUDE * amplitude_score
        + WEIGHT_CENTROID * centroid_score
        + WEIGHT_CREST * crest_score
        + WEIGHT_DURATION * duration_score
        + WEIGHT_VOICING * voicing_score
        + WEIGHT_ROLLOFF * rolloff_score
        + WEIGHT_FLUX * flux_score;

    // A candidate barely above the measured noise floor is suspect
    if let Some(profile) = noise_profile {
        let snr_margin = stats.rms_level - profile.measured_noise_floor;
        if snr_margin < SNR_MARGIN_DB {
            score *= (snr_margin / SNR_MARGIN_DB).clamp(SNR_SCALE_FLOOR, 1.0);
        }
    }

    SpeechCandidate {
        span,
        stats,
        amplitude_score,
        centroid_score,
        crest_score,
        duration_score,
        voicing_score,
        rolloff_score,
        flux_score,
        score,
        voicing_density: stats.voicing_density,
        was_refined: false,
        original_start: None,
        original_duration: None,
    }
}

/// Longest candidate whose score clears the floor
fn elect(candidates: &[SpeechCandidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.score >= MIN_ACCEPTABLE_SCORE)
        .max_by(|(_, a), (_, b)| {
            a.span
                .duration()
                .partial_cmp(&b.span.duration())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(idx, _)| idx)
}

/// Window scorer for refinement: the candidate weights applied to a
/// fixed-length window
fn window_quality(window: &[IntervalSample]) -> f64 {
    let stats = RegionStats::from_intervals(window);
    WEIGHT_AMPLITUDE * units::normalize_db(stats.rms_level, AMPLITUDE_LOW_DB, AMPLITUDE_HIGH_DB)
        + WEIGHT_CENTROID
            * if stats.centroid >= VOICE_BAND_LOW_HZ && stats.centroid <= VOICE_BAND_HIGH_HZ {
                1.0
            } else {
                0.0
            }
        + WEIGHT_CREST * crest_score(stats.crest_factor)
        + WEIGHT_DURATION
        + WEIGHT_VOICING * (stats.voicing_density / VOICING_TARGET).min(1.0)
        + WEIGHT_ROLLOFF * rolloff_score(stats.rolloff)
        + WEIGHT_FLUX * flux_score(stats.flux)
}

/// Narrow a long elected region to its best golden sub-window
fn refine_elected(mut candidate: SpeechCandidate, intervals: &[IntervalSample]) -> SpeechCandidate {
    let region = enclosed(candidate.span, intervals);
    let Some((start, len)) = refine_region(region, &REFINE, window_quality, |a, b| a > b) else {
        return candidate;
    };

    let original = candidate.span;
    candidate.span =
        TimeSpan::from_duration(region[start].timestamp, len as f64 * INTERVAL_SECONDS);
    candidate.stats = RegionStats::from_intervals(&region[start..start + len]);
    candidate.voicing_density = candidate.stats.voicing_density;
    candidate.was_refined = true;
    candidate.original_start = Some(original.start);
    candidate.original_duration = Some(original.duration());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralSnapshot;
    use approx::assert_relative_eq;

    fn speech_interval(t: f64) -> IntervalSample {
        IntervalSample {
            timestamp: t,
            rms_level: -18.0,
            peak_level: -6.0,
            spectral: SpectralSnapshot {
                centroid: 1200.0,
                flatness: 0.2,
                kurtosis: 6.0,
                entropy: 0.45,
                flux: 0.003,
                rolloff: 5000.0,
                ..SpectralSnapshot::default()
            },
            momentary_lufs: -18.0,
            short_term_lufs: -18.0,
            true_peak: -6.0,
            sample_peak: -6.0,
        }
    }

    fn quiet_interval(t: f64) -> IntervalSample {
        let mut iv = speech_interval(t);
        iv.rms_level = -65.0;
        iv.peak_level = -55.0;
        iv.spectral.centroid = 120.0;
        iv.spectral.kurtosis = 2.0;
        iv.spectral.entropy = 0.9;
        iv
    }

    /// Timeline with speech over `talk` (seconds), quiet elsewhere
    fn timeline(len_secs: usize, talk: std::ops::Range<usize>) -> Vec<IntervalSample> {
        (0..len_secs * 4)
            .map(|i| {
                let t = i as f64 * 0.25;
                if talk.contains(&(i / 4)) {
                    speech_interval(t)
                } else {
                    quiet_interval(t)
                }
            })
            .collect()
    }

    #[test]
    fn finds_speech_after_search_start() {
        let intervals = timeline(400, 40..200);
        let election = elect_speech(&intervals, Some(28.0), None);

        let winner = election.elected.expect("should elect the speech run");
        assert_relative_eq!(winner.span.start, 40.0, epsilon = 0.3);
        assert!(winner.score >= MIN_ACCEPTABLE_SCORE);
        // 160 s run exceeds the 60 s golden window
        assert!(winner.was_refined);
        assert_relative_eq!(winner.span.duration(), 60.0, epsilon = 1e-9);
        assert_eq!(winner.original_duration, Some(160.0));
    }

    #[test]
    fn search_skips_material_before_gap() {
        // Speech at 20-55 s sits before the search start (28 + 2 = 30 s);
        // the partial tail visible from 30 s is only 25 s, too short
        let intervals = timeline(300, 20..55);
        let election = elect_speech(&intervals, Some(28.0), None);
        assert!(election.candidates.is_empty());
        assert!(election.elected.is_none());
    }

    #[test]
    fn fallback_search_start_without_silence() {
        let intervals = timeline(300, 10..100);
        let election = elect_speech(&intervals, None, None);
        let winner = election.elected.unwrap();
        // Search begins at 30 s, so the run is discovered from there
        assert!(winner.span.start >= 30.0);
    }

    #[test]
    fn run_shorter_than_minimum_is_dropped() {
        let intervals = timeline(300, 40..65);
        let election = elect_speech(&intervals, Some(28.0), None);
        assert!(election.candidates.is_empty());
    }

    #[test]
    fn tolerance_bridges_pauses() {
        let mut intervals = timeline(300, 40..80);
        // A 2 s pause (8 intervals) inside the run is tolerated
        for i in 200..208 {
            intervals[i] = quiet_interval(i as f64 * 0.25);
        }
        let election = elect_speech(&intervals, Some(28.0), None);
        assert_eq!(election.candidates.len(), 1);
        assert!(election.candidates[0].span.duration() >= 39.0);
    }

    #[test]
    fn longest_candidate_wins() {
        let mut a = score_candidate(TimeSpan::new(40.0, 75.0), &timeline(300, 40..75), None);
        let mut b = a.clone();
        a.score = 0.9;
        b.score = 0.5;
        b.span = TimeSpan::new(100.0, 180.0);

        // Both clear the floor; the longer one wins despite the lower score
        assert_eq!(elect(&[a.clone(), b.clone()]), Some(1));

        b.score = 0.2;
        assert_eq!(elect(&[a, b]), Some(0));
    }

    #[test]
    fn snr_margin_scales_score_down() {
        let intervals = timeline(300, 40..120);
        let span = TimeSpan::new(40.0, 120.0);

        let unscaled = score_candidate(span, &intervals, None);

        // Noise floor 10 dB under the speech RMS: margin 10 -> x0.5
        let profile = NoiseProfile {
            start: 18.0,
            duration: 10.0,
            measured_noise_floor: -28.0,
            peak_level: -20.0,
            crest_factor: 8.0,
            entropy: 0.9,
            centroid: 120.0,
            flatness: 0.8,
            kurtosis: 2.0,
            extraction_warning: None,
        };
        let scaled = score_candidate(span, &intervals, Some(&profile));
        assert_relative_eq!(scaled.score, unscaled.score * 0.5, epsilon = 1e-9);

        // Comfortable margin: no scaling
        let far = NoiseProfile {
            measured_noise_floor: -70.0,
            ..profile
        };
        let unchanged = score_candidate(span, &intervals, Some(&far));
        assert_relative_eq!(unchanged.score, unscaled.score, epsilon = 1e-12);
    }

    #[test]
    fn rolloff_and_flux_scores_follow_the_piecewise_curves() {
        assert_eq!(rolloff_score(5000.0), 1.0);
        assert_relative_eq!(rolloff_score(2500.0), 0.5);
        assert_relative_eq!(rolloff_score(10000.0), 0.5);
        assert_eq!(rolloff_score(2000.0), 0.0);
        assert_eq!(rolloff_score(11000.0), 0.0);

        assert_eq!(flux_score(0.001), 1.0);
        assert_eq!(flux_score(0.05), FLUX_FLOOR);
        let mid = flux_score(0.017);
        assert!(mid > FLUX_FLOOR && mid < 1.0);
    }

    #[test]
    fn crest_score_peaks_at_twelve() {
        assert_relative_eq!(crest_score(12.0), 1.0);
        assert_relative_eq!(crest_score(9.0), 0.0);
        assert_relative_eq!(crest_score(18.0), 0.0);
        assert_relative_eq!(crest_score(10.5), 0.5);
        assert_eq!(crest_score(25.0), 0.0);
    }

    #[test]
    fn short_region_refinement_is_a_no_op() {
        let intervals = timeline(300, 40..95);
        let candidate = score_candidate(TimeSpan::new(40.0, 95.0), &intervals, None);
        let refined = refine_elected(candidate.clone(), &intervals);
        assert!(!refined.was_refined);
        assert_eq!(refined.span, candidate.span);
    }
}
