//! # Settings Filter
//!
//! Per-request predicate over candidate tracks: audio-feature range modes plus
//! genre include/exclude terms. Range breakpoints are fixed constants; all
//! bounds are inclusive.

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{AudioFeature, RecommendedTrack, Track};

/// Preferred level of one audio feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    High,
    Mid,
    Low,
    /// No constraint, not even the feature's nominal `[0, 1]` range.
    #[default]
    Unset,
}

/// User-chosen preferences for one recommendation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub danceability: Mode,
    pub energy: Mode,
    pub valence: Mode,
    pub instrumentalness: Mode,
    pub speechiness: Mode,
    pub tempo: Mode,
    pub include_genres: Vec<String>,
    pub exclude_genres: Vec<String>,
}

impl SessionSettings {
    /// Mode chosen for `feature`; features without a setting are unconstrained.
    #[must_use]
    pub const fn mode(&self, feature: AudioFeature) -> Mode {
        match feature {
            AudioFeature::Danceability => self.danceability,
            AudioFeature::Energy => self.energy,
            AudioFeature::Valence => self.valence,
            AudioFeature::Instrumentalness => self.instrumentalness,
            AudioFeature::Speechiness => self.speechiness,
            AudioFeature::Tempo => self.tempo,
            AudioFeature::Loudness | AudioFeature::Acousticness | AudioFeature::Liveness => Mode::Unset,
        }
    }
}

/// Inclusive `[min, max]` range of `feature` under `mode`. `None` means no
/// constraint.
#[must_use]
pub fn feature_range(feature: AudioFeature, mode: Mode) -> Option<(f64, f64)> {
    let (low, high, top) = match feature {
        AudioFeature::Danceability | AudioFeature::Energy => (0.5, 0.65, 1.0),
        AudioFeature::Valence => (0.45, 0.6, 1.0),
        AudioFeature::Instrumentalness => (0.3, 0.6, 1.0),
        AudioFeature::Speechiness => (0.33, 0.66, 1.0),
        AudioFeature::Tempo => (90.0, 120.0, f64::INFINITY),
        AudioFeature::Loudness | AudioFeature::Acousticness | AudioFeature::Liveness => return None,
    };
    match mode {
        Mode::High => Some((high, top)),
        Mode::Mid => Some((low, high)),
        Mode::Low => Some((0.0, low)),
        Mode::Unset => None,
    }
}

#[derive(Debug, Clone)]
pub struct SettingsFilter {
    ranges: Vec<(AudioFeature, f64, f64)>,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl SettingsFilter {
    #[must_use]
    pub fn new(settings: &SessionSettings) -> Self {
        let ranges = AudioFeature::ALL
            .into_iter()
            .filter_map(|feature| {
                feature_range(feature, settings.mode(feature)).map(|(min, max)| (feature, min, max))
            })
            .collect();
        let lowered = |terms: &[String]| -> Vec<String> {
            terms
                .iter()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect()
        };

        Self {
            ranges,
            include: lowered(&settings.include_genres),
            exclude: lowered(&settings.exclude_genres),
        }
    }

    /// Whether `track` satisfies every active constraint. Exclusion wins over
    /// inclusion.
    #[must_use]
    pub fn accepts(&self, track: &Track) -> bool {
        let in_range = self.ranges.iter().all(|(feature, min, max)| {
            let value = feature.value(&track.audio);
            *min <= value && value <= *max
        });
        if !in_range {
            return false;
        }

        if self.include.is_empty() && self.exclude.is_empty() {
            return true;
        }
        let genres = track.genres.join(", ").to_lowercase();
        self.include.iter().all(|term| genres.contains(term.as_str()))
            && !self.exclude.iter().any(|term| genres.contains(term.as_str()))
    }

    #[must_use]
    pub fn filter(&self, candidates: Vec<RecommendedTrack>) -> Vec<RecommendedTrack> {
        let before = candidates.len();
        let kept: Vec<RecommendedTrack> = candidates
            .into_iter()
            .filter(|candidate| self.accepts(&candidate.track))
            .collect();
        debug!("Settings filter kept {} of {before} candidates", kept.len());
        kept
    }
}
