//! # Domain Records
//!
//! Tracks and artists as the engine sees them, plus the small records that flow
//! between pipeline stages (pool items, taste segments, recommended tracks).
//!
//! Track and artist records are immutable once resolved; every stage clones or
//! borrows them rather than mutating in place.

use serde::{Deserialize, Deserializer, Serialize};

/// serde_json writes non-finite floats as `null`; read them back as NaN.
fn nan_when_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Fixed-length numeric encoding of a track (audio + genre + artist identity).
pub type RepresentationVector = Vec<f64>;

/// Audio descriptors reported by the catalog for a single track.
///
/// All values except `tempo` (BPM) and `loudness` (dB) live in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub valence: f64,
    pub tempo: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
}

/// One named audio descriptor, used wherever features are addressed generically
/// (normalization, range filters, session statistics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFeature {
    Danceability,
    Energy,
    Valence,
    Tempo,
    Loudness,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
}

impl AudioFeature {
    pub const ALL: [Self; 9] = [
        Self::Danceability,
        Self::Energy,
        Self::Valence,
        Self::Tempo,
        Self::Loudness,
        Self::Speechiness,
        Self::Acousticness,
        Self::Instrumentalness,
        Self::Liveness,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Danceability => "danceability",
            Self::Energy => "energy",
            Self::Valence => "valence",
            Self::Tempo => "tempo",
            Self::Loudness => "loudness",
            Self::Speechiness => "speechiness",
            Self::Acousticness => "acousticness",
            Self::Instrumentalness => "instrumentalness",
            Self::Liveness => "liveness",
        }
    }

    #[must_use]
    pub const fn value(self, features: &AudioFeatures) -> f64 {
        match self {
            Self::Danceability => features.danceability,
            Self::Energy => features.energy,
            Self::Valence => features.valence,
            Self::Tempo => features.tempo,
            Self::Loudness => features.loudness,
            Self::Speechiness => features.speechiness,
            Self::Acousticness => features.acousticness,
            Self::Instrumentalness => features.instrumentalness,
            Self::Liveness => features.liveness,
        }
    }
}

/// Popularity of the artists credited on a track.
///
/// Both values are NaN when none of the credited artists could be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtistPopularity {
    #[serde(deserialize_with = "nan_when_null")]
    pub mean: f64,
    #[serde(deserialize_with = "nan_when_null")]
    pub max: f64,
}

impl Default for ArtistPopularity {
    fn default() -> Self {
        Self {
            mean: f64::NAN,
            max: f64::NAN,
        }
    }
}

/// Artist credit as it appears on a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCredit {
    pub id: String,
    pub name: String,
}

/// A catalog track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    /// Credited artists, primary artist first.
    pub artists: Vec<ArtistCredit>,
    /// Whole years since release.
    #[serde(deserialize_with = "nan_when_null")]
    pub track_age: f64,
    pub audio: AudioFeatures,
    pub popularity: ArtistPopularity,
    /// Free-text genre tags of the credited artists.
    pub genres: Vec<String>,
}

/// Number of scalar columns fed through the min-max normalizer.
pub const SCALED_FEATURE_COUNT: usize = AudioFeature::ALL.len() + 3;

impl Track {
    #[must_use]
    pub fn primary_artist(&self) -> Option<&ArtistCredit> {
        self.artists.first()
    }

    /// Primary artist name, or an empty string for uncredited tracks.
    #[must_use]
    pub fn primary_artist_name(&self) -> &str {
        self.primary_artist().map_or("", |artist| artist.name.as_str())
    }

    /// Scalar columns in normalizer order: every audio feature, then artist
    /// mean popularity, artist max popularity, and track age.
    #[must_use]
    pub fn scaled_values(&self) -> [f64; SCALED_FEATURE_COUNT] {
        let mut values = [0.0; SCALED_FEATURE_COUNT];
        for (slot, feature) in values.iter_mut().zip(AudioFeature::ALL) {
            *slot = feature.value(&self.audio);
        }
        let tail = AudioFeature::ALL.len();
        values[tail] = self.popularity.mean;
        values[tail + 1] = self.popularity.max;
        values[tail + 2] = self.track_age;
        values
    }
}

/// A catalog artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "nan_when_null")]
    pub popularity: f64,
    pub genres: Vec<String>,
}

/// A distinct track in the merged pool, weighted by summed per-contributor
/// probability mass.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoolItem {
    pub track: Track,
    pub frequency: f64,
}

/// One coherent sub-interest of a pool: a centroid plus its share of the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct TasteSegment {
    pub centroid: RepresentationVector,
    pub weight: f64,
}

/// A retrieval candidate. Lower `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedTrack {
    pub track: Track,
    pub score: f64,
    pub segment: usize,
}
