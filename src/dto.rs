//! Platform-shaped transfer records and their conversion into domain records.
//!
//! Conversions enumerate every field; nothing is copied by reflection.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Artist, ArtistCredit, ArtistPopularity, AudioFeatures, Track};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRefDto {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumDto {
    pub id: String,
    pub name: String,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub release_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFeaturesDto {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDto {
    pub id: String,
    pub name: String,
    pub album: AlbumDto,
    pub artists: Vec<ArtistRefDto>,
    pub audio_features: AudioFeaturesDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}

impl From<AudioFeaturesDto> for AudioFeatures {
    fn from(dto: AudioFeaturesDto) -> Self {
        Self {
            danceability: dto.danceability,
            energy: dto.energy,
            valence: dto.valence,
            tempo: dto.tempo,
            loudness: dto.loudness,
            speechiness: dto.speechiness,
            acousticness: dto.acousticness,
            instrumentalness: dto.instrumentalness,
            liveness: dto.liveness,
        }
    }
}

impl From<ArtistDto> for Artist {
    fn from(dto: ArtistDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            popularity: dto.popularity.unwrap_or(f64::NAN),
            genres: dto.genres.unwrap_or_default(),
        }
    }
}

/// Parse a platform release date at year, month or day precision.
#[must_use]
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{raw}-01-01"), "%Y-%m-%d"))
        .ok()
}

/// Whole calendar years between `released` and `today`, zero for future
/// releases; NaN when the date is unknown.
fn age_in_years(released: Option<NaiveDate>, today: NaiveDate) -> f64 {
    released.map_or(f64::NAN, |date| f64::from(today.years_since(date).unwrap_or(0)))
}

impl Track {
    /// Build a domain track from its transfer record and the credited artists'
    /// records. Artists missing from `artists` contribute neither genres nor
    /// popularity.
    #[must_use]
    pub fn from_dto(dto: &TrackDto, artists: &[Artist], today: NaiveDate) -> Self {
        let credited: Vec<&Artist> = dto
            .artists
            .iter()
            .filter_map(|credit| artists.iter().find(|artist| artist.id == credit.id))
            .collect();

        let mut genres: Vec<String> = Vec::new();
        for genre in credited.iter().flat_map(|artist| artist.genres.iter()) {
            if !genres.contains(genre) {
                genres.push(genre.clone());
            }
        }

        let popularities: Vec<f64> = credited
            .iter()
            .map(|artist| artist.popularity)
            .filter(|popularity| !popularity.is_nan())
            .collect();
        let popularity = if popularities.is_empty() {
            ArtistPopularity::default()
        } else {
            ArtistPopularity {
                mean: popularities.iter().sum::<f64>() / popularities.len() as f64,
                max: popularities.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        };

        Self {
            id: dto.id.clone(),
            name: dto.name.clone(),
            artists: dto
                .artists
                .iter()
                .map(|credit| ArtistCredit {
                    id: credit.id.clone(),
                    name: credit.name.clone(),
                })
                .collect(),
            track_age: age_in_years(parse_release_date(&dto.album.release_date), today),
            audio: dto.audio_features.into(),
            popularity,
            genres,
        }
    }
}
