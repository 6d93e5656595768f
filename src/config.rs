//! # Configuration Module
//!
//! Data directory resolution and engine tuning for MusicOs.
//!
//! ## Data Storage
//!
//! The catalog database and the optional tuning file live in the
//! platform-standard data directory:
//! - Linux: `~/.local/share/musicos/`
//! - macOS: `~/Library/Application Support/musicos/`
//! - Windows: `%APPDATA%\musicos\`
//!
//! ## Tuning File
//!
//! `config.toml` in the data directory overrides any subset of [`EngineConfig`]:
//!
//! ```toml
//! [profile]
//! seed = 7
//!
//! [curation]
//! total_count = 30
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the MusicOs data directory, creating it if needed.
///
/// # Errors
///
/// Fails when the platform data directory cannot be determined or the
/// `musicos` subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let musicos_dir = data_dir.join("musicos");
    fs::create_dir_all(&musicos_dir).with_context(|| {
        format!(
            "Failed to create MusicOs data directory at {}. Please check file permissions.",
            musicos_dir.display()
        )
    })?;

    Ok(musicos_dir)
}

/// Returns the platform-appropriate catalog database path.
///
/// # Errors
///
/// Same conditions as [`get_data_dir`].
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("catalog.db"))
}

/// Returns the default location of the tuning file.
///
/// # Errors
///
/// Same conditions as [`get_data_dir`].
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.toml"))
}

/// Multiplicative weights applied to each block of a representation vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorWeights {
    pub audio: f64,
    pub genre: f64,
    pub artist: f64,
}

impl Default for VectorWeights {
    fn default() -> Self {
        Self {
            audio: 1.0,
            genre: 1.0,
            artist: 1.0,
        }
    }
}

/// Profile Creator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Below this many vectors the pool collapses into a single segment.
    pub min_samples: usize,
    /// Which nearest neighbor (self excluded) sets each point's density distance.
    pub neighbor_rank: usize,
    pub radius_percentile: f64,
    pub radius_inflation: f64,
    pub min_cluster_size: usize,
    pub seed: u64,
    pub perplexity: f64,
    pub iterations: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            neighbor_rank: 4,
            radius_percentile: 95.0,
            radius_inflation: 1.2,
            min_cluster_size: 4,
            seed: 23,
            perplexity: 10.0,
            iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub candidates_per_segment: usize,
    /// Replaces NaN coordinates of catalog vectors before indexing.
    pub nan_sentinel: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            candidates_per_segment: 100,
            nan_sentinel: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub total_count: usize,
    pub exclude_pool_tracks: bool,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            total_count: 20,
            exclude_pool_tracks: true,
        }
    }
}

/// Backoff applied to transient catalog failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

/// Every engine tunable. Design constants such as the settings-filter
/// breakpoints live in `filter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub vector: VectorWeights,
    pub profile: ProfileConfig,
    pub retriever: RetrieverConfig,
    pub curation: CurationConfig,
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Parse a TOML tuning file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Fails only when the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            log::debug!("Loading engine config from {}", path.display());
            Self::load(path)
        } else {
            log::debug!("No engine config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    pub engine: EngineConfig,
}

impl RuntimeConfig {
    /// Resolve paths, honoring explicit overrides from the command line.
    ///
    /// # Errors
    ///
    /// Fails when a default path cannot be resolved or the tuning file is invalid.
    pub fn resolve(db_path: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => get_db_path()?,
        };
        let config_path = match config_path {
            Some(path) => path,
            None => get_config_path()?,
        };

        Ok(Self {
            db_path,
            engine: EngineConfig::load_or_default(&config_path)?,
        })
    }
}
