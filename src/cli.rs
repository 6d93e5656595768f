//! # Command-Line Interface Module
//!
//! Clap definitions for the `musicos` binary.
//!
//! ## Commands
//!
//! - `init-db`: create an empty catalog database
//! - `import`: load a catalog document (artists, tracks, playlists, embeddings)
//! - `build-vectors`: precompute representation vectors for every stored track
//! - `recommend`: build a session from `--add` submissions and recommend
//! - `stats`: session statistics for the same kind of session
//! - `projection`: 2-D taste map of the session as JSON
//!
//! ## Examples
//!
//! ```bash
//! musicos import catalog.json
//! musicos build-vectors
//! musicos recommend --add alice=spotify:playlist:37i9dQZF1DX4dyzvuaRJ0n \
//!                   --add bob=https://open.spotify.com/track/2aJDlirz6v2a4HREki98cP \
//!                   --energy high --exclude-genre pop
//! ```

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::filter::{Mode, SessionSettings};

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// One `--add contributor=reference` submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub contributor: String,
    pub reference: String,
}

/// Parse `contributor=reference`. The reference may itself contain `=`
/// (share links with query strings), so only the first one splits.
///
/// # Errors
///
/// Returns a message when either side is missing.
pub fn parse_submission(raw: &str) -> Result<Submission, String> {
    let (contributor, reference) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CONTRIBUTOR=TRACK_OR_PLAYLIST, got `{raw}'"))?;
    let (contributor, reference) = (contributor.trim(), reference.trim());
    if contributor.is_empty() || reference.is_empty() {
        return Err(format!("expected CONTRIBUTOR=TRACK_OR_PLAYLIST, got `{raw}'"));
    }
    Ok(Submission {
        contributor: contributor.to_string(),
        reference: reference.to_string(),
    })
}

#[derive(Parser)]
#[command(name = "musicos")]
#[command(about = "MusicOs: group taste profiling & music recommendations")]
#[command(version)]
pub struct Args {
    /// Catalog database path (defaults to the platform data directory)
    #[arg(long, global = true, env = "MUSICOS_DB")]
    pub db: Option<PathBuf>,

    /// Engine tuning file (defaults to config.toml in the data directory)
    #[arg(long, global = true, env = "MUSICOS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Tracks and playlists that make up a one-shot session.
#[derive(ClapArgs, Debug, Clone)]
pub struct SessionArgs {
    /// Submission as CONTRIBUTOR=ID, URI or share link (repeatable)
    #[arg(long = "add", value_name = "CONTRIBUTOR=REF", value_parser = parse_submission, required = true)]
    pub submissions: Vec<Submission>,
}

/// Recommendation preferences.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SettingsArgs {
    #[arg(long, value_enum, default_value_t = Mode::Unset)]
    pub danceability: Mode,

    #[arg(long, value_enum, default_value_t = Mode::Unset)]
    pub energy: Mode,

    #[arg(long, value_enum, default_value_t = Mode::Unset)]
    pub valence: Mode,

    #[arg(long, value_enum, default_value_t = Mode::Unset)]
    pub instrumentalness: Mode,

    #[arg(long, value_enum, default_value_t = Mode::Unset)]
    pub speechiness: Mode,

    #[arg(long, value_enum, default_value_t = Mode::Unset)]
    pub tempo: Mode,

    /// Genre substring every recommendation must carry (repeatable)
    #[arg(long = "include-genre", value_name = "GENRE")]
    pub include_genres: Vec<String>,

    /// Genre substring no recommendation may carry (repeatable)
    #[arg(long = "exclude-genre", value_name = "GENRE")]
    pub exclude_genres: Vec<String>,
}

impl From<SettingsArgs> for SessionSettings {
    fn from(args: SettingsArgs) -> Self {
        Self {
            danceability: args.danceability,
            energy: args.energy,
            valence: args.valence,
            instrumentalness: args.instrumentalness,
            speechiness: args.speechiness,
            tempo: args.tempo,
            include_genres: args.include_genres,
            exclude_genres: args.exclude_genres,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty catalog database
    InitDb {
        /// Delete and recreate an existing database
        #[arg(long)]
        force: bool,
    },

    /// Import a catalog JSON document
    ///
    /// The document may hold artists, tracks, playlists, genre-token
    /// embeddings and artist embeddings. Existing records with the same id are
    /// replaced.
    Import {
        /// Path to the catalog document
        path: PathBuf,
    },

    /// Precompute representation vectors for every stored track
    BuildVectors,

    /// Recommend tracks for a session
    Recommend {
        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Number of tracks to recommend (overrides the tuning file)
        #[arg(long)]
        count: Option<usize>,

        /// Print recommendations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show statistics for a session
    Stats {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Print the session's 2-D taste map as JSON
    Projection {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show catalog table sizes
    Status,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// List known genre tags (used by shell completion scripts)
    #[command(hide = true)]
    CompleteGenres,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_submission() {
        let submission = parse_submission("alice=https://open.spotify.com/track/abc?si=x=y").unwrap();
        assert_eq!(submission.contributor, "alice");
        assert_eq!(submission.reference, "https://open.spotify.com/track/abc?si=x=y");

        assert!(parse_submission("no-contributor").is_err());
        assert!(parse_submission("=abc").is_err());
        assert!(parse_submission("alice=").is_err());
    }

    #[test]
    fn test_recommend_arguments() {
        let args = Args::try_parse_from([
            "musicos",
            "--db",
            "/tmp/catalog.db",
            "recommend",
            "--add",
            "alice=glue",
            "--add",
            "bob=spotify:playlist:mix",
            "--energy",
            "high",
            "--exclude-genre",
            "pop",
            "--count",
            "5",
        ])
        .unwrap();

        assert_eq!(args.db, Some(PathBuf::from("/tmp/catalog.db")));
        match args.command {
            Command::Recommend { session, settings, count, json } => {
                assert_eq!(session.submissions.len(), 2);
                assert_eq!(count, Some(5));
                assert!(!json);
                let settings = SessionSettings::from(settings);
                assert_eq!(settings.energy, Mode::High);
                assert_eq!(settings.danceability, Mode::Unset);
                assert_eq!(settings.exclude_genres, vec!["pop"]);
            }
            _ => panic!("expected recommend"),
        }
    }

    #[test]
    fn test_session_commands_require_submissions() {
        assert!(Args::try_parse_from(["musicos", "stats"]).is_err());
    }
}
