//! # Shell Completion Module
//!
//! Completion scripts for the `musicos` binary, plus the hidden
//! `complete-genres` helper that lists genre tags known to the catalog so
//! `--include-genre`/`--exclude-genre` can be completed dynamically.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! musicos completion bash > ~/.local/share/bash-completion/completions/musicos
//!
//! # Generate zsh completions
//! musicos completion zsh > ~/.config/zsh/completions/_musicos
//! ```

use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use log::debug;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use crate::db::SqliteStore;
use crate::repository::Store;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
#[must_use]
pub const fn shell_to_completion_shell(shell: &crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Distinct genre tags of every stored artist, sorted.
///
/// A missing or unreadable database yields no completions rather than an
/// error; completion scripts must never print failures into the prompt.
pub fn get_genre_completions(db_path: &Path) -> Result<Vec<String>> {
    if !db_path.exists() {
        return Ok(Vec::new());
    }

    let artists = match SqliteStore::open(db_path).map(|store| store.load_all_artists()) {
        Ok(Ok(artists)) => artists,
        Ok(Err(err)) => {
            debug!("Genre completion unavailable: {err}");
            return Ok(Vec::new());
        }
        Err(err) => {
            debug!("Genre completion unavailable: {err:#}");
            return Ok(Vec::new());
        }
    };

    let genres: BTreeSet<String> = artists
        .into_values()
        .flat_map(|artist| artist.genres)
        .filter(|genre| !genre.trim().is_empty())
        .collect();
    Ok(genres.into_iter().collect())
}

/// Print genre completions one per line, quoting those with whitespace.
pub fn print_genre_completions(db_path: &Path) -> Result<()> {
    for genre in get_genre_completions(db_path)? {
        if genre.contains(char::is_whitespace) {
            println!("\"{}\"", genre.replace('"', "\\\""));
        } else {
            println!("{genre}");
        }
    }
    Ok(())
}
