//! # Catalog Database
//!
//! SQLite persistence for the catalog: tracks, artists, precomputed
//! representation vectors, embedding tables and playlists. Records are stored
//! as JSON documents keyed by id; only playlists are relational.
//!
//! Writes run inside one transaction per batch with a single prepared
//! statement, which keeps a full catalog import to a few hundred milliseconds.

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{EngineError, EngineResult};
use crate::models::{Artist, RepresentationVector, Track};
use crate::repository::Store;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS track (
        id   TEXT PRIMARY KEY,
        json TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS artist (
        id   TEXT PRIMARY KEY,
        json TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS representation_vector (
        track_id TEXT PRIMARY KEY,
        json     TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS genre_embedding (
        token TEXT PRIMARY KEY,
        json  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS artist_embedding (
        artist_id TEXT PRIMARY KEY,
        json      TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS playlist (
        id       TEXT    NOT NULL,
        position INTEGER NOT NULL,
        track_id TEXT    NOT NULL,
        PRIMARY KEY (id, position)
    );
";

/// Row counts per table, for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub tracks: usize,
    pub artists: usize,
    pub vectors: usize,
    pub genre_tokens: usize,
    pub artist_embeddings: usize,
    pub playlists: usize,
}

/// SQLite-backed [`Store`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn store_error(err: anyhow::Error) -> EngineError {
    EngineError::Store(format!("{err:#}"))
}

impl SqliteStore {
    /// Open (or create) the catalog database at `path` and ensure the schema.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog database at {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().context("Failed to open in-memory database")?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create catalog schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create a fresh database at `path`. With `force`, an existing file is
    /// removed first; without it an existing file is an error.
    ///
    /// # Errors
    ///
    /// Fails when the file exists without `force`, or cannot be replaced.
    pub fn init(path: &Path, force: bool) -> Result<Self> {
        if path.exists() {
            if !force {
                anyhow::bail!(
                    "Catalog database already exists at {}. Use --force to recreate it.",
                    path.display()
                );
            }
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove existing database at {}", path.display()))?;
        }
        info!("Creating catalog database at {}", path.display());
        Self::open(path)
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_json<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<HashMap<String, T>> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(&format!("SELECT {key}, json FROM {table}"))
            .with_context(|| format!("Invalid SQL statement when SELECTing from {table}"))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .with_context(|| format!("Cannot query {table}"))?;

        let mut loaded = HashMap::new();
        for row in rows {
            let (id, json) = row.with_context(|| format!("Failed to read row from {table}"))?;
            let value = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt {table} record `{id}'"))?;
            loaded.insert(id, value);
        }
        debug!("Loaded {} rows from {table}", loaded.len());
        Ok(loaded)
    }

    fn upsert_json<'a, T: Serialize + 'a>(
        &self,
        table: &str,
        key: &str,
        rows: impl IntoIterator<Item = (&'a str, &'a T)>,
    ) -> Result<usize> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        let mut written = 0;

        {
            let mut stmt = tx
                .prepare(&format!("INSERT OR REPLACE INTO {table} ({key}, json) VALUES (?1, ?2)"))
                .with_context(|| format!("Invalid SQL statement when INSERTing INTO {table}"))?;

            for (id, value) in rows {
                let json = serde_json::to_string(value)
                    .with_context(|| format!("Failed to serialize {table} record `{id}'"))?;
                stmt.execute(params![id, json])
                    .with_context(|| format!("Failed to INSERT {table} record `{id}'"))?;
                written += 1;
            }
        }

        tx.commit().context("Committing SQL transaction failed")?;
        debug!("Upserted {written} rows into {table}");
        Ok(written)
    }

    fn playlist_rows(&self, playlist_id: &str) -> Result<Option<Vec<String>>> {
        let conn = self.connection();
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM playlist WHERE id = ?1 LIMIT 1", [playlist_id], |row| row.get(0))
            .optional()
            .with_context(|| format!("Cannot query playlist `{playlist_id}'"))?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare("SELECT track_id FROM playlist WHERE id = ?1 ORDER BY position")?;
        let ids = stmt
            .query_map([playlist_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .with_context(|| format!("Failed to read playlist `{playlist_id}'"))?;
        Ok(Some(ids))
    }

    fn replace_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<usize> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM playlist WHERE id = ?1", [playlist_id])
            .with_context(|| format!("Failed to clear playlist `{playlist_id}'"))?;
        {
            let mut stmt = tx.prepare("INSERT INTO playlist (id, position, track_id) VALUES (?1, ?2, ?3)")?;
            for (position, track_id) in track_ids.iter().enumerate() {
                stmt.execute(params![playlist_id, position as i64, track_id])
                    .with_context(|| format!("Failed to INSERT `{track_id}' into playlist `{playlist_id}'"))?;
            }
        }

        tx.commit().context("Committing SQL transaction failed")?;
        Ok(track_ids.len())
    }

    /// Row counts of every table.
    ///
    /// # Errors
    ///
    /// Fails when any table cannot be counted.
    pub fn counts(&self) -> Result<CatalogCounts> {
        let conn = self.connection();
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn
                .query_row(sql, [], |row| row.get(0))
                .with_context(|| format!("Failed to run `{sql}'"))?;
            Ok(usize::try_from(n).unwrap_or_default())
        };

        Ok(CatalogCounts {
            tracks: count("SELECT COUNT(*) FROM track")?,
            artists: count("SELECT COUNT(*) FROM artist")?,
            vectors: count("SELECT COUNT(*) FROM representation_vector")?,
            genre_tokens: count("SELECT COUNT(*) FROM genre_embedding")?,
            artist_embeddings: count("SELECT COUNT(*) FROM artist_embedding")?,
            playlists: count("SELECT COUNT(DISTINCT id) FROM playlist")?,
        })
    }
}

impl Store for SqliteStore {
    fn load_all_tracks(&self) -> EngineResult<HashMap<String, Track>> {
        self.load_json("track", "id").map_err(store_error)
    }

    fn load_all_artists(&self) -> EngineResult<HashMap<String, Artist>> {
        self.load_json("artist", "id").map_err(store_error)
    }

    fn load_all_representation_vectors(&self) -> EngineResult<HashMap<String, RepresentationVector>> {
        self.load_json("representation_vector", "track_id").map_err(store_error)
    }

    fn load_genre_embeddings(&self) -> EngineResult<HashMap<String, Vec<f64>>> {
        self.load_json("genre_embedding", "token").map_err(store_error)
    }

    fn load_artist_embeddings(&self) -> EngineResult<HashMap<String, Vec<f64>>> {
        self.load_json("artist_embedding", "artist_id").map_err(store_error)
    }

    fn playlist_track_ids(&self, playlist_id: &str) -> EngineResult<Option<Vec<String>>> {
        self.playlist_rows(playlist_id).map_err(store_error)
    }

    fn upsert_tracks(&self, tracks: &[Track]) -> EngineResult<usize> {
        self.upsert_json("track", "id", tracks.iter().map(|t| (t.id.as_str(), t)))
            .map_err(store_error)
    }

    fn upsert_artists(&self, artists: &[Artist]) -> EngineResult<usize> {
        self.upsert_json("artist", "id", artists.iter().map(|a| (a.id.as_str(), a)))
            .map_err(store_error)
    }

    fn upsert_representation_vectors(&self, vectors: &[(String, RepresentationVector)]) -> EngineResult<usize> {
        self.upsert_json(
            "representation_vector",
            "track_id",
            vectors.iter().map(|(id, vector)| (id.as_str(), vector)),
        )
        .map_err(store_error)
    }

    fn upsert_genre_embeddings(&self, embeddings: &HashMap<String, Vec<f64>>) -> EngineResult<usize> {
        self.upsert_json("genre_embedding", "token", embeddings.iter().map(|(k, v)| (k.as_str(), v)))
            .map_err(store_error)
    }

    fn upsert_artist_embeddings(&self, embeddings: &HashMap<String, Vec<f64>>) -> EngineResult<usize> {
        self.upsert_json("artist_embedding", "artist_id", embeddings.iter().map(|(k, v)| (k.as_str(), v)))
            .map_err(store_error)
    }

    fn upsert_playlist(&self, playlist_id: &str, track_ids: &[String]) -> EngineResult<usize> {
        self.replace_playlist(playlist_id, track_ids).map_err(store_error)
    }
}
