//! Share-link parsing. Pure string handling; nothing here touches the network.
//!
//! Accepted forms:
//!
//! ```text
//! https://open.spotify.com/track/<id>?si=...
//! https://open.spotify.com/intl-de/playlist/<id>
//! spotify:track:<id>
//! <id>
//! ```

/// What a user-supplied reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRef {
    Track(String),
    Playlist(String),
    /// A bare id; could be either kind.
    Unknown(String),
}

impl CatalogRef {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Track(id) | Self::Playlist(id) | Self::Unknown(id) => id,
        }
    }
}

fn kind(segment: &str, id: &str) -> Option<CatalogRef> {
    if id.is_empty() {
        return None;
    }
    match segment {
        "track" => Some(CatalogRef::Track(id.to_string())),
        "playlist" => Some(CatalogRef::Playlist(id.to_string())),
        _ => None,
    }
}

/// Parse a raw id, URI or share link. Returns `None` for empty input or a
/// link to something other than a track or playlist.
#[must_use]
pub fn parse(input: &str) -> Option<CatalogRef> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(rest) = input.strip_prefix("spotify:") {
        let (segment, id) = rest.split_once(':')?;
        return kind(segment, id);
    }

    if input.contains("://") || input.starts_with("open.spotify.com") {
        let without_query = input.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = without_query
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        return segments
            .windows(2)
            .find_map(|pair| kind(pair[0], pair[1]));
    }

    Some(CatalogRef::Unknown(input.to_string()))
}
