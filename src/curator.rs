//! # Curator
//!
//! Turns filtered retrieval candidates into the final list:
//!
//! 1. **Consolidate**: one entry per track id. A track retrieved from several
//!    segments keeps its best score divided by its number of extra repeats
//!    (`max(count - 1, 1)`), so three or more hits make it cheaper.
//! 2. **Sort** ascending by score.
//! 3. **Quota**: `round(segment weight * total)` tracks per segment.
//! 4. **Select** greedily, skipping anything that is the same song as an
//!    already selected track.

use log::{debug, trace};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::models::{RecommendedTrack, Track};

/// Separator between a title and its edition, as in `Glue - Hammer Remix`.
/// A bare hyphen is part of the title (`X-Ray`).
const EDITION_SEPARATOR: &str = " - ";

/// Title split at its first edition separator: `("glue", Some("extended"))`.
fn split_title(title: &str) -> (String, Option<String>) {
    match title.split_once(EDITION_SEPARATOR) {
        Some((base, suffix)) => (base.trim().to_lowercase(), Some(suffix.trim().to_lowercase())),
        None => (title.trim().to_lowercase(), None),
    }
}

fn is_remix(suffix: Option<&String>) -> bool {
    suffix.is_some_and(|suffix| suffix.contains("remix"))
}

/// Whether `a` and `b` are the same song: identical ids, or the same primary
/// artist and the same title before the first ` - `. A remix and a non-remix
/// of one title count as different songs.
#[must_use]
pub fn is_same_song(a: &Track, b: &Track) -> bool {
    if a.id == b.id {
        return true;
    }
    if !a
        .primary_artist_name()
        .trim()
        .eq_ignore_ascii_case(b.primary_artist_name().trim())
    {
        return false;
    }

    let (base_a, suffix_a) = split_title(&a.name);
    let (base_b, suffix_b) = split_title(&b.name);
    base_a == base_b && is_remix(suffix_a.as_ref()) == is_remix(suffix_b.as_ref())
}

/// Collapse repeated track ids into one entry each, in first-seen order.
#[must_use]
pub fn consolidate(candidates: Vec<RecommendedTrack>) -> Vec<RecommendedTrack> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, (RecommendedTrack, usize)> = HashMap::new();

    for candidate in candidates {
        match grouped.get_mut(&candidate.track.id) {
            Some((best, count)) => {
                *count += 1;
                if candidate.score < best.score {
                    *best = candidate;
                }
            }
            None => {
                order.push(candidate.track.id.clone());
                grouped.insert(candidate.track.id.clone(), (candidate, 1));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| grouped.remove(&id))
        .map(|(mut best, count)| {
            if count > 1 {
                let divisor = (count - 1).max(1) as f64;
                trace!("Track `{}' retrieved {count} times, score / {divisor}", best.track.id);
                best.score /= divisor;
            }
            best
        })
        .collect()
}

/// Per-segment selection limits for a list of `total` tracks.
#[must_use]
pub fn quotas(weight_per_segment: &BTreeMap<usize, f64>, total: usize) -> BTreeMap<usize, usize> {
    weight_per_segment
        .iter()
        .map(|(segment, weight)| (*segment, (weight * total as f64).round().max(0.0) as usize))
        .collect()
}

/// Final, deduplicated, segment-balanced recommendation list in ascending
/// score order. Candidates from segments without a weight are never chosen.
#[must_use]
pub fn curate(
    candidates: Vec<RecommendedTrack>,
    weight_per_segment: &BTreeMap<usize, f64>,
    total: usize,
) -> Vec<RecommendedTrack> {
    let mut pool = consolidate(candidates);
    pool.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.track.id.cmp(&b.track.id))
    });

    let limits = quotas(weight_per_segment, total);
    let mut taken: BTreeMap<usize, usize> = BTreeMap::new();
    let mut selected: Vec<RecommendedTrack> = Vec::new();

    for candidate in pool {
        if selected.iter().any(|kept| is_same_song(&kept.track, &candidate.track)) {
            trace!("Skipping `{}': same song already selected", candidate.track.name);
            continue;
        }
        let limit = limits.get(&candidate.segment).copied().unwrap_or(0);
        let count = taken.entry(candidate.segment).or_default();
        if *count < limit {
            *count += 1;
            selected.push(candidate);
        }
    }

    debug!("Curated {} tracks across {} segments", selected.len(), taken.len());
    selected
}
