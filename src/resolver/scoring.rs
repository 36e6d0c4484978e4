//! Heuristic scoring of search candidates against catalog metadata

use super::query::normalize;
use crate::types::MatchCandidate;

/// Keywords that suggest a clean studio upload; each present adds a small bonus
const QUALITY_KEYWORDS: [&str; 5] = ["official", "audio", "lyric", "hq", "hd"];

/// Keywords that suggest a different rendition of the track; the first one found costs points
const DISQUALIFYING_KEYWORDS: [&str; 8] = [
    "cover",
    "remix",
    "live",
    "acoustic",
    "instrumental",
    "karaoke",
    "tutorial",
    "reaction",
];

/// Publisher labels of official or auto-generated channels
const OFFICIAL_CHANNEL_MARKERS: [&str; 3] = ["vevo", "topic", "official"];

/// Highest possible score
pub const MAX_SCORE: u32 = 100;

/// Score a candidate from 0 to 100
///
/// | Signal | Points |
/// |---|---|
/// | duration within 5s / 15s / 30s | 40 / 30 / 15 |
/// | title contains the normalized track title | 25 |
/// | title or publisher contains the normalized artist | 20 |
/// | each quality keyword in the title | 2 |
/// | any disqualifying keyword in the title | -15 (once) |
/// | publisher looks like an official channel | 5 |
///
/// A candidate without a reported duration gets no duration points.
pub fn score_candidate(
    candidate: &MatchCandidate,
    title: &str,
    artist: &str,
    duration_hint_ms: u64,
) -> u32 {
    let mut score: i32 = 0;
    let lower_title = candidate.title.to_lowercase();
    let lower_publisher = candidate.publisher.to_lowercase();

    if let Some(candidate_secs) = candidate.duration_secs {
        let expected_secs = duration_hint_ms as f64 / 1000.0;
        let deviation = (candidate_secs - expected_secs).abs();
        score += if deviation <= 5.0 {
            40
        } else if deviation <= 15.0 {
            30
        } else if deviation <= 30.0 {
            15
        } else {
            0
        };
    }

    let normalized_title = normalize(&candidate.title);
    if normalized_title.contains(&normalize(title)) {
        score += 25;
    }

    let normalized_artist = normalize(artist);
    if normalized_title.contains(&normalized_artist)
        || normalize(&candidate.publisher).contains(&normalized_artist)
    {
        score += 20;
    }

    score += QUALITY_KEYWORDS
        .iter()
        .filter(|keyword| lower_title.contains(*keyword))
        .count() as i32
        * 2;

    if DISQUALIFYING_KEYWORDS
        .iter()
        .any(|keyword| lower_title.contains(keyword))
    {
        score -= 15;
    }

    if OFFICIAL_CHANNEL_MARKERS
        .iter()
        .any(|marker| lower_publisher.contains(marker))
    {
        score += 5;
    }

    score.clamp(0, MAX_SCORE as i32) as u32
}
