//! Fuzzy matcher for imported external-calendar events.
//!
//! When a user imports a calendar feed, events that line up with an
//! existing activity must not create duplicates. Matching is token
//! overlap (Jaccard) over normalised title tokens, blended with a
//! start-time proximity score, assigned greedily one-to-one.

use crate::store::Activity;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Minimum blended score for a pairing to count as a match.
pub const DEFAULT_MIN_SCORE: f32 = 0.45;

/// Weight of title similarity in the blended score.
const TITLE_WEIGHT: f32 = 0.7;

/// Weight of start-time proximity in the blended score.
const TIME_WEIGHT: f32 = 0.3;

/// Proximity decays to 0.5 at this distance from the activity start.
const TIME_HALF_LIFE_HOURS: f32 = 2.0;

/// One event from an imported calendar feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedEvent {
    /// Event title as it appears in the feed.
    pub title: String,
    /// Event start time.
    pub starts_at: DateTime<Utc>,
}

/// A matched (event, activity) pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMatch {
    /// Index into the input event slice.
    pub event_index: usize,
    /// Matched activity id.
    pub activity_id: String,
    /// Blended similarity score in `[0, 1]`.
    pub score: f32,
}

/// Match imported events against stored activities.
///
/// Greedy one-to-one assignment: candidate pairs are ranked by score
/// descending (ties broken by event index, then activity id, so the
/// result is deterministic) and each event and activity is used at most
/// once. Pairs scoring below `min_score` are never matched.
pub fn match_events(
    events: &[ImportedEvent],
    activities: &[Activity],
    min_score: f32,
) -> Vec<EventMatch> {
    let event_tokens: Vec<HashSet<String>> = events
        .iter()
        .map(|e| tokenize(&e.title).into_iter().collect())
        .collect();

    let mut candidates: Vec<EventMatch> = Vec::new();
    for (event_index, event) in events.iter().enumerate() {
        for activity in activities {
            let activity_tokens: HashSet<String> =
                tokenize(&activity.title).into_iter().collect();
            let title_score = jaccard(&event_tokens[event_index], &activity_tokens);
            let time_score = time_proximity(event.starts_at, activity.starts_at);
            let score = TITLE_WEIGHT * title_score + TIME_WEIGHT * time_score;
            if score >= min_score {
                candidates.push(EventMatch {
                    event_index,
                    activity_id: activity.id.clone(),
                    score,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.event_index.cmp(&b.event_index))
            .then_with(|| a.activity_id.cmp(&b.activity_id))
    });

    let mut used_events: HashSet<usize> = HashSet::new();
    let mut used_activities: HashSet<String> = HashSet::new();
    let mut matches = Vec::new();
    for candidate in candidates {
        if used_events.contains(&candidate.event_index)
            || used_activities.contains(&candidate.activity_id)
        {
            continue;
        }
        used_events.insert(candidate.event_index);
        used_activities.insert(candidate.activity_id.clone());
        matches.push(candidate);
    }
    matches
}

/// Lowercased alphanumeric tokens, single-character tokens dropped.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() || ch == '\'' || ch == '-' {
            current.push(ch.to_ascii_lowercase());
        } else if !current.is_empty() {
            if current.len() > 1 {
                tokens.push(current.clone());
            }
            current.clear();
        }
    }
    if !current.is_empty() && current.len() > 1 {
        tokens.push(current);
    }

    tokens
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Proximity score in `(0, 1]`: 1.0 at the same instant, 0.5 at the
/// half-life distance.
fn time_proximity(a: DateTime<Utc>, b: DateTime<Utc>) -> f32 {
    let delta_hours = ((a - b).num_minutes() as f32 / 60.0).abs();
    1.0 / (1.0 + delta_hours / TIME_HALF_LIFE_HOURS)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn activity(id: &str, title: &str, hour: u32) -> Activity {
        Activity {
            id: id.to_owned(),
            title: title.to_owned(),
            starts_at: at(hour),
            duration_minutes: 90,
        }
    }

    fn event(title: &str, hour: u32) -> ImportedEvent {
        ImportedEvent {
            title: title.to_owned(),
            starts_at: at(hour),
        }
    }

    #[test]
    fn tokenize_normalizes_case_and_punctuation() {
        assert_eq!(
            tokenize("U15 Training (Pitch 2)"),
            vec!["u15", "training", "pitch"]
        );
        assert!(tokenize("! ?").is_empty());
    }

    #[test]
    fn identical_title_and_time_is_a_match() {
        let matches = match_events(
            &[event("U15 training", 17)],
            &[activity("a1", "U15 training", 17)],
            DEFAULT_MIN_SCORE,
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].activity_id, "a1");
        assert!(matches[0].score > 0.95);
    }

    #[test]
    fn unrelated_titles_stay_below_threshold() {
        let matches = match_events(
            &[event("Dentist appointment", 17)],
            &[activity("a1", "U15 training", 17)],
            DEFAULT_MIN_SCORE,
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn time_proximity_breaks_title_ties() {
        let matches = match_events(
            &[event("U15 training", 17)],
            &[
                activity("morning", "U15 training", 9),
                activity("evening", "U15 training", 17),
            ],
            DEFAULT_MIN_SCORE,
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].activity_id, "evening");
    }

    #[test]
    fn assignment_is_one_to_one() {
        let matches = match_events(
            &[event("U15 training", 17), event("U15 training", 17)],
            &[activity("a1", "U15 training", 17)],
            DEFAULT_MIN_SCORE,
        );
        // One activity can absorb only one event.
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].event_index, 0);
    }

    #[test]
    fn best_scoring_pair_wins_contention() {
        let matches = match_events(
            &[
                event("U15 training pitch two", 17),
                event("U15 training", 17),
            ],
            &[
                activity("full", "U15 training pitch two", 17),
                activity("short", "U15 training", 17),
            ],
            DEFAULT_MIN_SCORE,
        );
        assert_eq!(matches.len(), 2);
        let full = matches.iter().find(|m| m.activity_id == "full").unwrap();
        let short = matches.iter().find(|m| m.activity_id == "short").unwrap();
        assert_eq!(full.event_index, 0);
        assert_eq!(short.event_index, 1);
    }

    #[test]
    fn empty_inputs_produce_no_matches() {
        assert!(match_events(&[], &[], DEFAULT_MIN_SCORE).is_empty());
        assert!(match_events(&[event("x y", 17)], &[], DEFAULT_MIN_SCORE).is_empty());
    }
}

