// SPDX-License-Identifier: Apache-2.0
//! Score blending for the hybrid recall tools (§4.5). This is the one place
//! the math lives regardless of which [`nova_store::SearchBackend`] produced
//! the raw candidates — Postgres contributes both FTS and semantic sides,
//! the in-memory fallback contributes scoreless substring hits that pass
//! straight through as `fts_raw`.

use chrono::{DateTime, Utc};
use nova_store::{CandidateSource, SearchCandidate};

pub fn score_fts_saturated(fts_raw: Option<f64>) -> f64 {
    let raw = fts_raw.unwrap_or(0.0).max(0.0);
    raw / (raw + 1.0)
}

pub fn semantic_similarity_from_distance(distance: Option<f64>) -> f64 {
    match distance {
        Some(d) => 1.0 / (1.0 + d.max(0.0)),
        None => 0.0,
    }
}

pub fn minmax_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let vals: Vec<f64> = values.collect();
    if vals.is_empty() {
        return (0.0, 0.0);
    }
    let min = vals.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

pub fn minmax_normalize(value: f64, vmin: f64, vmax: f64) -> f64 {
    if vmax <= vmin {
        0.0
    } else {
        (value - vmin) / (vmax - vmin)
    }
}

pub fn blend_semantic_fts(semantic: f64, fts: f64) -> f64 {
    0.7 * semantic + 0.3 * fts
}

fn recency_multiplier(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now.signed_duration_since(created_at);
    if age <= chrono::Duration::hours(24) {
        1.0
    } else if age <= chrono::Duration::days(7) {
        0.9
    } else {
        0.8
    }
}

fn source_weight(source: CandidateSource) -> f64 {
    match source {
        CandidateSource::DaySegmentSummary => 1.0,
        CandidateSource::TranscriptChunk => 0.92,
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: SearchCandidate,
    pub score: f64,
}

/// Blends a merged candidate union into final scores, per §4.5's PostgreSQL
/// path. `semantic_available` gates whether the semantic term contributes at
/// all — when no query embedding could be resolved, `fts_sat` alone is used.
pub fn blend_candidates(
    candidates: Vec<SearchCandidate>,
    semantic_available: bool,
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let (sem_min, sem_max) = if semantic_available {
        minmax_bounds(candidates.iter().map(|c| semantic_similarity_from_distance(c.semantic_distance)))
    } else {
        (0.0, 0.0)
    };

    candidates
        .into_iter()
        .map(|c| {
            let fts_sat = score_fts_saturated(c.fts_raw);
            let base = if semantic_available {
                let sem = semantic_similarity_from_distance(c.semantic_distance);
                let sem_norm = minmax_normalize(sem, sem_min, sem_max);
                blend_semantic_fts(sem_norm, fts_sat)
            } else {
                fts_sat
            };
            let score = base * recency_multiplier(c.created_at, now) * source_weight(c.source);
            ScoredCandidate { candidate: c, score }
        })
        .collect()
}

/// Sorts by (-score, day_label desc, day_segment_id desc) and applies
/// offset/limit paging, matching the ordering in §4.5.
pub fn rank_and_page(
    mut scored: Vec<ScoredCandidate>,
    offset: usize,
    limit: usize,
) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.candidate.created_at.cmp(&a.candidate.created_at))
            .then_with(|| b.candidate.id.cmp(&a.candidate.id))
    });
    scored.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn candidate(fts_raw: Option<f64>, distance: Option<f64>, hours_ago: i64) -> SearchCandidate {
        SearchCandidate {
            source: CandidateSource::TranscriptChunk,
            id: Uuid::new_v4(),
            thread: Uuid::new_v4(),
            text: "x".into(),
            created_at: Utc::now() - chrono::Duration::hours(hours_ago),
            fts_raw,
            semantic_distance: distance,
        }
    }

    #[test]
    fn fts_saturation_approaches_one_but_never_reaches_it() {
        assert_eq!(score_fts_saturated(Some(0.0)), 0.0);
        assert!(score_fts_saturated(Some(99.0)) > 0.98);
        assert!(score_fts_saturated(Some(99.0)) < 1.0);
    }

    #[test]
    fn semantic_similarity_requires_a_distance() {
        assert_eq!(semantic_similarity_from_distance(None), 0.0);
        assert_eq!(semantic_similarity_from_distance(Some(0.0)), 1.0);
    }

    #[test]
    fn blend_falls_back_to_fts_only_without_semantic() {
        let candidates = vec![candidate(Some(3.0), None, 1)];
        let scored = blend_candidates(candidates, false, Utc::now());
        let expected = score_fts_saturated(Some(3.0)) * 1.0 * source_weight(CandidateSource::TranscriptChunk);
        assert!((scored[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn recency_multiplier_decays_with_age() {
        let fresh = candidate(Some(1.0), None, 1);
        let old = candidate(Some(1.0), None, 24 * 30);
        let scored = blend_candidates(vec![fresh, old], false, Utc::now());
        assert!(scored[0].score > scored[1].score);
    }

    #[test]
    fn rank_and_page_orders_by_score_descending_then_pages() {
        let a = ScoredCandidate { candidate: candidate(None, None, 1), score: 0.9 };
        let b = ScoredCandidate { candidate: candidate(None, None, 1), score: 0.1 };
        let c = ScoredCandidate { candidate: candidate(None, None, 1), score: 0.5 };
        let page = rank_and_page(vec![a.clone(), b, c], 1, 1);
        assert_eq!(page.len(), 1);
        assert!((page[0].score - 0.5).abs() < 1e-9);
    }
}
