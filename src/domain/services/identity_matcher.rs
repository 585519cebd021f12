use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::entities::{
    embedding_record::NeighborCandidate,
    match_decision::{IdentifiedMatch, MatchCandidate, MatchDecision},
};

/// Resolves an identity verdict from the nearest gallery records.
///
/// `candidates` are the top-k records returned by the gallery store for
/// a query embedding, each with its distance under the configured
/// metric. The function is pure: all the decision policy lives here,
/// the store only ranks.
///
/// Policy:
/// - An employee with several reference embeddings among the candidates
///   is scored by the *minimum* of their distances. Best sample wins: a
///   poor reference photo must not penalize a good match.
/// - The best-scored employee is confirmed only when their score is at
///   or below `threshold`.
/// - Two different employees tied at the best score is an explicit
///   [`MatchDecision::Ambiguous`], not an arbitrary pick. Row order
///   coming out of an index is not an identity signal.
pub fn resolve(candidates: &[NeighborCandidate], threshold: f32) -> MatchDecision {
    if candidates.is_empty() {
        return MatchDecision::Unknown {
            best_distance: None,
        };
    }

    // Minimum distance per employee.
    let mut best_per_employee: HashMap<Uuid, &NeighborCandidate> = HashMap::new();
    for candidate in candidates {
        best_per_employee
            .entry(candidate.employee_id)
            .and_modify(|best| {
                if candidate.distance < best.distance {
                    *best = candidate;
                }
            })
            .or_insert(candidate);
    }

    let best = best_per_employee
        .values()
        .copied()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .expect("candidates is not empty");

    if best.distance > threshold {
        return MatchDecision::Unknown {
            best_distance: Some(best.distance),
        };
    }

    let mut tied: Vec<&NeighborCandidate> = best_per_employee
        .values()
        .copied()
        .filter(|c| c.distance == best.distance)
        .collect();

    if tied.len() > 1 {
        // Deterministic candidate order for callers and logs.
        tied.sort_by(|a, b| a.employee_code.cmp(&b.employee_code));
        return MatchDecision::Ambiguous {
            candidates: tied
                .into_iter()
                .map(|c| MatchCandidate {
                    employee_id: c.employee_id,
                    employee_code: c.employee_code.clone(),
                })
                .collect(),
            distance: best.distance,
        };
    }

    MatchDecision::Identified(IdentifiedMatch {
        employee_id: best.employee_id,
        employee_code: best.employee_code.clone(),
        display_name: best.display_name.clone(),
        distance: best.distance,
        confidence: confidence(best.distance, threshold),
    })
}

/// Confidence of a confirmed match: 1 at distance 0, falling linearly
/// to 0 at the threshold. A zero threshold only ever confirms exact
/// matches, at full confidence.
fn confidence(distance: f32, threshold: f32) -> f32 {
    if threshold <= 0.0 {
        return 1.0;
    }
    (1.0 - distance / threshold).max(0.0)
}
