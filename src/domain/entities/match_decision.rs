use uuid::Uuid;

/// The verdict of an identity lookup.
///
/// Distances are non-negative and lower means more similar. An
/// ambiguity is an explicit outcome: callers must treat it as "cannot
/// confirm", never as a confirmed identity of either candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Identified(IdentifiedMatch),
    Ambiguous {
        /// The identities tied at the best distance.
        candidates: Vec<MatchCandidate>,
        distance: f32,
    },
    Unknown {
        /// Best (lowest) distance seen among the retrieved candidates.
        /// `None` when the gallery returned nothing. Useful for
        /// threshold tuning, not exposed as a match.
        best_distance: Option<f32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedMatch {
    pub employee_id: Uuid,
    pub employee_code: String,
    pub display_name: String,
    pub distance: f32,
    /// Monotonically decreasing in distance: 1 at distance 0, 0 at the
    /// threshold.
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub employee_id: Uuid,
    pub employee_code: String,
}
