//! Nearest-identity lookup over the roster.

use crate::roster::Roster;
use crate::types::{Embedding, Identity, EMBEDDING_DIM};
use thiserror::Error;

/// Default Euclidean distance threshold for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("match threshold must be a finite, non-negative distance, got {0}")]
    InvalidThreshold(f32),
}

/// A positive match against the roster.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity_id: i64,
    pub name: String,
    pub distance: f32,
}

/// Strategy for comparing a probe embedding against the enrolled roster.
pub trait Matcher {
    /// `Ok(None)` means the face is unknown.
    fn find(&self, probe: &Embedding, roster: &Roster) -> Result<Option<MatchResult>, MatchError>;
}

/// Euclidean distance matcher with a fixed acceptance threshold.
///
/// Linear scan over every roster entry. Among entries within the
/// threshold the closest wins; equal distances go to the lowest id.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Result<Self, MatchError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(MatchError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }
}

fn check_dim(embedding: &Embedding) -> Result<(), MatchError> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(MatchError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual: embedding.len(),
        });
    }
    Ok(())
}

impl Matcher for EuclideanMatcher {
    fn find(&self, probe: &Embedding, roster: &Roster) -> Result<Option<MatchResult>, MatchError> {
        check_dim(probe)?;

        let mut best: Option<(&Identity, f32)> = None;
        for identity in roster.identities() {
            check_dim(&identity.embedding)?;
            let distance = probe.euclidean_distance(&identity.embedding);
            // NaN never matches, whether it comes from the distance or the threshold.
            if distance.is_nan() || self.threshold.is_nan() || distance > self.threshold {
                continue;
            }
            let is_better = match best {
                None => true,
                Some((prev, prev_dist)) => {
                    distance < prev_dist || (distance == prev_dist && identity.id < prev.id)
                }
            };
            if is_better {
                best = Some((identity, distance));
            }
        }

        let result = best.map(|(identity, distance)| MatchResult {
            identity_id: identity.id,
            name: identity.name.clone(),
            distance,
        });
        match &result {
            Some(m) => tracing::debug!(identity = m.identity_id, distance = m.distance, "face matched"),
            None => tracing::debug!(roster = roster.len(), "no identity within threshold"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis(i: usize, scale: f32) -> Embedding {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[i] = scale;
        Embedding::new(values)
    }

    fn identity(id: i64, name: &str, embedding: Embedding) -> Identity {
        Identity { id, name: name.into(), embedding }
    }

    #[test]
    fn test_exact_vector_matches() {
        let roster = Roster::new(vec![
            identity(1, "alice", basis(0, 1.0)),
            identity(2, "bob", basis(1, 1.0)),
            identity(3, "carol", basis(2, 1.0)),
        ]);
        let result = EuclideanMatcher::default().find(&basis(2, 1.0), &roster).unwrap().unwrap();
        assert_eq!(result.identity_id, 3);
        assert_eq!(result.name, "carol");
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn test_far_vector_is_unknown() {
        // Orthogonal unit vectors are sqrt(2) apart.
        let roster = Roster::new(vec![identity(1, "alice", basis(0, 1.0))]);
        let result = EuclideanMatcher::default().find(&basis(1, 1.0), &roster).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let roster = Roster::new(vec![identity(1, "alice", basis(0, 0.5))]);
        let result = EuclideanMatcher::new(0.5).unwrap().find(&basis(0, 1.0), &roster).unwrap();
        assert_eq!(result.map(|m| m.identity_id), Some(1));
    }

    #[test]
    fn test_closest_wins() {
        let roster = Roster::new(vec![
            identity(1, "far", basis(0, 0.5)),
            identity(2, "near", basis(0, 0.9)),
        ]);
        let result = EuclideanMatcher::default().find(&basis(0, 1.0), &roster).unwrap().unwrap();
        assert_eq!(result.identity_id, 2);
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let roster = Roster::new(vec![
            identity(7, "twin-b", basis(0, 1.0)),
            identity(4, "twin-a", basis(0, 1.0)),
        ]);
        let result = EuclideanMatcher::default().find(&basis(0, 1.0), &roster).unwrap().unwrap();
        assert_eq!(result.identity_id, 4);
    }

    #[test]
    fn test_empty_roster_is_unknown() {
        let result = EuclideanMatcher::default().find(&basis(0, 1.0), &Roster::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_probe_dimension_mismatch() {
        let roster = Roster::new(vec![identity(1, "alice", basis(0, 1.0))]);
        let err = EuclideanMatcher::default()
            .find(&Embedding::new(vec![0.0; 64]), &roster)
            .unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { expected: EMBEDDING_DIM, actual: 64 });
    }

    #[test]
    fn test_roster_dimension_mismatch() {
        let roster = Roster::new(vec![identity(1, "short", Embedding::new(vec![0.0; 3]))]);
        let err = EuclideanMatcher::default().find(&basis(0, 1.0), &roster).unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { expected: EMBEDDING_DIM, actual: 3 });
    }

    #[test]
    fn test_nan_roster_entry_never_matches() {
        let mut poisoned = basis(0, 1.0);
        poisoned.values[5] = f32::NAN;
        let roster = Roster::new(vec![
            identity(1, "corrupt", poisoned),
            identity(2, "alice", basis(0, 1.0)),
        ]);
        let result = EuclideanMatcher::default().find(&basis(0, 1.0), &roster).unwrap().unwrap();
        assert_eq!(result.identity_id, 2);
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn test_nan_probe_is_unknown() {
        let roster = Roster::new(vec![identity(1, "alice", basis(0, 1.0))]);
        let mut probe = basis(0, 1.0);
        probe.values[0] = f32::NAN;
        assert!(EuclideanMatcher::default().find(&probe, &roster).unwrap().is_none());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        for bad in [f32::NAN, f32::INFINITY, -0.1] {
            assert!(matches!(EuclideanMatcher::new(bad), Err(MatchError::InvalidThreshold(_))));
        }
        assert_eq!(EuclideanMatcher::new(0.0).unwrap().threshold, 0.0);
    }

    #[test]
    fn test_nan_threshold_set_directly_matches_nothing() {
        let roster = Roster::new(vec![identity(1, "alice", basis(0, 1.0))]);
        let matcher = EuclideanMatcher { threshold: f32::NAN };
        assert!(matcher.find(&basis(0, 100.0), &roster).unwrap().is_none());
    }
}
