//! Descriptor matching: best candidate under a distance threshold.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::descriptor::Descriptor;

/// Default acceptance threshold, calibrated for 128-dimensional descriptors
/// from the upstream embedding model.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Which side of the gate a scan serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Entry,
    Exit,
}

impl ScanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanKind::Entry => "entry",
            ScanKind::Exit => "exit",
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One person eligible to be matched in a scan.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub person_id: Uuid,
    pub descriptor: Descriptor,
}

/// The candidates loaded for one scan, in deterministic load order.
///
/// Pools are ephemeral: built per scan, matched against, then dropped.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    pub kind: ScanKind,
    pub candidates: Vec<Candidate>,
}

impl CandidatePool {
    pub fn new(kind: ScanKind, candidates: Vec<Candidate>) -> Self {
        Self { kind, candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// An accepted match: the closest candidate under the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit {
    pub person_id: Uuid,
    pub distance: f32,
}

/// Result of matching one probe against a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Accepted hit, if the best distance cleared the threshold.
    pub hit: Option<MatchHit>,
    /// Smallest distance observed over the whole pool, accepted or not.
    /// `None` only when the pool had no comparable candidates.
    pub best_distance: Option<f32>,
}

impl MatchOutcome {
    fn none() -> Self {
        Self { hit: None, best_distance: None }
    }
}

/// Strategy for picking the best candidate for a probe descriptor.
pub trait DescriptorMatcher {
    fn best_match(
        &self,
        probe: &Descriptor,
        pool: &CandidatePool,
        threshold: f32,
    ) -> MatchOutcome;
}

/// Euclidean-distance matcher with full-pool traversal.
///
/// Always scans every candidate, no early exit, so the reported hit is the
/// true minimum over the pool. Acceptance is strict (`distance < threshold`)
/// and ties keep the first-seen candidate, making the outcome deterministic
/// in pool order. Candidates whose descriptor length differs from the probe
/// are skipped.
pub struct EuclideanMatcher;

impl DescriptorMatcher for EuclideanMatcher {
    fn best_match(
        &self,
        probe: &Descriptor,
        pool: &CandidatePool,
        threshold: f32,
    ) -> MatchOutcome {
        let mut best: Option<(usize, f32)> = None;
        let mut skipped = 0usize;

        for (i, candidate) in pool.candidates.iter().enumerate() {
            if candidate.descriptor.len() != probe.len() {
                skipped += 1;
                continue;
            }
            let dist = probe.distance(&candidate.descriptor);
            // Strict < keeps the earlier candidate on equal distance.
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }

        if skipped > 0 {
            tracing::warn!(
                kind = %pool.kind,
                skipped,
                probe_len = probe.len(),
                "skipped candidates with mismatched descriptor length"
            );
        }

        match best {
            Some((idx, dist)) if dist < threshold => MatchOutcome {
                hit: Some(MatchHit {
                    person_id: pool.candidates[idx].person_id,
                    distance: dist,
                }),
                best_distance: Some(dist),
            },
            Some((_, dist)) => MatchOutcome { hit: None, best_distance: Some(dist) },
            None => MatchOutcome::none(),
        }
    }
}
