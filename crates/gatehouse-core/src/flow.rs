//! Scan flow: frame or probe descriptor in, identification outcome out.
//!
//! Identification never writes. The operator (or kiosk) confirms the
//! outcome and commits it through the reconciler, mirroring how gate staff
//! verify a match on screen before letting anyone through.

use uuid::Uuid;

use crate::{
    descriptor::Descriptor,
    error::{Error, Result},
    matcher::{
        CandidatePool, DescriptorMatcher, EuclideanMatcher, ScanKind, DEFAULT_MATCH_THRESHOLD,
    },
    provider::{DescriptorProvider, Frame},
    store::AccessStore,
    types::Person,
};

/// A person the matcher accepted, with live state for the confirm step.
#[derive(Debug, Clone)]
pub struct MatchedPerson {
    pub person: Person,
    pub distance: f32,
    /// Open session at match time; tells the operator up front whether an
    /// entry commit would be rejected.
    pub open_session_id: Option<Uuid>,
}

/// What one scan concluded.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Matched(MatchedPerson),
    /// The pool was scanned and nobody cleared the threshold.
    NoMatch { best_distance: Option<f32> },
    /// Nobody to match against. Normal for exit scans on an empty site.
    NoCandidates,
    /// The provider found no usable face in the frame.
    NoFace,
}

pub struct ScanFlow<S, M = EuclideanMatcher> {
    store: S,
    matcher: M,
    threshold: f32,
}

impl<S: AccessStore> ScanFlow<S> {
    pub fn new(store: S) -> Self {
        Self { store, matcher: EuclideanMatcher, threshold: DEFAULT_MATCH_THRESHOLD }
    }
}

impl<S: AccessStore, M: DescriptorMatcher> ScanFlow<S, M> {
    pub fn with_matcher(store: S, matcher: M, threshold: f32) -> Self {
        Self { store, matcher, threshold }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the candidate pool for one scan, in stable store order.
    pub async fn load_pool(&self, site_id: Uuid, kind: ScanKind) -> Result<CandidatePool> {
        let candidates = match kind {
            ScanKind::Entry => self.store.entry_candidates(site_id).await,
            ScanKind::Exit => self.store.exit_candidates(site_id).await,
        }
        .map_err(Error::backend)?;
        tracing::debug!(
            site = %site_id,
            kind = %kind,
            candidates = candidates.len(),
            "candidate pool loaded"
        );
        Ok(CandidatePool::new(kind, candidates))
    }

    /// Identify the probe against the site's pool for `kind`.
    pub async fn identify(
        &self,
        site_id: Uuid,
        kind: ScanKind,
        probe: &Descriptor,
    ) -> Result<ScanOutcome> {
        let pool = self.load_pool(site_id, kind).await?;
        if pool.is_empty() {
            tracing::info!(site = %site_id, kind = %kind, "scan found no candidates");
            return Ok(ScanOutcome::NoCandidates);
        }

        let outcome = self.matcher.best_match(probe, &pool, self.threshold);
        let Some(hit) = outcome.hit else {
            tracing::info!(
                site = %site_id,
                kind = %kind,
                best_distance = ?outcome.best_distance,
                "scan matched nobody"
            );
            return Ok(ScanOutcome::NoMatch { best_distance: outcome.best_distance });
        };

        // Re-read the person and their live state so the operator confirms
        // against current data, not the pool snapshot.
        let person = self
            .store
            .get_person(hit.person_id)
            .await
            .map_err(Error::backend)?
            .ok_or(Error::PersonNotFound(hit.person_id))?;
        let open = self
            .store
            .open_session_for(site_id, hit.person_id)
            .await
            .map_err(Error::backend)?;

        tracing::info!(
            site = %site_id,
            kind = %kind,
            person = %hit.person_id,
            distance = hit.distance,
            "scan matched"
        );
        Ok(ScanOutcome::Matched(MatchedPerson {
            person,
            distance: hit.distance,
            open_session_id: open.map(|s| s.session_id),
        }))
    }

    /// Full pipeline: frame to descriptor to identification.
    pub async fn identify_frame<P: DescriptorProvider>(
        &self,
        provider: &P,
        site_id: Uuid,
        kind: ScanKind,
        frame: &Frame,
    ) -> Result<ScanOutcome> {
        let Some(probe) = provider.descriptor(frame).await? else {
            tracing::info!(site = %site_id, kind = %kind, "no face in frame");
            return Ok(ScanOutcome::NoFace);
        };
        self.identify(site_id, kind, &probe).await
    }
}
