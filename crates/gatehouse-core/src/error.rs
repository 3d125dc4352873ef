//! Domain error taxonomy for access operations.

use thiserror::Error;
use uuid::Uuid;

use crate::matcher::ScanKind;
use crate::provider::ProviderError;

pub type Result<T> = std::result::Result<T, Error>;

/// Why an access operation was rejected.
///
/// Every variant is operation-local: nothing here is fatal to the process,
/// and a failed operation leaves no partial state behind. Absent-match
/// conditions (`no candidates`, `no match`) are not errors; they are
/// represented in [`ScanOutcome`](crate::flow::ScanOutcome).
#[derive(Debug, Error)]
pub enum Error {
    #[error("person {0} not found")]
    PersonNotFound(Uuid),
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("person {person_id} is not registered at site {site_id}")]
    WrongSite { person_id: Uuid, site_id: Uuid },
    #[error("person {person_id} is already inside (open session {session_id})")]
    AlreadyInside { person_id: Uuid, session_id: Uuid },
    #[error("person {0} has no open session")]
    NotInside(Uuid),
    #[error("session {0} is already closed")]
    SessionClosed(Uuid),
    #[error("session {0} is voided")]
    SessionVoided(Uuid),
    /// Same scan for the same person repeated within the guard window.
    /// Informational: the first submission already took effect.
    #[error("duplicate {kind} for person {person_id} within {window_secs}s")]
    DuplicateSubmission {
        kind: ScanKind,
        person_id: Uuid,
        window_secs: u64,
    },
    #[error("invalid amendment: {0}")]
    InvalidAmendment(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// Supervisor overrides must carry a non-empty reason.
    #[error("a reason is required for supervisor overrides")]
    ReasonRequired,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The storage backend failed. Safe to retry manually once it recovers.
    #[error("storage backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a store error as a backend failure.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Backend(Box::new(err))
    }

    /// True for rejections where the session state machine forbids the
    /// requested transition.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Error::AlreadyInside { .. }
                | Error::NotInside(_)
                | Error::SessionClosed(_)
                | Error::SessionVoided(_)
        )
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateSubmission { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_predicate() {
        let id = Uuid::new_v4();
        assert!(Error::NotInside(id).is_invalid_transition());
        assert!(Error::SessionClosed(id).is_invalid_transition());
        assert!(Error::SessionVoided(id).is_invalid_transition());
        assert!(Error::AlreadyInside { person_id: id, session_id: id }.is_invalid_transition());
        assert!(!Error::PersonNotFound(id).is_invalid_transition());

        let dup = Error::DuplicateSubmission {
            kind: ScanKind::Entry,
            person_id: id,
            window_secs: 120,
        };
        assert!(dup.is_duplicate());
        assert!(!dup.is_invalid_transition());
    }
}
