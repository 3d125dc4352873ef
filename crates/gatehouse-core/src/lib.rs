//! gatehouse-core: access control for construction sites.
//!
//! Face-assisted entry and exit over per-site candidate pools, a duplicate
//! submission guard, and a single-open-session invariant per person.
//! Persistence and the embedding model are trait seams; this crate holds
//! the domain logic only.

pub mod descriptor;
pub mod error;
pub mod events;
pub mod flow;
pub mod matcher;
pub mod presence;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod types;

pub use descriptor::{Descriptor, DescriptorError};
pub use error::{Error, Result};
pub use events::{AccessEvent, AccessEventBus, AccessEventKind, SiteEvents};
pub use flow::{MatchedPerson, ScanFlow, ScanOutcome};
pub use matcher::{
    Candidate, CandidatePool, DescriptorMatcher, EuclideanMatcher, MatchHit, MatchOutcome,
    ScanKind, DEFAULT_MATCH_THRESHOLD,
};
pub use presence::{classify_hours, site_summary, InsideRecord, PresenceStatus, SiteSummary};
pub use provider::{DescriptorProvider, Frame, ProviderError};
pub use reconcile::{Reconciler, DEFAULT_DUPLICATE_WINDOW_SECS};
pub use store::AccessStore;
pub use types::{
    AccessSession, AuditAction, AuditRecord, NewAuditRecord, NewPerson, NewSession, Person,
    PersonKind, PersonStatus, SessionAmendment, Site, SiteSettings,
};
