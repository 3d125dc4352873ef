//! The `AccessStore` trait: persistence seam for sites, people and sessions.
//!
//! Implemented by storage backends (e.g. `gatehouse-store`). The reconciler
//! and scan flow depend on this abstraction, not on any concrete backend.
//!
//! Methods take owned arguments so implementations can move them into
//! blocking database closures, and return `Send` futures so the trait works
//! on multi-threaded runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    descriptor::Descriptor,
    matcher::Candidate,
    types::{
        AccessSession, AuditRecord, NewAuditRecord, NewPerson, NewSession, Person, PersonStatus,
        SessionAmendment, Site, SiteSettings,
    },
};

pub trait AccessStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    // ── Sites ────────────────────────────────────────────────────────────

    fn create_site(
        &self,
        name: String,
    ) -> impl Future<Output = Result<Site, Self::Error>> + Send + '_;

    /// Returns `None` if the site does not exist.
    fn get_site(
        &self,
        site_id: Uuid,
    ) -> impl Future<Output = Result<Option<Site>, Self::Error>> + Send + '_;

    fn list_sites(&self) -> impl Future<Output = Result<Vec<Site>, Self::Error>> + Send + '_;

    // ── People ───────────────────────────────────────────────────────────

    /// Register a person. Fails if the national id is already registered
    /// at the site.
    fn add_person(
        &self,
        input: NewPerson,
    ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

    fn get_person(
        &self,
        person_id: Uuid,
    ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

    fn list_people(
        &self,
        site_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + '_;

    /// Replace (or with `None`, clear) a person's stored descriptor.
    /// Returns the updated person, or `None` if the person does not exist.
    fn update_descriptor(
        &self,
        person_id: Uuid,
        descriptor: Option<Descriptor>,
    ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

    /// Manual fallback search: exact national id or case-insensitive name
    /// substring, each hit annotated with its open session if any.
    fn search_people(
        &self,
        site_id: Uuid,
        query: String,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<PersonStatus>, Self::Error>> + Send + '_;

    // ── Candidate pools ──────────────────────────────────────────────────

    /// Everyone at the site with a stored descriptor, in stable order.
    fn entry_candidates(
        &self,
        site_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Candidate>, Self::Error>> + Send + '_;

    /// Everyone currently inside the site with a stored descriptor.
    fn exit_candidates(
        &self,
        site_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Candidate>, Self::Error>> + Send + '_;

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Persist a new open session. Fails if the person already has an open
    /// session at the site (storage-level uniqueness backstop).
    fn insert_session(
        &self,
        input: NewSession,
    ) -> impl Future<Output = Result<AccessSession, Self::Error>> + Send + '_;

    fn get_session(
        &self,
        session_id: Uuid,
    ) -> impl Future<Output = Result<Option<AccessSession>, Self::Error>> + Send + '_;

    /// The open, non-voided session for a person at a site, if any.
    fn open_session_for(
        &self,
        site_id: Uuid,
        person_id: Uuid,
    ) -> impl Future<Output = Result<Option<AccessSession>, Self::Error>> + Send + '_;

    /// All open sessions at a site, newest entry first.
    fn open_sessions(
        &self,
        site_id: Uuid,
    ) -> impl Future<Output = Result<Vec<AccessSession>, Self::Error>> + Send + '_;

    /// Most recent non-voided session for the person with
    /// `entry_at >= cutoff`. Duplicate-window probe for entries.
    fn last_entry_after(
        &self,
        site_id: Uuid,
        person_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<AccessSession>, Self::Error>> + Send + '_;

    /// Most recent non-voided session for the person with
    /// `exit_at >= cutoff`. Duplicate-window probe for exits.
    fn last_exit_after(
        &self,
        site_id: Uuid,
        person_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<AccessSession>, Self::Error>> + Send + '_;

    /// Close a session if, and only if, it is still open. Returns the
    /// closed session, or `None` when it was already closed or voided
    /// (the caller decides what that means).
    fn close_session(
        &self,
        session_id: Uuid,
        exit_at: DateTime<Utc>,
        operator: Option<String>,
    ) -> impl Future<Output = Result<Option<AccessSession>, Self::Error>> + Send + '_;

    /// Void (logically delete) a session if it is not already voided.
    /// Returns `None` when it was, or when it does not exist.
    fn void_session(
        &self,
        session_id: Uuid,
        voided_at: DateTime<Utc>,
        voided_by: Option<String>,
        reason: String,
    ) -> impl Future<Output = Result<Option<AccessSession>, Self::Error>> + Send + '_;

    /// Apply an amendment to a non-voided session. Returns `None` when the
    /// session is missing or voided. Time-ordering validation is the
    /// reconciler's job.
    fn amend_session(
        &self,
        session_id: Uuid,
        amendment: SessionAmendment,
    ) -> impl Future<Output = Result<Option<AccessSession>, Self::Error>> + Send + '_;

    /// Non-voided sessions with `entry_at >= since`, newest first.
    fn sessions_since(
        &self,
        site_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<AccessSession>, Self::Error>> + Send + '_;

    /// Supervisor history search over snapshot fields (voided rows
    /// included), newest first.
    fn session_history(
        &self,
        site_id: Uuid,
        query: String,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<AccessSession>, Self::Error>> + Send + '_;

    // ── Settings ─────────────────────────────────────────────────────────

    /// Site settings, falling back to defaults when none are stored.
    fn settings(
        &self,
        site_id: Uuid,
    ) -> impl Future<Output = Result<SiteSettings, Self::Error>> + Send + '_;

    fn update_settings(
        &self,
        settings: SiteSettings,
    ) -> impl Future<Output = Result<SiteSettings, Self::Error>> + Send + '_;

    // ── Audit ────────────────────────────────────────────────────────────

    fn record_audit(
        &self,
        input: NewAuditRecord,
    ) -> impl Future<Output = Result<AuditRecord, Self::Error>> + Send + '_;

    /// Most recent audit records for a site, newest first.
    fn recent_audit(
        &self,
        site_id: Uuid,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<AuditRecord>, Self::Error>> + Send + '_;
}
