//! Session reconciliation: the entry/exit state machine and supervisor
//! overrides.
//!
//! Per (site, person) the store holds at most one open, non-voided session.
//! The reconciler enforces that by re-checking state at commit time rather
//! than trusting the scan that selected the person, and by re-probing once
//! when the storage uniqueness backstop rejects an insert. A trailing
//! duplicate window absorbs double submissions from scanner bounce.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    descriptor::Descriptor,
    error::{Error, Result},
    events::{AccessEvent, AccessEventBus, AccessEventKind},
    matcher::ScanKind,
    store::AccessStore,
    types::{
        AccessSession, AuditAction, NewAuditRecord, NewSession, Person, SessionAmendment,
        SiteSettings,
    },
};

/// Trailing window in which a repeated scan is treated as the same
/// submission rather than a state violation.
pub const DEFAULT_DUPLICATE_WINDOW_SECS: u64 = 120;

pub struct Reconciler<S> {
    store: S,
    events: AccessEventBus,
    duplicate_window: Duration,
}

impl<S: AccessStore> Reconciler<S> {
    pub fn new(store: S, events: AccessEventBus) -> Self {
        Self {
            store,
            events,
            duplicate_window: Duration::seconds(DEFAULT_DUPLICATE_WINDOW_SECS as i64),
        }
    }

    pub fn with_duplicate_window(mut self, window_secs: u64) -> Self {
        self.duplicate_window = Duration::seconds(window_secs as i64);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &AccessEventBus {
        &self.events
    }

    fn window_secs(&self) -> u64 {
        self.duplicate_window.num_seconds().max(0) as u64
    }

    /// Record an entry, opening a session with snapshots of the person's
    /// current attributes.
    pub async fn record_entry(
        &self,
        site_id: Uuid,
        person_id: Uuid,
        operator: Option<&str>,
        note: Option<&str>,
    ) -> Result<AccessSession> {
        let person = self.person_at_site(site_id, person_id).await?;

        let now = Utc::now();
        let cutoff = now - self.duplicate_window;

        // Duplicate guard first: a rapid second tap reads as the same
        // submission, not a state violation.
        if let Some(recent) = self
            .store
            .last_entry_after(site_id, person_id, cutoff)
            .await
            .map_err(Error::backend)?
        {
            tracing::info!(
                site = %site_id,
                person = %person_id,
                session = %recent.session_id,
                "entry rejected: duplicate submission"
            );
            return Err(Error::DuplicateSubmission {
                kind: ScanKind::Entry,
                person_id,
                window_secs: self.window_secs(),
            });
        }

        // Re-check state at commit time; the scan that selected this person
        // may be stale by now.
        if let Some(open) = self
            .store
            .open_session_for(site_id, person_id)
            .await
            .map_err(Error::backend)?
        {
            return Err(Error::AlreadyInside { person_id, session_id: open.session_id });
        }

        let mut input = NewSession::from_person(&person, now);
        input.entry_operator = operator.map(str::to_owned);
        input.note = note.map(str::to_owned);

        let session = match self.store.insert_session(input).await {
            Ok(session) => session,
            Err(err) => {
                // A concurrent entry may have won the race and tripped the
                // storage uniqueness backstop.
                if let Some(open) = self
                    .store
                    .open_session_for(site_id, person_id)
                    .await
                    .map_err(Error::backend)?
                {
                    return Err(Error::AlreadyInside { person_id, session_id: open.session_id });
                }
                return Err(Error::backend(err));
            }
        };

        tracing::info!(
            site = %site_id,
            person = %person_id,
            session = %session.session_id,
            "entry recorded"
        );
        self.events
            .emit(AccessEvent::for_session(AccessEventKind::SessionOpened, &session));
        Ok(session)
    }

    /// Record an exit, closing the person's open session.
    pub async fn record_exit(
        &self,
        site_id: Uuid,
        person_id: Uuid,
        operator: Option<&str>,
    ) -> Result<AccessSession> {
        self.person_at_site(site_id, person_id).await?;

        let now = Utc::now();
        let open = self
            .store
            .open_session_for(site_id, person_id)
            .await
            .map_err(Error::backend)?;

        let Some(open) = open else {
            return Err(self.exit_rejection(site_id, person_id, now).await?);
        };

        let closed = self
            .store
            .close_session(open.session_id, now, operator.map(str::to_owned))
            .await
            .map_err(Error::backend)?;

        match closed {
            Some(closed) => {
                tracing::info!(
                    site = %site_id,
                    person = %person_id,
                    session = %closed.session_id,
                    "exit recorded"
                );
                self.events
                    .emit(AccessEvent::for_session(AccessEventKind::SessionClosed, &closed));
                Ok(closed)
            }
            // The session closed or voided between lookup and update.
            None => Err(self.exit_rejection(site_id, person_id, now).await?),
        }
    }

    /// Supervisor override: close a session without an exit scan.
    pub async fn force_exit(
        &self,
        session_id: Uuid,
        operator: &str,
        reason: &str,
    ) -> Result<AccessSession> {
        require_reason(reason)?;
        let before = self.session(session_id).await?;
        if before.is_voided() {
            return Err(Error::SessionVoided(session_id));
        }
        if before.exit_at.is_some() {
            return Err(Error::SessionClosed(session_id));
        }

        let now = Utc::now();
        let Some(closed) = self
            .store
            .close_session(session_id, now, Some(operator.to_owned()))
            .await
            .map_err(Error::backend)?
        else {
            // Lost a race with another supervisor action.
            return match self.store.get_session(session_id).await.map_err(Error::backend)? {
                Some(s) if s.is_voided() => Err(Error::SessionVoided(session_id)),
                Some(_) => Err(Error::SessionClosed(session_id)),
                None => Err(Error::SessionNotFound(session_id)),
            };
        };

        tracing::warn!(session = %session_id, operator, "session force-closed");
        self.audit(NewAuditRecord {
            site_id: closed.site_id,
            operator: Some(operator.to_owned()),
            action: AuditAction::SessionForceClosed,
            entity_id: Some(session_id),
            before: audit_json(&before),
            after: audit_json(&closed),
            note: Some(reason.to_owned()),
        })
        .await;
        self.events
            .emit(AccessEvent::for_session(AccessEventKind::SessionClosed, &closed));
        Ok(closed)
    }

    /// Supervisor override: logically delete a session, open or closed.
    ///
    /// Voided sessions drop out of presence, pools and duplicate probes,
    /// so a person whose erroneous entry was voided can re-enter at once.
    pub async fn void_session(
        &self,
        session_id: Uuid,
        operator: &str,
        reason: &str,
    ) -> Result<AccessSession> {
        require_reason(reason)?;
        let before = self.session(session_id).await?;
        if before.is_voided() {
            return Err(Error::SessionVoided(session_id));
        }

        let now = Utc::now();
        let Some(voided) = self
            .store
            .void_session(session_id, now, Some(operator.to_owned()), reason.to_owned())
            .await
            .map_err(Error::backend)?
        else {
            return Err(Error::SessionVoided(session_id));
        };

        tracing::warn!(session = %session_id, operator, "session voided");
        self.audit(NewAuditRecord {
            site_id: voided.site_id,
            operator: Some(operator.to_owned()),
            action: AuditAction::SessionVoided,
            entity_id: Some(session_id),
            before: audit_json(&before),
            after: audit_json(&voided),
            note: Some(reason.to_owned()),
        })
        .await;
        self.events
            .emit(AccessEvent::for_session(AccessEventKind::SessionVoided, &voided));
        Ok(voided)
    }

    /// Supervisor override: correct the recorded times or note.
    pub async fn amend_session(
        &self,
        session_id: Uuid,
        amendment: SessionAmendment,
        operator: &str,
        reason: &str,
    ) -> Result<AccessSession> {
        require_reason(reason)?;
        if amendment.is_empty() {
            return Err(Error::InvalidAmendment("nothing to change".into()));
        }
        let before = self.session(session_id).await?;
        if before.is_voided() {
            return Err(Error::SessionVoided(session_id));
        }

        let entry_at = amendment.entry_at.unwrap_or(before.entry_at);
        let exit_at = amendment.exit_at.or(before.exit_at);
        if let Some(exit_at) = exit_at {
            if exit_at < entry_at {
                return Err(Error::InvalidAmendment(format!(
                    "exit {exit_at} precedes entry {entry_at}"
                )));
            }
        }

        let Some(after) = self
            .store
            .amend_session(session_id, amendment)
            .await
            .map_err(Error::backend)?
        else {
            return Err(Error::SessionVoided(session_id));
        };

        tracing::warn!(session = %session_id, operator, "session amended");
        self.audit(NewAuditRecord {
            site_id: after.site_id,
            operator: Some(operator.to_owned()),
            action: AuditAction::SessionAmended,
            entity_id: Some(session_id),
            before: audit_json(&before),
            after: audit_json(&after),
            note: Some(reason.to_owned()),
        })
        .await;
        self.events
            .emit(AccessEvent::for_session(AccessEventKind::SessionAmended, &after));
        Ok(after)
    }

    /// Validate and store per-site presence thresholds.
    pub async fn update_settings(
        &self,
        settings: SiteSettings,
        operator: Option<&str>,
    ) -> Result<SiteSettings> {
        if !(settings.warn_hours > 0.0) || !(settings.crit_hours > 0.0) {
            return Err(Error::InvalidSettings("thresholds must be positive".into()));
        }
        if settings.warn_hours > settings.crit_hours {
            return Err(Error::InvalidSettings(format!(
                "warn_hours {} exceeds crit_hours {}",
                settings.warn_hours, settings.crit_hours
            )));
        }

        let before = self.store.settings(settings.site_id).await.map_err(Error::backend)?;
        let stored = self.store.update_settings(settings).await.map_err(Error::backend)?;

        tracing::info!(
            site = %stored.site_id,
            warn_hours = stored.warn_hours,
            crit_hours = stored.crit_hours,
            "settings updated"
        );
        self.audit(NewAuditRecord {
            site_id: stored.site_id,
            operator: operator.map(str::to_owned),
            action: AuditAction::SettingsUpdated,
            entity_id: None,
            before: audit_json(&before),
            after: audit_json(&stored),
            note: None,
        })
        .await;
        self.events.emit(AccessEvent::settings(stored.site_id));
        Ok(stored)
    }

    /// Attach, replace or (with `None`) clear a person's stored descriptor.
    pub async fn set_descriptor(
        &self,
        person_id: Uuid,
        descriptor: Option<Descriptor>,
        operator: Option<&str>,
    ) -> Result<Person> {
        let enrolled = descriptor.is_some();
        let person = self
            .store
            .update_descriptor(person_id, descriptor)
            .await
            .map_err(Error::backend)?
            .ok_or(Error::PersonNotFound(person_id))?;

        tracing::info!(person = %person_id, enrolled, "descriptor updated");
        // No before/after payloads: raw biometrics stay out of the audit log.
        self.audit(NewAuditRecord {
            site_id: person.site_id,
            operator: operator.map(str::to_owned),
            action: AuditAction::DescriptorUpdated,
            entity_id: Some(person_id),
            before: None,
            after: None,
            note: Some(if enrolled { "descriptor set" } else { "descriptor cleared" }.to_owned()),
        })
        .await;
        Ok(person)
    }

    async fn person_at_site(&self, site_id: Uuid, person_id: Uuid) -> Result<Person> {
        let person = self
            .store
            .get_person(person_id)
            .await
            .map_err(Error::backend)?
            .ok_or(Error::PersonNotFound(person_id))?;
        if person.site_id != site_id {
            return Err(Error::WrongSite { person_id, site_id });
        }
        Ok(person)
    }

    async fn session(&self, session_id: Uuid) -> Result<AccessSession> {
        self.store
            .get_session(session_id)
            .await
            .map_err(Error::backend)?
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Why an exit could not be recorded: a duplicate inside the window,
    /// or the person is simply not inside.
    async fn exit_rejection(
        &self,
        site_id: Uuid,
        person_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Error> {
        let cutoff = now - self.duplicate_window;
        let recent = self
            .store
            .last_exit_after(site_id, person_id, cutoff)
            .await
            .map_err(Error::backend)?;
        if recent.is_some() {
            tracing::info!(
                site = %site_id,
                person = %person_id,
                "exit rejected: duplicate submission"
            );
            Ok(Error::DuplicateSubmission {
                kind: ScanKind::Exit,
                person_id,
                window_secs: self.window_secs(),
            })
        } else {
            Ok(Error::NotInside(person_id))
        }
    }

    /// Record an audit row for an already-committed mutation. Failures are
    /// logged, never propagated: the mutation stands either way.
    async fn audit(&self, input: NewAuditRecord) {
        let action = input.action;
        if let Err(err) = self.store.record_audit(input).await {
            tracing::error!(action = %action, error = %err, "audit record failed");
        }
    }
}

fn require_reason(reason: &str) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(Error::ReasonRequired);
    }
    Ok(())
}

fn audit_json<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::error!(error = %err, "audit payload serialization failed");
            None
        }
    }
}
