//! Canonical records: sites, people, access sessions, audit events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::descriptor::Descriptor;

/// A construction site. Every person and session belongs to exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub site_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Per-site presence thresholds, in hours inside.
///
/// A site without a stored row uses [`SiteSettings::default_for`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    pub site_id: Uuid,
    pub warn_hours: f64,
    pub crit_hours: f64,
    pub updated_at: DateTime<Utc>,
}

impl SiteSettings {
    pub const DEFAULT_WARN_HOURS: f64 = 10.0;
    pub const DEFAULT_CRIT_HOURS: f64 = 12.0;

    pub fn default_for(site_id: Uuid) -> Self {
        Self {
            site_id,
            warn_hours: Self::DEFAULT_WARN_HOURS,
            crit_hours: Self::DEFAULT_CRIT_HOURS,
            updated_at: Utc::now(),
        }
    }
}

/// Whether a person is site labor or a visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonKind {
    Worker,
    Visitor,
}

impl PersonKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonKind::Worker => "worker",
            PersonKind::Visitor => "visitor",
        }
    }
}

impl fmt::Display for PersonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person registered at a site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub person_id: Uuid,
    pub site_id: Uuid,
    /// External civil ID, unique per site.
    pub national_id: String,
    pub full_name: String,
    pub kind: PersonKind,
    /// Contracting company, if any.
    pub contractor: Option<String>,
    /// Stored face descriptor. `None` until the person is enrolled.
    pub descriptor: Option<Descriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a person; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub site_id: Uuid,
    pub national_id: String,
    pub full_name: String,
    pub kind: PersonKind,
    pub contractor: Option<String>,
    pub descriptor: Option<Descriptor>,
}

/// One presence interval: entry through exit (or still open).
///
/// Snapshot fields freeze the person's attributes at entry time, so later
/// edits to the person never rewrite history. A session with `voided_at`
/// set is logically deleted and excluded from presence, candidate pools
/// and duplicate-submission checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessSession {
    pub session_id: Uuid,
    pub site_id: Uuid,
    pub person_id: Uuid,
    pub entry_at: DateTime<Utc>,
    /// `None` while the person is inside.
    pub exit_at: Option<DateTime<Utc>>,
    pub entry_operator: Option<String>,
    pub exit_operator: Option<String>,
    pub note: Option<String>,
    pub name_snapshot: String,
    pub national_id_snapshot: String,
    pub kind_snapshot: PersonKind,
    pub contractor_snapshot: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
    pub voided_by: Option<String>,
    pub void_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AccessSession {
    /// Open means the person is inside: no exit recorded, not voided.
    pub fn is_open(&self) -> bool {
        self.exit_at.is_none() && self.voided_at.is_none()
    }

    pub fn is_voided(&self) -> bool {
        self.voided_at.is_some()
    }
}

/// Input for opening a session; the store assigns id and `created_at`.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub site_id: Uuid,
    pub person_id: Uuid,
    pub entry_at: DateTime<Utc>,
    pub entry_operator: Option<String>,
    pub note: Option<String>,
    pub name_snapshot: String,
    pub national_id_snapshot: String,
    pub kind_snapshot: PersonKind,
    pub contractor_snapshot: Option<String>,
}

impl NewSession {
    /// Build an entry for `person`, snapshotting its current attributes.
    pub fn from_person(person: &Person, entry_at: DateTime<Utc>) -> Self {
        Self {
            site_id: person.site_id,
            person_id: person.person_id,
            entry_at,
            entry_operator: None,
            note: None,
            name_snapshot: person.full_name.clone(),
            national_id_snapshot: person.national_id.clone(),
            kind_snapshot: person.kind,
            contractor_snapshot: person.contractor.clone(),
        }
    }
}

/// Supervisor edit of a session. `None` fields are left unchanged.
///
/// An amendment can move the recorded times or rewrite the note, but it
/// cannot clear `exit_at`; reopening a closed interval is done by voiding
/// it and recording a fresh entry.
#[derive(Debug, Clone, Default)]
pub struct SessionAmendment {
    pub entry_at: Option<DateTime<Utc>>,
    pub exit_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl SessionAmendment {
    pub fn is_empty(&self) -> bool {
        self.entry_at.is_none() && self.exit_at.is_none() && self.note.is_none()
    }
}

/// A search hit: the person plus their current presence state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonStatus {
    pub person: Person,
    /// Id of the open session, when the person is currently inside.
    pub open_session_id: Option<Uuid>,
}

impl PersonStatus {
    pub fn is_inside(&self) -> bool {
        self.open_session_id.is_some()
    }
}

/// What a supervisor override did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SessionForceClosed,
    SessionVoided,
    SessionAmended,
    SettingsUpdated,
    DescriptorUpdated,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::SessionForceClosed => "session_force_closed",
            AuditAction::SessionVoided => "session_voided",
            AuditAction::SessionAmended => "session_amended",
            AuditAction::SettingsUpdated => "settings_updated",
            AuditAction::DescriptorUpdated => "descriptor_updated",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of a supervisor override or settings change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub site_id: Uuid,
    pub operator: Option<String>,
    pub action: AuditAction,
    /// The affected session or person, when the action targets one.
    pub entity_id: Option<Uuid>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    /// Operator-supplied reason.
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Input for an audit record; the store assigns id and `recorded_at`.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub site_id: Uuid,
    pub operator: Option<String>,
    pub action: AuditAction,
    pub entity_id: Option<Uuid>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_person() -> Person {
        Person {
            person_id: Uuid::new_v4(),
            site_id: Uuid::new_v4(),
            national_id: "4123456".into(),
            full_name: "Ana Duarte".into(),
            kind: PersonKind::Worker,
            contractor: Some("Constructora Sur".into()),
            descriptor: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_session_snapshots_person() {
        let person = sample_person();
        let now = Utc::now();
        let ns = NewSession::from_person(&person, now);

        assert_eq!(ns.site_id, person.site_id);
        assert_eq!(ns.person_id, person.person_id);
        assert_eq!(ns.entry_at, now);
        assert_eq!(ns.name_snapshot, person.full_name);
        assert_eq!(ns.national_id_snapshot, person.national_id);
        assert_eq!(ns.kind_snapshot, person.kind);
        assert_eq!(ns.contractor_snapshot, person.contractor);
    }

    #[test]
    fn test_session_open_states() {
        let person = sample_person();
        let now = Utc::now();
        let mut session = AccessSession {
            session_id: Uuid::new_v4(),
            site_id: person.site_id,
            person_id: person.person_id,
            entry_at: now,
            exit_at: None,
            entry_operator: None,
            exit_operator: None,
            note: None,
            name_snapshot: person.full_name.clone(),
            national_id_snapshot: person.national_id.clone(),
            kind_snapshot: person.kind,
            contractor_snapshot: person.contractor.clone(),
            voided_at: None,
            voided_by: None,
            void_reason: None,
            created_at: now,
        };
        assert!(session.is_open());

        session.exit_at = Some(now);
        assert!(!session.is_open());

        session.exit_at = None;
        session.voided_at = Some(now);
        assert!(!session.is_open());
        assert!(session.is_voided());
    }

    #[test]
    fn test_settings_defaults() {
        let s = SiteSettings::default_for(Uuid::new_v4());
        assert_eq!(s.warn_hours, 10.0);
        assert_eq!(s.crit_hours, 12.0);
    }

    #[test]
    fn test_kind_serde_form() {
        assert_eq!(serde_json::to_string(&PersonKind::Worker).unwrap(), "\"worker\"");
        assert_eq!(
            serde_json::to_string(&AuditAction::SessionForceClosed).unwrap(),
            "\"session_force_closed\""
        );
    }
}
