//! Row codecs: text encodings, descriptor sealing, raw row structs.
//!
//! UUIDs are stored as hyphenated text, timestamps as RFC 3339 UTC text,
//! descriptors as little-endian f32 blobs (sealed when a cipher is
//! configured).

use chrono::{DateTime, Utc};
use gatehouse_core::{
    AccessSession, AuditAction, AuditRecord, Descriptor, Person, PersonKind, Site, SiteSettings,
};
use uuid::Uuid;

use crate::{
    crypto::DescriptorCipher,
    error::{Error, Result},
};

pub fn encode_uuid(id: Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(s)?)
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_kind(kind: PersonKind) -> &'static str {
    kind.as_str()
}

pub fn decode_kind(s: &str) -> Result<PersonKind> {
    match s {
        "worker" => Ok(PersonKind::Worker),
        "visitor" => Ok(PersonKind::Visitor),
        other => Err(Error::UnknownKind(other.to_owned())),
    }
}

pub fn encode_action(action: AuditAction) -> &'static str {
    action.as_str()
}

pub fn decode_action(s: &str) -> Result<AuditAction> {
    match s {
        "session_force_closed" => Ok(AuditAction::SessionForceClosed),
        "session_voided" => Ok(AuditAction::SessionVoided),
        "session_amended" => Ok(AuditAction::SessionAmended),
        "settings_updated" => Ok(AuditAction::SettingsUpdated),
        "descriptor_updated" => Ok(AuditAction::DescriptorUpdated),
        other => Err(Error::UnknownAction(other.to_owned())),
    }
}

/// Encode a descriptor blob, sealing it when a cipher is configured.
pub fn encode_descriptor(
    descriptor: &Descriptor,
    cipher: Option<&DescriptorCipher>,
) -> Result<Vec<u8>> {
    let plain = descriptor.to_bytes();
    match cipher {
        Some(c) => c.seal(&plain),
        None => Ok(plain),
    }
}

/// Decode a descriptor blob, unsealing it when a cipher is configured.
pub fn decode_descriptor(blob: &[u8], cipher: Option<&DescriptorCipher>) -> Result<Descriptor> {
    let plain = match cipher {
        Some(c) => c.open(blob)?,
        None => blob.to_vec(),
    };
    Ok(Descriptor::from_bytes(&plain)?)
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

pub struct RawSite {
    pub site_id: String,
    pub name: String,
    pub created_at: String,
}

impl RawSite {
    pub fn into_site(self) -> Result<Site> {
        Ok(Site {
            site_id: decode_uuid(&self.site_id)?,
            name: self.name,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub struct RawPerson {
    pub person_id: String,
    pub site_id: String,
    pub national_id: String,
    pub full_name: String,
    pub kind: String,
    pub contractor: Option<String>,
    pub descriptor: Option<Vec<u8>>,
    pub created_at: String,
    pub updated_at: String,
}

impl RawPerson {
    /// Decode a person row. An undecodable descriptor is dropped with a
    /// warning rather than failing the row, so the person stays visible
    /// to manual search.
    pub fn into_person(self, cipher: Option<&DescriptorCipher>) -> Result<Person> {
        let descriptor = match self.descriptor {
            Some(blob) => match decode_descriptor(&blob, cipher) {
                Ok(d) => Some(d),
                Err(err) => {
                    tracing::warn!(
                        person = %self.person_id,
                        error = %err,
                        "dropping undecodable descriptor"
                    );
                    None
                }
            },
            None => None,
        };
        Ok(Person {
            person_id: decode_uuid(&self.person_id)?,
            site_id: decode_uuid(&self.site_id)?,
            national_id: self.national_id,
            full_name: self.full_name,
            kind: decode_kind(&self.kind)?,
            contractor: self.contractor,
            descriptor,
            created_at: decode_dt(&self.created_at)?,
            updated_at: decode_dt(&self.updated_at)?,
        })
    }
}

pub struct RawSession {
    pub session_id: String,
    pub site_id: String,
    pub person_id: String,
    pub entry_at: String,
    pub exit_at: Option<String>,
    pub entry_operator: Option<String>,
    pub exit_operator: Option<String>,
    pub note: Option<String>,
    pub name_snapshot: String,
    pub national_id_snapshot: String,
    pub kind_snapshot: String,
    pub contractor_snapshot: Option<String>,
    pub voided_at: Option<String>,
    pub voided_by: Option<String>,
    pub void_reason: Option<String>,
    pub created_at: String,
}

impl RawSession {
    pub fn into_session(self) -> Result<AccessSession> {
        Ok(AccessSession {
            session_id: decode_uuid(&self.session_id)?,
            site_id: decode_uuid(&self.site_id)?,
            person_id: decode_uuid(&self.person_id)?,
            entry_at: decode_dt(&self.entry_at)?,
            exit_at: self.exit_at.as_deref().map(decode_dt).transpose()?,
            entry_operator: self.entry_operator,
            exit_operator: self.exit_operator,
            note: self.note,
            name_snapshot: self.name_snapshot,
            national_id_snapshot: self.national_id_snapshot,
            kind_snapshot: decode_kind(&self.kind_snapshot)?,
            contractor_snapshot: self.contractor_snapshot,
            voided_at: self.voided_at.as_deref().map(decode_dt).transpose()?,
            voided_by: self.voided_by,
            void_reason: self.void_reason,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub struct RawSettings {
    pub site_id: String,
    pub warn_hours: f64,
    pub crit_hours: f64,
    pub updated_at: String,
}

impl RawSettings {
    pub fn into_settings(self) -> Result<SiteSettings> {
        Ok(SiteSettings {
            site_id: decode_uuid(&self.site_id)?,
            warn_hours: self.warn_hours,
            crit_hours: self.crit_hours,
            updated_at: decode_dt(&self.updated_at)?,
        })
    }
}

pub struct RawAudit {
    pub audit_id: String,
    pub site_id: String,
    pub operator: Option<String>,
    pub action: String,
    pub entity_id: Option<String>,
    pub before_json: Option<String>,
    pub after_json: Option<String>,
    pub note: Option<String>,
    pub recorded_at: String,
}

impl RawAudit {
    pub fn into_audit(self) -> Result<AuditRecord> {
        Ok(AuditRecord {
            audit_id: decode_uuid(&self.audit_id)?,
            site_id: decode_uuid(&self.site_id)?,
            operator: self.operator,
            action: decode_action(&self.action)?,
            entity_id: self.entity_id.as_deref().map(decode_uuid).transpose()?,
            before: self.before_json.as_deref().map(serde_json::from_str).transpose()?,
            after: self.after_json.as_deref().map(serde_json::from_str).transpose()?,
            note: self.note,
            recorded_at: decode_dt(&self.recorded_at)?,
        })
    }
}
