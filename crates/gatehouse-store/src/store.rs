//! [`SqliteStore`]: the SQLite implementation of `AccessStore`.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use gatehouse_core::{
    AccessSession, AccessStore, AuditRecord, Candidate, Descriptor, NewAuditRecord, NewPerson,
    NewSession, Person, PersonStatus, SessionAmendment, Site, SiteSettings,
};

use crate::{
    crypto::DescriptorCipher,
    encode::{
        decode_descriptor, decode_uuid, encode_action, encode_descriptor, encode_dt, encode_kind,
        encode_uuid, RawAudit, RawPerson, RawSession, RawSettings, RawSite,
    },
    schema::SCHEMA,
    Error, Result,
};

const PERSON_COLUMNS: &str = "person_id, site_id, national_id, full_name, kind, contractor, \
                              descriptor, created_at, updated_at";

const SESSION_COLUMNS: &str = "session_id, site_id, person_id, entry_at, exit_at, \
                               entry_operator, exit_operator, note, name_snapshot, \
                               national_id_snapshot, kind_snapshot, contractor_snapshot, \
                               voided_at, voided_by, void_reason, created_at";

fn person_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPerson> {
    Ok(RawPerson {
        person_id: row.get(0)?,
        site_id: row.get(1)?,
        national_id: row.get(2)?,
        full_name: row.get(3)?,
        kind: row.get(4)?,
        contractor: row.get(5)?,
        descriptor: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        session_id: row.get(0)?,
        site_id: row.get(1)?,
        person_id: row.get(2)?,
        entry_at: row.get(3)?,
        exit_at: row.get(4)?,
        entry_operator: row.get(5)?,
        exit_operator: row.get(6)?,
        note: row.get(7)?,
        name_snapshot: row.get(8)?,
        national_id_snapshot: row.get(9)?,
        kind_snapshot: row.get(10)?,
        contractor_snapshot: row.get(11)?,
        voided_at: row.get(12)?,
        voided_by: row.get(13)?,
        void_reason: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn is_unique_violation(err: &tokio_rusqlite::Error) -> bool {
    matches!(
        err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// A Gatehouse access store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. With a
/// cipher configured, descriptor blobs are sealed before they reach the
/// database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
    cipher: Option<DescriptorCipher>,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>, cipher: Option<DescriptorCipher>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn, cipher };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store, useful for testing.
    pub async fn open_in_memory(cipher: Option<DescriptorCipher>) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn, cipher };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    fn cipher(&self) -> Option<&DescriptorCipher> {
        self.cipher.as_ref()
    }

    async fn session_where(
        &self,
        condition: &str,
        params: Vec<String>,
    ) -> Result<Option<AccessSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {condition}");
        let raw: Option<RawSession> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(&sql, rusqlite::params_from_iter(params), session_from_row)
                    .optional()?)
            })
            .await?;
        raw.map(RawSession::into_session).transpose()
    }

    async fn sessions_where(
        &self,
        condition_and_tail: &str,
        params: Vec<String>,
    ) -> Result<Vec<AccessSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {condition_and_tail}");
        let raws: Vec<RawSession> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), session_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawSession::into_session).collect()
    }

    /// Decode `(person_id, blob)` rows into candidates, skipping rows whose
    /// descriptor fails to decode so one bad blob never blocks the gate.
    fn decode_candidates(&self, rows: Vec<(String, Vec<u8>)>) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::with_capacity(rows.len());
        for (id_str, blob) in rows {
            let person_id = decode_uuid(&id_str)?;
            match decode_descriptor(&blob, self.cipher()) {
                Ok(descriptor) => candidates.push(Candidate { person_id, descriptor }),
                Err(err) => {
                    tracing::warn!(
                        person = %person_id,
                        error = %err,
                        "skipping candidate with undecodable descriptor"
                    );
                }
            }
        }
        Ok(candidates)
    }
}

impl AccessStore for SqliteStore {
    type Error = Error;

    // ── Sites ────────────────────────────────────────────────────────────

    async fn create_site(&self, name: String) -> Result<Site> {
        let site = Site { site_id: Uuid::new_v4(), name, created_at: Utc::now() };

        let id_str = encode_uuid(site.site_id);
        let name_str = site.name.clone();
        let at_str = encode_dt(site.created_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sites (site_id, name, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id_str, name_str, at_str],
                )?;
                Ok(())
            })
            .await?;

        Ok(site)
    }

    async fn get_site(&self, site_id: Uuid) -> Result<Option<Site>> {
        let id_str = encode_uuid(site_id);

        let raw: Option<RawSite> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT site_id, name, created_at FROM sites WHERE site_id = ?1",
                        rusqlite::params![id_str],
                        |row| {
                            Ok(RawSite {
                                site_id: row.get(0)?,
                                name: row.get(1)?,
                                created_at: row.get(2)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await?;

        raw.map(RawSite::into_site).transpose()
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let raws: Vec<RawSite> = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT site_id, name, created_at FROM sites ORDER BY name")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(RawSite {
                            site_id: row.get(0)?,
                            name: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawSite::into_site).collect()
    }

    // ── People ───────────────────────────────────────────────────────────

    async fn add_person(&self, input: NewPerson) -> Result<Person> {
        let now = Utc::now();
        let person = Person {
            person_id: Uuid::new_v4(),
            site_id: input.site_id,
            national_id: input.national_id,
            full_name: input.full_name,
            kind: input.kind,
            contractor: input.contractor,
            descriptor: input.descriptor,
            created_at: now,
            updated_at: now,
        };

        let id_str = encode_uuid(person.person_id);
        let site_str = encode_uuid(person.site_id);
        let national_id = person.national_id.clone();
        let full_name = person.full_name.clone();
        let kind_str = encode_kind(person.kind).to_owned();
        let contractor = person.contractor.clone();
        let blob = person
            .descriptor
            .as_ref()
            .map(|d| encode_descriptor(d, self.cipher()))
            .transpose()?;
        let at_str = encode_dt(now);

        let result = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO people (
                         person_id, site_id, national_id, full_name, kind,
                         contractor, descriptor, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    rusqlite::params![
                        id_str,
                        site_str,
                        national_id,
                        full_name,
                        kind_str,
                        contractor,
                        blob,
                        at_str,
                    ],
                )?;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => Ok(person),
            Err(err) if is_unique_violation(&err) => {
                Err(Error::NationalIdTaken(person.national_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_person(&self, person_id: Uuid) -> Result<Option<Person>> {
        let id_str = encode_uuid(person_id);

        let raw: Option<RawPerson> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {PERSON_COLUMNS} FROM people WHERE person_id = ?1"),
                        rusqlite::params![id_str],
                        person_from_row,
                    )
                    .optional()?)
            })
            .await?;

        raw.map(|r| r.into_person(self.cipher())).transpose()
    }

    async fn list_people(&self, site_id: Uuid) -> Result<Vec<Person>> {
        let site_str = encode_uuid(site_id);

        let raws: Vec<RawPerson> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PERSON_COLUMNS} FROM people WHERE site_id = ?1 ORDER BY full_name"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![site_str], person_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(|r| r.into_person(self.cipher())).collect()
    }

    async fn update_descriptor(
        &self,
        person_id: Uuid,
        descriptor: Option<Descriptor>,
    ) -> Result<Option<Person>> {
        let id_str = encode_uuid(person_id);
        let blob = descriptor
            .as_ref()
            .map(|d| encode_descriptor(d, self.cipher()))
            .transpose()?;
        let at_str = encode_dt(Utc::now());

        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE people SET descriptor = ?2, updated_at = ?3 WHERE person_id = ?1",
                    rusqlite::params![id_str, blob, at_str],
                )?)
            })
            .await?;

        if updated == 0 {
            return Ok(None);
        }
        self.get_person(person_id).await
    }

    async fn search_people(
        &self,
        site_id: Uuid,
        query: String,
        limit: u32,
    ) -> Result<Vec<PersonStatus>> {
        let site_str = encode_uuid(site_id);
        let pattern = format!("%{query}%");

        let rows: Vec<(RawPerson, Option<String>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PERSON_COLUMNS},
                            (SELECT s.session_id FROM sessions s
                              WHERE s.site_id = p.site_id
                                AND s.person_id = p.person_id
                                AND s.exit_at IS NULL
                                AND s.voided_at IS NULL) AS open_session_id
                     FROM people p
                     WHERE p.site_id = ?1
                       AND (p.national_id = ?2 OR p.full_name LIKE ?3)
                     ORDER BY p.full_name
                     LIMIT ?4"
                ))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![site_str, query, pattern, limit],
                        |row| Ok((person_from_row(row)?, row.get(9)?)),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(raw, open_id)| {
                Ok(PersonStatus {
                    person: raw.into_person(self.cipher())?,
                    open_session_id: open_id.as_deref().map(decode_uuid).transpose()?,
                })
            })
            .collect()
    }

    // ── Candidate pools ──────────────────────────────────────────────────

    async fn entry_candidates(&self, site_id: Uuid) -> Result<Vec<Candidate>> {
        let site_str = encode_uuid(site_id);

        let rows: Vec<(String, Vec<u8>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT person_id, descriptor FROM people
                     WHERE site_id = ?1 AND descriptor IS NOT NULL
                     ORDER BY created_at, person_id",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![site_str], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        self.decode_candidates(rows)
    }

    async fn exit_candidates(&self, site_id: Uuid) -> Result<Vec<Candidate>> {
        let site_str = encode_uuid(site_id);

        let rows: Vec<(String, Vec<u8>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.person_id, p.descriptor
                     FROM sessions s
                     JOIN people p ON p.person_id = s.person_id
                     WHERE s.site_id = ?1
                       AND s.exit_at IS NULL
                       AND s.voided_at IS NULL
                       AND p.descriptor IS NOT NULL
                     ORDER BY s.entry_at, p.person_id",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![site_str], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        self.decode_candidates(rows)
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    async fn insert_session(&self, input: NewSession) -> Result<AccessSession> {
        let session = AccessSession {
            session_id: Uuid::new_v4(),
            site_id: input.site_id,
            person_id: input.person_id,
            entry_at: input.entry_at,
            exit_at: None,
            entry_operator: input.entry_operator,
            exit_operator: None,
            note: input.note,
            name_snapshot: input.name_snapshot,
            national_id_snapshot: input.national_id_snapshot,
            kind_snapshot: input.kind_snapshot,
            contractor_snapshot: input.contractor_snapshot,
            voided_at: None,
            voided_by: None,
            void_reason: None,
            created_at: Utc::now(),
        };

        let id_str = encode_uuid(session.session_id);
        let site_str = encode_uuid(session.site_id);
        let person_str = encode_uuid(session.person_id);
        let entry_str = encode_dt(session.entry_at);
        let entry_operator = session.entry_operator.clone();
        let note = session.note.clone();
        let name_snapshot = session.name_snapshot.clone();
        let national_id_snapshot = session.national_id_snapshot.clone();
        let kind_str = encode_kind(session.kind_snapshot).to_owned();
        let contractor_snapshot = session.contractor_snapshot.clone();
        let created_str = encode_dt(session.created_at);

        let result = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (
                         session_id, site_id, person_id, entry_at, exit_at,
                         entry_operator, exit_operator, note, name_snapshot,
                         national_id_snapshot, kind_snapshot, contractor_snapshot,
                         voided_at, voided_by, void_reason, created_at
                     ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, NULL, ?6, ?7, ?8, ?9, ?10,
                               NULL, NULL, NULL, ?11)",
                    rusqlite::params![
                        id_str,
                        site_str,
                        person_str,
                        entry_str,
                        entry_operator,
                        note,
                        name_snapshot,
                        national_id_snapshot,
                        kind_str,
                        contractor_snapshot,
                        created_str,
                    ],
                )?;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => Ok(session),
            Err(err) if is_unique_violation(&err) => {
                Err(Error::OpenSessionConflict(session.person_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<AccessSession>> {
        self.session_where("session_id = ?1", vec![encode_uuid(session_id)])
            .await
    }

    async fn open_session_for(
        &self,
        site_id: Uuid,
        person_id: Uuid,
    ) -> Result<Option<AccessSession>> {
        // The partial unique index guarantees at most one row here.
        self.session_where(
            "site_id = ?1 AND person_id = ?2 AND exit_at IS NULL AND voided_at IS NULL",
            vec![encode_uuid(site_id), encode_uuid(person_id)],
        )
        .await
    }

    async fn open_sessions(&self, site_id: Uuid) -> Result<Vec<AccessSession>> {
        self.sessions_where(
            "site_id = ?1 AND exit_at IS NULL AND voided_at IS NULL ORDER BY entry_at DESC",
            vec![encode_uuid(site_id)],
        )
        .await
    }

    async fn last_entry_after(
        &self,
        site_id: Uuid,
        person_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<AccessSession>> {
        self.session_where(
            "site_id = ?1 AND person_id = ?2 AND voided_at IS NULL AND entry_at >= ?3
             ORDER BY entry_at DESC LIMIT 1",
            vec![encode_uuid(site_id), encode_uuid(person_id), encode_dt(cutoff)],
        )
        .await
    }

    async fn last_exit_after(
        &self,
        site_id: Uuid,
        person_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<AccessSession>> {
        self.session_where(
            "site_id = ?1 AND person_id = ?2 AND voided_at IS NULL AND exit_at >= ?3
             ORDER BY exit_at DESC LIMIT 1",
            vec![encode_uuid(site_id), encode_uuid(person_id), encode_dt(cutoff)],
        )
        .await
    }

    async fn close_session(
        &self,
        session_id: Uuid,
        exit_at: DateTime<Utc>,
        operator: Option<String>,
    ) -> Result<Option<AccessSession>> {
        let id_str = encode_uuid(session_id);
        let exit_str = encode_dt(exit_at);

        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE sessions SET exit_at = ?2, exit_operator = ?3
                     WHERE session_id = ?1 AND exit_at IS NULL AND voided_at IS NULL",
                    rusqlite::params![id_str, exit_str, operator],
                )?)
            })
            .await?;

        if updated == 0 {
            return Ok(None);
        }
        self.get_session(session_id).await
    }

    async fn void_session(
        &self,
        session_id: Uuid,
        voided_at: DateTime<Utc>,
        voided_by: Option<String>,
        reason: String,
    ) -> Result<Option<AccessSession>> {
        let id_str = encode_uuid(session_id);
        let at_str = encode_dt(voided_at);

        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE sessions SET voided_at = ?2, voided_by = ?3, void_reason = ?4
                     WHERE session_id = ?1 AND voided_at IS NULL",
                    rusqlite::params![id_str, at_str, voided_by, reason],
                )?)
            })
            .await?;

        if updated == 0 {
            return Ok(None);
        }
        self.get_session(session_id).await
    }

    async fn amend_session(
        &self,
        session_id: Uuid,
        amendment: SessionAmendment,
    ) -> Result<Option<AccessSession>> {
        let id_str = encode_uuid(session_id);
        let entry_str = amendment.entry_at.map(encode_dt);
        let exit_str = amendment.exit_at.map(encode_dt);
        let note = amendment.note;

        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE sessions SET
                         entry_at = COALESCE(?2, entry_at),
                         exit_at  = COALESCE(?3, exit_at),
                         note     = COALESCE(?4, note)
                     WHERE session_id = ?1 AND voided_at IS NULL",
                    rusqlite::params![id_str, entry_str, exit_str, note],
                )?)
            })
            .await?;

        if updated == 0 {
            return Ok(None);
        }
        self.get_session(session_id).await
    }

    async fn sessions_since(
        &self,
        site_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<AccessSession>> {
        self.sessions_where(
            "site_id = ?1 AND voided_at IS NULL AND entry_at >= ?2 ORDER BY entry_at DESC",
            vec![encode_uuid(site_id), encode_dt(since)],
        )
        .await
    }

    async fn session_history(
        &self,
        site_id: Uuid,
        query: String,
        limit: u32,
    ) -> Result<Vec<AccessSession>> {
        let site_str = encode_uuid(site_id);
        let pattern = format!("%{query}%");

        // Voided rows are included: supervisors need to see what was voided.
        let raws: Vec<RawSession> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE site_id = ?1
                       AND (national_id_snapshot = ?2 OR name_snapshot LIKE ?3)
                     ORDER BY entry_at DESC
                     LIMIT ?4"
                ))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![site_str, query, pattern, limit],
                        session_from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawSession::into_session).collect()
    }

    // ── Settings ─────────────────────────────────────────────────────────

    async fn settings(&self, site_id: Uuid) -> Result<SiteSettings> {
        let site_str = encode_uuid(site_id);

        let raw: Option<RawSettings> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT site_id, warn_hours, crit_hours, updated_at
                         FROM site_settings WHERE site_id = ?1",
                        rusqlite::params![site_str],
                        |row| {
                            Ok(RawSettings {
                                site_id: row.get(0)?,
                                warn_hours: row.get(1)?,
                                crit_hours: row.get(2)?,
                                updated_at: row.get(3)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await?;

        match raw {
            Some(raw) => raw.into_settings(),
            None => Ok(SiteSettings::default_for(site_id)),
        }
    }

    async fn update_settings(&self, settings: SiteSettings) -> Result<SiteSettings> {
        let stored = SiteSettings { updated_at: Utc::now(), ..settings };

        let site_str = encode_uuid(stored.site_id);
        let warn = stored.warn_hours;
        let crit = stored.crit_hours;
        let at_str = encode_dt(stored.updated_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO site_settings (site_id, warn_hours, crit_hours, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![site_str, warn, crit, at_str],
                )?;
                Ok(())
            })
            .await?;

        Ok(stored)
    }

    // ── Audit ────────────────────────────────────────────────────────────

    async fn record_audit(&self, input: NewAuditRecord) -> Result<AuditRecord> {
        let record = AuditRecord {
            audit_id: Uuid::new_v4(),
            site_id: input.site_id,
            operator: input.operator,
            action: input.action,
            entity_id: input.entity_id,
            before: input.before,
            after: input.after,
            note: input.note,
            recorded_at: Utc::now(),
        };

        let id_str = encode_uuid(record.audit_id);
        let site_str = encode_uuid(record.site_id);
        let operator = record.operator.clone();
        let action_str = encode_action(record.action).to_owned();
        let entity_str = record.entity_id.map(encode_uuid);
        let before_json = record.before.as_ref().map(serde_json::Value::to_string);
        let after_json = record.after.as_ref().map(serde_json::Value::to_string);
        let note = record.note.clone();
        let at_str = encode_dt(record.recorded_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO audit_events (
                         audit_id, site_id, operator, action, entity_id,
                         before_json, after_json, note, recorded_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        id_str,
                        site_str,
                        operator,
                        action_str,
                        entity_str,
                        before_json,
                        after_json,
                        note,
                        at_str,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(record)
    }

    async fn recent_audit(&self, site_id: Uuid, limit: u32) -> Result<Vec<AuditRecord>> {
        let site_str = encode_uuid(site_id);

        let raws: Vec<RawAudit> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT audit_id, site_id, operator, action, entity_id,
                            before_json, after_json, note, recorded_at
                     FROM audit_events
                     WHERE site_id = ?1
                     ORDER BY recorded_at DESC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![site_str, limit], |row| {
                        Ok(RawAudit {
                            audit_id: row.get(0)?,
                            site_id: row.get(1)?,
                            operator: row.get(2)?,
                            action: row.get(3)?,
                            entity_id: row.get(4)?,
                            before_json: row.get(5)?,
                            after_json: row.get(6)?,
                            note: row.get(7)?,
                            recorded_at: row.get(8)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawAudit::into_audit).collect()
    }
}
