//! Presence aggregation: who is inside, for how long, and today's counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    store::AccessStore,
    types::{AccessSession, SiteSettings},
};

/// How long an open session has run, against the site's thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Ok,
    Warn,
    Crit,
}

pub fn classify_hours(hours: f64, settings: &SiteSettings) -> PresenceStatus {
    if hours >= settings.crit_hours {
        PresenceStatus::Crit
    } else if hours >= settings.warn_hours {
        PresenceStatus::Warn
    } else {
        PresenceStatus::Ok
    }
}

/// One open session with its derived presence fields.
#[derive(Debug, Clone, Serialize)]
pub struct InsideRecord {
    pub session: AccessSession,
    pub hours: f64,
    pub status: PresenceStatus,
}

/// Aggregated dashboard state for one site.
#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub site_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub inside_now: usize,
    /// Non-voided sessions opened since day start.
    pub entries_today: usize,
    /// Of today's sessions, how many have already exited.
    pub exits_today: usize,
    pub warn_count: usize,
    pub crit_count: usize,
    /// Open sessions sorted by hours inside, longest first.
    pub inside: Vec<InsideRecord>,
}

/// Pure aggregation over already-loaded rows.
pub fn summarize(
    site_id: Uuid,
    open: Vec<AccessSession>,
    today: &[AccessSession],
    settings: &SiteSettings,
    now: DateTime<Utc>,
) -> SiteSummary {
    let mut inside: Vec<InsideRecord> = open
        .into_iter()
        .map(|session| {
            // Amendments can push entry_at past `now`; clamp instead of
            // reporting negative hours.
            let hours =
                ((now - session.entry_at).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
            let status = classify_hours(hours, settings);
            InsideRecord { session, hours, status }
        })
        .collect();
    inside.sort_by(|a, b| b.hours.partial_cmp(&a.hours).unwrap_or(std::cmp::Ordering::Equal));

    let warn_count = inside.iter().filter(|r| r.status == PresenceStatus::Warn).count();
    let crit_count = inside.iter().filter(|r| r.status == PresenceStatus::Crit).count();

    SiteSummary {
        site_id,
        generated_at: now,
        inside_now: inside.len(),
        entries_today: today.len(),
        exits_today: today.iter().filter(|s| s.exit_at.is_some()).count(),
        warn_count,
        crit_count,
        inside,
    }
}

/// Load and aggregate the dashboard state for a site.
pub async fn site_summary<S: AccessStore>(
    store: &S,
    site_id: Uuid,
    day_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<SiteSummary> {
    let settings = store.settings(site_id).await.map_err(Error::backend)?;
    let open = store.open_sessions(site_id).await.map_err(Error::backend)?;
    let today = store.sessions_since(site_id, day_start).await.map_err(Error::backend)?;
    Ok(summarize(site_id, open, &today, &settings, now))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::types::PersonKind;

    fn settings() -> SiteSettings {
        SiteSettings {
            site_id: Uuid::new_v4(),
            warn_hours: 10.0,
            crit_hours: 12.0,
            updated_at: Utc::now(),
        }
    }

    fn session(site_id: Uuid, entry_at: DateTime<Utc>, exit_at: Option<DateTime<Utc>>) -> AccessSession {
        AccessSession {
            session_id: Uuid::new_v4(),
            site_id,
            person_id: Uuid::new_v4(),
            entry_at,
            exit_at,
            entry_operator: None,
            exit_operator: None,
            note: None,
            name_snapshot: "Test Person".into(),
            national_id_snapshot: "1000000".into(),
            kind_snapshot: PersonKind::Worker,
            contractor_snapshot: None,
            voided_at: None,
            voided_by: None,
            void_reason: None,
            created_at: entry_at,
        }
    }

    #[test]
    fn test_classification_boundaries() {
        let s = settings();
        assert_eq!(classify_hours(0.0, &s), PresenceStatus::Ok);
        assert_eq!(classify_hours(9.99, &s), PresenceStatus::Ok);
        // Thresholds are inclusive.
        assert_eq!(classify_hours(10.0, &s), PresenceStatus::Warn);
        assert_eq!(classify_hours(11.99, &s), PresenceStatus::Warn);
        assert_eq!(classify_hours(12.0, &s), PresenceStatus::Crit);
        assert_eq!(classify_hours(20.0, &s), PresenceStatus::Crit);
    }

    #[test]
    fn test_summary_sorts_longest_first() {
        let s = settings();
        let now = Utc::now();
        let open = vec![
            session(s.site_id, now - Duration::hours(2), None),
            session(s.site_id, now - Duration::hours(11), None),
            session(s.site_id, now - Duration::hours(5), None),
        ];

        let summary = summarize(s.site_id, open, &[], &s, now);
        assert_eq!(summary.inside_now, 3);
        assert!(summary.inside[0].hours > summary.inside[1].hours);
        assert!(summary.inside[1].hours > summary.inside[2].hours);
        assert_eq!(summary.inside[0].status, PresenceStatus::Warn);
        assert_eq!(summary.warn_count, 1);
        assert_eq!(summary.crit_count, 0);
    }

    #[test]
    fn test_summary_today_counts() {
        let s = settings();
        let now = Utc::now();
        let today = vec![
            session(s.site_id, now - Duration::hours(3), Some(now - Duration::hours(1))),
            session(s.site_id, now - Duration::hours(2), None),
            session(s.site_id, now - Duration::hours(1), None),
        ];

        let summary = summarize(s.site_id, vec![], &today, &s, now);
        assert_eq!(summary.entries_today, 3);
        assert_eq!(summary.exits_today, 1);
        assert_eq!(summary.inside_now, 0);
    }

    #[test]
    fn test_future_entry_clamps_to_zero_hours() {
        let s = settings();
        let now = Utc::now();
        let open = vec![session(s.site_id, now + Duration::minutes(5), None)];

        let summary = summarize(s.site_id, open, &[], &s, now);
        assert_eq!(summary.inside[0].hours, 0.0);
        assert_eq!(summary.inside[0].status, PresenceStatus::Ok);
    }
}
