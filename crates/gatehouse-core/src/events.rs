//! Change notification: broadcast bus for session and settings events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::AccessSession;

/// Default channel capacity; slower subscribers skip events past this.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessEventKind {
    SessionOpened,
    SessionClosed,
    SessionVoided,
    SessionAmended,
    SettingsUpdated,
}

/// One accepted state change. Dashboards refresh on these instead of
/// polling; exactly one event is published per accepted transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub site_id: Uuid,
    pub kind: AccessEventKind,
    pub session_id: Option<Uuid>,
    pub person_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl AccessEvent {
    pub fn for_session(kind: AccessEventKind, session: &AccessSession) -> Self {
        Self {
            site_id: session.site_id,
            kind,
            session_id: Some(session.session_id),
            person_id: Some(session.person_id),
            at: Utc::now(),
        }
    }

    pub fn settings(site_id: Uuid) -> Self {
        Self {
            site_id,
            kind: AccessEventKind::SettingsUpdated,
            session_id: None,
            person_id: None,
            at: Utc::now(),
        }
    }
}

/// Broadcast bus for access events.
///
/// Cloning is cheap; all clones share one channel. Emission never blocks
/// and never fails: with no subscribers the event is simply dropped.
#[derive(Clone)]
pub struct AccessEventBus {
    tx: broadcast::Sender<AccessEvent>,
}

impl AccessEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: AccessEvent) {
        tracing::trace!(site = %event.site_id, kind = ?event.kind, "access event");
        let _ = self.tx.send(event);
    }

    /// Subscribe to every event from every site.
    pub fn subscribe_all(&self) -> broadcast::Receiver<AccessEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to events for one site only.
    pub fn subscribe(&self, site_id: Uuid) -> SiteEvents {
        SiteEvents { site_id, rx: self.tx.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AccessEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// A site-filtered subscription handle.
pub struct SiteEvents {
    site_id: Uuid,
    rx: broadcast::Receiver<AccessEvent>,
}

impl SiteEvents {
    /// Next event for the subscribed site. Returns `None` once every bus
    /// clone is dropped. A lagged gap is skipped with a warning.
    pub async fn recv(&mut self) -> Option<AccessEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.site_id == self.site_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        site = %self.site_id,
                        missed,
                        "event subscriber lagged; skipping"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(site_id: Uuid, kind: AccessEventKind) -> AccessEvent {
        AccessEvent { site_id, kind, session_id: None, person_id: None, at: Utc::now() }
    }

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = AccessEventBus::new(8);
        let site = Uuid::new_v4();
        let mut rx = bus.subscribe_all();

        bus.emit(event(site, AccessEventKind::SessionOpened));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.site_id, site);
        assert_eq!(got.kind, AccessEventKind::SessionOpened);
    }

    #[tokio::test]
    async fn test_site_subscription_filters_other_sites() {
        let bus = AccessEventBus::new(8);
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut rx = bus.subscribe(mine);

        bus.emit(event(other, AccessEventKind::SessionOpened));
        bus.emit(event(mine, AccessEventKind::SessionClosed));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.site_id, mine);
        assert_eq!(got.kind, AccessEventKind::SessionClosed);
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_bus_drop() {
        let bus = AccessEventBus::new(8);
        let mut rx = bus.subscribe(Uuid::new_v4());
        drop(bus);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = AccessEventBus::new(8);
        bus.emit(event(Uuid::new_v4(), AccessEventKind::SettingsUpdated));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
