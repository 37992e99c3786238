//! Shared mocks and a wired-up coordinator for the integration suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald::announce::{Announcement, Announcer, ThreadDisposition};
use herald::error::{HeraldError, Result};
use herald::protocol::{CombatPayload, ServerEvent};
use herald::provider::{EventChanges, EventProvider, EventSnapshot, EventSpec, EventStatus};
use herald::session::{ChannelId, EventId, OrgId, Session, UserId};
use herald::store::{InMemoryCharacterStore, InMemorySessionStore, InMemorySettingsStore, OrgSettings};
use herald::{CoordinatorConfig, HubConfig, LiveSessionHub, SessionCoordinator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const SESSION_CHANNEL: ChannelId = 100;
pub const SCHEDULING_CHANNEL: ChannelId = 101;
pub const VOICE_CHANNEL: ChannelId = 102;
pub const COMBAT_CHANNEL: ChannelId = 103;

#[derive(Debug, Clone)]
pub struct MockEvent {
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    pub created_by_us: bool,
    pub title: String,
}

#[derive(Default)]
struct ProviderState {
    next_id: EventId,
    events: HashMap<EventId, MockEvent>,
}

/// Scheduling provider backed by an in-memory event table.
#[derive(Default)]
pub struct MockProvider {
    inner: Mutex<ProviderState>,
    pub starts: AtomicUsize,
}

impl MockProvider {
    pub fn status_of(&self, event_id: EventId) -> Option<EventStatus> {
        self.inner
            .lock()
            .unwrap()
            .events
            .get(&event_id)
            .map(|e| e.status)
    }

    /// Pre-seeds an event, e.g. an already-active one for reconnect tests.
    pub fn seed(&self, event: MockEvent) -> EventId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.events.insert(id, event);
        id
    }

    fn snapshot(id: EventId, event: &MockEvent) -> EventSnapshot {
        EventSnapshot {
            id,
            status: event.status,
            start_time: event.start_time,
            created_by_us: event.created_by_us,
        }
    }
}

#[async_trait]
impl EventProvider for MockProvider {
    async fn create_event(&self, _org_id: OrgId, spec: EventSpec) -> Result<EventId> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.events.insert(
            id,
            MockEvent {
                status: EventStatus::Scheduled,
                start_time: spec.start_time,
                created_by_us: true,
                title: spec.title,
            },
        );
        Ok(id)
    }

    async fn edit_event(
        &self,
        _org_id: OrgId,
        event_id: EventId,
        changes: EventChanges,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner
            .events
            .get_mut(&event_id)
            .ok_or_else(|| HeraldError::Provider(format!("event {event_id} not found")))?;
        if let Some(title) = changes.title {
            event.title = title;
        }
        if let Some(start_time) = changes.start_time {
            event.start_time = start_time;
        }
        Ok(())
    }

    async fn start_event(&self, _org_id: OrgId, event_id: EventId) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.set_status(event_id, EventStatus::Active)
    }

    async fn complete_event(&self, _org_id: OrgId, event_id: EventId) -> Result<()> {
        self.set_status(event_id, EventStatus::Completed)
    }

    async fn cancel_event(&self, _org_id: OrgId, event_id: EventId) -> Result<()> {
        self.set_status(event_id, EventStatus::Canceled)
    }

    async fn get_event(&self, _org_id: OrgId, event_id: EventId) -> Result<Option<EventSnapshot>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .get(&event_id)
            .map(|e| Self::snapshot(event_id, e)))
    }

    async fn list_events(&self, _org_id: OrgId) -> Result<Vec<EventSnapshot>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .iter()
            .map(|(id, e)| Self::snapshot(*id, e))
            .collect())
    }
}

impl MockProvider {
    fn set_status(&self, event_id: EventId, status: EventStatus) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner
            .events
            .get_mut(&event_id)
            .ok_or_else(|| HeraldError::Provider(format!("event {event_id} not found")))?;
        event.status = status;
        Ok(())
    }
}

/// Announcement surface that records everything it is asked to post.
#[derive(Default)]
pub struct MockAnnouncer {
    next_id: AtomicI64,
    pub notices: Mutex<Vec<(ChannelId, String)>>,
    pub dms: Mutex<Vec<(UserId, String)>>,
    pub combat: Mutex<Vec<(ChannelId, CombatPayload)>>,
    pub removed: Mutex<Vec<String>>,
}

impl MockAnnouncer {
    fn next(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1000
    }
}

#[async_trait]
impl Announcer for MockAnnouncer {
    async fn post_announcement(
        &self,
        _org_id: OrgId,
        _session: &Session,
        _body: &str,
        channel_override: Option<ChannelId>,
    ) -> Result<Announcement> {
        Ok(match channel_override {
            Some(channel) => Announcement {
                channel_or_thread_id: channel,
                message_id: self.next(),
                created_thread: false,
            },
            None => {
                // Default surface creates a thread whose id doubles as the
                // starter message id.
                let id = self.next();
                Announcement {
                    channel_or_thread_id: id,
                    message_id: id,
                    created_thread: true,
                }
            }
        })
    }

    async fn edit_announcement(
        &self,
        _org_id: OrgId,
        _session: &Session,
        _body: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn rename_thread(&self, _org_id: OrgId, _thread_id: ChannelId, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_announcement(
        &self,
        _org_id: OrgId,
        session: &Session,
        _disposition: Option<ThreadDisposition>,
    ) -> Result<()> {
        self.removed.lock().unwrap().push(session.title.clone());
        Ok(())
    }

    async fn post_notice(&self, _org_id: OrgId, channel_id: ChannelId, text: &str) -> Result<()> {
        self.notices
            .lock()
            .unwrap()
            .push((channel_id, text.to_string()));
        Ok(())
    }

    async fn post_combat(
        &self,
        _org_id: OrgId,
        channel_id: ChannelId,
        payload: &CombatPayload,
    ) -> Result<()> {
        self.combat
            .lock()
            .unwrap()
            .push((channel_id, payload.clone()));
        Ok(())
    }

    async fn dm_owner(&self, _org_id: OrgId, owner_id: UserId, text: &str) -> Result<()> {
        self.dms.lock().unwrap().push((owner_id, text.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub coordinator: SessionCoordinator,
    pub sessions: Arc<InMemorySessionStore>,
    pub settings: Arc<InMemorySettingsStore>,
    pub characters: Arc<InMemoryCharacterStore>,
    pub provider: Arc<MockProvider>,
    pub announcer: Arc<MockAnnouncer>,
    pub hub: Arc<LiveSessionHub>,
}

pub fn token(org_id: OrgId) -> String {
    format!("tok{org_id}")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn harness(org_id: OrgId) -> Harness {
    init_tracing();
    let sessions = Arc::new(InMemorySessionStore::new());
    let settings = Arc::new(InMemorySettingsStore::new());
    settings.insert(OrgSettings {
        id: org_id,
        auth_token: token(org_id),
        session_channel_id: SESSION_CHANNEL,
        scheduling_channel_id: SCHEDULING_CHANNEL,
        voice_channel_id: VOICE_CHANNEL,
        combat_channel_id: Some(COMBAT_CHANNEL),
        owner_xp: 0,
        starting_level: 1,
        timezone: "UTC".into(),
        pending_xp: None,
    });
    let characters = Arc::new(InMemoryCharacterStore::new());
    let provider = Arc::new(MockProvider::default());
    let announcer = Arc::new(MockAnnouncer::default());
    let hub = Arc::new(LiveSessionHub::new(HubConfig::default()));
    let coordinator = SessionCoordinator::new(
        sessions.clone(),
        settings.clone(),
        characters.clone(),
        provider.clone(),
        announcer.clone(),
        hub.clone(),
        CoordinatorConfig::default(),
    );
    Harness {
        coordinator,
        sessions,
        settings,
        characters,
        provider,
        announcer,
        hub,
    }
}

pub fn draft(org_id: OrgId, title: &str, start: DateTime<Utc>) -> Session {
    Session::builder()
        .org_id(org_id)
        .title(title)
        .owner_id(42)
        .start_time(start)
        .hook("Rescue the caravan")
        .max_players(4)
        .build()
        .unwrap()
}

pub async fn connect(h: &Harness, conn_id: &str, org_id: OrgId) -> mpsc::Receiver<ServerEvent> {
    let (tx, rx) = mpsc::channel(16);
    h.coordinator
        .on_connect(conn_id.to_string(), &token(org_id), tx)
        .await
        .unwrap();
    rx
}
