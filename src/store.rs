use crate::error::{HeraldError, Result};
use crate::session::{CharacterId, EventId, OrgId, Session, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-organization settings owned by the persistence collaborator.
///
/// Only the fields the coordinator core reads are modeled; the settings
/// row may carry more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSettings {
    pub id: OrgId,
    /// Credential presented by live game-client connections
    pub auth_token: String,
    /// Where session announcements go by default
    pub session_channel_id: i64,
    /// Mirror channel for scheduling summaries
    pub scheduling_channel_id: i64,
    /// Location attached to external scheduled events
    pub voice_channel_id: i64,
    pub combat_channel_id: Option<i64>,
    /// Experience awarded to the runner's own character per session
    pub owner_xp: i64,
    pub starting_level: u8,
    pub timezone: String,
    /// Buffered, not-yet-delivered experience totals per character
    pub pending_xp: Option<HashMap<CharacterId, i64>>,
}

/// A character as known to the persistence collaborator: display name and
/// persisted experience total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: CharacterId,
    pub name: String,
    pub xp: i64,
}

/// Persistence seam for session records.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn get(&self, org_id: OrgId, title: &str) -> Result<Option<Session>>;
    async fn get_by_event(&self, org_id: OrgId, event_id: EventId) -> Result<Option<Session>>;
    /// Persists the session, assigning and returning the surrogate id when
    /// the record is new. `session.id` is updated in place.
    async fn save(&self, session: &mut Session) -> Result<SessionId>;
    async fn delete(&self, org_id: OrgId, session_id: SessionId) -> Result<()>;
}

/// Persistence seam for organization settings and the pending-XP ledger.
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    async fn get(&self, org_id: OrgId) -> Result<Option<OrgSettings>>;
    async fn find_by_token(&self, token: &str) -> Result<Option<OrgSettings>>;
    /// Merges `awards` into the organization's pending-XP map, keeping the
    /// larger value per character, persists, and returns the merged map.
    async fn merge_pending_xp(
        &self,
        org_id: OrgId,
        awards: &HashMap<CharacterId, i64>,
    ) -> Result<HashMap<CharacterId, i64>>;
    async fn clear_pending_xp(&self, org_id: OrgId) -> Result<()>;
}

/// Lookup seam for character records.
#[async_trait]
pub trait CharacterStore: Send + Sync + 'static {
    /// Resolves the given ids to records, in no particular order; unknown
    /// ids are omitted. Totals reflect persisted state only.
    async fn characters(&self, org_id: OrgId, ids: &[CharacterId]) -> Result<Vec<CharacterRecord>>;
}

/// In-memory [`SessionStore`] backing the test suite.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: Mutex<SessionRows>,
}

#[derive(Debug, Default)]
struct SessionRows {
    next_id: SessionId,
    rows: HashMap<SessionId, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, org_id: OrgId, title: &str) -> Result<Option<Session>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .values()
            .find(|s| s.org_id == org_id && s.title == title)
            .cloned())
    }

    async fn get_by_event(&self, org_id: OrgId, event_id: EventId) -> Result<Option<Session>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .values()
            .find(|s| s.org_id == org_id && s.event_id == Some(event_id))
            .cloned())
    }

    async fn save(&self, session: &mut Session) -> Result<SessionId> {
        let mut inner = self.inner.lock().unwrap();
        let id = match session.id {
            Some(id) => id,
            None => {
                inner.next_id += 1;
                inner.next_id
            }
        };
        session.id = Some(id);
        inner.rows.insert(id, session.clone());
        Ok(id)
    }

    async fn delete(&self, _org_id: OrgId, session_id: SessionId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .rows
            .remove(&session_id)
            .map(|_| ())
            .ok_or_else(|| HeraldError::Store(format!("session {session_id} not found")))
    }
}

/// In-memory [`SettingsStore`] backing the test suite.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    rows: Mutex<HashMap<OrgId, OrgSettings>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, settings: OrgSettings) {
        self.rows.lock().unwrap().insert(settings.id, settings);
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, org_id: OrgId) -> Result<Option<OrgSettings>> {
        Ok(self.rows.lock().unwrap().get(&org_id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<OrgSettings>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.auth_token == token)
            .cloned())
    }

    async fn merge_pending_xp(
        &self,
        org_id: OrgId,
        awards: &HashMap<CharacterId, i64>,
    ) -> Result<HashMap<CharacterId, i64>> {
        let mut rows = self.rows.lock().unwrap();
        let settings = rows
            .get_mut(&org_id)
            .ok_or_else(|| HeraldError::Store(format!("organization {org_id} not found")))?;
        let pending = settings.pending_xp.get_or_insert_with(HashMap::new);
        for (character, xp) in awards {
            let entry = pending.entry(character.clone()).or_insert(*xp);
            *entry = (*entry).max(*xp);
        }
        Ok(pending.clone())
    }

    async fn clear_pending_xp(&self, org_id: OrgId) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let settings = rows
            .get_mut(&org_id)
            .ok_or_else(|| HeraldError::Store(format!("organization {org_id} not found")))?;
        settings.pending_xp = None;
        Ok(())
    }
}

/// In-memory [`CharacterStore`] backing the test suite.
#[derive(Debug, Default)]
pub struct InMemoryCharacterStore {
    rows: Mutex<HashMap<(OrgId, CharacterId), CharacterRecord>>,
}

impl InMemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, org_id: OrgId, record: CharacterRecord) {
        self.rows
            .lock()
            .unwrap()
            .insert((org_id, record.id.clone()), record);
    }
}

#[async_trait]
impl CharacterStore for InMemoryCharacterStore {
    async fn characters(&self, org_id: OrgId, ids: &[CharacterId]) -> Result<Vec<CharacterRecord>> {
        let rows = self.rows.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(&(org_id, id.clone())).cloned())
            .collect())
    }
}
