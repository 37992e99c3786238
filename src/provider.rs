use crate::error::Result;
use crate::session::{ChannelId, EventId, OrgId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of an external scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Active,
    Completed,
    Canceled,
}

/// A point-in-time view of an external scheduled event.
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    pub id: EventId,
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    /// Whether this system created the event; foreign events are never
    /// touched
    pub created_by_us: bool,
}

/// Everything needed to create an external scheduled event.
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub location: ChannelId,
    pub image_url: Option<String>,
}

/// Partial update for an external scheduled event; `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

/// Seam to the calendar-like scheduling provider.
///
/// Status pushes from the provider arrive through
/// [`SessionCoordinator::on_event_status_changed`].
///
/// [`SessionCoordinator::on_event_status_changed`]: crate::coordinator::SessionCoordinator::on_event_status_changed
#[async_trait]
pub trait EventProvider: Send + Sync + 'static {
    async fn create_event(&self, org_id: OrgId, spec: EventSpec) -> Result<EventId>;
    async fn edit_event(&self, org_id: OrgId, event_id: EventId, changes: EventChanges)
        -> Result<()>;
    /// Transitions a scheduled event to active.
    async fn start_event(&self, org_id: OrgId, event_id: EventId) -> Result<()>;
    /// Transitions an active event to completed.
    async fn complete_event(&self, org_id: OrgId, event_id: EventId) -> Result<()>;
    /// Transitions a scheduled event to canceled.
    async fn cancel_event(&self, org_id: OrgId, event_id: EventId) -> Result<()>;
    async fn get_event(&self, org_id: OrgId, event_id: EventId) -> Result<Option<EventSnapshot>>;
    async fn list_events(&self, org_id: OrgId) -> Result<Vec<EventSnapshot>>;
}
