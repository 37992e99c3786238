use crate::provider::{EventProvider, EventSnapshot, EventStatus};
use crate::session::{OrgId, SessionId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Auto-start scheduler: one cancellable background timer per session id.
///
/// Each timer sleeps until its event's start time, re-fetches the event
/// (its status may have moved while sleeping) and promotes a still
/// `scheduled` event to active. Replacing or removing a session's timer is
/// atomic under the table lock, so two concurrent upserts for one id leave
/// exactly one live timer: the later one.
pub struct SessionEventManager {
    provider: Arc<dyn EventProvider>,
    timers: Mutex<HashMap<SessionId, JoinHandle<()>>>,
}

impl SessionEventManager {
    pub fn new(provider: Arc<dyn EventProvider>) -> Self {
        Self {
            provider,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Cancels and discards any existing timer for `session_id`, then arms
    /// a fresh one for `event`.
    pub fn upsert(&self, org_id: OrgId, session_id: SessionId, event: EventSnapshot) {
        debug!(session_id, event_id = event.id, "arming auto-start timer");
        let mut timers = self.timers.lock().unwrap();
        if let Some(old) = timers.remove(&session_id) {
            old.abort();
        }
        let provider = Arc::clone(&self.provider);
        timers.insert(
            session_id,
            tokio::spawn(auto_start(provider, org_id, event)),
        );
    }

    /// Cancels and discards the timer if present; a no-op otherwise.
    /// Canceling is normal control flow, not an error.
    pub fn remove(&self, session_id: SessionId) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(handle) = timers.remove(&session_id) {
            handle.abort();
            info!(session_id, "auto-start timer canceled");
        }
    }

    pub fn has_timer(&self, session_id: SessionId) -> bool {
        self.timers.lock().unwrap().contains_key(&session_id)
    }
}

impl Drop for SessionEventManager {
    fn drop(&mut self) {
        for handle in self.timers.lock().unwrap().values() {
            handle.abort();
        }
    }
}

async fn auto_start(provider: Arc<dyn EventProvider>, org_id: OrgId, event: EventSnapshot) {
    if event.status != EventStatus::Scheduled {
        return;
    }
    let delay = (event.start_time - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(delay).await;

    // The event may have been started, completed or canceled while we
    // slept; only the authoritative status decides.
    match provider.get_event(org_id, event.id).await {
        Ok(Some(current)) => match current.status {
            EventStatus::Completed | EventStatus::Canceled => {}
            EventStatus::Active => {
                warn!(event_id = event.id, "event already running");
            }
            EventStatus::Scheduled => {
                info!(event_id = event.id, "starting scheduled event");
                if let Err(error) = provider.start_event(org_id, event.id).await {
                    warn!(event_id = event.id, %error, "auto-start failed");
                }
            }
        },
        Ok(None) => debug!(event_id = event.id, "event gone before auto-start"),
        Err(error) => warn!(event_id = event.id, %error, "could not re-fetch event"),
    }
}
