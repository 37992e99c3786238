use crate::announce::{Announcer, ThreadDisposition};
use crate::config::CoordinatorConfig;
use crate::error::{HeraldError, Result};
use crate::hub::{ConnectionId, LiveSessionHub, XpBatch};
use crate::ledger::ExperienceLedger;
use crate::levels::level_for_xp;
use crate::protocol::{ClientEvent, CombatPayload, ServerEvent, SessionSignal};
use crate::provider::{EventChanges, EventProvider, EventSpec, EventStatus};
use crate::scheduler::SessionEventManager;
use crate::session::{ChannelId, CharacterId, EventId, OrgId, Session, UserId};
use crate::store::{CharacterRecord, CharacterStore, OrgSettings, SessionStore, SettingsStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A partial update to a session; `None` fields are left untouched.
///
/// An owner transfer clears the owner's reward character, so
/// `owner_character_id` is ignored when `owner_id` is also supplied.
#[derive(Debug, Clone, Default)]
pub struct SessionChanges {
    pub title: Option<String>,
    pub hook: Option<String>,
    pub max_players: Option<u32>,
    pub owner_id: Option<UserId>,
    pub owner_character_id: Option<CharacterId>,
    pub start_time: Option<DateTime<Utc>>,
    pub xp: Option<i64>,
    pub gold: Option<i64>,
    pub image_url: Option<String>,
}

impl SessionChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.hook.is_none()
            && self.max_players.is_none()
            && self.owner_id.is_none()
            && self.owner_character_id.is_none()
            && self.start_time.is_none()
            && self.xp.is_none()
            && self.gold.is_none()
            && self.image_url.is_none()
    }
}

/// Result of rewarding a session.
#[derive(Debug)]
pub struct RewardOutcome {
    pub session: Session,
    /// One `**Name**: old -> new` line per participant whose level rose
    pub level_ups: Vec<String>,
    pub errors: Vec<String>,
}

/// The façade tying the session record, the external scheduled event, the
/// live-connection hub, the auto-start timers and the experience ledger
/// together.
///
/// Collaborators are injected at construction; the coordinator owns the
/// timer table, the ledger and (shared) the hub. Multi-step external side
/// effects are attempted independently: one step's failure never prevents
/// the rest, and failures are aggregated into the returned error list.
pub struct SessionCoordinator {
    sessions: Arc<dyn SessionStore>,
    settings: Arc<dyn SettingsStore>,
    characters: Arc<dyn CharacterStore>,
    provider: Arc<dyn EventProvider>,
    announcer: Arc<dyn Announcer>,
    hub: Arc<LiveSessionHub>,
    ledger: ExperienceLedger,
    timers: SessionEventManager,
    config: CoordinatorConfig,
}

impl SessionCoordinator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        settings: Arc<dyn SettingsStore>,
        characters: Arc<dyn CharacterStore>,
        provider: Arc<dyn EventProvider>,
        announcer: Arc<dyn Announcer>,
        hub: Arc<LiveSessionHub>,
        config: CoordinatorConfig,
    ) -> Self {
        let timers = SessionEventManager::new(Arc::clone(&provider));
        let ledger = ExperienceLedger::new(Arc::clone(&settings));
        Self {
            sessions,
            settings,
            characters,
            provider,
            announcer,
            hub,
            ledger,
            timers,
            config,
        }
    }

    pub fn hub(&self) -> &LiveSessionHub {
        &self.hub
    }

    pub fn timers(&self) -> &SessionEventManager {
        &self.timers
    }

    /// Schedules a new session: validates, announces (first, so a jump
    /// link exists), mirrors a future start into an external event,
    /// persists and arms the auto-start timer.
    ///
    /// Event-creation failure is collected, not fatal: the session is
    /// still persisted without an event reference and the caller may retry
    /// via [`edit`](Self::edit).
    pub async fn schedule(
        &self,
        mut session: Session,
        channel_override: Option<ChannelId>,
    ) -> Result<(Session, Vec<String>)> {
        let settings = self.settings_for(session.org_id).await?;
        self.ensure_title_free(session.org_id, &session.title).await?;
        if session.start_time <= Utc::now() {
            return Err(HeraldError::Validation(format!(
                "Start time {} is in the past.",
                session.start_time
            )));
        }
        session.start_time = self.guard_start_time(session.start_time);
        session.channel_override = channel_override.is_some();

        let body = session.render_hook()?;
        let announcement = self
            .announcer
            .post_announcement(session.org_id, &session, &body, channel_override)
            .await?;
        session.channel_or_thread_id = Some(announcement.channel_or_thread_id);
        session.announcement_message_id = Some(announcement.message_id);

        let mut errors = Vec::new();
        if session.start_time > Utc::now() {
            self.create_event(&settings, &mut session, &mut errors).await;
        }

        if let Err(error) = self.sessions.save(&mut session).await {
            errors.push(format!(
                "Failed to write **{}** to database: {error}",
                session.title
            ));
            return Ok((session, errors));
        }
        self.register_timer(&session).await;

        if settings.scheduling_channel_id != announcement.channel_or_thread_id {
            if let Err(error) = self
                .announcer
                .post_notice(session.org_id, settings.scheduling_channel_id, &body)
                .await
            {
                errors.push(format!(
                    "Could not mirror **{}** to the scheduling channel: {error}",
                    session.title
                ));
            }
        }
        info!(title = %session.title, org_id = session.org_id, "session scheduled");
        Ok((session, errors))
    }

    /// Applies the supplied field changes, then reconciles the external
    /// event, the persisted record, the announcement surface and the
    /// auto-start timer.
    pub async fn edit(
        &self,
        mut session: Session,
        changes: SessionChanges,
    ) -> Result<(Session, Vec<String>)> {
        if changes.is_empty() {
            return Err(HeraldError::Validation("No changes selected.".into()));
        }
        if let Some(title) = changes.title {
            self.ensure_title_free(session.org_id, &title).await?;
            session.title = title;
        }
        if let Some(hook) = changes.hook {
            session.hook = hook;
        }
        if let Some(max_players) = changes.max_players {
            session.max_players = max_players;
        }
        if let Some(owner_id) = changes.owner_id {
            session.owner_id = owner_id;
            session.owner_character_id = None;
        } else if let Some(character_id) = changes.owner_character_id {
            session.owner_character_id = Some(character_id);
        }
        if let Some(start_time) = changes.start_time {
            session.start_time = self.guard_start_time(start_time);
        }
        if let Some(xp) = changes.xp {
            session.xp = Some(xp);
        }
        if let Some(gold) = changes.gold {
            session.gold = Some(gold);
        }
        if let Some(image_url) = changes.image_url {
            session.image_url = Some(image_url);
        }

        let errors = self.sync_session(&mut session).await;
        Ok((session, errors))
    }

    /// Cancels a session: removes the announcement surface, closes the
    /// external event according to its current status, deletes the record
    /// and disarms the timer. Each step's failure is collected; none stops
    /// the rest.
    pub async fn cancel(
        &self,
        session: &Session,
        disposition: Option<ThreadDisposition>,
    ) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(error) = self
            .announcer
            .remove_announcement(session.org_id, session, disposition)
            .await
        {
            errors.push(format!(
                "Could not remove announcement for **{}**: {error}",
                session.title
            ));
        }

        match session.event_id {
            None => errors.push("Scheduled Event not found.".to_string()),
            Some(event_id) => match self.provider.get_event(session.org_id, event_id).await {
                Ok(Some(event)) => {
                    let closed = match event.status {
                        EventStatus::Active => {
                            self.provider.complete_event(session.org_id, event_id).await
                        }
                        EventStatus::Scheduled => {
                            self.provider.cancel_event(session.org_id, event_id).await
                        }
                        _ => Ok(()),
                    };
                    if let Err(error) = closed {
                        errors.push(format!(
                            "Could not close event for **{}**: {error}",
                            session.title
                        ));
                    }
                }
                Ok(None) => errors.push("Scheduled Event not found.".to_string()),
                Err(error) => errors.push(format!(
                    "Could not fetch event for **{}**: {error}",
                    session.title
                )),
            },
        }

        if let Some(session_id) = session.id {
            if let Err(error) = self.sessions.delete(session.org_id, session_id).await {
                errors.push(format!("Records not found: {error}"));
            }
            self.timers.remove(session_id);
        }

        if errors.is_empty() {
            debug!(title = %session.title, "session canceled");
        } else {
            warn!(title = %session.title, ?errors, "session canceled with errors");
        }
        errors
    }

    /// Sets the session's rewards, computes per-participant level-up
    /// notices and pushes each participant's new experience total to the
    /// ledger (delivered live or buffered).
    pub async fn reward(&self, session: Session, xp: i64, gold: i64) -> Result<RewardOutcome> {
        if xp < 0 {
            return Err(HeraldError::Validation(
                "XP must be a positive number.".into(),
            ));
        }
        if gold < 0 {
            return Err(HeraldError::Validation(
                "Gold must be a positive number.".into(),
            ));
        }
        self.apply_reward(session, xp, Some(gold)).await
    }

    /// Clones a finished session forward: bumped title, cleared rewards,
    /// same roster and surface, a fresh announcement in the same channel,
    /// and a new external event when the start is in the future.
    pub async fn continue_session(
        &self,
        session: &Session,
        start_time: DateTime<Utc>,
        hook: Option<String>,
    ) -> Result<(Session, Vec<String>)> {
        let settings = self.settings_for(session.org_id).await?;
        let mut next = session.clone();
        next.title = session.next_title();
        self.ensure_title_free(next.org_id, &next.title).await?;
        next.id = None;
        next.xp = None;
        next.gold = None;
        next.event_id = None;
        next.announcement_message_id = None;
        // The continuation posts into the predecessor's channel or thread.
        next.channel_override = true;
        if let Some(hook) = hook {
            next.hook = hook;
        }
        next.start_time = self.guard_start_time(start_time);

        let body = next.render_hook()?;
        let announcement = self
            .announcer
            .post_announcement(next.org_id, &next, &body, session.channel_or_thread_id)
            .await?;
        next.channel_or_thread_id = Some(announcement.channel_or_thread_id);
        next.announcement_message_id = Some(announcement.message_id);

        let mut errors = Vec::new();
        if next.start_time > Utc::now() {
            self.create_event(&settings, &mut next, &mut errors).await;
        }
        if let Err(error) = self.sessions.save(&mut next).await {
            errors.push(format!(
                "Failed to write **{}** to database: {error}",
                next.title
            ));
            return Ok((next, errors));
        }
        self.register_timer(&next).await;
        Ok((next, errors))
    }

    /// Adds a character to the roster; rejects duplicates and full
    /// sessions, then reconciles surfaces.
    pub async fn join(
        &self,
        mut session: Session,
        character: &CharacterId,
    ) -> Result<(Session, Vec<String>)> {
        session.join(character)?;
        let errors = self.sync_session(&mut session).await;
        Ok((session, errors))
    }

    /// Removes a character from whichever roster list holds it; a no-op
    /// when absent.
    pub async fn leave(
        &self,
        mut session: Session,
        character: &CharacterId,
    ) -> Result<(Session, Vec<String>)> {
        if !session.leave(character) {
            return Ok((session, Vec::new()));
        }
        let errors = self.sync_session(&mut session).await;
        Ok((session, errors))
    }

    /// Intake for the scheduling provider's status pushes. Only the
    /// `->active` and `active->` edges matter; events with no matching
    /// session (deleted, or a foreign creator's) are logged and ignored.
    pub async fn on_event_status_changed(
        &self,
        org_id: OrgId,
        event_id: EventId,
        old_status: EventStatus,
        new_status: EventStatus,
    ) -> Result<()> {
        let started = new_status == EventStatus::Active && old_status != EventStatus::Active;
        let stopped = old_status == EventStatus::Active && new_status != EventStatus::Active;
        if !started && !stopped {
            return Ok(());
        }

        let Some(session) = self.sessions.get_by_event(org_id, event_id).await? else {
            warn!(org_id, event_id, "status change for event with no session");
            return Ok(());
        };
        let signal = if started {
            SessionSignal::Start
        } else {
            SessionSignal::Stop
        };
        self.hub.notify(org_id, session_payload(&session, signal)).await;
        if stopped {
            self.settle_session_xp(session).await?;
        }
        Ok(())
    }

    /// Intake for a freshly opened transport connection. Resolves the
    /// credential to an organization and registers the connection. On the
    /// organization's first connection, flushes pending experience and
    /// replays the active session, if any, so a reconnecting client can
    /// rejoin state.
    pub async fn on_connect(
        &self,
        conn_id: ConnectionId,
        token: &str,
        sender: mpsc::Sender<ServerEvent>,
    ) -> Result<OrgId> {
        let Some(settings) = self.settings.find_by_token(token).await? else {
            warn!(%conn_id, "connection presented unknown credentials");
            return Err(HeraldError::Unauthenticated);
        };
        let org_id = settings.id;
        let first = self.hub.insert(conn_id.clone(), org_id, sender);
        info!(%conn_id, org_id, "client connected");

        if first {
            if let Err(error) = self.ledger.resync_on_connect(&self.hub, org_id, &conn_id).await {
                warn!(org_id, %error, "pending experience resync failed");
            }
            match self.active_session_payload(org_id).await {
                Ok(Some(payload)) => {
                    if let Err(error) = self.hub.send_to(&conn_id, payload).await {
                        warn!(org_id, %error, "could not greet reconnecting client");
                    }
                }
                Ok(None) => {}
                Err(error) => warn!(org_id, %error, "could not determine active session"),
            }
        }
        Ok(org_id)
    }

    /// Intake for a closed transport connection; registry removal only.
    pub fn on_disconnect(&self, conn_id: &str) {
        match self.hub.remove(conn_id) {
            Some(org_id) => info!(conn_id, org_id, "client disconnected"),
            None => debug!(conn_id, "disconnect for unknown connection"),
        }
    }

    /// Intake for payloads from a live client connection.
    pub async fn on_client_event(&self, conn_id: &str, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Response {
                correlation_id,
                body,
            } => {
                self.hub.resolve(correlation_id, body);
                Ok(())
            }
            ClientEvent::XpBatch { session_id, awards } => {
                let org_id = self.hub.org_of(conn_id).ok_or(HeraldError::Unauthenticated)?;
                self.hub.accumulate_xp(org_id, session_id, XpBatch::new(awards));
                Ok(())
            }
            ClientEvent::Combat { payload } => {
                let org_id = self.hub.org_of(conn_id).ok_or(HeraldError::Unauthenticated)?;
                let settings = self.settings_for(org_id).await?;
                let Some(channel_id) = settings.combat_channel_id else {
                    debug!(org_id, "no combat channel configured");
                    return Ok(());
                };
                match CombatPayload::parse(&payload) {
                    Some(parsed) => {
                        self.announcer.post_combat(org_id, channel_id, &parsed).await
                    }
                    None => {
                        warn!(org_id, %payload, "unrecognized combat payload");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Asks the organization's live client to perform a roll. `Ok(None)`
    /// means no live connection; the caller rolls locally instead.
    pub async fn roll_request(&self, org_id: OrgId, payload: Value) -> Result<Option<Value>> {
        self.hub
            .send_request(org_id, |correlation_id| ServerEvent::RollRequest {
                correlation_id,
                payload,
            })
            .await
    }

    /// Asks the organization's live client for an item's description.
    /// `Ok(None)` means no live connection.
    pub async fn item_description_request(
        &self,
        org_id: OrgId,
        actor_id: CharacterId,
        item_id: String,
    ) -> Result<Option<Value>> {
        self.hub
            .send_request(org_id, |correlation_id| {
                ServerEvent::ItemDescriptionRequest {
                    correlation_id,
                    actor_id,
                    item_id,
                }
            })
            .await
    }

    /// Restores auto-start timers lost across a restart: every scheduled
    /// or active event of ours with a matching session gets its timer
    /// re-armed. Organizations reconcile concurrently.
    pub async fn reconcile_on_startup(&self, org_ids: &[OrgId]) {
        let tasks = org_ids.iter().map(|&org_id| self.reconcile_org(org_id));
        for (org_id, result) in org_ids.iter().zip(join_all(tasks).await) {
            if let Err(error) = result {
                warn!(org_id, %error, "startup reconciliation failed");
            }
        }
    }

    async fn reconcile_org(&self, org_id: OrgId) -> Result<()> {
        let events = self.provider.list_events(org_id).await?;
        for event in events.into_iter().filter(|e| {
            e.created_by_us && matches!(e.status, EventStatus::Scheduled | EventStatus::Active)
        }) {
            if let Some(session) = self.sessions.get_by_event(org_id, event.id).await? {
                if let Some(session_id) = session.id {
                    self.timers.upsert(org_id, session_id, event);
                }
            }
        }
        Ok(())
    }

    async fn settings_for(&self, org_id: OrgId) -> Result<OrgSettings> {
        self.settings
            .get(org_id)
            .await?
            .ok_or_else(|| HeraldError::Validation("Organization is not configured.".into()))
    }

    async fn ensure_title_free(&self, org_id: OrgId, title: &str) -> Result<()> {
        if self.sessions.get(org_id, title).await?.is_some() {
            return Err(HeraldError::Validation(format!(
                "Session **{title}** already exists."
            )));
        }
        Ok(())
    }

    /// A start colliding with "now" races immediate completion; nudge it
    /// past the window.
    fn guard_start_time(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let now = Utc::now();
        if start > now - chrono::Duration::seconds(1) && start < now + self.config.start_guard() {
            start + self.config.start_nudge()
        } else {
            start
        }
    }

    async fn describe(&self, session: &Session) -> Result<String> {
        let names = |records: Vec<CharacterRecord>| {
            records.into_iter().map(|r| r.name).collect::<Vec<_>>()
        };
        let participants = names(
            self.characters
                .characters(session.org_id, &session.participants)
                .await?,
        );
        let standby = names(
            self.characters
                .characters(session.org_id, &session.standby)
                .await?,
        );
        session.event_description(&participants, &standby)
    }

    async fn event_spec(&self, settings: &OrgSettings, session: &Session) -> Result<EventSpec> {
        Ok(EventSpec {
            title: session.title.clone(),
            description: self.describe(session).await?,
            start_time: session.start_time,
            location: settings.voice_channel_id,
            image_url: session.image_url.clone(),
        })
    }

    async fn create_event(
        &self,
        settings: &OrgSettings,
        session: &mut Session,
        errors: &mut Vec<String>,
    ) {
        match self.event_spec(settings, session).await {
            Ok(spec) => match self.provider.create_event(session.org_id, spec).await {
                Ok(event_id) => session.event_id = Some(event_id),
                Err(error) => errors.push(format!(
                    "Could not schedule event for **{}**: {error}",
                    session.title
                )),
            },
            Err(error) => errors.push(format!(
                "Could not render event description for **{}**: {error}",
                session.title
            )),
        }
    }

    /// Brings the external event, the persisted record, the announcement
    /// message and the timer in line with the session's current fields.
    async fn sync_session(&self, session: &mut Session) -> Vec<String> {
        let mut errors = Vec::new();
        let settings = match self.settings_for(session.org_id).await {
            Ok(settings) => settings,
            Err(error) => {
                errors.push(error.to_string());
                return errors;
            }
        };
        self.reconcile_event(&settings, session, &mut errors).await;

        if let Err(error) = self.sessions.save(session).await {
            errors.push(format!(
                "Failed to write **{}** to database: {error}",
                session.title
            ));
        } else {
            self.register_timer(session).await;
        }

        match session.render_hook() {
            Ok(body) => {
                if let Err(error) = self
                    .announcer
                    .edit_announcement(session.org_id, session, &body)
                    .await
                {
                    errors.push(format!(
                        "Could not write message for **{}**: {error}",
                        session.title
                    ));
                }
            }
            Err(error) => errors.push(format!(
                "Could not render hook for **{}**: {error}",
                session.title
            )),
        }
        if session.created_thread() {
            if let Some(thread_id) = session.channel_or_thread_id {
                if let Err(error) = self
                    .announcer
                    .rename_thread(session.org_id, thread_id, &session.title)
                    .await
                {
                    errors.push(format!(
                        "Could not rename thread for **{}**: {error}",
                        session.title
                    ));
                }
            }
        }
        errors
    }

    async fn reconcile_event(
        &self,
        settings: &OrgSettings,
        session: &mut Session,
        errors: &mut Vec<String>,
    ) {
        let now = Utc::now();
        let mut event = match session.event_id {
            Some(event_id) => match self.provider.get_event(session.org_id, event_id).await {
                Ok(found) => found,
                Err(error) => {
                    errors.push(format!(
                        "Could not fetch event for **{}**: {error}",
                        session.title
                    ));
                    return;
                }
            },
            None => None,
        };

        // A running event cannot move its start; finish it and let the
        // create path below mint a replacement.
        if let Some(current) = &event {
            if current.status == EventStatus::Active && current.start_time != session.start_time {
                if let Err(error) = self.provider.complete_event(session.org_id, current.id).await
                {
                    errors.push(format!(
                        "Could not complete event for **{}**: {error}",
                        session.title
                    ));
                }
                session.event_id = None;
                event = None;
            }
        }

        match event {
            None => {
                if session.start_time > now {
                    self.create_event(settings, session, errors).await;
                }
            }
            Some(current) if current.status == EventStatus::Scheduled => {
                if session.start_time < now {
                    if let Err(error) =
                        self.provider.cancel_event(session.org_id, current.id).await
                    {
                        errors.push(format!(
                            "Could not cancel event for **{}**: {error}",
                            session.title
                        ));
                    }
                } else {
                    self.edit_event(session, current.id, Some(session.start_time), errors)
                        .await;
                }
            }
            Some(current) if current.status == EventStatus::Active => {
                self.edit_event(session, current.id, None, errors).await;
            }
            Some(_) => {}
        }
    }

    async fn edit_event(
        &self,
        session: &Session,
        event_id: EventId,
        start_time: Option<DateTime<Utc>>,
        errors: &mut Vec<String>,
    ) {
        match self.describe(session).await {
            Ok(description) => {
                let changes = EventChanges {
                    title: Some(session.title.clone()),
                    description: Some(description),
                    start_time,
                };
                if let Err(error) = self
                    .provider
                    .edit_event(session.org_id, event_id, changes)
                    .await
                {
                    errors.push(format!(
                        "Could not edit event for **{}**: {error}",
                        session.title
                    ));
                }
            }
            Err(error) => errors.push(format!(
                "Could not render event description for **{}**: {error}",
                session.title
            )),
        }
    }

    async fn register_timer(&self, session: &Session) {
        let (Some(session_id), Some(event_id)) = (session.id, session.event_id) else {
            return;
        };
        match self.provider.get_event(session.org_id, event_id).await {
            Ok(Some(event)) => self.timers.upsert(session.org_id, session_id, event),
            Ok(None) => debug!(event_id, "no event to arm auto-start for"),
            Err(error) => warn!(event_id, %error, "could not fetch event for auto-start"),
        }
    }

    async fn apply_reward(
        &self,
        mut session: Session,
        xp: i64,
        gold: Option<i64>,
    ) -> Result<RewardOutcome> {
        session.xp = Some(xp);
        if let Some(gold) = gold {
            session.gold = Some(gold);
        }

        let records = self
            .characters
            .characters(session.org_id, &session.participants)
            .await?;
        let mut errors = self.sync_session(&mut session).await;

        let mut level_ups = Vec::new();
        if xp > 0 && !records.is_empty() {
            let mut totals: HashMap<CharacterId, i64> = HashMap::new();
            for record in &records {
                // Persisted totals predate this reward; fold it in.
                let before = level_for_xp(record.xp);
                let total = record.xp + xp;
                let after = level_for_xp(total);
                if after > before {
                    level_ups.push(format!("**{}**: {before} -> {after}", record.name));
                }
                totals.insert(record.id.clone(), total);
            }
            if let Err(error) = self.ledger.accrue(&self.hub, session.org_id, &totals).await {
                errors.push(format!(
                    "Could not sync experience for **{}**: {error}",
                    session.title
                ));
            }
        }
        Ok(RewardOutcome {
            session,
            level_ups,
            errors,
        })
    }

    /// Settles the XP a live client streamed during play: sums the
    /// accumulated batches, rewards the session with the total and posts
    /// the notice to the session's channel (or DMs the owner when the
    /// surface is gone).
    async fn settle_session_xp(&self, session: Session) -> Result<()> {
        let Some(session_id) = session.id else {
            return Ok(());
        };
        let Some(total) = self.hub.take_session_xp(session.org_id, session_id) else {
            warn!(org_id = session.org_id, session_id, "no accumulated experience for session");
            return Ok(());
        };
        if total == 0 {
            return Ok(());
        }
        if session.participants.is_empty() {
            info!(title = %session.title, "session has no participants");
            return Ok(());
        }

        let org_id = session.org_id;
        let owner_id = session.owner_id;
        let channel = session.channel_or_thread_id;
        let title = session.title.clone();
        let outcome = self.apply_reward(session, total, None).await?;

        let mut lines = vec![format!("**{total} XP rewarded for **{title}**!**")];
        lines.extend(outcome.level_ups);
        let text = lines.join("\n");
        let posted = match channel {
            Some(channel_id) => self.announcer.post_notice(org_id, channel_id, &text).await,
            None => self.announcer.dm_owner(org_id, owner_id, &text).await,
        };
        if let Err(error) = posted {
            warn!(org_id, %error, "could not post reward notice");
        }
        Ok(())
    }

    async fn active_session_payload(&self, org_id: OrgId) -> Result<Option<ServerEvent>> {
        let events = self.provider.list_events(org_id).await?;
        let Some(active) = events
            .into_iter()
            .find(|e| e.status == EventStatus::Active && e.created_by_us)
        else {
            return Ok(None);
        };
        let Some(session) = self.sessions.get_by_event(org_id, active.id).await? else {
            return Ok(None);
        };
        Ok(Some(session_payload(&session, SessionSignal::Start)))
    }
}

fn session_payload(session: &Session, status: SessionSignal) -> ServerEvent {
    ServerEvent::Session {
        session_id: session.id.unwrap_or_default(),
        title: session.title.clone(),
        start_ts_millis: session.start_time.timestamp_millis(),
        status,
    }
}
