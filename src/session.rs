use crate::error::{HeraldError, Result};
use chrono::{DateTime, TimeZone, Utc};
use minijinja::{context, Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};

/// Tenant boundary under which sessions, settings and connections are scoped.
pub type OrgId = i64;
/// Surrogate id assigned to a session on first persist.
pub type SessionId = i64;
/// Id of an external scheduled event mirroring a session.
pub type EventId = i64;
pub type ChannelId = i64;
pub type MessageId = i64;
pub type UserId = i64;
/// Character ids are opaque strings minted by the external game client.
pub type CharacterId = String;

/// External scheduled-event descriptions are capped by the host platform.
const MAX_EVENT_DESCRIPTION: usize = 1000;

/// The durable record of one scheduled tabletop session.
///
/// Identity is `(org_id, title)`; the surrogate `id` exists only once the
/// record has been persisted. The announcement surface fields point at the
/// message (and possibly thread) the session was announced in, and
/// `event_id` links the external scheduled event mirroring this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub org_id: OrgId,
    pub title: String,
    pub id: Option<SessionId>,
    /// Experience per participant, set when the session is rewarded
    pub xp: Option<i64>,
    /// Gold per participant, set when the session is rewarded
    pub gold: Option<i64>,
    pub min_players: u32,
    pub max_players: u32,
    /// Always stored normalized to UTC
    pub start_time: DateTime<Utc>,
    /// The session's runner
    pub owner_id: UserId,
    /// Character the runner rewards owner experience to, if any
    pub owner_character_id: Option<CharacterId>,
    /// Rostered characters; capped by `max_players`
    pub participants: Vec<CharacterId>,
    /// Waitlisted characters; disjoint from `participants`
    pub standby: Vec<CharacterId>,
    /// Free-text template rendered against session fields
    pub hook: String,
    pub event_id: Option<EventId>,
    pub channel_or_thread_id: Option<ChannelId>,
    pub announcement_message_id: Option<MessageId>,
    /// True when the announcement went to a caller-supplied channel rather
    /// than a thread of our own making
    pub channel_override: bool,
    pub image_url: Option<String>,
    pub campaign_id: Option<i64>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Whether announcing this session created its own discussion thread.
    /// A created thread's id doubles as the starter message id.
    pub fn created_thread(&self) -> bool {
        !self.channel_override
            && self.channel_or_thread_id.is_some()
            && self.channel_or_thread_id == self.announcement_message_id
    }

    pub fn player_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_players as usize
    }

    /// Adds a character to the roster. Rejects duplicates across both
    /// roster lists and rejects joins once the session is full.
    pub fn join(&mut self, character: &CharacterId) -> Result<()> {
        if self.participants.contains(character) || self.standby.contains(character) {
            return Err(HeraldError::Validation(format!(
                "Character is already signed up for **{}**.",
                self.title
            )));
        }
        if self.is_full() {
            return Err(HeraldError::Validation(format!(
                "**{}** is full.",
                self.title
            )));
        }
        self.participants.push(character.clone());
        Ok(())
    }

    /// Adds a character to the standby list; duplicates across both lists
    /// are rejected.
    pub fn join_standby(&mut self, character: &CharacterId) -> Result<()> {
        if self.participants.contains(character) || self.standby.contains(character) {
            return Err(HeraldError::Validation(format!(
                "Character is already signed up for **{}**.",
                self.title
            )));
        }
        self.standby.push(character.clone());
        Ok(())
    }

    /// Removes a character from whichever roster list holds it. Returns
    /// whether anything was removed.
    pub fn leave(&mut self, character: &CharacterId) -> bool {
        let before = self.participants.len() + self.standby.len();
        self.participants.retain(|c| c != character);
        self.standby.retain(|c| c != character);
        before != self.participants.len() + self.standby.len()
    }

    /// Renders the hook template against the session's fields. Unresolved
    /// placeholders render as empty strings, not errors.
    pub fn render_hook(&self) -> Result<String> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        let template = env.template_from_str(&self.hook)?;
        let rendered = template.render(context! {
            title => self.title,
            start_time => self.start_time.to_rfc3339(),
            min_players => self.min_players,
            max_players => self.max_players,
            player_count => self.player_count(),
            xp => self.xp,
            gold => self.gold,
            image_url => self.image_url,
        })?;
        Ok(rendered)
    }

    /// Builds the external event's description: rendered hook, player
    /// count, then participant and standby names. Truncated to the
    /// platform cap by trimming the hook, never the roster.
    pub fn event_description(
        &self,
        participant_names: &[String],
        standby_names: &[String],
    ) -> Result<String> {
        let hook = self.render_hook()?;
        let mut lines = vec![hook.clone(), String::new()];
        lines.push(format!(
            "Players: {}/{}",
            self.participants.len(),
            self.max_players
        ));
        lines.extend(participant_names.iter().cloned());
        lines.extend(standby_names.iter().map(|name| format!("*{name}*")));
        let mut out = lines.join("\n");

        if out.len() > MAX_EVENT_DESCRIPTION {
            let excess = out.len() + 3 - MAX_EVENT_DESCRIPTION;
            let keep = boundary_before(&out, hook.len().saturating_sub(excess));
            let tail_start = boundary_before(&out, hook.len());
            out = format!("{}...{}", &out[..keep], &out[tail_start..]);
            if out.len() > MAX_EVENT_DESCRIPTION {
                out.truncate(boundary_before(&out, MAX_EVENT_DESCRIPTION));
            }
        }
        Ok(out)
    }

    /// Title for a continuation of this session: a trailing integer is
    /// incremented, otherwise ` 2` is appended.
    pub fn next_title(&self) -> String {
        if let Some((head, tail)) = self.title.rsplit_once(' ') {
            if let Ok(n) = tail.parse::<u64>() {
                return format!("{} {}", head, n + 1);
            }
        }
        format!("{} 2", self.title)
    }
}

fn boundary_before(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Builder for new, not-yet-persisted [`Session`] records.
#[derive(Debug, Default)]
pub struct SessionBuilder {
    org_id: Option<OrgId>,
    title: Option<String>,
    owner_id: Option<UserId>,
    start_time: Option<DateTime<Utc>>,
    hook: Option<String>,
    max_players: Option<u32>,
    min_players: Option<u32>,
    owner_character_id: Option<CharacterId>,
    participants: Vec<CharacterId>,
    image_url: Option<String>,
    campaign_id: Option<i64>,
    channel_override: bool,
}

impl SessionBuilder {
    pub fn org_id(mut self, v: OrgId) -> Self {
        self.org_id = Some(v);
        self
    }
    pub fn title(mut self, v: impl Into<String>) -> Self {
        self.title = Some(v.into());
        self
    }
    pub fn owner_id(mut self, v: UserId) -> Self {
        self.owner_id = Some(v);
        self
    }
    /// Start times are normalized to UTC regardless of the supplied zone.
    pub fn start_time<Tz: TimeZone>(mut self, v: DateTime<Tz>) -> Self {
        self.start_time = Some(v.with_timezone(&Utc));
        self
    }
    pub fn hook(mut self, v: impl Into<String>) -> Self {
        self.hook = Some(v.into());
        self
    }
    pub fn max_players(mut self, v: u32) -> Self {
        self.max_players = Some(v);
        self
    }
    pub fn min_players(mut self, v: u32) -> Self {
        self.min_players = Some(v);
        self
    }
    pub fn owner_character_id(mut self, v: impl Into<CharacterId>) -> Self {
        self.owner_character_id = Some(v.into());
        self
    }
    /// Pre-seeds the roster, e.g. from a campaign's standing cast.
    pub fn participants(mut self, v: Vec<CharacterId>) -> Self {
        self.participants = v;
        self
    }
    pub fn image_url(mut self, v: impl Into<String>) -> Self {
        self.image_url = Some(v.into());
        self
    }
    pub fn campaign_id(mut self, v: i64) -> Self {
        self.campaign_id = Some(v);
        self
    }
    pub fn channel_override(mut self, v: bool) -> Self {
        self.channel_override = v;
        self
    }

    pub fn build(self) -> Result<Session> {
        let max_players = self
            .max_players
            .ok_or_else(|| HeraldError::InvalidConfig("max_players missing".into()))?;
        let participants = self.participants;
        if participants.len() > max_players as usize {
            return Err(HeraldError::InvalidConfig(
                "more participants than max_players".into(),
            ));
        }
        Ok(Session {
            org_id: self
                .org_id
                .ok_or_else(|| HeraldError::InvalidConfig("org_id missing".into()))?,
            title: self
                .title
                .ok_or_else(|| HeraldError::InvalidConfig("title missing".into()))?,
            id: None,
            xp: None,
            gold: None,
            min_players: self.min_players.unwrap_or(1),
            max_players,
            start_time: self
                .start_time
                .ok_or_else(|| HeraldError::InvalidConfig("start_time missing".into()))?,
            owner_id: self
                .owner_id
                .ok_or_else(|| HeraldError::InvalidConfig("owner_id missing".into()))?,
            owner_character_id: self.owner_character_id,
            participants,
            standby: Vec::new(),
            hook: self
                .hook
                .ok_or_else(|| HeraldError::InvalidConfig("hook missing".into()))?,
            event_id: None,
            channel_or_thread_id: None,
            announcement_message_id: None,
            channel_override: self.channel_override,
            image_url: self.image_url,
            campaign_id: self.campaign_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(max_players: u32) -> Session {
        Session::builder()
            .org_id(1)
            .title("Sunless Citadel")
            .owner_id(42)
            .start_time(Utc::now())
            .hook("Rescue the caravan")
            .max_players(max_players)
            .build()
            .unwrap()
    }

    #[test]
    fn roster_lists_stay_disjoint() {
        let mut s = session(4);
        s.join(&"a1".to_string()).unwrap();
        assert!(s.join_standby(&"a1".to_string()).is_err());
        s.join_standby(&"a2".to_string()).unwrap();
        assert!(s.join(&"a2".to_string()).is_err());
        assert!(s.leave(&"a1".to_string()));
        assert!(!s.participants.contains(&"a1".to_string()));
    }

    #[test]
    fn join_rejected_when_full() {
        let mut s = session(4);
        for id in ["p1", "p2", "p3", "p4"] {
            s.join(&id.to_string()).unwrap();
        }
        let err = s.join(&"p5".to_string()).unwrap_err();
        assert!(err.to_string().contains("full"));
        assert_eq!(s.player_count(), 4);
    }

    #[test]
    fn continuation_titles_bump() {
        let mut s = session(4);
        assert_eq!(s.next_title(), "Sunless Citadel 2");
        s.title = "Sunless Citadel 2".into();
        assert_eq!(s.next_title(), "Sunless Citadel 3");
        s.title = "Heist".into();
        assert_eq!(s.next_title(), "Heist 2");
    }

    #[test]
    fn hook_placeholders_render_leniently() {
        let mut s = session(5);
        s.hook = "{{ title }} for {{ max_players }} ({{ nonsense }})".into();
        assert_eq!(s.render_hook().unwrap(), "Sunless Citadel for 5 ()");
    }

    #[test]
    fn event_description_truncates_hook_not_roster() {
        let mut s = session(4);
        s.hook = "x".repeat(1500);
        s.participants = vec!["a1".into()];
        let out = s
            .event_description(&["Durnan".to_string()], &["Mirt".to_string()])
            .unwrap();
        assert!(out.len() <= 1000);
        assert!(out.contains("Durnan"));
        assert!(out.contains("*Mirt*"));
    }

    #[test]
    fn created_thread_derivation() {
        let mut s = session(4);
        s.channel_or_thread_id = Some(99);
        s.announcement_message_id = Some(99);
        assert!(s.created_thread());
        s.channel_override = true;
        assert!(!s.created_thread());
        s.channel_override = false;
        s.announcement_message_id = Some(100);
        assert!(!s.created_thread());
    }
}
