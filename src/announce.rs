use crate::error::Result;
use crate::protocol::CombatPayload;
use crate::session::{ChannelId, MessageId, OrgId, Session, UserId};
use async_trait::async_trait;

/// What to do with a session's self-created discussion thread on cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadDisposition {
    Delete,
    /// Archive, leaving the thread readable and reopenable
    Close,
    /// Archive locked
    Lock,
}

/// Where a session announcement landed.
#[derive(Debug, Clone, Copy)]
pub struct Announcement {
    pub channel_or_thread_id: ChannelId,
    pub message_id: MessageId,
    /// True when the announcement opened its own discussion thread (the
    /// thread id doubles as the starter message id)
    pub created_thread: bool,
}

/// Seam to the announcement surface: the messages, threads and notices a
/// session is visible through. Rendering markdown/embeds is the
/// implementation's concern; the coordinator supplies session state and
/// rendered hook text.
#[async_trait]
pub trait Announcer: Send + Sync + 'static {
    /// Posts the session announcement. With `channel_override`, posts into
    /// that channel or thread; otherwise the implementation picks the
    /// organization's session surface and may create a dedicated thread.
    async fn post_announcement(
        &self,
        org_id: OrgId,
        session: &Session,
        body: &str,
        channel_override: Option<ChannelId>,
    ) -> Result<Announcement>;

    /// Re-renders the existing announcement message after a session change.
    async fn edit_announcement(&self, org_id: OrgId, session: &Session, body: &str) -> Result<()>;

    /// Renames a session's self-created thread after a title change.
    async fn rename_thread(&self, org_id: OrgId, thread_id: ChannelId, name: &str) -> Result<()>;

    /// Removes the announcement surface on cancel. `disposition` applies
    /// only to self-created threads; `None` lets the implementation pick a
    /// default (delete an unused thread, archive a used one).
    async fn remove_announcement(
        &self,
        org_id: OrgId,
        session: &Session,
        disposition: Option<ThreadDisposition>,
    ) -> Result<()>;

    /// Posts free text into a channel (level-up notices, scheduling
    /// mirrors).
    async fn post_notice(&self, org_id: OrgId, channel_id: ChannelId, text: &str) -> Result<()>;

    /// Relays a combat log into the organization's combat channel.
    async fn post_combat(
        &self,
        org_id: OrgId,
        channel_id: ChannelId,
        payload: &CombatPayload,
    ) -> Result<()>;

    /// Direct-messages the session owner; the fallback surface when no
    /// interactive context remains.
    async fn dm_owner(&self, org_id: OrgId, owner_id: UserId, text: &str) -> Result<()>;
}
