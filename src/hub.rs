use crate::config::HubConfig;
use crate::error::{HeraldError, Result};
use crate::protocol::ServerEvent;
use crate::session::{CharacterId, OrgId, SessionId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Connection ids are opaque strings minted by the transport.
pub type ConnectionId = String;

/// One experience award batch received from a live client during play.
///
/// Clients send one uniform per-character award per batch; the first entry
/// carries the value.
#[derive(Debug, Clone)]
pub struct XpBatch {
    awards: Vec<(CharacterId, i64)>,
}

impl XpBatch {
    pub fn new(awards: Vec<(CharacterId, i64)>) -> Self {
        Self { awards }
    }

    /// The batch's per-character award value.
    pub fn award(&self) -> i64 {
        self.awards.first().map(|(_, xp)| *xp).unwrap_or(0)
    }
}

#[derive(Default)]
struct Registry {
    orgs_to_conns: HashMap<OrgId, Vec<ConnectionId>>,
    conn_to_org: HashMap<ConnectionId, OrgId>,
    senders: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    session_xp: HashMap<(OrgId, SessionId), Vec<XpBatch>>,
}

/// Process-wide registry of live game-client connections, plus the tagged
/// request/response correlator over them.
///
/// Connection policy: the first-connected connection for an organization is
/// canonical for request/response and notification traffic; later
/// connections are tracked and promoted in insertion order as earlier ones
/// drop.
pub struct LiveSessionHub {
    registry: Mutex<Registry>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Value>>>,
    config: HubConfig,
}

impl LiveSessionHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            pending: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Capacity to use when creating a connection's outbound channel.
    pub fn channel_capacity(&self) -> usize {
        self.config.channel_capacity
    }

    /// Registers an authenticated connection. Both registry directions are
    /// committed before this returns, so resync logic observing the
    /// registry sees the insertion. Returns true when this is the
    /// organization's first live connection.
    pub fn insert(
        &self,
        conn_id: ConnectionId,
        org_id: OrgId,
        sender: mpsc::Sender<ServerEvent>,
    ) -> bool {
        let mut registry = self.registry.lock().unwrap();
        let conns = registry.orgs_to_conns.entry(org_id).or_default();
        conns.push(conn_id.clone());
        let first = conns.len() == 1;
        registry.conn_to_org.insert(conn_id.clone(), org_id);
        registry.senders.insert(conn_id, sender);
        first
    }

    /// Drops a connection from both registry directions. Returns the
    /// organization it belonged to, if it was known.
    pub fn remove(&self, conn_id: &str) -> Option<OrgId> {
        let mut registry = self.registry.lock().unwrap();
        registry.senders.remove(conn_id);
        let org_id = registry.conn_to_org.remove(conn_id)?;
        let emptied = match registry.orgs_to_conns.get_mut(&org_id) {
            Some(conns) => {
                conns.retain(|c| c != conn_id);
                conns.is_empty()
            }
            None => false,
        };
        if emptied {
            registry.orgs_to_conns.remove(&org_id);
        }
        Some(org_id)
    }

    pub fn org_of(&self, conn_id: &str) -> Option<OrgId> {
        self.registry.lock().unwrap().conn_to_org.get(conn_id).copied()
    }

    pub fn is_connected(&self, org_id: OrgId) -> bool {
        self.registry
            .lock()
            .unwrap()
            .orgs_to_conns
            .contains_key(&org_id)
    }

    fn canonical_sender(&self, org_id: OrgId) -> Option<mpsc::Sender<ServerEvent>> {
        let registry = self.registry.lock().unwrap();
        let conn = registry.orgs_to_conns.get(&org_id)?.first()?;
        registry.senders.get(conn).cloned()
    }

    fn sender_for(&self, conn_id: &str) -> Option<mpsc::Sender<ServerEvent>> {
        self.registry.lock().unwrap().senders.get(conn_id).cloned()
    }

    /// Fire-and-forget push to the organization's canonical connection;
    /// silently does nothing when no connection is live.
    pub async fn notify(&self, org_id: OrgId, event: ServerEvent) {
        if let Some(sender) = self.canonical_sender(org_id) {
            if sender.send(event).await.is_err() {
                tracing::debug!(org_id, "dropped notification to closing connection");
            }
        }
    }

    /// Push to one specific connection, e.g. a just-connected client being
    /// caught up.
    pub async fn send_to(&self, conn_id: &str, event: ServerEvent) -> Result<()> {
        let sender = self
            .sender_for(conn_id)
            .ok_or(HeraldError::ChannelClosed)?;
        sender
            .send(event)
            .await
            .map_err(|_| HeraldError::ChannelClosed)
    }

    /// Sends a correlated request to the organization's canonical
    /// connection and suspends until the matching response arrives.
    ///
    /// Returns `Ok(None)` when no connection is live, the caller's normal
    /// degrade-locally path, not an error. Waits at most the configured
    /// request timeout; other organizations' traffic is never blocked.
    pub async fn send_request(
        &self,
        org_id: OrgId,
        build: impl FnOnce(Uuid) -> ServerEvent,
    ) -> Result<Option<Value>> {
        let Some(sender) = self.canonical_sender(org_id) else {
            return Ok(None);
        };
        let correlation_id = Uuid::new_v4();
        let (resolve_tx, resolve_rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(correlation_id, resolve_tx);

        if sender.send(build(correlation_id)).await.is_err() {
            self.pending.lock().unwrap().remove(&correlation_id);
            return Err(HeraldError::ChannelClosed);
        }

        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, resolve_rx).await {
            Ok(Ok(body)) => Ok(Some(body)),
            Ok(Err(_)) => Err(HeraldError::ChannelClosed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&correlation_id);
                Err(HeraldError::RequestTimeout(timeout))
            }
        }
    }

    /// Completes the pending request parked under `correlation_id`.
    /// Unknown ids are expected after timeouts and log at debug.
    pub fn resolve(&self, correlation_id: Uuid, body: Value) {
        match self.pending.lock().unwrap().remove(&correlation_id) {
            Some(resolver) => {
                let _ = resolver.send(body);
            }
            None => tracing::debug!(%correlation_id, "response for unknown correlation id"),
        }
    }

    /// Records an in-play award batch for `(org_id, session_id)`.
    pub fn accumulate_xp(&self, org_id: OrgId, session_id: SessionId, batch: XpBatch) {
        self.registry
            .lock()
            .unwrap()
            .session_xp
            .entry((org_id, session_id))
            .or_default()
            .push(batch);
    }

    /// Drains the accumulated batches for a session and returns their
    /// summed award value. `None` when nothing accumulated; callers treat
    /// that as "nothing to settle", and a second take always observes it.
    pub fn take_session_xp(&self, org_id: OrgId, session_id: SessionId) -> Option<i64> {
        self.registry
            .lock()
            .unwrap()
            .session_xp
            .remove(&(org_id, session_id))
            .map(|batches| batches.iter().map(XpBatch::award).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SessionSignal;
    use serde_json::json;

    fn hub() -> LiveSessionHub {
        LiveSessionHub::new(HubConfig::default())
    }

    fn conn(hub: &LiveSessionHub, id: &str, org: OrgId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(8);
        hub.insert(id.to_string(), org, tx);
        rx
    }

    #[tokio::test]
    async fn registry_directions_stay_consistent() {
        let hub = hub();
        let _rx1 = conn(&hub, "c1", 1);
        let _rx2 = conn(&hub, "c2", 1);
        assert_eq!(hub.org_of("c1"), Some(1));
        assert!(hub.is_connected(1));

        assert_eq!(hub.remove("c1"), Some(1));
        assert_eq!(hub.org_of("c1"), None);
        assert!(hub.is_connected(1));
        assert_eq!(hub.remove("c2"), Some(1));
        assert!(!hub.is_connected(1));
        assert_eq!(hub.remove("c2"), None);
    }

    #[tokio::test]
    async fn first_connection_flag() {
        let hub = hub();
        let (tx, _rx) = mpsc::channel(8);
        assert!(hub.insert("c1".into(), 1, tx.clone()));
        assert!(!hub.insert("c2".into(), 1, tx.clone()));
        assert!(hub.insert("c3".into(), 2, tx));
    }

    #[tokio::test]
    async fn request_without_connection_degrades() {
        let hub = hub();
        let out = hub
            .send_request(1, |cid| ServerEvent::RollRequest {
                correlation_id: cid,
                payload: json!({}),
            })
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn request_resolves_on_matching_response() {
        let hub = std::sync::Arc::new(hub());
        let mut rx = conn(&hub, "c1", 1);

        let responder = {
            let hub = std::sync::Arc::clone(&hub);
            tokio::spawn(async move {
                if let Some(ServerEvent::RollRequest { correlation_id, .. }) = rx.recv().await {
                    hub.resolve(correlation_id, json!({"total": 17}));
                }
            })
        };

        let out = hub
            .send_request(1, |cid| ServerEvent::RollRequest {
                correlation_id: cid,
                payload: json!({"formula": "1d20"}),
            })
            .await
            .unwrap();
        assert_eq!(out, Some(json!({"total": 17})));
        responder.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out() {
        let hub = hub();
        let _rx = conn(&hub, "c1", 1);
        let err = hub
            .send_request(1, |cid| ServerEvent::RollRequest {
                correlation_id: cid,
                payload: json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::RequestTimeout(_)));
        assert!(hub.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_without_connection_is_silent() {
        let hub = hub();
        hub.notify(
            9,
            ServerEvent::Session {
                session_id: 1,
                title: "t".into(),
                start_ts_millis: 0,
                status: SessionSignal::Start,
            },
        )
        .await;
    }

    #[tokio::test]
    async fn session_xp_drains_once() {
        let hub = hub();
        hub.accumulate_xp(1, 7, XpBatch::new(vec![("a".into(), 100), ("b".into(), 100)]));
        hub.accumulate_xp(1, 7, XpBatch::new(vec![("a".into(), 50)]));
        assert_eq!(hub.take_session_xp(1, 7), Some(150));
        assert_eq!(hub.take_session_xp(1, 7), None);
    }
}
