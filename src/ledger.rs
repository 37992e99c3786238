use crate::error::Result;
use crate::hub::LiveSessionHub;
use crate::protocol::ServerEvent;
use crate::session::{CharacterId, OrgId};
use crate::store::SettingsStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciles experience awards between the persisted pending ledger and
/// the live connection.
///
/// Awards are character experience *totals*: merging keeps the maximum per
/// character, so a buffered award is never decreased and re-deliveries are
/// harmless. Accrual and connect-time resync serialize on one lock so a
/// flush cannot interleave with an in-flight merge: the union of both is
/// delivered exactly once.
pub struct ExperienceLedger {
    settings: Arc<dyn SettingsStore>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl ExperienceLedger {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Merges `awards` into the organization's pending ledger, then
    /// delivers and clears it immediately when a connection is live.
    pub async fn accrue(
        &self,
        hub: &LiveSessionHub,
        org_id: OrgId,
        awards: &HashMap<CharacterId, i64>,
    ) -> Result<()> {
        if awards.is_empty() {
            warn!(org_id, "no experience to accrue");
            return Ok(());
        }
        let _guard = self.flush_lock.lock().await;
        let merged = self.settings.merge_pending_xp(org_id, awards).await?;
        if hub.is_connected(org_id) {
            hub.notify(
                org_id,
                ServerEvent::Xp {
                    awards: merged.into_iter().collect(),
                },
            )
            .await;
            self.settings.clear_pending_xp(org_id).await?;
        }
        Ok(())
    }

    /// Delivers any pending ledger to a just-connected client and clears
    /// it; a no-op when nothing is buffered.
    pub async fn resync_on_connect(
        &self,
        hub: &LiveSessionHub,
        org_id: OrgId,
        conn_id: &str,
    ) -> Result<()> {
        let _guard = self.flush_lock.lock().await;
        let Some(settings) = self.settings.get(org_id).await? else {
            return Ok(());
        };
        match settings.pending_xp {
            Some(pending) if !pending.is_empty() => {
                hub.send_to(
                    conn_id,
                    ServerEvent::Xp {
                        awards: pending.into_iter().collect(),
                    },
                )
                .await?;
                self.settings.clear_pending_xp(org_id).await?;
                info!(org_id, "pending experience flushed on connect");
            }
            _ => debug!(org_id, "no pending experience"),
        }
        Ok(())
    }
}
