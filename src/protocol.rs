use crate::session::{CharacterId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

const MAX_COMBAT_TITLE: usize = 256;
const MAX_COMBAT_DESCRIPTION: usize = 4096;
const MAX_COMBAT_FIELDS: usize = 25;
const MAX_COMBAT_FIELD_NAME: usize = 256;
const MAX_COMBAT_FIELD_VALUE: usize = 1024;

/// Whether a session notification marks the start or the end of play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSignal {
    Start,
    Stop,
}

/// Events received from an external game client over a live connection.
///
/// Connection open/close are transport concerns and arrive through
/// [`SessionCoordinator::on_connect`]/[`on_disconnect`] rather than as
/// payloads.
///
/// [`SessionCoordinator::on_connect`]: crate::coordinator::SessionCoordinator::on_connect
/// [`on_disconnect`]: crate::coordinator::SessionCoordinator::on_disconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// An in-play experience award batch for an active session.
    XpBatch {
        session_id: SessionId,
        awards: Vec<(CharacterId, i64)>,
    },
    /// A combat log payload to relay into the organization's combat channel.
    Combat { payload: Value },
    /// The answer to a previously sent correlated request.
    Response { correlation_id: Uuid, body: Value },
}

/// Events pushed to an external game client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A session started or stopped.
    Session {
        session_id: SessionId,
        title: String,
        start_ts_millis: i64,
        status: SessionSignal,
    },
    /// Experience totals to apply, one entry per character.
    Xp { awards: BTreeMap<CharacterId, i64> },
    /// Ask the client to perform a roll; answered via
    /// [`ClientEvent::Response`].
    RollRequest { correlation_id: Uuid, payload: Value },
    /// Ask the client for an item's description text; answered via
    /// [`ClientEvent::Response`].
    ItemDescriptionRequest {
        correlation_id: Uuid,
        actor_id: CharacterId,
        item_id: String,
    },
}

/// A combat log entry extracted from a client payload, with every text
/// field clamped to the host platform's embed limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatPayload {
    pub title: String,
    pub description: String,
    pub fields: Vec<CombatField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl CombatPayload {
    /// Extracts a well-formed combat payload, clamping lengths and field
    /// counts. Returns `None` when `title` or `description` are missing or
    /// not strings; malformed entries in `fields` are skipped.
    pub fn parse(payload: &Value) -> Option<CombatPayload> {
        let title = payload.get("title")?.as_str()?;
        let description = payload.get("description")?.as_str()?;
        let fields = payload
            .get("fields")
            .and_then(Value::as_array)
            .map(|raw| {
                raw.iter()
                    .take(MAX_COMBAT_FIELDS)
                    .filter_map(|f| {
                        Some(CombatField {
                            name: clamp(f.get("name")?.as_str()?, MAX_COMBAT_FIELD_NAME),
                            value: clamp(f.get("value")?.as_str()?, MAX_COMBAT_FIELD_VALUE),
                            inline: f.get("inline").and_then(Value::as_bool).unwrap_or(true),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(CombatPayload {
            title: clamp(title, MAX_COMBAT_TITLE),
            description: clamp(description, MAX_COMBAT_DESCRIPTION),
            fields,
        })
    }
}

fn clamp(s: &str, max: usize) -> String {
    let mut idx = max.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    s[..idx].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_round_trip_tagged_json() {
        let event = ClientEvent::XpBatch {
            session_id: 7,
            awards: vec![("c1".into(), 100)],
        };
        let js = serde_json::to_value(&event).unwrap();
        assert_eq!(js["type"], "xp_batch");
        let back: ClientEvent = serde_json::from_value(js).unwrap();
        assert!(matches!(back, ClientEvent::XpBatch { session_id: 7, .. }));
    }

    #[test]
    fn combat_payload_requires_title_and_description() {
        assert!(CombatPayload::parse(&json!({"title": "Round 1"})).is_none());
        let parsed = CombatPayload::parse(&json!({
            "title": "Round 1",
            "description": "Initiative order",
            "fields": [
                {"name": "Durnan", "value": "17"},
                {"name": 3, "value": "skipped"},
            ],
        }))
        .unwrap();
        assert_eq!(parsed.fields.len(), 1);
        assert!(parsed.fields[0].inline);
    }

    #[test]
    fn combat_payload_clamps_lengths() {
        let parsed = CombatPayload::parse(&json!({
            "title": "t".repeat(400),
            "description": "d",
        }))
        .unwrap();
        assert_eq!(parsed.title.len(), 256);
    }
}
