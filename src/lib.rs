#![doc = include_str!("../README.md")]
#![warn(rustdoc::broken_intra_doc_links)]
pub mod announce;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod levels;
pub mod protocol;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod store;

pub use announce::{Announcement, Announcer, ThreadDisposition};
pub use config::{CoordinatorConfig, HubConfig};
pub use coordinator::{RewardOutcome, SessionChanges, SessionCoordinator};
pub use error::{HeraldError, Result};
pub use hub::{ConnectionId, LiveSessionHub, XpBatch};
pub use ledger::ExperienceLedger;
pub use protocol::{ClientEvent, CombatPayload, ServerEvent, SessionSignal};
pub use provider::{EventChanges, EventProvider, EventSnapshot, EventSpec, EventStatus};
pub use scheduler::SessionEventManager;
pub use session::{OrgId, Session, SessionBuilder, SessionId};
pub use store::{
    CharacterRecord, CharacterStore, InMemoryCharacterStore, InMemorySessionStore,
    InMemorySettingsStore, OrgSettings, SessionStore, SettingsStore,
};
