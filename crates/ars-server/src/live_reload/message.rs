//! JSON messages shared by every transport.

use ars_watch::{ChangeEvent, ChangeKind};
use serde::Serialize;

/// A message sent to a browser.
///
/// Polling only ever sees `ping` and a bare `update`; streaming transports
/// also get `connected`, `heartbeat` and the changed path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ServerMessage {
    Connected,
    Heartbeat,
    Ping,
    Update {
        reload: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ChangeKind>,
    },
}

impl ServerMessage {
    /// Coalesced reload signal without path detail.
    pub(crate) fn reload() -> Self {
        Self::Update {
            reload: true,
            path: None,
            kind: None,
        }
    }

    pub(crate) fn from_change(change: &ChangeEvent) -> Self {
        Self::Update {
            reload: true,
            path: Some(change.path.clone()),
            kind: Some(change.kind),
        }
    }

    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(self).expect("server messages always serialize")
    }
}
