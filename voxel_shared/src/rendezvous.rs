//! Rendezvous contract.
//!
//! Peers hold one connection to the rendezvous server for room membership and
//! connection setup. Frames use the same newline-delimited JSON as the data
//! channel (`net::FrameReader` / `net::FrameWriter`), tagged by `type` in
//! kebab case.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::entity::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Host,
    Client,
}

/// Peer -> rendezvous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RendezvousRequest {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    /// Opaque payload relayed to `target`.
    Signal { target: PeerId, payload: serde_json::Value },
}

/// Rendezvous -> peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RendezvousEvent {
    /// Identity of this connection, sent once on connect.
    #[serde(rename_all = "camelCase")]
    Welcome { user_id: PeerId },
    #[serde(rename_all = "camelCase")]
    RoleAssigned {
        role: Role,
        #[serde(default)]
        host_id: Option<PeerId>,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined { user_id: PeerId },
    #[serde(rename_all = "camelCase")]
    HostMigrated { new_host_id: PeerId },
    #[serde(rename_all = "camelCase")]
    UserLeft { user_id: PeerId },
    Signal { sender: PeerId, payload: serde_json::Value },
}

/// Connection-setup payload a host signals to a member: where to dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SignalPayload {
    Offer { addr: SocketAddr },
}

impl SignalPayload {
    /// Opaque JSON for a `signal` request.
    pub fn to_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Reads a payload back. `None` if it is not ours.
    pub fn from_value(v: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(v.clone()).ok()
    }
}
