//! Role and topology state machine.
//!
//! `Unassigned -> Client | Host`. A client becomes host only through a
//! migration naming it. A host never transitions; when it leaves, it is gone.
//! The runtime owns a `Simulation` exactly while this says `Host`.

use tracing::{info, warn};

use crate::{entity::PeerId, rendezvous::Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    Unassigned,
    Client { host: PeerId },
    Host,
}

/// What the runtime must do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start a host session. `migrated` means keep the replicated world.
    BecameHost { migrated: bool },
    /// Wait for the host's offer and connect to it.
    BecameClient { host: PeerId },
    /// Drop the current link; the named peer is the new host.
    Repoint { host: PeerId },
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Topology {
    me: PeerId,
    state: RoleState,
}

impl Topology {
    /// Unassigned peer.
    pub fn new(me: PeerId) -> Self {
        Self {
            me,
            state: RoleState::Unassigned,
        }
    }

    /// Starts as host with no room, e.g. after loading a snapshot.
    pub fn detached(me: PeerId) -> Self {
        Self {
            me,
            state: RoleState::Host,
        }
    }

    /// This peer.
    pub fn me(&self) -> PeerId {
        self.me
    }

    /// Current role.
    pub fn state(&self) -> RoleState {
        self.state
    }

    /// Whether this peer hosts.
    pub fn is_host(&self) -> bool {
        self.state == RoleState::Host
    }

    /// Current host, if known.
    pub fn host(&self) -> Option<PeerId> {
        match self.state {
            RoleState::Unassigned => None,
            RoleState::Client { host } => Some(host),
            RoleState::Host => Some(self.me),
        }
    }

    /// Handles `role-assigned`. Only the first assignment changes state.
    pub fn on_role_assigned(&mut self, role: Role, host_id: Option<PeerId>) -> Transition {
        if self.state != RoleState::Unassigned {
            warn!(peer = %self.me, ?role, "Role already assigned, ignoring");
            return Transition::Ignored;
        }
        match (role, host_id) {
            (Role::Host, _) => {
                info!(peer = %self.me, "Assigned HOST");
                self.state = RoleState::Host;
                Transition::BecameHost { migrated: false }
            }
            (Role::Client, Some(host)) if host != self.me => {
                info!(peer = %self.me, host = %host, "Assigned CLIENT");
                self.state = RoleState::Client { host };
                Transition::BecameClient { host }
            }
            (Role::Client, _) => {
                warn!(peer = %self.me, "CLIENT role without a usable host id");
                Transition::Ignored
            }
        }
    }

    /// Handles `host-migrated`.
    pub fn on_host_migrated(&mut self, new_host: PeerId) -> Transition {
        match self.state {
            RoleState::Client { .. } if new_host == self.me => {
                info!(peer = %self.me, "Promoted to HOST");
                self.state = RoleState::Host;
                Transition::BecameHost { migrated: true }
            }
            RoleState::Client { host } if host != new_host => {
                info!(peer = %self.me, host = %new_host, "Host migrated");
                self.state = RoleState::Client { host: new_host };
                Transition::Repoint { host: new_host }
            }
            _ => Transition::Ignored,
        }
    }
}
