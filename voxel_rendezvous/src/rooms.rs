//! Room bookkeeping.
//!
//! Pure state: every operation returns the pushes it causes and the server
//! delivers them in order. A room holds its host and its members in join
//! order; when the host leaves, the oldest remaining member takes over.

use std::collections::BTreeMap;

use tracing::{debug, info};
use voxel_shared::{
    entity::PeerId,
    rendezvous::{RendezvousEvent, Role},
};

/// One push for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: PeerId,
    pub event: RendezvousEvent,
}

impl Outbound {
    fn new(to: PeerId, event: RendezvousEvent) -> Self {
        Self { to, event }
    }
}

#[derive(Debug, Clone)]
struct Room {
    host: PeerId,
    members: Vec<PeerId>,
}

#[derive(Debug, Default)]
pub struct Rooms {
    rooms: BTreeMap<String, Room>,
    member_of: BTreeMap<PeerId, String>,
}

impl Rooms {
    /// No rooms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current host of `room`.
    pub fn host_of(&self, room: &str) -> Option<PeerId> {
        self.rooms.get(room).map(|r| r.host)
    }

    /// Members in join order.
    pub fn members(&self, room: &str) -> &[PeerId] {
        self.rooms.get(room).map(|r| r.members.as_slice()).unwrap_or(&[])
    }

    /// Room `user` is in.
    pub fn room_of(&self, user: PeerId) -> Option<&str> {
        self.member_of.get(&user).map(String::as_str)
    }

    /// Number of open rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// True when no room is open.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// First joiner hosts; later joiners are clients of the current host and
    /// every existing member hears about them. Joining another room leaves
    /// the current one first.
    pub fn join(&mut self, user: PeerId, room_id: &str) -> Vec<Outbound> {
        let mut out = Vec::new();
        match self.member_of.get(&user).cloned().as_deref() {
            Some(current) if current == room_id => {
                debug!(peer = %user, room = %room_id, "Already in room");
                return out;
            }
            Some(_) => out.extend(self.leave(user)),
            None => {}
        }

        self.member_of.insert(user, room_id.to_string());
        match self.rooms.get_mut(room_id) {
            None => {
                self.rooms.insert(
                    room_id.to_string(),
                    Room {
                        host: user,
                        members: vec![user],
                    },
                );
                info!(peer = %user, room = %room_id, "Room created");
                out.push(Outbound::new(
                    user,
                    RendezvousEvent::RoleAssigned {
                        role: Role::Host,
                        host_id: Some(user),
                    },
                ));
            }
            Some(room) => {
                info!(peer = %user, room = %room_id, host = %room.host, "Joined room");
                out.push(Outbound::new(
                    user,
                    RendezvousEvent::RoleAssigned {
                        role: Role::Client,
                        host_id: Some(room.host),
                    },
                ));
                for &m in &room.members {
                    out.push(Outbound::new(m, RendezvousEvent::UserJoined { user_id: user }));
                }
                room.members.push(user);
            }
        }
        out
    }

    /// Relays `payload` to `target` if both share a room.
    pub fn signal(&self, from: PeerId, target: PeerId, payload: serde_json::Value) -> Vec<Outbound> {
        let same_room = matches!(
            (self.member_of.get(&from), self.member_of.get(&target)),
            (Some(a), Some(b)) if a == b
        );
        if !same_room || from == target {
            debug!(peer = %from, target = %target, "Dropping signal outside a shared room");
            return Vec::new();
        }
        vec![Outbound::new(target, RendezvousEvent::Signal { sender: from, payload })]
    }

    /// Removes `user`. If it hosted, the oldest remaining member is promoted:
    /// everyone left hears `host-migrated` then `user-left`, and the new host
    /// gets a `user-joined` per remaining member so it can offer them a link.
    pub fn leave(&mut self, user: PeerId) -> Vec<Outbound> {
        let Some(room_id) = self.member_of.remove(&user) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Vec::new();
        };
        room.members.retain(|&m| m != user);

        let Some(&oldest) = room.members.first() else {
            info!(room = %room_id, "Room closed");
            self.rooms.remove(&room_id);
            return Vec::new();
        };

        let mut out = Vec::new();
        if room.host == user {
            room.host = oldest;
            info!(room = %room_id, old = %user, new = %oldest, "Host migrated");
            for &m in &room.members {
                out.push(Outbound::new(m, RendezvousEvent::HostMigrated { new_host_id: oldest }));
            }
            for &m in &room.members {
                out.push(Outbound::new(m, RendezvousEvent::UserLeft { user_id: user }));
            }
            for &m in room.members.iter().filter(|&&m| m != oldest) {
                out.push(Outbound::new(oldest, RendezvousEvent::UserJoined { user_id: m }));
            }
        } else {
            info!(room = %room_id, peer = %user, "Left room");
            for &m in &room.members {
                out.push(Outbound::new(m, RendezvousEvent::UserLeft { user_id: user }));
            }
        }
        out
    }
}
