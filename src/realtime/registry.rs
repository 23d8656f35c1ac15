//! In-process connection registry for WebSocket fan-out.
//!
//! Tracks live sockets, which user each belongs to, and room membership.
//! Sends go through per-socket unbounded channels, so delivery never blocks
//! the caller; a closed channel is cleaned up on the next unregister.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub type SocketId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(Uuid),
    Conversation(Uuid),
    Company(Uuid),
}

struct SocketHandle {
    user_id: Uuid,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct RegistryInner {
    sockets: HashMap<SocketId, SocketHandle>,
    user_sockets: HashMap<Uuid, HashSet<SocketId>>,
    rooms: HashMap<Room, HashSet<SocketId>>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a socket and joins it to its user room.
    pub fn register(&self, user_id: Uuid, sender: mpsc::UnboundedSender<String>) -> SocketId {
        let socket_id = Uuid::new_v4();
        let mut inner = self.inner.write().expect("registry lock poisoned");

        inner
            .sockets
            .insert(socket_id, SocketHandle { user_id, sender });
        inner
            .user_sockets
            .entry(user_id)
            .or_default()
            .insert(socket_id);
        inner
            .rooms
            .entry(Room::User(user_id))
            .or_default()
            .insert(socket_id);

        debug!(socket_id = %socket_id, user_id = %user_id, "Socket registered");
        socket_id
    }

    pub fn unregister(&self, socket_id: SocketId) {
        let mut inner = self.inner.write().expect("registry lock poisoned");

        let Some(handle) = inner.sockets.remove(&socket_id) else {
            return;
        };

        if let Some(set) = inner.user_sockets.get_mut(&handle.user_id) {
            set.remove(&socket_id);
            if set.is_empty() {
                inner.user_sockets.remove(&handle.user_id);
            }
        }

        inner.rooms.retain(|_, members| {
            members.remove(&socket_id);
            !members.is_empty()
        });

        debug!(socket_id = %socket_id, user_id = %handle.user_id, "Socket unregistered");
    }

    pub fn join(&self, socket_id: SocketId, room: Room) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.sockets.contains_key(&socket_id) {
            return false;
        }
        inner.rooms.entry(room).or_default().insert(socket_id);
        true
    }

    pub fn leave(&self, socket_id: SocketId, room: Room) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(members) = inner.rooms.get_mut(&room) {
            members.remove(&socket_id);
            if members.is_empty() {
                inner.rooms.remove(&room);
            }
        }
    }

    pub fn socket_user(&self, socket_id: SocketId) -> Option<Uuid> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.sockets.get(&socket_id).map(|h| h.user_id)
    }

    /// Sends a payload to every socket in a room. Returns how many sockets
    /// the payload was queued for.
    pub fn send_to_room(&self, room: Room, payload: &str) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        let Some(members) = inner.rooms.get(&room) else {
            return 0;
        };

        let mut delivered = 0;
        for socket_id in members {
            if let Some(handle) = inner.sockets.get(socket_id) {
                if handle.sender.send(payload.to_string()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Like `send_to_room`, skipping one socket (typically the sender).
    pub fn send_to_room_except(&self, room: Room, except: SocketId, payload: &str) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        let Some(members) = inner.rooms.get(&room) else {
            return 0;
        };

        let mut delivered = 0;
        for socket_id in members {
            if *socket_id == except {
                continue;
            }
            if let Some(handle) = inner.sockets.get(socket_id) {
                if handle.sender.send(payload.to_string()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn send_to_user(&self, user_id: Uuid, payload: &str) -> usize {
        self.send_to_room(Room::User(user_id), payload)
    }

    pub fn send_to_socket(&self, socket_id: SocketId, payload: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .sockets
            .get(&socket_id)
            .map(|h| h.sender.send(payload.to_string()).is_ok())
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.sockets.len()
    }

    pub fn is_user_online(&self, user_id: Uuid) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.user_sockets.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_register_joins_user_room() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let (tx, mut rx) = channel();

        let socket_id = registry.register(user_id, tx);
        assert!(registry.is_user_online(user_id));
        assert_eq!(registry.socket_user(socket_id), Some(user_id));

        assert_eq!(registry.send_to_user(user_id, "hello"), 1);
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_unregister_cleans_rooms() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let (tx, _rx) = channel();

        let socket_id = registry.register(user_id, tx);
        let room = Room::Conversation(Uuid::new_v4());
        assert!(registry.join(socket_id, room));

        registry.unregister(socket_id);
        assert!(!registry.is_user_online(user_id));
        assert_eq!(registry.send_to_room(room, "x"), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_room_fanout_multiple_sockets() {
        let registry = ConnectionRegistry::new();
        let room = Room::Company(Uuid::new_v4());

        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let s1 = registry.register(Uuid::new_v4(), tx1);
        let s2 = registry.register(Uuid::new_v4(), tx2);
        registry.join(s1, room);
        registry.join(s2, room);

        assert_eq!(registry.send_to_room(room, "notice"), 2);
        assert_eq!(rx1.try_recv().unwrap(), "notice");
        assert_eq!(rx2.try_recv().unwrap(), "notice");
    }

    #[test]
    fn test_send_to_room_except_skips_sender() {
        let registry = ConnectionRegistry::new();
        let room = Room::Conversation(Uuid::new_v4());

        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let s1 = registry.register(Uuid::new_v4(), tx1);
        let s2 = registry.register(Uuid::new_v4(), tx2);
        registry.join(s1, room);
        registry.join(s2, room);

        assert_eq!(registry.send_to_room_except(room, s1, "typing"), 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), "typing");
    }

    #[test]
    fn test_join_unknown_socket_rejected() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.join(Uuid::new_v4(), Room::User(Uuid::new_v4())));
    }
}
