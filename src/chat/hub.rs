//! Per-room fan-out of chat events to live WebSocket subscribers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::chat::ChatMessage;

/// Event pushed to room subscribers as a JSON text frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageCreated {
        message: ChatMessage,
    },
    MessageDeleted {
        room_id: Uuid,
        message_id: Uuid,
    },
    MemberJoined {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
    },
    MemberLeft {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
    },
    RoomDeleted {
        room_id: Uuid,
    },
}

/// Frame a client may send over the socket.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Send { content: String },
}

/// Lazily created broadcast channel per room.
pub struct ChatHub {
    rooms: DashMap<Uuid, broadcast::Sender<ChatEvent>>,
    capacity: usize,
}

impl ChatHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<ChatEvent> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Returns how many subscribers received the event. No channel means nobody is listening.
    pub fn publish(&self, room_id: Uuid, event: ChatEvent) -> usize {
        match self.rooms.get(&room_id) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop a subscription and prune the room channel if it was the last one.
    pub fn release(&self, room_id: Uuid, rx: broadcast::Receiver<ChatEvent>) {
        drop(rx);
        self.rooms.remove_if(&room_id, |_, tx| tx.receiver_count() == 0);
    }

    /// Forget the room. Subscribers drain buffered events, then see the channel close.
    pub fn close_room(&self, room_id: Uuid) {
        self.rooms.remove(&room_id);
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = ChatHub::new(16);
        let room = Uuid::new_v4();
        let mut a = hub.subscribe(room);
        let mut b = hub.subscribe(room);

        let delivered = hub.publish(room, ChatEvent::RoomDeleted { room_id: room });
        assert_eq!(delivered, 2);
        assert!(matches!(a.recv().await.unwrap(), ChatEvent::RoomDeleted { .. }));
        assert!(matches!(b.recv().await.unwrap(), ChatEvent::RoomDeleted { .. }));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let hub = ChatHub::new(16);
        assert_eq!(hub.publish(Uuid::new_v4(), ChatEvent::RoomDeleted { room_id: Uuid::nil() }), 0);
        assert_eq!(hub.active_rooms(), 0);
    }

    #[test]
    fn test_release_prunes_last_subscriber() {
        let hub = ChatHub::new(16);
        let room = Uuid::new_v4();
        let a = hub.subscribe(room);
        let b = hub.subscribe(room);

        hub.release(room, a);
        assert_eq!(hub.active_rooms(), 1);
        hub.release(room, b);
        assert_eq!(hub.active_rooms(), 0);
    }

    #[tokio::test]
    async fn test_close_room_ends_streams() {
        let hub = ChatHub::new(16);
        let room = Uuid::new_v4();
        let mut rx = hub.subscribe(room);

        hub.publish(room, ChatEvent::RoomDeleted { room_id: room });
        hub.close_room(room);

        assert!(rx.recv().await.is_ok());
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[test]
    fn test_event_wire_format() {
        let room = Uuid::nil();
        let json = serde_json::to_value(ChatEvent::RoomDeleted { room_id: room }).unwrap();
        assert_eq!(json["type"], "room_deleted");

        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"send","content":"hi"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Send { content: "hi".into() });
    }
}
