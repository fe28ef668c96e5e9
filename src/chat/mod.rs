//! Realtime chat fan-out.
//!
//! REST handlers and WebSocket sessions persist through `db::chat`, then
//! publish a [`ChatEvent`] on the room's channel in [`ChatHub`]. Every open
//! socket for that room forwards the event to its client.

pub mod hub;

pub use hub::{ChatEvent, ChatHub, ClientCommand};
