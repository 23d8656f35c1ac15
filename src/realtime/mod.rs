//! Realtime fan-out over WebSockets.

pub mod gateway;
pub mod registry;

pub use gateway::{ws_handler, RealtimeGateway, ServerEvent};
pub use registry::{ConnectionRegistry, Room, SocketId};
