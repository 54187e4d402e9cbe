//! WebSocket connection management: handles, registry, lifecycle, heartbeat, auth.

pub mod authenticator;
pub mod close;
pub mod handle;
pub mod heartbeat;
pub mod manager;
pub mod registry;

pub use close::CloseReason;
pub use handle::{ConnectionHandle, ConnectionId, ConnectionInfo, FrameKind, OutboundFrame};
pub use manager::ConnectionManager;
pub use registry::{ConnectionRegistry, Registration};
