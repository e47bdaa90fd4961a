//! Shared protocol, state-engine, and reliability primitives for the
//! grid-acquire multiplayer game: the code the server and client
//! binaries both build on.

pub mod config;
pub mod event;
pub mod grid;
pub mod messages;
pub mod protocol;
pub mod session;
pub mod snapshot;
pub mod testing;

pub use config::Config;
pub use grid::{Cell, CellCoord, CellState, Grid, GRID_SIZE};
pub use protocol::{MessageType, Packet, PacketError, DEFAULT_PORT, MAX_PACKET_SIZE};
pub use session::{Session, SessionState, SessionTable};
