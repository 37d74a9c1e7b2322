//! Types and rules shared by the relay server and the headless client.
//!
//! - [`arena`]: the settled-piece grid and the pure board operations
//!   (collision, merge, line sweep with combo scoring, garbage injection).
//! - [`piece`]: the falling piece, its shapes and rotation.
//! - [`protocol`]: the JSON wire messages exchanged over the WebSocket and the
//!   replicated state snapshot each side publishes.

pub mod arena;
pub mod piece;
pub mod protocol;

pub use arena::{
    empty_matrix, garbage_for_clear, Arena, Matrix, SweepResult, ARENA_HEIGHT, ARENA_WIDTH,
    EMPTY_CELL, GARBAGE_CELL, LINE_BASE_SCORE,
};
pub use piece::{Player, Position, PieceKind};
pub use protocol::{
    AccountId, ClientId, ClientMessage, Fragment, LobbyPlayer, PeerState, PlayerResult,
    ReplicatedState, Roster, ServerMessage, SessionId, StateChange, StateUpdateError,
};
