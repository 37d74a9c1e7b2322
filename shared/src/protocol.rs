//! JSON wire protocol between the browser/headless clients and the relay.
//!
//! Every frame is a JSON object whose `type` field selects the message. Field
//! names are camelCase on the wire.

use crate::arena::{empty_matrix, Matrix};
use crate::piece::{Player, Position};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Opaque connection identifier assigned by the relay.
pub type ClientId = String;
/// Opaque session identifier assigned by the relay.
pub type SessionId = String;

/// Persistent account id of a logged-in player.
///
/// Accounts are numeric in the account service but older clients sent them as
/// strings, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountId {
    Number(u64),
    Text(String),
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountId::Number(n) => write!(f, "{}", n),
            AccountId::Text(s) => f.write_str(s),
        }
    }
}

/// Top-level slice of a side's replicated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fragment {
    Arena,
    Player,
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Arena => f.write_str("arena"),
            Fragment::Player => f.write_str("player"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaSnapshot {
    #[serde(default)]
    pub matrix: Matrix,
}

/// Last known values of one side's state, used to seed a newly joined peer.
///
/// A fragment left out by the client has no slot, and updates addressed to it
/// are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedState {
    #[serde(default)]
    pub arena: Option<ArenaSnapshot>,
    #[serde(default)]
    pub player: Option<Player>,
}

impl ReplicatedState {
    /// Empty board, no piece, zero score.
    pub fn initial(width: usize, height: usize) -> Self {
        Self {
            arena: Some(ArenaSnapshot {
                matrix: empty_matrix(width, height),
            }),
            player: Some(Player::default()),
        }
    }

    pub fn has_fragment(&self, fragment: Fragment) -> bool {
        match fragment {
            Fragment::Arena => self.arena.is_some(),
            Fragment::Player => self.player.is_some(),
        }
    }

    /// Writes the change into its slot. Returns `false` when the slot is missing.
    pub fn apply(&mut self, change: &StateChange) -> bool {
        match (change, &mut self.arena, &mut self.player) {
            (StateChange::ArenaMatrix(matrix), Some(arena), _) => arena.matrix = matrix.clone(),
            (StateChange::PlayerMatrix(matrix), _, Some(player)) => {
                player.matrix = matrix.clone()
            }
            (StateChange::PlayerPos(pos), _, Some(player)) => player.pos = *pos,
            (StateChange::PlayerScore(score), _, Some(player)) => player.score = *score,
            _ => return false,
        }
        true
    }

    pub fn score(&self) -> u64 {
        self.player.as_ref().map_or(0, |p| p.score)
    }
}

#[derive(Debug, Error)]
pub enum StateUpdateError {
    #[error("unknown property `{prop}` on fragment `{fragment}`")]
    UnknownProperty { fragment: Fragment, prop: String },
    #[error("invalid value for `{fragment}.{prop}`: {source}")]
    InvalidValue {
        fragment: Fragment,
        prop: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A validated `(fragment, property, value)` update.
///
/// On the wire an update travels as `fragment` plus a `[prop, value]` pair;
/// only the combinations below are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    ArenaMatrix(Matrix),
    PlayerMatrix(Option<Matrix>),
    PlayerPos(Position),
    PlayerScore(u64),
}

impl StateChange {
    pub fn parse(fragment: Fragment, prop: &str, value: Value) -> Result<Self, StateUpdateError> {
        let invalid = |source| StateUpdateError::InvalidValue {
            fragment,
            prop: prop.to_string(),
            source,
        };

        match (fragment, prop) {
            (Fragment::Arena, "matrix") => serde_json::from_value(value)
                .map(StateChange::ArenaMatrix)
                .map_err(invalid),
            (Fragment::Player, "matrix") => serde_json::from_value(value)
                .map(StateChange::PlayerMatrix)
                .map_err(invalid),
            (Fragment::Player, "pos") => serde_json::from_value(value)
                .map(StateChange::PlayerPos)
                .map_err(invalid),
            (Fragment::Player, "score") => serde_json::from_value(value)
                .map(StateChange::PlayerScore)
                .map_err(invalid),
            _ => Err(StateUpdateError::UnknownProperty {
                fragment,
                prop: prop.to_string(),
            }),
        }
    }

    pub fn fragment(&self) -> Fragment {
        match self {
            StateChange::ArenaMatrix(_) => Fragment::Arena,
            StateChange::PlayerMatrix(_) | StateChange::PlayerPos(_) | StateChange::PlayerScore(_) => {
                Fragment::Player
            }
        }
    }

    pub fn prop(&self) -> &'static str {
        match self {
            StateChange::ArenaMatrix(_) | StateChange::PlayerMatrix(_) => "matrix",
            StateChange::PlayerPos(_) => "pos",
            StateChange::PlayerScore(_) => "score",
        }
    }

    pub fn value(&self) -> Value {
        match self {
            StateChange::ArenaMatrix(matrix) => matrix_value(matrix),
            StateChange::PlayerMatrix(Some(matrix)) => matrix_value(matrix),
            StateChange::PlayerMatrix(None) => Value::Null,
            StateChange::PlayerPos(pos) => {
                let mut map = serde_json::Map::new();
                map.insert("x".to_string(), Value::from(pos.x));
                map.insert("y".to_string(), Value::from(pos.y));
                Value::Object(map)
            }
            StateChange::PlayerScore(score) => Value::from(*score),
        }
    }

    /// The `[prop, value]` pair carried in a `state-update` frame.
    pub fn wire_state(&self) -> (String, Value) {
        (self.prop().to_string(), self.value())
    }

    /// Client-side `state-update` frame for this change.
    pub fn into_message(self, lines_cleared: Option<u32>) -> ClientMessage {
        ClientMessage::StateUpdate {
            fragment: self.fragment(),
            state: self.wire_state(),
            lines_cleared,
        }
    }
}

fn matrix_value(matrix: &Matrix) -> Value {
    Value::Array(
        matrix
            .iter()
            .map(|row| Value::Array(row.iter().map(|&c| Value::from(c)).collect()))
            .collect(),
    )
}

/// Frames sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinLobby {
        username: String,
        #[serde(default)]
        user_id: Option<AccountId>,
    },
    ChatMessage {
        message: String,
    },
    StartGame,
    CreateSession {
        #[serde(default)]
        state: Option<ReplicatedState>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        user_id: Option<AccountId>,
    },
    JoinSession {
        id: SessionId,
        #[serde(default)]
        state: Option<ReplicatedState>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        user_id: Option<AccountId>,
    },
    StateUpdate {
        fragment: Fragment,
        state: (String, Value),
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lines_cleared: Option<u32>,
    },
    PlayerDied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub id: ClientId,
    pub username: Option<String>,
    pub user_id: Option<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerState {
    pub id: ClientId,
    pub state: Option<ReplicatedState>,
}

/// Full member list of a session as seen by `you`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub you: ClientId,
    pub clients: Vec<PeerState>,
}

/// One side of a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub id: ClientId,
    pub username: Option<String>,
    pub user_id: Option<AccountId>,
    pub score: u64,
}

/// Frames sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    LobbyState {
        your_id: ClientId,
        players: Vec<LobbyPlayer>,
    },
    ChatMessage {
        username: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    GameStart {
        session_id: SessionId,
        state: ReplicatedState,
    },
    SessionCreated {
        id: SessionId,
    },
    SessionBroadcast {
        peers: Roster,
    },
    StateUpdate {
        client_id: ClientId,
        fragment: Fragment,
        state: (String, Value),
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lines_cleared: Option<u32>,
    },
    GarbageAttack {
        lines: u32,
        from_player: ClientId,
    },
    PlayerDied {
        player_id: ClientId,
    },
    GameOver {
        winner: PlayerResult,
        loser: PlayerResult,
    },
    ReturnToLobby,
    SessionError {
        message: String,
    },
}
