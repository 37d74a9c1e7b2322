//! Session membership.
//!
//! A [`Session`] is the container for one match. It only stores member ids;
//! the [`Client`](crate::client::Client) entries live in the
//! [`ClientManager`] and carry the back-reference to their session. Any
//! membership change re-sends the full roster to every member, which is the
//! only way peers discover each other.

use crate::client_manager::ClientManager;
use log::debug;
use shared::{ClientId, PeerState, Roster, ServerMessage, SessionId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("client {client} is already in session {session}")]
    AlreadyInSession { client: ClientId, session: SessionId },
    #[error("client {client} is not in session {session}")]
    NotInSession { client: ClientId, session: SessionId },
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
}

/// Peer fan-out failures. A broadcast from outside a session is a bug in the
/// caller, never something a client can trigger on its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("client {0} broadcast without a session")]
    NoSession(ClientId),
}

/// Lifecycle of the match a session hosts.
///
/// Closing is not a phase: a closed session is simply gone from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Fewer than two members have joined so far
    Waiting,
    /// Two sides are in play
    Active,
    /// The outcome has been decided and broadcast
    Resolved,
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    members: Vec<ClientId>,
    pub phase: MatchPhase,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            members: Vec::new(),
            phase: MatchPhase::Waiting,
        }
    }

    pub fn members(&self) -> &[ClientId] {
        &self.members
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.members.iter().any(|m| m == client_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds a client and broadcasts the new roster.
    ///
    /// Fails without touching either session if the client already belongs
    /// to one.
    pub fn join(&mut self, clients: &mut ClientManager, client_id: &str) -> Result<(), SessionError> {
        let client = clients
            .get_mut(client_id)
            .ok_or_else(|| SessionError::UnknownClient(client_id.to_string()))?;

        if let Some(session) = &client.session {
            return Err(SessionError::AlreadyInSession {
                client: client_id.to_string(),
                session: session.clone(),
            });
        }

        client.session = Some(self.id.clone());
        self.members.push(client_id.to_string());
        if self.phase == MatchPhase::Waiting && self.members.len() >= 2 {
            self.phase = MatchPhase::Active;
        }

        debug!("Client {} joined session {}", client_id, self.id);
        self.broadcast_roster(clients);
        Ok(())
    }

    /// Removes a client and broadcasts the smaller roster to who is left.
    pub fn leave(&mut self, clients: &mut ClientManager, client_id: &str) -> Result<(), SessionError> {
        let client = clients
            .get_mut(client_id)
            .ok_or_else(|| SessionError::UnknownClient(client_id.to_string()))?;

        if client.session.as_deref() != Some(self.id.as_str()) {
            return Err(SessionError::NotInSession {
                client: client_id.to_string(),
                session: self.id.clone(),
            });
        }

        client.session = None;
        self.members.retain(|m| m != client_id);

        debug!("Client {} left session {}", client_id, self.id);
        self.broadcast_roster(clients);
        Ok(())
    }

    /// Sends every member its own id plus the id and last known state of all
    /// members, itself included.
    pub fn broadcast_roster(&self, clients: &ClientManager) {
        let peers: Vec<PeerState> = self
            .members
            .iter()
            .filter_map(|id| clients.get(id))
            .map(|c| PeerState {
                id: c.id.clone(),
                state: c.state.clone(),
            })
            .collect();

        for client in self.members.iter().filter_map(|id| clients.get(id)) {
            client.send(&ServerMessage::SessionBroadcast {
                peers: Roster {
                    you: client.id.clone(),
                    clients: peers.clone(),
                },
            });
        }
    }

    /// Sends to every member except `sender`.
    pub fn broadcast_from(&self, clients: &ClientManager, sender: &str, message: &ServerMessage) {
        for client in self
            .members
            .iter()
            .filter(|id| id.as_str() != sender)
            .filter_map(|id| clients.get(id))
        {
            client.send(message);
        }
    }

    pub fn send_all(&self, clients: &ClientManager, message: &ServerMessage) {
        for client in self.members.iter().filter_map(|id| clients.get(id)) {
            client.send(message);
        }
    }

    /// Members whose side is still in play.
    pub fn alive_members<'a>(&'a self, clients: &'a ClientManager) -> impl Iterator<Item = &'a ClientId> + 'a {
        self.members
            .iter()
            .filter(move |id| clients.get(id).is_some_and(|c| c.is_alive))
    }
}
