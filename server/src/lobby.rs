//! Holding area for connections that are not in a session yet.

use crate::client_manager::ClientManager;
use shared::{ClientId, LobbyPlayer, ServerMessage};

#[derive(Debug, Default)]
pub struct Lobby {
    /// Waiting connections in arrival order
    waiting: Vec<ClientId>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the client was already waiting.
    pub fn join(&mut self, client_id: &str) -> bool {
        if self.contains(client_id) {
            return false;
        }
        self.waiting.push(client_id.to_string());
        true
    }

    /// Returns false if the client was not waiting.
    pub fn leave(&mut self, client_id: &str) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|id| id != client_id);
        self.waiting.len() != before
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.waiting.iter().any(|id| id == client_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn members(&self) -> &[ClientId] {
        &self.waiting
    }

    /// Removes and returns the two longest-waiting connections.
    pub fn take_pair(&mut self) -> Option<(ClientId, ClientId)> {
        if self.waiting.len() < 2 {
            return None;
        }
        let mut pair = self.waiting.drain(..2);
        let first = pair.next()?;
        let second = pair.next()?;
        Some((first, second))
    }

    pub fn players(&self, clients: &ClientManager) -> Vec<LobbyPlayer> {
        self.waiting
            .iter()
            .filter_map(|id| clients.get(id))
            .map(|c| LobbyPlayer {
                id: c.id.clone(),
                username: c.username.clone(),
                user_id: c.user_id.clone(),
            })
            .collect()
    }

    /// Sends every waiting connection the current lobby roster.
    pub fn broadcast_state(&self, clients: &ClientManager) {
        let players = self.players(clients);
        for client in self.waiting.iter().filter_map(|id| clients.get(id)) {
            client.send(&ServerMessage::LobbyState {
                your_id: client.id.clone(),
                players: players.clone(),
            });
        }
    }

    pub fn broadcast_except(&self, clients: &ClientManager, exclude: &str, message: &ServerMessage) {
        for client in self
            .waiting
            .iter()
            .filter(|id| id.as_str() != exclude)
            .filter_map(|id| clients.get(id))
        {
            client.send(message);
        }
    }
}
