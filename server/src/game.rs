//! Match coordination.
//!
//! [`MatchCoordinator`] owns every piece of shared relay state: the connection
//! registry, the lobby and the session table. It is driven by a single task
//! (see [`network`](crate::network)), so each handler runs to completion and
//! sends its broadcasts before the next event from any connection is looked at.
//!
//! A session's match goes `Waiting -> Active -> Resolved` and is then closed by
//! [`MatchCoordinator::finish_session`] once the grace delay has passed. The
//! coordinator never schedules timers itself; it queues the session ids that
//! need one and the network loop drains them with
//! [`MatchCoordinator::take_scheduled_cleanups`].

use crate::client::{send_message, Outbox};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::lobby::Lobby;
use crate::persistence::{MatchRecord, MatchRecorder};
use crate::session::{MatchPhase, RelayError, Session};
use crate::utils::{create_id, get_timestamp, ID_LENGTH};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use shared::{
    garbage_for_clear, AccountId, ClientId, ClientMessage, Fragment, PlayerResult,
    ReplicatedState, ServerMessage, SessionId, StateChange,
};
use std::collections::HashMap;
use std::time::Duration;

pub struct MatchCoordinator {
    config: ServerConfig,
    clients: ClientManager,
    lobby: Lobby,
    sessions: HashMap<SessionId, Session>,
    recorder: Box<dyn MatchRecorder>,
    rng: StdRng,
    scheduled_cleanups: Vec<SessionId>,
}

impl MatchCoordinator {
    pub fn new(config: ServerConfig, recorder: Box<dyn MatchRecorder>) -> Self {
        Self::with_seed(config, recorder, rand::random())
    }

    /// Deterministic ids for tests.
    pub fn with_seed(config: ServerConfig, recorder: Box<dyn MatchRecorder>, seed: u64) -> Self {
        let clients = ClientManager::with_rng(config.max_clients, StdRng::seed_from_u64(seed));
        Self {
            config,
            clients,
            lobby: Lobby::new(),
            sessions: HashMap::new(),
            recorder,
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            scheduled_cleanups: Vec::new(),
        }
    }

    pub fn grace_delay(&self) -> Duration {
        self.config.grace_delay
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Session ids whose grace timer should be started, oldest first.
    pub fn take_scheduled_cleanups(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.scheduled_cleanups)
    }

    /// Registers a newly accepted connection.
    ///
    /// At capacity the connection is told so and `None` is returned.
    pub fn connect(&mut self, outbox: Outbox) -> Option<ClientId> {
        let client_id = self.clients.add_client(outbox.clone());
        if client_id.is_none() {
            warn!("Rejecting connection: {} clients connected", self.clients.len());
            send_message(
                &outbox,
                "-",
                &ServerMessage::SessionError {
                    message: "Server full".to_string(),
                },
            );
        }
        client_id
    }

    pub fn handle_message(&mut self, client_id: &str, message: ClientMessage) {
        if !self.clients.contains(client_id) {
            warn!("Message from unknown client {}", client_id);
            return;
        }

        match message {
            ClientMessage::JoinLobby { username, user_id } => {
                self.join_lobby(client_id, username, user_id)
            }
            ClientMessage::ChatMessage { message } => self.chat(client_id, message),
            ClientMessage::StartGame => self.start_game(client_id),
            ClientMessage::CreateSession {
                state,
                username,
                user_id,
            } => self.create_session(client_id, state, username, user_id),
            ClientMessage::JoinSession {
                id,
                state,
                username,
                user_id,
            } => self.join_session(client_id, &id, state, username, user_id),
            ClientMessage::StateUpdate {
                fragment,
                state: (prop, value),
                lines_cleared,
            } => self.state_update(client_id, fragment, &prop, value, lines_cleared),
            ClientMessage::PlayerDied => self.player_died(client_id),
        }
    }

    /// Transport closed. A live side of an active match loses by forfeit.
    pub fn disconnect(&mut self, client_id: &str) {
        if self.lobby.leave(client_id) {
            if let Some(client) = self.clients.get(client_id) {
                info!("{} left lobby", client.display_name());
            }
            self.lobby.broadcast_state(&self.clients);
        }

        let session_id = self.clients.get(client_id).and_then(|c| c.session.clone());
        if let Some(session_id) = session_id {
            self.forfeit(client_id, &session_id);

            if let Some(session) = self.sessions.get_mut(&session_id) {
                if let Err(e) = session.leave(&mut self.clients, client_id) {
                    error!("Failed to remove client from session: {}", e);
                }
                if session.is_empty() {
                    self.sessions.remove(&session_id);
                    info!("Session {} removed (no players)", session_id);
                }
            }
        }

        self.clients.remove_client(client_id);
    }

    /// Grace delay elapsed: send everyone back to the lobby and drop the session.
    ///
    /// A session that is already gone is not an error.
    pub fn finish_session(&mut self, session_id: &str) {
        let Some(session) = self.sessions.remove(session_id) else {
            debug!("Session {} already closed", session_id);
            return;
        };

        session.send_all(&self.clients, &ServerMessage::ReturnToLobby);
        for member in session.members() {
            if let Some(client) = self.clients.get_mut(member) {
                client.reset_match_state();
            }
        }
        info!("Session {} closed", session_id);
    }

    fn join_lobby(&mut self, client_id: &str, username: String, user_id: Option<AccountId>) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        if client.session.is_some() {
            warn!("Client {} tried to join the lobby from a session", client_id);
            client.send(&ServerMessage::SessionError {
                message: "Already in a session".to_string(),
            });
            return;
        }

        client.set_identity(Some(username), user_id);
        let name = client.display_name().to_string();
        self.lobby.join(client_id);
        info!("{} joined lobby. Total players: {}", name, self.lobby.len());
        self.lobby.broadcast_state(&self.clients);

        if self.config.auto_start && self.lobby.len() >= 2 {
            if let Some((first, second)) = self.lobby.take_pair() {
                self.start_match(&first, &second);
            }
        }
    }

    fn chat(&mut self, client_id: &str, message: String) {
        let Some(client) = self.clients.get(client_id) else {
            return;
        };
        let username = client.display_name().to_string();
        debug!("Chat from {}: {}", username, message);

        match client.session.as_ref().and_then(|id| self.sessions.get(id)) {
            Some(session) => session.broadcast_from(
                &self.clients,
                client_id,
                &ServerMessage::ChatMessage {
                    username,
                    message,
                    sender: Some(client_id.to_string()),
                    timestamp: Some(get_timestamp()),
                },
            ),
            None => self.lobby.broadcast_except(
                &self.clients,
                client_id,
                &ServerMessage::ChatMessage {
                    username,
                    message,
                    sender: None,
                    timestamp: None,
                },
            ),
        }
    }

    fn start_game(&mut self, client_id: &str) {
        match self.lobby.take_pair() {
            Some((first, second)) => self.start_match(&first, &second),
            None => {
                if let Some(client) = self.clients.get(client_id) {
                    client.send(&ServerMessage::SessionError {
                        message: "Not enough players to start game".to_string(),
                    });
                }
            }
        }
    }

    /// Moves two lobby players into a fresh session with empty boards.
    fn start_match(&mut self, first: &str, second: &str) {
        let session_id = self.new_session_id();
        let mut session = Session::new(session_id.clone());
        let initial = ReplicatedState::initial(self.config.arena_width, self.config.arena_height);

        for player_id in [first, second] {
            let Some(client) = self.clients.get_mut(player_id) else {
                continue;
            };
            client.is_alive = true;
            client.state = Some(initial.clone());

            if let Err(e) = session.join(&mut self.clients, player_id) {
                error!("Failed to place {} into session {}: {}", player_id, session_id, e);
                continue;
            }
            if let Some(client) = self.clients.get(player_id) {
                client.send(&ServerMessage::GameStart {
                    session_id: session_id.clone(),
                    state: initial.clone(),
                });
            }
        }

        info!(
            "Starting game {} with {} and {}",
            session_id,
            self.name_of(first),
            self.name_of(second)
        );
        self.sessions.insert(session_id, session);
        self.lobby.broadcast_state(&self.clients);
    }

    fn create_session(
        &mut self,
        client_id: &str,
        state: Option<ReplicatedState>,
        username: Option<String>,
        user_id: Option<AccountId>,
    ) {
        if !self.prepare_for_session(client_id, state, username, user_id) {
            return;
        }

        let session_id = self.new_session_id();
        let mut session = Session::new(session_id.clone());
        if let Err(e) = session.join(&mut self.clients, client_id) {
            error!("Failed to create session for {}: {}", client_id, e);
            return;
        }
        self.sessions.insert(session_id.clone(), session);

        info!("Client {} created session {}", client_id, session_id);
        if let Some(client) = self.clients.get(client_id) {
            client.send(&ServerMessage::SessionCreated { id: session_id });
        }
    }

    fn join_session(
        &mut self,
        client_id: &str,
        session_id: &str,
        state: Option<ReplicatedState>,
        username: Option<String>,
        user_id: Option<AccountId>,
    ) {
        let error = match self.sessions.get(session_id) {
            None => Some("Session not found"),
            Some(session) if session.phase == MatchPhase::Resolved => Some("Match already finished"),
            Some(_) => None,
        };
        if let Some(message) = error {
            warn!("Client {} cannot join session {}: {}", client_id, session_id, message);
            self.send_error(client_id, message);
            return;
        }

        if !self.prepare_for_session(client_id, state, username, user_id) {
            return;
        }

        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        match session.join(&mut self.clients, client_id) {
            Ok(()) => info!(
                "Client {} joined session {} ({} players)",
                client_id,
                session_id,
                session.len()
            ),
            Err(e) => error!("Failed to join session: {}", e),
        }
    }

    /// Checks the client is free to enter a session and seeds its match state.
    fn prepare_for_session(
        &mut self,
        client_id: &str,
        state: Option<ReplicatedState>,
        username: Option<String>,
        user_id: Option<AccountId>,
    ) -> bool {
        let Some(client) = self.clients.get_mut(client_id) else {
            return false;
        };
        if client.session.is_some() {
            warn!("Client {} is already in a session", client_id);
            client.send(&ServerMessage::SessionError {
                message: "Already in a session".to_string(),
            });
            return false;
        }

        client.set_identity(username, user_id);
        client.is_alive = true;
        client.state = state;

        if self.lobby.leave(client_id) {
            self.lobby.broadcast_state(&self.clients);
        }
        true
    }

    fn state_update(
        &mut self,
        client_id: &str,
        fragment: Fragment,
        prop: &str,
        value: Value,
        lines_cleared: Option<u32>,
    ) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        let Some(session) = client.session.as_ref().and_then(|id| self.sessions.get(id)) else {
            warn!("state-update from client {} outside a session", client_id);
            return;
        };
        if session.phase == MatchPhase::Resolved || !client.is_alive {
            debug!("Ignoring state-update from client {}: not in play", client_id);
            return;
        }
        let Some(state) = client.state.as_mut().filter(|s| s.has_fragment(fragment)) else {
            debug!("Ignoring state-update from client {}: no {} slot", client_id, fragment);
            return;
        };

        let change = match StateChange::parse(fragment, prop, value.clone()) {
            Ok(change) => change,
            Err(e) => {
                warn!("Rejected state-update from client {}: {}", client_id, e);
                client.send(&ServerMessage::SessionError {
                    message: e.to_string(),
                });
                return;
            }
        };
        state.apply(&change);

        // Garbage goes out ahead of the score update that earned it
        if let StateChange::PlayerScore(_) = change {
            let lines = garbage_for_clear(lines_cleared.unwrap_or(0));
            if lines > 0 {
                debug!("Client {} sends {} garbage lines", client_id, lines);
                let attack = ServerMessage::GarbageAttack {
                    lines,
                    from_player: client_id.to_string(),
                };
                if let Err(e) = self.broadcast(client_id, &attack) {
                    error!("Failed to send garbage: {}", e);
                }
            }
        }

        // Peers get the update exactly as it was sent
        let update = ServerMessage::StateUpdate {
            client_id: client_id.to_string(),
            fragment,
            state: (prop.to_string(), value),
            lines_cleared,
        };
        if let Err(e) = self.broadcast(client_id, &update) {
            error!("Failed to relay state-update: {}", e);
        }
    }

    fn player_died(&mut self, client_id: &str) {
        let Some(session_id) = self.clients.get(client_id).and_then(|c| c.session.clone()) else {
            warn!("player-died from client {} outside a session", client_id);
            return;
        };
        if self.sessions.get(&session_id).map(|s| s.phase) == Some(MatchPhase::Waiting) {
            debug!("Ignoring player-died from client {}: no opponent yet", client_id);
            return;
        }
        self.forfeit(client_id, &session_id);
    }

    /// Marks a live side dead, tells its peers and resolves the match if only
    /// one side is left standing. Repeated calls for the same side are no-ops.
    fn forfeit(&mut self, client_id: &str, session_id: &str) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        if !client.is_alive {
            return;
        }
        client.is_alive = false;
        if session.phase == MatchPhase::Resolved {
            return;
        }
        info!("Player {} died", client.display_name());

        let died = ServerMessage::PlayerDied {
            player_id: client_id.to_string(),
        };
        if let Err(e) = self.broadcast(client_id, &died) {
            error!("Failed to announce death: {}", e);
        }

        self.resolve(session_id, client_id);
    }

    /// Decides the match once exactly one side is alive. Fires at most once
    /// per session.
    fn resolve(&mut self, session_id: &str, loser_id: &str) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        if session.phase != MatchPhase::Active {
            return;
        }
        let alive: Vec<ClientId> = session.alive_members(&self.clients).cloned().collect();
        let [winner_id] = alive.as_slice() else {
            return;
        };

        let (Some(winner), Some(loser)) = (
            player_result(&self.clients, winner_id),
            player_result(&self.clients, loser_id),
        ) else {
            return;
        };

        session.phase = MatchPhase::Resolved;
        info!(
            "Game over in session {}! Winner: {}",
            session_id,
            winner.username.as_deref().unwrap_or(&winner.id)
        );

        let record = MatchRecord {
            session_id: session_id.to_string(),
            winner_user_id: winner.user_id.clone(),
            loser_user_id: loser.user_id.clone(),
            winner_score: winner.score,
            loser_score: loser.score,
            finished_at: get_timestamp(),
        };
        session.send_all(&self.clients, &ServerMessage::GameOver { winner, loser });

        if let Err(e) = self.recorder.record(&record) {
            error!("Failed to record match {}: {}", session_id, e);
        }
        self.scheduled_cleanups.push(session_id.to_string());
    }

    /// Sends `message` to every session peer of `client_id`, never to itself.
    fn broadcast(&self, client_id: &str, message: &ServerMessage) -> Result<(), RelayError> {
        let session = self
            .clients
            .get(client_id)
            .and_then(|c| c.session.as_ref())
            .and_then(|id| self.sessions.get(id))
            .ok_or_else(|| RelayError::NoSession(client_id.to_string()))?;
        session.broadcast_from(&self.clients, client_id, message);
        Ok(())
    }

    fn new_session_id(&mut self) -> SessionId {
        loop {
            let id = create_id(&mut self.rng, ID_LENGTH);
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    fn name_of(&self, client_id: &str) -> String {
        self.clients
            .get(client_id)
            .map_or_else(|| client_id.to_string(), |c| c.display_name().to_string())
    }

    fn send_error(&self, client_id: &str, message: &str) {
        if let Some(client) = self.clients.get(client_id) {
            client.send(&ServerMessage::SessionError {
                message: message.to_string(),
            });
        }
    }
}

fn player_result(clients: &ClientManager, client_id: &str) -> Option<PlayerResult> {
    let client = clients.get(client_id)?;
    Some(PlayerResult {
        id: client.id.clone(),
        username: client.username.clone(),
        user_id: client.user_id.clone(),
        score: client.score(),
    })
}
