use crate::game::LocalGame;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{
    AccountId, ClientId, ClientMessage, PlayerResult, ServerMessage, SessionId, ARENA_HEIGHT,
    ARENA_WIDTH,
};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay, e.g. `ws://127.0.0.1:9000`
    pub server_url: String,
    /// Session to join; a new one is created when absent
    pub session: Option<SessionId>,
    pub username: Option<String>,
    pub user_id: Option<AccountId>,
    /// Delay between autopilot steps
    pub tick: Duration,
    pub seed: u64,
}

/// Final result as announced by the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub winner: PlayerResult,
    pub loser: PlayerResult,
}

/// What the connection loop should do after a server message.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished,
}

pub struct Client {
    config: ClientConfig,
    game: LocalGame,
    client_id: Option<ClientId>,
    session_id: Option<SessionId>,
    opponent: Option<ClientId>,
    playing: bool,
    outcome: Option<MatchOutcome>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let game = LocalGame::new(ARENA_WIDTH, ARENA_HEIGHT, config.seed);
        Client {
            config,
            game,
            client_id: None,
            session_id: None,
            opponent: None,
            playing: false,
            outcome: None,
        }
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn game(&self) -> &LocalGame {
        &self.game
    }

    /// Frame that puts this connection into a session.
    pub fn session_request(&self) -> ClientMessage {
        let state = Some(self.game.snapshot());
        match &self.config.session {
            Some(id) => ClientMessage::JoinSession {
                id: id.clone(),
                state,
                username: self.config.username.clone(),
                user_id: self.config.user_id.clone(),
            },
            None => ClientMessage::CreateSession {
                state,
                username: self.config.username.clone(),
                user_id: self.config.user_id.clone(),
            },
        }
    }

    /// Plays one match and returns its outcome once the relay sends everyone
    /// back to the lobby.
    pub async fn run(&mut self) -> Result<Option<MatchOutcome>, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.config.server_url);
        let (ws, _) = tokio_tungstenite::connect_async(self.config.server_url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        let request = serde_json::to_string(&self.session_request())?;
        sink.send(Message::Text(request)).await?;

        let mut tick = interval(self.config.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("Connection closed by server");
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };
                    let message: ServerMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Unreadable message from server: {}", e);
                            continue;
                        }
                    };

                    let (outgoing, flow) = self.handle_message(message)?;
                    for message in outgoing {
                        sink.send(Message::Text(serde_json::to_string(&message)?)).await?;
                    }
                    if flow == Flow::Finished {
                        break;
                    }
                }

                _ = tick.tick() => {
                    for message in self.step() {
                        sink.send(Message::Text(serde_json::to_string(&message)?)).await?;
                    }
                }
            }
        }

        let _ = sink.close().await;
        Ok(self.outcome.clone())
    }

    /// Advances the autopilot by one tick while a match is in play.
    pub fn step(&mut self) -> Vec<ClientMessage> {
        if !self.playing {
            return Vec::new();
        }
        self.game.tick()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Reacts to one relay message, returning the frames to send back.
    pub fn handle_message(
        &mut self,
        message: ServerMessage,
    ) -> Result<(Vec<ClientMessage>, Flow), Box<dyn std::error::Error>> {
        let mut outgoing = Vec::new();

        match message {
            ServerMessage::SessionCreated { id } => {
                info!("Session created, join with --session {}", id);
                self.session_id = Some(id);
            }

            ServerMessage::SessionBroadcast { peers } => {
                let opponent = peers
                    .clients
                    .iter()
                    .map(|p| p.id.clone())
                    .find(|id| *id != peers.you);
                if self.client_id.is_none() {
                    info!("Connected! Client ID: {}", peers.you);
                }
                self.client_id = Some(peers.you);

                match (&self.opponent, &opponent) {
                    (None, Some(id)) => info!("Opponent {} joined", id),
                    (Some(id), None) => info!("Opponent {} left", id),
                    _ => {}
                }
                self.opponent = opponent;
                self.playing =
                    self.opponent.is_some() && self.game.is_alive() && self.outcome.is_none();
            }

            ServerMessage::GameStart { session_id, state } => {
                info!("Match {} started", session_id);
                self.session_id = Some(session_id);
                debug!("Initial score {}", state.score());
            }

            ServerMessage::StateUpdate {
                client_id,
                fragment,
                state,
                ..
            } => {
                debug!("{} updated {}.{}", client_id, fragment, state.0);
            }

            ServerMessage::GarbageAttack { lines, from_player } => {
                info!("Receiving {} garbage lines from {}", lines, from_player);
                outgoing.extend(self.game.apply_garbage(lines));
            }

            ServerMessage::PlayerDied { player_id } => {
                info!("Player {} died", player_id);
            }

            ServerMessage::GameOver { winner, loser } => {
                let won = self.client_id.as_ref() == Some(&winner.id);
                info!(
                    "Game over! {} with {} points against {}",
                    if won { "Won" } else { "Lost" },
                    if won { winner.score } else { loser.score },
                    if won { loser.score } else { winner.score }
                );
                self.playing = false;
                self.outcome = Some(MatchOutcome { winner, loser });
            }

            ServerMessage::ReturnToLobby => {
                info!("Returning to lobby");
                return Ok((outgoing, Flow::Finished));
            }

            ServerMessage::SessionError { message } => {
                error!("Session error: {}", message);
                return Err(format!("session error: {}", message).into());
            }

            ServerMessage::LobbyState { players, .. } => {
                debug!("{} players in lobby", players.len());
            }

            ServerMessage::ChatMessage {
                username, message, ..
            } => {
                info!("[{}] {}", username, message);
            }
        }

        Ok((outgoing, Flow::Continue))
    }
}
