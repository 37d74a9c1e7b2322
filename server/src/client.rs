use log::{debug, error};
use shared::{AccountId, ClientId, ReplicatedState, ServerMessage, SessionId};
use std::time::Instant;
use tokio::sync::mpsc;

/// Outgoing half of a connection: serialized JSON frames for the writer task.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Serializes `message` and queues it on `outbox` if the connection is still
/// open. A closed connection silently misses the message.
pub fn send_message(outbox: &Outbox, client_id: &str, message: &ServerMessage) {
    if outbox.is_closed() {
        debug!("Dropping message to client {}: connection closed", client_id);
        return;
    }

    match serde_json::to_string(message) {
        Ok(text) => {
            if outbox.send(text).is_err() {
                debug!("Dropping message to client {}: connection closed", client_id);
            }
        }
        Err(e) => error!("Failed to serialize message for client {}: {}", client_id, e),
    }
}

// One live WebSocket connection as seen by the relay
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub connected_at: Instant,
    outbox: Outbox,
    /// Session this connection currently belongs to
    pub session: Option<SessionId>,
    /// Last known replicated state; only used to seed a joining peer
    pub state: Option<ReplicatedState>,
    pub is_alive: bool,
    pub username: Option<String>,
    pub user_id: Option<AccountId>,
}

impl Client {
    pub fn new(id: ClientId, outbox: Outbox) -> Self {
        Client {
            id,
            connected_at: Instant::now(),
            outbox,
            session: None,
            state: None,
            is_alive: false,
            username: None,
            user_id: None,
        }
    }

    // Fire-and-forget send, no queuing or retry
    pub fn send(&self, message: &ServerMessage) {
        send_message(&self.outbox, &self.id, message);
    }

    /// Updates the display identity. Fields the client left out keep their
    /// current values.
    pub fn set_identity(&mut self, username: Option<String>, user_id: Option<AccountId>) {
        if username.is_some() {
            self.username = username;
        }
        if user_id.is_some() {
            self.user_id = user_id;
        }
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Unknown")
    }

    pub fn score(&self) -> u64 {
        self.state.as_ref().map_or(0, ReplicatedState::score)
    }

    // Clear per-match state when leaving a session for good
    pub fn reset_match_state(&mut self) {
        self.session = None;
        self.state = None;
        self.is_alive = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_serializes_json() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = Client::new("abc123".to_string(), tx);

        client.send(&ServerMessage::SessionCreated {
            id: "s1".to_string(),
        });

        let text = rx.try_recv().unwrap();
        assert_eq!(text, r#"{"type":"session-created","id":"s1"}"#);
    }

    #[test]
    fn test_send_to_closed_connection_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Client::new("abc123".to_string(), tx);
        drop(rx);

        assert!(client.outbox.is_closed());
        client.send(&ServerMessage::ReturnToLobby);
    }

    #[test]
    fn test_set_identity_keeps_existing_values() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut client = Client::new("abc123".to_string(), tx);

        client.set_identity(Some("ada".to_string()), Some(AccountId::Number(1)));
        client.set_identity(None, None);

        assert_eq!(client.display_name(), "ada");
        assert_eq!(client.user_id, Some(AccountId::Number(1)));
    }

    #[test]
    fn test_reset_match_state() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut client = Client::new("abc123".to_string(), tx);
        client.session = Some("s1".to_string());
        client.state = Some(ReplicatedState::initial(2, 2));
        client.is_alive = true;

        client.reset_match_state();

        assert!(client.session.is_none());
        assert!(client.state.is_none());
        assert!(!client.is_alive);
        assert_eq!(client.score(), 0);
    }
}
