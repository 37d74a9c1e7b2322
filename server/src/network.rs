//! Server network layer: WebSocket connections and the coordinator event loop

use crate::client::Outbox;
use crate::config::ServerConfig;
use crate::game::MatchCoordinator;
use crate::persistence::MatchRecorder;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientId, ClientMessage, SessionId};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message;

/// Messages sent from connection tasks and timers to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected {
        outbox: Outbox,
        reply: oneshot::Sender<Option<ClientId>>,
    },
    MessageReceived {
        client_id: ClientId,
        message: ClientMessage,
    },
    Disconnected {
        client_id: ClientId,
    },
    CleanupSession {
        session_id: SessionId,
    },
    Shutdown,
}

/// Main server owning the match coordinator.
///
/// Every connection runs its own reader and writer tasks, but all state
/// changes happen on the loop in [`Server::run`], one event at a time.
pub struct Server {
    listener: TcpListener,
    coordinator: MatchCoordinator,

    // Communication channels
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        recorder: Box<dyn MatchRecorder>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            coordinator: MatchCoordinator::new(config, recorder),
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for injecting events, e.g. [`NetworkEvent::Shutdown`].
    pub fn event_sender(&self) -> mpsc::UnboundedSender<NetworkEvent> {
        self.event_tx.clone()
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Server {
            listener,
            mut coordinator,
            event_tx,
            mut event_rx,
        } = self;

        spawn_acceptor(listener, event_tx.clone());
        info!("Server started successfully");

        while let Some(event) = event_rx.recv().await {
            match event {
                NetworkEvent::Connected { outbox, reply } => {
                    let client_id = coordinator.connect(outbox);
                    if reply.send(client_id).is_err() {
                        debug!("Connection closed before it was registered");
                    }
                }
                NetworkEvent::MessageReceived { client_id, message } => {
                    coordinator.handle_message(&client_id, message);
                }
                NetworkEvent::Disconnected { client_id } => {
                    coordinator.disconnect(&client_id);
                }
                NetworkEvent::CleanupSession { session_id } => {
                    coordinator.finish_session(&session_id);
                }
                NetworkEvent::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }

            for session_id in coordinator.take_scheduled_cleanups() {
                spawn_cleanup_timer(session_id, coordinator.grace_delay(), event_tx.clone());
            }
        }

        Ok(())
    }
}

/// Spawns task that accepts TCP connections and upgrades them to WebSockets
fn spawn_acceptor(listener: TcpListener, events: mpsc::UnboundedSender<NetworkEvent>) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, events).await {
                            warn!("Connection from {} ended with error: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    });
}

/// Fires [`NetworkEvent::CleanupSession`] once the grace delay has passed
fn spawn_cleanup_timer(
    session_id: SessionId,
    delay: Duration,
    events: mpsc::UnboundedSender<NetworkEvent>,
) {
    debug!("Session {} closes in {:?}", session_id, delay);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if events
            .send(NetworkEvent::CleanupSession { session_id })
            .is_err()
        {
            debug!("Server loop gone before session cleanup");
        }
    });
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<NetworkEvent>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let (outbox, mut outgoing) = mpsc::unbounded_channel::<String>();

    // Writer task, ends once the coordinator drops the outbox
    tokio::spawn(async move {
        while let Some(text) = outgoing.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let (reply_tx, reply_rx) = oneshot::channel();
    if events
        .send(NetworkEvent::Connected {
            outbox,
            reply: reply_tx,
        })
        .is_err()
    {
        return Ok(());
    }
    let Ok(Some(client_id)) = reply_rx.await else {
        debug!("Connection from {} refused", peer);
        return Ok(());
    };
    debug!("Client {} connected from {}", client_id, peer);

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Read error from client {}: {}", client_id, e);
                break;
            }
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    let event = NetworkEvent::MessageReceived {
                        client_id: client_id.clone(),
                        message,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Malformed message from client {}: {}", client_id, e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = events.send(NetworkEvent::Disconnected { client_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::LogRecorder;
    use shared::{ReplicatedState, ServerMessage};

    async fn next_message<S>(stream: &mut S) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("Connection ended: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_create_session_over_websocket() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let server = Server::new(config, Box::new(LogRecorder)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.event_sender();
        let handle = tokio::spawn(server.run());

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        let (mut sink, mut stream) = ws.split();

        // Garbage frames are ignored
        sink.send(Message::Text("not json".to_string())).await.unwrap();

        let create = ClientMessage::CreateSession {
            state: Some(ReplicatedState::initial(12, 20)),
            username: Some("alice".to_string()),
            user_id: None,
        };
        sink.send(Message::Text(serde_json::to_string(&create).unwrap()))
            .await
            .unwrap();

        assert!(matches!(
            next_message(&mut stream).await,
            ServerMessage::SessionBroadcast { .. }
        ));
        assert!(matches!(
            next_message(&mut stream).await,
            ServerMessage::SessionCreated { .. }
        ));

        shutdown.send(NetworkEvent::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }
}
