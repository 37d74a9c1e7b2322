//! Integration tests for the match relay
//!
//! These tests validate cross-component interactions: the wire format as the
//! browser client produces it, whole matches played by autopilot clients
//! through the coordinator, and real WebSocket connections.

use client::network::{Client, ClientConfig, Flow};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use server::config::ServerConfig;
use server::game::MatchCoordinator;
use server::network::{NetworkEvent, Server};
use server::persistence::{LogRecorder, MemoryRecorder};
use shared::{AccountId, ClientId, ClientMessage, Fragment, ServerMessage};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

type Inbox = mpsc::UnboundedReceiver<String>;

fn bot(session: Option<&str>, name: &str, user_id: u64, seed: u64) -> Client {
    Client::new(ClientConfig {
        server_url: String::new(),
        session: session.map(str::to_string),
        username: Some(name.to_string()),
        user_id: Some(AccountId::Number(user_id)),
        tick: Duration::from_millis(10),
        seed,
    })
}

/// One autopilot attached to an in-memory coordinator connection
struct Seat {
    id: ClientId,
    bot: Client,
    inbox: Inbox,
    finished: bool,
}

impl Seat {
    fn connect(coord: &mut MatchCoordinator, bot: Client) -> Seat {
        let (tx, inbox) = mpsc::unbounded_channel();
        let id = coord.connect(tx).unwrap();
        coord.handle_message(&id, bot.session_request());
        Seat {
            id,
            bot,
            inbox,
            finished: false,
        }
    }

    /// Feeds queued relay messages to the bot and its answers back to the
    /// relay. Returns how many messages were handled.
    fn pump(&mut self, coord: &mut MatchCoordinator) -> usize {
        let mut handled = 0;
        while let Ok(text) = self.inbox.try_recv() {
            handled += 1;
            let message: ServerMessage = serde_json::from_str(&text).unwrap();
            let (outgoing, flow) = self.bot.handle_message(message).unwrap();
            for message in outgoing {
                coord.handle_message(&self.id, message);
            }
            if flow == Flow::Finished {
                self.finished = true;
            }
        }
        handled
    }

    fn step(&mut self, coord: &mut MatchCoordinator) {
        for message in self.bot.step() {
            coord.handle_message(&self.id, message);
        }
    }
}

/// Pumps both seats until no relay traffic is left in flight.
fn settle(coord: &mut MatchCoordinator, a: &mut Seat, b: &mut Seat) {
    while a.pump(coord) + b.pump(coord) > 0 {}
}

/// WIRE FORMAT TESTS
mod protocol_tests {
    use super::*;

    /// Frames exactly as the browser client sends them
    #[test]
    fn browser_frames_parse() {
        let frames = [
            json!({"type": "create-session", "state": {"arena": {"matrix": [[0, 0], [0, 0]]}, "player": {"matrix": null, "pos": {"x": 0, "y": 0}, "score": 0}}, "username": "alice", "userId": 3}),
            json!({"type": "join-session", "id": "abc123", "state": {}, "username": "bob", "userId": "64f0c2"}),
            json!({"type": "state-update", "fragment": "player", "state": ["score", 30], "linesCleared": 2}),
            json!({"type": "state-update", "fragment": "arena", "state": ["matrix", [[0, 1], [1, 1]]]}),
            json!({"type": "player-died"}),
            json!({"type": "join-lobby", "username": "carol"}),
            json!({"type": "chat-message", "message": "hi"}),
            json!({"type": "start-game"}),
        ];

        for frame in frames {
            let parsed: Result<ClientMessage, _> = serde_json::from_value(frame.clone());
            assert!(parsed.is_ok(), "failed to parse {}", frame);
        }
    }

    #[test]
    fn relay_frames_match_wire_names() {
        let attack = serde_json::to_value(ServerMessage::GarbageAttack {
            lines: 3,
            from_player: "abc123".to_string(),
        })
        .unwrap();
        assert_eq!(
            attack,
            json!({"type": "garbage-attack", "lines": 3, "fromPlayer": "abc123"})
        );

        let update = serde_json::to_value(ServerMessage::StateUpdate {
            client_id: "abc123".to_string(),
            fragment: Fragment::Player,
            state: ("pos".to_string(), json!({"x": 1, "y": 2})),
            lines_cleared: None,
        })
        .unwrap();
        assert_eq!(update["type"], "state-update");
        assert_eq!(update["clientId"], "abc123");
        assert_eq!(update["state"], json!(["pos", {"x": 1, "y": 2}]));
    }
}

/// WHOLE-MATCH TESTS OVER IN-MEMORY CHANNELS
mod match_tests {
    use super::*;

    /// Two autopilots play until one tops out (or is forced to concede) and
    /// both end up back in the lobby with a single recorded outcome.
    #[test]
    fn autopilots_play_full_match() {
        let recorder = MemoryRecorder::new();
        let mut coord =
            MatchCoordinator::with_seed(ServerConfig::default(), Box::new(recorder.clone()), 99);

        let mut a = Seat::connect(&mut coord, bot(None, "alice", 1, 1));
        a.pump(&mut coord);
        let session_id = a.bot.session_id().cloned().unwrap();
        let mut b = Seat::connect(&mut coord, bot(Some(&session_id), "bob", 2, 2));
        settle(&mut coord, &mut a, &mut b);
        assert!(a.bot.is_playing() && b.bot.is_playing());

        let mut rounds = 0;
        while a.bot.is_playing() || b.bot.is_playing() {
            rounds += 1;
            assert!(rounds <= 20_000, "match never resolved");

            a.step(&mut coord);
            settle(&mut coord, &mut a, &mut b);
            b.step(&mut coord);
            settle(&mut coord, &mut a, &mut b);

            if rounds == 20_000 {
                coord.handle_message(&a.id, ClientMessage::PlayerDied);
                settle(&mut coord, &mut a, &mut b);
            }
        }

        // Relay snapshots track what the clients replicated
        for seat in [&a, &b] {
            assert_eq!(
                coord.clients().get(&seat.id).unwrap().score(),
                seat.bot.game().player.score
            );
        }

        let records = recorder.records();
        assert_eq!(records.len(), 1);
        let (winner, loser) = if records[0].winner_user_id == Some(AccountId::Number(1)) {
            (&a, &b)
        } else {
            (&b, &a)
        };
        assert_eq!(records[0].winner_score, winner.bot.game().player.score);
        assert_eq!(records[0].loser_score, loser.bot.game().player.score);

        assert_eq!(coord.take_scheduled_cleanups(), vec![session_id.clone()]);
        coord.finish_session(&session_id);
        settle(&mut coord, &mut a, &mut b);

        assert!(a.finished && b.finished);
        assert_eq!(coord.session_count(), 0);
    }

    /// After returning to the lobby the same connections can be paired again.
    #[test]
    fn lobby_rematch_after_return() {
        let config = ServerConfig {
            auto_start: true,
            ..ServerConfig::default()
        };
        let mut coord = MatchCoordinator::with_seed(config, Box::new(LogRecorder), 3);
        let (tx_a, mut inbox_a) = mpsc::unbounded_channel();
        let (tx_b, mut inbox_b) = mpsc::unbounded_channel();
        let a = coord.connect(tx_a).unwrap();
        let b = coord.connect(tx_b).unwrap();

        let join = |name: &str| ClientMessage::JoinLobby {
            username: name.to_string(),
            user_id: None,
        };

        for round in 0..2 {
            coord.handle_message(&a, join("alice"));
            coord.handle_message(&b, join("bob"));
            assert_eq!(coord.session_count(), 1, "round {}", round);

            let session_id = coord.clients().get(&a).unwrap().session.clone().unwrap();
            coord.handle_message(&b, ClientMessage::PlayerDied);
            for id in coord.take_scheduled_cleanups() {
                coord.finish_session(&id);
            }

            let last = |inbox: &mut Inbox| {
                let mut last = None;
                while let Ok(text) = inbox.try_recv() {
                    last = Some(serde_json::from_str::<ServerMessage>(&text).unwrap());
                }
                last
            };
            assert_eq!(last(&mut inbox_a), Some(ServerMessage::ReturnToLobby));
            assert_eq!(last(&mut inbox_b), Some(ServerMessage::ReturnToLobby));
            assert!(coord.session(&session_id).is_none());
        }
    }
}

/// REAL WEBSOCKET TESTS
mod network_tests {
    use super::*;

    async fn start_server(config: ServerConfig) -> (String, mpsc::UnboundedSender<NetworkEvent>) {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..config
        };
        let server = Server::new(config, Box::new(LogRecorder)).await.unwrap();
        let url = format!("ws://{}", server.local_addr().unwrap());
        let events = server.event_sender();
        tokio::spawn(server.run());
        (url, events)
    }

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

    /// A raw socket hosts the session, an autopilot joins it, the host
    /// concedes and the autopilot is told it won.
    #[tokio::test]
    async fn autopilot_wins_against_conceding_host() {
        let (url, events) = start_server(ServerConfig {
            grace_delay: Duration::from_millis(100),
            ..ServerConfig::default()
        })
        .await;

        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut sink, mut stream) = ws.split();
        let create = ClientMessage::CreateSession {
            state: Some(shared::ReplicatedState::initial(12, 20)),
            username: Some("host".to_string()),
            user_id: Some(AccountId::Number(1)),
        };
        sink.send(Message::Text(serde_json::to_string(&create).unwrap()))
            .await
            .unwrap();

        let session_id = loop {
            if let ServerMessage::SessionCreated { id } = next_message(&mut stream).await {
                break id;
            }
        };

        let host = async move {
            loop {
                match next_message(&mut stream).await {
                    ServerMessage::SessionBroadcast { peers } if peers.clients.len() == 2 => break,
                    _ => {}
                }
            }
            sink.send(Message::Text(
                serde_json::to_string(&ClientMessage::PlayerDied).unwrap(),
            ))
            .await
            .unwrap();
            loop {
                if next_message(&mut stream).await == ServerMessage::ReturnToLobby {
                    break;
                }
            }
        };

        let mut guest = Client::new(ClientConfig {
            server_url: url.clone(),
            session: Some(session_id),
            username: Some("guest".to_string()),
            user_id: Some(AccountId::Number(2)),
            tick: Duration::from_millis(5),
            seed: 8,
        });

        let (_, outcome) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(host, guest.run())
        })
        .await
        .expect("match did not finish in time");

        let outcome = outcome.unwrap().expect("no outcome received");
        assert_eq!(outcome.winner.username.as_deref(), Some("guest"));
        assert_eq!(outcome.loser.user_id, Some(AccountId::Number(1)));

        events.send(NetworkEvent::Shutdown).unwrap();
    }

    /// Joining a session id that does not exist ends the autopilot with an error.
    #[tokio::test]
    async fn join_unknown_session_fails() {
        let (url, events) = start_server(ServerConfig::default()).await;

        let mut guest = Client::new(ClientConfig {
            server_url: url,
            session: Some("zzzzzz".to_string()),
            username: None,
            user_id: None,
            tick: Duration::from_millis(5),
            seed: 1,
        });

        let result = tokio::time::timeout(Duration::from_secs(5), guest.run())
            .await
            .expect("client hung");
        assert!(result.is_err());

        events.send(NetworkEvent::Shutdown).unwrap();
    }

    /// Connections beyond capacity are told the server is full and closed.
    #[tokio::test]
    async fn connection_over_capacity_is_refused() {
        let (url, events) = start_server(ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        })
        .await;

        let (_first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        // Give the relay a moment to register the first connection
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (_, mut stream) = second.split();
        assert_eq!(
            next_message(&mut stream).await,
            ServerMessage::SessionError {
                message: "Server full".to_string()
            }
        );

        events.send(NetworkEvent::Shutdown).unwrap();
    }
}
