//! Performance benchmarks for the board engine and the relay hot path

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use server::config::ServerConfig;
use server::game::MatchCoordinator;
use server::persistence::LogRecorder;
use shared::{Arena, ClientMessage, Fragment, PieceKind, Player, Position, ServerMessage};
use std::time::Instant;
use tokio::sync::mpsc;

/// Benchmarks piece collision tests against a half-filled board
#[test]
fn benchmark_collision_detection() {
    let mut arena = Arena::new(12, 20);
    let mut rng = StdRng::seed_from_u64(1);
    arena.add_garbage(10, &mut rng);

    let mut player = Player::default();
    player.spawn(PieceKind::T, 12);

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        player.pos = Position {
            x: (i % 12) as i32 - 1,
            y: (i % 20) as i32,
        };
        let _ = arena.collide(&player);
    }

    let duration = start.elapsed();
    println!(
        "Collision detection: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks sweeping a board whose bottom rows are all full
#[test]
fn benchmark_sweep_full_rows() {
    let iterations = 10_000;
    let start = Instant::now();
    let mut total_lines = 0;

    for _ in 0..iterations {
        let mut matrix = vec![vec![0u8; 12]; 20];
        for row in matrix.iter_mut().skip(16) {
            row.fill(3);
        }
        let mut arena = Arena::from_matrix(matrix).unwrap();
        total_lines += arena.sweep().lines_cleared;
    }

    let duration = start.elapsed();
    println!(
        "Sweep: {} boards in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(total_lines, 4 * iterations);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks garbage injection
#[test]
fn benchmark_garbage_injection() {
    let mut arena = Arena::new(12, 20);
    let mut rng = StdRng::seed_from_u64(7);

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        arena.add_garbage(1 + i % 4, &mut rng);
    }

    let duration = start.elapsed();
    println!(
        "Garbage injection: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(arena.height(), 20);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Stress tests relaying score updates between two session members
#[test]
fn stress_test_relay_state_updates() {
    let mut coord = MatchCoordinator::with_seed(ServerConfig::default(), Box::new(LogRecorder), 5);
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let a = coord.connect(tx_a).unwrap();
    let b = coord.connect(tx_b).unwrap();

    coord.handle_message(
        &a,
        ClientMessage::CreateSession {
            state: Some(shared::ReplicatedState::initial(12, 20)),
            username: None,
            user_id: None,
        },
    );
    let session_id = loop {
        let text = rx_a.try_recv().unwrap();
        if let ServerMessage::SessionCreated { id } = serde_json::from_str(&text).unwrap() {
            break id;
        }
    };
    coord.handle_message(
        &b,
        ClientMessage::JoinSession {
            id: session_id,
            state: Some(shared::ReplicatedState::initial(12, 20)),
            username: None,
            user_id: None,
        },
    );
    while rx_b.try_recv().is_ok() {}

    let updates = 10_000u64;
    let start = Instant::now();

    for i in 0..updates {
        coord.handle_message(
            &a,
            ClientMessage::StateUpdate {
                fragment: Fragment::Player,
                state: ("score".to_string(), json!(i * 10)),
                lines_cleared: Some((i % 4) as u32 + 1),
            },
        );
    }

    let duration = start.elapsed();

    let mut relayed = 0;
    let mut garbage = 0;
    while let Ok(text) = rx_b.try_recv() {
        match serde_json::from_str::<ServerMessage>(&text).unwrap() {
            ServerMessage::StateUpdate { .. } => relayed += 1,
            ServerMessage::GarbageAttack { .. } => garbage += 1,
            other => panic!("Unexpected message: {:?}", other),
        }
    }
    println!(
        "Relay: {} updates in {:?} ({:.2} μs/update)",
        updates,
        duration,
        duration.as_micros() as f64 / updates as f64
    );

    assert_eq!(relayed, updates);
    // Clears of 2, 3 and 4 lines send garbage, single clears do not
    assert_eq!(garbage, updates * 3 / 4);
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
