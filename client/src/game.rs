use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::ArenaSnapshot;
use shared::{Arena, ClientMessage, PieceKind, Player, ReplicatedState, StateChange};

/// Local side of a match: one board and its falling piece, driven by a
/// simple autopilot instead of a keyboard.
///
/// Every mutating call returns the frames that replicate the change to the
/// relay, in the order the changes happened.
#[derive(Debug)]
pub struct LocalGame {
    pub arena: Arena,
    pub player: Player,
    alive: bool,
    /// Column the autopilot steers the current piece towards
    target_x: i32,
    rng: StdRng,
}

impl LocalGame {
    pub fn new(width: usize, height: usize, seed: u64) -> Self {
        let mut game = Self {
            arena: Arena::new(width, height),
            player: Player::default(),
            alive: true,
            target_x: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        game.spawn_piece();
        game
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Current state as sent with `create-session` / `join-session`.
    pub fn snapshot(&self) -> ReplicatedState {
        ReplicatedState {
            arena: Some(ArenaSnapshot {
                matrix: self.arena.matrix().clone(),
            }),
            player: Some(self.player.clone()),
        }
    }

    /// One autopilot step: shift towards the target column, otherwise drop.
    pub fn tick(&mut self) -> Vec<ClientMessage> {
        if !self.alive {
            return Vec::new();
        }

        let step = (self.target_x - self.player.pos.x).signum();
        if step != 0 {
            self.player.pos.x += step;
            if !self.arena.collide(&self.player) {
                return vec![self.player.pos_change().into_message(None)];
            }
            self.player.pos.x -= step;
            self.target_x = self.player.pos.x;
        }

        self.drop_piece()
    }

    /// Moves the piece down one row, locking it in place when it lands.
    pub fn drop_piece(&mut self) -> Vec<ClientMessage> {
        if !self.alive {
            return Vec::new();
        }

        self.player.pos.y += 1;
        if !self.arena.collide(&self.player) {
            return vec![self.player.pos_change().into_message(None)];
        }
        self.player.pos.y -= 1;

        let mut out = vec![self.arena.merge(&self.player).into_message(None)];

        let sweep = self.arena.sweep();
        if sweep.lines_cleared > 0 {
            self.player.score += sweep.score;
            debug!(
                "Cleared {} lines for {} points",
                sweep.lines_cleared, sweep.score
            );
            out.push(self.arena.matrix_change().into_message(None));
            out.push(
                self.player
                    .score_change()
                    .into_message(Some(sweep.lines_cleared)),
            );
        }

        out.extend(self.reset_piece());
        out
    }

    /// Pushes garbage rows sent by the opponent into the board.
    pub fn apply_garbage(&mut self, lines: u32) -> Vec<ClientMessage> {
        let change = self.arena.add_garbage(lines as usize, &mut self.rng);
        let mut out = vec![change.into_message(None)];

        // The piece in flight may now overlap the raised stack
        while self.alive && self.arena.collide(&self.player) && self.player.pos.y > 0 {
            self.player.pos.y -= 1;
        }
        if self.arena.collide(&self.player) {
            out.extend(self.die());
        } else {
            out.push(self.player.pos_change().into_message(None));
        }
        out
    }

    fn reset_piece(&mut self) -> Vec<ClientMessage> {
        self.spawn_piece();
        let mut out = vec![
            self.player.matrix_change().into_message(None),
            self.player.pos_change().into_message(None),
        ];
        if self.arena.collide(&self.player) {
            out.extend(self.die());
        }
        out
    }

    fn die(&mut self) -> Vec<ClientMessage> {
        if !self.alive {
            return Vec::new();
        }
        self.alive = false;
        debug!("Board topped out with {} points", self.player.score);
        vec![ClientMessage::PlayerDied]
    }

    fn spawn_piece(&mut self) {
        let kind = PieceKind::random(&mut self.rng);
        self.player.spawn(kind, self.arena.width());
        if self.rng.gen_bool(0.5) {
            self.player.rotate(1);
        }
        self.target_x = self.plan_target();
    }

    /// Picks the column where the current piece would come to rest lowest.
    /// Ties go to the column closest to the spawn point.
    fn plan_target(&self) -> i32 {
        let start = self.player.pos.x;
        let width = self.arena.width() as i32;
        let mut best = (i32::MIN, i32::MIN, start);

        let mut probe = self.player.clone();
        for x in -3..width {
            probe.pos = self.player.pos;
            probe.pos.x = x;
            if self.arena.collide(&probe) {
                continue;
            }
            while !self.arena.collide(&probe) {
                probe.pos.y += 1;
            }
            let landing = probe.pos.y - 1;
            let score = (landing, -(x - start).abs(), x);
            if score > best {
                best = score;
            }
        }
        best.2
    }
}

/// Returns the replicated change carried by an outgoing frame, if any.
pub fn change_of(message: &ClientMessage) -> Option<StateChange> {
    match message {
        ClientMessage::StateUpdate {
            fragment,
            state: (prop, value),
            ..
        } => StateChange::parse(*fragment, prop, value.clone()).ok(),
        _ => None,
    }
}
