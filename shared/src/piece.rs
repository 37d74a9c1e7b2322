//! The falling piece ("player" fragment) and its shapes.

use crate::arena::Matrix;
use crate::protocol::StateChange;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Grid-relative position of a piece's top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    T,
    O,
    L,
    J,
    I,
    S,
    Z,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::T,
        PieceKind::O,
        PieceKind::L,
        PieceKind::J,
        PieceKind::I,
        PieceKind::S,
        PieceKind::Z,
    ];

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Cell value the piece leaves on the board, `1..=7`.
    pub fn color(self) -> u8 {
        match self {
            PieceKind::T => 1,
            PieceKind::O => 2,
            PieceKind::L => 3,
            PieceKind::J => 4,
            PieceKind::I => 5,
            PieceKind::S => 6,
            PieceKind::Z => 7,
        }
    }

    pub fn matrix(self) -> Matrix {
        let c = self.color();
        match self {
            PieceKind::T => vec![vec![0, 0, 0], vec![c, c, c], vec![0, c, 0]],
            PieceKind::O => vec![vec![c, c], vec![c, c]],
            PieceKind::L => vec![vec![0, c, 0], vec![0, c, 0], vec![0, c, c]],
            PieceKind::J => vec![vec![0, c, 0], vec![0, c, 0], vec![c, c, 0]],
            PieceKind::I => vec![
                vec![0, c, 0, 0],
                vec![0, c, 0, 0],
                vec![0, c, 0, 0],
                vec![0, c, 0, 0],
            ],
            PieceKind::S => vec![vec![0, c, c], vec![c, c, 0], vec![0, 0, 0]],
            PieceKind::Z => vec![vec![c, c, 0], vec![0, c, c], vec![0, 0, 0]],
        }
    }
}

/// One side's falling piece and score.
///
/// `matrix` is `None` until the first piece spawns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub matrix: Option<Matrix>,
    pub pos: Position,
    pub score: u64,
}

impl Player {
    /// Replaces the piece with `kind`, centred on the top row of an arena
    /// `arena_width` cells wide.
    pub fn spawn(&mut self, kind: PieceKind, arena_width: usize) {
        let matrix = kind.matrix();
        let piece_width = matrix.first().map_or(0, Vec::len);
        self.pos = Position {
            x: (arena_width / 2) as i32 - (piece_width / 2) as i32,
            y: 0,
        };
        self.matrix = Some(matrix);
    }

    /// Rotates the piece a quarter turn, clockwise for positive `dir`.
    pub fn rotate(&mut self, dir: i32) {
        if let Some(matrix) = &mut self.matrix {
            rotate_matrix(matrix, dir);
        }
    }

    pub fn pos_change(&self) -> StateChange {
        StateChange::PlayerPos(self.pos)
    }

    pub fn matrix_change(&self) -> StateChange {
        StateChange::PlayerMatrix(self.matrix.clone())
    }

    pub fn score_change(&self) -> StateChange {
        StateChange::PlayerScore(self.score)
    }
}

/// In-place quarter turn of a square matrix.
pub fn rotate_matrix(matrix: &mut Matrix, dir: i32) {
    let n = matrix.len();
    for y in 0..n {
        for x in 0..y {
            let tmp = matrix[x][y];
            matrix[x][y] = matrix[y][x];
            matrix[y][x] = tmp;
        }
    }

    if dir > 0 {
        for row in matrix.iter_mut() {
            row.reverse();
        }
    } else {
        matrix.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ARENA_WIDTH;

    #[test]
    fn test_piece_colors_are_distinct() {
        let mut colors: Vec<u8> = PieceKind::ALL.iter().map(|k| k.color()).collect();
        colors.sort_unstable();
        assert_eq!(colors, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_shapes_are_square_with_four_cells() {
        for kind in PieceKind::ALL {
            let m = kind.matrix();
            assert!(m.iter().all(|row| row.len() == m.len()));
            assert_eq!(m.iter().flatten().filter(|&&c| c != 0).count(), 4);
        }
    }

    #[test]
    fn test_spawn_centres_piece() {
        let mut player = Player::default();
        player.spawn(PieceKind::T, ARENA_WIDTH);
        assert_eq!(player.pos, Position { x: 5, y: 0 });

        player.spawn(PieceKind::I, ARENA_WIDTH);
        assert_eq!(player.pos, Position { x: 4, y: 0 });
    }

    #[test]
    fn test_rotate_clockwise_and_back() {
        let mut player = Player::default();
        player.spawn(PieceKind::L, ARENA_WIDTH);
        let original = player.matrix.clone();

        player.rotate(1);
        assert_eq!(
            player.matrix,
            Some(vec![vec![0, 0, 0], vec![3, 3, 3], vec![3, 0, 0]])
        );

        player.rotate(-1);
        assert_eq!(player.matrix, original);
    }

    #[test]
    fn test_change_descriptors() {
        let player = Player {
            matrix: None,
            pos: Position { x: 2, y: 3 },
            score: 40,
        };
        assert_eq!(player.pos_change(), StateChange::PlayerPos(Position { x: 2, y: 3 }));
        assert_eq!(player.score_change(), StateChange::PlayerScore(40));
        assert_eq!(player.matrix_change(), StateChange::PlayerMatrix(None));
    }
}
