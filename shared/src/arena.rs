//! The board engine.
//!
//! An [`Arena`] is a fixed-size grid of cell values: `0` is empty, `1..=7` are
//! settled piece colours and `8` is a garbage cell. Row `0` is the top of the
//! board. Every mutating operation returns the [`StateChange`] that should be
//! replicated to the peer instead of firing a change listener.

use crate::piece::Player;
use crate::protocol::StateChange;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const ARENA_WIDTH: usize = 12;
pub const ARENA_HEIGHT: usize = 20;
pub const EMPTY_CELL: u8 = 0;
pub const GARBAGE_CELL: u8 = 8;
/// Points for the first row of a sweep; each further row in the same sweep doubles.
pub const LINE_BASE_SCORE: u64 = 10;

pub type Matrix = Vec<Vec<u8>>;

/// Builds a `height` x `width` matrix of empty cells.
pub fn empty_matrix(width: usize, height: usize) -> Matrix {
    vec![vec![EMPTY_CELL; width]; height]
}

/// Garbage rows sent to the opponent for a clear of `lines_cleared` rows.
///
/// Singles send nothing; every bigger clear sends one row fewer than it cleared.
pub fn garbage_for_clear(lines_cleared: u32) -> u32 {
    if lines_cleared >= 2 {
        lines_cleared - 1
    } else {
        0
    }
}

/// Outcome of a single [`Arena::sweep`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub score: u64,
    pub lines_cleared: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arena {
    matrix: Matrix,
}

impl Arena {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            matrix: empty_matrix(width, height),
        }
    }

    /// Wraps an existing grid. Returns `None` for an empty or ragged matrix.
    pub fn from_matrix(matrix: Matrix) -> Option<Self> {
        let width = matrix.first()?.len();
        if width == 0 || matrix.iter().any(|row| row.len() != width) {
            return None;
        }
        Some(Self { matrix })
    }

    pub fn width(&self) -> usize {
        self.matrix.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.matrix.len()
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Cell at `(x, y)`, or `None` outside the board.
    pub fn cell(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 {
            return None;
        }
        self.matrix
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    /// Tests the piece against the board at its current position.
    ///
    /// Cells outside the board count as occupied, so walls and floor collide.
    pub fn collide(&self, player: &Player) -> bool {
        let Some(matrix) = &player.matrix else {
            return false;
        };

        for (dy, row) in matrix.iter().enumerate() {
            for (dx, &value) in row.iter().enumerate() {
                if value == EMPTY_CELL {
                    continue;
                }
                let x = player.pos.x + dx as i32;
                let y = player.pos.y + dy as i32;
                if self.cell(x, y) != Some(EMPTY_CELL) {
                    return true;
                }
            }
        }
        false
    }

    /// Writes every non-empty piece cell into the board.
    ///
    /// Does not check for collision; cells that fall outside the board are
    /// skipped.
    pub fn merge(&mut self, player: &Player) -> StateChange {
        if let Some(matrix) = &player.matrix {
            for (dy, row) in matrix.iter().enumerate() {
                for (dx, &value) in row.iter().enumerate() {
                    if value == EMPTY_CELL {
                        continue;
                    }
                    let x = player.pos.x + dx as i32;
                    let y = player.pos.y + dy as i32;
                    if x < 0 || y < 0 {
                        continue;
                    }
                    if let Some(cell) = self
                        .matrix
                        .get_mut(y as usize)
                        .and_then(|r| r.get_mut(x as usize))
                    {
                        *cell = value;
                    }
                }
            }
        }
        self.matrix_change()
    }

    /// Removes full rows from the bottom up and scores them.
    ///
    /// The row index is re-examined after a removal since the row that shifted
    /// into it may be full too. Row `0` is never swept. The first cleared row is
    /// worth [`LINE_BASE_SCORE`] and every further row in the same call is worth
    /// double the previous one.
    pub fn sweep(&mut self) -> SweepResult {
        let mut result = SweepResult::default();
        let mut row_count: u64 = 1;
        let mut y = self.matrix.len().saturating_sub(1);

        while y > 0 {
            if self.matrix[y].iter().any(|&cell| cell == EMPTY_CELL) {
                y -= 1;
                continue;
            }

            let mut row = self.matrix.remove(y);
            row.fill(EMPTY_CELL);
            self.matrix.insert(0, row);

            result.score += row_count * LINE_BASE_SCORE;
            row_count *= 2;
            result.lines_cleared += 1;
        }

        result
    }

    /// Pushes `lines` garbage rows in from the bottom, dropping the same number
    /// of rows off the top. Each garbage row has exactly one random hole.
    ///
    /// `lines` is clamped to the board height.
    pub fn add_garbage<R: Rng>(&mut self, lines: usize, rng: &mut R) -> StateChange {
        let width = self.width();
        let lines = lines.min(self.height());

        if width > 0 && lines > 0 {
            self.matrix.drain(0..lines);
            for _ in 0..lines {
                let mut row = vec![GARBAGE_CELL; width];
                row[rng.gen_range(0..width)] = EMPTY_CELL;
                self.matrix.push(row);
            }
        }

        self.matrix_change()
    }

    pub fn clear(&mut self) -> StateChange {
        for row in &mut self.matrix {
            row.fill(EMPTY_CELL);
        }
        self.matrix_change()
    }

    pub fn matrix_change(&self) -> StateChange {
        StateChange::ArenaMatrix(self.matrix.clone())
    }
}
