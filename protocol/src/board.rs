//! 棋盘

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_SIZE, CELL_COUNT};
use crate::piece::{Player, Position};

/// 一条连线（三个格子）
pub type Line = [Position; 3];

const fn p(row: u8, col: u8) -> Position {
    Position::new_unchecked(row, col)
}

/// 全部 8 条连线：3 行、3 列、2 条对角线
pub const WINNING_LINES: [Line; 8] = [
    [p(0, 0), p(0, 1), p(0, 2)],
    [p(1, 0), p(1, 1), p(1, 2)],
    [p(2, 0), p(2, 1), p(2, 2)],
    [p(0, 0), p(1, 0), p(2, 0)],
    [p(0, 1), p(1, 1), p(2, 1)],
    [p(0, 2), p(1, 2), p(2, 2)],
    [p(0, 0), p(1, 1), p(2, 2)],
    [p(0, 2), p(1, 1), p(2, 0)],
];

/// 3x3 棋盘，索引为 row * 3 + col
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [Option<Player>; CELL_COUNT],
}

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            cells: [None; CELL_COUNT],
        }
    }

    /// 获取指定位置的棋子
    pub fn get(&self, pos: Position) -> Option<Player> {
        if pos.is_valid() {
            self.cells[pos.to_index()]
        } else {
            None
        }
    }

    /// 设置指定位置的棋子
    pub fn set(&mut self, pos: Position, cell: Option<Player>) {
        if pos.is_valid() {
            self.cells[pos.to_index()] = cell;
        }
    }

    pub fn is_empty_at(&self, pos: Position) -> bool {
        self.get(pos).is_none()
    }

    /// 棋盘是否已满（按实际占用判断）
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// 所有空格（按索引顺序）
    pub fn empty_positions(&self) -> Vec<Position> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_none())
            .filter_map(|(i, _)| Position::from_index(i))
            .collect()
    }

    /// 指定玩家占有的格子数
    pub fn count(&self, player: Player) -> usize {
        self.cells.iter().filter(|c| **c == Some(player)).count()
    }

    /// 查找指定玩家已连成的线
    pub fn line_of(&self, player: Player) -> Option<Line> {
        WINNING_LINES
            .iter()
            .find(|line| line.iter().all(|pos| self.get(*pos) == Some(player)))
            .copied()
    }

    /// 按行输出（用于展示）
    pub fn rows(&self) -> [[Option<Player>; BOARD_SIZE]; BOARD_SIZE] {
        let mut rows = [[None; BOARD_SIZE]; BOARD_SIZE];
        for (i, cell) in self.cells.iter().enumerate() {
            rows[i / BOARD_SIZE][i % BOARD_SIZE] = *cell;
        }
        rows
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  0 1 2")?;
        for (i, row) in self.rows().iter().enumerate() {
            write!(f, "{}", i)?;
            for cell in row {
                write!(f, " {}", cell.map(|p| p.symbol()).unwrap_or('.'))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
