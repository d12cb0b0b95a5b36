//! 局面评估函数

use protocol::{Board, GameState, Player, Position, WINNING_LINES};

/// 两子一空且不依赖即将消失的棋子：下一手可直接成线
const THREAT_SCORE: i32 = 40;
/// 两子一空但其中一枚会在下一次落子时消失
const WEAK_PAIR_SCORE: i32 = 6;
/// 一子两空
const SINGLE_SCORE: i32 = 2;
/// 中心格加分
const CENTER_SCORE: i32 = 3;

const CENTER: Position = Position::new_unchecked(1, 1);

/// 评估器
pub struct Evaluator;

impl Evaluator {
    /// 从 `player` 视角评估局面，正数对 `player` 有利
    pub fn evaluate(state: &GameState, player: Player) -> i32 {
        Self::side_score(state, player) - Self::side_score(state, player.opponent())
    }

    /// 单方得分
    fn side_score(state: &GameState, player: Player) -> i32 {
        let board = state.board();
        // 该方下一次落子时会消失的棋子
        let doomed = state.oldest_piece_of(player);

        let mut score = 0;
        for line in WINNING_LINES.iter() {
            let (mine, theirs) = Self::count_line(board, line, player);
            if theirs > 0 {
                continue;
            }
            score += match mine {
                2 if doomed.is_some_and(|d| line.contains(&d)) => WEAK_PAIR_SCORE,
                2 => THREAT_SCORE,
                1 => SINGLE_SCORE,
                _ => 0,
            };
        }

        if board.get(CENTER) == Some(player) && doomed != Some(CENTER) {
            score += CENTER_SCORE;
        }
        score
    }

    fn count_line(board: &Board, line: &[Position; 3], player: Player) -> (usize, usize) {
        line.iter().fold((0, 0), |(mine, theirs), pos| match board.get(*pos) {
            Some(p) if p == player => (mine + 1, theirs),
            Some(_) => (mine, theirs + 1),
            None => (mine, theirs),
        })
    }
}
