//! 对局状态机
//!
//! 唯一的变更入口是 [`GameState::apply_move`]：校验通过后返回新状态，
//! 调用方持有的旧状态保持不变。引擎本身不做任何 I/O。

use serde::{Deserialize, Serialize};

use crate::board::{Board, Line};
use crate::constants::{CELL_COUNT, PIECE_CAP};
use crate::error::MoveError;
use crate::piece::{Player, Position};
use crate::queue::PieceQueue;

/// 对局结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// 进行中
    InProgress,
    /// X 胜
    XWins,
    /// O 胜
    OWins,
    /// 和棋（棋盘下满且无人连线）
    Draw,
}

impl Outcome {
    /// 指定玩家获胜
    pub fn win_for(player: Player) -> Self {
        match player {
            Player::X => Outcome::XWins,
            Player::O => Outcome::OWins,
        }
    }

    /// 是否终局
    pub fn is_terminal(&self) -> bool {
        *self != Outcome::InProgress
    }

    /// 胜者
    pub fn winner(&self) -> Option<Player> {
        match self {
            Outcome::XWins => Some(Player::X),
            Outcome::OWins => Some(Player::O),
            _ => None,
        }
    }
}

/// 最近一次被接受的落子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMove {
    pub player: Player,
    pub position: Position,
    /// 本次落子前被淘汰的己方棋子
    pub evicted: Option<Position>,
}

/// 当前走子方的淘汰预告（前端用于高亮即将消失的棋子）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPreview {
    pub player: Player,
    pub will_evict: bool,
    pub piece: Option<Position>,
    pub pieces_on_board: usize,
}

/// 完整的对局状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    board: Board,
    history_x: PieceQueue,
    history_o: PieceQueue,
    current_player: Player,
    outcome: Outcome,
    winning_line: Option<Line>,
    last_move: Option<LastMove>,
    total_moves: u32,
}

impl GameState {
    /// 新对局：空棋盘，X 先手
    pub fn new() -> Self {
        Self::with_piece_cap(PIECE_CAP)
    }

    /// 指定每方棋子上限的新对局
    ///
    /// 上限被限制在 1..=9 之间；上限 ≥ 5 时等同于普通井字棋。
    pub fn with_piece_cap(cap: usize) -> Self {
        let cap = cap.clamp(1, CELL_COUNT);
        Self {
            board: Board::empty(),
            history_x: PieceQueue::new(cap),
            history_o: PieceQueue::new(cap),
            current_player: Player::X,
            outcome: Outcome::InProgress,
            winning_line: None,
            last_move: None,
            total_moves: 0,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_player(&self) -> Player {
        self.current_player
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// 获胜连线（仅在有人获胜时存在）
    pub fn winning_line(&self) -> Option<Line> {
        self.winning_line
    }

    pub fn last_move(&self) -> Option<LastMove> {
        self.last_move
    }

    /// 自开局（或重置）以来被接受的落子数
    pub fn total_moves(&self) -> u32 {
        self.total_moves
    }

    /// 指定玩家的在场棋子（从老到新）
    pub fn history(&self, player: Player) -> &PieceQueue {
        match player {
            Player::X => &self.history_x,
            Player::O => &self.history_o,
        }
    }

    fn history_mut(&mut self, player: Player) -> &mut PieceQueue {
        match player {
            Player::X => &mut self.history_x,
            Player::O => &mut self.history_o,
        }
    }

    /// 该玩家下一次落子是否会淘汰己方最老的棋子
    pub fn will_evict_next(&self, player: Player) -> bool {
        self.history(player).is_full()
    }

    /// 下一次落子会消失的棋子；未达上限时为 None
    pub fn oldest_piece_of(&self, player: Player) -> Option<Position> {
        let queue = self.history(player);
        if queue.is_full() {
            queue.oldest()
        } else {
            None
        }
    }

    /// 当前走子方的淘汰预告
    pub fn eviction_preview(&self) -> EvictionPreview {
        let player = self.current_player;
        EvictionPreview {
            player,
            will_evict: self.will_evict_next(player),
            piece: self.oldest_piece_of(player),
            pieces_on_board: self.history(player).len(),
        }
    }

    /// 当前可落子的格子；终局时为空
    pub fn legal_targets(&self) -> Vec<Position> {
        if self.outcome.is_terminal() {
            Vec::new()
        } else {
            self.board.empty_positions()
        }
    }

    /// 检查棋盘与队列是否一致
    pub fn is_consistent(&self) -> bool {
        [Player::X, Player::O].iter().all(|&player| {
            let queue = self.history(player);
            queue.len() <= queue.cap()
                && queue.len() == self.board.count(player)
                && queue.iter().all(|pos| self.board.get(pos) == Some(player))
        })
    }

    /// 执行落子
    ///
    /// 依次检查：终局、回合、边界、占用。任一失败返回对应错误，
    /// 状态不变。成功时返回新状态：先淘汰己方最老棋子（若已达上限），
    /// 再落子，最后判定胜负与和棋。
    pub fn apply_move(&self, player: Player, row: u8, col: u8) -> Result<GameState, MoveError> {
        if self.outcome.is_terminal() {
            return Err(MoveError::GameOver);
        }
        if player != self.current_player {
            return Err(MoveError::NotYourTurn {
                expected: self.current_player,
                actual: player,
            });
        }
        let pos = Position::new(row, col).ok_or(MoveError::OutOfBounds { row, col })?;
        if !self.board.is_empty_at(pos) {
            return Err(MoveError::CellOccupied { row, col });
        }

        let mut next = self.clone();
        next.place(player, pos);
        next.settle(player);
        debug_assert!(next.is_consistent(), "inconsistent state after move:\n{}", next.board);
        Ok(next)
    }

    /// 淘汰并落子
    fn place(&mut self, player: Player, pos: Position) {
        let queue = self.history_mut(player);
        let evicted = if queue.is_full() { queue.pop_oldest() } else { None };
        queue.push_newest(pos);

        if let Some(old) = evicted {
            self.board.set(old, None);
        }
        self.board.set(pos, Some(player));

        self.last_move = Some(LastMove {
            player,
            position: pos,
            evicted,
        });
        self.total_moves += 1;
    }

    /// 判定终局，未终局则交换走子方
    fn settle(&mut self, mover: Player) {
        // 双方都检查；对方的棋子在本步中没有变化，理论上不会新增连线
        let mover_line = self.board.line_of(mover).map(|line| (mover, line));
        let other_line = self
            .board
            .line_of(mover.opponent())
            .map(|line| (mover.opponent(), line));
        debug_assert!(other_line.is_none(), "{} completed a line on {}'s move", mover.opponent(), mover);

        // 胜负优先于和棋
        if let Some((winner, line)) = mover_line.or(other_line) {
            self.outcome = Outcome::win_for(winner);
            self.winning_line = Some(line);
        } else if self.board.is_full() {
            self.outcome = Outcome::Draw;
        } else {
            self.current_player = mover.opponent();
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: u8, col: u8) -> Position {
        Position::new_unchecked(row, col)
    }

    /// 依次落子，X/O 交替
    fn play(moves: &[(u8, u8)]) -> GameState {
        play_from(GameState::new(), moves)
    }

    fn play_from(mut state: GameState, moves: &[(u8, u8)]) -> GameState {
        for &(row, col) in moves {
            let player = state.current_player();
            state = state.apply_move(player, row, col).unwrap();
        }
        state
    }

    #[test]
    fn test_new_game() {
        let state = GameState::new();
        assert_eq!(state.current_player(), Player::X);
        assert_eq!(state.outcome(), Outcome::InProgress);
        assert!(state.history(Player::X).is_empty());
        assert!(state.history(Player::O).is_empty());
        assert_eq!(state.board(), &Board::empty());
        assert_eq!(state.total_moves(), 0);
    }

    #[test]
    fn test_first_move() {
        let state = GameState::new().apply_move(Player::X, 0, 0).unwrap();

        assert_eq!(state.board().get(pos(0, 0)), Some(Player::X));
        assert_eq!(state.current_player(), Player::O);
        assert_eq!(state.outcome(), Outcome::InProgress);
        assert_eq!(state.history(Player::X).to_vec(), vec![pos(0, 0)]);
    }

    #[test]
    fn test_top_row_win() {
        // X: (0,0) (0,1) (0,2)，O 在别处
        let state = play(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);

        assert_eq!(state.outcome(), Outcome::XWins);
        assert_eq!(state.winning_line(), Some([pos(0, 0), pos(0, 1), pos(0, 2)]));
        // 终局后不再交换走子方
        assert_eq!(state.current_player(), Player::X);
    }

    #[test]
    fn test_eviction_before_placement() {
        // X 依次落 (0,0) (2,2) (0,1)，第四枚 (0,2) 先淘汰 (0,0)，因此不成线
        let state = play(&[(0, 0), (1, 0), (2, 2), (1, 1), (0, 1), (2, 0), (0, 2), (2, 1)]);
        assert_eq!(state.outcome(), Outcome::InProgress);
        assert_eq!(state.history(Player::X).to_vec(), vec![pos(2, 2), pos(0, 1), pos(0, 2)]);
        assert_eq!(state.board().get(pos(0, 0)), None);

        // O 已满 3 枚 (1,1) (2,0) (2,1)，X 落 (1,0) 前先淘汰 (2,2)
        // O 原先在 (1,0) 的棋子已在 O 走 (2,1) 时被淘汰
        assert_eq!(state.board().get(pos(1, 0)), None);
        let state = state.apply_move(Player::X, 1, 0).unwrap();
        assert_eq!(state.history(Player::X).to_vec(), vec![pos(0, 1), pos(0, 2), pos(1, 0)]);
        assert_eq!(state.board().get(pos(2, 2)), None);
        assert_eq!(
            state.last_move(),
            Some(LastMove {
                player: Player::X,
                position: pos(1, 0),
                evicted: Some(pos(2, 2)),
            })
        );
        assert!(state.is_consistent());
    }

    #[test]
    fn test_evicts_oldest_when_at_cap() {
        // X: (0,0) (1,1) (2,1)；O: (0,1) (0,2) (1,0)
        let state = play(&[(0, 0), (0, 1), (1, 1), (0, 2), (2, 1), (1, 0)]);
        assert_eq!(state.oldest_piece_of(Player::X), Some(pos(0, 0)));

        let state = state.apply_move(Player::X, 1, 2).unwrap();
        assert_eq!(state.board().get(pos(0, 0)), None);
        assert_eq!(state.history(Player::X).to_vec(), vec![pos(1, 1), pos(2, 1), pos(1, 2)]);
        // O 的棋子不受影响
        assert_eq!(state.history(Player::O).to_vec(), vec![pos(0, 1), pos(0, 2), pos(1, 0)]);
        assert_eq!(state.board().count(Player::O), 3);
    }

    #[test]
    fn test_freed_cell_is_playable_by_opponent() {
        let state = play(&[(0, 0), (0, 1), (1, 1), (0, 2), (2, 1), (1, 0), (1, 2)]);
        // X 的 (0,0) 已消失，O 可以落在这里
        assert!(state.board().is_empty_at(pos(0, 0)));
        let state = state.apply_move(Player::O, 0, 0).unwrap();
        assert_eq!(state.board().get(pos(0, 0)), Some(Player::O));
        assert_eq!(state.last_move().and_then(|m| m.evicted), Some(pos(0, 1)));
    }

    #[test]
    fn test_not_your_turn() {
        let state = GameState::new();
        let err = state.apply_move(Player::O, 1, 1).unwrap_err();
        assert_eq!(
            err,
            MoveError::NotYourTurn {
                expected: Player::X,
                actual: Player::O,
            }
        );
        assert_eq!(state, GameState::new());
    }

    #[test]
    fn test_cell_occupied() {
        let state = play(&[(1, 1)]);
        let before = state.clone();

        let err = state.apply_move(Player::O, 1, 1).unwrap_err();
        assert_eq!(err, MoveError::CellOccupied { row: 1, col: 1 });
        assert_eq!(state, before);
        assert_eq!(state.current_player(), Player::O);
    }

    #[test]
    fn test_out_of_bounds() {
        let state = GameState::new();
        assert_eq!(
            state.apply_move(Player::X, 3, 0).unwrap_err(),
            MoveError::OutOfBounds { row: 3, col: 0 }
        );
        assert_eq!(
            state.apply_move(Player::X, 0, 255).unwrap_err(),
            MoveError::OutOfBounds { row: 0, col: 255 }
        );
    }

    #[test]
    fn test_rejection_order() {
        // 终局优先于其他所有检查
        let won = play(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
        assert_eq!(won.apply_move(Player::O, 9, 9).unwrap_err(), MoveError::GameOver);

        // 回合优先于边界
        let state = GameState::new();
        assert!(matches!(
            state.apply_move(Player::O, 9, 9).unwrap_err(),
            MoveError::NotYourTurn { .. }
        ));

        // 边界优先于占用（越界坐标不存在占用问题，这里只确认返回越界）
        assert!(matches!(
            state.apply_move(Player::X, 9, 9).unwrap_err(),
            MoveError::OutOfBounds { .. }
        ));
    }

    #[test]
    fn test_terminal_stability() {
        let won = play(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
        let snapshot = won.clone();

        for row in 0..4 {
            for col in 0..4 {
                for player in [Player::X, Player::O] {
                    assert_eq!(won.apply_move(player, row, col).unwrap_err(), MoveError::GameOver);
                }
            }
        }
        assert_eq!(won, snapshot);
        assert!(won.legal_targets().is_empty());
    }

    #[test]
    fn test_oldest_piece_only_at_cap() {
        let state = play(&[(0, 0), (1, 1)]);
        assert_eq!(state.oldest_piece_of(Player::X), None);
        assert!(!state.will_evict_next(Player::X));

        let state = play_from(state, &[(2, 2), (0, 2), (2, 0)]);
        assert_eq!(state.oldest_piece_of(Player::X), Some(pos(0, 0)));
        assert!(state.will_evict_next(Player::X));
        assert_eq!(state.oldest_piece_of(Player::O), None);
    }

    #[test]
    fn test_eviction_preview() {
        let state = play(&[(0, 0), (1, 1), (2, 2), (0, 2), (2, 0), (2, 1)]);
        let preview = state.eviction_preview();
        assert_eq!(preview.player, Player::X);
        assert!(preview.will_evict);
        assert_eq!(preview.piece, Some(pos(0, 0)));
        assert_eq!(preview.pieces_on_board, 3);
    }

    #[test]
    fn test_draw_with_full_board() {
        // 上限 ≥ 5 时棋盘可以下满
        // X O X
        // X O O
        // O X X
        let state = play_from(
            GameState::with_piece_cap(5),
            &[(0, 0), (0, 1), (0, 2), (1, 1), (1, 0), (1, 2), (2, 1), (2, 0), (2, 2)],
        );
        assert_eq!(state.outcome(), Outcome::Draw);
        assert_eq!(state.winning_line(), None);
        assert!(state.board().is_full());
    }

    #[test]
    fn test_win_takes_precedence_over_draw() {
        // 最后一手同时下满棋盘并连线
        // X O X
        // O X O
        // O X X   <- (2,2) 完成对角线
        let state = play_from(
            GameState::with_piece_cap(5),
            &[(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2), (2, 1), (2, 0), (2, 2)],
        );
        assert!(state.board().is_full());
        assert_eq!(state.outcome(), Outcome::XWins);
        assert_eq!(state.winning_line(), Some([pos(0, 0), pos(1, 1), pos(2, 2)]));
    }

    #[test]
    fn test_board_never_full_with_default_cap() {
        let state = play(&[(0, 0), (0, 1), (0, 2), (1, 1), (1, 0), (1, 2), (2, 1), (2, 0)]);
        assert_eq!(state.board().empty_positions().len(), 3);
        assert_eq!(state.outcome(), Outcome::InProgress);
    }

    #[test]
    fn test_random_games_keep_invariants() {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        // 固定种子，保证测试可重复
        let mut rng = ChaCha8Rng::seed_from_u64(0x9E37_79B9_7F4A_7C15);

        for _ in 0..200 {
            let mut state = GameState::new();
            let mut placed: [Vec<Position>; 2] = [Vec::new(), Vec::new()];

            for _ in 0..60 {
                let targets = state.legal_targets();
                if targets.is_empty() {
                    break;
                }
                let target = *targets.choose(&mut rng).unwrap();
                let player = state.current_player();
                let next = state.apply_move(player, target.row, target.col).unwrap();

                // 淘汰顺序：第 N 枚（N > 3）淘汰第 N-3 枚
                let mine = &mut placed[player as usize];
                mine.push(target);
                let evicted = next.last_move().and_then(|m| m.evicted);
                if mine.len() > PIECE_CAP {
                    assert_eq!(evicted, Some(mine[mine.len() - 1 - PIECE_CAP]));
                } else {
                    assert_eq!(evicted, None);
                }

                assert!(next.is_consistent());
                assert!(next.history(Player::X).len() <= PIECE_CAP);
                assert!(next.history(Player::O).len() <= PIECE_CAP);

                // 非终局时必然交换走子方
                if next.outcome().is_terminal() {
                    assert_eq!(next.current_player(), player);
                    assert_eq!(next.outcome().winner(), Some(player));
                } else {
                    assert_eq!(next.current_player(), player.opponent());
                }
                state = next;
            }
        }
    }
}
