//! 消息类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::{Line, WINNING_LINES};
use crate::constants::BOARD_SIZE;
use crate::error::MoveError;
use crate::piece::{Player, Position};
use crate::state::{EvictionPreview, GameState, LastMove, Outcome};

/// 会话 ID
pub type SessionId = u64;

/// AI 难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    /// 简单：浅层搜索，30% 概率随机落子
    Easy,
    /// 中等：depth=4
    Medium,
    /// 困难：depth=8
    Hard,
}

/// 落子请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub session_id: SessionId,
    pub player: Player,
    pub row: u8,
    pub col: u8,
}

/// 完整的对局快照（发送给客户端）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub session_id: SessionId,
    /// 按行排列的棋盘
    pub board: [[Option<Player>; BOARD_SIZE]; BOARD_SIZE],
    pub current_player: Player,
    pub outcome: Outcome,
    /// X 的在场棋子（从老到新）
    pub history_x: Vec<Position>,
    /// O 的在场棋子（从老到新）
    pub history_o: Vec<Position>,
    /// X 下一次落子会消失的棋子
    pub oldest_x: Option<Position>,
    /// O 下一次落子会消失的棋子
    pub oldest_o: Option<Position>,
    pub winning_line: Option<Line>,
    pub last_move: Option<LastMove>,
    pub total_moves: u32,
}

impl GameSnapshot {
    pub fn new(session_id: SessionId, state: &GameState) -> Self {
        Self {
            session_id,
            board: state.board().rows(),
            current_player: state.current_player(),
            outcome: state.outcome(),
            history_x: state.history(Player::X).to_vec(),
            history_o: state.history(Player::O).to_vec(),
            oldest_x: state.oldest_piece_of(Player::X),
            oldest_o: state.oldest_piece_of(Player::O),
            winning_line: state.winning_line(),
            last_move: state.last_move(),
            total_moves: state.total_moves(),
        }
    }

    /// 获胜连线在 8 条连线中的编号（用于前端绘制）
    pub fn winning_line_index(&self) -> Option<usize> {
        let line = self.winning_line?;
        WINNING_LINES.iter().position(|l| *l == line)
    }
}

/// 会话概要（用于列表展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub total_moves: u32,
    /// 由 AI 执 O 时的难度
    pub opponent: Option<Difficulty>,
}

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    // === 会话管理 ===
    /// 新建对局，可选由 AI 执 O
    NewGame { opponent: Option<Difficulty> },
    /// 重置对局（保留会话 ID）
    Reset { session_id: SessionId },
    /// 删除对局
    DeleteGame { session_id: SessionId },
    /// 获取对局列表
    ListGames,

    // === 对局操作 ===
    /// 落子
    SubmitMove(MoveRequest),
    /// 查询状态（只读）
    QueryState { session_id: SessionId },
    /// 查询当前走子方的淘汰预告
    Preview { session_id: SessionId },

    // === 心跳 ===
    /// 心跳请求
    Ping,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// 对局状态
    GameState(GameSnapshot),
    /// 淘汰预告
    Preview {
        session_id: SessionId,
        preview: EvictionPreview,
    },
    /// 对局已删除
    GameDeleted { session_id: SessionId },
    /// 对局列表
    GameList { games: Vec<SessionInfo>, total: usize },
    /// 心跳响应
    Pong,
    /// 错误消息
    Error { code: ErrorCode, message: String },
}

/// 错误码定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // === 会话相关 (1xx) ===
    /// 会话不存在
    SessionNotFound = 100,
    /// 会话数量已达上限
    SessionLimitReached = 101,

    // === 落子相关 (2xx) ===
    /// 游戏已结束
    GameOver = 200,
    /// 不是你的回合
    NotYourTurn = 201,
    /// 坐标越界
    OutOfBounds = 202,
    /// 格子已被占用
    CellOccupied = 203,

    // === 请求相关 (4xx) ===
    /// 请求格式错误
    InvalidRequest = 400,

    // === 系统相关 (5xx) ===
    /// 内部错误
    InternalError = 500,
}

impl From<MoveError> for ErrorCode {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::GameOver => ErrorCode::GameOver,
            MoveError::NotYourTurn { .. } => ErrorCode::NotYourTurn,
            MoveError::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            MoveError::CellOccupied { .. } => ErrorCode::CellOccupied,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
