//! 错误类型定义

use thiserror::Error;

use crate::piece::Player;

/// 落子被拒绝的原因
///
/// 按检查顺序排列：终局、回合、边界、占用。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    /// 游戏已结束
    #[error("Game is already over")]
    GameOver,

    /// 不是你的回合
    #[error("Not your turn: expected {expected}, got {actual}")]
    NotYourTurn { expected: Player, actual: Player },

    /// 坐标越界
    #[error("Position out of bounds: ({row}, {col})")]
    OutOfBounds { row: u8, col: u8 },

    /// 格子已被占用
    #[error("Cell is occupied: ({row}, {col})")]
    CellOccupied { row: u8, col: u8 },
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误（bincode）
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
