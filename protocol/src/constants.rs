//! 协议常量定义

use std::time::Duration;

/// 协议版本号
pub const PROTOCOL_VERSION: u8 = 1;

/// 棋盘边长（3x3）
pub const BOARD_SIZE: usize = 3;

/// 棋盘格子总数
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// 每方同时在场的棋子上限
pub const PIECE_CAP: usize = 3;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 65536;

/// 默认服务端端口
pub const DEFAULT_PORT: u16 = 9527;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
