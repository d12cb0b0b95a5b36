//! 消失井字棋共享协议库
//!
//! 包含:
//! - 棋盘、坐标、棋子队列等核心数据结构
//! - 对局状态机（落子校验、淘汰、胜负/和棋判定）
//! - 消息类型定义 (ClientMessage, ServerMessage)
//! - 传输层抽象与帧编解码

mod board;
mod constants;
mod error;
mod message;
mod piece;
mod queue;
mod state;
mod transport;

pub use board::{Board, Line, WINNING_LINES};
pub use constants::*;
pub use error::{MoveError, ProtocolError, Result};
pub use message::{
    ClientMessage, Difficulty, ErrorCode, GameSnapshot, MoveRequest, ServerMessage, SessionId,
    SessionInfo,
};
pub use piece::{Player, Position};
pub use queue::PieceQueue;
pub use state::{EvictionPreview, GameState, LastMove, Outcome};
pub use transport::{
    Connection, Connector, FrameReader, FrameWriter, Listener, NetworkConfig, TcpConnection,
    TcpConnector, TcpListener,
};
