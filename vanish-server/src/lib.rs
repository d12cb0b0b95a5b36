//! 消失井字棋服务端
//!
//! 包含:
//! - 会话注册表（每会话一把锁）
//! - 消息处理与 AI 应着
//! - 连接管理与空闲会话回收
//! - 配置加载

pub mod config;
pub mod registry;
pub mod server;

pub use config::ServerConfig;
pub use registry::{RegistryError, Session, SessionRegistry};
pub use server::{MessageHandler, Server, ServerState};
