//! 消失井字棋 AI 引擎
//!
//! 包含:
//! - 落子选择接口 [`MovePicker`]
//! - 局面评估函数（考虑即将消失的棋子）
//! - Negamax + Alpha-Beta 搜索

mod evaluate;
mod search;

pub use evaluate::Evaluator;
pub use search::{AiConfig, AiEngine, Difficulty, MovePicker};
