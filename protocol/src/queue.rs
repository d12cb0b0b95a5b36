//! 棋子历史队列
//!
//! 每方一个先进先出队列，按落子时间排序（队首最老）。
//! 队列满时再落子，先弹出队首。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::piece::Position;

/// 单方的在场棋子队列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceQueue {
    positions: VecDeque<Position>,
    cap: usize,
}

impl PieceQueue {
    /// 创建空队列
    pub fn new(cap: usize) -> Self {
        Self {
            positions: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// 容量上限
    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// 是否已达上限（下一次落子会淘汰队首）
    pub fn is_full(&self) -> bool {
        self.positions.len() >= self.cap
    }

    /// 最老的棋子
    pub fn oldest(&self) -> Option<Position> {
        self.positions.front().copied()
    }

    /// 最新的棋子
    pub fn newest(&self) -> Option<Position> {
        self.positions.back().copied()
    }

    /// 弹出最老的棋子
    pub fn pop_oldest(&mut self) -> Option<Position> {
        self.positions.pop_front()
    }

    /// 压入最新的棋子
    ///
    /// 调用方需保证压入前队列未满。
    pub fn push_newest(&mut self, pos: Position) {
        debug_assert!(!self.is_full(), "piece queue overflow: cap {}", self.cap);
        self.positions.push_back(pos);
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.positions.contains(&pos)
    }

    /// 按从老到新的顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = Position> + '_ {
        self.positions.iter().copied()
    }

    /// 转为 Vec（从老到新）
    pub fn to_vec(&self) -> Vec<Position> {
        self.positions.iter().copied().collect()
    }
}
