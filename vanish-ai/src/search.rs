//! 搜索引擎
//!
//! Negamax + Alpha-Beta 剪枝。走法一律通过 `GameState::apply_move` 模拟，
//! 淘汰规则因此自动生效。

use std::time::{Duration, Instant};

use protocol::{GameState, Outcome, Position};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evaluate::Evaluator;

// 重导出 Difficulty 以便外部使用
pub use protocol::Difficulty;

/// 胜局分值，减去步数使更快的胜利更优
const WIN_SCORE: i32 = 100_000;

/// 落子选择接口
///
/// 选出的坐标必须再经过 `GameState::apply_move` 校验，实现方没有任何特权。
pub trait MovePicker {
    /// 为当前走子方选择落子位置；终局或无空格时返回 None
    fn choose_move(&mut self, state: &GameState) -> Option<Position>;
}

/// AI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub difficulty: Difficulty,
    pub max_depth: u8,
    pub time_limit_ms: u64,
    /// 随机落子的概率
    pub random_move_chance: f32,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Self {
                difficulty,
                max_depth: 1,
                time_limit_ms: 200,
                random_move_chance: 0.3,
            },
            Difficulty::Medium => Self {
                difficulty,
                max_depth: 4,
                time_limit_ms: 1000,
                random_move_chance: 0.0,
            },
            Difficulty::Hard => Self {
                difficulty,
                max_depth: 8,
                time_limit_ms: 2000,
                random_move_chance: 0.0,
            },
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self::from_difficulty(Difficulty::Medium)
    }
}

/// AI 引擎
pub struct AiEngine {
    config: AiConfig,
    rng: ChaCha8Rng,
    nodes_searched: u64,
    completed_depth: u8,
    timed_out: bool,
}

impl AiEngine {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::from_entropy(),
            nodes_searched: 0,
            completed_depth: 0,
            timed_out: false,
        }
    }

    /// 固定随机种子（用于复现）
    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            nodes_searched: 0,
            completed_depth: 0,
            timed_out: false,
        }
    }

    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        Self::new(AiConfig::from_difficulty(difficulty))
    }

    /// 上一次搜索的节点数
    pub fn nodes_searched(&self) -> u64 {
        self.nodes_searched
    }

    /// 上一次搜索完整完成的深度
    pub fn completed_depth(&self) -> u8 {
        self.completed_depth
    }

    /// 搜索最佳落子
    ///
    /// 迭代加深：超时的那一层作废，采用最后一个完整层的结果。
    pub fn search(&mut self, state: &GameState) -> Option<Position> {
        self.nodes_searched = 0;
        self.completed_depth = 0;
        let targets = state.legal_targets();
        if targets.len() <= 1 {
            return targets.first().copied();
        }

        if self.config.random_move_chance > 0.0
            && self.rng.gen::<f32>() < self.config.random_move_chance
        {
            return targets.choose(&mut self.rng).copied();
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.time_limit_ms);
        let mut best_score = i32::MIN;
        let mut best: Vec<Position> = Vec::new();

        for depth in 1..=self.config.max_depth.max(1) {
            self.timed_out = false;
            let (score, moves) = self.search_root(state, &targets, depth, &deadline);

            // 第一层不会超时，之后超时的层直接丢弃
            if self.timed_out {
                break;
            }
            best_score = score;
            best = moves;
            self.completed_depth = depth;

            // 已找到必胜
            if best_score > WIN_SCORE - i32::from(depth) - 1 {
                break;
            }
        }

        // 同分时随机挑选，避免每局都走同一套
        let choice = best.choose(&mut self.rng).copied();
        debug!(
            "AI 搜索完成: depth={}, nodes={}, score={}, move={:?}",
            self.completed_depth, self.nodes_searched, best_score, choice
        );
        choice
    }

    /// 在固定深度下为每个根节点打分，返回最高分及其所有落子
    fn search_root(
        &mut self,
        state: &GameState,
        targets: &[Position],
        depth: u8,
        deadline: &Instant,
    ) -> (i32, Vec<Position>) {
        let mut best_score = i32::MIN;
        let mut best: Vec<Position> = Vec::new();

        for &target in targets {
            let window = (-WIN_SCORE * 2, WIN_SCORE * 2);
            let Some(score) = self.score_move(state, target, depth, window.0, window.1, 1, deadline) else {
                continue;
            };
            if self.timed_out {
                break;
            }
            if score > best_score {
                best_score = score;
                best.clear();
                best.push(target);
            } else if score == best_score {
                best.push(target);
            }
        }

        (best_score, best)
    }

    /// 模拟一步并返回该步对走子方的分值；非法落子返回 None
    #[allow(clippy::too_many_arguments)]
    fn score_move(
        &mut self,
        state: &GameState,
        target: Position,
        depth: u8,
        alpha: i32,
        beta: i32,
        ply: i32,
        deadline: &Instant,
    ) -> Option<i32> {
        let mover = state.current_player();
        let next = state.apply_move(mover, target.row, target.col).ok()?;

        let score = match next.outcome() {
            Outcome::InProgress => -self.negamax(&next, depth - 1, -beta, -alpha, ply + 1, deadline),
            Outcome::Draw => 0,
            outcome if outcome.winner() == Some(mover) => WIN_SCORE - ply,
            _ => -(WIN_SCORE - ply),
        };
        Some(score)
    }

    /// Negamax，分值以当前走子方为视角
    fn negamax(
        &mut self,
        state: &GameState,
        depth: u8,
        mut alpha: i32,
        beta: i32,
        ply: i32,
        deadline: &Instant,
    ) -> i32 {
        self.nodes_searched += 1;

        if depth == 0 {
            return Evaluator::evaluate(state, state.current_player());
        }
        if Instant::now() >= *deadline {
            self.timed_out = true;
            return Evaluator::evaluate(state, state.current_player());
        }

        let targets = state.legal_targets();
        if targets.is_empty() {
            return 0;
        }

        for target in targets {
            let Some(score) = self.score_move(state, target, depth, alpha, beta, ply, deadline) else {
                continue;
            };
            if score >= beta {
                return beta; // Beta 剪枝
            }
            if score > alpha {
                alpha = score;
            }
        }

        alpha
    }
}

impl MovePicker for AiEngine {
    fn choose_move(&mut self, state: &GameState) -> Option<Position> {
        self.search(state)
    }
}
