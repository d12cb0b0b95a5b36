//! 会话注册表
//!
//! 会话 ID -> 当前对局状态的唯一可变映射。每个会话一把锁，
//! “读取-落子-写回”在同一次持锁内完成；不同会话互不阻塞。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use protocol::{Difficulty, ErrorCode, GameState, MoveError, Player, SessionId, SessionInfo};
use thiserror::Error;
use tracing::{debug, info, warn};

/// 注册表错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// 会话不存在
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// 会话数量已达上限
    #[error("Session limit reached (max: {max})")]
    SessionLimitReached { max: usize },

    /// 落子被拒绝
    #[error(transparent)]
    Move(#[from] MoveError),
}

impl RegistryError {
    /// 对应的协议错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            RegistryError::SessionLimitReached { .. } => ErrorCode::SessionLimitReached,
            RegistryError::Move(err) => ErrorCode::from(*err),
        }
    }
}

/// 单个会话
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub state: GameState,
    /// 由 AI 执 O 时的难度
    pub opponent: Option<Difficulty>,
    pub created_at: DateTime<Utc>,
    last_active: Instant,
}

impl Session {
    fn new(id: SessionId, opponent: Option<Difficulty>) -> Self {
        Self {
            id,
            state: GameState::new(),
            opponent,
            created_at: Utc::now(),
            last_active: Instant::now(),
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            created_at: self.created_at,
            outcome: self.state.outcome(),
            total_moves: self.state.total_moves(),
            opponent: self.opponent,
        }
    }
}

type SessionHandle = Arc<Mutex<Session>>;

fn lock(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 会话注册表
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    next_id: AtomicU64,
    max_sessions: Option<usize>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_sessions: None,
        }
    }

    /// 限制同时存在的会话数
    pub fn with_limit(max_sessions: usize) -> Self {
        Self {
            max_sessions: Some(max_sessions),
            ..Self::new()
        }
    }

    /// 生成新的会话 ID（单调递增，不复用）
    fn generate_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn handle(&self, id: SessionId) -> Result<SessionHandle, RegistryError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RegistryError::SessionNotFound(id))
    }

    /// 新建对局
    pub fn create(&self) -> Result<(SessionId, GameState), RegistryError> {
        self.create_with_opponent(None)
    }

    /// 新建对局，可选由 AI 执 O
    pub fn create_with_opponent(
        &self,
        opponent: Option<Difficulty>,
    ) -> Result<(SessionId, GameState), RegistryError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(max) = self.max_sessions {
            if sessions.len() >= max {
                warn!("会话数量已达上限: {}", max);
                return Err(RegistryError::SessionLimitReached { max });
            }
        }

        let id = self.generate_id();
        let session = Session::new(id, opponent);
        let state = session.state.clone();
        sessions.insert(id, Arc::new(Mutex::new(session)));

        info!("创建会话 {} (AI: {:?})", id, opponent);
        Ok((id, state))
    }

    /// 查询状态（只读）
    pub fn get(&self, id: SessionId) -> Result<GameState, RegistryError> {
        let handle = self.handle(id)?;
        let session = lock(&handle);
        Ok(session.state.clone())
    }

    /// 会话绑定的 AI 难度
    pub fn opponent(&self, id: SessionId) -> Result<Option<Difficulty>, RegistryError> {
        let handle = self.handle(id)?;
        let session = lock(&handle);
        Ok(session.opponent)
    }

    /// 在会话锁内执行一次“读取-计算-写回”
    ///
    /// `f` 返回错误时存储的状态不变。
    pub fn update<F>(&self, id: SessionId, f: F) -> Result<GameState, RegistryError>
    where
        F: FnOnce(&Session) -> Result<GameState, MoveError>,
    {
        let handle = self.handle(id)?;
        let mut session = lock(&handle);

        let next = f(&session)?;
        session.state = next.clone();
        session.last_active = Instant::now();
        Ok(next)
    }

    /// 落子
    pub fn make_move(
        &self,
        id: SessionId,
        player: Player,
        row: u8,
        col: u8,
    ) -> Result<GameState, RegistryError> {
        let result = self.update(id, |session| session.state.apply_move(player, row, col));
        match &result {
            Ok(state) => debug!(
                "会话 {}: {} 落子 ({}, {})，结果 {:?}",
                id,
                player,
                row,
                col,
                state.outcome()
            ),
            Err(e) => warn!("会话 {}: {} 落子 ({}, {}) 被拒绝: {}", id, player, row, col, e),
        }
        result
    }

    /// 重置对局，保留会话 ID 与 AI 设置
    pub fn reset(&self, id: SessionId) -> Result<GameState, RegistryError> {
        let handle = self.handle(id)?;
        let mut session = lock(&handle);

        session.state = GameState::new();
        session.last_active = Instant::now();

        info!("会话 {} 已重置", id);
        Ok(session.state.clone())
    }

    /// 删除会话
    pub fn delete(&self, id: SessionId) -> Result<(), RegistryError> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(_) => {
                info!("会话 {} 已删除", id);
                Ok(())
            }
            None => Err(RegistryError::SessionNotFound(id)),
        }
    }

    /// 所有会话概要（按 ID 排序）
    pub fn list(&self) -> Vec<SessionInfo> {
        let handles: Vec<SessionHandle> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut infos: Vec<SessionInfo> = handles.iter().map(|h| lock(h).info()).collect();
        infos.sort_by_key(|info| info.session_id);
        infos
    }

    /// 会话数量
    pub fn count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 移除超过 `max_idle` 未活动的会话，返回被移除的 ID
    ///
    /// 正在被锁住的会话视为活跃，直接跳过；全局写锁只在删除时短暂持有。
    pub fn expire_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let candidates: Vec<SessionId> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, handle)| is_idle(handle, max_idle))
            .map(|(id, _)| *id)
            .collect();

        if candidates.is_empty() {
            return candidates;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let mut expired = Vec::with_capacity(candidates.len());
        for id in candidates {
            // 两次加锁之间可能有新的落子，重新确认
            let still_idle = sessions
                .get(&id)
                .is_some_and(|handle| is_idle(handle, max_idle));
            if still_idle {
                sessions.remove(&id);
                info!("会话 {} 超时，已移除", id);
                expired.push(id);
            }
        }
        expired
    }
}

/// 会话空闲超过 `max_idle` 且当前未被占用
fn is_idle(handle: &SessionHandle, max_idle: Duration) -> bool {
    match handle.try_lock() {
        Ok(session) => session.last_active.elapsed() > max_idle,
        Err(TryLockError::Poisoned(poisoned)) => {
            poisoned.into_inner().last_active.elapsed() > max_idle
        }
        Err(TryLockError::WouldBlock) => false,
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
