//! 服务器主逻辑

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use protocol::{
    ClientMessage, Connection, ErrorCode, GameSnapshot, GameState, Listener, MoveError,
    MoveRequest, Outcome, Player, ProtocolError, ServerMessage, SessionId, TcpListener,
};
use vanish_ai::{AiEngine, MovePicker};

use crate::config::ServerConfig;
use crate::registry::{RegistryError, Session, SessionRegistry};

/// AI 执子方
const AI_PLAYER: Player = Player::O;

/// 服务器状态
pub struct ServerState {
    pub registry: SessionRegistry,
    pub config: ServerConfig,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = match config.session_limit() {
            Some(max) => SessionRegistry::with_limit(max),
            None => SessionRegistry::new(),
        };
        Self { registry, config }
    }
}

/// 消息处理器
pub struct MessageHandler;

impl MessageHandler {
    /// 处理客户端消息，每条请求恰好对应一条响应
    pub fn handle(state: &ServerState, msg: ClientMessage) -> ServerMessage {
        let registry = &state.registry;

        let result = match msg {
            ClientMessage::NewGame { opponent } => registry
                .create_with_opponent(opponent)
                .map(|(id, game)| Self::snapshot(id, &game)),
            ClientMessage::SubmitMove(request) => Self::handle_submit_move(registry, request),
            ClientMessage::QueryState { session_id } => registry
                .get(session_id)
                .map(|game| Self::snapshot(session_id, &game)),
            ClientMessage::Reset { session_id } => registry
                .reset(session_id)
                .map(|game| Self::snapshot(session_id, &game)),
            ClientMessage::DeleteGame { session_id } => registry
                .delete(session_id)
                .map(|()| ServerMessage::GameDeleted { session_id }),
            ClientMessage::ListGames => {
                let games = registry.list();
                let total = games.len();
                Ok(ServerMessage::GameList { games, total })
            }
            ClientMessage::Preview { session_id } => {
                registry.get(session_id).map(|game| ServerMessage::Preview {
                    session_id,
                    preview: game.eviction_preview(),
                })
            }
            ClientMessage::Ping => Ok(ServerMessage::Pong),
        };

        result.unwrap_or_else(Self::error_reply)
    }

    fn snapshot(session_id: SessionId, game: &GameState) -> ServerMessage {
        ServerMessage::GameState(GameSnapshot::new(session_id, game))
    }

    fn error_reply(err: RegistryError) -> ServerMessage {
        ServerMessage::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// 处理落子；有 AI 对手时，玩家落子与 AI 应着在同一次会话锁内完成
    fn handle_submit_move(
        registry: &SessionRegistry,
        request: MoveRequest,
    ) -> Result<ServerMessage, RegistryError> {
        let MoveRequest {
            session_id,
            player,
            row,
            col,
        } = request;

        if registry.opponent(session_id)?.is_none() {
            let game = registry.make_move(session_id, player, row, col)?;
            return Ok(Self::snapshot(session_id, &game));
        }

        let game = registry.update(session_id, |session| {
            Self::play_against_ai(session, player, row, col)
        })?;
        Ok(Self::snapshot(session_id, &game))
    }

    fn play_against_ai(
        session: &Session,
        player: Player,
        row: u8,
        col: u8,
    ) -> Result<GameState, MoveError> {
        let after_human = session.state.apply_move(player, row, col)?;
        debug!("会话 {}: {} 落子 ({}, {})", session.id, player, row, col);

        let Some(difficulty) = session.opponent else {
            return Ok(after_human);
        };
        if after_human.outcome() != Outcome::InProgress
            || after_human.current_player() != AI_PLAYER
        {
            return Ok(after_human);
        }

        let mut engine = AiEngine::from_difficulty(difficulty);
        let Some(target) = engine.choose_move(&after_human) else {
            warn!("会话 {}: AI 无法找到落子位置", session.id);
            return Ok(after_human);
        };

        match after_human.apply_move(AI_PLAYER, target.row, target.col) {
            Ok(after_ai) => {
                debug!(
                    "会话 {}: AI ({:?}) 落子 {}，搜索 {} 个节点",
                    session.id,
                    difficulty,
                    target,
                    engine.nodes_searched()
                );
                Ok(after_ai)
            }
            Err(e) => {
                // 人类落子已合法，不因 AI 的错误回滚
                error!("会话 {}: AI 落子 {} 被拒绝: {}", session.id, target, e);
                Ok(after_human)
            }
        }
    }
}

/// 井字棋服务器
pub struct Server {
    state: Arc<ServerState>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: Arc::new(ServerState::new(config)),
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// 绑定配置中的地址并开始服务
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.state.config.network.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("无法监听 {}", addr))?;
        info!("服务器监听于 {}", addr);
        self.serve(listener).await
    }

    /// 在给定监听器上接受连接，每个连接一个任务
    pub async fn serve<L>(self, mut listener: L) -> anyhow::Result<()>
    where
        L: Listener,
        L::Conn: 'static,
    {
        Self::spawn_sweeper(Arc::clone(&self.state));

        loop {
            match listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            warn!("连接异常结束: {}", e);
                        }
                    });
                }
                Err(e) => warn!("接受连接失败: {}", e),
            }
        }
    }

    /// 定期回收空闲会话
    fn spawn_sweeper(state: Arc<ServerState>) {
        let idle_timeout = state.config.idle_timeout();
        let mut interval = tokio::time::interval(state.config.sweep_interval());

        tokio::spawn(async move {
            loop {
                interval.tick().await;
                let sweep_state = Arc::clone(&state);
                match tokio::task::spawn_blocking(move || {
                    sweep_state.registry.expire_idle(idle_timeout)
                })
                .await
                {
                    Ok(expired) if !expired.is_empty() => {
                        info!("回收 {} 个空闲会话", expired.len());
                    }
                    Ok(_) => {}
                    Err(e) => error!("空闲会话回收任务失败: {}", e),
                }
            }
        });
    }
}

/// 处理单个客户端连接
async fn handle_connection<C: Connection>(
    mut conn: C,
    state: Arc<ServerState>,
) -> protocol::Result<()> {
    let peer = conn.peer_addr().unwrap_or_else(|| "unknown".to_string());
    info!("客户端已连接: {}", peer);

    loop {
        let msg = match conn.recv::<ClientMessage>().await {
            Ok(msg) => msg,
            Err(ProtocolError::ConnectionClosed) => {
                info!("客户端断开: {}", peer);
                return Ok(());
            }
            Err(ProtocolError::Bincode(e)) => {
                // 整帧已读出，流仍然对齐，可以继续服务
                warn!("{} 发送了无法解析的消息: {}", peer, e);
                conn.send(&ServerMessage::Error {
                    code: ErrorCode::InvalidRequest,
                    message: e.to_string(),
                })
                .await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        // AI 搜索是 CPU 密集的，放到阻塞线程池
        let handler_state = Arc::clone(&state);
        let reply = match tokio::task::spawn_blocking(move || {
            MessageHandler::handle(&handler_state, msg)
        })
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("消息处理任务失败: {}", e);
                ServerMessage::Error {
                    code: ErrorCode::InternalError,
                    message: "Internal server error".to_string(),
                }
            }
        };

        conn.send(&reply).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Connector, Difficulty, FrameReader, FrameWriter, Position, TcpConnector};
    use tokio::io::AsyncWriteExt;

    fn test_state() -> ServerState {
        ServerState::new(ServerConfig::default())
    }

    fn expect_snapshot(msg: ServerMessage) -> GameSnapshot {
        match msg {
            ServerMessage::GameState(snapshot) => snapshot,
            other => panic!("expected GameState, got {:?}", other),
        }
    }

    fn expect_error(msg: ServerMessage) -> ErrorCode {
        match msg {
            ServerMessage::Error { code, .. } => code,
            other => panic!("expected Error, got {:?}", other),
        }
    }

    fn submit(session_id: SessionId, player: Player, row: u8, col: u8) -> ClientMessage {
        ClientMessage::SubmitMove(MoveRequest {
            session_id,
            player,
            row,
            col,
        })
    }

    #[test]
    fn test_new_game_and_move() {
        let state = test_state();

        let snapshot = expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::NewGame { opponent: None },
        ));
        let id = snapshot.session_id;
        assert_eq!(snapshot.total_moves, 0);
        assert_eq!(snapshot.current_player, Player::X);

        let snapshot = expect_snapshot(MessageHandler::handle(&state, submit(id, Player::X, 1, 1)));
        assert_eq!(snapshot.board[1][1], Some(Player::X));
        assert_eq!(snapshot.current_player, Player::O);

        let queried = expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::QueryState { session_id: id },
        ));
        assert_eq!(queried, snapshot);
    }

    #[test]
    fn test_error_codes() {
        let state = test_state();
        let id = expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::NewGame { opponent: None },
        ))
        .session_id;

        let code = expect_error(MessageHandler::handle(&state, submit(id, Player::O, 0, 0)));
        assert_eq!(code, ErrorCode::NotYourTurn);

        let code = expect_error(MessageHandler::handle(&state, submit(id, Player::X, 3, 0)));
        assert_eq!(code, ErrorCode::OutOfBounds);

        MessageHandler::handle(&state, submit(id, Player::X, 0, 0));
        let code = expect_error(MessageHandler::handle(&state, submit(id, Player::O, 0, 0)));
        assert_eq!(code, ErrorCode::CellOccupied);

        let code = expect_error(MessageHandler::handle(
            &state,
            ClientMessage::QueryState { session_id: 999 },
        ));
        assert_eq!(code, ErrorCode::SessionNotFound);
    }

    #[test]
    fn test_reset_delete_and_list() {
        let state = test_state();
        let id = expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::NewGame { opponent: None },
        ))
        .session_id;
        MessageHandler::handle(&state, submit(id, Player::X, 2, 2));

        let snapshot = expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::Reset { session_id: id },
        ));
        assert_eq!(snapshot, GameSnapshot::new(id, &GameState::new()));

        match MessageHandler::handle(&state, ClientMessage::ListGames) {
            ServerMessage::GameList { games, total } => {
                assert_eq!(total, 1);
                assert_eq!(games[0].session_id, id);
            }
            other => panic!("expected GameList, got {:?}", other),
        }

        assert!(matches!(
            MessageHandler::handle(&state, ClientMessage::DeleteGame { session_id: id }),
            ServerMessage::GameDeleted { session_id } if session_id == id
        ));
        let code = expect_error(MessageHandler::handle(
            &state,
            ClientMessage::Reset { session_id: id },
        ));
        assert_eq!(code, ErrorCode::SessionNotFound);
    }

    #[test]
    fn test_preview() {
        let state = test_state();
        let id = expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::NewGame { opponent: None },
        ))
        .session_id;
        for (player, row, col) in [
            (Player::X, 0, 0),
            (Player::O, 1, 1),
            (Player::X, 0, 1),
            (Player::O, 2, 2),
            (Player::X, 2, 0),
            (Player::O, 1, 2),
        ] {
            expect_snapshot(MessageHandler::handle(&state, submit(id, player, row, col)));
        }

        match MessageHandler::handle(&state, ClientMessage::Preview { session_id: id }) {
            ServerMessage::Preview { session_id, preview } => {
                assert_eq!(session_id, id);
                assert_eq!(preview.player, Player::X);
                assert!(preview.will_evict);
                assert_eq!(preview.piece, Some(Position::new_unchecked(0, 0)));
            }
            other => panic!("expected Preview, got {:?}", other),
        }
    }

    #[test]
    fn test_ai_replies_in_same_request() {
        let state = test_state();
        let id = expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::NewGame {
                opponent: Some(Difficulty::Medium),
            },
        ))
        .session_id;

        let snapshot = expect_snapshot(MessageHandler::handle(&state, submit(id, Player::X, 1, 1)));
        assert_eq!(snapshot.total_moves, 2);
        assert_eq!(snapshot.current_player, Player::X);
        assert_eq!(snapshot.history_o.len(), 1);
        assert_eq!(snapshot.last_move.map(|m| m.player), Some(Player::O));

        // 人类只能执 X
        let code = expect_error(MessageHandler::handle(&state, submit(id, Player::O, 0, 0)));
        assert_eq!(code, ErrorCode::NotYourTurn);
    }

    #[test]
    fn test_session_limit_from_config() {
        let state = ServerState::new(ServerConfig {
            max_sessions: 1,
            ..ServerConfig::default()
        });
        expect_snapshot(MessageHandler::handle(
            &state,
            ClientMessage::NewGame { opponent: None },
        ));
        let code = expect_error(MessageHandler::handle(
            &state,
            ClientMessage::NewGame { opponent: None },
        ));
        assert_eq!(code, ErrorCode::SessionLimitReached);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(Server::new(ServerConfig::default()).serve(listener));

        let mut conn = TcpConnector.connect(&addr).await.unwrap();

        conn.send(&ClientMessage::Ping).await.unwrap();
        assert!(matches!(
            conn.recv::<ServerMessage>().await.unwrap(),
            ServerMessage::Pong
        ));

        conn.send(&ClientMessage::NewGame { opponent: None }).await.unwrap();
        let id = expect_snapshot(conn.recv().await.unwrap()).session_id;

        conn.send(&submit(id, Player::X, 0, 2)).await.unwrap();
        let snapshot = expect_snapshot(conn.recv().await.unwrap());
        assert_eq!(snapshot.board[0][2], Some(Player::X));

        server.abort();
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(Server::new(ServerConfig::default()).serve(listener));

        let stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);

        // 版本正确、长度正确，但载荷不是合法消息
        let mut frame = vec![protocol::PROTOCOL_VERSION, 0, 0, 0, 2];
        frame.extend_from_slice(&[0xff, 0xff]);
        write_half.write_all(&frame).await.unwrap();

        let reply: ServerMessage = reader.read_frame().await.unwrap();
        assert_eq!(expect_error(reply), ErrorCode::InvalidRequest);

        FrameWriter::new(&mut write_half)
            .write_frame(&ClientMessage::Ping)
            .await
            .unwrap();

        let reply: ServerMessage = reader.read_frame().await.unwrap();
        assert!(matches!(reply, ServerMessage::Pong));

        server.abort();
    }
}
