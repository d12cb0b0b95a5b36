use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vanish_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vanish_server=debug".parse()?),
        )
        .init();

    info!("消失井字棋服务端启动中...");

    let config = ServerConfig::load();
    Server::new(config).run().await
}
