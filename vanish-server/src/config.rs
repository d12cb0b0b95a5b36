//! 服务端配置

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use protocol::NetworkConfig;
use serde::{Deserialize, Serialize};

/// 指定配置文件路径的环境变量
pub const CONFIG_ENV: &str = "VANISH_SERVER_CONFIG";

/// 服务端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    /// 同时存在的会话上限，0 表示不限
    pub max_sessions: usize,
    /// 会话空闲多久后被回收
    pub session_idle_timeout_secs: u64,
    /// 空闲回收的检查间隔
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            max_sessions: 1024,
            session_idle_timeout_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// 获取配置文件路径：环境变量优先，其次是用户配置目录
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|mut path| {
            path.push("vanish-tictactoe");
            path.push("server.json");
            path
        })
    }

    /// 加载配置，任何失败都回退到默认值
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("无法获取配置目录，使用默认配置");
            return Self::default();
        };

        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!("已加载配置: {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件无效: {:#}，使用默认配置", e);
                Self::default()
            }
        }
    }

    /// 从指定文件加载配置
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式无效 {}", path.display()))?;
        Ok(config)
    }

    pub fn session_limit(&self) -> Option<usize> {
        (self.max_sessions > 0).then_some(self.max_sessions)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
