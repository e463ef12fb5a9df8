use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 应用配置，TOML文件加载，环境变量CRONSERVER_*可覆盖
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://cronserver.db".to_string(),
            max_connections: 5,
        }
    }
}

/// 远程执行代理的连接参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 代理接口协议，http或https
    pub scheme: String,
    /// 代理上执行命令的接口路径
    pub api_path: String,
    pub connect_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            api_path: "/api/v1/run".to_string(),
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 依赖链最大深度，防止环状依赖无限递归
    pub max_dependency_depth: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_dependency_depth: 16,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            agent: AgentConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置文件，文件不存在时使用默认值，环境变量优先级最高
    pub fn load(path: &str) -> SchedulerResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CRONSERVER").separator("__"))
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("加载配置失败: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| SchedulerError::Configuration(format!("解析配置失败: {e}")))
    }
}
