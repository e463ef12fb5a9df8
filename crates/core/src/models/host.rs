use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 执行主机，RPC协议任务的目标节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub alias: String,
    pub port: i64,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

impl Host {
    pub fn new(name: String, alias: String, port: i64) -> Self {
        Self {
            id: 0,
            name,
            alias,
            port,
            remark: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// 任务-主机关联记录，批量查询时携带主机连接信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHost {
    pub task_id: i64,
    pub host_id: i64,
    /// 主机名，来自hosts表的关联查询
    pub name: String,
    pub alias: String,
    pub port: i64,
}
