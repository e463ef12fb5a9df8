use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 任务级别: 主任务由调度器按CRON表达式触发，子任务只能被依赖链触发
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskLevel {
    #[serde(rename = "MAJOR")]
    Major,
    #[serde(rename = "MINOR")]
    Minor,
}

/// 任务执行协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskProtocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "RPC")]
    Rpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskHttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

/// 多主机执行策略: 串行逐台执行或并发执行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Multiplicity {
    #[serde(rename = "SERIAL")]
    Serial,
    #[serde(rename = "CONCURRENT")]
    Concurrent,
}

/// 依赖关系: 强依赖要求父任务执行成功才触发子任务，弱依赖无条件触发
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyStatus {
    #[serde(rename = "STRONG")]
    Strong,
    #[serde(rename = "WEAK")]
    Weak,
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// 新建，未进入定时器
    #[serde(rename = "CREATED")]
    Created,
    /// 已激活，主任务占用一个定时器槽位
    #[serde(rename = "ENABLED")]
    Enabled,
    /// 已暂停，从定时器中移除
    #[serde(rename = "DISABLED")]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyStatus {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "ON_FAILURE")]
    OnFailure,
    #[serde(rename = "ON_SUCCESS")]
    OnSuccess,
    #[serde(rename = "ALWAYS")]
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyChannel {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "MAIL")]
    Mail,
    #[serde(rename = "SLACK")]
    Slack,
    #[serde(rename = "WEBHOOK")]
    Webhook,
}

// 枚举与持久化/接口整数值之间的显式映射表，
// 不使用偏移量运算，避免线上表示调整时出现差一错误
macro_rules! wire_mapping {
    ($ty:ident, $($variant:ident => $value:expr),+ $(,)?) => {
        impl $ty {
            pub fn as_i64(self) -> i64 {
                match self {
                    $($ty::$variant => $value,)+
                }
            }

            pub fn from_i64(value: i64) -> SchedulerResult<Self> {
                match value {
                    $($value => Ok($ty::$variant),)+
                    other => Err(SchedulerError::InvalidTaskParams(format!(
                        "无效的{}取值: {}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

wire_mapping!(TaskLevel, Major => 1, Minor => 2);
wire_mapping!(TaskProtocol, Http => 1, Rpc => 2);
wire_mapping!(TaskHttpMethod, Get => 1, Post => 2);
wire_mapping!(Multiplicity, Serial => 1, Concurrent => 2);
wire_mapping!(DependencyStatus, Strong => 1, Weak => 2);
wire_mapping!(TaskStatus, Created => 0, Enabled => 1, Disabled => 2);
wire_mapping!(NotifyStatus, None => 0, OnFailure => 1, OnSuccess => 2, Always => 3);
wire_mapping!(NotifyChannel, None => 0, Mail => 1, Slack => 2, Webhook => 3);

impl NotifyStatus {
    /// 根据本次执行结果判断是否需要发送通知
    pub fn should_notify(self, success: bool) -> bool {
        match self {
            NotifyStatus::None => false,
            NotifyStatus::OnFailure => !success,
            NotifyStatus::OnSuccess => success,
            NotifyStatus::Always => true,
        }
    }
}

impl NotifyChannel {
    /// 渠道对应的配置分类code
    pub fn setting_code(self) -> Option<&'static str> {
        match self {
            NotifyChannel::None => None,
            NotifyChannel::Mail => Some(crate::models::setting::MAIL_CODE),
            NotifyChannel::Slack => Some(crate::models::setting::SLACK_CODE),
            NotifyChannel::Webhook => Some(crate::models::setting::WEBHOOK_CODE),
        }
    }

    /// Mail和Slack按接收人投递，Webhook只需要一个端点
    pub fn requires_receivers(self) -> bool {
        matches!(self, NotifyChannel::Mail | NotifyChannel::Slack)
    }
}

/// 任务定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub level: TaskLevel,
    /// CRON表达式，仅主任务有效，子任务为空串
    pub spec: String,
    pub protocol: TaskProtocol,
    /// RPC协议为远程命令，HTTP协议为完整URL
    pub command: String,
    pub http_method: TaskHttpMethod,
    /// 超时秒数，0表示不限制；HTTP任务另有300秒上限
    pub timeout: i64,
    pub multi: Multiplicity,
    pub retry_times: i64,
    pub retry_interval: i64,
    pub dependency_status: DependencyStatus,
    /// 子任务ID有序列表，持久化边界才编码为逗号分隔字符串
    pub dependency_task_ids: Vec<i64>,
    pub notify_status: NotifyStatus,
    pub notify_type: NotifyChannel,
    pub notify_receiver_ids: Vec<String>,
    pub notify_keyword: String,
    pub tag: String,
    pub remark: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 读取时根据CRON表达式计算，不持久化
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(name: String, level: TaskLevel, protocol: TaskProtocol, command: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 由数据库生成
            name,
            level,
            spec: String::new(),
            protocol,
            command,
            http_method: TaskHttpMethod::Get,
            timeout: 0,
            multi: Multiplicity::Serial,
            retry_times: 0,
            retry_interval: 0,
            dependency_status: DependencyStatus::Strong,
            dependency_task_ids: Vec::new(),
            notify_status: NotifyStatus::None,
            notify_type: NotifyChannel::None,
            notify_receiver_ids: Vec::new(),
            notify_keyword: String::new(),
            tag: String::new(),
            remark: String::new(),
            status: TaskStatus::Created,
            created_at: now,
            updated_at: now,
            next_run_time: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == TaskStatus::Enabled
    }

    pub fn is_major(&self) -> bool {
        self.level == TaskLevel::Major
    }
}

/// 任务列表查询条件
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub protocol: Option<TaskProtocol>,
    pub status: Option<TaskStatus>,
    pub tag: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

/// 把ID有序列表编码为逗号分隔字符串，仅用于持久化边界
pub fn encode_id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// 解析逗号分隔的ID字符串，忽略空片段，非法片段报错
pub fn decode_id_list(raw: &str) -> SchedulerResult<Vec<i64>> {
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id: i64 = part.parse().map_err(|_| {
            SchedulerError::InvalidTaskParams(format!("无效的任务ID列表片段: {part}"))
        })?;
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_mapping_round_trip() {
        for status in [TaskStatus::Created, TaskStatus::Enabled, TaskStatus::Disabled] {
            assert_eq!(TaskStatus::from_i64(status.as_i64()).unwrap(), status);
        }
        assert!(TaskStatus::from_i64(99).is_err());
    }

    #[test]
    fn test_notify_status_gate() {
        assert!(!NotifyStatus::None.should_notify(false));
        assert!(NotifyStatus::OnFailure.should_notify(false));
        assert!(!NotifyStatus::OnFailure.should_notify(true));
        assert!(NotifyStatus::OnSuccess.should_notify(true));
        assert!(NotifyStatus::Always.should_notify(false));
        assert!(NotifyStatus::Always.should_notify(true));
    }

    #[test]
    fn test_id_list_codec() {
        assert_eq!(decode_id_list("").unwrap(), Vec::<i64>::new());
        assert_eq!(decode_id_list("3,1,2").unwrap(), vec![3, 1, 2]);
        assert_eq!(decode_id_list(" 4 , ,5").unwrap(), vec![4, 5]);
        assert!(decode_id_list("1,x").is_err());
        assert_eq!(encode_id_list(&[3, 1, 2]), "3,1,2");
    }
}
