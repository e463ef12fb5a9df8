use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use cronserver_core::models::{
    decode_id_list, encode_id_list, DependencyStatus, Multiplicity, NotifyChannel, NotifyStatus,
    Task, TaskFilter, TaskHttpMethod, TaskLevel, TaskProtocol, TaskStatus,
};
use cronserver_core::traits::TaskRepository;
use cronserver_core::SchedulerResult;

/// 通知接收者列表的持久化编码，与依赖ID列表相同的逗号分隔约定
fn encode_receivers(receivers: &[String]) -> String {
    receivers.join(",")
}

fn decode_receivers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            level: TaskLevel::from_i64(row.try_get("level")?)?,
            spec: row.try_get("spec")?,
            protocol: TaskProtocol::from_i64(row.try_get("protocol")?)?,
            command: row.try_get("command")?,
            http_method: TaskHttpMethod::from_i64(row.try_get("http_method")?)?,
            timeout: row.try_get("timeout")?,
            multi: Multiplicity::from_i64(row.try_get("multi")?)?,
            retry_times: row.try_get("retry_times")?,
            retry_interval: row.try_get("retry_interval")?,
            dependency_status: DependencyStatus::from_i64(row.try_get("dependency_status")?)?,
            dependency_task_ids: decode_id_list(row.try_get("dependency_task_ids")?)?,
            notify_status: NotifyStatus::from_i64(row.try_get("notify_status")?)?,
            notify_type: NotifyChannel::from_i64(row.try_get("notify_type")?)?,
            notify_receiver_ids: decode_receivers(row.try_get("notify_receiver_ids")?),
            notify_keyword: row.try_get("notify_keyword")?,
            tag: row.try_get("tag")?,
            remark: row.try_get("remark")?,
            status: TaskStatus::from_i64(row.try_get("status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            next_run_time: None,
        })
    }

    /// 按过滤条件拼接WHERE子句，list与count共用同一套条件
    fn filter_clause(filter: &TaskFilter) -> String {
        let mut clause = String::from(" WHERE 1=1");
        if filter.id.is_some() {
            clause.push_str(" AND id = ?");
        }
        if filter.name.is_some() {
            clause.push_str(" AND name LIKE ?");
        }
        if filter.protocol.is_some() {
            clause.push_str(" AND protocol = ?");
        }
        if filter.status.is_some() {
            clause.push_str(" AND status = ?");
        }
        if filter.tag.is_some() {
            clause.push_str(" AND tag = ?");
        }
        clause
    }

    fn bind_filters<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        filter: &'q TaskFilter,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        if let Some(id) = filter.id {
            query = query.bind(id);
        }
        if let Some(name) = &filter.name {
            query = query.bind(format!("%{name}%"));
        }
        if let Some(protocol) = filter.protocol {
            query = query.bind(protocol.as_i64());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_i64());
        }
        if let Some(tag) = &filter.tag {
            query = query.bind(tag.as_str());
        }
        query
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> SchedulerResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO tasks (
                name, level, spec, protocol, command, http_method, timeout, multi,
                retry_times, retry_interval, dependency_status, dependency_task_ids,
                notify_status, notify_type, notify_receiver_ids, notify_keyword,
                tag, remark, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&task.name)
        .bind(task.level.as_i64())
        .bind(&task.spec)
        .bind(task.protocol.as_i64())
        .bind(&task.command)
        .bind(task.http_method.as_i64())
        .bind(task.timeout)
        .bind(task.multi.as_i64())
        .bind(task.retry_times)
        .bind(task.retry_interval)
        .bind(task.dependency_status.as_i64())
        .bind(encode_id_list(&task.dependency_task_ids))
        .bind(task.notify_status.as_i64())
        .bind(task.notify_type.as_i64())
        .bind(encode_receivers(&task.notify_receiver_ids))
        .bind(&task.notify_keyword)
        .bind(&task.tag)
        .bind(&task.remark)
        .bind(task.status.as_i64())
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!("任务已写入: ID {}, 名称: {}", id, task.name);
        Ok(id)
    }

    async fn update(&self, task: &Task) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            UPDATE tasks SET
                name = ?, level = ?, spec = ?, protocol = ?, command = ?, http_method = ?,
                timeout = ?, multi = ?, retry_times = ?, retry_interval = ?,
                dependency_status = ?, dependency_task_ids = ?, notify_status = ?,
                notify_type = ?, notify_receiver_ids = ?, notify_keyword = ?,
                tag = ?, remark = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.name)
        .bind(task.level.as_i64())
        .bind(&task.spec)
        .bind(task.protocol.as_i64())
        .bind(&task.command)
        .bind(task.http_method.as_i64())
        .bind(task.timeout)
        .bind(task.multi.as_i64())
        .bind(task.retry_times)
        .bind(task.retry_interval)
        .bind(task.dependency_status.as_i64())
        .bind(encode_id_list(&task.dependency_task_ids))
        .bind(task.notify_status.as_i64())
        .bind(task.notify_type.as_i64())
        .bind(encode_receivers(&task.notify_receiver_ids))
        .bind(&task.notify_keyword)
        .bind(&task.tag)
        .bind(&task.remark)
        .bind(task.status.as_i64())
        .bind(task.updated_at)
        .bind(task.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let mut sql = format!("SELECT * FROM tasks{} ORDER BY id", Self::filter_clause(filter));
        if filter.page > 0 && filter.page_size > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = Self::bind_filters(sqlx::query(&sql), filter);
        if filter.page > 0 && filter.page_size > 0 {
            query = query
                .bind(filter.page_size)
                .bind((filter.page - 1) * filter.page_size);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn count(&self, filter: &TaskFilter) -> SchedulerResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM tasks{}",
            Self::filter_clause(filter)
        );
        let row = Self::bind_filters(sqlx::query(&sql), filter)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn get_enabled_major_tasks(&self) -> SchedulerResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = ? AND level = ? ORDER BY id")
            .bind(TaskStatus::Enabled.as_i64())
            .bind(TaskLevel::Major.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn name_exists(&self, name: &str, excluding_id: i64) -> SchedulerResult<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM tasks WHERE name = ? AND id != ?")
            .bind(name)
            .bind(excluding_id)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total > 0)
    }

    async fn get_status(&self, id: i64) -> SchedulerResult<Option<TaskStatus>> {
        let row = sqlx::query("SELECT status FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(TaskStatus::from_i64(row.try_get("status")?)?)),
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: i64, status: TaskStatus) -> SchedulerResult<()> {
        sqlx::query("UPDATE tasks SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(status.as_i64())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
