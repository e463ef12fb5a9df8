use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use cronserver_core::models::{TaskLog, TaskLogFilter, TaskLogStatus, TaskProtocol};
use cronserver_core::traits::TaskLogRepository;
use cronserver_core::SchedulerResult;

pub struct SqliteTaskLogRepository {
    pool: SqlitePool,
}

impl SqliteTaskLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<TaskLog> {
        Ok(TaskLog {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            name: row.try_get("name")?,
            spec: row.try_get("spec")?,
            protocol: TaskProtocol::from_i64(row.try_get("protocol")?)?,
            command: row.try_get("command")?,
            timeout: row.try_get("timeout")?,
            hostname: row.try_get("hostname")?,
            retry_index: row.try_get("retry_index")?,
            status: TaskLogStatus::from_i64(row.try_get("status")?)?,
            result: row.try_get("result")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
        })
    }
}

#[async_trait]
impl TaskLogRepository for SqliteTaskLogRepository {
    async fn create(&self, log: &TaskLog) -> SchedulerResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO task_logs (
                task_id, name, spec, protocol, command, timeout,
                hostname, retry_index, status, result, start_time, end_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(log.task_id)
        .bind(&log.name)
        .bind(&log.spec)
        .bind(log.protocol.as_i64())
        .bind(&log.command)
        .bind(log.timeout)
        .bind(&log.hostname)
        .bind(log.retry_index)
        .bind(log.status.as_i64())
        .bind(&log.result)
        .bind(log.start_time)
        .bind(log.end_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn finish(&self, id: i64, status: TaskLogStatus, result: &str) -> SchedulerResult<()> {
        sqlx::query("UPDATE task_logs SET status = ?, result = ?, end_time = ? WHERE id = ?")
            .bind(status.as_i64())
            .bind(result)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, filter: &TaskLogFilter) -> SchedulerResult<Vec<TaskLog>> {
        let mut sql = String::from("SELECT * FROM task_logs WHERE 1=1");
        if filter.task_id.is_some() {
            sql.push_str(" AND task_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY id DESC");
        if filter.page > 0 && filter.page_size > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(task_id) = filter.task_id {
            query = query.bind(task_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_i64());
        }
        if filter.page > 0 && filter.page_size > 0 {
            query = query
                .bind(filter.page_size)
                .bind((filter.page - 1) * filter.page_size);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_log).collect()
    }

    async fn purge_older_than(&self, days: i64) -> SchedulerResult<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = sqlx::query("DELETE FROM task_logs WHERE start_time < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        debug!("清理 {} 天前的执行日志，删除 {} 条", days, result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::memory_pool;

    fn sample_log(name: &str) -> TaskLog {
        TaskLog::start(1, name, "0 * * * * *", TaskProtocol::Rpc, "echo", 60, "web01", 0)
    }

    #[tokio::test]
    async fn test_create_and_finish_round_trip() {
        let pool = memory_pool().await;
        let repo = SqliteTaskLogRepository::new(pool);

        let id = repo.create(&sample_log("attempt")).await.unwrap();
        repo.finish(id, TaskLogStatus::Finish, "done").await.unwrap();

        let logs = repo.list(&TaskLogFilter::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, TaskLogStatus::Finish);
        assert_eq!(logs[0].result, "done");
        assert!(logs[0].end_time.is_some());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let pool = memory_pool().await;
        let repo = SqliteTaskLogRepository::new(pool);

        let failed = repo.create(&sample_log("failed")).await.unwrap();
        repo.finish(failed, TaskLogStatus::Failure, "exit 1")
            .await
            .unwrap();
        repo.create(&sample_log("still_running")).await.unwrap();

        let filter = TaskLogFilter {
            status: Some(TaskLogStatus::Failure),
            ..TaskLogFilter::default()
        };
        let logs = repo.list(&filter).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].name, "failed");
    }

    #[tokio::test]
    async fn test_purge_honors_cutoff() {
        let pool = memory_pool().await;
        let repo = SqliteTaskLogRepository::new(pool);

        let mut old = sample_log("old");
        old.start_time = Utc::now() - Duration::days(30);
        repo.create(&old).await.unwrap();
        repo.create(&sample_log("fresh")).await.unwrap();

        let purged = repo.purge_older_than(7).await.unwrap();
        assert_eq!(purged, 1);

        let remaining = repo.list(&TaskLogFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "fresh");
    }
}
