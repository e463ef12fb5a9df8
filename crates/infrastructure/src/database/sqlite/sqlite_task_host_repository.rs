use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use cronserver_core::models::TaskHost;
use cronserver_core::traits::TaskHostRepository;
use cronserver_core::SchedulerResult;

pub struct SqliteTaskHostRepository {
    pool: SqlitePool,
}

impl SqliteTaskHostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskHostRepository for SqliteTaskHostRepository {
    /// 批量取回多个任务的主机关联，单条IN查询携带主机连接信息
    async fn get_by_task_ids(&self, task_ids: &[i64]) -> SchedulerResult<Vec<TaskHost>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; task_ids.len()].join(", ");
        let sql = format!(
            "SELECT th.task_id, th.host_id, h.name, h.alias, h.port
             FROM task_hosts th
             INNER JOIN hosts h ON th.host_id = h.id
             WHERE th.task_id IN ({placeholders})
             ORDER BY th.task_id, th.id"
        );

        let mut query = sqlx::query(&sql);
        for &task_id in task_ids {
            query = query.bind(task_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        debug!("批量查询 {} 个任务的主机关联，命中 {} 条", task_ids.len(), rows.len());

        rows.iter()
            .map(|row| {
                Ok(TaskHost {
                    task_id: row.try_get("task_id")?,
                    host_id: row.try_get("host_id")?,
                    name: row.try_get("name")?,
                    alias: row.try_get("alias")?,
                    port: row.try_get("port")?,
                })
            })
            .collect()
    }

    /// 删除加插入作为一个事务提交，中途失败不会留下半替换状态
    async fn replace(&self, task_id: i64, host_ids: &[i64]) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_hosts WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        for &host_id in host_ids {
            sqlx::query("INSERT INTO task_hosts (task_id, host_id) VALUES (?, ?)")
                .bind(task_id)
                .bind(host_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_by_task_id(&self, task_id: i64) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM task_hosts WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn task_ids_for_host(&self, host_id: i64) -> SchedulerResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT task_id FROM task_hosts WHERE host_id = ? ORDER BY task_id",
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| Ok(row.try_get("task_id")?)).collect()
    }
}
