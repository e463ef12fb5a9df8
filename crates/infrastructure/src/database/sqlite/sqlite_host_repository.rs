use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::info;

use cronserver_core::models::Host;
use cronserver_core::traits::HostRepository;
use cronserver_core::SchedulerResult;

pub struct SqliteHostRepository {
    pool: SqlitePool,
}

impl SqliteHostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_host(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Host> {
        Ok(Host {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            alias: row.try_get("alias")?,
            port: row.try_get("port")?,
            remark: row.try_get("remark")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl HostRepository for SqliteHostRepository {
    async fn create(&self, host: &Host) -> SchedulerResult<i64> {
        let row = sqlx::query(
            "INSERT INTO hosts (name, alias, port, remark, created_at)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&host.name)
        .bind(&host.alias)
        .bind(host.port)
        .bind(&host.remark)
        .bind(host.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Host>> {
        let row = sqlx::query("SELECT * FROM hosts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_host).transpose()
    }

    async fn list(&self) -> SchedulerResult<Vec<Host>> {
        let rows = sqlx::query("SELECT * FROM hosts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_host).collect()
    }

    /// 删除主机并级联清理任务-主机关联
    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_hosts WHERE host_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM hosts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("主机 {} 已删除，关联记录一并清理", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::{memory_pool, SqliteTaskHostRepository};
    use cronserver_core::traits::TaskHostRepository;

    #[tokio::test]
    async fn test_host_crud() {
        let pool = memory_pool().await;
        let repo = SqliteHostRepository::new(pool);

        let id = repo
            .create(&Host::new("web01".to_string(), "生产1号".to_string(), 5921))
            .await
            .unwrap();

        let loaded = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "web01");
        assert_eq!(loaded.alias, "生产1号");
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_task_links() {
        let pool = memory_pool().await;
        let repo = SqliteHostRepository::new(pool.clone());
        let link_repo = SqliteTaskHostRepository::new(pool);

        let id = repo
            .create(&Host::new("web01".to_string(), String::new(), 5921))
            .await
            .unwrap();
        link_repo.replace(10, &[id]).await.unwrap();

        repo.delete(id).await.unwrap();

        assert!(repo.get_by_id(id).await.unwrap().is_none());
        assert!(link_repo.task_ids_for_host(id).await.unwrap().is_empty());
    }
}
