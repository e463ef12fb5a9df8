use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use cronserver_core::traits::SettingRepository;
use cronserver_core::SchedulerResult;

pub struct SqliteSettingRepository {
    pool: SqlitePool,
}

impl SqliteSettingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingRepository for SqliteSettingRepository {
    async fn get(&self, code: &str, key: &str) -> SchedulerResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE code = ? AND key = ?")
            .bind(code)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, code: &str, key: &str, value: &str) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO settings (code, key, value) VALUES (?, ?, ?)
             ON CONFLICT(code, key) DO UPDATE SET value = excluded.value",
        )
        .bind(code)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_if_missing(
        &self,
        code: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO settings (code, key, value) VALUES (?, ?, ?)",
        )
        .bind(code)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::repair_settings;
    use crate::database::sqlite::memory_pool;
    use cronserver_core::models::setting::{
        required_settings, SLACK_CODE, SYSTEM_CODE, LOG_RETENTION_DAYS_KEY, URL_KEY,
    };

    #[tokio::test]
    async fn test_set_overwrites_existing_value() {
        let pool = memory_pool().await;
        let repo = SqliteSettingRepository::new(pool);

        repo.set(SLACK_CODE, URL_KEY, "https://a.example").await.unwrap();
        repo.set(SLACK_CODE, URL_KEY, "https://b.example").await.unwrap();

        assert_eq!(
            repo.get(SLACK_CODE, URL_KEY).await.unwrap().as_deref(),
            Some("https://b.example")
        );
    }

    #[tokio::test]
    async fn test_create_if_missing_keeps_existing_value() {
        let pool = memory_pool().await;
        let repo = SqliteSettingRepository::new(pool);

        assert!(repo
            .create_if_missing(SYSTEM_CODE, LOG_RETENTION_DAYS_KEY, "0")
            .await
            .unwrap());
        repo.set(SYSTEM_CODE, LOG_RETENTION_DAYS_KEY, "30").await.unwrap();

        // 已存在时不覆盖用户改过的值
        assert!(!repo
            .create_if_missing(SYSTEM_CODE, LOG_RETENTION_DAYS_KEY, "0")
            .await
            .unwrap());
        assert_eq!(
            repo.get(SYSTEM_CODE, LOG_RETENTION_DAYS_KEY)
                .await
                .unwrap()
                .as_deref(),
            Some("30")
        );
    }

    #[tokio::test]
    async fn test_repair_settings_is_idempotent() {
        let pool = memory_pool().await;
        let repo = SqliteSettingRepository::new(pool);

        let first = repair_settings(&repo).await.unwrap();
        assert_eq!(first, required_settings().len());

        // 第二轮不再新建任何配置
        let second = repair_settings(&repo).await.unwrap();
        assert_eq!(second, 0);
    }
}
