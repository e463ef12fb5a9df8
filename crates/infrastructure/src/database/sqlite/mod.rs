//! SQLite存储实现，迁移内嵌在连接初始化中

mod sqlite_host_repository;
mod sqlite_setting_repository;
mod sqlite_task_host_repository;
mod sqlite_task_log_repository;
mod sqlite_task_repository;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use cronserver_core::SchedulerResult;

pub use sqlite_host_repository::SqliteHostRepository;
pub use sqlite_setting_repository::SqliteSettingRepository;
pub use sqlite_task_host_repository::SqliteTaskHostRepository;
pub use sqlite_task_log_repository::SqliteTaskLogRepository;
pub use sqlite_task_repository::SqliteTaskRepository;

/// 建立SQLite连接池并初始化表结构
pub async fn connect(database_url: &str, max_connections: u32) -> SchedulerResult<SqlitePool> {
    debug!("连接SQLite数据库: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("执行数据库迁移");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            level INTEGER NOT NULL DEFAULT 1,
            spec TEXT NOT NULL DEFAULT '',
            protocol INTEGER NOT NULL DEFAULT 2,
            command TEXT NOT NULL,
            http_method INTEGER NOT NULL DEFAULT 1,
            timeout INTEGER NOT NULL DEFAULT 0,
            multi INTEGER NOT NULL DEFAULT 1,
            retry_times INTEGER NOT NULL DEFAULT 0,
            retry_interval INTEGER NOT NULL DEFAULT 0,
            dependency_status INTEGER NOT NULL DEFAULT 1,
            dependency_task_ids TEXT NOT NULL DEFAULT '',
            notify_status INTEGER NOT NULL DEFAULT 0,
            notify_type INTEGER NOT NULL DEFAULT 0,
            notify_receiver_ids TEXT NOT NULL DEFAULT '',
            notify_keyword TEXT NOT NULL DEFAULT '',
            tag TEXT NOT NULL DEFAULT '',
            remark TEXT NOT NULL DEFAULT '',
            status INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hosts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            alias TEXT NOT NULL DEFAULT '',
            port INTEGER NOT NULL DEFAULT 5921,
            remark TEXT NOT NULL DEFAULT '',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_hosts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            host_id INTEGER NOT NULL,
            UNIQUE(task_id, host_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            spec TEXT NOT NULL DEFAULT '',
            protocol INTEGER NOT NULL,
            command TEXT NOT NULL,
            timeout INTEGER NOT NULL DEFAULT 0,
            hostname TEXT NOT NULL DEFAULT '',
            retry_index INTEGER NOT NULL DEFAULT 0,
            status INTEGER NOT NULL DEFAULT 1,
            result TEXT NOT NULL DEFAULT '',
            start_time DATETIME NOT NULL,
            end_time DATETIME
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL DEFAULT '',
            UNIQUE(code, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_tag ON tasks(tag)",
        "CREATE INDEX IF NOT EXISTS idx_task_hosts_task_id ON task_hosts(task_id)",
        "CREATE INDEX IF NOT EXISTS idx_task_hosts_host_id ON task_hosts(host_id)",
        "CREATE INDEX IF NOT EXISTS idx_task_logs_task_id ON task_logs(task_id)",
        "CREATE INDEX IF NOT EXISTS idx_task_logs_start_time ON task_logs(start_time)",
    ];
    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("数据库迁移完成");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    connect("sqlite::memory:", 1)
        .await
        .expect("内存数据库初始化失败")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronserver_core::traits::SettingRepository;

    #[tokio::test]
    async fn test_connect_creates_file_and_data_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cronserver.db");
        let url = format!("sqlite://{}", db_path.display());

        {
            let pool = connect(&url, 1).await.unwrap();
            let repo = SqliteSettingRepository::new(pool.clone());
            repo.set("system", "log_retention_days", "7").await.unwrap();
            pool.close().await;
        }
        assert!(db_path.exists());

        let pool = connect(&url, 1).await.unwrap();
        let repo = SqliteSettingRepository::new(pool);
        assert_eq!(
            repo.get("system", "log_retention_days").await.unwrap().as_deref(),
            Some("7")
        );
    }
}
