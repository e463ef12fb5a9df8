use std::sync::Arc;

use cronserver_core::models::{TaskFilter, TaskLevel, TaskProtocol};
use cronserver_core::traits::{TaskHostRepository, TaskRepository};
use cronserver_dispatcher::host_index::TaskHostIndex;
use cronserver_dispatcher::query::TaskQueryService;
use cronserver_dispatcher::testing::{
    MemoryTaskHostRepository, MemoryTaskRepository, TaskBuilder,
};

struct QueryHarness {
    task_repo: Arc<MemoryTaskRepository>,
    host_repo: Arc<MemoryTaskHostRepository>,
    service: TaskQueryService,
}

impl QueryHarness {
    fn new() -> Self {
        let task_repo = Arc::new(MemoryTaskRepository::new());
        let host_repo = Arc::new(MemoryTaskHostRepository::new());
        let service = TaskQueryService::new(
            task_repo.clone(),
            TaskHostIndex::new(host_repo.clone()),
        );
        Self {
            task_repo,
            host_repo,
            service,
        }
    }
}

#[tokio::test]
async fn test_page_decoration_issues_single_host_query() {
    let h = QueryHarness::new();
    h.host_repo.seed_host(1, "web01", 5921);
    h.host_repo.seed_host(2, "web02", 5921);

    for id in 1..=3 {
        let task = TaskBuilder::new()
            .with_id(id)
            .with_name(&format!("task_{id}"))
            .with_spec("0 */5 * * * *")
            .enabled()
            .build();
        h.task_repo.create(&task).await.unwrap();
    }
    h.host_repo.replace(1, &[1, 2]).await.unwrap();
    h.host_repo.replace(2, &[2]).await.unwrap();

    let page = h
        .service
        .list(&TaskFilter::default(), None)
        .await
        .unwrap();

    // 整页主机归属一次批量查询装配
    assert_eq!(h.host_repo.queries_issued(), 1);
    assert_eq!(page.total, 3);
    assert_eq!(page.tasks.len(), 3);
    assert_eq!(page.tasks[0].hosts.len(), 2);
    assert_eq!(page.tasks[1].hosts.len(), 1);
    assert!(page.tasks[2].hosts.is_empty());
}

#[tokio::test]
async fn test_next_run_time_only_for_major_tasks_with_spec() {
    let h = QueryHarness::new();
    let major = TaskBuilder::new()
        .with_id(1)
        .with_name("major")
        .with_spec("0 */5 * * * *")
        .enabled()
        .build();
    let minor = TaskBuilder::new()
        .with_id(2)
        .with_name("minor")
        .with_level(TaskLevel::Minor)
        .build();
    h.task_repo.create(&major).await.unwrap();
    h.task_repo.create(&minor).await.unwrap();

    let page = h
        .service
        .list(&TaskFilter::default(), None)
        .await
        .unwrap();

    assert!(page.tasks[0].next_run_time.is_some());
    assert!(page.tasks[1].next_run_time.is_none());
}

#[tokio::test]
async fn test_host_filter_narrows_result() {
    let h = QueryHarness::new();
    h.host_repo.seed_host(1, "web01", 5921);
    h.host_repo.seed_host(2, "web02", 5921);

    for id in 1..=3 {
        let task = TaskBuilder::new()
            .with_id(id)
            .with_name(&format!("task_{id}"))
            .build();
        h.task_repo.create(&task).await.unwrap();
    }
    h.host_repo.replace(1, &[1]).await.unwrap();
    h.host_repo.replace(2, &[2]).await.unwrap();
    h.host_repo.replace(3, &[1]).await.unwrap();

    let page = h
        .service
        .list(&TaskFilter::default(), Some(1))
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    let ids: Vec<i64> = page.tasks.iter().map(|v| v.task.id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn test_host_filter_with_unassigned_host_returns_empty_page() {
    let h = QueryHarness::new();
    let task = TaskBuilder::new().with_id(1).build();
    h.task_repo.create(&task).await.unwrap();

    let page = h
        .service
        .list(&TaskFilter::default(), Some(404))
        .await
        .unwrap();

    assert_eq!(page.total, 0);
    assert!(page.tasks.is_empty());
}

#[tokio::test]
async fn test_protocol_filter_combines_with_pagination() {
    let h = QueryHarness::new();
    for id in 1..=5 {
        let task = TaskBuilder::new()
            .with_id(id)
            .with_name(&format!("task_{id}"))
            .with_protocol(TaskProtocol::Rpc)
            .build();
        h.task_repo.create(&task).await.unwrap();
    }

    let filter = TaskFilter {
        protocol: Some(TaskProtocol::Rpc),
        page: 2,
        page_size: 2,
        ..TaskFilter::default()
    };
    let page = h.service.list(&filter, None).await.unwrap();

    assert_eq!(page.total, 5);
    let ids: Vec<i64> = page.tasks.iter().map(|v| v.task.id).collect();
    assert_eq!(ids, vec![3, 4]);
}
