use std::sync::Arc;

use cronserver_core::models::DependencyStatus;
use cronserver_core::traits::TaskRepository;
use cronserver_dispatcher::dependency::DependencyResolver;
use cronserver_dispatcher::testing::{MemoryTaskRepository, TaskBuilder};

#[test]
fn test_strong_dependency_requires_parent_success() {
    let parent = TaskBuilder::new()
        .with_id(1)
        .with_dependencies(DependencyStatus::Strong, vec![2, 3])
        .build();

    assert_eq!(
        DependencyResolver::eligible_child_ids(&parent, true),
        vec![2, 3]
    );
    assert!(DependencyResolver::eligible_child_ids(&parent, false).is_empty());
}

#[test]
fn test_weak_dependency_ignores_parent_outcome() {
    let parent = TaskBuilder::new()
        .with_id(1)
        .with_dependencies(DependencyStatus::Weak, vec![2, 3])
        .build();

    assert_eq!(
        DependencyResolver::eligible_child_ids(&parent, true),
        vec![2, 3]
    );
    assert_eq!(
        DependencyResolver::eligible_child_ids(&parent, false),
        vec![2, 3]
    );
}

#[test]
fn test_no_dependencies_yields_no_children() {
    let parent = TaskBuilder::new().with_id(1).build();
    assert!(DependencyResolver::eligible_child_ids(&parent, true).is_empty());
}

#[tokio::test]
async fn test_resolve_returns_children_in_listed_order() {
    let repo = Arc::new(MemoryTaskRepository::new());
    for id in [5, 3, 9] {
        let child = TaskBuilder::new()
            .with_id(id)
            .with_name(&format!("child_{id}"))
            .build();
        repo.create(&child).await.unwrap();
    }
    let resolver = DependencyResolver::new(repo);

    let parent = TaskBuilder::new()
        .with_id(1)
        .with_dependencies(DependencyStatus::Weak, vec![9, 5, 3])
        .build();

    let children = resolver.resolve(&parent, false).await.unwrap();
    let ids: Vec<i64> = children.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![9, 5, 3]);
}

#[tokio::test]
async fn test_resolve_skips_missing_children() {
    let repo = Arc::new(MemoryTaskRepository::new());
    let child = TaskBuilder::new().with_id(2).with_name("survivor").build();
    repo.create(&child).await.unwrap();
    let resolver = DependencyResolver::new(repo);

    let parent = TaskBuilder::new()
        .with_id(1)
        .with_dependencies(DependencyStatus::Weak, vec![404, 2])
        .build();

    // 已删除的子任务跳过，不中断其余子任务
    let children = resolver.resolve(&parent, true).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, 2);
}
