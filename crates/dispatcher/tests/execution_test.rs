use cronserver_core::models::{
    DependencyStatus, Multiplicity, NotifyChannel, NotifyStatus, TaskLogStatus, TaskProtocol,
    TaskStatus,
};
use cronserver_core::traits::{ExecutionOutput, TaskHostRepository, TaskRepository};
use cronserver_dispatcher::execution::Trigger;
use cronserver_dispatcher::testing::{DispatcherHarness, TaskBuilder};

#[tokio::test]
async fn test_rpc_task_without_hosts_fails_terminally() {
    let env = DispatcherHarness::new();
    let task = TaskBuilder::new()
        .with_id(1)
        .with_name("no_host_task")
        .with_retry(5, 0)
        .build();
    env.task_repo.create(&task).await.unwrap();

    env.dispatcher.clone().dispatch(task, Trigger::Manual).await;

    // 缺失主机分配不重试，只留下一条失败日志
    assert!(env.command_transport.calls().is_empty());
    let logs = env.log_repo.all();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, TaskLogStatus::Failure);
    assert!(logs[0].result.contains("没有可执行的主机"));
}

#[tokio::test]
async fn test_concurrent_multiplicity_aggregates_failure() {
    let env = DispatcherHarness::new();
    env.host_repo.seed_host(1, "hostA", 5921);
    env.host_repo.seed_host(2, "hostB", 5921);
    env.command_transport
        .set_result("hostA", ExecutionOutput::success("done"));
    env.command_transport
        .set_result("hostB", ExecutionOutput::failure("exit 1"));

    let task = TaskBuilder::new()
        .with_id(1)
        .with_name("fanout_task")
        .with_multi(Multiplicity::Concurrent)
        .with_notify(
            NotifyStatus::OnFailure,
            NotifyChannel::Slack,
            vec!["ops".to_string()],
        )
        .build();
    env.task_repo.create(&task).await.unwrap();
    env.host_repo.replace(1, &[1, 2]).await.unwrap();

    env.dispatcher.clone().dispatch(task, Trigger::Manual).await;

    // 两台主机都有各自的执行记录
    let logs = env.log_repo.all();
    assert_eq!(logs.len(), 2);
    let hostnames: Vec<&str> = logs.iter().map(|l| l.hostname.as_str()).collect();
    assert!(hostnames.contains(&"hostA"));
    assert!(hostnames.contains(&"hostB"));

    // 任一主机失败则本次执行按失败通知
    let sent = env.sender.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("失败"));
}

#[tokio::test]
async fn test_serial_multiplicity_does_not_short_circuit() {
    let env = DispatcherHarness::new();
    env.host_repo.seed_host(1, "hostA", 5921);
    env.host_repo.seed_host(2, "hostB", 5921);
    env.command_transport
        .set_result("hostA", ExecutionOutput::failure("exit 1"));
    env.command_transport
        .set_result("hostB", ExecutionOutput::success("done"));

    let task = TaskBuilder::new()
        .with_id(1)
        .with_name("serial_task")
        .with_multi(Multiplicity::Serial)
        .build();
    env.task_repo.create(&task).await.unwrap();
    env.host_repo.replace(1, &[1, 2]).await.unwrap();

    env.dispatcher.clone().dispatch(task, Trigger::Manual).await;

    // hostA失败后hostB仍然执行，且顺序与分配顺序一致
    let calls = env.command_transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "hostA");
    assert_eq!(calls[1].0, "hostB");
}

#[tokio::test]
async fn test_http_task_uses_http_transport_without_fanout() {
    let env = DispatcherHarness::new();
    let task = TaskBuilder::new()
        .with_id(1)
        .with_name("http_task")
        .with_protocol(TaskProtocol::Http)
        .with_command("https://example.com/ping")
        .build();
    env.task_repo.create(&task).await.unwrap();

    env.dispatcher.clone().dispatch(task, Trigger::Manual).await;

    assert_eq!(env.http_transport.calls(), vec!["https://example.com/ping"]);
    assert!(env.command_transport.calls().is_empty());
    let logs = env.log_repo.all();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, TaskLogStatus::Finish);
    assert!(logs[0].hostname.is_empty());
}

#[tokio::test]
async fn test_strong_dependency_skips_children_on_parent_failure() {
    let env = DispatcherHarness::new();
    env.host_repo.seed_host(1, "parent-host", 5921);
    env.command_transport
        .set_result("parent-host", ExecutionOutput::failure("exit 1"));

    let child = TaskBuilder::new()
        .with_id(2)
        .with_name("child_task")
        .with_level(cronserver_core::models::TaskLevel::Minor)
        .with_protocol(TaskProtocol::Http)
        .with_command("https://example.com/child")
        .build();
    env.task_repo.create(&child).await.unwrap();

    let parent = TaskBuilder::new()
        .with_id(1)
        .with_name("parent_task")
        .with_dependencies(DependencyStatus::Strong, vec![2])
        .build();
    env.task_repo.create(&parent).await.unwrap();
    env.host_repo.replace(1, &[1]).await.unwrap();

    env.dispatcher.clone().dispatch(parent, Trigger::Schedule).await;

    // 强依赖: 父任务失败时子任务不执行
    assert!(env.http_transport.calls().is_empty());
}

#[tokio::test]
async fn test_weak_dependency_triggers_children_despite_parent_failure() {
    let env = DispatcherHarness::new();
    env.host_repo.seed_host(1, "parent-host", 5921);
    env.command_transport
        .set_result("parent-host", ExecutionOutput::failure("exit 1"));

    for (id, url) in [(2, "https://example.com/a"), (3, "https://example.com/b")] {
        let child = TaskBuilder::new()
            .with_id(id)
            .with_name(&format!("child_{id}"))
            .with_level(cronserver_core::models::TaskLevel::Minor)
            .with_protocol(TaskProtocol::Http)
            .with_command(url)
            // 依赖触发绕过子任务的禁用状态
            .with_status(TaskStatus::Disabled)
            .build();
        env.task_repo.create(&child).await.unwrap();
    }

    let parent = TaskBuilder::new()
        .with_id(1)
        .with_name("parent_task")
        .with_dependencies(DependencyStatus::Weak, vec![2, 3])
        .build();
    env.task_repo.create(&parent).await.unwrap();
    env.host_repo.replace(1, &[1]).await.unwrap();

    env.dispatcher.clone().dispatch(parent, Trigger::Schedule).await;

    // 弱依赖: 两个子任务各触发一次，顺序与列出顺序一致
    let calls = env.http_transport.calls();
    assert_eq!(
        calls,
        vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string()
        ]
    );
}

#[tokio::test]
async fn test_notification_failure_does_not_change_outcome() {
    use cronserver_dispatcher::testing::FailingSender;
    use cronserver_dispatcher::{ExecutionDispatcher, NotificationDispatcher, TaskHostIndex};
    use std::sync::Arc;

    let env = DispatcherHarness::new();
    let notifier = NotificationDispatcher::new(env.setting_repo.clone())
        .with_sender(NotifyChannel::Slack, Arc::new(FailingSender));
    let dispatcher = Arc::new(ExecutionDispatcher::new(
        env.task_repo.clone(),
        env.log_repo.clone(),
        TaskHostIndex::new(env.host_repo.clone()),
        env.command_transport.clone(),
        env.http_transport.clone(),
        notifier,
        16,
    ));

    let task = TaskBuilder::new()
        .with_id(1)
        .with_name("noisy_task")
        .with_protocol(TaskProtocol::Http)
        .with_command("https://example.com/ping")
        .with_notify(
            NotifyStatus::Always,
            NotifyChannel::Slack,
            vec!["ops".to_string()],
        )
        .build();
    env.task_repo.create(&task).await.unwrap();

    dispatcher.clone().dispatch(task, Trigger::Manual).await;

    // 渠道故障不影响任务本身的成功结论
    let logs = env.log_repo.all();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, TaskLogStatus::Finish);
}

#[tokio::test]
async fn test_retry_writes_one_log_record_per_attempt() {
    let env = DispatcherHarness::new();
    env.host_repo.seed_host(1, "flaky-host", 5921);
    env.command_transport
        .set_result("flaky-host", ExecutionOutput::failure("exit 1"));

    let task = TaskBuilder::new()
        .with_id(1)
        .with_name("flaky_task")
        .with_retry(2, 0)
        .build();
    env.task_repo.create(&task).await.unwrap();
    env.host_repo.replace(1, &[1]).await.unwrap();

    env.dispatcher.clone().dispatch(task, Trigger::Manual).await;

    // 首次 + 2次重试 = 3条记录，retry_index区分同一目标的各次尝试
    let logs = env.log_repo.all();
    assert_eq!(logs.len(), 3);
    let mut indexes: Vec<i64> = logs.iter().map(|l| l.retry_index).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, vec![0, 1, 2]);
}
