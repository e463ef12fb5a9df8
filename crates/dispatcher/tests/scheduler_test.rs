use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use cronserver_core::models::TaskLevel;
use cronserver_core::traits::{TaskHostRepository, TaskRepository};
use cronserver_dispatcher::execution::MANUAL_RUN_LABEL;
use cronserver_dispatcher::scheduler::SchedulerCore;
use cronserver_dispatcher::testing::{DispatcherHarness, TaskBuilder};

fn scheduler_for(env: &DispatcherHarness) -> SchedulerCore {
    SchedulerCore::new(env.task_repo.clone(), env.dispatcher.clone())
}

#[test]
fn test_next_run_time_is_in_the_future_for_valid_spec() {
    let task = TaskBuilder::new().with_spec("0 */5 * * * *").build();
    let now = Utc::now();

    let next = SchedulerCore::next_run_time(&task, now).unwrap();
    assert!(next > now);
}

#[test]
fn test_next_run_time_is_none_for_minor_task() {
    let task = TaskBuilder::new()
        .with_level(TaskLevel::Minor)
        .with_spec("0 */5 * * * *")
        .build();
    assert!(SchedulerCore::next_run_time(&task, Utc::now()).is_none());
}

#[test]
fn test_next_run_time_is_none_for_empty_or_invalid_spec() {
    let empty = TaskBuilder::new().build();
    assert!(SchedulerCore::next_run_time(&empty, Utc::now()).is_none());

    let invalid = TaskBuilder::new().with_spec("not a cron").build();
    assert!(SchedulerCore::next_run_time(&invalid, Utc::now()).is_none());
}

#[tokio::test]
async fn test_add_rejects_invalid_spec_and_leaves_no_timer() {
    let env = DispatcherHarness::new();
    let scheduler = scheduler_for(&env);
    let task = TaskBuilder::new().with_id(1).with_spec("* * *").build();

    assert!(scheduler.add(&task).is_err());
    assert!(!scheduler.is_armed(1));
    assert_eq!(scheduler.armed_count(), 0);
}

#[tokio::test]
async fn test_initialize_skips_broken_task_and_arms_the_rest() {
    let env = DispatcherHarness::new();
    let good = TaskBuilder::new()
        .with_id(1)
        .with_name("good")
        .with_spec("0 0 3 * * *")
        .enabled()
        .build();
    let broken = TaskBuilder::new()
        .with_id(2)
        .with_name("broken")
        .with_spec("not a cron")
        .enabled()
        .build();
    env.task_repo.create(&good).await.unwrap();
    env.task_repo.create(&broken).await.unwrap();

    let scheduler = scheduler_for(&env);
    let armed = scheduler.initialize().await.unwrap();

    assert_eq!(armed, 1);
    assert!(scheduler.is_armed(1));
    assert!(!scheduler.is_armed(2));
}

#[tokio::test]
async fn test_re_adding_replaces_existing_timer() {
    let env = DispatcherHarness::new();
    let scheduler = scheduler_for(&env);
    let task = TaskBuilder::new()
        .with_id(1)
        .with_spec("0 */5 * * * *")
        .enabled()
        .build();

    scheduler.add(&task).unwrap();
    scheduler.remove_and_add(&task).unwrap();

    // 新旧定时器不并存
    assert_eq!(scheduler.armed_count(), 1);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let env = DispatcherHarness::new();
    let scheduler = scheduler_for(&env);
    let task = TaskBuilder::new()
        .with_id(1)
        .with_spec("0 */5 * * * *")
        .enabled()
        .build();

    scheduler.add(&task).unwrap();
    scheduler.remove(1);
    scheduler.remove(1);

    assert!(!scheduler.is_armed(1));
}

#[tokio::test]
async fn test_manual_run_bypasses_timer_and_labels_log() {
    let env = DispatcherHarness::new();
    env.host_repo.seed_host(1, "web01", 5921);
    let task = TaskBuilder::new()
        .with_id(1)
        .with_name("manual_task")
        .with_spec("0 0 3 * * *")
        .enabled()
        .build();
    env.task_repo.create(&task).await.unwrap();
    env.host_repo.replace(1, &[1]).await.unwrap();

    let scheduler = scheduler_for(&env);
    scheduler.run(task);

    // 手动运行在后台任务中执行，等它落日志
    for _ in 0..50 {
        if !env.log_repo.all().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let logs = env.log_repo.all();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].spec, MANUAL_RUN_LABEL);
    assert!(!scheduler.is_armed(1));
}

#[tokio::test]
async fn test_shutdown_tears_down_all_timers() {
    let env = DispatcherHarness::new();
    let scheduler = scheduler_for(&env);
    for id in 1..=3 {
        let task = TaskBuilder::new()
            .with_id(id)
            .with_name(&format!("task_{id}"))
            .with_spec("0 */5 * * * *")
            .enabled()
            .build();
        scheduler.add(&task).unwrap();
    }
    assert_eq!(scheduler.armed_count(), 3);

    scheduler.shutdown();
    assert_eq!(scheduler.armed_count(), 0);
}
