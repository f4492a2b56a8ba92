use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use vecsync_core::models::{FailureNotice, RetryState};
use vecsync_core::traits::MessageQueue;
use vecsync_dispatcher::{RetryPolicy, RetryQueue};
use vecsync_infrastructure::InMemoryMessageQueue;

fn notice() -> FailureNotice {
    FailureNotice::new(
        "sync.data",
        "order-42",
        json!({"id": 42, "name": "row-42"}),
        "目标端写入失败".to_string(),
    )
}

fn retry_queue(queue: &InMemoryMessageQueue) -> Arc<RetryQueue> {
    Arc::new(RetryQueue::new(
        Arc::new(queue.clone()),
        "sync.alerts",
        RetryPolicy::default(),
    ))
}

#[tokio::test(start_paused = true)]
async fn fails_three_times_then_resolves_with_expected_delays() {
    let queue = InMemoryMessageQueue::new();
    let retry = retry_queue(&queue);
    queue.fail_next(3);

    let started = tokio::time::Instant::now();
    let state = retry.process(notice()).await.unwrap();

    // 失败3次后第4次成功，退避依次为1s/2s/4s
    assert_eq!(state, RetryState::Resolved { attempts: 4 });
    assert_eq!(started.elapsed(), Duration::from_secs(7));

    // 消息最终落回原destination，条目已清除
    assert_eq!(queue.queue_size("sync.data").await.unwrap(), 1);
    assert_eq!(queue.queue_size("sync.alerts").await.unwrap(), 0);
    assert_eq!(retry.entry_count().await, 0);

    let delivered = queue.fetch("sync.data").await.unwrap();
    assert_eq!(delivered[0].key, "order-42");
    assert_eq!(delivered[0].payload["id"], json!(42));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_escalates_to_alert_and_clears_entry() {
    let queue = InMemoryMessageQueue::new();
    let retry = retry_queue(&queue);
    // 10次重投全部失败，随后的告警发布成功
    queue.fail_next(10);

    let started = tokio::time::Instant::now();
    let state = retry.process(notice()).await.unwrap();

    assert_eq!(state, RetryState::Exhausted { attempts: 10 });
    // 9次退避：1+2+4+...+256 = 511秒
    assert_eq!(started.elapsed(), Duration::from_secs(511));

    // 原destination没有消息，告警队列有一条带完整上下文的升级消息
    assert_eq!(queue.queue_size("sync.data").await.unwrap(), 0);
    let alerts = queue.fetch("sync.alerts").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].payload["destination"], json!("sync.data"));
    assert_eq!(alerts[0].payload["key"], json!("order-42"));
    assert_eq!(alerts[0].payload["attempts"], json!(10));
    assert_eq!(alerts[0].payload["error_message"], json!("目标端写入失败"));

    // 耗尽是终态：条目清除，不再自动重投
    assert_eq!(retry.entry_count().await, 0);
    assert_eq!(retry.state("sync.data", "order-42").await, RetryState::Pending);
}

#[tokio::test(start_paused = true)]
async fn concurrent_notice_for_same_key_does_not_start_second_loop() {
    let queue = InMemoryMessageQueue::new();
    let retry = retry_queue(&queue);
    queue.fail_next(10);

    let handle = retry.spawn_process(notice());
    // 让后台循环登记条目
    tokio::task::yield_now().await;

    let state = retry.process(notice()).await.unwrap();
    assert!(matches!(state, RetryState::Retrying { attempt } if attempt >= 1));

    let final_state = handle.await.unwrap().unwrap();
    assert_eq!(final_state, RetryState::Exhausted { attempts: 10 });
    // 只有一条告警：第二次通知没有开启新的退避循环
    assert_eq!(queue.queue_size("sync.alerts").await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn delay_is_capped_at_ten_minutes() {
    let queue = InMemoryMessageQueue::new();
    let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(600), 12);
    let retry = Arc::new(RetryQueue::new(
        Arc::new(queue.clone()),
        "sync.alerts",
        policy,
    ));
    queue.fail_next(12);

    let started = tokio::time::Instant::now();
    let state = retry.process(notice()).await.unwrap();

    assert_eq!(state, RetryState::Exhausted { attempts: 12 });
    // 前10次退避1..512秒，第11次被封顶在600秒
    assert_eq!(
        started.elapsed(),
        Duration::from_secs(1023 + 600)
    );
}
