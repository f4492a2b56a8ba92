use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use vecsync_core::models::{SourceConfig, SourceRow, SyncTask, TaskStatus, TaskType, VectorRecord};
use vecsync_core::traits::{CursorStore, TaskRepository, VectorStore, Vectorizer};
use vecsync_dispatcher::{SyncRunner, TaskOrchestrator};
use vecsync_infrastructure::{
    HashingVectorizer, InMemoryCursorStore, InMemorySourceStrategy, InMemoryTaskRepository,
    InMemoryVectorStore,
};
use vecsync_source::StrategyRegistry;
use vecsync_target::{ConsistencyChecker, SyncWriter};

const DIMENSION: usize = 16;

struct Harness {
    orchestrator: TaskOrchestrator,
    repo: Arc<InMemoryTaskRepository>,
    store: Arc<InMemoryVectorStore>,
    source: InMemorySourceStrategy,
    cursors: Arc<InMemoryCursorStore>,
}

fn harness(store: InMemoryVectorStore) -> Harness {
    harness_with(store, InMemorySourceStrategy::new(), |runner| runner)
}

fn harness_with(
    store: InMemoryVectorStore,
    source: InMemorySourceStrategy,
    tune: impl FnOnce(SyncRunner) -> SyncRunner,
) -> Harness {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let store = Arc::new(store);
    let cursors = Arc::new(InMemoryCursorStore::new());

    let mut registry = StrategyRegistry::new();
    registry.register(Arc::new(source.clone()));
    let registry = Arc::new(registry);

    let writer = Arc::new(SyncWriter::new(store.clone()));
    let runner = Arc::new(tune(SyncRunner::new(
        Arc::clone(&registry),
        writer,
        Arc::new(HashingVectorizer::new(DIMENSION)),
        repo.clone(),
        cursors.clone(),
    )));
    let checker = Arc::new(ConsistencyChecker::new(store.clone()));
    let orchestrator =
        TaskOrchestrator::new(repo.clone(), runner, registry, checker, 4);

    Harness {
        orchestrator,
        repo,
        store,
        source,
        cursors,
    }
}

fn sync_task(task_type: TaskType, concurrency: i64) -> SyncTask {
    let source = SourceConfig {
        dialect: "MEMORY".to_string(),
        ..SourceConfig::default()
    };
    let mut task = SyncTask::new("orders".to_string(), task_type, source);
    task.table_name = "orders".to_string();
    task.collection = "order_vectors".to_string();
    task.dimension = DIMENSION;
    task.concurrency = concurrency;
    task.batch_size = 100;
    task
}

/// 与种子数据同构的一行，用来独立构造抽样期望值
fn seeded_row(pk: i64) -> SourceRow {
    let mut row = SourceRow::new();
    row.insert("id".to_string(), Value::from(pk));
    row.insert("name".to_string(), Value::from(format!("row-{pk}")));
    row
}

async fn expected_record(pk: i64) -> VectorRecord {
    let row = seeded_row(pk);
    let vector = HashingVectorizer::new(DIMENSION)
        .vectorize(&row)
        .await
        .unwrap();
    VectorRecord::new(pk, vector).with_fields(row)
}

async fn run_to_completion(h: &Harness, task_id: i64) -> SyncTask {
    h.orchestrator.trigger(task_id).await.unwrap();
    h.orchestrator.wait_for_completion(task_id).await.unwrap();
    h.repo.get_by_id(task_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn full_sync_thousand_rows_across_four_shards() {
    let h = harness(InMemoryVectorStore::new());
    h.source.seed("id", 1000).await;
    let created = h.repo.create(&sync_task(TaskType::Full, 4)).await.unwrap();

    let done = run_to_completion(&h, created.id).await;
    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.synced_count, 1000);
    assert_eq!(done.total_count, 1000);
    assert_eq!(h.store.count("order_vectors").await.unwrap(), 1000);

    // 分片边界上的记录都在
    for pk in [1, 250, 251, 500, 501, 750, 751, 1000] {
        assert!(h
            .store
            .query_by_pk("order_vectors", pk)
            .await
            .unwrap()
            .is_some());
    }

    // 独立构造的抽样与目标完全一致
    let mut sample = Vec::new();
    for pk in [1, 137, 500, 999] {
        sample.push(expected_record(pk).await);
    }
    let report = h.orchestrator.verify_task(created.id, &sample).await.unwrap();
    assert!(report.consistent);
    assert_eq!(report.source_count, 1000);
    assert_eq!(report.target_count, 1000);
    assert_eq!(report.sample_checked, 4);
    assert_eq!(report.sample_passed, 4);
    assert!(report.discrepancies.is_empty());
}

#[tokio::test]
async fn repeated_full_sync_is_idempotent() {
    let h = harness(InMemoryVectorStore::new());
    h.source.seed("id", 300).await;
    let created = h.repo.create(&sync_task(TaskType::Full, 4)).await.unwrap();

    run_to_completion(&h, created.id).await;
    assert_eq!(h.store.count("order_vectors").await.unwrap(), 300);

    // 第二次全量重跑：主键幂等覆盖，计数不变，内容不变
    let done = run_to_completion(&h, created.id).await;
    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.exec_count, 2);
    assert_eq!(h.store.count("order_vectors").await.unwrap(), 300);

    let report = h
        .orchestrator
        .verify_task(created.id, &[expected_record(42).await])
        .await
        .unwrap();
    assert!(report.consistent);
}

#[tokio::test]
async fn delete_then_insert_target_is_also_idempotent() {
    let h = harness(InMemoryVectorStore::without_native_upsert());
    h.source.seed("id", 100).await;
    // 整批写入失败一次，触发逐条幂等降级（先删后插路径）
    h.store.fail_next_writes(1);
    let created = h.repo.create(&sync_task(TaskType::Full, 2)).await.unwrap();

    let done = run_to_completion(&h, created.id).await;
    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(h.store.count("order_vectors").await.unwrap(), 100);
}

#[tokio::test]
async fn incremental_sync_resumes_from_breakpoint() {
    let h = harness(InMemoryVectorStore::new());
    h.source.seed("id", 500).await;
    let created = h
        .repo
        .create(&sync_task(TaskType::Incremental, 4))
        .await
        .unwrap();

    let first = run_to_completion(&h, created.id).await;
    assert_eq!(first.status, TaskStatus::Success);
    assert_eq!(first.synced_count, 500);
    assert_eq!(
        h.cursors.get(&created.breakpoint_key()).await.unwrap(),
        Some("500".to_string())
    );

    // 源端新增300行，第二轮只同步断点之后的数据
    h.source.seed("id", 800).await;
    let second = run_to_completion(&h, created.id).await;
    assert_eq!(second.status, TaskStatus::Success);
    assert_eq!(second.synced_count, 300);
    assert_eq!(second.total_count, 300);
    assert_eq!(h.store.count("order_vectors").await.unwrap(), 800);
    assert_eq!(
        h.cursors.get(&created.breakpoint_key()).await.unwrap(),
        Some("800".to_string())
    );

    // 无新增数据时运行成功且断点不动
    let third = run_to_completion(&h, created.id).await;
    assert_eq!(third.status, TaskStatus::Success);
    assert_eq!(third.synced_count, 0);
    assert_eq!(
        h.cursors.get(&created.breakpoint_key()).await.unwrap(),
        Some("800".to_string())
    );
}

#[tokio::test]
async fn consistency_detects_count_drift_and_sample_mismatch() {
    let h = harness(InMemoryVectorStore::new());
    h.source.seed("id", 100).await;
    let created = h.repo.create(&sync_task(TaskType::Full, 4)).await.unwrap();
    run_to_completion(&h, created.id).await;

    // 目标端丢了5条
    for pk in 96..=100 {
        h.store.delete("order_vectors", pk).await.unwrap();
    }

    let mut sample = Vec::new();
    for pk in 1..=9 {
        sample.push(expected_record(pk).await);
    }
    // 第10条抽样给错的字段值
    let mut bad = expected_record(10).await;
    bad.fields
        .insert("name".to_string(), Value::from("tampered"));
    sample.push(bad);

    let report = h.orchestrator.verify_task(created.id, &sample).await.unwrap();
    assert!(!report.consistent);
    assert_eq!(report.source_count, 100);
    assert_eq!(report.target_count, 95);
    assert_eq!(report.count_delta(), 5);
    assert_eq!(report.sample_checked, 10);
    assert_eq!(report.sample_passed, 9);
    assert!(!report.discrepancies.is_empty());
}

#[tokio::test]
async fn consistency_check_degrades_when_target_unavailable() {
    let h = harness(InMemoryVectorStore::new());
    h.source.seed("id", 50).await;
    let created = h.repo.create(&sync_task(TaskType::Full, 2)).await.unwrap();
    run_to_completion(&h, created.id).await;

    h.store.set_unavailable(true);
    let report = h.orchestrator.verify_task(created.id, &[]).await.unwrap();
    assert!(!report.consistent);
    assert_eq!(report.sample_checked, 0);
    assert!(report.error_message.is_some());
}

#[tokio::test(start_paused = true)]
async fn heartbeat_is_refreshed_across_shards_of_a_long_run() {
    // 每次源查询挂起40秒：边界查询t=40完成，计数查询t=80完成，
    // 分片扫描t=120完成。心跳TTL为100秒，若只在运行开始写一次，
    // t=100后心跳即过期。
    let source = InMemorySourceStrategy::new().with_query_delay(Duration::from_secs(40));
    let h = harness_with(InMemoryVectorStore::new(), source, |runner| {
        runner.with_heartbeat_ttl(Duration::from_secs(100))
    });
    h.source.seed("id", 200).await;
    let created = h.repo.create(&sync_task(TaskType::Full, 2)).await.unwrap();

    h.orchestrator.trigger(created.id).await.unwrap();

    // t=110：初始TTL已过，但分片开工时（t=80）已续约，心跳仍在
    tokio::time::sleep(Duration::from_secs(110)).await;
    assert!(h
        .cursors
        .get(&created.heartbeat_key())
        .await
        .unwrap()
        .is_some());

    h.orchestrator.wait_for_completion(created.id).await.unwrap();
    let done = h.repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.synced_count, 200);
    // 运行收尾后心跳被清掉
    assert!(h
        .cursors
        .get(&created.heartbeat_key())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn hung_source_query_times_out_and_fails_the_run() {
    let source = InMemorySourceStrategy::new().with_query_delay(Duration::from_secs(120));
    let h = harness_with(InMemoryVectorStore::new(), source, |runner| {
        runner.with_query_timeout(Duration::from_secs(1))
    });
    h.source.seed("id", 50).await;
    let created = h.repo.create(&sync_task(TaskType::Full, 2)).await.unwrap();

    let done = run_to_completion(&h, created.id).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error_message.unwrap_or_default().contains("超时"));
    assert_eq!(h.store.count("order_vectors").await.unwrap(), 0);
}
