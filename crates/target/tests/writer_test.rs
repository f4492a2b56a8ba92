use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use vecsync_core::models::{SourceRow, VectorRecord};
use vecsync_core::traits::{MetricType, VectorStore};
use vecsync_core::SyncError;
use vecsync_infrastructure::InMemoryVectorStore;
use vecsync_target::SyncWriter;

const DIMENSION: usize = 4;

fn record(pk: i64, name: &str) -> VectorRecord {
    let mut fields = SourceRow::new();
    fields.insert("name".to_string(), Value::from(name));
    VectorRecord::new(pk, vec![pk as f32; DIMENSION]).with_fields(fields)
}

async fn writer_over(store: &Arc<InMemoryVectorStore>) -> SyncWriter {
    let writer = SyncWriter::new(store.clone());
    writer.ensure_collection("vectors", DIMENSION).await.unwrap();
    writer
}

#[tokio::test]
async fn idempotent_write_overwrites_via_native_upsert() {
    let store = Arc::new(InMemoryVectorStore::new());
    let writer = writer_over(&store).await;

    writer.idempotent_write("vectors", &record(1, "v1")).await.unwrap();
    writer.idempotent_write("vectors", &record(1, "v2")).await.unwrap();

    assert_eq!(store.count("vectors").await.unwrap(), 1);
    let current = store.query_by_pk("vectors", 1).await.unwrap().unwrap();
    assert_eq!(current.fields.get("name"), Some(&Value::from("v2")));
}

#[tokio::test]
async fn idempotent_write_falls_back_to_delete_then_insert() {
    let store = Arc::new(InMemoryVectorStore::without_native_upsert());
    let writer = writer_over(&store).await;

    writer.idempotent_write("vectors", &record(1, "v1")).await.unwrap();
    writer.idempotent_write("vectors", &record(1, "v2")).await.unwrap();

    assert_eq!(store.count("vectors").await.unwrap(), 1);
    let current = store.query_by_pk("vectors", 1).await.unwrap().unwrap();
    assert_eq!(current.fields.get("name"), Some(&Value::from("v2")));
}

#[tokio::test]
async fn ensure_collection_is_idempotent_but_rejects_dimension_change() {
    let store = Arc::new(InMemoryVectorStore::new());
    let writer = writer_over(&store).await;

    // 重复调用是空操作
    writer.ensure_collection("vectors", DIMENSION).await.unwrap();

    // 维度变更需要显式迁移
    let err = writer
        .ensure_collection("vectors", DIMENSION * 2)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SchemaConflict(_)));
}

#[tokio::test]
async fn ensure_index_is_idempotent_but_rejects_type_change() {
    let store = Arc::new(InMemoryVectorStore::new());
    let writer = writer_over(&store).await;

    writer
        .ensure_index("vectors", "vector", "IVF_FLAT", MetricType::Cosine)
        .await
        .unwrap();
    writer
        .ensure_index("vectors", "vector", "IVF_FLAT", MetricType::Cosine)
        .await
        .unwrap();

    let err = writer
        .ensure_index("vectors", "vector", "HNSW", MetricType::Cosine)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SchemaConflict(_)));
}

#[tokio::test]
async fn empty_batch_is_a_successful_noop() {
    let store = Arc::new(InMemoryVectorStore::new());
    let writer = writer_over(&store).await;

    // 不可用的目标也不会被空批触碰
    store.set_unavailable(true);
    assert!(writer.batch_write("vectors", &[]).await.unwrap());
}

#[tokio::test]
async fn write_each_counts_successes_and_stops_on_error() {
    let store = Arc::new(InMemoryVectorStore::new());
    let writer = writer_over(&store).await;

    let records = vec![record(1, "a"), record(2, "b"), record(3, "c")];
    assert_eq!(writer.write_each("vectors", &records).await.unwrap(), 3);

    // 第2条写入失败时整个降级写报错，不静默丢数据
    store.fail_next_writes(1);
    let err = writer
        .write_each("vectors", &[record(4, "d"), record(5, "e")])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::VectorStore(_)));
    assert!(store.query_by_pk("vectors", 4).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_target_write_times_out() {
    let store = Arc::new(InMemoryVectorStore::new().with_write_delay(Duration::from_secs(120)));
    let writer = SyncWriter::new(store.clone()).with_timeout(Duration::from_secs(1));
    writer.ensure_collection("vectors", DIMENSION).await.unwrap();

    let err = writer.write("vectors", &record(1, "slow")).await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout(_)));
}
