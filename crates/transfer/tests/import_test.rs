use anyhow::Result;
use bytes::Bytes;
use diagnostics::LogContext;
use shardstore::ShardStore;
use std::time::Duration;
use tablestore::{AttrValue, BackendError, Item, MemoryTable, ScalarType, TableSchema};
use tokio::time::Instant;
use transfer::{ErrorKind, IMPORT_SAFETY_MARGIN, ImportCheckpoint, Importer, TimeBudget};

const SOURCE: &str = "orders";
const DEST: &str = "orders-copy";

fn order(i: usize) -> Item {
    let mut item = Item::new();
    item.insert("pk".into(), AttrValue::s(format!("order-{i:04}")));
    item.insert("qty".into(), AttrValue::n(i));
    item
}

fn destination() -> Result<MemoryTable> {
    let backend = MemoryTable::new();
    backend.create(DEST, TableSchema::with_key(("pk", ScalarType::S), None))?;
    Ok(backend)
}

/// Store `shards` shards of `per_shard` consecutive orders
async fn stored_shards(store: &ShardStore, shards: usize, per_shard: usize) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for shard in 0..shards {
        let items: Vec<Item> = (0..per_shard).map(|i| order(shard * per_shard + i)).collect();
        ids.push(store.put_records(SOURCE, &items).await?);
    }
    Ok(ids)
}

fn long_budget() -> TimeBudget {
    TimeBudget::new(Duration::from_secs(60), IMPORT_SAFETY_MARGIN)
}

fn fresh(shard_ids: &[String]) -> ImportCheckpoint {
    ImportCheckpoint {
        shard_ids: shard_ids.to_vec(),
        ..ImportCheckpoint::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_import_all_records() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    let ids = stored_shards(&store, 3, 20).await?;
    let ctx = LogContext::new("test", DEST);

    let checkpoint = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 25, &long_budget())
        .await?;

    assert!(checkpoint.complete);
    assert_eq!(checkpoint.processed, 60);
    assert_eq!(checkpoint.shard_ids, ids);
    assert_eq!(backend.write_log(), vec![25, 25, 10]);
    let expected: Vec<Item> = (0..60).map(order).collect();
    assert_eq!(backend.items(DEST), expected);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_resume_advances_by_one_batch() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?.with_latency(Duration::from_secs(1));
    let ids = stored_shards(&store, 3, 25).await?;
    let ctx = LogContext::new("test", DEST);

    let prior = ImportCheckpoint {
        processed: 40,
        ..fresh(&ids)
    };
    // The first write is issued before the cutoff and confirmed after it
    let budget = TimeBudget::new(
        IMPORT_SAFETY_MARGIN + Duration::from_millis(500),
        IMPORT_SAFETY_MARGIN,
    );
    let checkpoint = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, prior, 10, &budget)
        .await?;

    assert!(!checkpoint.complete);
    assert_eq!(checkpoint.processed, 50);
    assert_eq!(checkpoint.shard_ids, ids);
    assert_eq!(backend.write_log(), vec![10]);
    let expected: Vec<Item> = (40..50).map(order).collect();
    assert_eq!(backend.items(DEST), expected);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unprocessed_records_are_retried_alone() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    backend.leave_unprocessed([5]);
    let ids = stored_shards(&store, 1, 25).await?;
    let ctx = LogContext::new("test", DEST);

    let checkpoint = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 25, &long_budget())
        .await?;

    assert!(checkpoint.complete);
    assert_eq!(checkpoint.processed, 25);
    assert_eq!(backend.write_log(), vec![25, 5]);
    assert_eq!(backend.row_count(DEST), 25);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_partial_batch_does_not_advance() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?.with_latency(Duration::from_secs(1));
    backend.leave_unprocessed([5]);
    let ids = stored_shards(&store, 1, 25).await?;
    let ctx = LogContext::new("test", DEST);

    // The first attempt returns after the cutoff with records left over
    let budget = TimeBudget::new(
        IMPORT_SAFETY_MARGIN + Duration::from_millis(500),
        IMPORT_SAFETY_MARGIN,
    );
    let checkpoint = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 25, &budget)
        .await?;

    assert!(!checkpoint.complete);
    assert_eq!(checkpoint.processed, 0);
    assert_eq!(backend.write_log(), vec![25]);
    assert_eq!(backend.row_count(DEST), 20);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_throttled_writes_are_retried() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    backend.throttle_writes(4);
    let ids = stored_shards(&store, 2, 10).await?;
    let ctx = LogContext::new("test", DEST);

    let checkpoint = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 20, &long_budget())
        .await?;

    assert!(checkpoint.complete);
    assert_eq!(checkpoint.processed, 20);
    assert_eq!(backend.write_log(), vec![20; 5]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_constant_throttling_stops_at_cutoff() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    backend.throttle_writes(100_000);
    let ids = stored_shards(&store, 2, 10).await?;
    let ctx = LogContext::new("test", DEST);
    let budget = TimeBudget::new(IMPORT_SAFETY_MARGIN + Duration::from_secs(5), IMPORT_SAFETY_MARGIN);
    let started = Instant::now();

    let checkpoint = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 10, &budget)
        .await?;

    assert!(!checkpoint.complete);
    assert_eq!(checkpoint.processed, 0);
    assert_eq!(checkpoint.shard_ids, ids);
    assert!(Instant::now() <= budget.cutoff());
    assert!(started.elapsed() <= Duration::from_secs(5));
    assert!(backend.write_log().len() > 1);
    assert_eq!(backend.row_count(DEST), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reimport_from_zero_is_idempotent() -> Result<()> {
    let store = ShardStore::in_memory();
    let ids = stored_shards(&store, 4, 15).await?;
    let ctx = LogContext::new("test", DEST);

    let straight = destination()?;
    Importer::new(&straight, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 25, &long_budget())
        .await?;

    let interrupted = destination()?.with_latency(Duration::from_secs(1));
    let budget = TimeBudget::new(
        IMPORT_SAFETY_MARGIN + Duration::from_millis(1500),
        IMPORT_SAFETY_MARGIN,
    );
    let partial = Importer::new(&interrupted, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 25, &budget)
        .await?;
    assert!(!partial.complete);
    assert!(partial.processed > 0);

    interrupted.set_latency(Duration::ZERO);
    let restarted = Importer::new(&interrupted, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 25, &long_budget())
        .await?;
    assert!(restarted.complete);
    assert_eq!(interrupted.items(DEST), straight.items(DEST));
    assert_eq!(interrupted.row_count(DEST), 60);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_keeps_last_batch() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    backend.fail_next_write(BackendError::NotFound(DEST.into()));
    let ids = stored_shards(&store, 1, 10).await?;
    let ctx = LogContext::new("test", DEST);

    let err = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 5, &long_budget())
        .await
        .expect_err("fatal write");
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert_eq!(backend.write_log(), vec![5]);
    assert_eq!(backend.row_count(DEST), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_shard_is_fatal() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    let mut ids = stored_shards(&store, 1, 10).await?;
    store
        .put(SOURCE, "corrupt", Bytes::from_static(b"{\"pk\":{\"S\":\"a\"}}\n{truncated"))
        .await?;
    ids.push("corrupt".into());
    let ctx = LogContext::new("test", DEST);

    let err = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 25, &long_budget())
        .await
        .expect_err("corrupt shard");
    assert_eq!(err.kind(), ErrorKind::Codec);
    assert!(backend.write_log().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_shard_is_a_storage_error() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    let ctx = LogContext::new("test", DEST);

    let err = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&["gone".to_string()]), 25, &long_budget())
        .await
        .expect_err("missing shard");
    assert_eq!(err.kind(), ErrorKind::Storage);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_processed_beyond_records_is_rejected() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    let ids = stored_shards(&store, 1, 10).await?;
    let ctx = LogContext::new("test", DEST);

    let prior = ImportCheckpoint {
        processed: 11,
        ..fresh(&ids)
    };
    let err = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, prior, 25, &long_budget())
        .await
        .expect_err("inconsistent checkpoint");
    assert_eq!(err.kind(), ErrorKind::Checkpoint);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_empty_shard_list_completes() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    let ctx = LogContext::new("test", DEST);

    let checkpoint = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, ImportCheckpoint::default(), 25, &long_budget())
        .await?;
    assert!(checkpoint.complete);
    assert_eq!(checkpoint.processed, 0);
    assert!(backend.write_log().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_oversized_batch_is_a_config_error() -> Result<()> {
    let store = ShardStore::in_memory();
    let backend = destination()?;
    let ids = stored_shards(&store, 1, 10).await?;
    let ctx = LogContext::new("test", DEST);

    let err = Importer::new(&backend, &store, &ctx)
        .import_into(DEST, SOURCE, fresh(&ids), 26, &long_budget())
        .await
        .expect_err("batch too large");
    assert_eq!(err.kind(), ErrorKind::Config);
    Ok(())
}
