use anyhow::Result;
use diagnostics::LogContext;
use shardstore::ShardStore;
use tablestore::{BackendError, MemoryTable, ScalarType, TableBackend, TableSchema};
use transfer::{CloneError, SchemaCloner};

#[tokio::test]
async fn test_schema_clone_through_shard_store() -> Result<()> {
    let backend = MemoryTable::new();
    let shards = ShardStore::in_memory();
    let schema = TableSchema::with_key(("customer", ScalarType::S), Some(("placed", ScalarType::N)));
    backend.create("orders", schema.clone())?;

    let ctx = LogContext::new("test", "orders");
    let cloner = SchemaCloner::new(&backend, &shards, &ctx);

    let exported = cloner.export_schema("orders").await?;
    assert!(exported.complete);
    assert_eq!(shards.get_schema("orders").await?, schema);

    let imported = cloner.import_schema("orders", "orders-copy").await?;
    assert!(imported.complete);
    assert_eq!(backend.describe_table("orders-copy").await?, schema);

    let err = cloner
        .import_schema("orders", "orders-copy")
        .await
        .expect_err("table exists");
    assert!(matches!(err, CloneError::Backend(BackendError::AlreadyExists(_))));
    Ok(())
}
