use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;

use txanchor::{
    AnchorEngine, AnchorError, AnchorRecord, AnchorStatistics, AnchorStatus, AnchorStore, Config,
    MemoryAnchorStore, MerkleTree, SimulatedChainClient,
};

fn test_config() -> Config {
    let mut config = Config::default();
    config.batch.max_batch_size = 5;
    config.submission.max_attempts = 3;
    config.submission.retry_delay_seconds = 1;
    config.submission.submit_timeout_seconds = 2;
    config
}

fn build_engine(
    config: Config,
) -> (Arc<AnchorEngine>, Arc<MemoryAnchorStore>, Arc<SimulatedChainClient>) {
    let store = Arc::new(MemoryAnchorStore::new());
    let chain = Arc::new(SimulatedChainClient::new());
    let engine = Arc::new(AnchorEngine::with_system_clock(
        Arc::new(config),
        store.clone(),
        chain.clone(),
    ));
    (engine, store, chain)
}

/// A store whose inserts take a while, widening the cut window for tests.
#[derive(Debug)]
struct SlowInsertStore {
    inner: MemoryAnchorStore,
    insert_delay: Duration,
}

impl SlowInsertStore {
    fn new(insert_delay: Duration) -> Self {
        Self {
            inner: MemoryAnchorStore::new(),
            insert_delay,
        }
    }
}

#[async_trait]
impl AnchorStore for SlowInsertStore {
    async fn insert_record(&self, record: AnchorRecord) -> txanchor::Result<()> {
        tokio::time::sleep(self.insert_delay).await;
        self.inner.insert_record(record).await
    }

    async fn update_record(&self, record: &AnchorRecord) -> txanchor::Result<()> {
        self.inner.update_record(record).await
    }

    async fn get_record(&self, anchor_id: &str) -> txanchor::Result<Option<AnchorRecord>> {
        self.inner.get_record(anchor_id).await
    }

    async fn anchor_for_transaction(&self, tx_id: &str) -> txanchor::Result<Option<String>> {
        self.inner.anchor_for_transaction(tx_id).await
    }

    async fn recent_records(&self, limit: usize) -> txanchor::Result<Vec<AnchorRecord>> {
        self.inner.recent_records(limit).await
    }

    async fn record_count(&self) -> txanchor::Result<usize> {
        self.inner.record_count().await
    }

    async fn statistics(&self) -> txanchor::Result<AnchorStatistics> {
        self.inner.statistics().await
    }
}

#[tokio::test]
async fn test_scenario_a_three_transactions_force_confirm() {
    let (engine, _store, _chain) = build_engine(test_config());

    for i in 0..3 {
        let receipt = engine
            .add_transaction(&format!("tx-{}", i), "payment", json!({"amount": i}))
            .await
            .unwrap();
        assert_eq!(receipt.queue_position, i);
        assert_eq!(receipt.hash.len(), 64);
    }

    let record = engine.force_batch_process().await.unwrap().unwrap();
    assert_eq!(record.transaction_count, 3);
    assert_eq!(record.status, AnchorStatus::Confirmed);
    assert!(record.public_chain_tx_hash.is_some());
    assert!(record.anchored_at.is_some());
    assert_eq!(engine.pending_count(), 0);

    let mut anchor_ids = Vec::new();
    for i in 0..3 {
        let result = engine.verify_transaction(&format!("tx-{}", i)).await.unwrap();
        assert!(result.verified, "tx-{} should verify", i);
        assert_eq!(result.merkle_root.as_deref(), Some(record.merkle_root_hex().as_str()));
        assert!(result.error.is_none());
        anchor_ids.push(result.anchor_id.unwrap());
    }
    assert!(anchor_ids.iter().all(|id| *id == record.id));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_b_exhausted_retries_fail() {
    let (engine, _store, chain) = build_engine(test_config());
    chain.fail_next(3);

    engine
        .add_transaction("tx-doomed", "payment", json!({"amount": 1}))
        .await
        .unwrap();
    let record = engine.force_batch_process().await.unwrap().unwrap();

    assert_eq!(record.status, AnchorStatus::Failed);
    assert_eq!(record.retry_count, 3);
    assert!(record.error.is_some());
    assert!(record.public_chain_tx_hash.is_none());

    let result = engine.verify_transaction("tx-doomed").await.unwrap();
    assert!(!result.verified);
    assert_eq!(result.anchor_id.as_deref(), Some(record.id.as_str()));
    assert_eq!(result.error.as_deref(), Some("failed"));
}

#[tokio::test]
async fn test_scenario_c_size_triggered_cut() {
    let mut config = test_config();
    config.batch.max_batch_size = 4;
    let (engine, _store, _chain) = build_engine(config);

    // max_batch_size + 1 rapid adds; no timer involved
    for i in 0..5 {
        engine
            .add_transaction(&format!("tx-{}", i), "payment", json!({"n": i}))
            .await
            .unwrap();
    }

    assert_eq!(engine.pending_count(), 1);
    let recent = engine.get_recent_anchors(10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].transaction_count, 4);
    assert_eq!(
        recent[0].transaction_ids,
        vec!["tx-0", "tx-1", "tx-2", "tx-3"]
    );

    // The straggler is visible as queued, not lost
    let result = engine.verify_transaction("tx-4").await.unwrap();
    assert!(!result.verified);
    assert_eq!(result.error.as_deref(), Some("pending in batch queue"));
}

#[tokio::test]
async fn test_verify_unknown_transaction() {
    let (engine, _store, _chain) = build_engine(test_config());
    let result = engine.verify_transaction("tx-missing").await.unwrap();
    assert!(!result.verified);
    assert!(result.anchor_id.is_none());
    assert_eq!(result.error.as_deref(), Some("not found"));
}

#[tokio::test]
async fn test_inclusion_proofs_for_confirmed_anchor() {
    let (engine, _store, _chain) = build_engine(test_config());
    for i in 0..5 {
        engine
            .add_transaction(&format!("tx-{}", i), "settlement", json!({"n": i}))
            .await
            .unwrap();
    }
    let record = engine.get_recent_anchors(1).await.unwrap().remove(0);
    assert_eq!(record.status, AnchorStatus::Confirmed);

    for i in 0..5 {
        let tx_id = format!("tx-{}", i);
        let proof = engine.get_inclusion_proof(&record.id, &tx_id).await.unwrap();
        assert_eq!(proof.transaction_id, tx_id);
        assert_eq!(proof.merkle_root, record.merkle_root);
        // The auditor path: fold the proof locally, no store access
        assert!(proof.verify());
        assert!(MerkleTree::verify_proof(
            &proof.leaf_hash,
            &proof.steps,
            &record.merkle_root
        ));
    }

    let err = engine
        .get_inclusion_proof(&record.id, "tx-unrelated")
        .await
        .unwrap_err();
    assert_matches!(err, AnchorError::NotFound(_));
    let err = engine
        .get_inclusion_proof("no-such-anchor", "tx-0")
        .await
        .unwrap_err();
    assert_matches!(err, AnchorError::NotFound(_));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_retry_recovers_failed_anchor() {
    let (engine, _store, chain) = build_engine(test_config());
    chain.fail_next(3);

    engine
        .add_transaction("tx-1", "payment", json!({}))
        .await
        .unwrap();
    let failed = engine.force_batch_process().await.unwrap().unwrap();
    assert_eq!(failed.status, AnchorStatus::Failed);
    let root_before = failed.merkle_root;

    // Chain recovered; operator retries the same stored root
    let retried = engine.retry_failed_anchor(&failed.id).await.unwrap();
    assert_eq!(retried.status, AnchorStatus::Confirmed);
    assert_eq!(retried.merkle_root, root_before);
    assert_eq!(retried.retry_count, 0);

    let result = engine.verify_transaction("tx-1").await.unwrap();
    assert!(result.verified);
}

#[tokio::test]
async fn test_retry_on_confirmed_anchor_is_noop() {
    let (engine, store, _chain) = build_engine(test_config());
    engine
        .add_transaction("tx-1", "payment", json!({}))
        .await
        .unwrap();
    let confirmed = engine.force_batch_process().await.unwrap().unwrap();
    assert_eq!(confirmed.status, AnchorStatus::Confirmed);

    let after = engine.retry_failed_anchor(&confirmed.id).await.unwrap();
    assert_eq!(after, confirmed);
    // Nothing in the store changed either
    let stored = store.get_record(&confirmed.id).await.unwrap().unwrap();
    assert_eq!(stored, confirmed);
}

#[tokio::test]
async fn test_retry_unknown_anchor() {
    let (engine, _store, _chain) = build_engine(test_config());
    let err = engine.retry_failed_anchor("no-such-anchor").await.unwrap_err();
    assert_matches!(err, AnchorError::NotFound(_));
}

#[tokio::test(start_paused = true)]
async fn test_submission_timeout_counts_as_failure() {
    let mut config = test_config();
    config.submission.max_attempts = 2;
    config.submission.submit_timeout_seconds = 1;
    let store = Arc::new(MemoryAnchorStore::new());
    let chain = Arc::new(SimulatedChainClient::new());
    // Each submission takes far longer than the per-attempt timeout
    chain.set_latency(Duration::from_secs(30));
    let engine = AnchorEngine::with_system_clock(Arc::new(config), store.clone(), chain);

    engine
        .add_transaction("tx-slow", "payment", json!({}))
        .await
        .unwrap();
    let record = engine.force_batch_process().await.unwrap().unwrap();
    assert_eq!(record.status, AnchorStatus::Failed);
    assert_eq!(record.retry_count, 2);
    assert!(record.error.as_deref().unwrap_or_default().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_transactions_not_requeued() {
    let (engine, _store, chain) = build_engine(test_config());
    chain.fail_next(3);

    engine
        .add_transaction("tx-1", "payment", json!({}))
        .await
        .unwrap();
    let failed = engine.force_batch_process().await.unwrap().unwrap();
    assert_eq!(failed.status, AnchorStatus::Failed);
    assert_eq!(engine.pending_count(), 0);

    // Still mapped to the failed anchor, and not re-addable
    let result = engine.verify_transaction("tx-1").await.unwrap();
    assert_eq!(result.anchor_id.as_deref(), Some(failed.id.as_str()));
    let err = engine
        .add_transaction("tx-1", "payment", json!({}))
        .await
        .unwrap_err();
    assert_matches!(err, AnchorError::AlreadyAnchored(_));
}

#[tokio::test]
async fn test_duplicate_ids_rejected_while_queued() {
    let (engine, _store, _chain) = build_engine(test_config());
    engine
        .add_transaction("tx-1", "payment", json!({}))
        .await
        .unwrap();
    let err = engine
        .add_transaction("tx-1", "audit", json!({}))
        .await
        .unwrap_err();
    assert_matches!(err, AnchorError::AlreadyAnchored(_));
    assert_eq!(engine.pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_verify_during_cut_reports_anchoring() {
    let store = Arc::new(SlowInsertStore::new(Duration::from_millis(300)));
    let engine = Arc::new(AnchorEngine::with_system_clock(
        Arc::new(test_config()),
        store,
        Arc::new(SimulatedChainClient::new()),
    ));
    engine
        .add_transaction("tx-race", "payment", json!({}))
        .await
        .unwrap();

    let cut = tokio::spawn({
        let engine = engine.clone();
        async move { engine.force_batch_process().await }
    });

    // Land squarely in the window between queue drain and store insert: the
    // transaction must read as anchoring, never as unknown.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let result = engine.verify_transaction("tx-race").await.unwrap();
    assert!(!result.verified);
    assert_eq!(result.error.as_deref(), Some("anchoring"));

    // And it cannot be queued a second time while being cut
    let err = engine
        .add_transaction("tx-race", "payment", json!({}))
        .await
        .unwrap_err();
    assert_matches!(err, AnchorError::AlreadyAnchored(_));

    let record = cut.await.unwrap().unwrap().unwrap();
    assert_eq!(record.status, AnchorStatus::Confirmed);
    assert!(engine.verify_transaction("tx-race").await.unwrap().verified);
}

#[tokio::test]
async fn test_insert_failure_returns_batch_to_queue() {
    let (engine, store, _chain) = build_engine(test_config());
    for i in 0..3 {
        engine
            .add_transaction(&format!("tx-{}", i), "payment", json!({"n": i}))
            .await
            .unwrap();
    }

    store.set_fail_on_insert(true);
    let err = engine.force_batch_process().await.unwrap_err();
    assert_matches!(err, AnchorError::Storage(_));

    // The batch is back in the queue, in order, still eligible for a cut
    assert_eq!(engine.pending_count(), 3);
    let result = engine.verify_transaction("tx-0").await.unwrap();
    assert_eq!(result.error.as_deref(), Some("pending in batch queue"));

    store.set_fail_on_insert(false);
    let record = engine.force_batch_process().await.unwrap().unwrap();
    assert_eq!(record.status, AnchorStatus::Confirmed);
    assert_eq!(record.transaction_ids, vec!["tx-0", "tx-1", "tx-2"]);
    assert!(engine.verify_transaction("tx-1").await.unwrap().verified);
}

#[tokio::test]
async fn test_mapping_uniqueness_across_batches() {
    let mut config = test_config();
    config.batch.max_batch_size = 3;
    let (engine, store, _chain) = build_engine(config);

    for i in 0..9 {
        engine
            .add_transaction(&format!("tx-{}", i), "payment", json!({"n": i}))
            .await
            .unwrap();
    }
    assert_eq!(store.record_count().await.unwrap(), 3);

    // Every id maps to exactly one anchor, and batch bound holds everywhere
    let recent = engine.get_recent_anchors(10).await.unwrap();
    let mut seen = std::collections::HashSet::new();
    for record in &recent {
        assert!(record.transaction_count <= 3);
        assert_eq!(record.transaction_count, record.transaction_ids.len());
        for tx_id in &record.transaction_ids {
            assert!(seen.insert(tx_id.clone()), "{} appears twice", tx_id);
        }
    }
    assert_eq!(seen.len(), 9);
}

#[tokio::test]
async fn test_force_on_empty_queue_is_noop() {
    let (engine, store, _chain) = build_engine(test_config());
    assert!(engine.force_batch_process().await.unwrap().is_none());
    assert_eq!(store.record_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_statistics_reflect_engine_state() {
    let mut config = test_config();
    config.batch.max_batch_size = 10;
    let (engine, _store, chain) = build_engine(config);

    for i in 0..3 {
        engine
            .add_transaction(&format!("ok-{}", i), "payment", json!({}))
            .await
            .unwrap();
    }
    engine.force_batch_process().await.unwrap();

    chain.fail_next(3);
    engine
        .add_transaction("bad-1", "payment", json!({}))
        .await
        .unwrap();
    engine.force_batch_process().await.unwrap();

    engine
        .add_transaction("queued-1", "payment", json!({}))
        .await
        .unwrap();

    let stats = engine.get_statistics().await.unwrap();
    assert_eq!(stats.anchors.total_anchors, 2);
    assert_eq!(stats.anchors.confirmed, 1);
    assert_eq!(stats.anchors.failed, 1);
    assert_eq!(stats.anchors.transactions_anchored, 3);
    assert_eq!(stats.pending_in_queue, 1);
}

#[tokio::test]
async fn test_concurrent_producers() {
    let mut config = test_config();
    config.batch.max_batch_size = 8;
    let (engine, _store, _chain) = build_engine(config);

    let mut handles = Vec::new();
    for producer in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                engine
                    .add_transaction(
                        &format!("p{}-tx{}", producer, i),
                        "payment",
                        json!({"producer": producer, "n": i}),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    engine.force_batch_process().await.unwrap();

    // 40 adds, nothing lost or duplicated, every batch within bound
    let recent = engine.get_recent_anchors(100).await.unwrap();
    let total: usize = recent.iter().map(|r| r.transaction_count).sum();
    assert_eq!(total + engine.pending_count(), 40);
    assert!(recent.iter().all(|r| r.transaction_count <= 8));

    for producer in 0..4 {
        let result = engine
            .verify_transaction(&format!("p{}-tx0", producer))
            .await
            .unwrap();
        assert!(result.verified || result.error.as_deref() == Some("pending in batch queue"));
    }
}
