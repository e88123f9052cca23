//! Integration tests for the Transactional Outbox Pattern.
//!
//! These tests verify the end-to-end flow:
//! 1. CreateOrderHandler writes the order and its outbox record in one transaction
//! 2. OutboxRelay polls the outbox and publishes records
//! 3. Records are marked relayed only after the publisher acknowledged them
//!
//! Uses in-memory implementations to test the pattern without external dependencies.

use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use order_outbox::adapters::{InMemoryPublisher, InMemoryStore};
use order_outbox::application::{
    BackoffPolicy, CreateOrderCommand, CreateOrderHandler, OutboxRelay, OutboxWriter, RelayConfig,
};
use order_outbox::domain::foundation::Timestamp;
use order_outbox::domain::outbox::{OutboxRecord, OutboxStatus};
use order_outbox::ports::{OutboxStore, PublishError, TransactionalStore};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn create_handler(store: &InMemoryStore) -> CreateOrderHandler {
    let store: Arc<dyn TransactionalStore> = Arc::new(store.clone());
    CreateOrderHandler::new(store, OutboxWriter::new())
}

fn test_config() -> RelayConfig {
    RelayConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_backoff(BackoffPolicy::none())
        .with_mark_retries(0, Duration::ZERO)
}

fn relay(store: &InMemoryStore, publisher: &Arc<InMemoryPublisher>) -> OutboxRelay {
    OutboxRelay::with_config(Arc::new(store.clone()), publisher.clone(), test_config())
}

fn command(number: &str, customer_id: &str) -> CreateOrderCommand {
    CreateOrderCommand {
        number: number.to_string(),
        customer_id: customer_id.to_string(),
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn created_order_is_published_with_its_payload() {
    let store = InMemoryStore::new().with_next_order_id(42);
    let publisher = Arc::new(InMemoryPublisher::new());

    let result = create_handler(&store)
        .handle(command("A-100", "C-1"))
        .await
        .unwrap();
    assert_eq!(result.order.id().value(), 42);

    let record = store.outbox_record(result.outbox_record_id).unwrap();
    assert_eq!(record.aggregate_type, "Order");
    assert_eq!(record.aggregate_id, "42");
    assert_eq!(record.event_type, "OrderCreated");
    assert_eq!(record.status, OutboxStatus::Pending);

    let report = relay(&store, &publisher).poll_once().await.unwrap();
    assert_eq!(report.relayed, 1);

    let events = publisher.published_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "OrderCreated");
    assert_eq!(events[0].aggregate_id, "42");
    assert_eq!(
        events[0].payload_json().unwrap(),
        json!({"id": 42, "number": "A-100", "customerId": "C-1"})
    );
    assert_eq!(
        store.outbox_record(result.outbox_record_id).unwrap().status,
        OutboxStatus::Relayed
    );
}

#[tokio::test]
async fn failed_outbox_write_leaves_nothing_to_relay() {
    let store = InMemoryStore::new();
    let publisher = Arc::new(InMemoryPublisher::new());
    store.fail_outbox_inserts(true);

    let result = create_handler(&store).handle(command("A-100", "C-1")).await;

    assert!(result.is_err());
    assert!(store.orders().is_empty());
    assert_eq!(relay(&store, &publisher).poll_once().await.unwrap().selected, 0);
    assert_eq!(publisher.attempt_count(), 0);
}

#[tokio::test]
async fn failed_commit_leaves_nothing_to_relay() {
    let store = InMemoryStore::new();
    store.fail_commits(true);

    let result = create_handler(&store).handle(command("A-100", "C-1")).await;

    assert!(result.is_err());
    assert!(store.orders().is_empty());
    assert!(store.outbox_records().is_empty());
}

#[tokio::test]
async fn concurrent_orders_each_produce_exactly_one_event() {
    let store = InMemoryStore::new();
    let publisher = Arc::new(InMemoryPublisher::new());
    let handler = Arc::new(create_handler(&store));

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .handle(command(&format!("A-{}", i), "C-1"))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let relay = relay(&store, &publisher);
    while relay.poll_once().await.unwrap().selected > 0 {}

    let orders = store.orders();
    assert_eq!(orders.len(), 20);
    assert_eq!(publisher.event_count(), 20);
    for order in orders {
        let id = order.id().to_string();
        assert_eq!(publisher.events_for_aggregate(&id).len(), 1);
    }
}

#[tokio::test]
async fn broker_outage_delays_but_does_not_lose_events() {
    let store = InMemoryStore::new().with_next_order_id(42);
    let publisher = Arc::new(InMemoryPublisher::new());
    create_handler(&store)
        .handle(command("A-100", "C-1"))
        .await
        .unwrap();
    publisher.fail_next((0..3).map(|_| PublishError::transient("connection refused")));
    let relay = relay(&store, &publisher);

    for _ in 0..3 {
        assert_eq!(relay.poll_once().await.unwrap().failed, 1);
        assert_eq!(publisher.event_count(), 0);
    }
    assert_eq!(relay.poll_once().await.unwrap().relayed, 1);

    let record = &store.outbox_records()[0];
    assert_eq!(record.status, OutboxStatus::Relayed);
    assert_eq!(record.attempts, 3);
    assert_eq!(publisher.attempt_count(), 4);
}

#[tokio::test]
async fn crash_after_publish_republishes_exactly_once() {
    let store = InMemoryStore::new();
    let publisher = Arc::new(InMemoryPublisher::new());
    let result = create_handler(&store)
        .handle(command("A-100", "C-1"))
        .await
        .unwrap();

    // The mark step fails as if the process died right after publishing
    store.fail_next_mark_relayed(1);
    relay(&store, &publisher).poll_once().await.unwrap();
    assert_eq!(publisher.event_count(), 1);
    assert_eq!(
        store.outbox_record(result.outbox_record_id).unwrap().status,
        OutboxStatus::Pending
    );

    // Restarted relay
    let restarted = relay(&store, &publisher);
    restarted.poll_once().await.unwrap();
    restarted.poll_once().await.unwrap();

    assert_eq!(publisher.event_count(), 2);
    let events = publisher.published_events();
    assert_eq!(events[0], events[1]);
    assert_eq!(
        store.outbox_record(result.outbox_record_id).unwrap().status,
        OutboxStatus::Relayed
    );
}

#[tokio::test]
async fn dead_letter_blocks_aggregate_until_requeued() {
    let store = InMemoryStore::new();
    let publisher = Arc::new(InMemoryPublisher::new());
    let first = OutboxRecord::new("Order", "7", "OrderCreated", json!({"seq": 0}), Timestamp::now());
    let second = OutboxRecord::new("Order", "7", "OrderShipped", json!({"seq": 1}), Timestamp::now());
    let first_id = first.id;
    store.seed_outbox([first, second]);
    publisher.reject_aggregate("7", PublishError::permanent("schema rejected"));
    let relay = relay(&store, &publisher);

    relay.poll_once().await.unwrap();
    assert_eq!(
        store.outbox_record(first_id).unwrap().status,
        OutboxStatus::DeadLettered
    );
    assert_eq!(relay.poll_once().await.unwrap().selected, 0);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.pending, 1);

    publisher.clear_rejections();
    store.requeue(first_id).await.unwrap();
    relay.poll_once().await.unwrap();

    let types: Vec<_> = publisher
        .events_for_aggregate("7")
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec!["OrderCreated", "OrderShipped"]);
}

#[tokio::test]
async fn running_relay_drains_orders_written_while_it_runs() {
    let store = InMemoryStore::new();
    let publisher = Arc::new(InMemoryPublisher::new());
    let handler = create_handler(&store);
    let relay = relay(&store, &publisher);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = tokio::spawn(async move { relay.run(shutdown_rx).await });

    for i in 0..10 {
        handler
            .handle(command(&format!("A-{}", i), "C-1"))
            .await
            .unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while publisher.event_count() < 10 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), relay_task)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(publisher.event_count(), 10);
    assert!(store
        .outbox_records()
        .iter()
        .all(|r| r.status == OutboxStatus::Relayed));
}

#[tokio::test]
async fn overlapping_transactions_on_one_aggregate_publish_in_write_order() {
    let store = InMemoryStore::new();
    let publisher = Arc::new(InMemoryPublisher::new());
    let relay = relay(&store, &publisher);
    let writer = OutboxWriter::new();

    let mut first_tx = store.begin().await.unwrap();
    writer
        .append(first_tx.as_mut(), "Order", "x", "OrderEvent", json!({"seq": 0}), Timestamp::now())
        .await
        .unwrap();

    // The second writer starts while the first transaction is still open
    let second = tokio::spawn({
        let store = store.clone();
        async move {
            let mut tx = store.begin().await.unwrap();
            OutboxWriter::new()
                .append(tx.as_mut(), "Order", "x", "OrderEvent", json!({"seq": 1}), Timestamp::now())
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    relay.poll_once().await.unwrap();
    assert_eq!(publisher.event_count(), 0);

    first_tx.commit().await.unwrap();
    relay.poll_once().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), second)
        .await
        .expect("second writer never got the aggregate")
        .unwrap();
    relay.poll_once().await.unwrap();

    let seqs: Vec<u64> = publisher
        .events_for_aggregate("x")
        .iter()
        .filter_map(|e| e.payload_json())
        .filter_map(|p| p["seq"].as_u64())
        .collect();
    assert_eq!(seqs, vec![0, 1]);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the mix of broker failures and lost marks, every record is
    /// delivered and each aggregate sees its records in write order.
    #[test]
    fn per_aggregate_order_survives_failures(
        aggregates in prop::collection::vec(0u8..4, 1..40),
        transient_failures in 0usize..10,
        lost_marks in 0u32..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = InMemoryStore::new();
            let publisher = Arc::new(InMemoryPublisher::new());

            let mut expected: HashMap<String, Vec<u64>> = HashMap::new();
            let records: Vec<_> = aggregates
                .iter()
                .enumerate()
                .map(|(seq, aggregate)| {
                    let aggregate_id = aggregate.to_string();
                    expected.entry(aggregate_id.clone()).or_default().push(seq as u64);
                    OutboxRecord::new("Order", aggregate_id, "OrderEvent", json!({"seq": seq}), Timestamp::now())
                })
                .collect();
            store.seed_outbox(records);
            publisher.fail_next((0..transient_failures).map(|_| PublishError::transient("flaky")));
            store.fail_next_mark_relayed(lost_marks);

            let relay = relay(&store, &publisher);
            for _ in 0..200 {
                if relay.poll_once().await.unwrap().selected == 0 {
                    break;
                }
            }

            prop_assert!(store.outbox_records().iter().all(|r| r.status == OutboxStatus::Relayed));

            for (aggregate_id, expected_seqs) in &expected {
                let mut delivered: Vec<u64> = publisher
                    .events_for_aggregate(aggregate_id)
                    .iter()
                    .map(|e| e.payload_json().unwrap()["seq"].as_u64().unwrap())
                    .collect();

                // Redeliveries repeat a record but never jump back past a later one
                prop_assert!(delivered.windows(2).all(|w| w[0] <= w[1]));
                delivered.dedup();
                prop_assert_eq!(&delivered, expected_seqs);
            }
            Ok(())
        })?;
    }
}
