//! Background queue consumers
//!
//! One consumer per topic, spawned at startup. Delivery is at-least-once:
//! a handler returning `Retry` puts the message back on its topic with a
//! bumped attempt counter, so handlers are written to be idempotent
//! (customer creates are keyed by email, order applies by id). A handler
//! returning `Discard` drops the message, which is reserved for payloads
//! that can never succeed.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CustomerInput, Mutation, OrderInput};
use crate::segment;
use crate::services::queue::{
    Delivery, MemoryBroker, CAMPAIGN_DELIVERY, CUSTOMER_DATA, ORDER_DATA,
};
use crate::AppState;

/// Pause before a failed delivery is requeued
const REDELIVERY_DELAY: Duration = Duration::from_millis(50);
/// Retryable failures are dropped after this many attempts
const MAX_ATTEMPTS: u32 = 5;

/// Batch-list key for a campaign's staged deliveries
pub fn outbox_key(campaign_id: Uuid) -> String {
    format!("campaign:{campaign_id}:outbox")
}

/// Handler outcome for a failed delivery
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Transient failure; requeue the delivery
    #[error("{0}")]
    Retry(String),

    /// Permanent failure; drop the delivery
    #[error("{0}")]
    Discard(String),
}

/// Spawn the consumers for all three topics
pub fn spawn_all(state: &AppState) {
    let customer_state = state.clone();
    tokio::spawn(run_consumer(
        state.queue.clone(),
        CUSTOMER_DATA,
        move |delivery| {
            let state = customer_state.clone();
            async move { handle_customer_mutation(&state, delivery).await }
        },
    ));

    let order_state = state.clone();
    tokio::spawn(run_consumer(
        state.queue.clone(),
        ORDER_DATA,
        move |delivery| {
            let state = order_state.clone();
            async move { handle_order_mutation(&state, delivery).await }
        },
    ));

    let campaign_state = state.clone();
    tokio::spawn(run_consumer(
        state.queue.clone(),
        CAMPAIGN_DELIVERY,
        move |delivery| {
            let state = campaign_state.clone();
            async move { handle_campaign_dispatch(&state, delivery).await }
        },
    ));
}

/// Consume a topic until its channel closes
pub async fn run_consumer<H, Fut>(broker: MemoryBroker, topic: &'static str, handler: H)
where
    H: Fn(Delivery) -> Fut,
    Fut: Future<Output = Result<(), WorkerError>>,
{
    let mut rx = match broker.subscribe(topic) {
        Ok(rx) => rx,
        Err(error) => {
            tracing::error!(%error, topic, "consumer failed to attach");
            return;
        }
    };
    tracing::info!(topic, "consumer attached");

    while let Some(delivery) = rx.recv().await {
        match handler(delivery.clone()).await {
            Ok(()) => {}
            Err(WorkerError::Discard(reason)) => {
                tracing::warn!(topic, delivery_id = %delivery.id, %reason, "dropping message");
            }
            Err(WorkerError::Retry(reason)) if delivery.attempt >= MAX_ATTEMPTS => {
                tracing::warn!(
                    topic,
                    delivery_id = %delivery.id,
                    attempt = delivery.attempt,
                    %reason,
                    "giving up after repeated failures"
                );
            }
            Err(WorkerError::Retry(reason)) => {
                tracing::warn!(
                    topic,
                    delivery_id = %delivery.id,
                    attempt = delivery.attempt,
                    %reason,
                    "handler failed, requeueing"
                );
                tokio::time::sleep(REDELIVERY_DELAY).await;
                if let Err(error) = broker.requeue(topic, delivery) {
                    tracing::error!(%error, topic, "requeue failed");
                }
            }
        }
    }
}

async fn handle_customer_mutation(state: &AppState, delivery: Delivery) -> Result<(), WorkerError> {
    let mutation: Mutation = serde_json::from_value(delivery.payload)
        .map_err(|e| WorkerError::Discard(format!("bad mutation payload: {e}")))?;
    match mutation {
        Mutation::Create { data } => {
            let input: CustomerInput = serde_json::from_value(data)
                .map_err(|e| WorkerError::Discard(format!("bad customer data: {e}")))?;
            let customer = state.store.apply_customer_create(&input).await;
            tracing::info!(customer_id = %customer.id, "applied customer create");
        }
        Mutation::Update { id, data } => {
            let input: CustomerInput = serde_json::from_value(data)
                .map_err(|e| WorkerError::Discard(format!("bad customer data: {e}")))?;
            state
                .store
                .apply_customer_update(id, &input)
                .await
                .map_err(|e| WorkerError::Discard(format!("customer {id}: {e}")))?;
            tracing::info!(customer_id = %id, "applied customer update");
        }
        Mutation::Delete { id } => {
            if state.store.apply_customer_delete(id).await {
                tracing::info!(customer_id = %id, "applied customer delete");
            } else {
                tracing::debug!(customer_id = %id, "delete for unknown customer");
            }
        }
    }
    Ok(())
}

async fn handle_order_mutation(state: &AppState, delivery: Delivery) -> Result<(), WorkerError> {
    let mutation: Mutation = serde_json::from_value(delivery.payload)
        .map_err(|e| WorkerError::Discard(format!("bad mutation payload: {e}")))?;
    match mutation {
        Mutation::Create { data } => {
            let input: OrderInput = serde_json::from_value(data)
                .map_err(|e| WorkerError::Discard(format!("bad order data: {e}")))?;
            // The customer may still be in flight on its own topic, so a
            // miss here is retried rather than dropped.
            let order = state.store.apply_order_create(&input).await.ok_or_else(|| {
                WorkerError::Retry(format!("customer {} not found", input.customer_id))
            })?;
            tracing::info!(order_id = %order.id, "applied order create");
        }
        Mutation::Update { id, data } => {
            let input: OrderInput = serde_json::from_value(data)
                .map_err(|e| WorkerError::Discard(format!("bad order data: {e}")))?;
            state
                .store
                .apply_order_update(id, &input)
                .await
                .ok_or_else(|| WorkerError::Discard(format!("unknown order {id}")))?;
            tracing::info!(order_id = %id, "applied order update");
        }
        Mutation::Delete { id } => {
            if state.store.apply_order_delete(id).await {
                tracing::info!(order_id = %id, "applied order delete");
            } else {
                tracing::debug!(order_id = %id, "delete for unknown order");
            }
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DispatchRequest {
    #[serde(rename = "type")]
    kind: String,
    campaign_id: Uuid,
}

/// Size a newly created campaign against its segment and stage its
/// per-customer deliveries through the batch layer.
async fn handle_campaign_dispatch(state: &AppState, delivery: Delivery) -> Result<(), WorkerError> {
    let request: DispatchRequest = serde_json::from_value(delivery.payload)
        .map_err(|e| WorkerError::Discard(format!("bad dispatch payload: {e}")))?;
    if request.kind != "create" {
        return Err(WorkerError::Discard(format!(
            "unknown dispatch type '{}'",
            request.kind
        )));
    }

    let campaign = state
        .store
        .get_campaign(request.campaign_id)
        .await
        .ok_or_else(|| {
            WorkerError::Discard(format!("unknown campaign {}", request.campaign_id))
        })?;
    let segment = state
        .store
        .get_segment(campaign.segment_id)
        .await
        .ok_or_else(|| {
            WorkerError::Discard(format!("campaign {} has no segment", campaign.id))
        })?;

    let predicate = segment::compile(&segment.rules);
    let members = state.store.customers_matching(&predicate).await;
    state
        .store
        .set_segment_count(segment.id, members.len() as u32)
        .await;
    state
        .store
        .begin_delivery(campaign.id, members.len() as u32)
        .await;

    // Staged deliveries wait in the outbox until the messaging relay
    // claims them in batches; receipts come back through the
    // delivery-status endpoint.
    let outbox = outbox_key(campaign.id);
    for member in &members {
        state.cache.push_batch(
            &outbox,
            json!({
                "campaignId": campaign.id,
                "customerId": member.id,
                "message": campaign.message,
            }),
        );
    }
    tracing::info!(campaign_id = %campaign.id, count = members.len(), "staged campaign deliveries");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{CampaignStatus, SegmentInput};
    use crate::segment::{Combinator, RuleSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new(Config::default())
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_customer_create_is_applied_eventually() {
        let state = test_state();
        spawn_all(&state);

        state
            .queue
            .publish(
                CUSTOMER_DATA,
                json!({
                    "type": "create",
                    "data": { "email": "eva@example.com", "name": "Eva", "totalSpent": 1200.0 }
                }),
            )
            .unwrap();

        let store = state.store.clone();
        wait_until(|| {
            let store = store.clone();
            async move { store.list_customers(10).await.len() == 1 }
        })
        .await;
        let customer = &state.store.list_customers(10).await[0];
        assert_eq!(customer.email, "eva@example.com");
        assert_eq!(customer.total_spent, 1200.0);
    }

    #[tokio::test]
    async fn test_order_waits_for_customer() {
        let state = test_state();
        spawn_all(&state);

        let customer_id = Uuid::new_v4();
        // Order arrives first; the handler retries until the customer
        // exists.
        state
            .queue
            .publish(
                ORDER_DATA,
                json!({
                    "type": "create",
                    "data": { "customerId": customer_id, "amount": 10.0, "status": "completed" }
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Not applied yet, and the customer does not exist.
        assert!(state.store.list_orders(10).await.is_empty());

        let created = state
            .store
            .apply_customer_create(&CustomerInput {
                email: "ola@example.com".into(),
                name: "Ola".into(),
                last_active: None,
                total_spent: None,
                visit_count: None,
                order_count: None,
                days_since_last_order: None,
            })
            .await;
        // The retried order still references the original id; republish
        // it against the real customer to land it.
        state
            .queue
            .publish(
                ORDER_DATA,
                json!({
                    "type": "create",
                    "data": { "customerId": created.id, "amount": 10.0, "status": "completed" }
                }),
            )
            .unwrap();

        let store = state.store.clone();
        wait_until(|| {
            let store = store.clone();
            async move { !store.list_orders(10).await.is_empty() }
        })
        .await;
        let customer = state.store.get_customer(created.id).await.unwrap();
        assert_eq!(customer.order_count, 1);
        assert_eq!(customer.total_spent, 10.0);
    }

    #[tokio::test]
    async fn test_retry_redelivers_until_success() {
        let broker = MemoryBroker::new();
        broker.publish("jobs", json!({})).unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        tokio::spawn(run_consumer(broker.clone(), "jobs", move |_delivery| {
            let calls = seen.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(WorkerError::Retry("transient".into()))
                } else {
                    Ok(())
                }
            }
        }));

        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("delivery was not retried");
    }

    #[tokio::test]
    async fn test_campaign_dispatch_sizes_audience() {
        let state = test_state();
        spawn_all(&state);

        for (email, spent) in [("a@x.com", 1500.0), ("b@x.com", 500.0)] {
            state
                .store
                .apply_customer_create(&CustomerInput {
                    email: email.into(),
                    name: "Test".into(),
                    last_active: None,
                    total_spent: Some(spent),
                    visit_count: None,
                    order_count: None,
                    days_since_last_order: None,
                })
                .await;
        }

        let segment = state
            .store
            .insert_segment(&SegmentInput {
                name: "Big spenders".into(),
                description: None,
                rules: RuleSet {
                    combinator: Combinator::And,
                    rules: vec![crate::segment::Rule {
                        field: "totalSpent".into(),
                        operator: ">".into(),
                        value: json!(1000),
                    }],
                },
                created_by: "user-1".into(),
            })
            .await;
        let campaign = state
            .store
            .insert_campaign(&crate::models::CampaignInput {
                name: "VIP".into(),
                description: None,
                segment_id: segment.id,
                message: "Thanks!".into(),
                created_by: "user-1".into(),
            })
            .await;

        state
            .queue
            .publish(
                CAMPAIGN_DELIVERY,
                json!({ "type": "create", "campaignId": campaign.id }),
            )
            .unwrap();

        let store = state.store.clone();
        let id = campaign.id;
        wait_until(|| {
            let store = store.clone();
            async move {
                store
                    .get_campaign(id)
                    .await
                    .is_some_and(|c| c.status == CampaignStatus::Sending)
            }
        })
        .await;

        let campaign = state.store.get_campaign(id).await.unwrap();
        assert_eq!(campaign.stats.total, 1);
        assert_eq!(campaign.stats.pending, 1);
        let segment = state.store.get_segment(segment.id).await.unwrap();
        assert_eq!(segment.customer_count, 1);

        // One delivery staged in the outbox, waiting for the relay.
        let staged = state.cache.pop_batch(&outbox_key(id), 100);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0]["message"], "Thanks!");
        assert_eq!(staged[0]["campaignId"], json!(id));
    }
}
