//! In-process record store
//!
//! Stands in for the external database behind a narrow, typed interface;
//! every operation is a single critical section, so compound updates such
//! as delivery accounting are atomic. Customer and order mutations arrive
//! here only from the queue consumers, segment and campaign writes come
//! straight from the route handlers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Campaign, CampaignInput, CampaignStats, CampaignStatus, Customer, CustomerInput,
    DeliveryStatus, Order, OrderInput, OrderStatus, Segment, SegmentInput,
};
use crate::segment::Predicate;

/// Campaign rows plus the delivery receipt set that backs idempotency
#[derive(Default)]
struct CampaignTable {
    rows: Vec<Campaign>,
    /// campaign id -> customers with a recorded receipt
    receipts: HashMap<Uuid, HashSet<Uuid>>,
}

/// Why a customer update intent could not be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CustomerUpdateError {
    #[error("unknown customer")]
    UnknownCustomer,

    #[error("email already belongs to another customer")]
    EmailTaken,
}

/// Outcome of a delivery receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// First receipt for this customer; counters moved
    Recorded {
        stats: CampaignStats,
        status: CampaignStatus,
    },
    /// Receipt already recorded; counters untouched
    Duplicate {
        stats: CampaignStats,
        status: CampaignStatus,
    },
    /// Campaign exists but has not started sending
    NotSending,
}

/// Shared record store
#[derive(Clone, Default)]
pub struct Store {
    customers: Arc<RwLock<Vec<Customer>>>,
    orders: Arc<RwLock<Vec<Order>>>,
    segments: Arc<RwLock<Vec<Segment>>>,
    campaigns: Arc<RwLock<CampaignTable>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Customers =====

    pub async fn list_customers(&self, limit: usize) -> Vec<Customer> {
        let customers = self.customers.read().await;
        customers.iter().take(limit).cloned().collect()
    }

    pub async fn get_customer(&self, id: Uuid) -> Option<Customer> {
        let customers = self.customers.read().await;
        customers.iter().find(|c| c.id == id).cloned()
    }

    /// Apply a create intent. Email is the natural key, so a replayed
    /// create updates the existing record instead of duplicating it.
    pub async fn apply_customer_create(&self, input: &CustomerInput) -> Customer {
        let mut customers = self.customers.write().await;
        let now = Utc::now();
        if let Some(existing) = customers.iter_mut().find(|c| c.email == input.email) {
            apply_customer_fields(existing, input);
            existing.updated_at = now;
            return existing.clone();
        }
        let customer = Customer {
            id: Uuid::new_v4(),
            email: input.email.clone(),
            name: input.name.clone(),
            last_active: input.last_active.unwrap_or(now),
            total_spent: input.total_spent.unwrap_or(0.0),
            visit_count: input.visit_count.unwrap_or(0),
            order_count: input.order_count.unwrap_or(0),
            days_since_last_order: input.days_since_last_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };
        customers.push(customer.clone());
        customer
    }

    /// Apply an update intent. Email stays the unique key: an update that
    /// would move a customer onto another record's email is rejected, as
    /// letting it through would leave two records sharing the key that
    /// replayed creates are deduplicated by.
    pub async fn apply_customer_update(
        &self,
        id: Uuid,
        input: &CustomerInput,
    ) -> Result<Customer, CustomerUpdateError> {
        let mut customers = self.customers.write().await;
        if customers.iter().any(|c| c.id != id && c.email == input.email) {
            return Err(CustomerUpdateError::EmailTaken);
        }
        let customer = customers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(CustomerUpdateError::UnknownCustomer)?;
        apply_customer_fields(customer, input);
        customer.updated_at = Utc::now();
        Ok(customer.clone())
    }

    /// Remove a customer and their orders
    pub async fn apply_customer_delete(&self, id: Uuid) -> bool {
        let mut customers = self.customers.write().await;
        let before = customers.len();
        customers.retain(|c| c.id != id);
        let removed = customers.len() < before;
        drop(customers);
        if removed {
            self.orders.write().await.retain(|o| o.customer_id != id);
        }
        removed
    }

    pub async fn customers_matching(&self, predicate: &Predicate) -> Vec<Customer> {
        let customers = self.customers.read().await;
        customers
            .iter()
            .filter(|c| predicate.matches(c))
            .cloned()
            .collect()
    }

    pub async fn count_matching(&self, predicate: &Predicate) -> u32 {
        let customers = self.customers.read().await;
        customers.iter().filter(|c| predicate.matches(c)).count() as u32
    }

    // ===== Orders =====

    pub async fn list_orders(&self, limit: usize) -> Vec<Order> {
        let orders = self.orders.read().await;
        orders.iter().take(limit).cloned().collect()
    }

    pub async fn get_order(&self, id: Uuid) -> Option<Order> {
        let orders = self.orders.read().await;
        orders.iter().find(|o| o.id == id).cloned()
    }

    /// Apply an order create intent. The referenced customer must exist;
    /// completed orders bump the customer's behavioral aggregates.
    pub async fn apply_order_create(&self, input: &OrderInput) -> Option<Order> {
        let mut customers = self.customers.write().await;
        let customer = customers.iter_mut().find(|c| c.id == input.customer_id)?;
        let now = Utc::now();
        let status = input.status.unwrap_or(OrderStatus::Pending);
        if status == OrderStatus::Completed {
            customer.order_count += 1;
            customer.total_spent += input.amount;
            customer.days_since_last_order = 0;
            customer.last_active = now;
            customer.updated_at = now;
        }
        let order = Order {
            id: Uuid::new_v4(),
            customer_id: input.customer_id,
            amount: input.amount,
            status,
            created_at: now,
            updated_at: now,
        };
        self.orders.write().await.push(order.clone());
        Some(order)
    }

    /// Apply an order update intent. A pending order transitioning to
    /// completed bumps the customer aggregates exactly once.
    pub async fn apply_order_update(&self, id: Uuid, input: &OrderInput) -> Option<Order> {
        let mut customers = self.customers.write().await;
        let mut orders = self.orders.write().await;
        let order = orders.iter_mut().find(|o| o.id == id)?;
        let now = Utc::now();
        let new_status = input.status.unwrap_or(order.status);
        if order.status != OrderStatus::Completed && new_status == OrderStatus::Completed {
            if let Some(customer) = customers.iter_mut().find(|c| c.id == order.customer_id) {
                customer.order_count += 1;
                customer.total_spent += input.amount;
                customer.days_since_last_order = 0;
                customer.updated_at = now;
            }
        }
        order.amount = input.amount;
        order.status = new_status;
        order.updated_at = now;
        Some(order.clone())
    }

    pub async fn apply_order_delete(&self, id: Uuid) -> bool {
        let mut orders = self.orders.write().await;
        let before = orders.len();
        orders.retain(|o| o.id != id);
        orders.len() < before
    }

    // ===== Segments =====

    pub async fn list_segments(&self) -> Vec<Segment> {
        self.segments.read().await.clone()
    }

    pub async fn get_segment(&self, id: Uuid) -> Option<Segment> {
        let segments = self.segments.read().await;
        segments.iter().find(|s| s.id == id).cloned()
    }

    pub async fn insert_segment(&self, input: &SegmentInput) -> Segment {
        let now = Utc::now();
        let segment = Segment {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            description: input.description.clone(),
            rules: input.rules.clone(),
            customer_count: 0,
            created_by: input.created_by.clone(),
            created_at: now,
            updated_at: now,
        };
        self.segments.write().await.push(segment.clone());
        segment
    }

    pub async fn update_segment(&self, id: Uuid, input: &SegmentInput) -> Option<Segment> {
        let mut segments = self.segments.write().await;
        let segment = segments.iter_mut().find(|s| s.id == id)?;
        segment.name = input.name.clone();
        segment.description = input.description.clone();
        segment.rules = input.rules.clone();
        segment.created_by = input.created_by.clone();
        segment.updated_at = Utc::now();
        Some(segment.clone())
    }

    pub async fn delete_segment(&self, id: Uuid) -> bool {
        let mut segments = self.segments.write().await;
        let before = segments.len();
        segments.retain(|s| s.id != id);
        segments.len() < before
    }

    /// Refresh the denormalized match count
    pub async fn set_segment_count(&self, id: Uuid, count: u32) {
        let mut segments = self.segments.write().await;
        if let Some(segment) = segments.iter_mut().find(|s| s.id == id) {
            segment.customer_count = count;
        }
    }

    // ===== Campaigns =====

    /// Newest first, matching the admin UI's campaign history view
    pub async fn list_campaigns(&self) -> Vec<Campaign> {
        let table = self.campaigns.read().await;
        let mut rows = table.rows.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub async fn get_campaign(&self, id: Uuid) -> Option<Campaign> {
        let table = self.campaigns.read().await;
        table.rows.iter().find(|c| c.id == id).cloned()
    }

    pub async fn insert_campaign(&self, input: &CampaignInput) -> Campaign {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            description: input.description.clone(),
            segment_id: input.segment_id,
            status: CampaignStatus::Draft,
            message: input.message.clone(),
            stats: CampaignStats::default(),
            created_by: input.created_by.clone(),
            created_at: now,
            updated_at: now,
        };
        self.campaigns.write().await.rows.push(campaign.clone());
        campaign
    }

    pub async fn update_campaign(&self, id: Uuid, input: &CampaignInput) -> Option<Campaign> {
        let mut table = self.campaigns.write().await;
        let campaign = table.rows.iter_mut().find(|c| c.id == id)?;
        campaign.name = input.name.clone();
        campaign.description = input.description.clone();
        campaign.segment_id = input.segment_id;
        campaign.message = input.message.clone();
        campaign.created_by = input.created_by.clone();
        campaign.updated_at = Utc::now();
        Some(campaign.clone())
    }

    pub async fn delete_campaign(&self, id: Uuid) -> bool {
        let mut table = self.campaigns.write().await;
        let before = table.rows.len();
        table.rows.retain(|c| c.id != id);
        let removed = table.rows.len() < before;
        if removed {
            table.receipts.remove(&id);
        }
        removed
    }

    /// Size the campaign against its audience and move it to `sending`.
    /// An empty audience completes immediately.
    pub async fn begin_delivery(&self, id: Uuid, total: u32) -> Option<Campaign> {
        let mut table = self.campaigns.write().await;
        let campaign = table.rows.iter_mut().find(|c| c.id == id)?;
        campaign.stats = CampaignStats {
            total,
            sent: 0,
            failed: 0,
            pending: total,
        };
        campaign.status = if total == 0 {
            CampaignStatus::Completed
        } else {
            CampaignStatus::Sending
        };
        campaign.updated_at = Utc::now();
        Some(campaign.clone())
    }

    /// Record a delivery receipt. Receipts are idempotent per customer:
    /// the first one moves the counters, later ones report `Duplicate`.
    /// Runs entirely under the table's write lock.
    pub async fn record_delivery(
        &self,
        campaign_id: Uuid,
        customer_id: Uuid,
        status: DeliveryStatus,
    ) -> Option<DeliveryOutcome> {
        let mut guard = self.campaigns.write().await;
        let table = &mut *guard;
        let campaign = table.rows.iter_mut().find(|c| c.id == campaign_id)?;
        let receipts = table.receipts.entry(campaign_id).or_default();
        if receipts.contains(&customer_id) {
            return Some(DeliveryOutcome::Duplicate {
                stats: campaign.stats,
                status: campaign.status,
            });
        }
        if campaign.status != CampaignStatus::Sending {
            return Some(DeliveryOutcome::NotSending);
        }
        receipts.insert(customer_id);

        match status {
            DeliveryStatus::Sent => campaign.stats.sent += 1,
            DeliveryStatus::Failed => campaign.stats.failed += 1,
        }
        campaign.stats.pending = campaign.stats.pending.saturating_sub(1);
        if campaign.stats.pending == 0 {
            campaign.status = if campaign.stats.sent == 0 {
                CampaignStatus::Failed
            } else {
                CampaignStatus::Completed
            };
        }
        campaign.updated_at = Utc::now();
        Some(DeliveryOutcome::Recorded {
            stats: campaign.stats,
            status: campaign.status,
        })
    }
}

fn apply_customer_fields(customer: &mut Customer, input: &CustomerInput) {
    customer.email = input.email.clone();
    customer.name = input.name.clone();
    if let Some(last_active) = input.last_active {
        customer.last_active = last_active;
    }
    if let Some(total_spent) = input.total_spent {
        customer.total_spent = total_spent;
    }
    if let Some(visit_count) = input.visit_count {
        customer.visit_count = visit_count;
    }
    if let Some(order_count) = input.order_count {
        customer.order_count = order_count;
    }
    if let Some(days) = input.days_since_last_order {
        customer.days_since_last_order = days;
    }
}
