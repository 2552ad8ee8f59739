//! Domain models and request payloads
//!
//! Wire format is camelCase JSON throughout, matching the admin UI's
//! expectations. Input types carry their own field-level validation; the
//! queue payload schema (`Mutation`) is shared by the HTTP producers and
//! the background consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, FieldError};
use crate::segment::RuleSet;

// ============ Customers ============

/// An end customer with behavioral aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub last_active: DateTime<Utc>,
    pub total_spent: f64,
    pub visit_count: u32,
    pub order_count: u32,
    pub days_since_last_order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer create/update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    pub email: String,
    pub name: String,
    pub last_active: Option<DateTime<Utc>>,
    pub total_spent: Option<f64>,
    pub visit_count: Option<u32>,
    pub order_count: Option<u32>,
    pub days_since_last_order: Option<u32>,
}

impl CustomerInput {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        if !self.email.contains('@') {
            errors.push(FieldError::new("email", "Invalid email format"));
        }
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
        if let Some(spent) = self.total_spent {
            if spent < 0.0 {
                errors.push(FieldError::new("totalSpent", "Total spent must be non-negative"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

// ============ Orders ============

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

/// A customer order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order create/update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    pub customer_id: Uuid,
    pub amount: f64,
    pub status: Option<OrderStatus>,
}

impl OrderInput {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.amount < 0.0 {
            return Err(ApiError::invalid("amount", "Amount must be non-negative"));
        }
        Ok(())
    }
}

// ============ Segments ============

/// A named customer filter defined by a rule tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rules: RuleSet,
    /// Denormalized match count, refreshed on evaluation
    pub customer_count: u32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Segment create/update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInput {
    pub name: String,
    pub description: Option<String>,
    pub rules: RuleSet,
    pub created_by: String,
}

impl SegmentInput {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
        if self.created_by.trim().is_empty() {
            errors.push(FieldError::new("createdBy", "Creator ID is required"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

/// Member preview returned with a single segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMember {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

// ============ Campaigns ============

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Completed,
    Failed,
}

/// Delivery counters; `sent + failed + pending == total` always holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total: u32,
    pub sent: u32,
    pub failed: u32,
    pub pending: u32,
}

/// A message send against a segment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub segment_id: Uuid,
    pub status: CampaignStatus,
    pub message: String,
    pub stats: CampaignStats,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Campaign create/update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignInput {
    pub name: String,
    pub description: Option<String>,
    pub segment_id: Uuid,
    pub message: String,
    pub created_by: String,
}

impl CampaignInput {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
        if self.message.trim().is_empty() {
            errors.push(FieldError::new("message", "Message is required"));
        }
        if self.created_by.trim().is_empty() {
            errors.push(FieldError::new("createdBy", "Creator ID is required"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

/// Delivery receipt outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

// ============ Queue payloads ============

/// Mutation intent published to the queue by the write endpoints
///
/// Wire schema: `{"type": "create"|"update"|"delete", "id"?, "data"?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mutation {
    Create { data: Value },
    Update { id: Uuid, data: Value },
    Delete { id: Uuid },
}
