//! Campaign endpoints
//!
//! Campaign creation stores a draft and publishes a dispatch request to
//! the `campaign_delivery` topic; the campaign worker sizes it against
//! its segment and moves it to `sending`. Delivery receipts come back
//! through `POST /:id/delivery-status` and are idempotent per customer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Campaign, CampaignInput, DeliveryStatus};
use crate::services::queue::CAMPAIGN_DELIVERY;
use crate::store::DeliveryOutcome;
use crate::worker;
use crate::AppState;

/// Most deliveries handed out per claim
const CLAIM_BATCH_SIZE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route("/suggest-messages", post(suggest_messages))
        .route(
            "/:id",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/:id/insights", get(campaign_insights))
        .route("/:id/deliveries/claim", post(claim_deliveries))
        .route("/:id/delivery-status", post(update_delivery_status))
}

async fn list_campaigns(State(state): State<AppState>) -> Json<Vec<Campaign>> {
    Json(state.store.list_campaigns().await)
}

async fn get_campaign(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .store
        .get_campaign(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("Campaign"))
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(input): Json<CampaignInput>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    input.validate()?;
    if state.store.get_segment(input.segment_id).await.is_none() {
        return Err(ApiError::invalid("segmentId", "Invalid segment ID"));
    }

    let campaign = state.store.insert_campaign(&input).await;

    // If the publish fails the draft record stays behind with no
    // rollback; the client sees a 500 and may retry the create.
    state.queue.publish(
        CAMPAIGN_DELIVERY,
        json!({ "type": "create", "campaignId": campaign.id }),
    )?;

    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn update_campaign(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(input): Json<CampaignInput>,
) -> Result<Json<Campaign>, ApiError> {
    input.validate()?;
    if state.store.get_segment(input.segment_id).await.is_none() {
        return Err(ApiError::invalid("segmentId", "Invalid segment ID"));
    }
    state
        .store
        .update_campaign(id, &input)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("Campaign"))
}

async fn delete_campaign(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_campaign(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Campaign"))
    }
}

async fn campaign_insights(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let campaign = state
        .store
        .get_campaign(id)
        .await
        .ok_or(ApiError::NotFound("Campaign"))?;
    let insights = state.ai.campaign_insights(&campaign.stats).await?;
    Ok(Json(json!({ "insights": insights })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestMessagesRequest {
    objective: Option<String>,
    audience_description: Option<String>,
}

async fn suggest_messages(
    State(state): State<AppState>,
    Json(request): Json<SuggestMessagesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (Some(objective), Some(audience)) = (request.objective, request.audience_description)
    else {
        return Err(ApiError::invalid(
            "objective",
            "Objective and audience description are required",
        ));
    };
    let variants = state.ai.suggest_messages(&objective, &audience).await?;
    Ok(Json(json!({ "variants": variants })))
}

/// Hand a batch of staged deliveries to the messaging relay. Claims are
/// destructive: a claimed delivery is no longer in the outbox, and its
/// receipt is expected back through the delivery-status endpoint.
async fn claim_deliveries(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.store.get_campaign(id).await.is_none() {
        return Err(ApiError::NotFound("Campaign"));
    }
    let deliveries = state.cache.pop_batch(&worker::outbox_key(id), CLAIM_BATCH_SIZE);
    Ok(Json(json!({ "deliveries": deliveries })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryStatusRequest {
    status: DeliveryStatus,
    customer_id: Uuid,
}

async fn update_delivery_status(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<DeliveryStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .store
        .record_delivery(id, request.customer_id, request.status)
        .await
        .ok_or(ApiError::NotFound("Campaign"))?;

    match outcome {
        DeliveryOutcome::Recorded { stats, status } => Ok(Json(json!({
            "message": "Delivery status updated",
            "duplicate": false,
            "stats": stats,
            "status": status,
        }))),
        DeliveryOutcome::Duplicate { stats, status } => Ok(Json(json!({
            "message": "Delivery status already recorded",
            "duplicate": true,
            "stats": stats,
            "status": status,
        }))),
        DeliveryOutcome::NotSending => Err(ApiError::invalid(
            "status",
            "Campaign is not currently sending",
        )),
    }
}
