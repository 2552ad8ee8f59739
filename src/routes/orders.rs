//! Order endpoints
//!
//! Same async write path as customers, over the `order_data` topic.
//! Completed orders feed the customer behavioral aggregates when the
//! consumer applies them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Mutation, Order, OrderInput};
use crate::services::queue::ORDER_DATA;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).put(update_order).delete(delete_order))
}

async fn list_orders(State(state): State<AppState>) -> Json<Vec<Order>> {
    Json(state.store.list_orders(100).await)
}

async fn get_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Order>, ApiError> {
    state
        .store
        .get_order(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("Order"))
}

async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<OrderInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    input.validate()?;
    state.queue.publish_json(
        ORDER_DATA,
        &Mutation::Create {
            data: serde_json::to_value(&input).map_err(|e| ApiError::Internal(e.to_string()))?,
        },
    )?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Order data accepted for processing" })),
    ))
}

async fn update_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(input): Json<OrderInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    input.validate()?;
    state.queue.publish_json(
        ORDER_DATA,
        &Mutation::Update {
            id,
            data: serde_json::to_value(&input).map_err(|e| ApiError::Internal(e.to_string()))?,
        },
    )?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Order update accepted for processing" })),
    ))
}

async fn delete_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state
        .queue
        .publish_json(ORDER_DATA, &Mutation::Delete { id })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Order deletion accepted for processing" })),
    ))
}
