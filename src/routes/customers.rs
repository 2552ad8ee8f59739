//! Customer endpoints
//!
//! Reads hit the store directly; writes are accepted with `202` and
//! published to the `customer_data` topic for the background consumer to
//! apply. A `202` therefore only acknowledges the intent, not that the
//! record exists yet.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Customer, CustomerInput, Mutation};
use crate::services::queue::CUSTOMER_DATA;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route(
            "/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
}

async fn list_customers(State(state): State<AppState>) -> Json<Vec<Customer>> {
    Json(state.store.list_customers(100).await)
}

async fn get_customer(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Customer>, ApiError> {
    state
        .store
        .get_customer(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("Customer"))
}

async fn create_customer(
    State(state): State<AppState>,
    Json(input): Json<CustomerInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    input.validate()?;
    state.queue.publish_json(
        CUSTOMER_DATA,
        &Mutation::Create {
            data: serde_json::to_value(&input).map_err(|e| ApiError::Internal(e.to_string()))?,
        },
    )?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Customer data accepted for processing" })),
    ))
}

async fn update_customer(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(input): Json<CustomerInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    input.validate()?;
    state.queue.publish_json(
        CUSTOMER_DATA,
        &Mutation::Update {
            id,
            data: serde_json::to_value(&input).map_err(|e| ApiError::Internal(e.to_string()))?,
        },
    )?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Customer update accepted for processing" })),
    ))
}

async fn delete_customer(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state
        .queue
        .publish_json(CUSTOMER_DATA, &Mutation::Delete { id })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Customer deletion accepted for processing" })),
    ))
}
