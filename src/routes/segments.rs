//! Segment endpoints
//!
//! Segments are stored synchronously. Preview counts are evaluated by the
//! rule engine against the customer store and cached for a minute, keyed
//! by the canonical JSON of the rule set.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Segment, SegmentInput, SegmentMember};
use crate::segment::{self, RuleSet};
use crate::AppState;

const PREVIEW_CACHE_TTL: Duration = Duration::from_secs(60);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_segments).post(create_segment))
        .route("/preview", post(preview_segment))
        .route("/parse-query", post(parse_query))
        .route(
            "/:id",
            get(get_segment).put(update_segment).delete(delete_segment),
        )
}

async fn list_segments(State(state): State<AppState>) -> Json<Vec<Segment>> {
    Json(state.store.list_segments().await)
}

/// A segment with its computed member preview
#[derive(Debug, Serialize)]
struct SegmentDetail {
    #[serde(flatten)]
    segment: Segment,
    members: Vec<SegmentMember>,
}

async fn get_segment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SegmentDetail>, ApiError> {
    let mut segment = state
        .store
        .get_segment(id)
        .await
        .ok_or(ApiError::NotFound("Segment"))?;

    let predicate = segment::compile(&segment.rules);
    let members: Vec<SegmentMember> = state
        .store
        .customers_matching(&predicate)
        .await
        .into_iter()
        .map(|c| SegmentMember {
            id: c.id,
            name: c.name,
            email: c.email,
        })
        .collect();

    // Membership is computed on demand; refresh the denormalized count
    // while we have it.
    segment.customer_count = members.len() as u32;
    state.store.set_segment_count(id, segment.customer_count).await;

    Ok(Json(SegmentDetail { segment, members }))
}

async fn create_segment(
    State(state): State<AppState>,
    Json(input): Json<SegmentInput>,
) -> Result<(StatusCode, Json<Segment>), ApiError> {
    input.validate()?;
    let segment = state.store.insert_segment(&input).await;
    Ok((StatusCode::CREATED, Json(segment)))
}

async fn update_segment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(input): Json<SegmentInput>,
) -> Result<Json<Segment>, ApiError> {
    input.validate()?;
    state
        .store
        .update_segment(id, &input)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("Segment"))
}

async fn delete_segment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_segment(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Segment"))
    }
}

#[derive(Debug, Deserialize)]
struct PreviewRequest {
    rules: Option<RuleSet>,
}

async fn preview_segment(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rules = request
        .rules
        .ok_or_else(|| ApiError::invalid("rules", "Rules are required"))?;

    let cache_key = segment::preview_cache_key(&rules);
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(json!({ "count": cached })));
    }

    let predicate = segment::compile(&rules);
    let count = state.store.count_matching(&predicate).await;
    state
        .cache
        .set(&cache_key, json!(count), Some(PREVIEW_CACHE_TTL));
    Ok(Json(json!({ "count": count })))
}

#[derive(Debug, Deserialize)]
struct ParseQueryRequest {
    query: Option<String>,
}

async fn parse_query(
    State(state): State<AppState>,
    Json(request): Json<ParseQueryRequest>,
) -> Result<Json<RuleSet>, ApiError> {
    let query = request
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::invalid("query", "Query is required"))?;
    let rules = state.ai.parse_rules(&query).await?;
    Ok(Json(rules))
}
