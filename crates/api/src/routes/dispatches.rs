//! Dispatch (despacho) endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{DispatchId, OrderId};
use domain::{Aggregate, Dispatch, DispatchStatus, ScheduleRequest};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateDispatchRequest {
    pub order_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDispatchesQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleDispatchRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub delivery_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub delivery_address: Option<String>,
    pub shipping_cost_cents: i64,
    pub total_amount_cents: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
}

impl From<&Dispatch> for DispatchResponse {
    fn from(dispatch: &Dispatch) -> Self {
        Self {
            id: dispatch.id().map(|id| id.to_string()).unwrap_or_default(),
            order_id: dispatch.order_id().map(|id| id.to_string()),
            status: dispatch.status().to_string(),
            delivery_address: dispatch.delivery_address().map(String::from),
            shipping_cost_cents: dispatch.shipping_cost().cents(),
            total_amount_cents: dispatch.total_amount().map(|m| m.cents()),
            scheduled_at: dispatch.scheduled_at(),
            shipped_at: dispatch.shipped_at(),
        }
    }
}

fn parse_status(raw: &str) -> Result<DispatchStatus, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}

/// POST /dispatches: open the dispatch of an order, or return the existing one.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &req.order_id)?;
    let dispatch = state.platform.dispatches.create(order_id).await?;
    Ok(Json(DispatchResponse::from(&dispatch)))
}

/// GET /dispatches
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDispatchesQuery>,
) -> Result<Json<Vec<DispatchResponse>>, ApiError> {
    let dispatches = match query.status.as_deref() {
        Some(raw) => {
            state
                .platform
                .dispatches
                .list_by_status(parse_status(raw)?)
                .await?
        }
        None => state.platform.dispatches.list().await?,
    };
    Ok(Json(dispatches.iter().map(DispatchResponse::from).collect()))
}

/// GET /dispatches/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let dispatch_id: DispatchId = parse_id("dispatch", &id)?;
    let dispatch = state.platform.dispatches.get(dispatch_id).await?;
    Ok(Json(DispatchResponse::from(&dispatch)))
}

/// GET /dispatches/by-order/{order_id}
#[tracing::instrument(skip(state))]
pub async fn get_by_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &order_id)?;
    let dispatch = state.platform.dispatches.get_by_order(order_id).await?;
    Ok(Json(DispatchResponse::from(&dispatch)))
}

/// PUT /dispatches/{id}/schedule: assign a dispatch date, address or status.
#[tracing::instrument(skip(state, req))]
pub async fn schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ScheduleDispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let dispatch_id: DispatchId = parse_id("dispatch", &id)?;
    let request = ScheduleRequest {
        scheduled_at: req.scheduled_at,
        status: req.status.as_deref().map(parse_status).transpose()?,
        delivery_address: req.delivery_address,
    };
    let dispatch = state.platform.dispatches.schedule(dispatch_id, request).await?;
    Ok(Json(DispatchResponse::from(&dispatch)))
}
