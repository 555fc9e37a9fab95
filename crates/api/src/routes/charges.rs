//! Payment (charge) endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ChargeId, Money, OrderId};
use domain::{Aggregate, Charge};
use saga::ChargeRequest;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateChargeRequest {
    pub order_id: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub method: String,
}

#[derive(Debug, Deserialize)]
pub struct AmendChargeRequest {
    pub shipping_cost_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListChargesQuery {
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChargeResponse {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub method: String,
    pub currency: String,
    pub amount_cents: i64,
    pub shipping_cost_cents: i64,
    pub total_amount_cents: i64,
    pub transaction_id: Option<String>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub charged_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl From<&Charge> for ChargeResponse {
    fn from(charge: &Charge) -> Self {
        Self {
            id: charge.id().map(|id| id.to_string()).unwrap_or_default(),
            order_id: charge.order_id().map(|id| id.to_string()),
            status: charge.status().to_string(),
            method: charge.method().to_string(),
            currency: charge.currency().to_string(),
            amount_cents: charge.amount().cents(),
            shipping_cost_cents: charge.shipping_cost().cents(),
            total_amount_cents: charge.total_amount().cents(),
            transaction_id: charge.transaction_id().map(String::from),
            initiated_at: charge.initiated_at(),
            charged_at: charge.charged_at(),
            failure_reason: charge.failure_reason().map(String::from),
        }
    }
}

/// POST /charges: charge an order. Completes the payment step of the saga.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateChargeRequest>,
) -> Result<(StatusCode, Json<ChargeResponse>), ApiError> {
    let order_id: OrderId = parse_id("order", &req.order_id)?;
    let charge = state
        .platform
        .payments
        .charge(ChargeRequest {
            order_id,
            amount: Money::from_cents(req.amount_cents),
            method: req.method,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ChargeResponse::from(&charge))))
}

/// GET /charges?order_id=: every charge attempt for an order.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListChargesQuery>,
) -> Result<Json<Vec<ChargeResponse>>, ApiError> {
    let order_id: OrderId = parse_id("order", &query.order_id)?;
    let charges = state.platform.payments.list_by_order(order_id).await?;
    Ok(Json(charges.iter().map(ChargeResponse::from).collect()))
}

/// GET /charges/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let charge_id: ChargeId = parse_id("charge", &id)?;
    let charge = state.platform.payments.get(charge_id).await?;
    Ok(Json(ChargeResponse::from(&charge)))
}

/// PATCH /charges/{id}: correct the shipping cost.
#[tracing::instrument(skip(state, req))]
pub async fn amend(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AmendChargeRequest>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let charge_id: ChargeId = parse_id("charge", &id)?;
    let charge = state
        .platform
        .payments
        .amend(charge_id, Money::from_cents(req.shipping_cost_cents))
        .await?;
    Ok(Json(ChargeResponse::from(&charge)))
}
