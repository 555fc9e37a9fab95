//! Order endpoints and the fulfillment read model.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ClientId, OrderId};
use domain::{
    Aggregate, NewOrder, Order, OrderLine, OrderRevision, OrderStatus, StatusRequest,
};
use projections::OrderFulfillment;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: u64,
    pub quantity: u32,
}

impl From<&OrderLineRequest> for OrderLine {
    fn from(line: &OrderLineRequest) -> Self {
        OrderLine::new(line.product_id, line.quantity)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub client_id: Option<u64>,
    #[serde(default)]
    pub lines: Vec<OrderLineRequest>,
}

/// Partial update. `status` accepts an order status or the "cobrado" /
/// "charged" marker for orders paid outside the payment service.
#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub client_id: Option<u64>,
    pub lines: Option<Vec<OrderLineRequest>>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub client_id: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CountOrdersQuery {
    pub client_id: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderQuery {
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderLineResponse {
    pub product_id: u64,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub client_id: Option<u64>,
    pub status: String,
    pub lines: Vec<OrderLineResponse>,
    pub total_quantity: u64,
    pub placed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().map(|id| id.to_string()).unwrap_or_default(),
            client_id: order.client_id().map(|c| c.value()),
            status: order.status().to_string(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.value(),
                    quantity: line.quantity,
                })
                .collect(),
            total_quantity: order.total_quantity(),
            placed_at: order.placed_at(),
            paid_at: order.paid_at(),
            cancellation_reason: order.cancellation_reason().map(String::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderCountResponse {
    pub client_id: u64,
    pub count: usize,
}

// -- Handlers --

/// POST /orders: place an order and announce it to the saga.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .platform
        .orders
        .create(NewOrder {
            client_id: req.client_id.map(ClientId::new),
            lines: req.lines.iter().map(OrderLine::from).collect(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: every order, or those of one client or in one status.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.platform.orders.as_ref();
    let found = match (query.client_id, query.status) {
        (Some(client_id), None) => orders.list_by_client(ClientId::new(client_id)).await?,
        (None, Some(status)) => {
            let status: OrderStatus = status.parse().map_err(ApiError::BadRequest)?;
            orders.list_by_status(status).await?
        }
        (Some(client_id), Some(status)) => {
            let status: OrderStatus = status.parse().map_err(ApiError::BadRequest)?;
            orders
                .list_by_client(ClientId::new(client_id))
                .await?
                .into_iter()
                .filter(|o| o.status() == status)
                .collect()
        }
        (None, None) => orders.list().await?,
    };

    Ok(Json(found.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/count?client_id=: number of orders a client has placed.
#[tracing::instrument(skip(state))]
pub async fn count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CountOrdersQuery>,
) -> Result<Json<OrderCountResponse>, ApiError> {
    let count = state
        .platform
        .orders
        .count_by_client(ClientId::new(query.client_id))
        .await?;
    Ok(Json(OrderCountResponse {
        client_id: query.client_id,
        count,
    }))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.platform.orders.get(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}: change client, lines or status.
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let status = req
        .status
        .as_deref()
        .map(str::parse::<StatusRequest>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let revision = OrderRevision {
        client_id: req.client_id.map(ClientId::new),
        lines: req
            .lines
            .as_ref()
            .map(|lines| lines.iter().map(OrderLine::from).collect()),
        status,
    };
    let order = state.platform.orders.update(order_id, revision).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel: cancel an unpaid order and release its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<CancelOrderQuery>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let reason = query.reason.as_deref().unwrap_or("cancelled by request");
    let order = state.platform.orders.cancel(order_id, reason).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/{id}/fulfillment: milestones seen on the bus for this order.
#[tracing::instrument(skip(state))]
pub async fn fulfillment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderFulfillment>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;

    // Run catch-up to ensure the read model includes the latest messages
    state.projection_processor.run_catch_up().await?;

    state
        .fulfillment
        .get(order_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No fulfillment record for order {id}")))
}
