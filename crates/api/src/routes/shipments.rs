//! Shipment (envio) endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{DispatchId, ShipmentId};
use domain::{Aggregate, Shipment};
use serde::Serialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ShipmentResponse {
    pub id: String,
    pub dispatch_id: Option<String>,
    pub order_id: Option<String>,
    pub status: String,
    pub delivery_address: String,
    pub contact_email: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<&Shipment> for ShipmentResponse {
    fn from(shipment: &Shipment) -> Self {
        Self {
            id: shipment.id().map(|id| id.to_string()).unwrap_or_default(),
            dispatch_id: shipment.dispatch_id().map(|id| id.to_string()),
            order_id: shipment.order_id().map(|id| id.to_string()),
            status: shipment.status().to_string(),
            delivery_address: shipment.delivery_address().to_string(),
            contact_email: shipment.contact_email().to_string(),
            scheduled_at: shipment.scheduled_at(),
            shipped_at: shipment.shipped_at(),
            delivered_at: shipment.delivered_at(),
        }
    }
}

/// GET /shipments/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    let shipment_id: ShipmentId = parse_id("shipment", &id)?;
    let shipment = state.platform.shipments.get(shipment_id).await?;
    Ok(Json(ShipmentResponse::from(&shipment)))
}

/// GET /shipments/by-dispatch/{dispatch_id}
#[tracing::instrument(skip(state))]
pub async fn get_by_dispatch(
    State(state): State<Arc<AppState>>,
    Path(dispatch_id): Path<String>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    let dispatch_id: DispatchId = parse_id("dispatch", &dispatch_id)?;
    let shipment = state.platform.shipments.find_by_dispatch(dispatch_id).await?;
    Ok(Json(ShipmentResponse::from(&shipment)))
}

/// POST /shipments/{id}/deliver: record the delivery. Nothing is announced.
#[tracing::instrument(skip(state))]
pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    let shipment_id: ShipmentId = parse_id("shipment", &id)?;
    let shipment = state.platform.shipments.mark_delivered(shipment_id).await?;
    Ok(Json(ShipmentResponse::from(&shipment)))
}
