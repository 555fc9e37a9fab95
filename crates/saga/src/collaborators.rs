//! Synchronous lookups the saga makes against other services.
//!
//! Each collaborator is a plain request/response lookup with no side effect.
//! The records here are immutable views of another service's data; they
//! never leak into the aggregates except as copied values.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ClientId, DispatchId, Money, OrderId, ProductId};
use domain::{Aggregate, CommandHandler, Dispatch, DispatchStatus, Order, OrderLine, OrderStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Failure of a collaborator lookup. Absence and unreachability are distinct.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("{collaborator} did not answer within {after_ms}ms")]
    Timeout {
        collaborator: &'static str,
        after_ms: u64,
    },
}

impl CollaboratorError {
    /// Returns true if asking again later may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CollaboratorError::NotFound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    pub address: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub stock: i64,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub client_id: ClientId,
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
}

impl OrderRecord {
    pub fn total_quantity(&self) -> u64 {
        domain::order::total_quantity(&self.lines)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: DispatchId,
    pub order_id: OrderId,
    pub status: DispatchStatus,
}

/// `GetClient(id)`.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn get_client(&self, id: ClientId) -> Result<ClientRecord, CollaboratorError>;
}

/// `GetProduct(id)`.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<ProductRecord, CollaboratorError>;
}

/// `GetOrder(id)`.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<OrderRecord, CollaboratorError>;
}

/// `GetDispatchByOrderId(orderId)`.
#[async_trait]
pub trait DispatchLookup: Send + Sync {
    async fn get_dispatch_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<DispatchRecord, CollaboratorError>;
}

/// Fault injection shared by the in-process collaborators.
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    unavailable: bool,
    latency: Option<Duration>,
}

impl Faults {
    async fn check(&self, collaborator: &'static str) -> Result<(), CollaboratorError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable {
            return Err(CollaboratorError::Unavailable {
                collaborator,
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    clients: HashMap<ClientId, ClientRecord>,
    faults: Faults,
}

/// In-memory client master data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClientDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, client: ClientRecord) {
        self.state.write().await.clients.insert(client.id, client);
    }

    /// Makes every lookup fail as if the client service were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.faults.unavailable = unavailable;
    }

    /// Delays every lookup, to exercise caller timeouts.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().await.faults.latency = latency;
    }
}

#[async_trait]
impl ClientDirectory for InMemoryClientDirectory {
    async fn get_client(&self, id: ClientId) -> Result<ClientRecord, CollaboratorError> {
        let (faults, client) = {
            let state = self.state.read().await;
            (state.faults, state.clients.get(&id).cloned())
        };
        faults.check("clients").await?;
        client.ok_or_else(|| CollaboratorError::NotFound {
            resource: "Client",
            id: id.to_string(),
        })
    }
}

/// `GetOrder` served from the order service's own repository.
#[derive(Clone)]
pub struct LocalOrderLookup {
    orders: CommandHandler<Order>,
    faults: Arc<RwLock<Faults>>,
}

impl LocalOrderLookup {
    pub fn new(orders: CommandHandler<Order>) -> Self {
        Self {
            orders,
            faults: Arc::default(),
        }
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.faults.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl OrderLookup for LocalOrderLookup {
    async fn get_order(&self, id: OrderId) -> Result<OrderRecord, CollaboratorError> {
        let faults = *self.faults.read().await;
        faults.check("orders").await?;
        let order = self
            .orders
            .load(id)
            .await
            .map_err(|e| CollaboratorError::Unavailable {
                collaborator: "orders",
                reason: e.to_string(),
            })?
            .ok_or_else(|| CollaboratorError::NotFound {
                resource: "Order",
                id: id.to_string(),
            })?;

        Ok(OrderRecord {
            id,
            client_id: order.client_id().ok_or_else(|| CollaboratorError::NotFound {
                resource: "Order",
                id: id.to_string(),
            })?,
            lines: order.lines().to_vec(),
            status: order.status(),
        })
    }
}

/// `GetDispatchByOrderId` served from the dispatch service's own repository.
#[derive(Clone)]
pub struct LocalDispatchLookup {
    dispatches: CommandHandler<Dispatch>,
    faults: Arc<RwLock<Faults>>,
}

impl LocalDispatchLookup {
    pub fn new(dispatches: CommandHandler<Dispatch>) -> Self {
        Self {
            dispatches,
            faults: Arc::default(),
        }
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.faults.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl DispatchLookup for LocalDispatchLookup {
    async fn get_dispatch_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<DispatchRecord, CollaboratorError> {
        let faults = *self.faults.read().await;
        faults.check("dispatches").await?;
        let not_found = || CollaboratorError::NotFound {
            resource: "Dispatch",
            id: order_id.to_string(),
        };

        let dispatch = self
            .dispatches
            .find_by_unique_key(&Dispatch::order_key(order_id))
            .await
            .map_err(|e| CollaboratorError::Unavailable {
                collaborator: "dispatches",
                reason: e.to_string(),
            })?
            .ok_or_else(not_found)?;

        Ok(DispatchRecord {
            id: dispatch.id().ok_or_else(not_found)?,
            order_id,
            status: dispatch.status(),
        })
    }
}
