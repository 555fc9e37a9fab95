//! Stock bookkeeping behind the reserve/release contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId};
use domain::StockAdjustment;
use messaging::MessageId;
use tokio::sync::RwLock;

use crate::collaborators::{CollaboratorError, ProductCatalog, ProductRecord};
use crate::error::{Result, SagaError};

#[derive(Debug, Default)]
struct InventoryState {
    products: HashMap<ProductId, ProductRecord>,
    applied: HashSet<MessageId>,
    unavailable: bool,
}

/// In-memory product catalog and stock ledger.
///
/// Serves `GetProduct` to the order service and applies the stock
/// adjustments the order service publishes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, id: ProductId, stock: i64, price: Money) {
        self.state
            .write()
            .await
            .products
            .insert(id, ProductRecord { id, stock, price });
    }

    /// Makes product lookups fail as if the product service were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    pub async fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.state.read().await.products.get(&id).map(|p| p.stock)
    }

    /// Applies every line of an adjustment or none of them.
    ///
    /// Returns false if the message was applied before. A decrement below
    /// zero rejects the whole adjustment.
    #[tracing::instrument(skip(self, adjustment), fields(order_id = %adjustment.order_id))]
    pub async fn apply_adjustment(
        &self,
        message_id: MessageId,
        adjustment: &StockAdjustment,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.applied.contains(&message_id) {
            tracing::debug!(%message_id, "stock adjustment already applied");
            return Ok(false);
        }

        let mut next: HashMap<ProductId, i64> = HashMap::new();
        for line in &adjustment.lines {
            let current = match next.get(&line.product_id) {
                Some(stock) => *stock,
                None => {
                    state
                        .products
                        .get(&line.product_id)
                        .ok_or_else(|| SagaError::not_found("Product", line.product_id))?
                        .stock
                }
            };
            let updated = current + line.quantity_delta;
            if updated < 0 {
                return Err(SagaError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity_delta.unsigned_abs(),
                    available: current,
                });
            }
            next.insert(line.product_id, updated);
        }

        for (product_id, stock) in next {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock = stock;
            }
        }
        state.applied.insert(message_id);

        metrics::counter!("stock_adjustments_applied_total").increment(1);
        tracing::info!(%message_id, lines = adjustment.lines.len(), "stock adjusted");
        Ok(true)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryInventory {
    async fn get_product(&self, id: ProductId) -> std::result::Result<ProductRecord, CollaboratorError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(CollaboratorError::Unavailable {
                collaborator: "products",
                reason: "connection refused".to_string(),
            });
        }
        state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound {
                resource: "Product",
                id: id.to_string(),
            })
    }
}
