//! Wiring of services, consumers and queues into one running saga.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{ClientId, Money, ProductId};
use domain::{
    Charge, CommandHandler, Dispatch, InMemoryRepository, Order, PostgresRepository, Repository,
    Shipment,
};
use messaging::{IdempotencyLedger, InMemoryBus, InMemoryLedger, MessageBus};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::collaborators::{
    ClientRecord, InMemoryClientDirectory, LocalDispatchLookup, LocalOrderLookup,
};
use crate::consumer::ConsumerWorker;
use crate::error::Result;
use crate::handlers::{
    DispatchHandler, InventoryHandler, MessageHandler, OrderHandler, ShipmentHandler,
};
use crate::notifier::{LogNotifier, Notifier};
use crate::outbound::OutboundPolicy;
use crate::services::{
    DispatchService, InMemoryInventory, OrderService, PaymentService, ShipmentService,
    SimulatedGateway,
};
use crate::topology;

/// One repository per state machine.
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn Repository<Order>>,
    pub charges: Arc<dyn Repository<Charge>>,
    pub dispatches: Arc<dyn Repository<Dispatch>>,
    pub shipments: Arc<dyn Repository<Shipment>>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryRepository::<Order>::new()),
            charges: Arc::new(InMemoryRepository::<Charge>::new()),
            dispatches: Arc::new(InMemoryRepository::<Dispatch>::new()),
            shipments: Arc::new(InMemoryRepository::<Shipment>::new()),
        }
    }

    /// Repositories over the shared `entities` table. Migrations must have run.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            orders: Arc::new(PostgresRepository::<Order>::new(pool.clone())),
            charges: Arc::new(PostgresRepository::<Charge>::new(pool.clone())),
            dispatches: Arc::new(PostgresRepository::<Dispatch>::new(pool.clone())),
            shipments: Arc::new(PostgresRepository::<Shipment>::new(pool)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SagaSettings {
    /// Timeout and retry for collaborator lookups.
    pub outbound: OutboundPolicy,

    /// Deliveries after which a retryable message is dead-lettered.
    pub max_deliveries: u32,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            outbound: OutboundPolicy::default(),
            max_deliveries: 5,
        }
    }
}

/// All services of the fulfillment saga on one bus.
///
/// The in-process collaborators are exposed so callers can load master data
/// and inject faults.
pub struct Platform {
    pub bus: InMemoryBus,
    pub ledger: Arc<dyn IdempotencyLedger>,
    pub clients: InMemoryClientDirectory,
    pub inventory: InMemoryInventory,
    pub gateway: SimulatedGateway,
    pub order_lookup: LocalOrderLookup,
    pub dispatch_lookup: LocalDispatchLookup,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub dispatches: Arc<DispatchService>,
    pub shipments: Arc<ShipmentService>,
    workers: Vec<ConsumerWorker>,
}

impl Platform {
    /// In-memory repositories and ledger, notices written to the log.
    pub async fn in_memory(settings: SagaSettings) -> Result<Self> {
        Self::new(
            Repositories::in_memory(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(LogNotifier),
            settings,
        )
        .await
    }

    pub async fn new(
        repositories: Repositories,
        ledger: Arc<dyn IdempotencyLedger>,
        notifier: Arc<dyn Notifier>,
        settings: SagaSettings,
    ) -> Result<Self> {
        let bus = InMemoryBus::new();
        topology::declare(&bus).await?;
        let shared_bus: Arc<dyn MessageBus> = Arc::new(bus.clone());

        let clients = InMemoryClientDirectory::new();
        let inventory = InMemoryInventory::new();
        let gateway = SimulatedGateway::new();

        let order_handler = CommandHandler::new(repositories.orders);
        let dispatch_handler = CommandHandler::new(repositories.dispatches);
        let order_lookup = LocalOrderLookup::new(order_handler.clone());
        let dispatch_lookup = LocalDispatchLookup::new(dispatch_handler.clone());

        let orders = Arc::new(OrderService::new(
            order_handler,
            Arc::new(clients.clone()),
            Arc::new(inventory.clone()),
            Arc::clone(&shared_bus),
            settings.outbound.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            CommandHandler::new(repositories.charges),
            Arc::new(order_lookup.clone()),
            Arc::new(dispatch_lookup.clone()),
            Arc::new(clients.clone()),
            Arc::new(gateway.clone()),
            Arc::clone(&shared_bus),
            &settings.outbound,
        ));
        let dispatches = Arc::new(DispatchService::new(
            dispatch_handler,
            Arc::new(order_lookup.clone()),
            Arc::new(clients.clone()),
            Arc::clone(&shared_bus),
            settings.outbound.clone(),
        ));
        let shipments = Arc::new(ShipmentService::new(
            CommandHandler::new(repositories.shipments),
            notifier,
            Arc::clone(&shared_bus),
        ));

        let order_consumer: Arc<dyn MessageHandler> = Arc::new(OrderHandler(Arc::clone(&orders)));
        let dispatch_consumer: Arc<dyn MessageHandler> =
            Arc::new(DispatchHandler(Arc::clone(&dispatches)));
        let shipment_consumer: Arc<dyn MessageHandler> =
            Arc::new(ShipmentHandler(Arc::clone(&shipments)));
        let inventory_consumer: Arc<dyn MessageHandler> =
            Arc::new(InventoryHandler(inventory.clone()));

        let routes = [
            (topology::DISPATCH_ORDER_CREATED, &dispatch_consumer),
            (topology::INVENTORY_ORDER_CREATED, &inventory_consumer),
            (topology::INVENTORY_STOCK_ADJUSTMENT, &inventory_consumer),
            (topology::ORDER_STATUS_CHANGED, &order_consumer),
            (topology::ORDER_PAYMENT_READY, &order_consumer),
            (topology::DISPATCH_PAYMENT_READY, &dispatch_consumer),
            (topology::SHIPMENT_DISPATCH_SCHEDULED, &shipment_consumer),
            (topology::DISPATCH_STATUS_CHANGED, &dispatch_consumer),
        ];
        let workers = routes
            .into_iter()
            .map(|(queue, handler)| {
                ConsumerWorker::new(
                    queue,
                    Arc::clone(&shared_bus),
                    Arc::clone(&ledger),
                    Arc::clone(handler),
                    settings.max_deliveries,
                )
            })
            .collect();

        Ok(Self {
            bus,
            ledger,
            clients,
            inventory,
            gateway,
            order_lookup,
            dispatch_lookup,
            orders,
            payments,
            dispatches,
            shipments,
            workers,
        })
    }

    pub fn workers(&self) -> &[ConsumerWorker] {
        &self.workers
    }

    /// Loads client 7 and product 10, the records the demo walkthrough uses.
    pub async fn seed_demo_catalog(&self) {
        self.clients
            .insert(ClientRecord {
                id: ClientId::new(7),
                name: "Demo Client".to_string(),
                address: Some("123 Main St".to_string()),
                contact_email: Some("client7@example.com".to_string()),
            })
            .await;
        self.inventory
            .insert_product(ProductId::new(10), 100, Money::from_cents(2000))
            .await;
        tracing::info!("demo catalog seeded");
    }

    /// Runs every consumer until a full pass over the queues settles nothing.
    /// Returns the number of deliveries settled.
    pub async fn settle(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let mut settled = 0;
            for worker in &self.workers {
                settled += worker.drain().await?;
            }
            if settled == 0 {
                return Ok(total);
            }
            total += settled;
        }
    }

    /// Starts one task per queue.
    pub fn spawn_consumers(
        &self,
        poll: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        self.workers
            .iter()
            .cloned()
            .map(|worker| tokio::spawn(worker.run(poll, shutdown.clone())))
            .collect()
    }

    /// Periodically ships prepared shipments whose date has arrived.
    pub fn spawn_shipment_sweeper(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let shipments = Arc::clone(&self.shipments);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = shipments.release_due(Utc::now()).await {
                            tracing::warn!(%error, "shipment sweep failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            tracing::info!("shipment sweeper stopped");
        })
    }
}
