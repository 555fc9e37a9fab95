//! Choreographed order-fulfillment saga.
//!
//! No component owns the whole lifecycle. Each service keeps its own state
//! machine, reacts to the events of the others and announces its own changes:
//!
//! ```text
//! order ──OrderCreated──────────▶ dispatch (pending), inventory
//!       ──StockAdjustment───────▶ inventory (reserve / release)
//! payment ──OrderStatusChanged──▶ order (paid)
//!         ──PaymentReady────────▶ order (paid), dispatch (ready to ship)
//! dispatch ──DispatchScheduled──▶ shipment (prepare, ship when due)
//! shipment ──DispatchStatusChanged▶ dispatch (shipped)
//! ```
//!
//! Consumers are at-least-once: every handler is an idempotent transition,
//! duplicates are dropped through the idempotency ledger, and a failed
//! handler settles its message according to [`SagaError::disposition`].

pub mod collaborators;
pub mod consumer;
pub mod error;
pub mod handlers;
pub mod notifier;
pub mod outbound;
pub mod platform;
pub mod services;
pub mod topology;

pub use collaborators::{
    ClientDirectory, ClientRecord, CollaboratorError, DispatchLookup, DispatchRecord,
    InMemoryClientDirectory, LocalDispatchLookup, LocalOrderLookup, OrderLookup, OrderRecord,
    ProductCatalog, ProductRecord,
};
pub use consumer::{ConsumeOutcome, ConsumerWorker};
pub use error::{Disposition, Result, SagaError};
pub use handlers::MessageHandler;
pub use notifier::{LogNotifier, Notifier, RecordingNotifier, ShipmentNotice};
pub use outbound::OutboundPolicy;
pub use platform::{Platform, Repositories, SagaSettings};
pub use services::{
    ChargeRequest, DispatchService, GatewayError, InMemoryInventory, OrderService, PaymentGateway,
    PaymentService, ShipmentService, SimulatedGateway,
};
