//! Messaging layer shared by the saga services.
//!
//! The broker itself is an external dependency; [`MessageBus`] is the contract the
//! services program against and [`InMemoryBus`] reproduces the broker semantics the
//! saga relies on: routing-key fan-out, independent queues, at-least-once delivery
//! with ack/nack, and dead-lettering.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod query;

pub use bus::{
    DeadLetter, Delivery, DeliveryTag, EnvelopeStream, MessageBus, MessageBusExt, MessageLog,
    routing_matches,
};
pub use envelope::{Envelope, EnvelopeBuilder, MessageId, SCHEMA_VERSION};
pub use error::{BusError, Result};
pub use ledger::{IdempotencyLedger, InMemoryLedger};
pub use memory::InMemoryBus;
pub use postgres::PostgresLedger;
pub use query::MessageQuery;
