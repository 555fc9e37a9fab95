//! Charge aggregate implementation.

use chrono::{DateTime, Utc};
use common::{ChargeId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::repository::Version;

use super::{
    ChargeError, ChargeEvent, ChargeStatus,
    events::{ChargeCompletedData, ChargeFailedData, ChargeInitiatedData, ShippingCostAmendedData},
};

/// Inputs fixed when a charge is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeTerms {
    pub order_id: OrderId,
    pub amount: Money,
    pub shipping_cost: Money,
    pub method: String,
}

/// Charge aggregate root.
///
/// At most one charge per order may be pending or completed at a time; the
/// repository enforces this through [`Aggregate::unique_key`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Charge {
    id: Option<ChargeId>,

    #[serde(default)]
    version: Version,

    order_id: Option<OrderId>,

    status: ChargeStatus,

    amount: Money,

    shipping_cost: Money,

    /// `amount + shipping_cost`, fixed at initiation and only recomputed by an amendment.
    total_amount: Money,

    method: String,

    currency: String,

    transaction_id: Option<String>,

    initiated_at: Option<DateTime<Utc>>,

    charged_at: Option<DateTime<Utc>>,

    failure_reason: Option<String>,
}

impl Aggregate for Charge {
    type Id = ChargeId;
    type Event = ChargeEvent;
    type Error = ChargeError;

    fn aggregate_type() -> &'static str {
        "Charge"
    }

    fn id(&self) -> Option<ChargeId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ChargeEvent::ChargeInitiated(data) => {
                self.id = Some(data.charge_id);
                self.order_id = Some(data.order_id);
                self.amount = data.amount;
                self.shipping_cost = data.shipping_cost;
                self.total_amount = data.total_amount;
                self.method = data.method;
                self.currency = data.currency;
                self.initiated_at = Some(data.initiated_at);
                self.status = ChargeStatus::Pending;
            }
            ChargeEvent::ChargeCompleted(data) => {
                self.status = ChargeStatus::Completed;
                self.transaction_id = Some(data.transaction_id);
                self.charged_at = Some(data.completed_at);
            }
            ChargeEvent::ChargeFailed(data) => {
                self.status = ChargeStatus::Failed;
                self.failure_reason = Some(data.reason);
            }
            ChargeEvent::ShippingCostAmended(data) => {
                self.shipping_cost = data.shipping_cost;
                self.total_amount = data.total_amount;
            }
        }
    }

    fn unique_key(&self) -> Option<String> {
        match self.order_id {
            Some(order_id) if self.status.holds_order() => Some(Self::order_key(order_id)),
            _ => None,
        }
    }
}

// Query methods
impl Charge {
    /// Unique key a live charge holds for its order.
    pub fn order_key(order_id: OrderId) -> String {
        format!("order:{order_id}")
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> ChargeStatus {
        self.status
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn initiated_at(&self) -> Option<DateTime<Utc>> {
        self.initiated_at
    }

    pub fn charged_at(&self) -> Option<DateTime<Utc>> {
        self.charged_at
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

// Command methods (return events)
impl Charge {
    /// Opens a pending charge. The total is computed here, once.
    pub fn initiate(
        &self,
        charge_id: ChargeId,
        terms: &ChargeTerms,
    ) -> Result<Vec<ChargeEvent>, ChargeError> {
        if self.id.is_some() {
            return Err(ChargeError::AlreadyInitiated);
        }
        if !terms.amount.is_positive() {
            return Err(ChargeError::InvalidAmount(terms.amount));
        }
        if terms.shipping_cost.is_negative() {
            return Err(ChargeError::InvalidShippingCost(terms.shipping_cost));
        }
        if terms.method.trim().is_empty() {
            return Err(ChargeError::MethodRequired);
        }

        Ok(vec![ChargeEvent::ChargeInitiated(ChargeInitiatedData {
            charge_id,
            order_id: terms.order_id,
            amount: terms.amount,
            shipping_cost: terms.shipping_cost,
            total_amount: terms.amount + terms.shipping_cost,
            method: terms.method.trim().to_string(),
            currency: Money::CURRENCY.to_string(),
            initiated_at: Utc::now(),
        })])
    }

    pub fn complete(&self, transaction_id: impl Into<String>) -> Result<Vec<ChargeEvent>, ChargeError> {
        let transaction_id = transaction_id.into();
        if self.status == ChargeStatus::Completed
            && self.transaction_id.as_deref() == Some(transaction_id.as_str())
        {
            return Ok(vec![]);
        }
        if !self.status.can_complete() {
            return Err(ChargeError::InvalidStateTransition {
                current_status: self.status,
                action: "complete",
            });
        }
        Ok(vec![ChargeEvent::ChargeCompleted(ChargeCompletedData {
            transaction_id,
            completed_at: Utc::now(),
        })])
    }

    pub fn fail(&self, reason: impl Into<String>) -> Result<Vec<ChargeEvent>, ChargeError> {
        if self.status == ChargeStatus::Failed {
            return Ok(vec![]);
        }
        if !self.status.can_fail() {
            return Err(ChargeError::InvalidStateTransition {
                current_status: self.status,
                action: "fail",
            });
        }
        Ok(vec![ChargeEvent::ChargeFailed(ChargeFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })])
    }

    /// Corrects the shipping cost and recomputes the total.
    pub fn amend_shipping_cost(&self, shipping_cost: Money) -> Result<Vec<ChargeEvent>, ChargeError> {
        if shipping_cost.is_negative() {
            return Err(ChargeError::InvalidShippingCost(shipping_cost));
        }
        if !self.status.can_amend() {
            return Err(ChargeError::InvalidStateTransition {
                current_status: self.status,
                action: "amend",
            });
        }
        if shipping_cost == self.shipping_cost {
            return Ok(vec![]);
        }
        Ok(vec![ChargeEvent::ShippingCostAmended(ShippingCostAmendedData {
            previous: self.shipping_cost,
            shipping_cost,
            total_amount: self.amount + shipping_cost,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(order_id: OrderId) -> ChargeTerms {
        ChargeTerms {
            order_id,
            amount: Money::from_cents(4000),
            shipping_cost: Money::from_cents(2050),
            method: "card".to_string(),
        }
    }

    fn pending_charge() -> Charge {
        let mut charge = Charge::default();
        let events = charge.initiate(ChargeId::new(), &terms(OrderId::new())).unwrap();
        charge.apply_events(events);
        charge
    }

    #[test]
    fn test_initiate_computes_total_once() {
        let charge = pending_charge();
        assert_eq!(charge.status(), ChargeStatus::Pending);
        assert_eq!(charge.total_amount().cents(), 6050);
        assert_eq!(charge.currency(), "USD");
    }

    #[test]
    fn test_initiate_validates_terms() {
        let order_id = OrderId::new();
        let mut bad = terms(order_id);
        bad.amount = Money::zero();
        assert!(matches!(
            Charge::default().initiate(ChargeId::new(), &bad),
            Err(ChargeError::InvalidAmount(_))
        ));

        let mut bad = terms(order_id);
        bad.method = "  ".to_string();
        assert!(matches!(
            Charge::default().initiate(ChargeId::new(), &bad),
            Err(ChargeError::MethodRequired)
        ));
    }

    #[test]
    fn test_pending_and_completed_charges_hold_the_order_key() {
        let mut charge = pending_charge();
        let key = Charge::order_key(charge.order_id().unwrap());
        assert_eq!(charge.unique_key(), Some(key.clone()));

        let events = charge.complete("TXN-1").unwrap();
        charge.apply_events(events);
        assert_eq!(charge.unique_key(), Some(key));
    }

    #[test]
    fn test_failed_charge_releases_the_order_key() {
        let mut charge = pending_charge();
        let events = charge.fail("declined").unwrap();
        charge.apply_events(events);

        assert_eq!(charge.status(), ChargeStatus::Failed);
        assert_eq!(charge.unique_key(), None);
        assert_eq!(charge.failure_reason(), Some("declined"));
    }

    #[test]
    fn test_complete_is_idempotent_for_same_transaction() {
        let mut charge = pending_charge();
        let events = charge.complete("TXN-1").unwrap();
        charge.apply_events(events);

        assert!(charge.complete("TXN-1").unwrap().is_empty());
        assert!(charge.complete("TXN-2").is_err());
        assert!(charge.fail("late").is_err());
    }

    #[test]
    fn test_amend_recomputes_total() {
        let mut charge = pending_charge();
        let events = charge.amend_shipping_cost(Money::from_cents(1000)).unwrap();
        charge.apply_events(events);

        assert_eq!(charge.shipping_cost().cents(), 1000);
        assert_eq!(charge.total_amount().cents(), 5000);
        assert!(charge.amend_shipping_cost(Money::from_cents(1000)).unwrap().is_empty());
        assert!(charge.amend_shipping_cost(Money::from_cents(-1)).is_err());
    }
}
