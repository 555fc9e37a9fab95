//! Order command inputs.

use common::ClientId;
use serde::{Deserialize, Serialize};

use super::{OrderLine, OrderStatus};

/// Request to place a new order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrder {
    /// Required; kept optional so a missing client is reported as a
    /// validation error rather than a decoding error.
    pub client_id: Option<ClientId>,
    pub lines: Vec<OrderLine>,
}

/// Status a caller asks an order to move to through a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusRequest {
    /// Move to a plain status.
    Set(OrderStatus),

    /// The order was charged outside the payment service ("cobrado"): mark it
    /// paid and announce it ready for dispatch.
    Charged,
}

impl StatusRequest {
    /// The status the order ends up in.
    pub fn target(&self) -> OrderStatus {
        match self {
            StatusRequest::Set(status) => *status,
            StatusRequest::Charged => OrderStatus::Paid,
        }
    }
}

impl std::str::FromStr for StatusRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cobrado" | "charged" => Ok(StatusRequest::Charged),
            other => other.parse().map(StatusRequest::Set),
        }
    }
}

/// Partial update of an order. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRevision {
    pub client_id: Option<ClientId>,
    pub lines: Option<Vec<OrderLine>>,
    pub status: Option<StatusRequest>,
}

impl OrderRevision {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none() && self.lines.is_none() && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charged_sentinel_parses() {
        assert_eq!(
            "cobrado".parse::<StatusRequest>().unwrap(),
            StatusRequest::Charged
        );
        assert_eq!(
            "Charged".parse::<StatusRequest>().unwrap(),
            StatusRequest::Charged
        );
        assert_eq!(StatusRequest::Charged.target(), OrderStatus::Paid);
    }

    #[test]
    fn plain_status_parses() {
        assert_eq!(
            "cancelled".parse::<StatusRequest>().unwrap(),
            StatusRequest::Set(OrderStatus::Cancelled)
        );
        assert!("bogus".parse::<StatusRequest>().is_err());
    }

    #[test]
    fn empty_revision() {
        assert!(OrderRevision::default().is_empty());
        let revision = OrderRevision {
            client_id: Some(ClientId::new(1)),
            ..Default::default()
        };
        assert!(!revision.is_empty());
    }
}
