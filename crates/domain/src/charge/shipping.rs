//! Shipping cost rule.
//!
//! Flat rate per unit plus a surcharge per character of the delivery
//! address. Amounts are exact in cents, so the result is reproducible
//! across services and runs.

use common::Money;

/// Charged per unit shipped ($5.00).
pub const BASE_PER_ITEM: Money = Money::from_cents(500);

/// Charged per character of the delivery address ($0.50).
pub const PER_ADDRESS_CHAR: Money = Money::from_cents(50);

/// Placeholder used when the client has no address on file.
pub const UNSPECIFIED_ADDRESS: &str = "address not specified";

/// Computes the shipping cost for `total_quantity` units sent to `delivery_address`.
///
/// Address length is counted in characters, not bytes.
pub fn shipping_cost(total_quantity: u64, delivery_address: &str) -> Money {
    let address_len = delivery_address.chars().count() as u64;
    BASE_PER_ITEM.multiply(total_quantity) + PER_ADDRESS_CHAR.multiply(address_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_for_three_items_to_main_street() {
        // 5.0 * 3 + 0.5 * 11
        let cost = shipping_cost(3, "123 Main St");
        assert_eq!(cost.cents(), 2050);
        assert_eq!(cost.as_major(), 20.5);
    }

    #[test]
    fn cost_is_deterministic() {
        assert_eq!(shipping_cost(2, "Av. Siempre Viva 742"), shipping_cost(2, "Av. Siempre Viva 742"));
    }

    #[test]
    fn address_counts_characters_not_bytes() {
        assert_eq!(shipping_cost(0, "Añil").cents(), 200);
    }

    #[test]
    fn empty_order_only_pays_for_address() {
        assert_eq!(shipping_cost(0, "").cents(), 0);
        assert_eq!(shipping_cost(1, "").cents(), 500);
    }
}
