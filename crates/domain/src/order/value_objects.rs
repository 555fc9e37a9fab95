//! Value objects for the order domain.

use std::collections::BTreeMap;

use common::ProductId;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// One product line of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: u64, quantity: u32) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            quantity,
        }
    }
}

/// Merges lines for the same product, keeping products in ascending id order.
///
/// Fails if the merged quantity of a product no longer fits a line.
pub fn merge_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>, OrderError> {
    let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in lines {
        let quantity = merged.entry(line.product_id).or_default();
        *quantity = quantity
            .checked_add(line.quantity)
            .ok_or(OrderError::QuantityOverflow {
                product_id: line.product_id,
            })?;
    }
    Ok(merged
        .into_iter()
        .map(|(product_id, quantity)| OrderLine {
            product_id,
            quantity,
        })
        .collect())
}

/// Total number of units across lines.
pub fn total_quantity(lines: &[OrderLine]) -> u64 {
    lines.iter().map(|l| u64::from(l.quantity)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_combines_duplicate_products() {
        let merged = merge_lines(&[
            OrderLine::new(10, 1),
            OrderLine::new(3, 2),
            OrderLine::new(10, 1),
        ])
        .unwrap();
        assert_eq!(merged, vec![OrderLine::new(3, 2), OrderLine::new(10, 2)]);
    }

    #[test]
    fn merge_rejects_quantity_overflow() {
        let result = merge_lines(&[OrderLine::new(10, u32::MAX), OrderLine::new(10, 2)]);
        assert!(matches!(
            result,
            Err(OrderError::QuantityOverflow { product_id }) if product_id == ProductId::new(10)
        ));

        let fits = merge_lines(&[OrderLine::new(10, u32::MAX - 2), OrderLine::new(10, 2)]).unwrap();
        assert_eq!(fits, vec![OrderLine::new(10, u32::MAX)]);
    }

    #[test]
    fn total_quantity_sums_units() {
        assert_eq!(
            total_quantity(&[OrderLine::new(1, 2), OrderLine::new(2, 1)]),
            3
        );
        assert_eq!(total_quantity(&[]), 0);
    }
}
