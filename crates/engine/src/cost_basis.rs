use crate::error::OrderError;
use rust_decimal::{Decimal, RoundingStrategy};

/// The position component of a holding: how much is held and at what
/// quantity-weighted average purchase price. Pure data, no identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBasis {
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

/// Number of fractional digits retained for the stored average cost. Matches
/// the ledger's column scale so both backends agree on the stored value.
const COST_SCALE: u32 = 8;

/// Folds a buy into an existing cost basis.
///
/// The first buy of an asset establishes the average cost at the execution
/// price. Subsequent buys blend it: `(avg0*q0 + price*q) / (q0 + q)`,
/// computed entirely in decimal and rounded half-up at the stored scale.
pub fn apply_buy(existing: Option<&CostBasis>, price: Decimal, quantity: Decimal) -> CostBasis {
    let Some(existing) = existing else {
        return CostBasis {
            quantity,
            average_cost: price,
        };
    };

    let new_quantity = existing.quantity + quantity;
    // Unreachable for a real buy (quantities are validated positive), but a
    // zero divisor must never panic the settlement path.
    let average_cost = if new_quantity.is_zero() {
        Decimal::ZERO
    } else {
        let total_value = existing.average_cost * existing.quantity + price * quantity;
        (total_value / new_quantity)
            .round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
    };

    CostBasis {
        quantity: new_quantity,
        average_cost,
    }
}

/// Reduces a cost basis by a sell.
///
/// Fails with `InsufficientHoldings` when nothing (or too little) is held.
/// A sell never changes the average cost; selling the entire position
/// returns `None`, which callers translate into deleting the holding row.
/// Crediting the proceeds to cash is the caller's responsibility.
pub fn apply_sell(
    existing: Option<&CostBasis>,
    quantity: Decimal,
) -> Result<Option<CostBasis>, OrderError> {
    let held = existing.map_or(Decimal::ZERO, |basis| basis.quantity);
    if held < quantity {
        return Err(OrderError::InsufficientHoldings {
            requested: quantity,
            held,
        });
    }

    let remaining = held - quantity;
    if remaining.is_zero() {
        return Ok(None);
    }

    // `existing` must be Some here, otherwise `held` would have been zero
    // and the guard above would have fired.
    let average_cost = existing.map_or(Decimal::ZERO, |basis| basis.average_cost);
    Ok(Some(CostBasis {
        quantity: remaining,
        average_cost,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_first_buy_sets_average_to_execution_price() {
        let basis = apply_buy(None, dec!(100.00), dec!(10));
        assert_eq!(basis.quantity, dec!(10));
        assert_eq!(basis.average_cost, dec!(100.00));
    }

    #[test]
    fn test_second_buy_blends_weighted_average() {
        let basis = apply_buy(None, dec!(100.00), dec!(10));
        let basis = apply_buy(Some(&basis), dec!(110.00), dec!(5));
        assert_eq!(basis.quantity, dec!(15));
        // (10*100 + 5*110) / 15 = 1550 / 15 = 103.33333333...
        assert_eq!(basis.average_cost, dec!(103.33333333));
    }

    #[test]
    fn test_weighted_average_matches_formula_at_stored_scale() {
        let q1 = dec!(3.5);
        let p1 = dec!(42.17);
        let q2 = dec!(0.00000042);
        let p2 = dec!(9000.01);

        let basis = apply_buy(None, p1, q1);
        let basis = apply_buy(Some(&basis), p2, q2);

        let expected = ((q1 * p1 + q2 * p2) / (q1 + q2))
            .round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero);
        assert_eq!(basis.average_cost, expected);
    }

    #[test]
    fn test_partial_sell_preserves_average_cost() {
        let basis = apply_buy(None, dec!(103.50), dec!(15));
        let remaining = apply_sell(Some(&basis), dec!(5)).unwrap().unwrap();
        assert_eq!(remaining.quantity, dec!(10));
        assert_eq!(remaining.average_cost, dec!(103.50));
    }

    #[test]
    fn test_selling_everything_removes_the_basis() {
        let basis = apply_buy(None, dec!(103.50), dec!(15));
        let remaining = apply_sell(Some(&basis), dec!(15)).unwrap();
        assert!(remaining.is_none());
    }

    #[test]
    fn test_overselling_fails() {
        let basis = apply_buy(None, dec!(103.50), dec!(15));
        let err = apply_sell(Some(&basis), dec!(15.00000001)).unwrap_err();
        assert!(matches!(err, OrderError::InsufficientHoldings { .. }));

        let err = apply_sell(None, dec!(1)).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientHoldings { held, .. } if held == dec!(0)
        ));
    }

    #[test]
    fn test_zero_total_quantity_guard_does_not_divide() {
        let flat = CostBasis {
            quantity: dec!(-5),
            average_cost: dec!(100),
        };
        let basis = apply_buy(Some(&flat), dec!(100), dec!(5));
        assert_eq!(basis.quantity, dec!(0));
        assert_eq!(basis.average_cost, dec!(0));
    }
}
