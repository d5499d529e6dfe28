use crate::error::EngineError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept when fractional sizing is enabled.
pub const FRACTIONAL_DP: u32 = 4;

/// Inputs that stay fixed for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingParams {
    /// Fraction of equity lost if the stop is hit (e.g. 0.01 = 1%).
    pub risk_pct: Decimal,
    /// Stop distance as a fraction of entry price.
    pub stop_pct: Decimal,
    /// Cap on position notional as a fraction of equity.
    pub max_position_pct: Option<Decimal>,
    /// Allow quantities below one whole unit.
    pub fractional: bool,
}

/// Calculate a risk-based order quantity.
///
/// `quantity = floor((equity × risk_pct) / (entry_price × stop_pct))`, then
/// capped by `max_position_pct` of equity in notional. Returns zero when the
/// result is below the smallest tradable unit; callers must not enter on zero.
///
/// The shipped configuration sets `max_position_pct` to 10%, so at tight
/// stops the notional cap, not the risk formula, decides the size. Pass
/// `max_position_pct: None` for the formula alone.
///
/// Rounding only ever reduces the quantity, so
/// `quantity × entry_price × stop_pct ≤ equity × risk_pct` always holds.
///
/// # Errors
/// Returns `InvalidRisk` if equity, entry price, risk or stop distance is not
/// positive.
pub fn calculate_position_size(
    account_equity: Decimal,
    entry_price: Decimal,
    params: &SizingParams,
) -> Result<Decimal, EngineError> {
    if params.stop_pct <= Decimal::ZERO {
        return Err(EngineError::InvalidRisk(format!(
            "stop distance must be positive, got {}",
            params.stop_pct
        )));
    }
    if account_equity <= Decimal::ZERO {
        return Err(EngineError::InvalidRisk(format!(
            "account equity must be positive, got {account_equity}"
        )));
    }
    if entry_price <= Decimal::ZERO {
        return Err(EngineError::InvalidRisk(format!(
            "entry price must be positive, got {entry_price}"
        )));
    }
    if params.risk_pct <= Decimal::ZERO {
        return Err(EngineError::InvalidRisk(format!(
            "risk fraction must be positive, got {}",
            params.risk_pct
        )));
    }

    let risk_amount = account_equity * params.risk_pct;
    let loss_per_unit = entry_price * params.stop_pct;

    let mut quantity = truncate(risk_amount / loss_per_unit, params.fractional);

    if let Some(max_pct) = params.max_position_pct {
        let cap = truncate(account_equity * max_pct / entry_price, params.fractional);
        quantity = quantity.min(cap);
    }

    // Division rounds at 28 significant digits; step down if that pushed us over.
    let step = unit(params.fractional);
    while quantity > Decimal::ZERO && quantity * loss_per_unit > risk_amount {
        quantity -= step;
    }

    Ok(quantity.max(Decimal::ZERO))
}

fn truncate(value: Decimal, fractional: bool) -> Decimal {
    if fractional {
        value.round_dp_with_strategy(FRACTIONAL_DP, RoundingStrategy::ToZero)
    } else {
        value.floor()
    }
}

fn unit(fractional: bool) -> Decimal {
    if fractional {
        Decimal::new(1, FRACTIONAL_DP)
    } else {
        Decimal::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn params(risk_pct: Decimal, stop_pct: Decimal) -> SizingParams {
        SizingParams {
            risk_pct,
            stop_pct,
            max_position_pct: None,
            fractional: false,
        }
    }

    #[test]
    fn test_basic_position_sizing() {
        // $100k × 1% = $1000 at risk; 98.4 × 1% = 0.984 per share → 1016.26 → 1016
        let quantity =
            calculate_position_size(dec!(100000), dec!(98.4), &params(dec!(0.01), dec!(0.01)))
                .unwrap();
        assert_eq!(quantity, dec!(1016));
    }

    #[test]
    fn test_max_position_cap() {
        let p = SizingParams {
            max_position_pct: Some(dec!(0.10)),
            ..params(dec!(0.01), dec!(0.01))
        };
        // Uncapped 1016 shares; 10% of $100k = $10k / 98.4 → 101
        let quantity = calculate_position_size(dec!(100000), dec!(98.4), &p).unwrap();
        assert_eq!(quantity, dec!(101));
    }

    #[test]
    fn test_below_one_unit_is_zero() {
        // $1000 × 1% = $10 at risk; 500 × 5% = $25 per share
        let quantity =
            calculate_position_size(dec!(1000), dec!(500), &params(dec!(0.01), dec!(0.05)))
                .unwrap();
        assert_eq!(quantity, Decimal::ZERO);
    }

    #[test]
    fn test_fractional_sizing() {
        let p = SizingParams {
            fractional: true,
            ..params(dec!(0.01), dec!(0.05))
        };
        let quantity = calculate_position_size(dec!(1000), dec!(500), &p).unwrap();
        assert_eq!(quantity, dec!(0.4));
    }

    #[test]
    fn test_invalid_inputs() {
        let p = params(dec!(0.01), dec!(0.01));
        assert!(matches!(
            calculate_position_size(dec!(0), dec!(100), &p),
            Err(EngineError::InvalidRisk(_))
        ));
        assert!(matches!(
            calculate_position_size(dec!(-5), dec!(100), &p),
            Err(EngineError::InvalidRisk(_))
        ));
        assert!(matches!(
            calculate_position_size(dec!(1000), dec!(100), &params(dec!(0.01), dec!(0))),
            Err(EngineError::InvalidRisk(_))
        ));
        assert!(matches!(
            calculate_position_size(dec!(1000), dec!(0), &p),
            Err(EngineError::InvalidRisk(_))
        ));
    }

    proptest! {
        #[test]
        fn sizing_never_exceeds_risk_budget(
            equity_cents in 1i64..10_000_000_000,
            price_cents in 1i64..1_000_000,
            risk_bps in 1i64..10_000,
            stop_bps in 1i64..10_000,
            fractional in any::<bool>(),
        ) {
            let equity = Decimal::new(equity_cents, 2);
            let price = Decimal::new(price_cents, 2);
            let p = SizingParams {
                risk_pct: Decimal::new(risk_bps, 4),
                stop_pct: Decimal::new(stop_bps, 4),
                max_position_pct: None,
                fractional,
            };
            let qty = calculate_position_size(equity, price, &p).unwrap();
            prop_assert!(qty >= Decimal::ZERO);
            prop_assert!(qty * price * p.stop_pct <= equity * p.risk_pct);
            if !fractional {
                prop_assert_eq!(qty, qty.floor());
            }
        }
    }
}
