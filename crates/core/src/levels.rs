use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::domain::approver::ApprovalLevel;
use crate::errors::LevelError;

/// EUR-per-unit conversion rates keyed by upper-case currency code.
/// EUR itself always resolves to 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurrencyRates {
    rates: HashMap<String, Decimal>,
}

impl CurrencyRates {
    pub fn new(rates: HashMap<String, Decimal>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(currency, rate)| (currency.trim().to_ascii_uppercase(), rate))
            .collect();
        Self { rates }
    }

    pub fn rate_for(&self, currency: &str) -> Option<Decimal> {
        let key = currency.trim().to_ascii_uppercase();
        if key == "EUR" {
            return Some(Decimal::ONE);
        }
        self.rates.get(&key).copied()
    }
}

/// Normalize a native-currency amount to the EUR reference the tier table
/// is defined against.
pub fn normalize_to_eur(
    amount: Decimal,
    currency: &str,
    rates: &CurrencyRates,
) -> Result<Decimal, LevelError> {
    if amount.is_sign_negative() {
        return Err(LevelError::NegativeCost { amount });
    }

    let rate = rates
        .rate_for(currency)
        .ok_or_else(|| LevelError::UnknownCurrency { currency: currency.to_string() })?;

    Ok(amount * rate)
}

/// Map an EUR cost to the minimum level that fully clears the order.
/// Tier bounds are inclusive: 1500.00 still clears at level 5.
pub fn required_level_for_cost(cost_eur: Decimal) -> Result<ApprovalLevel, LevelError> {
    if cost_eur.is_sign_negative() {
        return Err(LevelError::NegativeCost { amount: cost_eur });
    }

    let level = if cost_eur <= Decimal::new(1_500, 0) {
        5
    } else if cost_eur <= Decimal::new(5_000, 0) {
        6
    } else if cost_eur <= Decimal::new(10_000, 0) {
        7
    } else {
        8
    };

    ApprovalLevel::new(level)
}
