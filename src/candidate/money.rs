use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

/// Currency precision used for every budget comparison.
pub const CURRENCY_SCALE: u32 = 2;

pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Whole cents as an integer-valued float, for use as a program coefficient.
pub fn to_cents_f64(value: Decimal) -> f64 {
    (round_cents(value) * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(f64::MAX)
}

pub fn from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(round_cents)
}

pub fn scale(amount: Decimal, factor: f64) -> Option<Decimal> {
    let factor = Decimal::from_f64(factor)?;
    amount.checked_mul(factor).map(round_cents)
}

/// Parses a currency amount from a JSON number or a loosely formatted string
/// such as `"$1,250.00"`.
pub fn parse_amount(value: &Value) -> Result<Decimal, String> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map(round_cents)
                .map_err(|e| format!("is not a valid amount ({text}: {e})"))
        }
        Value::String(s) => {
            let sanitized = sanitize_numeric(s);
            if sanitized.is_empty() {
                return Err("is empty".to_string());
            }
            Decimal::from_str(&sanitized)
                .or_else(|_| Decimal::from_scientific(&sanitized))
                .map(round_cents)
                .map_err(|_| format!("is not a valid amount ({s:?})"))
        }
        Value::Null => Err("is required".to_string()),
        other => Err(format!("has unsupported type ({other})")),
    }
}

/// Parses a plain scalar (benefit, score, condition index).
pub fn parse_scalar(value: &Value) -> Result<f64, String> {
    let parsed = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("is not representable ({n})"))?,
        Value::String(s) => {
            let sanitized = sanitize_numeric(s);
            if sanitized.is_empty() {
                return Err("is empty".to_string());
            }
            sanitized
                .parse::<f64>()
                .map_err(|_| format!("is not a number ({s:?})"))?
        }
        Value::Null => return Err("is required".to_string()),
        other => return Err(format!("has unsupported type ({other})")),
    };
    if !parsed.is_finite() {
        return Err(format!("must be finite (got {parsed})"));
    }
    Ok(parsed)
}

pub fn parse_optional_scalar(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        other => parse_scalar(other).map(Some),
    }
}

fn sanitize_numeric(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | '$' | '%' | ' '))
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_loose_currency_strings() {
        assert_eq!(parse_amount(&json!("$1,250.00")), Ok(dec!(1250.00)));
        assert_eq!(parse_amount(&json!(" 99.999 ")), Ok(dec!(100.00)));
        assert_eq!(parse_amount(&json!(10.005)), Ok(dec!(10.01)));
        assert!(parse_amount(&json!("abc")).is_err());
        assert!(parse_amount(&json!(null)).is_err());
        assert!(parse_amount(&json!(true)).is_err());
    }

    #[test]
    fn parses_scalars_with_percent_suffix() {
        assert_eq!(parse_scalar(&json!("12%")), Ok(12.0));
        assert_eq!(parse_scalar(&json!(3.5)), Ok(3.5));
        assert_eq!(parse_optional_scalar(&json!("")), Ok(None));
        assert!(parse_scalar(&json!("NaN")).is_err());
    }

    #[test]
    fn scales_and_rounds_budgets() {
        assert_eq!(scale(dec!(1000), 0.8), Some(dec!(800.00)));
        assert_eq!(scale(dec!(333.33), 1.1), Some(dec!(366.66)));
        assert_eq!(to_cents_f64(dec!(12.34)), 1234.0);
    }
}
