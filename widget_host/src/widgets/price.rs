use serde_json::Value;
use std::time::Duration;
use types::pick_f64;

use super::{Feed, Fields};

/// BTC spot price, also shown per mBTC, µBTC and satoshi.
pub struct Price;

impl Feed for Price {
    const ID: &'static str = "bitcoin-ticker";
    const PERIOD: Duration = Duration::from_millis(250);
    const SOURCES: &'static [(&'static str, &'static str)] =
        &[("COINBASE_SPOT", "")];
    const FIELDS: &'static [&'static str] = &["btc", "mbtc", "ubtc", "sat"];

    fn render(body: &Value) -> Option<Fields> {
        let btc = pick_f64(body, &["data.amount", "amount", "price"])?;

        Some(vec![
            ("btc", format!("{btc:.2}")),
            ("mbtc", format!("{:.2}", btc * 0.001)),
            ("ubtc", format!("{:.4}", btc * 0.000_001)),
            ("sat", format!("{:.6}", btc * 0.000_000_01)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_coinbase_spot() {
        let body = json!({
            "data": { "amount": "64123.5", "base": "BTC", "currency": "USD" }
        });

        assert_eq!(
            Price::render(&body),
            Some(vec![
                ("btc", "64123.50".to_string()),
                ("mbtc", "64.12".to_string()),
                ("ubtc", "0.0641".to_string()),
                ("sat", "0.000641".to_string()),
            ])
        );
    }

    #[test]
    fn test_render_rejects_missing_amount() {
        assert_eq!(Price::render(&json!({"data": {"amount": "n/a"}})), None);
        assert_eq!(Price::render(&json!({"errors": []})), None);
    }
}
