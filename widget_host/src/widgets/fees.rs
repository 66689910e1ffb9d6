use serde_json::Value;
use std::time::Duration;
use types::pick_f64;

use super::{Feed, Fields, rate};

/// Recommended fee rates in sat/vB.
pub struct Fees;

impl Feed for Fees {
    const ID: &'static str = "fees";
    const PERIOD: Duration = Duration::from_secs(15);
    const SOURCES: &'static [(&'static str, &'static str)] =
        &[("MEMPOOL", "v1/fees/recommended")];
    const FIELDS: &'static [&'static str] =
        &["fast", "half_hour", "hour", "economy", "minimum"];

    fn render(body: &Value) -> Option<Fields> {
        let fast = pick_f64(body, &["fastestFee", "fastest", "fast"])?;

        let mut fields = vec![("fast", rate(fast))];
        let rest = [
            ("half_hour", ["halfHourFee", "halfHour"]),
            ("hour", ["hourFee", "hour"]),
            ("economy", ["economyFee", "economy"]),
            ("minimum", ["minimumFee", "minimum"]),
        ];
        for (field, paths) in rest {
            if let Some(value) = pick_f64(body, &paths) {
                fields.push((field, rate(value)));
            }
        }

        Some(fields)
    }
}
