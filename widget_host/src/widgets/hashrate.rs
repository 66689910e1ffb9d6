use serde_json::Value;
use std::time::Duration;
use types::pick_f64;

use super::{Feed, Fields};

const HASHES_PER_EXAHASH: f64 = 1e18;

/// Network hashrate in EH/s.
pub struct Hashrate;

/// Latest sample of a hashrate series, newest last.
fn latest(series: &[Value]) -> Option<f64> {
    series
        .iter()
        .rev()
        .find_map(|sample| pick_f64(sample, &["hashrate", "avgHashrate", "value"]))
}

impl Feed for Hashrate {
    const ID: &'static str = "hashrate";
    const PERIOD: Duration = Duration::from_secs(15);
    const SOURCES: &'static [(&'static str, &'static str)] = &[
        ("MEMPOOL", "v1/mining/hashrate/3d"),
        ("MEMPOOL", "v1/mining/hashrate/7d"),
        ("MEMPOOL", "v1/mining/hashrate"),
    ];
    const FIELDS: &'static [&'static str] = &["value"];

    fn render(body: &Value) -> Option<Fields> {
        let hashes = match body {
            Value::Array(series) => latest(series)?,
            _ => pick_f64(body, &["currentHashrate", "hashrate", "value"])
                .or_else(|| {
                    body.get("hashrates")
                        .and_then(Value::as_array)
                        .and_then(|series| latest(series))
                })?,
        };

        Some(vec![
            ("value", format!("{:.2}", hashes / HASHES_PER_EXAHASH)),
            ("unit", "EH/s".to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_current_hashrate() {
        let body = json!({
            "hashrates": [{"timestamp": 1, "avgHashrate": 6.0e20}],
            "currentHashrate": 6.42e20,
            "currentDifficulty": 8.8e13
        });

        assert_eq!(
            Hashrate::render(&body),
            Some(vec![
                ("value", "642.00".to_string()),
                ("unit", "EH/s".to_string()),
            ])
        );
    }

    #[test]
    fn test_render_series() {
        let series = json!([
            {"timestamp": 1, "avgHashrate": 6.0e20},
            {"timestamp": 2, "avgHashrate": 6.1e20},
            {"timestamp": 3, "avgHashrate": null}
        ]);
        let wrapped = json!({"hashrates": [{"avgHashrate": 5.5e20}]});

        assert_eq!(
            Hashrate::render(&series).map(|fields| fields[0].1.clone()),
            Some("610.00".to_string())
        );
        assert_eq!(
            Hashrate::render(&wrapped).map(|fields| fields[0].1.clone()),
            Some("550.00".to_string())
        );
        assert_eq!(Hashrate::render(&json!([])), None);
    }
}
