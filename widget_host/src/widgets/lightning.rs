use serde_json::Value;
use std::time::Duration;
use types::pick_f64;

use super::{Feed, Fields, compact};

const SATS_PER_BTC: f64 = 100_000_000.0;

/// Lightning network size. The card shows capacity when known and falls
/// back to node or channel counts.
pub struct Lightning;

impl Feed for Lightning {
    const ID: &'static str = "lightning";
    const PERIOD: Duration = Duration::from_secs(60);
    const SOURCES: &'static [(&'static str, &'static str)] = &[
        ("MEMPOOL", "v1/lightning/statistics"),
        ("MEMPOOL", "v1/lightning"),
        ("MEMPOOL", "v1/lightning/network"),
    ];
    const FIELDS: &'static [&'static str] = &["value", "label"];

    fn render(body: &Value) -> Option<Fields> {
        // mempool reports capacity in sats under `latest`
        let capacity = pick_f64(
            body,
            &[
                "capacity",
                "total_capacity",
                "totalCapacity",
                "network_capacity",
                "totalLiquidity",
            ],
        )
        .or_else(|| {
            pick_f64(body, &["latest.total_capacity", "latest.capacity"])
                .map(|sats| sats / SATS_PER_BTC)
        });
        let nodes = pick_f64(
            body,
            &["nodes", "node_count", "nodeCount", "latest.node_count"],
        );
        let channels = pick_f64(
            body,
            &[
                "channels",
                "channel_count",
                "channelCount",
                "latest.channel_count",
            ],
        );

        let (value, label) = match (capacity, nodes, channels) {
            (Some(capacity), _, _) => (capacity, "BTC cap"),
            (None, Some(nodes), _) => (nodes, "LN nodes"),
            (None, None, Some(channels)) => (channels, "channels"),
            (None, None, None) => return None,
        };

        let mut fields =
            vec![("value", compact(value)), ("label", label.to_string())];
        if let Some(nodes) = nodes {
            fields.push(("nodes", compact(nodes)));
        }
        if let Some(channels) = channels {
            fields.push(("channels", compact(channels)));
        }

        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_mempool_statistics() {
        let body = json!({
            "latest": {
                "channel_count": 52_000,
                "node_count": 13_500,
                "total_capacity": 512_345_678_900_u64
            }
        });

        assert_eq!(
            Lightning::render(&body),
            Some(vec![
                ("value", "5.12K".to_string()),
                ("label", "BTC cap".to_string()),
                ("nodes", "13.50K".to_string()),
                ("channels", "52.00K".to_string()),
            ])
        );
    }

    #[test]
    fn test_render_falls_back_to_counts() {
        assert_eq!(
            Lightning::render(&json!({"nodeCount": 900})),
            Some(vec![
                ("value", "900".to_string()),
                ("label", "LN nodes".to_string()),
                ("nodes", "900".to_string()),
            ])
        );
        assert_eq!(Lightning::render(&json!({"status": "ok"})), None);
    }
}
