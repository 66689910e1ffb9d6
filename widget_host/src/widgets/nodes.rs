use serde_json::Value;
use std::time::Duration;
use types::pick_i64;

use super::{Feed, Fields};

/// Reachable node count from the latest Bitnodes snapshot. Bitnodes rate
/// limits hard, hence the long period.
pub struct Nodes;

/// Unwrap the envelopes the snapshot is sometimes delivered in.
fn snapshot(body: &Value) -> &Value {
    ["data", "results", "snapshot"]
        .iter()
        .find_map(|key| body.get(key).filter(|inner| inner.is_object()))
        .unwrap_or(body)
}

impl Feed for Nodes {
    const ID: &'static str = "nodes";
    const PERIOD: Duration = Duration::from_secs(30 * 60);
    const SOURCES: &'static [(&'static str, &'static str)] =
        &[("BITNODES", "snapshots/latest/")];
    const FIELDS: &'static [&'static str] = &["total", "height"];

    fn render(body: &Value) -> Option<Fields> {
        let snapshot = snapshot(body);
        let total = pick_i64(
            snapshot,
            &["total_nodes", "totalNodes", "nodes_total", "total"],
        )
        .filter(|total| *total > 0)?;

        let mut fields = vec![("total", total.to_string())];
        if let Some(height) =
            pick_i64(snapshot, &["latest_height", "height", "block_height"])
        {
            fields.push(("height", height.to_string()));
        }

        Some(fields)
    }
}
