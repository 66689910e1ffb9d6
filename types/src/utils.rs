use serde_json::Value;

/// Resolve a dotted path such as `data.amount` or `pools.0.name` inside a
/// JSON value. Numeric segments index into arrays.
///
/// # Example
///
/// ```rust
/// let body = serde_json::json!({"data": {"amount": "50000.12"}});
/// assert_eq!(
///     types::pick_value(&body, "data.amount"),
///     Some(&serde_json::json!("50000.12"))
/// );
/// ```
#[must_use]
pub fn pick_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => {
                segment.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Return the first candidate path holding a finite number. Upstream APIs
/// are inconsistent about quoting numbers, so numeric strings count.
#[must_use]
pub fn pick_f64(value: &Value, paths: &[&str]) -> Option<f64> {
    paths
        .iter()
        .find_map(|path| pick_value(value, path).and_then(as_f64))
}

/// Integer flavour of [`pick_f64`]; fractional values are truncated.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pick_i64(value: &Value, paths: &[&str]) -> Option<i64> {
    paths.iter().find_map(|path| {
        let found = pick_value(value, path)?;
        found.as_i64().or_else(|| as_f64(found).map(|n| n.trunc() as i64))
    })
}

/// Return the first candidate path holding a non-empty string.
#[must_use]
pub fn pick_str<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths.iter().find_map(|path| {
        pick_value(value, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pick_value_walks_objects_and_arrays() {
        let body = json!({"pools": [{"name": "Foundry"}, {"name": "AntPool"}]});
        assert_eq!(pick_value(&body, "pools.1.name"), Some(&json!("AntPool")));
        assert_eq!(pick_value(&body, "pools.7.name"), None);
        assert_eq!(pick_value(&body, "pools.name"), None);
    }

    #[test]
    fn test_pick_f64_accepts_numeric_strings() {
        let body = json!({"data": {"amount": " 50000.12 "}});
        assert_eq!(pick_f64(&body, &["price", "data.amount"]), Some(50000.12));
    }

    #[test]
    fn test_pick_f64_skips_unusable_candidates() {
        let body = json!({"price": "n/a", "last": null, "close": 12.5});
        assert_eq!(pick_f64(&body, &["price", "last", "close"]), Some(12.5));
        assert_eq!(pick_f64(&body, &["price", "last"]), None);
    }

    #[test]
    fn test_pick_i64_truncates() {
        let body = json!({"latest": {"total_nodes": "18234.9"}, "height": 840000});
        assert_eq!(pick_i64(&body, &["latest.total_nodes"]), Some(18234));
        assert_eq!(pick_i64(&body, &["height"]), Some(840_000));
    }

    #[test]
    fn test_pick_str_ignores_blank_strings() {
        let body = json!({"a": "  ", "b": "mempool.space"});
        assert_eq!(pick_str(&body, &["a", "b"]), Some("mempool.space"));
        assert_eq!(pick_str(&body, &["a", "missing"]), None);
    }
}
