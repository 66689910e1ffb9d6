use serde_json::Value;
use std::time::Duration;

use super::{Body, Feed, Fields};

/// Current block height. The endpoint answers with a bare number as text.
pub struct Tip;

impl Feed for Tip {
    const ID: &'static str = "tip";
    const PERIOD: Duration = Duration::from_secs(15);
    const BODY: Body = Body::Text;
    const SOURCES: &'static [(&'static str, &'static str)] =
        &[("MEMPOOL", "blocks/tip/height")];
    const FIELDS: &'static [&'static str] = &["height"];

    fn render(body: &Value) -> Option<Fields> {
        let height = match body {
            Value::String(text) => text.trim().parse::<u64>().ok()?,
            other => other.as_u64()?,
        };

        Some(vec![
            ("height", height.to_string()),
            ("sub", "mempool.space".to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_text_height() {
        assert_eq!(
            Tip::render(&json!("870123\n")),
            Some(vec![
                ("height", "870123".to_string()),
                ("sub", "mempool.space".to_string()),
            ])
        );
    }

    #[test]
    fn test_render_rejects_non_numeric_body() {
        assert_eq!(Tip::render(&json!("<html>rate limited</html>")), None);
        assert_eq!(Tip::render(&json!("-1")), None);
    }
}
