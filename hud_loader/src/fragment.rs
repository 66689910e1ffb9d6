use regex::Regex;

use crate::LoaderError;

/// What the loader needs from the widget fragment: the slots in document
/// order and the assets the fragment asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub slots: Vec<String>,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
}

struct Patterns {
    tag: Regex,
    widget: Regex,
    rel: Regex,
    href: Regex,
    src: Regex,
}

fn attribute_pattern(name: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"(?i)(?:^|\s){}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        regex::escape(name)
    ))
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            tag: Regex::new(r"(?i)<([a-z][a-z0-9-]*)\b[^>]*>")?,
            widget: attribute_pattern("data-widget")?,
            rel: attribute_pattern("rel")?,
            href: attribute_pattern("href")?,
            src: attribute_pattern("src")?,
        })
    }
}

fn attribute(re: &Regex, tag: &str) -> Option<String> {
    re.captures(tag).and_then(|cap| {
        cap.get(1)
            .or_else(|| cap.get(2))
            .map(|m| m.as_str().trim().to_string())
    })
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

/// Scan an HTML fragment.
///
/// Slots are the `data-widget` attributes; an id seen twice keeps its
/// first position. Stylesheets are `<link rel="stylesheet">` hrefs and
/// scripts are `<script src>` values.
///
/// # Errors
/// Only if a scanning pattern fails to compile.
pub fn parse_fragment(html: &str) -> Result<Fragment, LoaderError> {
    let patterns = Patterns::new()?;
    let mut fragment = Fragment::default();

    for tag in patterns.tag.captures_iter(html) {
        let text = &tag[0];

        if let Some(id) = attribute(&patterns.widget, text) {
            push_unique(&mut fragment.slots, id);
        }

        match tag[1].to_ascii_lowercase().as_str() {
            "link" => {
                let is_stylesheet =
                    attribute(&patterns.rel, text).is_some_and(|rel| {
                        rel.split_whitespace()
                            .any(|r| r.eq_ignore_ascii_case("stylesheet"))
                    });
                if is_stylesheet
                    && let Some(href) = attribute(&patterns.href, text)
                {
                    push_unique(&mut fragment.stylesheets, href);
                }
            }
            "script" => {
                if let Some(src) = attribute(&patterns.src, text) {
                    push_unique(&mut fragment.scripts, src);
                }
            }
            _ => {}
        }
    }

    tracing::debug!(
        slots = fragment.slots.len(),
        stylesheets = fragment.stylesheets.len(),
        scripts = fragment.scripts.len(),
        "parsed widget fragment"
    );

    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FRAGMENT: &str = r#"
        <link rel="stylesheet" href="/__partials/widgets/_core/widget-core.css">
        <link rel="preload" href="/fonts/mono.woff2">
        <div class="btc-rail">
          <div class="btc-slot" data-widget="bitcoin-ticker"></div>
          <div class="btc-slot" data-widget='fees'></div>
          <section data-widget="tip" class="btc-slot"></section>
          <div class="btc-slot" data-widget="fees"></div>
          <div class="btc-slot" data-widget=""></div>
        </div>
        <button data-hud-show type="button">show</button>
        <script src="/__partials/widgets/runtime.js" defer></script>
        <script>window.inline = true;</script>
    "#;

    #[test]
    fn test_parse_fragment() {
        let fragment = parse_fragment(FRAGMENT).unwrap();

        assert_eq!(
            fragment,
            Fragment {
                slots: vec![
                    "bitcoin-ticker".to_string(),
                    "fees".to_string(),
                    "tip".to_string(),
                ],
                stylesheets: vec![
                    "/__partials/widgets/_core/widget-core.css".to_string()
                ],
                scripts: vec!["/__partials/widgets/runtime.js".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_empty_fragment() {
        assert_eq!(parse_fragment("").unwrap(), Fragment::default());
        assert_eq!(
            parse_fragment("<p>no widgets here</p>").unwrap(),
            Fragment::default()
        );
    }
}
