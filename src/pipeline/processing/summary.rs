//! Strategies for pulling a summary paragraph out of a detail page.

use crate::error::{Result, ScraperError};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionMode {
    /// First `<p>` sibling after the anchor.
    NextParagraph,
    /// Siblings after the anchor up to `endSelector` or the next element with the anchor's tag.
    BetweenSections,
    /// Full text of the container element.
    WithinContainer,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Default)]
pub struct SummaryQuery {
    pub selector: String,
    pub mode: ExtractionMode,
    pub end_selector: Option<String>,
    pub container_selector: Option<String>,
}

impl SummaryQuery {
    /// Checks that every configured selector parses.
    pub fn validate(&self) -> Result<()> {
        let selectors = std::iter::once(Some(&self.selector))
            .chain([self.end_selector.as_ref(), self.container_selector.as_ref()]);
        for css in selectors.flatten() {
            if css.is_empty() && self.mode == ExtractionMode::WithinContainer {
                continue;
            }
            parse_selector(css)?;
        }
        Ok(())
    }
}

const MIN_OWN_TEXT_LEN: usize = 30;

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::Parse(format!("invalid CSS selector '{}': {:?}", css, e)))
}

fn clean(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_of(el: &ElementRef<'_>) -> String {
    clean(&el.text().collect::<Vec<_>>().join(" "))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn following<'a>(anchor: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    anchor.next_siblings().filter_map(ElementRef::wrap)
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn next_paragraph(anchor: &ElementRef<'_>) -> Option<String> {
    following(anchor)
        .find(|el| el.value().name() == "p")
        .and_then(|p| non_empty(text_of(&p)))
}

fn between(anchor: &ElementRef<'_>, stop: impl Fn(&ElementRef<'_>) -> bool) -> Option<String> {
    let parts: Vec<String> = following(anchor)
        .take_while(|el| !stop(el))
        .map(|el| text_of(&el))
        .filter(|t| !t.is_empty())
        .collect();
    non_empty(parts.join("\n\n"))
}

fn auto(anchor: &ElementRef<'_>) -> Option<String> {
    if is_heading(anchor.value().name()) {
        if let Some(section) = between(anchor, |el| is_heading(el.value().name())) {
            return Some(section);
        }
    }
    let own = text_of(anchor);
    if own.chars().count() > MIN_OWN_TEXT_LEN {
        return Some(own);
    }
    next_paragraph(anchor).or_else(|| {
        following(anchor)
            .find(|el| matches!(el.value().name(), "div" | "section"))
            .and_then(|el| non_empty(text_of(&el)))
    })
}

/// Runs the configured strategy against a page. `Ok(None)` when nothing usable was found.
pub fn extract_summary(html: &str, query: &SummaryQuery) -> Result<Option<String>> {
    let document = Html::parse_document(html);

    if query.mode == ExtractionMode::WithinContainer {
        let css = query.container_selector.as_deref().unwrap_or(&query.selector);
        let sel = parse_selector(css)?;
        return Ok(document.select(&sel).next().and_then(|el| non_empty(text_of(&el))));
    }

    let sel = parse_selector(&query.selector)?;
    let Some(anchor) = document.select(&sel).next() else {
        return Ok(None);
    };

    let summary = match query.mode {
        ExtractionMode::NextParagraph => next_paragraph(&anchor),
        ExtractionMode::BetweenSections => match &query.end_selector {
            Some(end) => {
                let end = parse_selector(end)?;
                between(&anchor, |el| end.matches(el))
            }
            None => {
                let tag = anchor.value().name().to_string();
                between(&anchor, |el| el.value().name() == tag)
            }
        },
        ExtractionMode::Auto => auto(&anchor),
        ExtractionMode::WithinContainer => None,
    };
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <h2 id="summary">Summary</h2>
        <p>First paragraph.</p>
        <p>Second   paragraph.</p>
        <h2>Details</h2>
        <p>Other.</p>
        <div class="box"><span>Boxed</span> text</div>
    </body></html>"#;

    fn query(selector: &str, mode: ExtractionMode) -> SummaryQuery {
        SummaryQuery {
            selector: selector.to_string(),
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn next_paragraph_mode() {
        let got = extract_summary(PAGE, &query("#summary", ExtractionMode::NextParagraph)).unwrap();
        assert_eq!(got.as_deref(), Some("First paragraph."));
    }

    #[test]
    fn between_sections_stops_at_same_tag() {
        let got = extract_summary(PAGE, &query("#summary", ExtractionMode::BetweenSections)).unwrap();
        assert_eq!(got.as_deref(), Some("First paragraph.\n\nSecond paragraph."));
    }

    #[test]
    fn between_sections_with_end_selector() {
        let mut q = query("#summary", ExtractionMode::BetweenSections);
        q.end_selector = Some("p + p".to_string());
        let got = extract_summary(PAGE, &q).unwrap();
        assert_eq!(got.as_deref(), Some("First paragraph."));
    }

    #[test]
    fn within_container_mode() {
        let mut q = query("unused", ExtractionMode::WithinContainer);
        q.container_selector = Some("div.box".to_string());
        let got = extract_summary(PAGE, &q).unwrap();
        assert_eq!(got.as_deref(), Some("Boxed text"));
    }

    #[test]
    fn auto_prefers_heading_bounded_content() {
        let got = extract_summary(PAGE, &query("#summary", ExtractionMode::Auto)).unwrap();
        assert_eq!(got.as_deref(), Some("First paragraph.\n\nSecond paragraph."));
    }

    #[test]
    fn auto_falls_back_to_next_div() {
        let html = r#"<body><span class="k">Short</span><div>Fallback block</div></body>"#;
        let got = extract_summary(html, &query("span.k", ExtractionMode::Auto)).unwrap();
        assert_eq!(got.as_deref(), Some("Fallback block"));
    }

    #[test]
    fn missing_anchor_is_none() {
        assert_eq!(extract_summary(PAGE, &query("#nope", ExtractionMode::Auto)).unwrap(), None);
    }
}
