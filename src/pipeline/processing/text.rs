//! HTML to readable text / markdown, plus removal of newsletter boilerplate.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    #[default]
    Text,
    Markdown,
}

static TAG_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\s*/?\s*[a-zA-Z!][^>]*>").expect("valid regex"));
static MANY_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));
static LEADING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]+").expect("valid regex"));

static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // social call-to-actions and profile links
        r"(?im)^[^\n]*\b(?:follow|like|connect with|find) us\b[^\n]*$",
        r"(?im)^[^\n]*https?://(?:www\.)?(?:facebook|twitter|x|linkedin|instagram|youtube|flickr)\.com[^\n]*$",
        // everything from a "STAY CONNECTED" block onwards
        r"(?s)STAY CONNECTED.*\z",
        r"(?im)^[^\n]*\bunsubscribe\b[^\n]*$",
        r"(?im)^[^\n]*\bmanage (?:your )?(?:subscriptions|preferences)\b[^\n]*$",
        // media contact block up to the next blank line
        r"(?ims)^[ \t]*media contacts?:?.*?(?:\n[ \t]*\n|\z)",
        r"(?im)^[^\n]*does not send unsolicited[^\n]*$",
        r"!\[[^\]]*\]\([^)]*\)",
        r"(?i)\[image[^\]]*\]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// True when the input contains at least one tag-like substring.
pub fn looks_like_html(input: &str) -> bool {
    TAG_LIKE.is_match(input)
}

fn push_block_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with("\n\n") {
        if out.ends_with('\n') {
            out.push('\n');
        } else {
            out.push_str("\n\n");
        }
    }
}

fn inline_text(el: &ElementRef<'_>) -> String {
    let mut buf = String::new();
    render_children(el, &mut buf);
    buf.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_children(el: &ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if collapsed.is_empty() {
                    if !text.is_empty() && !out.ends_with(char::is_whitespace) && !out.is_empty() {
                        out.push(' ');
                    }
                    continue;
                }
                if text.starts_with(char::is_whitespace) && !out.ends_with(char::is_whitespace) && !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&collapsed);
                if text.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_element(&child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn render_element(el: &ElementRef<'_>, out: &mut String) {
    match el.value().name() {
        "script" | "style" | "noscript" | "head" | "template" => {}
        "br" => out.push('\n'),
        "h1" | "h2" | "h3" => {
            let heading = inline_text(el).to_uppercase();
            push_block_break(out);
            out.push_str(&heading);
            out.push('\n');
            out.push_str(&"=".repeat(heading.chars().count()));
            out.push_str("\n\n");
        }
        "h4" | "h5" | "h6" => {
            push_block_break(out);
            out.push_str(&inline_text(el));
            out.push_str("\n\n");
        }
        "p" | "div" | "section" | "article" | "table" | "ul" | "ol" | "blockquote" => {
            push_block_break(out);
            render_children(el, out);
            push_block_break(out);
        }
        "li" => {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("- ");
            out.push_str(&inline_text(el));
            out.push('\n');
        }
        "tr" => {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            render_children(el, out);
            out.push('\n');
        }
        "td" | "th" => {
            render_children(el, out);
            out.push(' ');
        }
        "a" => {
            let text = inline_text(el);
            out.push_str(&text);
            if let Some(href) = el.value().attr("href").map(str::trim) {
                if !href.is_empty() && !href.starts_with('#') && href != text {
                    out.push_str(&format!(" [{}]", href));
                }
            }
        }
        _ => render_children(el, out),
    }
}

/// Renders HTML structure as plain text: headings underlined, list items bulleted, links
/// followed by their target in brackets.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    render_element(&document.root_element(), &mut out);
    out
}

pub fn html_to_markdown(html: &str) -> String {
    html2md::parse_html(html)
}

/// Removes social links, unsubscribe notices, media-contact blocks and agency footers.
pub fn strip_boilerplate(text: &str) -> String {
    BOILERPLATE
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

/// Trims line edges, collapses runs of three or more newlines to two and trims the result.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\u{a0}', " ");
    let text = TRAILING_SPACE.replace_all(&text, "\n");
    let text = LEADING_SPACE.replace_all(&text, "\n");
    MANY_NEWLINES.replace_all(&text, "\n\n").trim().to_string()
}

/// Full conversion used by the enrichers. Input without markup passes through unchanged.
pub fn clean_html(input: &str, format: TextFormat) -> String {
    if !looks_like_html(input) {
        return input.to_string();
    }
    let converted = match format {
        TextFormat::Text => html_to_text(input),
        TextFormat::Markdown => html_to_markdown(input),
    };
    normalize_whitespace(&strip_boilerplate(&converted))
}
