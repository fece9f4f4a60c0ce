/*!
 * Minimal markup scanning for the translation pages.
 *
 * The listing is a flat sequence of textareas plus a pagination link, so a
 * handful of regular expressions is enough; no DOM is built.
 */

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static TEXTAREA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<textarea\b([^>]*)>(.*?)</textarea\s*>").expect("valid regex"));
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>").expect("valid regex"));
static CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(div|span|p|td|li)\b[^>]*\bid\s*=\s*["']context_([^"']+)["'][^>]*>(.*?)</(?:div|span|p|td|li)\s*>"#)
        .expect("valid regex")
});
static ID_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)id\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static CLASS_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)class\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static HREF_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)href\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static DISABLED_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|\s)(?:disabled(?:\s|=|/|$)|aria-disabled\s*=\s*["']true["'])"#).expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex"));

/// A link found in the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Raw href attribute, entity-decoded
    pub href: Option<String>,
    /// Class names
    pub classes: Vec<String>,
    /// Whether the link is marked as disabled
    pub disabled: bool,
}

impl Anchor {
    /// Whether the link cannot lead anywhere
    pub fn is_inert(&self) -> bool {
        if self.disabled {
            return true;
        }
        match self.href.as_deref().map(str::trim) {
            None | Some("") | Some("#") => true,
            Some(href) => href.to_ascii_lowercase().starts_with("javascript:"),
        }
    }
}

/// All textareas with an id, in document order, with decoded values
pub fn textarea_values(html: &str) -> Vec<(String, String)> {
    TEXTAREA_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let id = ID_ATTR_RE.captures(&caps[1])?.get(1)?.as_str().to_string();
            Some((id, textarea_text(&caps[2])))
        })
        .collect()
}

/// Plain text of every `context_<id>` element, keyed by `<id>`
pub fn context_texts(html: &str) -> HashMap<String, String> {
    CONTEXT_RE
        .captures_iter(html)
        .map(|caps| {
            let text = TAG_RE.replace_all(&caps[3], " ");
            let text = unescape_html(text.split_whitespace().collect::<Vec<_>>().join(" ").as_str());
            (caps[2].to_string(), text)
        })
        .collect()
}

/// First link carrying the given class
pub fn find_anchor_with_class(html: &str, class: &str) -> Option<Anchor> {
    ANCHOR_RE.captures_iter(html).find_map(|caps| {
        let attrs = &caps[1];
        let classes: Vec<String> = CLASS_ATTR_RE
            .captures(attrs)
            .map(|c| c[1].split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        if !classes.iter().any(|c| c == class) {
            return None;
        }
        Some(Anchor {
            href: HREF_ATTR_RE.captures(attrs).map(|c| unescape_html(&c[1])),
            disabled: DISABLED_ATTR_RE.is_match(attrs) || classes.iter().any(|c| c == "disabled"),
            classes,
        })
    })
}

/// Escape text for inclusion in markup
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Decode character references; unknown named entities are kept verbatim
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// Browsers drop a single newline right after the opening tag
fn textarea_text(raw: &str) -> String {
    let raw = raw
        .strip_prefix("\r\n")
        .or_else(|| raw.strip_prefix('\n'))
        .unwrap_or(raw);
    unescape_html(raw)
}
