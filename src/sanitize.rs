//! Furigana HTML sanitizer.
//!
//! Reduces untrusted model output to escaped text plus canonical
//! `<ruby>base<rt>reading</rt></ruby>` fragments. Anything that does not
//! match the canonical shape is escaped as literal text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Unvalidated HTML as returned by the LLM.
///
/// Must pass through [`sanitize`] before it is stored or rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHtml(String);

impl RawHtml {
    pub fn new(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// HTML containing only escaped literal text and canonical
/// `<ruby>base<rt>reading</rt></ruby>` fragments without attributes.
///
/// [`sanitize`] is the only constructor; deserializing re-sanitizes, so a
/// value of this type is safe to render no matter where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SanitizedHtml(String);

impl SanitizedHtml {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for SanitizedHtml {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(sanitize(&raw))
    }
}

/// One well-formed ruby fragment. Attributes on `<ruby>` or `<rt>` make the
/// tag fail the match, so an attributed fragment falls through as literal
/// text. Content between `</rt>` and `</ruby>` is matched but discarded.
static RUBY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<ruby\s*>(.*?)<rt\s*>(.*?)</rt\s*>.*?</ruby>").unwrap()
});

/// Any tag-like substring inside a ruby base capture.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Reduce raw HTML to escaped text plus canonical ruby fragments.
///
/// Total function: any input produces a valid result, malformed markup
/// degrades to visible escaped text rather than an error.
pub fn sanitize(raw: &str) -> SanitizedHtml {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;

    for caps in RUBY_RE.captures_iter(raw) {
        let whole = caps.get(0).unwrap();
        out.push_str(&escape_html(&raw[last..whole.start()]));

        // Base text may contain nested tags (e.g. <b>); strip them and
        // re-emit the fragment in canonical form.
        let base = TAG_RE.replace_all(&caps[1], "");
        let reading = caps[2].trim();

        out.push_str("<ruby>");
        out.push_str(&escape_html(base.trim()));
        out.push_str("<rt>");
        out.push_str(&escape_html(reading));
        out.push_str("</rt></ruby>");

        last = whole.end();
    }

    out.push_str(&escape_html(&raw[last..]));
    SanitizedHtml(out)
}

/// Escape `&`, `<`, `>` and `"` as character entities.
///
/// An `&` that already begins one of the entities this module emits is kept
/// as-is, which makes [`sanitize`] a fixed point on its own output.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.char_indices() {
        match ch {
            '&' if !starts_with_entity(&text[i..]) => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn starts_with_entity(s: &str) -> bool {
    ["&amp;", "&lt;", "&gt;", "&quot;"]
        .iter()
        .any(|entity| s.starts_with(entity))
}
