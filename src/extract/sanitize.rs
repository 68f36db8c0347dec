//! HTML sanitization for newsletter email bodies.
//!
//! Email HTML is adversarial: tracking pixels, hidden preheader text,
//! zero-width padding, and deeply nested table layouts. `sanitize` parses
//! leniently (html5ever via `scraper`, so malformed input never fails),
//! removes everything invisible or non-content, flattens presentational
//! wrappers, and re-serializes the body's inner content.

use std::sync::LazyLock;

use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};

// ── Sanitization policy ─────────────────────────────────────────────

/// Purely structural/presentational wrappers. The tag is removed, its
/// children stay in place, so table layouts collapse into flat text flow
/// while preserving reading order.
const UNWRAP_TAGS: [&str; 8] = ["table", "thead", "tbody", "tr", "td", "th", "br", "strong"];

/// Non-content elements. The tag and all descendants are removed.
const DROP_TAGS: [&str; 6] = ["style", "script", "meta", "link", "head", "img"];

/// Inline-style fragments that hide an element. Matched as substrings of
/// the lowercased style with spaces removed.
const HIDDEN_STYLE_HINTS: [&str; 9] = [
    "display:none",
    "visibility:hidden",
    "opacity:0",
    "max-height:0",
    "maxheight:0",
    "height:0",
    "width:0",
    "font-size:0",
    "line-height:0",
];

/// Elements serialized without a closing tag.
const VOID_TAGS: [&str; 10] = [
    "area", "base", "col", "embed", "hr", "input", "param", "source", "track", "wbr",
];

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("body selector"));

// ── Sanitizer ───────────────────────────────────────────────────────

/// Cleans a raw HTML email body down to its visible content.
///
/// In a single walk over the parsed tree this drops comments, hidden
/// elements (`hidden` attribute, `aria-hidden="true"`, or a hiding inline
/// style), and the [`DROP_TAGS`] subtrees; unwraps the [`UNWRAP_TAGS`]
/// wrappers; and strips zero-width characters (U+200B..U+200D, U+FEFF)
/// from the remaining text. Returns the serialized inner content of
/// `<body>` when present, otherwise the serialized document.
///
/// Never fails: the worst case for garbage input is an empty string.
/// Output is a fixed point, so `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    match document.select(&BODY_SELECTOR).next() {
        Some(body) if !is_hidden(body.value()) => write_children(body, &mut out),
        Some(_) => {}
        None => write_element(document.root_element(), &mut out),
    }
    out
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            write_text(text, out);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            write_element(child_element, out);
        }
        // Comments, doctypes, and processing instructions do not survive.
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let value = element.value();
    let name = value.name();

    if is_hidden(value) || DROP_TAGS.contains(&name) {
        return;
    }
    if UNWRAP_TAGS.contains(&name) {
        write_children(element, out);
        return;
    }

    out.push('<');
    out.push_str(name);
    // Parser attribute order is not guaranteed; sort for stable output.
    let mut attrs: Vec<(&str, &str)> = value.attrs().collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    for (attr, attr_value) in attrs {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        write_attr_value(attr_value, out);
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&name) {
        return;
    }
    write_children(element, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn is_hidden(element: &Element) -> bool {
    if element.attr("hidden").is_some() {
        return true;
    }
    if element.attr("aria-hidden") == Some("true") {
        return true;
    }
    match element.attr("style") {
        Some(style) => {
            let style = style.to_lowercase().replace(' ', "");
            HIDDEN_STYLE_HINTS.iter().any(|hint| style.contains(hint))
        }
        None => false,
    }
}

fn write_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            // Zero-width characters pad preheaders; drop them outright.
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' => {}
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn write_attr_value(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Hidden element tests ────────────────────────────────────────

    #[test]
    fn removes_hidden_attribute_elements() {
        let html = r#"<body><div hidden>preheader junk</div><p>visible</p></body>"#;
        let cleaned = sanitize(html);
        assert!(!cleaned.contains("preheader junk"));
        assert!(cleaned.contains("visible"));
    }

    #[test]
    fn removes_aria_hidden_elements() {
        let html = r#"<div aria-hidden="true">screen reader skip</div><p>kept</p>"#;
        let cleaned = sanitize(html);
        assert!(!cleaned.contains("screen reader skip"));
        assert!(cleaned.contains("kept"));
    }

    #[test]
    fn removes_inline_style_hidden_elements() {
        let html = concat!(
            r#"<div style="display: none">a</div>"#,
            r#"<div style="VISIBILITY: HIDDEN">b</div>"#,
            r#"<div style="max-height:0;overflow:hidden">c</div>"#,
            r#"<div style="font-size: 0px">d</div>"#,
            r#"<p>real content</p>"#,
        );
        let cleaned = sanitize(html);
        for hidden in [">a<", ">b<", ">c<", ">d<"] {
            assert!(!cleaned.contains(hidden), "hidden text leaked: {hidden}");
        }
        assert!(cleaned.contains("real content"));
    }

    #[test]
    fn keeps_elements_with_benign_styles() {
        let html = r#"<div style="color: red; width: 600px">shown</div>"#;
        assert!(sanitize(html).contains("shown"));
    }

    // ── Structural unwrap tests ─────────────────────────────────────

    #[test]
    fn unwraps_table_layout_but_keeps_text() {
        let cleaned = sanitize("<table><tr><td>Hello</td></tr></table>");
        assert!(cleaned.contains("Hello"));
        assert!(!cleaned.contains("<table"));
        assert!(!cleaned.contains("<tr"));
        assert!(!cleaned.contains("<td"));
        assert!(!cleaned.contains("<tbody"));
    }

    #[test]
    fn unwraps_strong_and_br() {
        let cleaned = sanitize("<p>Hi <strong>there</strong><br>friend</p>");
        assert_eq!(cleaned, "<p>Hi therefriend</p>");
    }

    // ── Drop tests ──────────────────────────────────────────────────

    #[test]
    fn drops_non_content_elements() {
        let html = concat!(
            "<head><style>.a{color:red}</style><meta charset=\"utf-8\"></head>",
            "<body><script>alert(1)</script>",
            "<img src=\"https://t.example/pixel.gif\">",
            "<p>body text</p></body>",
        );
        let cleaned = sanitize(html);
        assert!(!cleaned.contains("color:red"));
        assert!(!cleaned.contains("alert"));
        assert!(!cleaned.contains("pixel.gif"));
        assert!(cleaned.contains("body text"));
    }

    #[test]
    fn removes_comments() {
        let cleaned = sanitize("<p>a<!-- tracking note -->b</p>");
        assert!(!cleaned.contains("tracking note"));
        assert!(cleaned.contains("<p>ab</p>"));
    }

    // ── Text handling tests ─────────────────────────────────────────

    #[test]
    fn strips_zero_width_characters() {
        let html = "<p>\u{200B}\u{200C}\u{200D}\u{FEFF}Hi</p>";
        assert_eq!(sanitize(html), "<p>Hi</p>");
    }

    #[test]
    fn escapes_special_characters_in_text() {
        let cleaned = sanitize("<p>a &amp; b &lt; c</p>");
        assert_eq!(cleaned, "<p>a &amp; b &lt; c</p>");
    }

    // ── Contract tests ──────────────────────────────────────────────

    #[test]
    fn returns_body_inner_content_only() {
        let html = "<html><head><title>t</title></head><body><p>x</p></body></html>";
        assert_eq!(sanitize(html), "<p>x</p>");
    }

    #[test]
    fn tolerates_malformed_html() {
        let cleaned = sanitize("<div><p>unclosed <span>nested");
        assert!(cleaned.contains("unclosed"));
        assert!(cleaned.contains("nested"));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let fixtures = [
            concat!(
                "<html><head><style>p{}</style></head><body>",
                "<!-- header --><div hidden>pre</div>",
                "<table><tr><td><h1>News</h1></td></tr>",
                "<tr><td><div class=\"text-block\" style=\"color:blue\">",
                "Some <strong>bold</strong> claims &amp; more</div></td></tr></table>",
                "<img src=\"pix.gif\"></body></html>",
            ),
            "<p>plain</p>",
            "already plain text",
            "",
        ];
        for fixture in fixtures {
            let once = sanitize(fixture);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {fixture:?}");
        }
    }

    #[test]
    fn preserves_attribute_content() {
        let cleaned = sanitize(r#"<a href="https://example.com/x?a=1&amp;b=2">link</a>"#);
        assert!(cleaned.contains(r#"href="https://example.com/x?a=1&amp;b=2""#));
    }
}
