//! Splits sanitized email HTML into heading-attributed content blocks.
//!
//! Newsletter mailers wrap each logical paragraph in a marker container
//! (`div.text-block` by default, a convention of the producing templates,
//! not a rule of HTML). The segmenter walks the document once in order,
//! tracking the most recent section heading, and emits one [`ContentBlock`]
//! per marker with normalized text and de-obfuscated outbound links.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Default CSS selector marking one logical content block.
pub const DEFAULT_BLOCK_MARKER: &str = "div.text-block";

/// Default CSS selector for section headings.
pub const DEFAULT_HEADING_MARKER: &str = "h1";

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

static URL_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://").unwrap());

// ── Data model ──────────────────────────────────────────────────────

/// One segmented unit of email body text, attributed to a heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// From header of the owning message.
    pub sender: String,
    /// Subject of the owning message.
    pub subject: String,
    /// Nearest section heading preceding this block in document order.
    pub heading: Option<String>,
    /// Normalized plain text. Always longer than one character.
    pub content: String,
    /// Resolved outbound URLs, insertion-order, duplicates removed.
    pub links: Vec<String>,
}

// ── Segmenter ───────────────────────────────────────────────────────

/// Stateless block extractor over sanitized HTML.
#[derive(Debug, Clone)]
pub struct Segmenter {
    block_selector: Selector,
    heading_selector: Selector,
}

impl Segmenter {
    /// Builds a segmenter with the default marker convention.
    pub fn new() -> Self {
        Self {
            block_selector: Selector::parse(DEFAULT_BLOCK_MARKER).expect("block selector"),
            heading_selector: Selector::parse(DEFAULT_HEADING_MARKER).expect("heading selector"),
        }
    }

    /// Builds a segmenter targeting a different mailer convention.
    pub fn with_markers(block: &str, heading: &str) -> Result<Self, ExtractError> {
        let block_selector = Selector::parse(block).map_err(|e| ExtractError::InvalidSelector {
            selector: block.to_string(),
            reason: e.to_string(),
        })?;
        let heading_selector =
            Selector::parse(heading).map_err(|e| ExtractError::InvalidSelector {
                selector: heading.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            block_selector,
            heading_selector,
        })
    }

    /// Extracts content blocks from sanitized HTML in document order.
    ///
    /// A single pass walks every element once, updating the last-seen
    /// heading as it goes, so attribution is "most recent heading wins"
    /// across the whole document rather than within any one subtree.
    /// Marker elements that contain a heading are treated as heading
    /// containers, not content, and skipped; so are blocks whose
    /// normalized text is one character or shorter.
    pub fn segment(&self, html: &str, subject: &str, sender: &str) -> Vec<ContentBlock> {
        let document = Html::parse_document(html);
        let mut last_heading: Option<String> = None;
        let mut blocks = Vec::new();

        for element in document.root_element().descendent_elements() {
            if self.heading_selector.matches(&element) {
                last_heading = Some(element_text(element));
                continue;
            }
            if !self.block_selector.matches(&element) {
                continue;
            }
            if element.select(&self.heading_selector).next().is_some() {
                continue;
            }

            let content = element_text(element);
            if content.chars().count() <= 1 {
                continue;
            }

            blocks.push(ContentBlock {
                sender: sender.to_string(),
                subject: subject.to_string(),
                heading: last_heading.clone(),
                content,
                links: collect_links(element),
            });
        }

        blocks
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Text normalization ──────────────────────────────────────────────

fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined)
}

/// Collapses whitespace runs (including NBSP) to single ASCII spaces and
/// trims both ends.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }
    }
    out
}

// ── Link resolution ─────────────────────────────────────────────────

fn collect_links(block: ElementRef<'_>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in block.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let resolved = resolve_link(href);
        if resolved.is_empty() {
            continue;
        }
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }
    links
}

/// Recovers the real destination from a tracking-wrapped href.
///
/// Mail trackers nest the destination inside a redirect query parameter,
/// percent-encoded. Decode the href, then take the last embedded
/// `http(s)://` URL (trackers put the true destination last), reading up
/// to the first character that cannot appear in a URL here. An href with
/// no embedded absolute URL is returned unchanged.
fn resolve_link(href: &str) -> String {
    let decoded = match urlencoding::decode(href) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => href.to_string(),
    };
    let Some(start) = URL_SCHEME.find_iter(&decoded).last().map(|m| m.start()) else {
        return href.to_string();
    };
    let tail = &decoded[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>'))
        .unwrap_or(tail.len());
    tail[..end].to_string()
}

// ── Tests ───────────────────────────────────────────────────────────
