use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use super::document::{element_text, Document};

static HEADING_TAG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").unwrap());
static ANY_EL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());
static HEADING_STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)font-weight.*?bold|font-size.*?1[2-9]px").unwrap());

/// Class-attribute substrings that suggest a heading element.
const HEADING_CLASS_PATTERNS: &[&str] = &["heading", "title", "header", "section"];

/// Candidates longer than this are mis-detections (a styled paragraph, not a
/// heading) and are dropped during normalization.
const MAX_TITLE_CHARS: usize = 200;

/// Style and text-pattern signals ignore element text at or above this length.
const MAX_SIGNAL_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Tag,
    CssClass,
    Style,
    TextPattern,
}

#[derive(Debug, Clone)]
pub struct HeadingCandidate {
    pub text: String,
    pub confidence: f64,
    pub signal: Signal,
}

/// Scan the document with four independent signals. Signals overlap freely;
/// duplicates are resolved by `dedupe`, which relies on this evaluation order
/// (tag, class, style, text pattern).
pub fn detect_headings(doc: &Document) -> Vec<HeadingCandidate> {
    let mut candidates = Vec::new();

    for el in doc.select(&HEADING_TAG_SEL) {
        candidates.push(HeadingCandidate {
            text: element_text(el),
            confidence: 0.9,
            signal: Signal::Tag,
        });
    }

    for el in doc.select(&ANY_EL_SEL) {
        if let Some(class) = el.value().attr("class") {
            let class = class.to_ascii_lowercase();
            if HEADING_CLASS_PATTERNS.iter().any(|p| class.contains(p)) {
                candidates.push(HeadingCandidate {
                    text: element_text(el),
                    confidence: 0.8,
                    signal: Signal::CssClass,
                });
            }
        }
    }

    for el in doc.select(&ANY_EL_SEL) {
        if let Some(style) = el.value().attr("style") {
            if HEADING_STYLE_RE.is_match(style) {
                let text = element_text(el);
                if text.chars().count() < MAX_SIGNAL_TEXT_CHARS {
                    candidates.push(HeadingCandidate {
                        text,
                        confidence: 0.7,
                        signal: Signal::Style,
                    });
                }
            }
        }
    }

    for text in doc.text_nodes() {
        let len = text.chars().count();
        if len >= MAX_SIGNAL_TEXT_CHARS {
            continue;
        }
        if is_all_caps(&text) && len > 10 {
            candidates.push(HeadingCandidate {
                text,
                confidence: 0.6,
                signal: Signal::TextPattern,
            });
        } else if text.ends_with(':') {
            candidates.push(HeadingCandidate {
                text,
                confidence: 0.5,
                signal: Signal::TextPattern,
            });
        }
    }

    candidates
}

/// Collapse raw candidates to one entry per normalized text, first seen wins.
/// Output preserves first-insertion order.
pub fn dedupe(raw: Vec<HeadingCandidate>) -> Vec<HeadingCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();

    for mut candidate in raw {
        let text = normalize_ws(&candidate.text);
        if text.is_empty() || text.chars().count() >= MAX_TITLE_CHARS || seen.contains(&text) {
            continue;
        }
        seen.insert(text.clone());
        candidate.text = text;
        unique.push(candidate);
    }

    unique
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// At least one alphabetic character and no lowercase ones.
fn is_all_caps(s: &str) -> bool {
    let mut has_upper = false;
    for c in s.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_upper = true;
        }
    }
    has_upper
}
