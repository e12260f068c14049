use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::sections::Section;

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());

const COMPENSATION_KEYWORDS: &[&str] = &[
    "summary compensation table",
    "executive compensation",
    "compensation discussion",
    "director compensation",
];

const BIOGRAPHY_KEYWORDS: &[&str] = &[
    "executive officers",
    "board of directors",
    "biographical information",
    "director nominees",
];

/// How much of the body participates in keyword matching.
const BODY_PREVIEW_CHARS: usize = 1000;

/// Select the sections likely to hold compensation or biographical data.
/// Returns an empty vector when nothing qualifies; order follows the input.
///
/// Compensation matches additionally require a table in the re-parsed body:
/// compensation figures are reported in tables, and prose that merely
/// mentions compensation (a forward-looking-statements disclaimer, say) is
/// noise. Biography sections are prose and carry no such constraint.
pub fn classify_relevance(sections: &[Section]) -> Vec<Section> {
    sections
        .iter()
        .filter(|s| is_relevant(s))
        .cloned()
        .collect()
}

fn is_relevant(section: &Section) -> bool {
    let title = section.title.to_lowercase();
    let preview: String = section
        .body
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect::<String>()
        .to_lowercase();

    let matches_any =
        |keywords: &[&str]| keywords.iter().any(|k| title.contains(k) || preview.contains(k));

    if matches_any(BIOGRAPHY_KEYWORDS) {
        return true;
    }
    matches_any(COMPENSATION_KEYWORDS) && body_has_table(&section.body)
}

fn body_has_table(body: &str) -> bool {
    let fragment = Html::parse_fragment(body);
    fragment.select(&TABLE_SEL).next().is_some()
}
