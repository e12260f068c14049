use scraper::{ElementRef, Html, Selector};

/// Parsed HTML filing. Immutable once built; one per pipeline invocation.
///
/// `scraper::Html` is not `Send`, so each worker parses its own copy instead
/// of sharing documents across tasks.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(raw: &str) -> Self {
        Self {
            html: Html::parse_document(raw),
        }
    }

    /// Ordered, trimmed, non-empty text nodes. This flattened stream is the
    /// search space for positional heading matching; callers flatten once and
    /// reuse the result rather than re-walking the tree per heading.
    pub fn text_nodes(&self) -> Vec<String> {
        self.html
            .root_element()
            .descendants()
            .filter_map(|node| node.value().as_text())
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .map(|text| text.to_string())
            .collect()
    }

    /// Full document text, used by the validity gate.
    pub fn full_text(&self) -> String {
        self.text_nodes().join("\n")
    }

    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> {
        self.html.select(selector)
    }
}

/// Element text with outer whitespace stripped. Inner runs are collapsed
/// later, during candidate normalization.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_nodes_trimmed_and_ordered() {
        let doc = Document::parse("<html><body><p>  first  </p><p></p><p>second</p></body></html>");
        assert_eq!(doc.text_nodes(), vec!["first", "second"]);
    }

    #[test]
    fn empty_document_has_no_text_nodes() {
        let doc = Document::parse("");
        assert!(doc.text_nodes().is_empty());
        assert!(doc.full_text().is_empty());
    }

    #[test]
    fn nested_markup_splits_text_nodes() {
        let doc = Document::parse("<p>Summary <b>Compensation</b> Table</p>");
        assert_eq!(doc.text_nodes(), vec!["Summary", "Compensation", "Table"]);
    }
}
