pub mod document;
pub mod headings;
pub mod relevance;
pub mod sections;
pub mod validity;

pub use document::Document;
pub use sections::{Section, Segmentation};

/// Full segmentation pipeline: detect heading candidates, dedupe them, then
/// carve the flattened text stream into titled spans. Pure and deterministic;
/// empty results encode failure, nothing here errors.
pub fn segment(doc: &Document) -> Segmentation {
    let candidates = headings::detect_headings(doc);
    let unique = headings::dedupe(candidates);
    let nodes = doc.text_nodes();
    sections::segment_sections(&nodes, &unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_scenario_end_to_end() {
        let filler = "General introductory material about the annual meeting that runs well past \
                      the minimum body length so it is not mistaken for a heading of any kind.";
        let risk = "Our operating results could fluctuate due to market conditions, supplier \
                    concentration and seasonality, any of which could affect quarterly revenue.";
        let html = format!(
            "<html><body>\
             <p>INTRO</p>\
             <p>{filler}</p>\
             <h2>EXECUTIVE COMPENSATION</h2>\
             <p>&lt;table&gt;&lt;tr&gt;&lt;td&gt;Name&lt;/td&gt;&lt;td&gt;Salary&lt;/td&gt;\
             &lt;td&gt;Bonus&lt;/td&gt;&lt;td&gt;Stock Awards&lt;/td&gt;&lt;td&gt;Total&lt;/td&gt;&lt;/tr&gt;\
             &lt;tr&gt;&lt;td&gt;Jane Roe&lt;/td&gt;&lt;td&gt;950,000&lt;/td&gt;&lt;td&gt;400,000&lt;/td&gt;\
             &lt;td&gt;2,100,000&lt;/td&gt;&lt;td&gt;3,450,000&lt;/td&gt;&lt;/tr&gt;&lt;/table&gt;</p>\
             <h2>RISK FACTORS</h2>\
             <p>{risk}</p>\
             </body></html>"
        );

        let doc = Document::parse(&html);
        let seg = segment(&doc);
        let titles: Vec<_> = seg.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["EXECUTIVE COMPENSATION", "RISK FACTORS"]);
        assert_eq!(seg.unmatched_headings, 0);

        let relevant = relevance::classify_relevance(&seg.sections);
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].title, "EXECUTIVE COMPENSATION");
        assert!(relevant[0].body.contains("Jane Roe"));
    }

    #[test]
    fn segmentation_is_idempotent() {
        let html = std::fs::read_to_string("tests/fixtures/acme_def14a.htm").unwrap();
        let doc = Document::parse(&html);
        let first = segment(&doc);
        let second = segment(&doc);
        assert_eq!(first.sections, second.sections);
        assert_eq!(first.unmatched_headings, second.unmatched_headings);
    }

    #[test]
    fn empty_document_yields_empty_everything() {
        let doc = Document::parse("");
        let seg = segment(&doc);
        assert!(seg.sections.is_empty());
        assert_eq!(seg.unmatched_headings, 0);
        assert!(relevance::classify_relevance(&seg.sections).is_empty());
    }

    #[test]
    fn acme_fixture_sections_and_validity() {
        let html = std::fs::read_to_string("tests/fixtures/acme_def14a.htm").unwrap();
        let doc = Document::parse(&html);

        assert!(validity::check_validity(&doc.full_text()).valid);

        let seg = segment(&doc);
        assert_eq!(seg.unmatched_headings, 0);
        let titles: Vec<_> = seg.sections.iter().map(|s| s.title.as_str()).collect();
        assert!(titles.contains(&"EXECUTIVE COMPENSATION"));
        assert!(titles.contains(&"CORPORATE GOVERNANCE"));
        assert!(titles.contains(&"Security Ownership of Certain Beneficial Owners"));
        assert!(titles.contains(&"Questions and Answers About the Annual Meeting"));

        let comp = seg
            .sections
            .iter()
            .find(|s| s.title == "EXECUTIVE COMPENSATION")
            .unwrap();
        assert!(comp.body.contains("Jane Roe"));
        assert!(!comp.body.contains("CORPORATE GOVERNANCE"));

        let relevant = relevance::classify_relevance(&seg.sections);
        let kept: Vec<_> = relevant.iter().map(|s| s.title.as_str()).collect();
        assert!(kept.contains(&"EXECUTIVE COMPENSATION"));
        assert!(kept.contains(&"CORPORATE GOVERNANCE"));
        assert!(!kept.contains(&"Questions and Answers About the Annual Meeting"));
        assert!(!kept.contains(&"Security Ownership of Certain Beneficial Owners"));
    }
}
