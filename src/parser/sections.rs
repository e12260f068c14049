use std::cmp::Ordering;

use super::headings::HeadingCandidate;

/// Bodies at or below this length are noise (empty spans, false-positive
/// headings) and are discarded.
const MIN_BODY_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub body: String,
    pub rank: f64,
}

#[derive(Debug, Default)]
pub struct Segmentation {
    /// Sections in insertion order (the confidence-priority scan order).
    pub sections: Vec<Section>,
    /// Headings that were detected structurally but could not be located in
    /// the flattened text stream, e.g. when inline markup split the heading
    /// text across nodes. Surfaced so silent drops stay diagnosable.
    pub unmatched_headings: usize,
}

/// Carve the flattened text-node stream into titled spans.
///
/// Headings are scanned in descending-confidence order (stable for ties).
/// Each section runs from the heading's first substring match to the nearest
/// subsequent match of any later heading, regardless of that heading's rank.
pub fn segment_sections(nodes: &[String], headings: &[HeadingCandidate]) -> Segmentation {
    let mut ordered: Vec<&HeadingCandidate> = headings.iter().collect();
    ordered.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut result = Segmentation::default();

    for (i, heading) in ordered.iter().enumerate() {
        let Some(start) = find_from(nodes, 0, &heading.text) else {
            result.unmatched_headings += 1;
            continue;
        };

        let mut end = nodes.len();
        for later in &ordered[i + 1..] {
            if let Some(idx) = find_from(nodes, start + 1, &later.text) {
                if idx < end {
                    end = idx;
                }
            }
        }

        let body = nodes[start + 1..end].join("\n");
        if body.chars().count() > MIN_BODY_CHARS {
            result.sections.push(Section {
                title: heading.text.clone(),
                body,
                rank: heading.confidence,
            });
        }
    }

    result
}

/// First node at or after `start` containing `needle` as a substring.
/// Substring rather than equality: heading text may sit inside a node with
/// surrounding markup artifacts.
fn find_from(nodes: &[String], start: usize, needle: &str) -> Option<usize> {
    nodes
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, node)| node.contains(needle))
        .map(|(idx, _)| idx)
}
