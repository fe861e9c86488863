use std::fmt::Write as _;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::legal::risk::{RiskFinding, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub finding_id: String,
    pub severity: Severity,
    pub is_selected: bool,
    /// The matched text as it appears in the document (original casing).
    pub text: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    Text { text: String },
    Highlight(Highlight),
}

/// Document text interleaved with highlight markers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotatedText {
    pub segments: Vec<Segment>,
    /// Findings whose highlight text does not occur in the document.
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    finding: usize,
}

fn highlight_matcher(needle: &str) -> Option<Regex> {
    if needle.is_empty() {
        return None;
    }
    match RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Cannot search for highlight text: {}", e);
            None
        }
    }
}

/// True when `needle` occurs in `text`, ignoring case.
pub fn occurs_in(text: &str, needle: &str) -> bool {
    highlight_matcher(needle).is_some_and(|re| re.is_match(text))
}

/// Annotate `text` with the spans of `findings`.
///
/// `selected` marks every span whose finding's highlight text is exactly
/// equal (case-sensitive) to it. Overlapping spans are dropped in favour of
/// the one accepted first, so highlights never nest.
pub fn annotate(text: &str, findings: &[RiskFinding], selected: Option<&str>) -> AnnotatedText {
    let mut spans = Vec::new();
    let mut unmatched = Vec::new();

    for (idx, finding) in findings.iter().enumerate() {
        let before = spans.len();
        if let Some(re) = highlight_matcher(&finding.highlight_text) {
            spans.extend(re.find_iter(text).map(|m| Span {
                start: m.start(),
                end: m.end(),
                finding: idx,
            }));
        }
        if spans.len() == before {
            unmatched.push(finding.id().to_string());
        }
    }

    // Stable sort: equal ranges keep finding order.
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut accepted: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match accepted.last() {
            Some(last) if span.start < last.end => continue,
            _ => accepted.push(span),
        }
    }

    let mut segments = Vec::with_capacity(accepted.len() * 2 + 1);
    let mut cursor = 0;
    for span in accepted {
        if span.start > cursor {
            segments.push(Segment::Text {
                text: text[cursor..span.start].to_string(),
            });
        }
        let finding = &findings[span.finding];
        segments.push(Segment::Highlight(Highlight {
            finding_id: finding.id().to_string(),
            severity: finding.severity,
            is_selected: selected == Some(finding.highlight_text.as_str()),
            text: text[span.start..span.end].to_string(),
            description: finding.description.clone(),
        }));
        cursor = span.end;
    }
    if cursor < text.len() {
        segments.push(Segment::Text {
            text: text[cursor..].to_string(),
        });
    }

    AnnotatedText {
        segments,
        unmatched,
    }
}

fn escape_html(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
}

impl AnnotatedText {
    pub fn highlights(&self) -> impl Iterator<Item = &Highlight> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Highlight(h) => Some(h),
            Segment::Text { .. } => None,
        })
    }

    /// The underlying text with all markers removed.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Text { text } => text.as_str(),
                Segment::Highlight(h) => h.text.as_str(),
            })
            .collect()
    }

    /// Escaped HTML with one `<mark>` element per accepted span.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text { text } => escape_html(text, &mut out),
                Segment::Highlight(h) => {
                    out.push_str("<mark data-finding=\"");
                    escape_html(&h.finding_id, &mut out);
                    let _ = write!(
                        out,
                        "\" data-severity=\"{}\" data-selected=\"{}\" title=\"",
                        h.severity.as_str(),
                        h.is_selected
                    );
                    escape_html(&h.description, &mut out);
                    out.push_str("\">");
                    escape_html(&h.text, &mut out);
                    out.push_str("</mark>");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn finding(id: &str, severity: Severity, text: &str) -> RiskFinding {
        RiskFinding::new(id, "clause", format!("about {id}"), severity, text)
    }

    #[test]
    fn single_high_finding_wraps_its_text_unselected() {
        let text = "a parte infratora pagará multa de 100% do valor total";
        let findings = vec![finding("r1", Severity::High, "multa de 100%")];
        let annotated = annotate(text, &findings, None);

        let highlights: Vec<&Highlight> = annotated.highlights().collect();
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].text, "multa de 100%");
        assert_eq!(highlights[0].severity, Severity::High);
        assert!(!highlights[0].is_selected);
        assert_eq!(annotated.plain_text(), text);
        assert!(annotated.unmatched.is_empty());
    }

    #[test]
    fn search_is_case_insensitive_and_finds_every_occurrence() {
        let text = "Foro de Miami. O FORO DE MIAMI prevalece.";
        let findings = vec![finding("r1", Severity::Medium, "foro de miami")];
        let annotated = annotate(text, &findings, None);

        let matched: Vec<&str> = annotated.highlights().map(|h| h.text.as_str()).collect();
        assert_eq!(matched, vec!["Foro de Miami", "FORO DE MIAMI"]);
    }

    #[test]
    fn selection_compares_stored_highlight_text_exactly() {
        let text = "multa de 100% e MULTA DE 100%";
        let findings = vec![finding("r1", Severity::High, "multa de 100%")];

        let annotated = annotate(text, &findings, Some("multa de 100%"));
        assert!(annotated.highlights().all(|h| h.is_selected));

        let annotated = annotate(text, &findings, Some("MULTA DE 100%"));
        assert!(annotated.highlights().all(|h| !h.is_selected));
    }

    #[test]
    fn overlapping_spans_keep_earliest_then_longest() {
        let text = "pagará multa de 100% do valor total do contrato";
        let findings = vec![
            finding("short", Severity::Low, "multa"),
            finding("long", Severity::High, "multa de 100% do valor"),
            finding("later", Severity::Medium, "valor total"),
            finding("tail", Severity::Low, "contrato"),
        ];
        let annotated = annotate(text, &findings, None);

        let ids: Vec<&str> = annotated
            .highlights()
            .map(|h| h.finding_id.as_str())
            .collect();
        assert_eq!(ids, vec!["long", "tail"]);
        assert_eq!(annotated.plain_text(), text);
    }

    #[test]
    fn identical_ranges_prefer_first_finding() {
        let text = "foro de Miami";
        let findings = vec![
            finding("first", Severity::Low, "Miami"),
            finding("second", Severity::High, "miami"),
        ];
        let annotated = annotate(text, &findings, None);
        let ids: Vec<&str> = annotated
            .highlights()
            .map(|h| h.finding_id.as_str())
            .collect();
        assert_eq!(ids, vec!["first"]);
    }

    #[test]
    fn missing_and_empty_highlights_are_reported_unmatched() {
        let findings = vec![
            finding("gone", Severity::High, "cláusula inexistente"),
            finding("empty", Severity::Low, ""),
        ];
        let annotated = annotate("texto do contrato", &findings, None);
        assert_eq!(annotated.highlights().count(), 0);
        assert_eq!(annotated.unmatched, vec!["gone".to_string(), "empty".to_string()]);
        assert_eq!(annotated.plain_text(), "texto do contrato");
    }

    #[test]
    fn empty_text_and_no_findings_are_fine() {
        assert_eq!(annotate("", &[], None), AnnotatedText::default());
        let annotated = annotate("just text", &[], Some("x"));
        assert_eq!(annotated.to_html(), "just text");
    }

    #[test]
    fn annotation_is_stable() {
        let text = "multa de 100%, foro de Miami, multa";
        let findings = vec![
            finding("a", Severity::High, "multa"),
            finding("b", Severity::Medium, "foro de miami"),
            finding("c", Severity::Low, "multa de 100%"),
        ];
        let first = annotate(text, &findings, Some("multa"));
        let second = annotate(text, &findings, Some("multa"));
        assert_eq!(first, second);
        assert_eq!(first.to_html(), second.to_html());
    }

    #[test]
    fn accepted_spans_never_overlap() {
        let text = "aaaa bbbb aaaa";
        let findings = vec![
            finding("a2", Severity::Low, "aa"),
            finding("ab", Severity::High, "a bb"),
            finding("b", Severity::Medium, "bbbb aa"),
        ];
        let annotated = annotate(text, &findings, None);
        assert_eq!(annotated.plain_text(), text);

        let mut offset = 0;
        let mut ranges = Vec::new();
        for segment in &annotated.segments {
            let len = match segment {
                Segment::Text { text } => text.len(),
                Segment::Highlight(h) => {
                    ranges.push((offset, offset + h.text.len()));
                    h.text.len()
                }
            };
            offset += len;
        }
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlap in {ranges:?}");
        }
    }

    #[test]
    fn html_escapes_text_and_attributes() {
        let findings = vec![RiskFinding::new(
            "r1",
            "c",
            "say \"no\"",
            Severity::Medium,
            "<b>",
        )];
        let annotated = annotate("x <b> & y", &findings, Some("<b>"));
        assert_eq!(
            annotated.to_html(),
            "x <mark data-finding=\"r1\" data-severity=\"medium\" data-selected=\"true\" \
             title=\"say &quot;no&quot;\">&lt;b&gt;</mark> &amp; y"
        );
    }

    #[test]
    fn text_inside_redaction_tokens_is_not_matchable() {
        assert!(!occurs_in("CNPJ [CNPJ REDACTED]", "12.345.678/0001-99"));
        assert!(occurs_in("CNPJ 12.345.678/0001-99", "cnpj 12.345.678/0001-99"));
    }
}
