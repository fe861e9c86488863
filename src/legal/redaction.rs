use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;

use crate::config::RedactionConfig;

pub const CPF_TOKEN: &str = "[CPF REDACTED]";
pub const CNPJ_TOKEN: &str = "[CNPJ REDACTED]";
pub const ENTITY_TOKEN: &str = "[ENTITY REDACTED]";

const TOKENS: &[&str] = &[CPF_TOKEN, CNPJ_TOKEN, ENTITY_TOKEN];

const CPF_PATTERN: &str = r"\d{3}\.\d{3}\.\d{3}-\d{2}";
const CNPJ_PATTERN: &str = r"\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Cpf,
    Cnpj,
    Entity,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpf => "cpf",
            Self::Cnpj => "cnpj",
            Self::Entity => "entity",
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    Literals(AhoCorasick),
}

impl Matcher {
    fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            Self::Pattern(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            Self::Literals(ac) => ac.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct RedactionRule {
    kind: RuleKind,
    token: &'static str,
    matcher: Matcher,
}

/// Matches replaced per rule in one `redact_with_report` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub counts: Vec<(RuleKind, usize)>,
}

impl RedactionReport {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    pub fn count(&self, kind: RuleKind) -> usize {
        self.counts
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| n)
            .sum()
    }
}

/// Ordered redaction rule table: CPF, then CNPJ, then entity names.
/// Tokens are digit-free, so redacting redacted text changes nothing.
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<RedactionRule>,
}

fn pattern_rule(kind: RuleKind, pattern: &str, token: &'static str) -> Option<RedactionRule> {
    match Regex::new(pattern) {
        Ok(re) => Some(RedactionRule {
            kind,
            token,
            matcher: Matcher::Pattern(re),
        }),
        Err(e) => {
            tracing::warn!("Skipping {} redaction rule: {}", kind.as_str(), e);
            None
        }
    }
}

/// An entity name is usable only if no rule could ever match it inside a token.
fn entity_is_safe(entity: &str) -> bool {
    !entity.is_empty()
        && !entity.contains('[')
        && !entity.contains(']')
        && !TOKENS.iter().any(|t| t.contains(entity))
}

impl Redactor {
    /// Build the default rule table with the given entity allow-list.
    pub fn new(entities: &[String]) -> Self {
        let mut rules = Vec::with_capacity(3);
        rules.extend(pattern_rule(RuleKind::Cpf, CPF_PATTERN, CPF_TOKEN));
        rules.extend(pattern_rule(RuleKind::Cnpj, CNPJ_PATTERN, CNPJ_TOKEN));

        let mut names: Vec<&str> = Vec::new();
        for entity in entities {
            let entity = entity.as_str();
            if !entity_is_safe(entity) {
                tracing::warn!(
                    "Refusing entity redaction name that overlaps a redaction token: {:?}",
                    entity
                );
                continue;
            }
            if !names.contains(&entity) {
                names.push(entity);
            }
        }

        if !names.is_empty() {
            match AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .build(&names)
            {
                Ok(ac) => rules.push(RedactionRule {
                    kind: RuleKind::Entity,
                    token: ENTITY_TOKEN,
                    matcher: Matcher::Literals(ac),
                }),
                Err(e) => tracing::warn!("Skipping entity redaction rule: {}", e),
            }
        }

        Self { rules }
    }

    pub fn from_config(config: &RedactionConfig) -> Self {
        Self::new(&config.entities)
    }

    pub fn rule_kinds(&self) -> Vec<RuleKind> {
        self.rules.iter().map(|r| r.kind).collect()
    }

    pub fn redact(&self, text: &str) -> String {
        self.redact_with_report(text).0
    }

    /// Redact `text` and report how many matches each rule replaced.
    pub fn redact_with_report(&self, text: &str) -> (String, RedactionReport) {
        let mut current = text.to_string();
        let mut report = RedactionReport::default();

        for rule in &self.rules {
            let spans = rule.matcher.spans(&current);
            if spans.is_empty() {
                report.counts.push((rule.kind, 0));
                continue;
            }

            let mut out = String::with_capacity(current.len());
            let mut cursor = 0;
            for &(start, end) in &spans {
                out.push_str(&current[cursor..start]);
                out.push_str(rule.token);
                cursor = end;
            }
            out.push_str(&current[cursor..]);

            report.counts.push((rule.kind, spans.len()));
            current = out;
        }

        (current, report)
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::from_config(&RedactionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cnpj_is_masked_with_its_token() {
        let redactor = Redactor::default();
        assert_eq!(redactor.redact("CNPJ 12.345.678/0001-99"), "CNPJ [CNPJ REDACTED]");
    }

    #[test]
    fn cpf_and_entities_are_masked() {
        let redactor = Redactor::default();
        let (out, report) = redactor.redact_with_report(
            "Global Logistics SA, representada por CPF 123.456.789-09, e TechFlow Corp.",
        );
        assert_eq!(
            out,
            "[ENTITY REDACTED], representada por CPF [CPF REDACTED], e [ENTITY REDACTED]."
        );
        assert_eq!(report.count(RuleKind::Cpf), 1);
        assert_eq!(report.count(RuleKind::Entity), 2);
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn entity_matching_is_case_sensitive() {
        let redactor = Redactor::default();
        assert_eq!(redactor.redact("global logistics sa"), "global logistics sa");
    }

    #[test]
    fn unmatched_and_empty_text_pass_through() {
        let redactor = Redactor::default();
        assert_eq!(redactor.redact(""), "");
        assert_eq!(redactor.redact("CLÁUSULA 12 - DO FORO"), "CLÁUSULA 12 - DO FORO");
    }

    #[test]
    fn every_match_is_replaced() {
        let redactor = Redactor::default();
        assert_eq!(
            redactor.redact("12.345.678/0001-99 e 98.765.432/0001-11"),
            "[CNPJ REDACTED] e [CNPJ REDACTED]"
        );
    }

    #[test]
    fn redaction_is_idempotent() {
        let redactor = Redactor::new(&[
            "Global Logistics SA".to_string(),
            "Acme1".to_string(),
            "SA 9".to_string(),
        ]);
        let inputs = [
            "",
            "CNPJ 12.345.678/0001-99",
            "111.222.333-444.555.666-77",
            "Acme1234.567.890-12",
            "Global Logistics SA 98.765.432/0001-11 Global Logistics SA",
            "Global Logistics SA 9",
            "[CPF REDACTED] [ENTITY REDACTED]",
            "12.345.678/0001-9912.345.678/0001-99",
        ];
        for input in inputs {
            let once = redactor.redact(input);
            assert_eq!(redactor.redact(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn entities_overlapping_tokens_are_refused() {
        let redactor = Redactor::new(&[
            "REDACTED".to_string(),
            "D] x".to_string(),
            String::new(),
        ]);
        assert_eq!(redactor.rule_kinds(), vec![RuleKind::Cpf, RuleKind::Cnpj]);
        assert_eq!(redactor.redact("REDACTED"), "REDACTED");
    }

    #[test]
    fn rule_order_is_fixed() {
        assert_eq!(
            Redactor::default().rule_kinds(),
            vec![RuleKind::Cpf, RuleKind::Cnpj, RuleKind::Entity]
        );
    }
}
