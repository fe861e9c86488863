use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse the wire value; anything outside the enumeration is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

fn default_page() -> u32 {
    1
}

/// One AI-reported risk tied to a clause and a quoted span of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFinding {
    id: String,
    pub clause: String,
    pub description: String,
    pub severity: Severity,
    /// Exact text expected in the document content.
    pub highlight_text: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    validated: bool,
}

impl RiskFinding {
    pub fn new(
        id: impl Into<String>,
        clause: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        highlight_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            clause: clause.into(),
            description: description.into(),
            severity,
            highlight_text: highlight_text.into(),
            page: 1,
            validated: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn validated(&self) -> bool {
        self.validated
    }
}

/// Headline risk level shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Critical,
    Controlled,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Controlled => "controlled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskMetrics {
    pub total: usize,
    pub validated: usize,
    /// High-severity findings not yet validated by a reviewer.
    pub critical_count: usize,
    /// Rounded to the nearest whole percent; zero when there are no findings.
    pub validated_percentage: u8,
}

impl RiskMetrics {
    pub fn level(&self) -> RiskLevel {
        if self.critical_count > 0 {
            RiskLevel::Critical
        } else {
            RiskLevel::Controlled
        }
    }
}

fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * part + total) / (2 * total);
    rounded.min(100) as u8
}

/// Ordered set of findings for the active document.
#[derive(Debug, Clone, Default)]
pub struct RiskRegistry {
    findings: Vec<RiskFinding>,
}

impl RiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every finding with `findings`, keeping their order. Later
    /// entries reusing an earlier id are dropped.
    pub fn replace(&mut self, findings: Vec<RiskFinding>) {
        let mut seen = HashSet::with_capacity(findings.len());
        self.findings = findings
            .into_iter()
            .filter(|f| {
                let fresh = seen.insert(f.id.clone());
                if !fresh {
                    tracing::warn!(finding_id = %f.id, "Dropping risk finding with duplicate id");
                }
                fresh
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.findings.clear();
    }

    pub fn list(&self) -> &[RiskFinding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RiskFinding> {
        self.findings.iter().find(|f| f.id == id)
    }

    /// Flip the reviewer validation flag, returning the new value.
    pub fn toggle_validated(&mut self, id: &str) -> Result<bool, RegistryError> {
        let finding = self
            .findings
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        finding.validated = !finding.validated;
        Ok(finding.validated)
    }

    pub fn metrics(&self) -> RiskMetrics {
        self.metrics_excluding(&HashSet::new())
    }

    /// Metrics over the findings whose ids are not in `excluded`.
    pub fn metrics_excluding(&self, excluded: &HashSet<String>) -> RiskMetrics {
        let counted = self.findings.iter().filter(|f| !excluded.contains(&f.id));
        let mut total = 0;
        let mut validated = 0;
        let mut critical_count = 0;
        for finding in counted {
            total += 1;
            if finding.validated {
                validated += 1;
            } else if finding.severity == Severity::High {
                critical_count += 1;
            }
        }

        RiskMetrics {
            total,
            validated,
            critical_count,
            validated_percentage: percentage(validated, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_accepts_only_the_exact_levels() {
        assert_eq!(Severity::parse("low"), Some(Severity::Low));
        assert_eq!(Severity::parse("medium"), Some(Severity::Medium));
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        for raw in ["HIGH", "High", " high", "high ", "critical", ""] {
            assert_eq!(Severity::parse(raw), None, "{raw:?}");
        }
    }

    fn registry() -> RiskRegistry {
        let mut registry = RiskRegistry::new();
        registry.replace(vec![
            RiskFinding::new("r1", "4.2", "Abusive penalty", Severity::High, "multa de 100%"),
            RiskFinding::new("r2", "12", "Foreign venue", Severity::Medium, "Comarca de Miami"),
            RiskFinding::new("r3", "8", "LGPD", Severity::Low, "dados pessoais"),
        ]);
        registry
    }

    #[test]
    fn toggle_twice_restores_original_value() {
        let mut registry = registry();
        assert!(registry.toggle_validated("r2").expect("toggle"));
        assert!(!registry.toggle_validated("r2").expect("toggle"));
        assert!(!registry.get("r2").expect("r2").validated());
    }

    #[test]
    fn toggle_unknown_id_is_not_found() {
        let mut registry = registry();
        assert_eq!(
            registry.toggle_validated("nope"),
            Err(RegistryError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn empty_registry_reports_zero_percent() {
        let metrics = RiskRegistry::new().metrics();
        assert_eq!(metrics.validated_percentage, 0);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.level(), RiskLevel::Controlled);
    }

    #[test]
    fn fully_validated_registry_reports_hundred_percent() {
        let mut registry = registry();
        for id in ["r1", "r2", "r3"] {
            registry.toggle_validated(id).expect("toggle");
        }
        let metrics = registry.metrics();
        assert_eq!(metrics.validated_percentage, 100);
        assert_eq!(metrics.critical_count, 0);
        assert_eq!(metrics.level(), RiskLevel::Controlled);
    }

    #[test]
    fn unvalidated_high_finding_is_critical() {
        let mut registry = registry();
        let metrics = registry.metrics();
        assert_eq!(metrics.critical_count, 1);
        assert_eq!(metrics.level(), RiskLevel::Critical);

        registry.toggle_validated("r1").expect("toggle");
        let metrics = registry.metrics();
        assert_eq!(metrics.critical_count, 0);
        assert_eq!(metrics.validated_percentage, 33);
    }

    #[test]
    fn percentage_rounds_to_nearest() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 5), 0);
    }

    #[test]
    fn replace_keeps_order_and_drops_duplicate_ids() {
        let mut registry = registry();
        registry.replace(vec![
            RiskFinding::new("b", "", "", Severity::Low, "x"),
            RiskFinding::new("a", "", "", Severity::Low, "y"),
            RiskFinding::new("b", "", "", Severity::High, "z"),
        ]);
        let ids: Vec<&str> = registry.list().iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(registry.get("b").expect("b").severity, Severity::Low);
    }

    #[test]
    fn excluded_findings_do_not_count() {
        let registry = registry();
        let excluded: HashSet<String> = ["r1".to_string()].into_iter().collect();
        let metrics = registry.metrics_excluding(&excluded);
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.critical_count, 0);
    }

    #[test]
    fn findings_deserialize_with_defaults() {
        let finding: RiskFinding = serde_json::from_str(
            r#"{"id":"r9","clause":"1","description":"d","severity":"high","highlightText":"CNPJ"}"#,
        )
        .expect("finding json");
        assert_eq!(finding.page, 1);
        assert!(!finding.validated());
        assert_eq!(finding.severity, Severity::High);
    }
}
