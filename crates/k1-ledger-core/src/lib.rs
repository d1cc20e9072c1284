use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

pub mod resolver;
pub mod rules;
pub mod runner;

pub use runner::{run_validation, ScopeRecords};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("report error: {0}")]
    Report(String),
}

/// Unique identifier for one validation report document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ReportId(pub Ulid);

impl ReportId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ReportId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Advisory,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Advisory => "advisory",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Self::Critical),
            "warning" => Some(Self::Warning),
            "advisory" => Some(Self::Advisory),
            _ => None,
        }
    }
}

/// Rule category tags, serialized as the single letters used in rule ids
/// and report documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RuleCategory {
    #[serde(rename = "A")]
    CrossSectional,
    #[serde(rename = "B")]
    Continuity,
    #[serde(rename = "C")]
    Amendment,
    #[serde(rename = "D")]
    Reasonableness,
}

impl RuleCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrossSectional => "A",
            Self::Continuity => "B",
            Self::Amendment => "C",
            Self::Reasonableness => "D",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A" => Some(Self::CrossSectional),
            "B" => Some(Self::Continuity),
            "C" => Some(Self::Amendment),
            "D" => Some(Self::Reasonableness),
            _ => None,
        }
    }
}

/// Reference to the ingestion run that previously stored a given document,
/// returned when a content hash is seen again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRef {
    pub source_run_id: String,
    pub source_document_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ingested_at: OffsetDateTime,
}

/// One recipient's allocation from one issuing entity for one reporting
/// period, as extracted from a single K-1 document.
///
/// The triple `(issuer_id, recipient_id, period)` is the primary key; all
/// financial attributes are nullable because partial extraction is the
/// expected common case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct K1Record {
    pub issuer_id: String,
    pub recipient_id: String,
    pub period: String,

    pub source_run_id: String,
    pub source_document_name: String,
    pub source_content_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ingested_at: OffsetDateTime,

    pub issuer_name: Option<String>,
    pub recipient_role: Option<String>,
    pub share_percentage: Option<f64>,

    pub ordinary_business_income: Option<f64>,
    pub rental_real_estate_income: Option<f64>,
    pub guaranteed_payments: Option<f64>,
    pub interest_income: Option<f64>,
    pub ordinary_dividends: Option<f64>,
    pub qualified_dividends: Option<f64>,
    pub short_term_capital_gains: Option<f64>,
    pub long_term_capital_gains: Option<f64>,
    pub section_179_deduction: Option<f64>,
    pub distributions: Option<f64>,
    pub capital_account_beginning: Option<f64>,
    pub capital_account_ending: Option<f64>,
    pub self_employment_earnings: Option<f64>,
    pub foreign_taxes_paid: Option<f64>,
    pub qbi_deduction: Option<f64>,

    pub precheck_passed: Option<bool>,
    #[serde(default)]
    pub precheck_critical_count: u32,
    #[serde(default)]
    pub precheck_warning_count: u32,
    pub coherence_score: Option<f64>,
    pub ocr_confidence: Option<f64>,
}

impl K1Record {
    /// The primary key of this record.
    #[must_use]
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.issuer_id, &self.recipient_id, &self.period)
    }

    /// All fifteen nullable amount fields, paired with their names, in
    /// stable schema order. Duplicate/amendment rules compare records
    /// field-by-field over this table.
    #[must_use]
    pub fn amount_fields(&self) -> [(&'static str, Option<f64>); 15] {
        [
            ("ordinary_business_income", self.ordinary_business_income),
            ("rental_real_estate_income", self.rental_real_estate_income),
            ("guaranteed_payments", self.guaranteed_payments),
            ("interest_income", self.interest_income),
            ("ordinary_dividends", self.ordinary_dividends),
            ("qualified_dividends", self.qualified_dividends),
            ("short_term_capital_gains", self.short_term_capital_gains),
            ("long_term_capital_gains", self.long_term_capital_gains),
            ("section_179_deduction", self.section_179_deduction),
            ("distributions", self.distributions),
            ("capital_account_beginning", self.capital_account_beginning),
            ("capital_account_ending", self.capital_account_ending),
            ("self_employment_earnings", self.self_employment_earnings),
            ("foreign_taxes_paid", self.foreign_taxes_paid),
            ("qbi_deduction", self.qbi_deduction),
        ]
    }

    /// The pooled income fields used by proportionality and
    /// reasonableness rules (guaranteed payments and deductions are
    /// deliberately excluded from the pool).
    #[must_use]
    pub fn income_fields(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("ordinary_business_income", self.ordinary_business_income),
            ("rental_real_estate_income", self.rental_real_estate_income),
            ("interest_income", self.interest_income),
            ("ordinary_dividends", self.ordinary_dividends),
            ("short_term_capital_gains", self.short_term_capital_gains),
            ("long_term_capital_gains", self.long_term_capital_gains),
        ]
    }

    /// Validate identity and provenance fields before the record enters
    /// the store.
    ///
    /// # Errors
    /// Returns [`LedgerError::Validation`] when a key field is empty, the
    /// period is not a 4-digit year, the content hash is not lowercase
    /// hex SHA-256, or an opaque score is out of range.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.issuer_id.trim().is_empty() {
            return Err(LedgerError::Validation("issuer_id MUST be provided".to_string()));
        }
        if self.recipient_id.trim().is_empty() {
            return Err(LedgerError::Validation("recipient_id MUST be provided".to_string()));
        }
        if self.period.len() != 4 || !self.period.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(LedgerError::Validation(format!(
                "period MUST be a 4-digit year, got {:?}",
                self.period
            )));
        }
        if self.source_run_id.trim().is_empty() {
            return Err(LedgerError::Validation("source_run_id MUST be provided".to_string()));
        }
        if self.source_content_hash.len() != 64
            || !self
                .source_content_hash
                .chars()
                .all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase())
        {
            return Err(LedgerError::Validation(
                "source_content_hash MUST be 64 lowercase hex characters".to_string(),
            ));
        }
        for (name, score) in
            [("coherence_score", self.coherence_score), ("ocr_confidence", self.ocr_confidence)]
        {
            if let Some(score) = score {
                if !(0.0..=1.0).contains(&score) {
                    return Err(LedgerError::Validation(format!(
                        "{name} MUST be in [0.0, 1.0]"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One outcome of one rule applied to one scope. Rules emit passing
/// results too, so "rule never ran" and "rule passed" stay
/// distinguishable downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub rule_id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub passed: bool,
    pub message: String,
    pub issuer_id: String,
    pub period: String,
    pub recipient_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub validated_at: OffsetDateTime,
    pub triggering_run_id: Option<String>,
}

/// One `(issuer, period)` group covered by a validation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeDescriptor {
    pub issuer_id: String,
    pub period: String,
    pub recipient_count: usize,
    pub issuer_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub total_checks: usize,
    pub passed: usize,
    pub failed: usize,
    pub critical: usize,
    pub warnings: usize,
    pub advisory: usize,
}

impl RunSummary {
    /// Tally results; the per-severity counts cover failures only.
    #[must_use]
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let mut summary = Self { total_checks: results.len(), ..Self::default() };
        for result in results {
            if result.passed {
                summary.passed += 1;
                continue;
            }
            summary.failed += 1;
            match result.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Advisory => summary.advisory += 1,
            }
        }
        summary
    }
}

/// The full output document handed to the reporter after a validation
/// run: summary counts, the scopes covered, and every rule result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub report_id: ReportId,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub summary: RunSummary,
    pub scopes_validated: Vec<ScopeDescriptor>,
    pub continuity_pairs_checked: usize,
    pub results: Vec<ValidationResult>,
}

/// Durable sink for validation reports. The engine hands reports off and
/// retains nothing; persistence policy lives behind this seam.
pub trait ReportSink {
    /// # Errors
    /// Returns [`LedgerError::Report`] when the report cannot be
    /// serialized or durably written.
    fn write_report(&mut self, report: &ValidationReport) -> Result<(), LedgerError>;
}
